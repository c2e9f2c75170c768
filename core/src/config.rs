//! Core configuration

use std::{
	fs,
	path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
	annotations::{DEFAULT_ANNOTATIONS_KEY_PREFIX, DEFAULT_HIGHLIGHT_CLASS},
	indexer::{
		sidecar::DEFAULT_IGNORE_FILE_NAME, DEFAULT_IGNORE_PATTERNS, IMAGE_EXTENSIONS,
		MARKDOWN_EXTENSIONS,
	},
};

pub const CONFIG_FILE_NAME: &str = "md-core.json";

/// Configuration of a workspace session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
	/// Config schema version
	pub version: u32,

	/// How many directory enumerations may be in flight at once during a scan
	pub scan_concurrency: usize,

	/// Name of the ignore sidecar file at the workspace root
	pub ignore_file_name: String,

	/// Ignore rules used when the sidecar is missing or malformed
	pub default_ignore_patterns: Vec<String>,

	/// Extensions (without the dot) classified as markdown documents
	pub markdown_extensions: Vec<String>,

	/// Extensions (without the dot) classified as image assets
	pub image_extensions: Vec<String>,

	/// Class carried by injected highlight markers
	pub highlight_class: String,

	/// Prefix of the per-document annotation store keys
	pub annotations_key_prefix: String,

	/// Logging level for this crate
	pub log_level: String,
}

impl Default for CoreConfig {
	fn default() -> Self {
		Self {
			version: Self::target_version(),
			scan_concurrency: md_task_limiter::DEFAULT_MAX_CONCURRENCY,
			ignore_file_name: DEFAULT_IGNORE_FILE_NAME.to_string(),
			default_ignore_patterns: to_strings(&DEFAULT_IGNORE_PATTERNS),
			markdown_extensions: to_strings(MARKDOWN_EXTENSIONS),
			image_extensions: to_strings(IMAGE_EXTENSIONS),
			highlight_class: DEFAULT_HIGHLIGHT_CLASS.to_string(),
			annotations_key_prefix: DEFAULT_ANNOTATIONS_KEY_PREFIX.to_string(),
			log_level: "info".to_string(),
		}
	}
}

fn to_strings(values: &[&str]) -> Vec<String> {
	values.iter().map(ToString::to_string).collect()
}

impl CoreConfig {
	#[must_use]
	pub const fn target_version() -> u32 {
		1
	}

	/// Load configuration from a data directory, writing the defaults there when absent
	pub fn load_from(data_dir: impl AsRef<Path>) -> Result<Self> {
		let config_path = Self::path_in(data_dir.as_ref());

		if config_path.exists() {
			info!("Loading config from {}", config_path.display());
			let json = fs::read_to_string(&config_path)
				.with_context(|| format!("failed to read {}", config_path.display()))?;
			let mut config: Self = serde_json::from_str(&json)
				.with_context(|| format!("failed to parse {}", config_path.display()))?;

			if config.version > Self::target_version() {
				warn!(
					"Config version v{} is newer than supported v{}, unknown fields are ignored",
					config.version,
					Self::target_version()
				);
			}

			config.scan_concurrency = config.scan_concurrency.max(1);
			Ok(config)
		} else {
			warn!(
				"No config found, creating default at {}",
				config_path.display()
			);
			let config = Self::default();
			config.save_to(data_dir)?;
			Ok(config)
		}
	}

	/// Save configuration into a data directory
	pub fn save_to(&self, data_dir: impl AsRef<Path>) -> Result<()> {
		let data_dir = data_dir.as_ref();
		fs::create_dir_all(data_dir)
			.with_context(|| format!("failed to create {}", data_dir.display()))?;

		let config_path = Self::path_in(data_dir);
		let json = serde_json::to_string_pretty(self)?;
		fs::write(&config_path, json)
			.with_context(|| format!("failed to write {}", config_path.display()))?;

		info!("Saved config to {}", config_path.display());
		Ok(())
	}

	fn path_in(data_dir: &Path) -> PathBuf {
		data_dir.join(CONFIG_FILE_NAME)
	}
}
