//! Per-workspace ignore rules persisted as a JSON array in a file at the workspace root.

use md_storage::{StorageError, StorageHandle};

use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, error};

use super::IgnoreRuleSet;

pub const DEFAULT_IGNORE_FILE_NAME: &str = ".md-ignore";

#[derive(Error, Debug)]
pub enum SidecarError {
	#[error("ignore file storage error: {0}")]
	Storage(#[from] StorageError),
	#[error("ignore file is not a JSON array of strings: {0}")]
	Json(#[from] serde_json::Error),
}

/// Loads the ignore rules of a workspace.
///
/// A missing, unreadable or malformed file yields `defaults`; this never fails.
pub async fn load_ignore_file(
	root: &dyn StorageHandle,
	file_name: &str,
	defaults: &IgnoreRuleSet,
) -> IgnoreRuleSet {
	match try_load_ignore_file(root, file_name).await {
		Ok(rules) => {
			debug!(file_name, patterns = ?rules.patterns(), "Loaded ignore rules");
			rules
		}
		Err(e) => {
			debug!(file_name, "Using default ignore rules: {e:#}");
			defaults.clone()
		}
	}
}

async fn try_load_ignore_file(
	root: &dyn StorageHandle,
	file_name: &str,
) -> Result<IgnoreRuleSet, SidecarError> {
	let file = root.get_file(file_name, false).await?;
	let contents = file.read_all().await?;

	Ok(serde_json::from_slice::<IgnoreRuleSet>(&contents)?)
}

/// Writes the ignore rules as a pretty-printed JSON array, creating the file if needed.
pub async fn save_ignore_file(
	root: &dyn StorageHandle,
	file_name: &str,
	rules: &IgnoreRuleSet,
) -> Result<(), SidecarError> {
	let json = serde_json::to_vec_pretty(rules)?;

	let res = async {
		let file = root.get_file(file_name, true).await?;
		file.write(Bytes::from(json)).await
	}
	.await;

	if let Err(e) = &res {
		error!(file_name, "Failed to save ignore file: {e:#}");
	}

	Ok(res?)
}
