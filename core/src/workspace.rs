//! # Workspace session
//!
//! Ties everything together for one opened workspace: the ignore sidecar, the scan limiter, the
//! current inventory and the annotation store. A session lives from [`Workspace::open`] to
//! [`Workspace::close`]; re-scans always replace the whole inventory.

use md_storage::{DynHandle, StorageError};
use md_task_limiter::{ConcurrencyLimiter, LimiterError};

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::{
	annotations::{
		Anchor, AnchorEngine, AnchorError, AnnotationStore, KeyValueBackend, ReconstructReport,
		RenderedContent, Selection,
	},
	assets,
	config::CoreConfig,
	indexer::{
		self,
		sidecar::{self, SidecarError},
		Classifier, FileEntry, IgnoreRuleSet, IndexerError, ScanOutput,
	},
};

#[derive(Error, Debug)]
pub enum WorkspaceError {
	// User errors
	#[error("image reference doesn't match any asset: <reference='{0}'>")]
	UnresolvedImage(String),
	#[error("document isn't part of the workspace: <path='{0}'>")]
	UnknownDocument(String),
	#[error("workspace is closed")]
	Closed,

	// Storage errors
	#[error("failed to read <path='{path}'>: {source}")]
	Read {
		path: String,
		#[source]
		source: StorageError,
	},
	#[error(transparent)]
	Sidecar(#[from] SidecarError),

	// Module errors
	#[error(transparent)]
	Indexer(#[from] IndexerError),
	#[error(transparent)]
	Anchor(#[from] AnchorError),
	#[error(transparent)]
	Limiter(LimiterError),
}

impl From<LimiterError> for WorkspaceError {
	fn from(err: LimiterError) -> Self {
		if err.is_cancelled() {
			Self::Closed
		} else {
			Self::Limiter(err)
		}
	}
}

#[derive(Debug)]
pub struct Workspace {
	root: DynHandle,
	config: CoreConfig,
	classifier: Classifier,
	limiter: ConcurrencyLimiter,
	default_rules: IgnoreRuleSet,
	rules: RwLock<IgnoreRuleSet>,
	inventory: RwLock<Arc<ScanOutput>>,
	scan_lock: Mutex<()>,
	rules_lock: Mutex<()>,
	anchors: AnchorEngine,
}

impl Workspace {
	/// Opens the workspace under `root` and runs its first scan.
	///
	/// Annotations are persisted in `backend`.
	#[instrument(skip_all, fields(root = root.name()), err)]
	pub async fn open(
		root: DynHandle,
		config: CoreConfig,
		backend: Arc<dyn KeyValueBackend>,
	) -> Result<Self, WorkspaceError> {
		if !root.is_dir() {
			return Err(IndexerError::RootNotADirectory(root.name().to_string()).into());
		}

		let default_rules = IgnoreRuleSet::new(config.default_ignore_patterns.iter().cloned());
		let rules =
			sidecar::load_ignore_file(&*root, &config.ignore_file_name, &default_rules).await;

		let workspace = Self {
			classifier: Classifier::new(&config.markdown_extensions, &config.image_extensions),
			limiter: ConcurrencyLimiter::new(config.scan_concurrency),
			anchors: AnchorEngine::new(
				AnnotationStore::new(backend, config.annotations_key_prefix.clone()),
				config.highlight_class.clone(),
			),
			default_rules,
			rules: RwLock::new(rules),
			inventory: RwLock::new(Arc::default()),
			scan_lock: Mutex::new(()),
			rules_lock: Mutex::new(()),
			root,
			config,
		};

		workspace.refresh().await?;

		info!(
			files = workspace.files().len(),
			assets = workspace.assets().len(),
			"Workspace opened"
		);

		Ok(workspace)
	}

	#[must_use]
	pub const fn root(&self) -> &DynHandle {
		&self.root
	}

	#[must_use]
	pub const fn config(&self) -> &CoreConfig {
		&self.config
	}

	/// Scans the whole tree again and replaces the inventory.
	///
	/// Scans never overlap, a call made while one is running waits for it then scans again.
	pub async fn refresh(&self) -> Result<Arc<ScanOutput>, WorkspaceError> {
		let _guard = self.scan_lock.lock().await;
		let start = Instant::now();

		let rules = self.rules.read().clone();
		let output = Arc::new(
			indexer::scan(Arc::clone(&self.root), &rules, &self.classifier, &self.limiter).await?,
		);

		for e in &output.errors {
			warn!("Partial workspace inventory: {e:#}");
		}
		debug!(elapsed = ?start.elapsed(), "Workspace inventory replaced");

		*self.inventory.write() = Arc::clone(&output);
		Ok(output)
	}

	/// Current inventory, as produced by the last successful scan.
	#[must_use]
	pub fn inventory(&self) -> Arc<ScanOutput> {
		Arc::clone(&self.inventory.read())
	}

	#[must_use]
	pub fn files(&self) -> Vec<FileEntry> {
		self.inventory.read().files.clone()
	}

	#[must_use]
	pub fn assets(&self) -> Vec<FileEntry> {
		self.inventory.read().assets.clone()
	}

	#[must_use]
	pub fn ignore_rules(&self) -> IgnoreRuleSet {
		self.rules.read().clone()
	}

	/// Adds an ignore pattern, persists the sidecar and re-scans.
	///
	/// Returns `false` without doing anything if the pattern was empty or already present.
	pub async fn add_ignore_pattern(&self, pattern: &str) -> Result<bool, WorkspaceError> {
		self.update_rules(|rules| rules.add(pattern)).await
	}

	/// Removes an ignore pattern, persists the sidecar and re-scans.
	pub async fn remove_ignore_pattern(&self, pattern: &str) -> Result<bool, WorkspaceError> {
		self.update_rules(|rules| rules.remove(pattern)).await
	}

	/// Puts back the configured default rules, persists the sidecar and re-scans.
	pub async fn reset_ignore_rules(&self) -> Result<(), WorkspaceError> {
		let defaults = self.default_rules.clone();
		self.update_rules(move |rules| {
			*rules = defaults;
			true
		})
		.await
		.map(|_| ())
	}

	/// Applies `f` to a copy of the rules, which replaces the session's rules only once the
	/// sidecar holds it.
	async fn update_rules(
		&self,
		f: impl FnOnce(&mut IgnoreRuleSet) -> bool + Send,
	) -> Result<bool, WorkspaceError> {
		let _guard = self.rules_lock.lock().await;

		let mut rules = self.rules.read().clone();
		if !f(&mut rules) {
			return Ok(false);
		}

		debug!(patterns = ?rules.patterns(), "Ignore rules changed");

		sidecar::save_ignore_file(&*self.root, &self.config.ignore_file_name, &rules).await?;
		*self.rules.write() = rules;
		self.refresh().await?;

		Ok(true)
	}

	/// Asset matching an image reference found in `document`, if any.
	#[must_use]
	pub fn resolve_image(&self, reference: &str, document: Option<&str>) -> Option<FileEntry> {
		assets::resolve(reference, &self.inventory.read().assets, document).cloned()
	}

	/// Bytes of the asset an image reference resolves to.
	pub async fn load_image(
		&self,
		reference: &str,
		document: Option<&str>,
	) -> Result<Bytes, WorkspaceError> {
		let asset = self
			.resolve_image(reference, document)
			.ok_or_else(|| WorkspaceError::UnresolvedImage(reference.to_string()))?;

		self.read_entry(asset).await
	}

	/// Raw markdown of a document of the inventory.
	pub async fn read_document(&self, path: &str) -> Result<String, WorkspaceError> {
		let entry = self
			.inventory
			.read()
			.files
			.iter()
			.find(|file| file.path == path)
			.cloned()
			.ok_or_else(|| WorkspaceError::UnknownDocument(path.to_string()))?;

		let bytes = self.read_entry(entry).await?;
		Ok(String::from_utf8_lossy(&bytes).into_owned())
	}

	async fn read_entry(&self, entry: FileEntry) -> Result<Bytes, WorkspaceError> {
		let FileEntry { path, handle, .. } = entry;

		self.limiter
			.enqueue(async move { handle.read_all().await })
			.await?
			.map_err(|source| WorkspaceError::Read { path, source })
	}

	#[must_use]
	pub const fn annotations(&self) -> &AnchorEngine {
		&self.anchors
	}

	pub async fn capture_highlight(
		&self,
		document: &str,
		content: &RenderedContent,
		selection: &Selection,
	) -> Result<Anchor, WorkspaceError> {
		Ok(self.anchors.capture(document, content, selection).await?)
	}

	pub async fn reconstruct(
		&self,
		document: &str,
		content: &mut RenderedContent,
	) -> ReconstructReport {
		self.anchors.reconstruct(document, content).await
	}

	/// Ends the session: in-flight and later scans or reads fail as cancelled.
	pub fn close(&self) {
		info!(root = self.root.name(), "Closing workspace");
		self.limiter.cancel();
	}

	#[must_use]
	pub fn is_closed(&self) -> bool {
		self.limiter.is_cancelled()
	}
}
