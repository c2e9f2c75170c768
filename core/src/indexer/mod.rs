//! # Workspace Indexer
//!
//! Recursively walks a workspace through its root [`StorageHandle`](md_storage::StorageHandle),
//! drops every entry whose *name* matches an ignore rule (a matched directory is never
//! descended into), and classifies the remaining files by extension into markdown documents and
//! image assets.
//!
//! Directory enumerations go through a [`ConcurrencyLimiter`](md_task_limiter::ConcurrencyLimiter)
//! shared by the whole scan, bounding the outstanding storage operations at any time. A subtree
//! that can't be enumerated is recorded in [`ScanOutput::errors`] and the scan carries on with
//! the rest of the tree.

use md_storage::{DynHandle, StorageError};
use md_task_limiter::LimiterError;

use serde::Serialize;
use thiserror::Error;

mod classify;
pub mod rules;
mod scan;
pub mod sidecar;

pub use classify::{Classifier, IMAGE_EXTENSIONS, MARKDOWN_EXTENSIONS};
pub use rules::{is_ignored, IgnoreRuleSet, DEFAULT_IGNORE_PATTERNS};
pub use scan::{scan, ScanOutput, ScanStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
	Markdown,
	Image,
}

/// A classified file found by a scan.
///
/// `path` is relative to the workspace root and `/`-joined, unique within one scan result.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
	pub name: String,
	pub path: String,
	#[serde(skip)]
	pub handle: DynHandle,
	pub kind: FileKind,
}

impl PartialEq for FileEntry {
	fn eq(&self, other: &Self) -> bool {
		self.path == other.path && self.kind == other.kind
	}
}

impl Eq for FileEntry {}

/// Error type for the indexer module
#[derive(Error, Debug)]
pub enum IndexerError {
	// User errors
	#[error("workspace root is not a directory: <name='{0}'>")]
	RootNotADirectory(String),

	// Traversal errors, scoped to a single subtree
	#[error("failed to enumerate directory <path='{path}'>: {source}")]
	ReadDir {
		path: String,
		#[source]
		source: StorageError,
	},

	// Internal errors
	#[error("scan was cancelled")]
	Cancelled,
	#[error(transparent)]
	Limiter(LimiterError),
}

impl From<LimiterError> for IndexerError {
	fn from(err: LimiterError) -> Self {
		if err.is_cancelled() {
			Self::Cancelled
		} else {
			Self::Limiter(err)
		}
	}
}
