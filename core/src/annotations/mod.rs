//! # Annotation anchors
//!
//! A highlight made on rendered content is persisted as an [`Anchor`]: structural paths from the
//! content root down to the elements holding both ends of the selection, plus character offsets.
//! Whenever the content is rendered again, previous markers are stripped and every stored anchor
//! is resolved against the new tree and wrapped in a fresh marker element. Anchors that no longer
//! fit the content are skipped, never deleted.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod content;
mod engine;
pub mod path;
pub mod range;
mod store;

pub use content::{Element, NodeData, NodeId, RenderedContent};
pub use engine::{capture_anchor, reconstruct_anchors, AnchorEngine, ReconstructReport, Selection};
pub use path::{PathError, StructuralPath, ROOT_TOKEN};
pub use range::{Boundary, RangeError};
pub use store::{
	AnnotationStore, Annotations, FileBackend, KeyValueBackend, MemoryBackend, StoreError,
};

pub const DEFAULT_HIGHLIGHT_CLASS: &str = "highlight";
pub const DEFAULT_ANNOTATIONS_KEY_PREFIX: &str = "md-annotations-";

const ANCHOR_ID_PREFIX: &str = "highlight-";

/// Persisted locator of a highlight.
///
/// `text` is informational only, reconstruction relies on paths and offsets alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anchor {
	pub id: String,
	pub text: String,
	#[serde(alias = "startContainerPath")]
	pub start_path: String,
	#[serde(alias = "endContainerPath")]
	pub end_path: String,
	pub start_offset: usize,
	pub end_offset: usize,
}

#[derive(Error, Debug)]
pub enum AnchorError {
	// Capture errors
	#[error("selection holds no text")]
	EmptySelection,
	#[error("selection is not inside the rendered content")]
	OutsideContent,

	// Reconstruction errors
	#[error(transparent)]
	Path(#[from] PathError),
	#[error("structural path doesn't match the current content: <path='{0}'>")]
	Unresolved(String),
	#[error(transparent)]
	Range(#[from] RangeError),

	#[error("anchor <id='{anchor_id}'> was captured but not persisted: {source}")]
	Persist {
		anchor_id: String,
		#[source]
		source: StoreError,
	},
}

fn new_anchor_id() -> String {
	format!("{ANCHOR_ID_PREFIX}{}", uuid::Uuid::now_v7())
}
