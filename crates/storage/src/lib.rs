//! Storage handles for workspace access.
//!
//! The indexer never touches a filesystem API directly, it only sees [`StorageHandle`]s: opaque,
//! capability-scoped references that know their own `name` and `kind`, can enumerate children
//! (directories), and read or write their whole content (files). Hosts plug in whatever backs
//! the workspace; this crate ships [`LocalHandle`] over `tokio::fs` and [`MemoryHandle`], an
//! in-memory tree.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;

mod error;
mod local;
mod memory;

pub use error::{LocalIoError, LocalOp, StorageError};
pub use local::LocalHandle;
pub use memory::MemoryHandle;

/// Shared, type-erased handle as passed around by the indexer.
pub type DynHandle = Arc<dyn StorageHandle>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
	File,
	Directory,
}

#[async_trait]
pub trait StorageHandle: fmt::Debug + Send + Sync + 'static {
	/// Name of this entry alone, without any parent component.
	fn name(&self) -> &str;

	fn kind(&self) -> HandleKind;

	/// Immediate children of a directory, in whatever order the backend yields them.
	async fn list_children(&self) -> Result<Vec<DynHandle>, StorageError>;

	/// Whole content of a file.
	async fn read_all(&self) -> Result<Bytes, StorageError>;

	/// Replaces the whole content of a file.
	async fn write(&self, data: Bytes) -> Result<(), StorageError>;

	/// Looks up a direct child file of a directory, optionally creating it empty.
	async fn get_file(&self, name: &str, create: bool) -> Result<DynHandle, StorageError>;

	fn is_dir(&self) -> bool {
		self.kind() == HandleKind::Directory
	}
}
