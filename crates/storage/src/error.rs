use std::{io, path::Path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
	#[error(transparent)]
	Local(#[from] LocalIoError),
	#[error("expected a directory: <name='{0}'>")]
	NotADirectory(String),
	#[error("expected a file: <name='{0}'>")]
	NotAFile(String),
	#[error("entry not found: <name='{name}'> in <parent='{parent}'>")]
	NotFound { parent: String, name: String },
	#[error("permission denied: <name='{0}'>")]
	PermissionDenied(String),
}

/// What a local handle was doing when the filesystem failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalOp {
	Open,
	List,
	Read,
	Write,
	Create,
}

impl LocalOp {
	const fn verb(self) -> &'static str {
		match self {
			Self::Open => "open",
			Self::List => "list",
			Self::Read => "read",
			Self::Write => "write",
			Self::Create => "create",
		}
	}
}

/// Filesystem error of a [`LocalHandle`](crate::LocalHandle), with the path it happened on.
#[derive(Error, Debug)]
#[error("failed to {} <path='{}'>: {source}", .op.verb(), .path.display())]
pub struct LocalIoError {
	pub op: LocalOp,
	pub path: Box<Path>,
	#[source]
	pub source: io::Error,
}

impl LocalIoError {
	pub fn new(op: LocalOp, path: impl AsRef<Path>, source: io::Error) -> Self {
		Self {
			op,
			path: path.as_ref().into(),
			source,
		}
	}
}
