//! Local filesystem handles

use std::{
	path::{Path, PathBuf},
	sync::Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::{debug, trace};

use super::{DynHandle, HandleKind, LocalIoError, LocalOp, StorageError, StorageHandle};

/// Handle over a path on the local filesystem.
///
/// A thin wrapper around `tokio::fs`. Only plain files and directories are reported as
/// children: symlinks are never followed, so a link back to an ancestor can't loop a walk.
#[derive(Debug, Clone)]
pub struct LocalHandle {
	path: PathBuf,
	name: String,
	kind: HandleKind,
}

impl LocalHandle {
	/// Opens a handle to an existing file or directory.
	pub async fn open(path: impl AsRef<Path>) -> Result<Arc<Self>, StorageError> {
		let path = path.as_ref();
		let metadata = fs::metadata(path)
			.await
			.map_err(|e| LocalIoError::new(LocalOp::Open, path, e))?;

		let kind = if metadata.is_dir() {
			HandleKind::Directory
		} else {
			HandleKind::File
		};

		Ok(Arc::new(Self::new(path.to_path_buf(), kind)))
	}

	fn new(path: PathBuf, kind: HandleKind) -> Self {
		// Use `to_string_lossy` because a partially corrupted but identifiable name is better than nothing
		let name = path
			.file_name()
			.map_or_else(|| path.to_string_lossy(), |name| name.to_string_lossy())
			.to_string();

		Self { path, name, kind }
	}

	#[must_use]
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn ensure_dir(&self) -> Result<(), StorageError> {
		if self.kind == HandleKind::Directory {
			Ok(())
		} else {
			Err(StorageError::NotADirectory(self.name.clone()))
		}
	}

	fn ensure_file(&self) -> Result<(), StorageError> {
		if self.kind == HandleKind::File {
			Ok(())
		} else {
			Err(StorageError::NotAFile(self.name.clone()))
		}
	}
}

#[async_trait]
impl StorageHandle for LocalHandle {
	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> HandleKind {
		self.kind
	}

	async fn list_children(&self) -> Result<Vec<DynHandle>, StorageError> {
		self.ensure_dir()?;
		trace!(path = %self.path.display(), "LocalHandle::list_children");

		let mut read_dir = fs::read_dir(&self.path)
			.await
			.map_err(|e| LocalIoError::new(LocalOp::List, &self.path, e))?;

		let mut children: Vec<DynHandle> = Vec::new();

		while let Some(entry) = read_dir
			.next_entry()
			.await
			.map_err(|e| LocalIoError::new(LocalOp::List, &self.path, e))?
		{
			let child_path = entry.path();

			// `DirEntry::file_type` doesn't follow symlinks, unlike `fs::metadata`
			let file_type = match entry.file_type().await {
				Ok(file_type) => file_type,
				Err(e) => {
					debug!(path = %child_path.display(), "Skipping unreadable entry: {e:#?}");
					continue;
				}
			};

			let kind = if file_type.is_dir() {
				HandleKind::Directory
			} else if file_type.is_file() {
				HandleKind::File
			} else {
				trace!(path = %child_path.display(), "Skipping symlink or special file");
				continue;
			};

			children.push(Arc::new(Self::new(child_path, kind)));
		}

		Ok(children)
	}

	async fn read_all(&self) -> Result<Bytes, StorageError> {
		self.ensure_file()?;
		trace!(path = %self.path.display(), "LocalHandle::read_all");

		fs::read(&self.path)
			.await
			.map(Bytes::from)
			.map_err(|e| LocalIoError::new(LocalOp::Read, &self.path, e).into())
	}

	async fn write(&self, data: Bytes) -> Result<(), StorageError> {
		self.ensure_file()?;
		debug!(
			path = %self.path.display(),
			bytes = data.len(),
			"LocalHandle::write"
		);

		fs::write(&self.path, data)
			.await
			.map_err(|e| LocalIoError::new(LocalOp::Write, &self.path, e).into())
	}

	async fn get_file(&self, name: &str, create: bool) -> Result<DynHandle, StorageError> {
		self.ensure_dir()?;
		let path = self.path.join(name);

		match fs::metadata(&path).await {
			Ok(metadata) if metadata.is_file() => Ok(Arc::new(Self::new(path, HandleKind::File))),
			Ok(_) => Err(StorageError::NotAFile(name.to_string())),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
				if !create {
					return Err(StorageError::NotFound {
						parent: self.name.clone(),
						name: name.to_string(),
					});
				}

				fs::write(&path, b"")
					.await
					.map_err(|e| LocalIoError::new(LocalOp::Create, &path, e))?;

				Ok(Arc::new(Self::new(path, HandleKind::File)))
			}
			Err(e) => Err(LocalIoError::new(LocalOp::Open, &path, e).into()),
		}
	}
}
