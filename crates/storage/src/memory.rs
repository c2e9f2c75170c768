use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc,
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use super::{DynHandle, HandleKind, StorageError, StorageHandle};

/// In-memory file tree.
///
/// Useful for hosts that already hold the workspace in memory and for exercising the indexer
/// without touching a disk. Any node can be flagged unreadable, making `list_children` and
/// `read_all` fail with [`StorageError::PermissionDenied`].
#[derive(Debug)]
pub struct MemoryHandle {
	name: String,
	kind: HandleKind,
	contents: RwLock<Bytes>,
	children: RwLock<Vec<Arc<MemoryHandle>>>,
	unreadable: AtomicBool,
}

impl MemoryHandle {
	fn new(name: impl Into<String>, kind: HandleKind, contents: Bytes) -> Self {
		Self {
			name: name.into(),
			kind,
			contents: RwLock::new(contents),
			children: RwLock::new(Vec::new()),
			unreadable: AtomicBool::new(false),
		}
	}

	#[must_use]
	pub fn directory(name: impl Into<String>) -> Arc<Self> {
		Arc::new(Self::new(name, HandleKind::Directory, Bytes::new()))
	}

	#[must_use]
	pub fn file(name: impl Into<String>, contents: impl Into<Bytes>) -> Arc<Self> {
		Arc::new(Self::new(name, HandleKind::File, contents.into()))
	}

	/// Builds a tree from `/`-separated relative file paths, creating intermediate directories.
	#[must_use]
	pub fn from_files<'a>(
		root_name: impl Into<String>,
		files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
	) -> Arc<Self> {
		let root = Self::directory(root_name);

		for (path, contents) in files {
			let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
			let mut current = Arc::clone(&root);

			while let Some(component) = components.next() {
				if components.peek().is_none() {
					current.add_file(component, Bytes::copy_from_slice(contents));
				} else {
					current = current.add_dir(component);
				}
			}
		}

		root
	}

	/// Appends `child` and returns it.
	pub fn add_child(&self, child: Arc<Self>) -> Arc<Self> {
		self.children.write().push(Arc::clone(&child));
		child
	}

	/// Returns the existing child directory named `name`, or creates it.
	pub fn add_dir(&self, name: &str) -> Arc<Self> {
		if let Some(existing) = self.child(name).filter(|child| child.is_dir()) {
			return existing;
		}
		self.add_child(Self::directory(name))
	}

	/// Adds a file or replaces the content of an existing one.
	pub fn add_file(&self, name: &str, contents: impl Into<Bytes>) -> Arc<Self> {
		let contents = contents.into();
		if let Some(existing) = self.child(name).filter(|child| !child.is_dir()) {
			*existing.contents.write() = contents;
			return existing;
		}
		self.add_child(Self::file(name, contents))
	}

	#[must_use]
	pub fn child(&self, name: &str) -> Option<Arc<Self>> {
		self.children
			.read()
			.iter()
			.find(|child| child.name == name)
			.cloned()
	}

	/// Follows a `/`-separated relative path down the tree.
	#[must_use]
	pub fn lookup(self: &Arc<Self>, path: &str) -> Option<Arc<Self>> {
		path.split('/')
			.filter(|c| !c.is_empty())
			.try_fold(Arc::clone(self), |current, component| current.child(component))
	}

	pub fn set_unreadable(&self, unreadable: bool) {
		self.unreadable.store(unreadable, Ordering::Release);
	}

	fn check_readable(&self) -> Result<(), StorageError> {
		if self.unreadable.load(Ordering::Acquire) {
			Err(StorageError::PermissionDenied(self.name.clone()))
		} else {
			Ok(())
		}
	}
}

#[async_trait]
impl StorageHandle for MemoryHandle {
	fn name(&self) -> &str {
		&self.name
	}

	fn kind(&self) -> HandleKind {
		self.kind
	}

	async fn list_children(&self) -> Result<Vec<DynHandle>, StorageError> {
		if !self.is_dir() {
			return Err(StorageError::NotADirectory(self.name.clone()));
		}
		self.check_readable()?;

		Ok(self
			.children
			.read()
			.iter()
			.map(|child| Arc::clone(child) as DynHandle)
			.collect())
	}

	async fn read_all(&self) -> Result<Bytes, StorageError> {
		if self.is_dir() {
			return Err(StorageError::NotAFile(self.name.clone()));
		}
		self.check_readable()?;

		Ok(self.contents.read().clone())
	}

	async fn write(&self, data: Bytes) -> Result<(), StorageError> {
		if self.is_dir() {
			return Err(StorageError::NotAFile(self.name.clone()));
		}
		trace!(name = %self.name, bytes = data.len(), "MemoryHandle::write");

		*self.contents.write() = data;
		Ok(())
	}

	async fn get_file(&self, name: &str, create: bool) -> Result<DynHandle, StorageError> {
		if !self.is_dir() {
			return Err(StorageError::NotADirectory(self.name.clone()));
		}

		match self.child(name) {
			Some(child) if child.is_dir() => Err(StorageError::NotAFile(name.to_string())),
			Some(child) => Ok(child),
			None if create => Ok(self.add_child(Self::file(name, Bytes::new()))),
			None => Err(StorageError::NotFound {
				parent: self.name.clone(),
				name: name.to_string(),
			}),
		}
	}
}
