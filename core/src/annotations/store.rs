use md_storage::{DynHandle, StorageError};

use std::{
	collections::HashMap,
	fmt::{self, Write as _},
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use super::Anchor;

#[derive(Error, Debug)]
pub enum StoreError {
	#[error("annotations need a document path")]
	NoDocument,
	#[error("annotation backend is read only: <key='{0}'>")]
	ReadOnly(String),
	#[error("failed to serialize annotations: <key='{key}'>: {source}")]
	Serialize {
		key: String,
		#[source]
		source: serde_json::Error,
	},

	// Backend errors
	#[error(transparent)]
	Storage(#[from] StorageError),
}

/// Persisted annotations of a single document, always read and written as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
	/// Left untouched, the anchor engine only manages highlights.
	#[serde(default)]
	pub bookmarks: Vec<serde_json::Value>,
	#[serde(default)]
	pub highlights: Vec<Anchor>,
}

/// Flat string keyed storage the annotations are persisted in.
#[async_trait]
pub trait KeyValueBackend: fmt::Debug + Send + Sync + 'static {
	async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

	async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
	entries: RwLock<HashMap<String, Bytes>>,
	read_only: AtomicBool,
}

impl MemoryBackend {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Makes every following `set` fail with [`StoreError::ReadOnly`].
	pub fn set_read_only(&self, read_only: bool) {
		self.read_only.store(read_only, Ordering::Release);
	}

	#[must_use]
	pub fn raw(&self, key: &str) -> Option<Bytes> {
		self.entries.read().get(key).cloned()
	}

	pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<Bytes>) {
		self.entries.write().insert(key.into(), value.into());
	}

	#[must_use]
	pub fn keys(&self) -> Vec<String> {
		self.entries.read().keys().cloned().collect()
	}
}

#[async_trait]
impl KeyValueBackend for MemoryBackend {
	async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
		Ok(self.raw(key))
	}

	async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
		if self.read_only.load(Ordering::Acquire) {
			return Err(StoreError::ReadOnly(key.to_string()));
		}
		self.insert_raw(key, value);
		Ok(())
	}
}

/// One JSON file per key inside a storage directory.
#[derive(Debug)]
pub struct FileBackend {
	dir: DynHandle,
}

impl FileBackend {
	pub fn new(dir: DynHandle) -> Result<Self, StoreError> {
		if !dir.is_dir() {
			return Err(StorageError::NotADirectory(dir.name().to_string()).into());
		}
		Ok(Self { dir })
	}

	/// Keys carry document paths, so anything beyond `[A-Za-z0-9._-]` is percent-encoded.
	#[must_use]
	pub fn file_name(key: &str) -> String {
		let mut name = String::with_capacity(key.len() + 5);
		for byte in key.bytes() {
			if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
				name.push(char::from(byte));
			} else {
				let _ = write!(name, "%{byte:02X}");
			}
		}
		name.push_str(".json");
		name
	}
}

#[async_trait]
impl KeyValueBackend for FileBackend {
	async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
		match self.dir.get_file(&Self::file_name(key), false).await {
			Ok(file) => Ok(Some(file.read_all().await?)),
			Err(StorageError::NotFound { .. }) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
		let file = self.dir.get_file(&Self::file_name(key), true).await?;
		file.write(value).await?;
		Ok(())
	}
}

/// Per-document annotations of a workspace session.
///
/// Entries are cached once loaded and every change is written through immediately. A failed
/// write is reported but the cached copy keeps the change. A failed read is never cached:
/// changes to that document fail until the backend can be read again.
#[derive(Debug)]
pub struct AnnotationStore {
	backend: Arc<dyn KeyValueBackend>,
	key_prefix: String,
	cache: Mutex<HashMap<String, Annotations>>,
}

impl AnnotationStore {
	pub fn new(backend: Arc<dyn KeyValueBackend>, key_prefix: impl Into<String>) -> Self {
		Self {
			backend,
			key_prefix: key_prefix.into(),
			cache: Mutex::new(HashMap::new()),
		}
	}

	#[must_use]
	pub fn key(&self, document: &str) -> String {
		format!("{}{document}", self.key_prefix)
	}

	/// Annotations of `document`, empty when nothing is stored or the stored entry is unusable.
	pub async fn load(&self, document: &str) -> Annotations {
		if document.is_empty() {
			return Annotations::default();
		}

		let mut cache = self.cache.lock().await;
		match self.cached(&mut cache, document).await {
			Ok(annotations) => annotations.clone(),
			Err(e) => {
				error!(key = %self.key(document), "Failed to load annotations: {e:#}");
				Annotations::default()
			}
		}
	}

	/// Replaces everything stored for `document`.
	pub async fn save(&self, document: &str, annotations: Annotations) -> Result<(), StoreError> {
		self.modify(document, move |current| *current = annotations).await
	}

	pub async fn append_highlight(&self, document: &str, anchor: Anchor) -> Result<(), StoreError> {
		self.modify(document, move |current| current.highlights.push(anchor)).await
	}

	/// Returns `false` if no highlight had this id, in which case nothing is written.
	pub async fn remove_highlight(
		&self,
		document: &str,
		anchor_id: &str,
	) -> Result<bool, StoreError> {
		if document.is_empty() {
			return Err(StoreError::NoDocument);
		}

		let mut cache = self.cache.lock().await;
		let annotations = self.cached(&mut cache, document).await?;

		let before = annotations.highlights.len();
		annotations.highlights.retain(|anchor| anchor.id != anchor_id);
		if before == annotations.highlights.len() {
			return Ok(false);
		}

		let snapshot = annotations.clone();
		self.write(document, &snapshot).await?;
		Ok(true)
	}

	/// Drops the cached copy of `document`, the next access reloads it from the backend.
	pub async fn evict(&self, document: &str) {
		self.cache.lock().await.remove(document);
	}

	async fn modify(
		&self,
		document: &str,
		f: impl FnOnce(&mut Annotations) + Send,
	) -> Result<(), StoreError> {
		if document.is_empty() {
			return Err(StoreError::NoDocument);
		}

		// Held across the write so changes to a document are persisted in order.
		let mut cache = self.cache.lock().await;
		let annotations = self.cached(&mut cache, document).await?;
		f(annotations);

		let snapshot = annotations.clone();
		self.write(document, &snapshot).await
	}

	/// Cached entry of `document`, read from the backend on first access.
	///
	/// A backend failure is not cached, so callers never write over data they couldn't read.
	async fn cached<'c>(
		&self,
		cache: &'c mut HashMap<String, Annotations>,
		document: &str,
	) -> Result<&'c mut Annotations, StoreError> {
		if !cache.contains_key(document) {
			let loaded = self.read(document).await?;
			cache.insert(document.to_string(), loaded);
		}

		Ok(cache.entry(document.to_string()).or_default())
	}

	async fn read(&self, document: &str) -> Result<Annotations, StoreError> {
		let key = self.key(document);

		match self.backend.get(&key).await? {
			Some(raw) => Ok(serde_json::from_slice(&raw).unwrap_or_else(|e| {
				warn!(%key, "Discarding unparsable annotations: {e:#}");
				Annotations::default()
			})),
			None => {
				debug!(%key, "No stored annotations");
				Ok(Annotations::default())
			}
		}
	}

	async fn write(&self, document: &str, annotations: &Annotations) -> Result<(), StoreError> {
		let key = self.key(document);
		let raw = serde_json::to_vec(annotations).map_err(|source| StoreError::Serialize {
			key: key.clone(),
			source,
		})?;

		let res = self.backend.set(&key, Bytes::from(raw)).await;
		if let Err(e) = &res {
			error!(%key, "Failed to save annotations: {e:#}");
		}

		res
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use md_storage::MemoryHandle;

	use pretty_assertions::assert_eq;

	fn anchor(id: &str) -> Anchor {
		Anchor {
			id: id.to_string(),
			text: "text".to_string(),
			start_path: "P:nth-child(1)".to_string(),
			end_path: "P:nth-child(1)".to_string(),
			start_offset: 0,
			end_offset: 4,
		}
	}

	#[tokio::test]
	async fn missing_and_corrupted_entries_load_empty() {
		let backend = Arc::new(MemoryBackend::new());
		backend.insert_raw("md-annotations-broken.md", &b"{not json"[..]);
		let store = AnnotationStore::new(backend, "md-annotations-");

		assert_eq!(store.load("missing.md").await, Annotations::default());
		assert_eq!(store.load("broken.md").await, Annotations::default());
		assert_eq!(store.load("").await, Annotations::default());
	}

	#[tokio::test]
	async fn writes_through_under_prefixed_key() {
		let backend = Arc::new(MemoryBackend::new());
		let store = AnnotationStore::new(
			Arc::clone(&backend) as Arc<dyn KeyValueBackend>,
			"md-annotations-",
		);

		store.append_highlight("notes/a.md", anchor("h1")).await.unwrap();

		let raw = backend.raw("md-annotations-notes/a.md").unwrap();
		let stored = serde_json::from_slice::<Annotations>(&raw).unwrap();
		assert_eq!(stored.highlights, vec![anchor("h1")]);
		assert!(stored.bookmarks.is_empty());
	}

	#[tokio::test]
	async fn failed_write_keeps_memory_state() {
		let backend = Arc::new(MemoryBackend::new());
		let store = AnnotationStore::new(Arc::clone(&backend) as Arc<dyn KeyValueBackend>, "p-");
		backend.set_read_only(true);

		let res = store.append_highlight("a.md", anchor("h1")).await;

		assert!(matches!(res, Err(StoreError::ReadOnly(_))));
		assert_eq!(store.load("a.md").await.highlights, vec![anchor("h1")]);
		assert!(backend.raw("p-a.md").is_none());
	}

	/// Memory backend whose next `get` fails once armed.
	#[derive(Debug, Default)]
	struct FlakyBackend {
		inner: MemoryBackend,
		fail_next_get: AtomicBool,
	}

	#[async_trait]
	impl KeyValueBackend for FlakyBackend {
		async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
			if self.fail_next_get.swap(false, Ordering::AcqRel) {
				return Err(StorageError::PermissionDenied(key.to_string()).into());
			}
			self.inner.get(key).await
		}

		async fn set(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
			self.inner.set(key, value).await
		}
	}

	#[tokio::test]
	async fn failed_read_never_overwrites_stored_annotations() {
		let backend = Arc::new(FlakyBackend::default());
		backend.inner.insert_raw(
			"p-a.md",
			serde_json::to_vec(&Annotations {
				bookmarks: vec![serde_json::json!({ "line": 3 })],
				highlights: vec![anchor("old")],
			})
			.unwrap(),
		);
		let store = AnnotationStore::new(Arc::clone(&backend) as Arc<dyn KeyValueBackend>, "p-");

		backend.fail_next_get.store(true, Ordering::Release);
		assert!(matches!(
			store.append_highlight("a.md", anchor("new")).await,
			Err(StoreError::Storage(StorageError::PermissionDenied(_)))
		));

		backend.fail_next_get.store(true, Ordering::Release);
		assert_eq!(store.load("a.md").await, Annotations::default());

		// Nothing was written and the failure wasn't cached.
		store.append_highlight("a.md", anchor("new")).await.unwrap();
		let stored = serde_json::from_slice::<Annotations>(&backend.inner.raw("p-a.md").unwrap())
			.unwrap();
		assert_eq!(stored.bookmarks, vec![serde_json::json!({ "line": 3 })]);
		assert_eq!(stored.highlights, vec![anchor("old"), anchor("new")]);
	}

	#[tokio::test]
	async fn bookmarks_survive_highlight_changes() {
		let backend = Arc::new(MemoryBackend::new());
		backend.insert_raw(
			"p-a.md",
			&br#"{"bookmarks":[{"line":3}],"highlights":[]}"#[..],
		);
		let store = AnnotationStore::new(Arc::clone(&backend) as Arc<dyn KeyValueBackend>, "p-");

		store.append_highlight("a.md", anchor("h1")).await.unwrap();
		store.append_highlight("a.md", anchor("h2")).await.unwrap();
		assert!(store.remove_highlight("a.md", "h1").await.unwrap());
		assert!(!store.remove_highlight("a.md", "h1").await.unwrap());

		store.evict("a.md").await;
		let reloaded = store.load("a.md").await;
		assert_eq!(reloaded.bookmarks, vec![serde_json::json!({ "line": 3 })]);
		assert_eq!(reloaded.highlights, vec![anchor("h2")]);
	}

	#[tokio::test]
	async fn file_backend_round_trip() {
		let dir = MemoryHandle::directory("annotations");
		let backend = FileBackend::new(Arc::clone(&dir) as DynHandle).unwrap();

		assert!(backend.get("md-annotations-a/b.md").await.unwrap().is_none());

		backend
			.set("md-annotations-a/b.md", Bytes::from_static(b"{}"))
			.await
			.unwrap();

		assert!(dir.child("md-annotations-a%2Fb.md.json").is_some());
		assert_eq!(
			backend.get("md-annotations-a/b.md").await.unwrap(),
			Some(Bytes::from_static(b"{}"))
		);
	}

	#[test]
	fn file_backend_rejects_files() {
		let file = MemoryHandle::file("a.json", Bytes::new());

		assert!(matches!(
			FileBackend::new(file),
			Err(StoreError::Storage(StorageError::NotADirectory(_)))
		));
	}
}
