use md_storage::DynHandle;
use md_task_limiter::ConcurrencyLimiter;

use std::{sync::Arc, time::Instant};

use futures::future::{BoxFuture, FutureExt};
use futures_concurrency::future::Join;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::{Classifier, FileEntry, FileKind, IgnoreRuleSet, IndexerError};

const FILES_BUFFER_INITIAL_CAPACITY: usize = 64;

/// Inventory produced by a scan.
///
/// `files` and `assets` are unordered, sort them at presentation time if needed. A non empty
/// `errors` means some subtrees couldn't be enumerated and are missing from the inventory.
#[derive(Debug, Default)]
pub struct ScanOutput {
	pub files: Vec<FileEntry>,
	pub assets: Vec<FileEntry>,
	pub errors: Vec<IndexerError>,
	pub stats: ScanStats,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
	pub dirs: u64,
	pub ignored: u64,
	pub unclassified: u64,
	pub failed_dirs: u64,
}

impl ScanOutput {
	fn with_capacity(capacity: usize) -> Self {
		Self {
			files: Vec::with_capacity(capacity),
			..Default::default()
		}
	}

	fn failed(error: IndexerError) -> Self {
		Self {
			errors: vec![error],
			stats: ScanStats {
				failed_dirs: 1,
				..Default::default()
			},
			..Default::default()
		}
	}

	fn merge(&mut self, other: Self) {
		let Self {
			files,
			assets,
			errors,
			stats,
		} = other;

		self.files.extend(files);
		self.assets.extend(assets);
		self.errors.extend(errors);
		self.stats.dirs += stats.dirs;
		self.stats.ignored += stats.ignored;
		self.stats.unclassified += stats.unclassified;
		self.stats.failed_dirs += stats.failed_dirs;
	}
}

struct ScanContext<'a> {
	rules: &'a IgnoreRuleSet,
	classifier: &'a Classifier,
	limiter: &'a ConcurrencyLimiter,
}

/// Scans the whole tree under `root`.
///
/// Only a failure to enumerate the root itself, or a cancellation of `limiter`, fails the scan.
/// The root's own name is never part of the produced paths.
pub async fn scan(
	root: DynHandle,
	rules: &IgnoreRuleSet,
	classifier: &Classifier,
	limiter: &ConcurrencyLimiter,
) -> Result<ScanOutput, IndexerError> {
	if !root.is_dir() {
		return Err(IndexerError::RootNotADirectory(root.name().to_string()));
	}

	let start = Instant::now();
	debug!(
		root = root.name(),
		patterns = ?rules.patterns(),
		max_concurrency = limiter.max_concurrency(),
		"Starting workspace scan"
	);

	let ctx = ScanContext {
		rules,
		classifier,
		limiter,
	};

	let children = list_dir(&ctx, root, String::new()).await?;
	let mut output = walk_children(&ctx, children, String::new()).await;
	output.stats.dirs += 1;

	if limiter.is_cancelled() {
		debug!("Workspace scan cancelled");
		return Err(IndexerError::Cancelled);
	}

	debug!(
		files = output.files.len(),
		assets = output.assets.len(),
		errors = output.errors.len(),
		stats = ?output.stats,
		elapsed = ?start.elapsed(),
		"Workspace scan complete"
	);

	Ok(output)
}

async fn list_dir(
	ctx: &ScanContext<'_>,
	dir: DynHandle,
	path: String,
) -> Result<Vec<DynHandle>, IndexerError> {
	trace!(%path, "Enumerating directory");

	let listing = ctx
		.limiter
		.enqueue({
			let dir = Arc::clone(&dir);
			async move { dir.list_children().await }
		})
		.await?;

	listing.map_err(|source| IndexerError::ReadDir { path, source })
}

fn walk_dir<'a>(ctx: &'a ScanContext<'a>, dir: DynHandle, path: String) -> BoxFuture<'a, ScanOutput> {
	async move {
		match list_dir(ctx, dir, path.clone()).await {
			Ok(children) => {
				let mut output = walk_children(ctx, children, format!("{path}/")).await;
				output.stats.dirs += 1;
				output
			}
			Err(IndexerError::Cancelled) => ScanOutput::default(),
			Err(e) => {
				warn!("Skipping unreadable subtree: {e:#}");
				ScanOutput::failed(e)
			}
		}
	}
	.boxed()
}

async fn walk_children(
	ctx: &ScanContext<'_>,
	children: Vec<DynHandle>,
	prefix: String,
) -> ScanOutput {
	let mut output = ScanOutput::with_capacity(FILES_BUFFER_INITIAL_CAPACITY.min(children.len()));
	let mut sub_dirs = Vec::new();

	for child in children {
		let name = child.name();

		if ctx.rules.is_ignored(name) {
			output.stats.ignored += 1;
			continue;
		}

		let path = format!("{prefix}{name}");

		if child.is_dir() {
			sub_dirs.push(walk_dir(ctx, child, path));
			continue;
		}

		match ctx.classifier.classify(name) {
			Some(kind) => {
				let entry = FileEntry {
					name: name.to_string(),
					path,
					handle: Arc::clone(&child),
					kind,
				};

				match kind {
					FileKind::Markdown => output.files.push(entry),
					FileKind::Image => output.assets.push(entry),
				}
			}
			None => output.stats.unclassified += 1,
		}
	}

	for sub_output in sub_dirs.join().await {
		output.merge(sub_output);
	}

	output
}
