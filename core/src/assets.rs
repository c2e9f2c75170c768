//! # Asset Resolver
//!
//! Maps the raw string inside a markdown image reference onto one of the image assets found by
//! the indexer. Three tiers are tried in order, the first hit wins:
//!
//! 1. the reference is the asset's root-relative path verbatim;
//! 2. the reference, joined to the current document's directory, is the asset's path;
//! 3. the reference's basename is the asset's name.
//!
//! The basename tier is lax on purpose: it may pick a same-named file elsewhere in the tree.
//! Absolute URLs and data URIs are never resolved, callers use them as they are.

use tracing::trace;

use crate::indexer::FileEntry;

/// An indexed image file.
pub type Asset = FileEntry;

const EXTERNAL_SCHEMES: [&str; 3] = ["http:", "https:", "data:"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
	ExactPath,
	RelativeToDocument,
	Basename,
}

/// `true` for references that must be passed through untouched.
#[must_use]
pub fn is_external_reference(reference: &str) -> bool {
	EXTERNAL_SCHEMES
		.iter()
		.any(|scheme| reference.starts_with(scheme))
}

/// Best matching asset for `reference`, `None` when nothing matches or the reference is
/// external. In both cases the caller falls back to the literal reference.
#[must_use]
pub fn resolve<'a>(
	reference: &str,
	assets: &'a [Asset],
	current_document: Option<&str>,
) -> Option<&'a Asset> {
	resolve_with_tier(reference, assets, current_document).map(|(asset, _)| asset)
}

/// Same as [`resolve`], also telling which tier matched.
#[must_use]
pub fn resolve_with_tier<'a>(
	reference: &str,
	assets: &'a [Asset],
	current_document: Option<&str>,
) -> Option<(&'a Asset, MatchTier)> {
	if reference.is_empty() || is_external_reference(reference) {
		return None;
	}

	let found = find_by_path(assets, reference)
		.map(|asset| (asset, MatchTier::ExactPath))
		.or_else(|| {
			current_document.and_then(|document| {
				let candidate = relative_to_document(document, reference);
				find_by_path(assets, &candidate).map(|asset| (asset, MatchTier::RelativeToDocument))
			})
		})
		.or_else(|| {
			let name = basename(reference);
			assets
				.iter()
				.find(|asset| asset.name == name)
				.map(|asset| (asset, MatchTier::Basename))
		});

	match &found {
		Some((asset, tier)) => trace!(%reference, path = %asset.path, ?tier, "Resolved image reference"),
		None => trace!(%reference, "Unresolved image reference"),
	}

	found
}

fn find_by_path<'a>(assets: &'a [Asset], path: &str) -> Option<&'a Asset> {
	assets.iter().find(|asset| asset.path == path)
}

/// Directory part of a root-relative document path, empty for documents at the root.
fn document_dir(document: &str) -> &str {
	document.rfind('/').map_or("", |idx| &document[..idx])
}

fn relative_to_document(document: &str, reference: &str) -> String {
	let dir = document_dir(document);
	let mut candidate = if dir.is_empty() {
		reference.strip_prefix("./").unwrap_or(reference).to_string()
	} else {
		format!("{dir}/{reference}")
	};

	while candidate.contains("/./") {
		candidate = candidate.replace("/./", "/");
	}

	candidate
}

/// Final component of the reference, split on both `/` and `\`.
fn basename(reference: &str) -> &str {
	reference
		.rfind(['/', '\\'])
		.map_or(reference, |idx| &reference[idx + 1..])
}
