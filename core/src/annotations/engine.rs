use tracing::{debug, instrument, trace, warn};

use super::{
	new_anchor_id,
	content::{Element, RenderedContent},
	path::StructuralPath,
	range::{document_order_key, strip_markers, surround_contents, Boundary},
	Anchor, AnchorError, AnnotationStore, Annotations, StoreError,
};

const MARKER_TAG: &str = "span";

/// A text selection made by the user on rendered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
	pub start: Boundary,
	pub end: Boundary,
	/// Selected text as the host reported it.
	pub text: String,
}

/// Outcome of one reconstruction pass, anchors listed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconstructReport {
	/// Markers found and removed before applying anchors.
	pub stripped: usize,
	/// In document order.
	pub applied: Vec<String>,
	pub skipped: Vec<String>,
}

/// Builds an anchor for `selection`.
///
/// Markers already present in `content` are accounted for, so the anchor is expressed against
/// the content as it is before any highlight is applied. Boundaries in text nodes are located
/// through their parent element.
pub fn capture_anchor(
	content: &RenderedContent,
	selection: &Selection,
	marker_class: &str,
) -> Result<Anchor, AnchorError> {
	if selection.text.trim().is_empty() {
		return Err(AnchorError::EmptySelection);
	}

	for boundary in [selection.start, selection.end] {
		if !content.is_attached(boundary.node) {
			return Err(AnchorError::OutsideContent);
		}
	}

	let mut plain = content.clone();
	let mut tracked = [selection.start, selection.end];
	strip_markers(&mut plain, marker_class, &mut tracked);
	let [start, end] = tracked;

	let locate = |boundary: Boundary| {
		StructuralPath::locate(&plain, boundary.node).map_err(|_| AnchorError::OutsideContent)
	};
	let start_path = locate(start)?;
	let end_path = locate(end)?;

	Ok(Anchor {
		id: new_anchor_id(),
		text: selection.text.clone(),
		start_path: start_path.to_string(),
		end_path: end_path.to_string(),
		start_offset: start.offset,
		end_offset: end.offset,
	})
}

/// Resolves one end of an anchor: the first text child of the element at `path`, or the element
/// itself when it holds no text.
fn resolve_boundary(
	content: &RenderedContent,
	path: &str,
	offset: usize,
) -> Result<Boundary, AnchorError> {
	let path = path.parse::<StructuralPath>()?;
	let element = path
		.resolve(content)
		.ok_or_else(|| AnchorError::Unresolved(path.to_string()))?;
	let container = content.first_text_child(element).unwrap_or(element);

	Ok(Boundary::new(container, offset))
}

fn resolve_anchor(
	content: &RenderedContent,
	anchor: &Anchor,
) -> Result<(Boundary, Boundary), AnchorError> {
	Ok((
		resolve_boundary(content, &anchor.start_path, anchor.start_offset)?,
		resolve_boundary(content, &anchor.end_path, anchor.end_offset)?,
	))
}

/// Strips previous markers from `content` and wraps every anchor that still fits it.
///
/// Running this again on the same content yields the same result. All anchors are resolved
/// before any wrapping and applied from the last one in document order to the first, so
/// wrapping never shifts an anchor that is still to be applied.
pub fn reconstruct_anchors(
	content: &mut RenderedContent,
	anchors: &[Anchor],
	marker_class: &str,
) -> ReconstructReport {
	let mut report = ReconstructReport {
		stripped: strip_markers(content, marker_class, &mut []),
		..Default::default()
	};

	let mut resolved = Vec::with_capacity(anchors.len());
	for anchor in anchors {
		match resolve_anchor(content, anchor) {
			Ok((start, end)) => {
				if let Some(key) = document_order_key(content, start) {
					resolved.push((key, anchor, start, end));
				} else {
					report.skipped.push(anchor.id.clone());
				}
			}
			Err(e) => {
				debug!(anchor_id = %anchor.id, "Skipping anchor: {e:#}");
				report.skipped.push(anchor.id.clone());
			}
		}
	}

	resolved.sort_by(|(a, ..), (b, ..)| b.cmp(a));

	for (_, anchor, start, end) in resolved {
		let marker = Element::new(MARKER_TAG)
			.with_id(&anchor.id)
			.with_class(marker_class);

		match surround_contents(content, start, end, marker) {
			Ok(_) => {
				trace!(anchor_id = %anchor.id, "Applied anchor");
				report.applied.push(anchor.id.clone());
			}
			Err(e) => {
				debug!(anchor_id = %anchor.id, "Skipping anchor: {e:#}");
				report.skipped.push(anchor.id.clone());
			}
		}
	}

	report.applied.reverse();
	report
}

/// Highlight lifecycle of a workspace session, on top of its [`AnnotationStore`].
#[derive(Debug)]
pub struct AnchorEngine {
	store: AnnotationStore,
	marker_class: String,
}

impl AnchorEngine {
	pub fn new(store: AnnotationStore, marker_class: impl Into<String>) -> Self {
		Self {
			store,
			marker_class: marker_class.into(),
		}
	}

	#[must_use]
	pub const fn store(&self) -> &AnnotationStore {
		&self.store
	}

	#[must_use]
	pub fn marker_class(&self) -> &str {
		&self.marker_class
	}

	/// Captures `selection` and appends the new anchor to the highlights of `document`.
	///
	/// On [`AnchorError::Persist`] after a failed write, the anchor is still part of the
	/// in-memory highlights. When the stored highlights couldn't be read, nothing changes.
	#[instrument(skip(self, content, selection), err)]
	pub async fn capture(
		&self,
		document: &str,
		content: &RenderedContent,
		selection: &Selection,
	) -> Result<Anchor, AnchorError> {
		let anchor = capture_anchor(content, selection, &self.marker_class)?;

		self.store
			.append_highlight(document, anchor.clone())
			.await
			.map_err(|source| AnchorError::Persist {
				anchor_id: anchor.id.clone(),
				source,
			})?;

		debug!(anchor_id = %anchor.id, "Captured highlight");

		Ok(anchor)
	}

	pub async fn highlights(&self, document: &str) -> Vec<Anchor> {
		self.store.load(document).await.highlights
	}

	pub async fn annotations(&self, document: &str) -> Annotations {
		self.store.load(document).await
	}

	pub async fn remove_highlight(
		&self,
		document: &str,
		anchor_id: &str,
	) -> Result<bool, StoreError> {
		self.store.remove_highlight(document, anchor_id).await
	}

	/// Re-applies the stored highlights of `document` on freshly rendered `content`.
	pub async fn reconstruct(
		&self,
		document: &str,
		content: &mut RenderedContent,
	) -> ReconstructReport {
		let highlights = self.highlights(document).await;
		let report = reconstruct_anchors(content, &highlights, &self.marker_class);

		if !report.skipped.is_empty() {
			warn!(
				%document,
				skipped = report.skipped.len(),
				applied = report.applied.len(),
				"Some highlights don't match the current content"
			);
		}

		report
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::annotations::{
		KeyValueBackend, MemoryBackend, NodeData, NodeId, DEFAULT_HIGHLIGHT_CLASS,
	};

	use std::sync::Arc;

	use pretty_assertions::assert_eq;

	const CLASS: &str = DEFAULT_HIGHLIGHT_CLASS;

	fn render(paragraphs: &[&str]) -> RenderedContent {
		let mut content = RenderedContent::new();
		let root = content.root();
		for text in paragraphs {
			let p = content.append_element(root, Element::new("p"));
			content.append_text(p, *text);
		}
		content
	}

	fn engine(backend: &Arc<MemoryBackend>, key_prefix: &str) -> AnchorEngine {
		let backend = Arc::clone(backend) as Arc<dyn KeyValueBackend>;
		AnchorEngine::new(AnnotationStore::new(backend, key_prefix), CLASS)
	}

	fn text_of(content: &RenderedContent, nth: usize) -> NodeId {
		let p = content.children(content.root())[nth];
		content.children(p)[0]
	}

	fn select(content: &RenderedContent, nth: usize, from: usize, to: usize) -> Selection {
		let node = text_of(content, nth);
		let text = content.text(node).unwrap();
		Selection {
			start: Boundary::new(node, from),
			end: Boundary::new(node, to),
			text: text.chars().skip(from).take(to - from).collect(),
		}
	}

	fn marker_html(id: &str, text: &str) -> String {
		format!(r#"<span id="{id}" class="highlight">{text}</span>"#)
	}

	#[test]
	fn capture_records_paths_and_offsets() {
		let content = render(&["intro", "hello brave world"]);

		let anchor = capture_anchor(&content, &select(&content, 1, 6, 11), CLASS).unwrap();

		assert_eq!(anchor.text, "brave");
		assert_eq!(anchor.start_path, "P:nth-child(2)");
		assert_eq!(anchor.end_path, "P:nth-child(2)");
		assert_eq!((anchor.start_offset, anchor.end_offset), (6, 11));
	}

	#[test]
	fn capture_rejects_blank_and_foreign_selections() {
		let mut content = render(&["hello"]);
		let mut blank = select(&content, 0, 0, 1);
		blank.text = "  \n".to_string();

		assert!(matches!(
			capture_anchor(&content, &blank, CLASS),
			Err(AnchorError::EmptySelection)
		));

		let detached = content.create(NodeData::Text("lost".to_string()));
		let foreign = Selection {
			start: Boundary::new(detached, 0),
			end: Boundary::new(detached, 4),
			text: "lost".to_string(),
		};
		assert!(matches!(
			capture_anchor(&content, &foreign, CLASS),
			Err(AnchorError::OutsideContent)
		));
	}

	#[test]
	fn capture_rejects_nodes_of_other_content() {
		let larger = render(&["one", "two", "three"]);
		let small = render(&["one"]);
		let foreign = select(&larger, 2, 0, 3);

		assert!(matches!(
			capture_anchor(&small, &foreign, CLASS),
			Err(AnchorError::OutsideContent)
		));
	}

	#[test]
	fn round_trip_is_idempotent() {
		let mut content = render(&["intro", "hello brave world"]);
		let anchor = capture_anchor(&content, &select(&content, 1, 6, 11), CLASS).unwrap();
		let anchors = vec![anchor.clone()];

		let first = reconstruct_anchors(&mut content, &anchors, CLASS);
		let once = content.to_string();
		let second = reconstruct_anchors(&mut content, &anchors, CLASS);

		let expected = format!(
			"<p>intro</p><p>hello {} world</p>",
			marker_html(&anchor.id, "brave")
		);
		assert_eq!(once, expected);
		assert_eq!(content.to_string(), expected);
		assert_eq!(first.applied, vec![anchor.id.clone()]);
		assert_eq!(first.stripped, 0);
		assert_eq!(second.stripped, 1);
		assert_eq!(content.find_by_class(CLASS).len(), 1);
	}

	#[test]
	fn capture_on_highlighted_content_ignores_existing_markers() {
		let mut content = render(&["hello brave world"]);
		let first = capture_anchor(&content, &select(&content, 0, 6, 11), CLASS).unwrap();
		reconstruct_anchors(&mut content, &[first.clone()], CLASS);

		// "world" now lives in the text node after the first marker.
		let p = content.children(content.root())[0];
		let tail = content.children(p)[2];
		let second = capture_anchor(
			&content,
			&Selection {
				start: Boundary::new(tail, 1),
				end: Boundary::new(tail, 6),
				text: "world".to_string(),
			},
			CLASS,
		)
		.unwrap();

		assert_eq!((second.start_offset, second.end_offset), (12, 17));

		let report = reconstruct_anchors(&mut content, &[second.clone(), first.clone()], CLASS);

		assert_eq!(report.applied, vec![first.id.clone(), second.id.clone()]);
		assert_eq!(
			content.to_string(),
			format!(
				"<p>hello {} {}</p>",
				marker_html(&first.id, "brave"),
				marker_html(&second.id, "world")
			)
		);
	}

	#[test]
	fn structure_change_skips_without_failing() {
		let mut content = render(&["hello brave world"]);
		let anchor = capture_anchor(&content, &select(&content, 0, 6, 11), CLASS).unwrap();

		let mut changed = RenderedContent::new();
		let root = changed.root();
		let h1 = changed.append_element(root, Element::new("h1"));
		changed.append_text(h1, "New title");
		let p = changed.append_element(root, Element::new("p"));
		changed.append_text(p, "hello brave world");

		let report = reconstruct_anchors(&mut changed, &[anchor.clone()], CLASS);

		assert_eq!(report.skipped, vec![anchor.id.clone()]);
		assert!(report.applied.is_empty());
		assert_eq!(changed.to_string(), "<h1>New title</h1><p>hello brave world</p>");

		// Still usable once the shape matches again.
		let report = reconstruct_anchors(&mut content, &[anchor.clone()], CLASS);
		assert_eq!(report.applied, vec![anchor.id]);
	}

	#[test]
	fn one_bad_anchor_does_not_stop_the_others() {
		let mut content = render(&["short", "hello brave world"]);
		let good = capture_anchor(&content, &select(&content, 1, 0, 5), CLASS).unwrap();
		let out_of_range = Anchor {
			id: "highlight-out-of-range".to_string(),
			start_path: "P:nth-child(1)".to_string(),
			end_path: "P:nth-child(1)".to_string(),
			start_offset: 2,
			end_offset: 40,
			..good.clone()
		};
		let garbage = Anchor {
			id: "highlight-garbage".to_string(),
			start_path: "not a path".to_string(),
			..good.clone()
		};

		let report = reconstruct_anchors(
			&mut content,
			&[out_of_range.clone(), garbage.clone(), good.clone()],
			CLASS,
		);

		assert_eq!(report.applied, vec![good.id.clone()]);
		assert_eq!(report.skipped.len(), 2);
		assert!(report.skipped.contains(&out_of_range.id));
		assert!(report.skipped.contains(&garbage.id));
		assert_eq!(
			content.to_string(),
			format!("<p>short</p><p>{} brave world</p>", marker_html(&good.id, "hello"))
		);
	}

	#[tokio::test]
	async fn engine_persists_and_reconstructs() {
		let backend = Arc::new(MemoryBackend::new());
		let engine = engine(&backend, "md-annotations-");

		let mut content = render(&["hello brave world"]);
		let anchor = engine
			.capture("notes/a.md", &content, &select(&content, 0, 6, 11))
			.await
			.unwrap();

		assert!(backend.raw("md-annotations-notes/a.md").is_some());
		assert_eq!(engine.highlights("notes/a.md").await, vec![anchor.clone()]);
		assert!(engine.highlights("notes/b.md").await.is_empty());

		let report = engine.reconstruct("notes/a.md", &mut content).await;
		assert_eq!(report.applied, vec![anchor.id.clone()]);

		assert!(engine.remove_highlight("notes/a.md", &anchor.id).await.unwrap());
		let report = engine.reconstruct("notes/a.md", &mut content).await;
		assert_eq!(report.stripped, 1);
		assert!(report.applied.is_empty());
		assert_eq!(content.to_string(), "<p>hello brave world</p>");
	}

	#[tokio::test]
	async fn persistence_failure_keeps_the_anchor_in_memory() {
		let backend = Arc::new(MemoryBackend::new());
		backend.set_read_only(true);
		let engine = engine(&backend, "p-");

		let content = render(&["hello brave world"]);
		let err = engine
			.capture("a.md", &content, &select(&content, 0, 0, 5))
			.await
			.unwrap_err();

		let anchor_id = match err {
			AnchorError::Persist { anchor_id, .. } => anchor_id,
			other => panic!("unexpected error: {other:?}"),
		};
		assert_eq!(
			engine
				.highlights("a.md")
				.await
				.into_iter()
				.map(|anchor| anchor.id)
				.collect::<Vec<_>>(),
			vec![anchor_id]
		);
	}
}
