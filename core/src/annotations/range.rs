//! Live ranges over [`RenderedContent`] and the two mutations the anchor engine performs on
//! it: wrapping a range in a marker element and stripping markers back out.

use thiserror::Error;

use super::content::{Element, NodeData, NodeId, RenderedContent};

/// A point in the content: a character offset in a text node, or a child index in an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
	pub node: NodeId,
	pub offset: usize,
}

impl Boundary {
	#[must_use]
	pub const fn new(node: NodeId, offset: usize) -> Self {
		Self { node, offset }
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
	#[error("boundary offset out of bounds: <offset={offset}, length={len}>")]
	IndexSize { offset: usize, len: usize },
	#[error("boundary is not inside the rendered content")]
	Detached,
	#[error("range end comes before its start")]
	Reversed,
	#[error("range partially selects an element")]
	PartialSelection,
}

/// Where a boundary sits among the children of the node that will receive the marker.
struct ParentPoint {
	parent: NodeId,
	index: usize,
	text_offset: Option<usize>,
}

impl ParentPoint {
	const fn order_key(&self) -> (usize, usize) {
		match self.text_offset {
			Some(offset) => (self.index, offset),
			None => (self.index, 0),
		}
	}
}

fn check(content: &RenderedContent, boundary: Boundary) -> Result<(), RangeError> {
	if !content.is_attached(boundary.node) {
		return Err(RangeError::Detached);
	}

	let len = content.len(boundary.node);
	if boundary.offset > len {
		return Err(RangeError::IndexSize {
			offset: boundary.offset,
			len,
		});
	}

	Ok(())
}

fn parent_point(content: &RenderedContent, boundary: Boundary) -> Result<ParentPoint, RangeError> {
	if content.is_text(boundary.node) {
		let parent = content.parent(boundary.node).ok_or(RangeError::Detached)?;
		let index = content
			.index_in_parent(boundary.node)
			.ok_or(RangeError::Detached)?;

		Ok(ParentPoint {
			parent,
			index,
			text_offset: Some(boundary.offset),
		})
	} else {
		Ok(ParentPoint {
			parent: boundary.node,
			index: boundary.offset,
			text_offset: None,
		})
	}
}

/// Child index just past the boundary once its text node, if any, has been split there.
fn split_at(content: &mut RenderedContent, point: &ParentPoint, node: NodeId) -> (usize, bool) {
	match point.text_offset {
		None | Some(0) => (point.index, false),
		Some(offset) if offset >= content.len(node) => (point.index + 1, false),
		Some(offset) => {
			let split = content.split_text(node, offset).is_some();
			(point.index + 1, split)
		}
	}
}

/// Moves everything between `start` and `end` into a new `wrapper` element put in their place.
///
/// Both boundaries must share the same parent once text containers are accounted for, a range
/// that would cut through an element is rejected. Returns the id of the inserted wrapper.
pub fn surround_contents(
	content: &mut RenderedContent,
	start: Boundary,
	end: Boundary,
	wrapper: Element,
) -> Result<NodeId, RangeError> {
	check(content, start)?;
	check(content, end)?;

	let start_point = parent_point(content, start)?;
	let end_point = parent_point(content, end)?;

	if start_point.parent != end_point.parent {
		return Err(RangeError::PartialSelection);
	}
	if start_point.order_key() > end_point.order_key() {
		return Err(RangeError::Reversed);
	}

	let parent = start_point.parent;

	// End first, a split there never moves the start.
	let (mut end_index, _) = split_at(content, &end_point, end.node);
	let (start_index, split) = split_at(content, &start_point, start.node);
	if split {
		end_index += 1;
	}

	let moved = content.children(parent)[start_index..end_index].to_vec();
	let wrapper = content.create(NodeData::Element(wrapper));
	for node in moved {
		content.append_child(wrapper, node);
	}
	content.insert_child(parent, start_index, wrapper);

	Ok(wrapper)
}

/// Unwraps every element carrying `class`, moving its children up in its place, then
/// normalizes text. `tracked` boundaries are kept pointing at the same content throughout.
///
/// Returns how many markers were removed.
pub fn strip_markers(
	content: &mut RenderedContent,
	class: &str,
	tracked: &mut [Boundary],
) -> usize {
	let markers = content.find_by_class(class);

	for &marker in &markers {
		let (Some(parent), Some(index)) = (content.parent(marker), content.index_in_parent(marker))
		else {
			continue;
		};

		let children = content.children(marker).to_vec();
		for boundary in tracked.iter_mut() {
			if boundary.node == marker {
				*boundary = Boundary::new(parent, index + boundary.offset);
			} else if boundary.node == parent && boundary.offset > index {
				boundary.offset = boundary.offset + children.len() - 1;
			}
		}

		content.detach(marker);
		for (k, child) in children.into_iter().enumerate() {
			content.insert_child(parent, index + k, child);
		}
	}

	let root = content.root();
	normalize(content, root, tracked);

	markers.len()
}

/// Drops empty text nodes and merges runs of adjacent text nodes under `node`.
pub fn normalize(content: &mut RenderedContent, node: NodeId, tracked: &mut [Boundary]) {
	for id in content.descendants(node) {
		if !content.is_text(id) {
			continue;
		}
		let (Some(parent), Some(index)) = (content.parent(id), content.index_in_parent(id)) else {
			// Already merged into a previous sibling.
			continue;
		};

		let mut len = content.len(id);
		if len == 0 {
			remove_tracked(content, id, parent, index, tracked);
			continue;
		}

		while let Some(&next) = content.children(parent).get(index + 1) {
			let Some(tail) = content.text(next).map(ToString::to_string) else {
				break;
			};

			for boundary in tracked.iter_mut() {
				if boundary.node == next {
					*boundary = Boundary::new(id, len + boundary.offset);
				} else if boundary.node == parent && boundary.offset == index + 1 {
					*boundary = Boundary::new(id, len);
				}
			}

			if let Some(text) = content.text_mut(id) {
				text.push_str(&tail);
			}
			len += tail.chars().count();
			remove_tracked(content, next, parent, index + 1, tracked);
		}
	}
}

fn remove_tracked(
	content: &mut RenderedContent,
	id: NodeId,
	parent: NodeId,
	index: usize,
	tracked: &mut [Boundary],
) {
	for boundary in tracked.iter_mut() {
		if boundary.node == id {
			*boundary = Boundary::new(parent, index);
		} else if boundary.node == parent && boundary.offset > index {
			boundary.offset -= 1;
		}
	}

	content.detach(id);
}

/// Sort key putting boundaries in document order, `None` for detached nodes.
#[must_use]
pub fn document_order_key(
	content: &RenderedContent,
	boundary: Boundary,
) -> Option<(Vec<usize>, usize)> {
	let mut path = Vec::new();
	let mut current = boundary.node;
	while current != content.root() {
		path.push(content.index_in_parent(current)?);
		current = content.parent(current)?;
	}
	path.reverse();

	if content.is_text(boundary.node) {
		Some((path, boundary.offset))
	} else {
		path.push(boundary.offset);
		Some((path, 0))
	}
}
