use std::{fmt, str::FromStr};

use thiserror::Error;

use super::content::{NodeId, RenderedContent};

/// Stands for the content root itself.
pub const ROOT_TOKEN: &str = ":scope";

const SEPARATOR: &str = " > ";
const NTH_CHILD: &str = ":nth-child(";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
	#[error("node is not inside the rendered content")]
	NotUnderRoot,
	#[error("malformed structural path segment: <segment='{0}'>")]
	MalformedSegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
	tag: String,
	nth_child: usize,
}

impl PathSegment {
	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	/// 1-based position among element siblings.
	#[must_use]
	pub const fn nth_child(&self) -> usize {
		self.nth_child
	}
}

impl fmt::Display for PathSegment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}{NTH_CHILD}{})", self.tag, self.nth_child)
	}
}

impl FromStr for PathSegment {
	type Err = PathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let malformed = || PathError::MalformedSegment(s.to_string());

		let (tag, rest) = s.split_once(NTH_CHILD).ok_or_else(malformed)?;
		let nth_child = rest
			.strip_suffix(')')
			.and_then(|n| n.trim().parse::<usize>().ok())
			.filter(|&n| n > 0)
			.ok_or_else(malformed)?;

		if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
			return Err(malformed());
		}

		Ok(Self {
			tag: tag.to_ascii_uppercase(),
			nth_child,
		})
	}
}

/// Locator of an element relative to the content root, e.g. `UL:nth-child(2) > LI:nth-child(3)`.
///
/// Only meaningful against content of the exact shape that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuralPath {
	segments: Vec<PathSegment>,
}

impl StructuralPath {
	#[must_use]
	pub const fn root() -> Self {
		Self {
			segments: Vec::new(),
		}
	}

	#[must_use]
	pub fn is_root(&self) -> bool {
		self.segments.is_empty()
	}

	#[must_use]
	pub fn segments(&self) -> &[PathSegment] {
		&self.segments
	}

	/// Path of `node`, walking up to the content root. A text node is located through its
	/// parent element.
	pub fn locate(content: &RenderedContent, node: NodeId) -> Result<Self, PathError> {
		let mut current = if content.is_text(node) {
			content.parent(node).ok_or(PathError::NotUnderRoot)?
		} else {
			node
		};

		let mut segments = Vec::new();
		while current != content.root() {
			let parent = content.parent(current).ok_or(PathError::NotUnderRoot)?;
			let element = content.element(current).ok_or(PathError::NotUnderRoot)?;
			let nth_child = 1 + content
				.element_children(parent)
				.take_while(|&sibling| sibling != current)
				.count();

			segments.push(PathSegment {
				tag: element.tag().to_string(),
				nth_child,
			});
			current = parent;
		}

		segments.reverse();
		Ok(Self { segments })
	}

	/// Follows the path down from the root, `None` once a segment has no matching child.
	#[must_use]
	pub fn resolve(&self, content: &RenderedContent) -> Option<NodeId> {
		self.segments
			.iter()
			.try_fold(content.root(), |current, segment| {
				content
					.element_children(current)
					.nth(segment.nth_child - 1)
					.filter(|&child| {
						content
							.element(child)
							.is_some_and(|el| el.tag().eq_ignore_ascii_case(&segment.tag))
					})
			})
	}
}

impl fmt::Display for StructuralPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.segments.is_empty() {
			return f.write_str(ROOT_TOKEN);
		}

		for (idx, segment) in self.segments.iter().enumerate() {
			if idx > 0 {
				f.write_str(SEPARATOR)?;
			}
			write!(f, "{segment}")?;
		}

		Ok(())
	}
}

impl FromStr for StructuralPath {
	type Err = PathError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let s = s.trim();
		if s.is_empty() || s == ROOT_TOKEN {
			return Ok(Self::root());
		}

		s.split('>')
			.map(|segment| segment.trim().parse())
			.collect::<Result<_, _>>()
			.map(|segments| Self { segments })
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use crate::annotations::content::{Element, NodeData};

	use pretty_assertions::assert_eq;

	#[test]
	fn locates_elements_and_text() {
		let mut content = RenderedContent::new();
		let root = content.root();
		content.append_element(root, Element::new("h1"));
		content.append_text(root, "\n");
		let ul = content.append_element(root, Element::new("ul"));
		content.append_element(ul, Element::new("li"));
		let li = content.append_element(ul, Element::new("li"));
		let text = content.append_text(li, "second");

		let path = StructuralPath::locate(&content, text).unwrap();

		assert_eq!(path.to_string(), "UL:nth-child(2) > LI:nth-child(2)");
		assert_eq!(path.resolve(&content), Some(li));
		assert_eq!(
			StructuralPath::locate(&content, root).unwrap().to_string(),
			ROOT_TOKEN
		);
	}

	#[test]
	fn parses_what_it_prints() {
		let path = "P:nth-child(3) > EM:nth-child(1)".parse::<StructuralPath>().unwrap();

		assert_eq!(path.segments().len(), 2);
		assert_eq!(path.segments()[0].tag(), "P");
		assert_eq!(path.segments()[1].nth_child(), 1);
		assert_eq!(path.to_string(), "P:nth-child(3) > EM:nth-child(1)");
		assert!(":scope".parse::<StructuralPath>().unwrap().is_root());
	}

	#[test]
	fn rejects_malformed_segments() {
		for raw in [
			"P",
			"P:nth-child(0)",
			"P:nth-child(x)",
			":nth-child(1)",
			"P:nth-child(1) >",
		] {
			assert!(raw.parse::<StructuralPath>().is_err(), "{raw}");
		}
	}

	#[test]
	fn resolution_fails_on_shape_change() {
		let mut content = RenderedContent::new();
		let root = content.root();
		let p = content.append_element(root, Element::new("p"));

		let path = StructuralPath::locate(&content, p).unwrap();
		assert_eq!(path.resolve(&content), Some(p));

		let mut changed = RenderedContent::new();
		let root = changed.root();
		changed.append_element(root, Element::new("h2"));
		changed.append_element(root, Element::new("p"));

		assert_eq!(path.resolve(&changed), None);
		assert_eq!(
			"p:nth-child(2)".parse::<StructuralPath>().unwrap().resolve(&changed),
			changed.children(root).get(1).copied()
		);
	}

	#[test]
	fn detached_nodes_cannot_be_located() {
		let mut content = RenderedContent::new();
		let lonely = content.create(NodeData::Element(Element::new("p")));

		assert_eq!(
			StructuralPath::locate(&content, lonely),
			Err(PathError::NotUnderRoot)
		);
	}
}
