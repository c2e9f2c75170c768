//! # Rendered content
//!
//! Rendered markdown is handed to the anchor engine as a small element/text tree. Nodes live in
//! an arena and are addressed by [`NodeId`]s, which stay valid for the whole life of a
//! [`RenderedContent`]; nodes removed from the tree are only detached, never freed.
//!
//! Ids are only meaningful for the content that created them. Accessors panic on an id from
//! another content, except [`RenderedContent::contains`] and [`RenderedContent::is_attached`],
//! which tell such ids apart.

use std::fmt::{self, Write as _};

/// Identifies a node in the arena.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
	/// # Panics
	/// Panics if the arena outgrows `u32` indices.
	fn from_usize(index: usize) -> Self {
		assert!(
			index < u32::MAX as usize,
			"NodeId overflow: index {index} exceeds maximum"
		);
		#[allow(clippy::cast_possible_truncation)]
		Self(index as u32)
	}

	const fn as_usize(self) -> usize {
		self.0 as usize
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
	tag: String,
	id: Option<String>,
	classes: Vec<String>,
}

impl Element {
	/// Tag names are stored uppercase, the way rendered HTML reports them.
	#[must_use]
	pub fn new(tag: &str) -> Self {
		Self {
			tag: tag.to_ascii_uppercase(),
			id: None,
			classes: Vec::new(),
		}
	}

	#[must_use]
	pub fn with_id(mut self, id: impl Into<String>) -> Self {
		self.id = Some(id.into());
		self
	}

	#[must_use]
	pub fn with_class(mut self, class: impl Into<String>) -> Self {
		self.classes.push(class.into());
		self
	}

	#[must_use]
	pub fn tag(&self) -> &str {
		&self.tag
	}

	#[must_use]
	pub fn id(&self) -> Option<&str> {
		self.id.as_deref()
	}

	#[must_use]
	pub fn classes(&self) -> &[String] {
		&self.classes
	}

	#[must_use]
	pub fn has_class(&self, class: &str) -> bool {
		self.classes.iter().any(|c| c == class)
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
	Element(Element),
	Text(String),
}

#[derive(Debug, Clone)]
struct Node {
	data: NodeData,
	parent: Option<NodeId>,
	children: Vec<NodeId>,
}

/// Tree of rendered content, rooted at the content container.
#[derive(Debug, Clone)]
pub struct RenderedContent {
	nodes: Vec<Node>,
	root: NodeId,
}

impl Default for RenderedContent {
	fn default() -> Self {
		Self::new()
	}
}

impl RenderedContent {
	/// Empty content under a `DIV` root.
	#[must_use]
	pub fn new() -> Self {
		Self::with_root(Element::new("div"))
	}

	#[must_use]
	pub fn with_root(root: Element) -> Self {
		Self {
			nodes: vec![Node {
				data: NodeData::Element(root),
				parent: None,
				children: Vec::new(),
			}],
			root: NodeId(0),
		}
	}

	#[must_use]
	pub const fn root(&self) -> NodeId {
		self.root
	}

	fn node(&self, id: NodeId) -> &Node {
		&self.nodes[id.as_usize()]
	}

	fn node_mut(&mut self, id: NodeId) -> &mut Node {
		&mut self.nodes[id.as_usize()]
	}

	/// Creates a detached node.
	pub fn create(&mut self, data: NodeData) -> NodeId {
		let id = NodeId::from_usize(self.nodes.len());
		self.nodes.push(Node {
			data,
			parent: None,
			children: Vec::new(),
		});
		id
	}

	pub fn append_element(&mut self, parent: NodeId, element: Element) -> NodeId {
		let id = self.create(NodeData::Element(element));
		self.append_child(parent, id);
		id
	}

	pub fn append_text(&mut self, parent: NodeId, text: impl Into<String>) -> NodeId {
		let id = self.create(NodeData::Text(text.into()));
		self.append_child(parent, id);
		id
	}

	pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
		let index = self.node(parent).children.len();
		self.insert_child(parent, index, child);
	}

	/// Inserts `child` at `index` among the children of `parent`, detaching it first.
	pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
		self.detach(child);
		let children = &mut self.node_mut(parent).children;
		let index = index.min(children.len());
		children.insert(index, child);
		self.node_mut(child).parent = Some(parent);
	}

	/// Removes `id` from its parent, keeping its own subtree intact.
	pub fn detach(&mut self, id: NodeId) {
		if let Some(parent) = self.node_mut(id).parent.take() {
			self.node_mut(parent).children.retain(|&child| child != id);
		}
	}

	#[must_use]
	pub fn data(&self, id: NodeId) -> &NodeData {
		&self.node(id).data
	}

	#[must_use]
	pub fn element(&self, id: NodeId) -> Option<&Element> {
		match &self.node(id).data {
			NodeData::Element(element) => Some(element),
			NodeData::Text(_) => None,
		}
	}

	#[must_use]
	pub fn text(&self, id: NodeId) -> Option<&str> {
		match &self.node(id).data {
			NodeData::Text(text) => Some(text),
			NodeData::Element(_) => None,
		}
	}

	pub(crate) fn text_mut(&mut self, id: NodeId) -> Option<&mut String> {
		match &mut self.node_mut(id).data {
			NodeData::Text(text) => Some(text),
			NodeData::Element(_) => None,
		}
	}

	#[must_use]
	pub fn is_text(&self, id: NodeId) -> bool {
		matches!(self.node(id).data, NodeData::Text(_))
	}

	#[must_use]
	pub fn parent(&self, id: NodeId) -> Option<NodeId> {
		self.node(id).parent
	}

	#[must_use]
	pub fn children(&self, id: NodeId) -> &[NodeId] {
		&self.node(id).children
	}

	/// Element children only, in order.
	pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
		self.children(id)
			.iter()
			.copied()
			.filter(|&child| !self.is_text(child))
	}

	#[must_use]
	pub fn first_text_child(&self, id: NodeId) -> Option<NodeId> {
		self.children(id)
			.iter()
			.copied()
			.find(|&child| self.is_text(child))
	}

	#[must_use]
	pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
		let parent = self.parent(id)?;
		self.children(parent).iter().position(|&child| child == id)
	}

	/// `true` when `id` was created by this content, attached or not.
	#[must_use]
	pub fn contains(&self, id: NodeId) -> bool {
		id.as_usize() < self.nodes.len()
	}

	/// `true` when `id` is the root or one of its descendants.
	#[must_use]
	pub fn is_attached(&self, id: NodeId) -> bool {
		let mut current = id;
		loop {
			if current == self.root {
				return true;
			}
			match self.nodes.get(current.as_usize()).and_then(|node| node.parent) {
				Some(parent) => current = parent,
				None => return false,
			}
		}
	}

	/// Boundary length of a node: characters for text, children for elements.
	#[must_use]
	pub fn len(&self, id: NodeId) -> usize {
		match &self.node(id).data {
			NodeData::Text(text) => text.chars().count(),
			NodeData::Element(_) => self.node(id).children.len(),
		}
	}

	/// Descendants of `id` in document order, `id` excluded.
	#[must_use]
	pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
		let mut out = Vec::new();
		let mut stack = self.children(id).iter().rev().copied().collect::<Vec<_>>();

		while let Some(current) = stack.pop() {
			out.push(current);
			stack.extend(self.children(current).iter().rev().copied());
		}

		out
	}

	#[must_use]
	pub fn text_content(&self, id: NodeId) -> String {
		if let Some(text) = self.text(id) {
			return text.to_string();
		}

		self.descendants(id)
			.into_iter()
			.filter_map(|node| self.text(node))
			.collect()
	}

	/// Attached elements carrying `class`, in document order.
	#[must_use]
	pub fn find_by_class(&self, class: &str) -> Vec<NodeId> {
		self.descendants(self.root)
			.into_iter()
			.filter(|&node| self.element(node).is_some_and(|el| el.has_class(class)))
			.collect()
	}

	#[must_use]
	pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
		self.descendants(self.root)
			.into_iter()
			.find(|&node| self.element(node).and_then(Element::id) == Some(id))
	}

	/// Splits a text node at a character offset, the tail becoming a new next sibling.
	///
	/// Returns `None` for elements and out of range offsets.
	pub(crate) fn split_text(&mut self, id: NodeId, offset: usize) -> Option<NodeId> {
		let text = self.text(id)?;
		let byte_offset = char_to_byte(text, offset)?;

		let tail = self.text_mut(id)?.split_off(byte_offset);
		let new = self.create(NodeData::Text(tail));

		if let (Some(parent), Some(index)) = (self.parent(id), self.index_in_parent(id)) {
			self.insert_child(parent, index + 1, new);
		}

		Some(new)
	}

	/// Serializes the children of `id` as HTML.
	#[must_use]
	pub fn inner_html(&self, id: NodeId) -> String {
		let mut out = String::new();
		for &child in self.children(id) {
			self.write_html(child, &mut out);
		}
		out
	}

	fn write_html(&self, id: NodeId, out: &mut String) {
		match &self.node(id).data {
			NodeData::Text(text) => escape_into(text, out),
			NodeData::Element(element) => {
				let tag = element.tag.to_ascii_lowercase();
				out.push('<');
				out.push_str(&tag);
				if let Some(id) = &element.id {
					out.push_str(" id=\"");
					escape_into(id, out);
					out.push('"');
				}
				if !element.classes.is_empty() {
					out.push_str(" class=\"");
					escape_into(&element.classes.join(" "), out);
					out.push('"');
				}
				out.push('>');
				for &child in self.children(id) {
					self.write_html(child, out);
				}
				let _ = write!(out, "</{tag}>");
			}
		}
	}
}

impl fmt::Display for RenderedContent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.inner_html(self.root))
	}
}

/// Byte index of the `offset`-th character, the string length standing for one past the end.
fn char_to_byte(text: &str, offset: usize) -> Option<usize> {
	text.char_indices()
		.map(|(idx, _)| idx)
		.chain(std::iter::once(text.len()))
		.nth(offset)
}

fn escape_into(text: &str, out: &mut String) {
	for c in text.chars() {
		match c {
			'&' => out.push_str("&amp;"),
			'<' => out.push_str("&lt;"),
			'>' => out.push_str("&gt;"),
			'"' => out.push_str("&quot;"),
			c => out.push(c),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	use pretty_assertions::assert_eq;

	fn sample() -> (RenderedContent, NodeId, NodeId) {
		let mut content = RenderedContent::new();
		let root = content.root();
		let h1 = content.append_element(root, Element::new("h1"));
		content.append_text(h1, "Title");
		let p = content.append_element(root, Element::new("p"));
		let text = content.append_text(p, "héllo world");
		content.append_element(p, Element::new("em").with_class("note"));

		(content, p, text)
	}

	#[test]
	fn builds_and_serializes() {
		let (content, _, _) = sample();

		assert_eq!(
			content.to_string(),
			r#"<h1>Title</h1><p>héllo world<em class="note"></em></p>"#
		);
	}

	#[test]
	fn text_content_and_lengths() {
		let (content, p, text) = sample();

		assert_eq!(content.text_content(content.root()), "Titlehéllo world");
		assert_eq!(content.len(text), 11);
		assert_eq!(content.len(p), 2);
		assert_eq!(content.first_text_child(p), Some(text));
		assert_eq!(content.find_by_class("note").len(), 1);
	}

	#[test]
	fn split_counts_characters() {
		let (mut content, p, text) = sample();

		let tail = content.split_text(text, 2).unwrap();

		assert_eq!(content.text(text), Some("hé"));
		assert_eq!(content.text(tail), Some("llo world"));
		assert_eq!(content.index_in_parent(tail), Some(1));
		assert_eq!(content.children(p).len(), 3);
		assert!(content.split_text(text, 3).is_none());
	}

	#[test]
	fn detached_nodes_are_not_attached() {
		let (mut content, p, text) = sample();

		content.detach(p);

		assert!(!content.is_attached(p));
		assert!(!content.is_attached(text));
		assert!(content.is_attached(content.root()));
		assert_eq!(content.to_string(), "<h1>Title</h1>");
	}

	#[test]
	fn ids_from_larger_content_are_unknown() {
		let (mut larger, _, _) = sample();
		let foreign = larger.append_text(larger.root(), "only here");
		let small = RenderedContent::new();

		assert!(!small.contains(foreign));
		assert!(!small.is_attached(foreign));
		assert!(small.contains(small.root()));
	}

	#[test]
	fn escapes_markup() {
		let mut content = RenderedContent::new();
		let root = content.root();
		content.append_text(root, "a < b & \"c\"");

		assert_eq!(content.to_string(), "a &lt; b &amp; &quot;c&quot;");
	}
}
