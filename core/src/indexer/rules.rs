use serde::{Deserialize, Serialize};
use tracing::trace;

pub const DEFAULT_IGNORE_PATTERNS: [&str; 4] = ["node_modules", ".git", "dist", "build"];

/// `true` iff some pattern is a substring of `name`. No pattern at all never ignores anything.
pub fn is_ignored(name: &str, patterns: &[impl AsRef<str>]) -> bool {
	patterns
		.iter()
		.any(|pattern| name.contains(pattern.as_ref()))
}

/// Ordered set of substring patterns tested against entry names (never full paths).
///
/// Empty patterns are dropped on construction as they would match every name, and duplicates
/// are kept only once, at their first position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct IgnoreRuleSet {
	patterns: Vec<String>,
}

impl IgnoreRuleSet {
	#[must_use]
	pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
		let mut rules = Self::empty();
		for pattern in patterns {
			rules.add(pattern);
		}
		rules
	}

	#[must_use]
	pub const fn empty() -> Self {
		Self {
			patterns: Vec::new(),
		}
	}

	#[must_use]
	pub fn is_ignored(&self, name: &str) -> bool {
		let ignored = is_ignored(name, &self.patterns);
		if ignored {
			trace!(%name, "Entry ignored");
		}
		ignored
	}

	/// Appends a pattern, returning `false` if it was empty or already present.
	pub fn add(&mut self, pattern: impl Into<String>) -> bool {
		let pattern = pattern.into();
		if pattern.is_empty() || self.patterns.contains(&pattern) {
			return false;
		}
		self.patterns.push(pattern);
		true
	}

	/// Removes a pattern, returning `false` if it wasn't present.
	pub fn remove(&mut self, pattern: &str) -> bool {
		let before = self.patterns.len();
		self.patterns.retain(|p| p != pattern);
		before != self.patterns.len()
	}

	#[must_use]
	pub fn patterns(&self) -> &[String] {
		&self.patterns
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.patterns.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.patterns.is_empty()
	}
}

impl Default for IgnoreRuleSet {
	fn default() -> Self {
		Self::new(DEFAULT_IGNORE_PATTERNS)
	}
}

impl From<Vec<String>> for IgnoreRuleSet {
	fn from(patterns: Vec<String>) -> Self {
		Self::new(patterns)
	}
}

impl From<IgnoreRuleSet> for Vec<String> {
	fn from(rules: IgnoreRuleSet) -> Self {
		rules.patterns
	}
}
