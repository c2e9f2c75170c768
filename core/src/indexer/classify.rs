use super::FileKind;

pub const MARKDOWN_EXTENSIONS: &[&str] = &["md"];
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "svg", "webp"];

/// Extension-driven, case-insensitive file classification.
#[derive(Debug, Clone)]
pub struct Classifier {
	markdown_suffixes: Vec<String>,
	image_suffixes: Vec<String>,
}

impl Classifier {
	/// Extensions are given without the leading dot.
	#[must_use]
	pub fn new(
		markdown_extensions: impl IntoIterator<Item = impl AsRef<str>>,
		image_extensions: impl IntoIterator<Item = impl AsRef<str>>,
	) -> Self {
		fn suffixes(extensions: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
			extensions
				.into_iter()
				.map(|ext| format!(".{}", ext.as_ref().trim_start_matches('.').to_lowercase()))
				.collect()
		}

		Self {
			markdown_suffixes: suffixes(markdown_extensions),
			image_suffixes: suffixes(image_extensions),
		}
	}

	/// `None` for files that belong to neither list.
	#[must_use]
	pub fn classify(&self, name: &str) -> Option<FileKind> {
		let name = name.to_lowercase();
		let has_suffix = |suffixes: &[String]| suffixes.iter().any(|s| name.ends_with(s.as_str()));

		if has_suffix(&self.markdown_suffixes) {
			Some(FileKind::Markdown)
		} else if has_suffix(&self.image_suffixes) {
			Some(FileKind::Image)
		} else {
			None
		}
	}
}

impl Default for Classifier {
	fn default() -> Self {
		Self::new(MARKDOWN_EXTENSIONS, IMAGE_EXTENSIONS)
	}
}
