//! # Markdown workspace core
//!
//! The parts of a markdown authoring tool that aren't UI wiring:
//!
//! - [`indexer`] walks a workspace directory with bounded concurrency, applies the user's ignore
//!   rules and splits files into markdown documents and image assets;
//! - [`assets`] maps image references found in documents onto the indexed assets;
//! - [`annotations`] turns text selections on rendered content into persistable anchors and
//!   re-applies them whenever the content is rendered again.
//!
//! [`Workspace`] bundles them into a session over one opened directory.

#![warn(
	clippy::all,
	clippy::pedantic,
	clippy::correctness,
	clippy::perf,
	clippy::style,
	clippy::suspicious,
	clippy::complexity,
	clippy::nursery,
	clippy::unwrap_used,
	unused_qualifications,
	rust_2018_idioms,
	trivial_casts,
	trivial_numeric_casts,
	unused_allocation,
	clippy::unnecessary_cast,
	clippy::cast_lossless,
	clippy::cast_possible_truncation,
	clippy::cast_possible_wrap,
	clippy::cast_precision_loss,
	clippy::cast_sign_loss,
	clippy::dbg_macro,
	clippy::deprecated_cfg_attr,
	clippy::separated_literal_suffix,
	deprecated
)]
#![forbid(deprecated_in_future)]
#![allow(clippy::missing_errors_doc, clippy::module_name_repetitions)]

pub mod annotations;
pub mod assets;
pub mod config;
pub mod indexer;
pub mod logging;
mod workspace;

pub use md_storage as storage;
pub use md_task_limiter as task_limiter;

pub use config::CoreConfig;
pub use workspace::{Workspace, WorkspaceError};
