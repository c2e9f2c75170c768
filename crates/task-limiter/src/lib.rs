//!
//! # Task Limiter
//!
//! A small gate that bounds how many futures run at the same time. Every future handed to
//! [`ConcurrencyLimiter::enqueue`] is spawned on the tokio runtime right away, but it only starts
//! executing once it holds one of the limiter's slots. Slots are handed out in strict FIFO order,
//! the queue position being fixed at the moment of the `enqueue` call.
//!
//! Each enqueued future resolves independently: a failing task never affects its siblings, and
//! aggregating results (and deciding if one failure aborts a batch) is up to the caller.
//!
//! ## Basic example
//!
//! ```
//! use md_task_limiter::ConcurrencyLimiter;
//!
//! #[tokio::main]
//! async fn main() {
//!     let limiter = ConcurrencyLimiter::new(2);
//!
//!     let handles = (0..5)
//!         .map(|i| limiter.enqueue(async move { i * 2 }))
//!         .collect::<Vec<_>>();
//!
//!     let mut results = Vec::with_capacity(handles.len());
//!     for handle in handles {
//!         results.push(handle.await.unwrap());
//!     }
//!
//!     assert_eq!(results, vec![0, 2, 4, 6, 8]);
//! }
//! ```

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

mod error;
mod limiter;

pub use error::Error as LimiterError;
pub use limiter::{ConcurrencyLimiter, LimitedTask, DEFAULT_MAX_CONCURRENCY};
