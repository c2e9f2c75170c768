use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
	filter::{Directive, LevelFilter},
	fmt::{self, Layer},
	prelude::*,
	EnvFilter,
};

use crate::config::CoreConfig;

#[cfg(debug_assertions)]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::DEBUG;

#[cfg(not(debug_assertions))]
const CONSOLE_LOG_FILTER: LevelFilter = LevelFilter::INFO;

/// Installs the global tracing subscriber.
///
/// Everything goes to the console; when `log_dir` is given, a daily rolling file receives the
/// same events without ANSI colors. The returned guard flushes the file writer on drop, so the
/// host must keep it alive for as long as it wants file logs.
pub fn init(config: &CoreConfig, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
	let filter = EnvFilter::builder()
		.with_default_directive(LevelFilter::WARN.into())
		.from_env_lossy()
		.add_directive(
			format!("md_core={}", config.log_level)
				.parse::<Directive>()
				.context("invalid log level in config")?,
		)
		.add_directive(
			format!("md_task_limiter={}", config.log_level)
				.parse::<Directive>()
				.context("invalid log level in config")?,
		)
		.add_directive(
			format!("md_storage={}", config.log_level)
				.parse::<Directive>()
				.context("invalid log level in config")?,
		);

	let (file_layer, guard) = log_dir.map_or((None, None), |log_dir| {
		let (non_blocking, guard) = tracing_appender::non_blocking(rolling::daily(log_dir, "log"));
		let layer = Layer::default()
			.with_writer(non_blocking)
			.with_ansi(false)
			.with_filter(LevelFilter::DEBUG);
		(Some(layer), Some(guard))
	});

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_filter(CONSOLE_LOG_FILTER))
		.with(file_layer)
		.try_init()
		.context("a global tracing subscriber is already installed")?;

	Ok(guard)
}
