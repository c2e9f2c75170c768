use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error)]
pub enum Error {
	#[error("limited task was cancelled before completion")]
	Cancelled,
	#[error("limited task join error: {0}")]
	Join(#[from] JoinError),
}

impl Error {
	#[must_use]
	pub const fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}
