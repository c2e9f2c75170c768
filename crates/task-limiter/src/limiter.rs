use std::{
	collections::VecDeque,
	future::Future,
	pin::Pin,
	sync::Arc,
	task::{Context, Poll},
};

use parking_lot::Mutex;
use tokio::{
	spawn,
	sync::oneshot,
	task::{JoinError, JoinHandle},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::error::Error;

pub const DEFAULT_MAX_CONCURRENCY: usize = 20;

/// Bounded-parallelism gate shared by cloning.
///
/// At most `max_concurrency` enqueued futures execute at any instant across every clone of the
/// same limiter. Excess futures wait in a FIFO queue and are dispatched as running ones finish.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
	inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
	max_concurrency: usize,
	slots: Mutex<Slots>,
	cancel_token: CancellationToken,
}

#[derive(Debug, Default)]
struct Slots {
	active: usize,
	waiting: VecDeque<oneshot::Sender<Slot>>,
}

/// A running permission. Dropping it hands the slot to the oldest waiter, or frees it.
#[derive(Debug)]
struct Slot {
	inner: Option<Arc<Inner>>,
}

impl Slot {
	const fn new(inner: Arc<Inner>) -> Self {
		Self { inner: Some(inner) }
	}

	fn disarm(mut self) {
		self.inner = None;
	}
}

impl Drop for Slot {
	fn drop(&mut self) {
		if let Some(inner) = self.inner.take() {
			inner.release();
		}
	}
}

impl Inner {
	fn release(self: &Arc<Self>) {
		loop {
			let next = {
				let mut slots = self.slots.lock();
				if let Some(next) = slots.waiting.pop_front() {
					next
				} else {
					slots.active -= 1;
					trace!(active = slots.active, "Limiter slot freed");
					return;
				}
			};

			// A closed receiver means the waiter was cancelled or dropped, so try the next one
			match next.send(Slot::new(Arc::clone(self))) {
				Ok(()) => return,
				Err(slot) => slot.disarm(),
			}
		}
	}
}

impl ConcurrencyLimiter {
	/// Creates a limiter allowing `max_concurrency` simultaneous tasks; zero is clamped to one.
	#[must_use]
	pub fn new(max_concurrency: usize) -> Self {
		Self {
			inner: Arc::new(Inner {
				max_concurrency: max_concurrency.max(1),
				slots: Mutex::new(Slots::default()),
				cancel_token: CancellationToken::new(),
			}),
		}
	}

	#[must_use]
	pub fn max_concurrency(&self) -> usize {
		self.inner.max_concurrency
	}

	/// Number of tasks currently holding a slot.
	#[must_use]
	pub fn active(&self) -> usize {
		self.inner.slots.lock().active
	}

	/// Number of tasks waiting for a slot.
	#[must_use]
	pub fn queued(&self) -> usize {
		self.inner.slots.lock().waiting.len()
	}

	/// Enqueues `task` and returns a handle resolving to the task's own output.
	///
	/// The queue position is taken synchronously. The task is spawned on the current tokio
	/// runtime, so it makes progress even if the returned handle is never polled or is dropped.
	///
	/// # Panics
	///
	/// Panics if called outside of a tokio runtime, as [`tokio::spawn`] does.
	pub fn enqueue<Fut>(&self, task: Fut) -> LimitedTask<Fut::Output>
	where
		Fut: Future + Send + 'static,
		Fut::Output: Send + 'static,
	{
		let granted = {
			let mut slots = self.inner.slots.lock();
			if slots.active < self.inner.max_concurrency {
				slots.active += 1;
				Ok(Slot::new(Arc::clone(&self.inner)))
			} else {
				let (slot_tx, slot_rx) = oneshot::channel();
				slots.waiting.push_back(slot_tx);
				trace!(queued = slots.waiting.len(), "Limiter at capacity, task queued");
				Err(slot_rx)
			}
		};

		let cancel_token = self.inner.cancel_token.clone();

		let handle = spawn(async move {
			let _slot = match granted {
				Ok(slot) => slot,
				Err(slot_rx) => {
					tokio::select! {
						biased;

						() = cancel_token.cancelled() => return Err(Error::Cancelled),
						res = slot_rx => res.map_err(|_| Error::Cancelled)?,
					}
				}
			};

			tokio::select! {
				biased;

				() = cancel_token.cancelled() => Err(Error::Cancelled),
				out = task => Ok(out),
			}
		});

		LimitedTask { handle }
	}

	/// Cancels every queued and running task of this limiter.
	///
	/// Queued tasks never start; running tasks are dropped at their next suspension point.
	/// Both resolve to [`Error::Cancelled`]. Tasks enqueued afterwards resolve the same way.
	pub fn cancel(&self) {
		trace!("Cancelling limiter");
		self.inner.cancel_token.cancel();
	}

	#[must_use]
	pub fn is_cancelled(&self) -> bool {
		self.inner.cancel_token.is_cancelled()
	}
}

impl Default for ConcurrencyLimiter {
	fn default() -> Self {
		Self::new(DEFAULT_MAX_CONCURRENCY)
	}
}

/// Handle to a task enqueued in a [`ConcurrencyLimiter`].
///
/// Dropping it detaches the task, it keeps running (or waiting) until it finishes.
#[derive(Debug)]
#[must_use = "a limited task keeps running when dropped, await it to get its output"]
pub struct LimitedTask<T> {
	handle: JoinHandle<Result<T, Error>>,
}

impl<T> Future for LimitedTask<T> {
	type Output = Result<T, Error>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		Pin::new(&mut self.handle)
			.poll(cx)
			.map(|res: Result<Result<T, Error>, JoinError>| {
				res.map_err(Error::from).and_then(|out| out)
			})
	}
}
