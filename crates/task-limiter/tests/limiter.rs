use md_task_limiter::{ConcurrencyLimiter, LimiterError};

use std::{
	sync::{
		atomic::{AtomicUsize, Ordering},
		Arc, Mutex,
	},
	time::Duration,
};

use futures_concurrency::future::Join;
use tokio::time::sleep;
use tracing::info;
use tracing_test::traced_test;

#[derive(Debug, thiserror::Error)]
#[error("sample task failure <index='{0}'>")]
struct SampleError(usize);

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[traced_test]
async fn never_exceeds_max_concurrency() {
	let limiter = ConcurrencyLimiter::new(2);
	let running = Arc::new(AtomicUsize::new(0));
	let peak = Arc::new(AtomicUsize::new(0));

	let handles = (0..5)
		.map(|i| {
			let running = Arc::clone(&running);
			let peak = Arc::clone(&peak);
			limiter.enqueue(async move {
				let now = running.fetch_add(1, Ordering::SeqCst) + 1;
				peak.fetch_max(now, Ordering::SeqCst);
				sleep(Duration::from_millis(30)).await;
				running.fetch_sub(1, Ordering::SeqCst);
				info!("task {i} done");
				i
			})
		})
		.collect::<Vec<_>>();

	let results = handles.join().await;

	assert_eq!(results.len(), 5);
	assert!(results.iter().all(Result::is_ok));
	assert!(peak.load(Ordering::SeqCst) <= 2);
	assert_eq!(peak.load(Ordering::SeqCst), 2);
}

#[tokio::test]
#[traced_test]
async fn dispatches_in_fifo_order() {
	let limiter = ConcurrencyLimiter::new(1);
	let order = Arc::new(Mutex::new(Vec::new()));

	let handles = (0..5)
		.map(|i| {
			let order = Arc::clone(&order);
			limiter.enqueue(async move {
				sleep(Duration::from_millis(5)).await;
				order.lock().unwrap().push(i);
			})
		})
		.collect::<Vec<_>>();

	handles.join().await;

	assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
#[traced_test]
async fn failure_does_not_affect_siblings() {
	let limiter = ConcurrencyLimiter::new(2);

	let handles = (0..4)
		.map(|i| {
			limiter.enqueue(async move {
				sleep(Duration::from_millis(5)).await;
				if i == 1 {
					Err(SampleError(i))
				} else {
					Ok(i)
				}
			})
		})
		.collect::<Vec<_>>();

	let results = handles.join().await;

	for (i, res) in results.into_iter().enumerate() {
		let task_res = res.expect("limiter itself must not fail");
		if i == 1 {
			assert!(matches!(task_res, Err(SampleError(1))));
		} else {
			assert_eq!(task_res.unwrap(), i);
		}
	}
}

#[tokio::test]
#[traced_test]
async fn panicking_task_releases_its_slot() {
	let limiter = ConcurrencyLimiter::new(1);

	let broken = limiter.enqueue(async {
		panic!("broken task");
	});
	let after = limiter.enqueue(async { "still runs" });

	assert!(matches!(broken.await, Err(LimiterError::Join(_))));
	assert_eq!(after.await.unwrap(), "still runs");
	assert_eq!(limiter.active(), 0);
}

#[tokio::test]
#[traced_test]
async fn cancel_stops_queued_and_running_tasks() {
	let limiter = ConcurrencyLimiter::new(1);
	let started = Arc::new(AtomicUsize::new(0));

	let handles = (0..3)
		.map(|_| {
			let started = Arc::clone(&started);
			limiter.enqueue(async move {
				started.fetch_add(1, Ordering::SeqCst);
				std::future::pending::<()>().await;
			})
		})
		.collect::<Vec<_>>();

	sleep(Duration::from_millis(10)).await;
	limiter.cancel();

	for res in handles.join().await {
		assert!(matches!(res, Err(LimiterError::Cancelled)));
	}

	assert_eq!(started.load(Ordering::SeqCst), 1);
	assert!(limiter.is_cancelled());
	assert!(matches!(
		limiter.enqueue(async {}).await,
		Err(LimiterError::Cancelled)
	));
}
