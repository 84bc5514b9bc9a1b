use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use arbor_graph::ErrorKind;
use arbor_worker::{Repetitions, TimerPool, TimerState};
use pretty_assertions::assert_eq;

fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> anyhow::Result<()> + Send + 'static) {
	let count = Arc::new(AtomicUsize::new(0));
	let callback = {
		let count = Arc::clone(&count);
		move || {
			count.fetch_add(1, Ordering::SeqCst);
			Ok(())
		}
	};
	(count, callback)
}

#[test]
fn interval_fires_its_repetitions_then_finishes() {
	let pool = TimerPool::new(8).unwrap();
	let (count, callback) = counter();
	let timer = pool.interval(Duration::from_millis(100), Repetitions::Count(3), callback);

	let started = Instant::now();
	timer.start(true).unwrap();
	thread::sleep(Duration::from_millis(350));
	assert!(timer.wait_finished(Duration::from_secs(1)));

	assert_eq!(count.load(Ordering::SeqCst), 3);
	assert_eq!(timer.state(), TimerState::Finished);
	assert!(started.elapsed() >= Duration::from_millis(300));
	assert!(!timer.has_exception());
}

#[test]
fn dropping_the_pool_honours_keep_alive() {
	let pool = TimerPool::new(8).unwrap();
	let (_, forever) = counter();
	let endless = pool.interval(Duration::from_millis(5), Repetitions::Infinite, forever);
	let (kept_count, kept) = counter();
	let survivor = pool
		.interval(Duration::from_millis(20), Repetitions::Count(3), kept)
		.keep_alive(true);

	endless.start(false).unwrap();
	survivor.start(false).unwrap();
	drop(pool);

	assert_eq!(endless.state(), TimerState::Finished);
	assert_eq!(survivor.state(), TimerState::Finished);
	assert_eq!(survivor.fire_count(), 3);
	assert_eq!(kept_count.load(Ordering::SeqCst), 3);
}

#[test]
fn detached_timer_outlives_its_handle() {
	let pool = TimerPool::new(8).unwrap();
	let (count, callback) = counter();
	pool.interval(Duration::from_millis(5), Repetitions::Count(4), callback)
		.start(true)
		.unwrap();

	let deadline = Instant::now() + Duration::from_secs(2);
	while count.load(Ordering::SeqCst) < 4 && Instant::now() < deadline {
		thread::sleep(Duration::from_millis(5));
	}
	assert_eq!(count.load(Ordering::SeqCst), 4);
}

#[test]
fn starting_after_the_pool_is_gone_fails() {
	let pool = TimerPool::new(8).unwrap();
	let timer = pool.after(Duration::from_millis(1), || Ok(()));
	drop(pool);

	assert_eq!(timer.start(false).unwrap_err().kind(), ErrorKind::Startup);
	assert_eq!(timer.state(), TimerState::Unstarted);
}

#[test]
fn stopping_a_running_timer_finishes_it() {
	let pool = TimerPool::new(8).unwrap();
	let (count, callback) = counter();
	let timer = pool.after(Duration::from_secs(10), callback);
	timer.start(false).unwrap();
	assert_eq!(timer.state(), TimerState::Running);

	timer.stop();
	assert!(timer.wait_finished(Duration::from_millis(10)));
	assert_eq!(count.load(Ordering::SeqCst), 0);
}
