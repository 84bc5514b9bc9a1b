//! Deferred and repeating callbacks on a dedicated timer thread.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use arbor_common::{Error, Result};
use parking_lot::{Condvar, Mutex};
use tokio::task::{JoinSet, LocalSet};
use tokio_util::sync::CancellationToken;

use crate::ThreadRole;
use crate::channel::{Channel, ChannelError};
use crate::panic::{join_error_panic_message, panic_message};
use crate::spawn::{join_role_thread, local_runtime, spawn_role_thread};

type Callback = Box<dyn FnMut() -> anyhow::Result<()> + Send>;
type NextDelay = Box<dyn FnMut() -> Duration + Send>;

/// Lifecycle of a [`Timer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
	Unstarted,
	Running,
	Finished,
}

/// How many more times a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repetitions {
	Count(u64),
	Infinite,
}

impl Repetitions {
	fn is_exhausted(self) -> bool {
		self == Self::Count(0)
	}

	fn decrement(&mut self) {
		if let Self::Count(n) = self {
			*n = n.saturating_sub(1);
		}
	}
}

/// First failure captured from a timer callback.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TimerFailure {
	#[error("timer callback failed: {0:#}")]
	Error(Arc<anyhow::Error>),
	#[error("timer callback panicked: {0}")]
	Panic(String),
}

enum Schedule {
	At(Instant),
	After(Duration),
	Every(Duration),
	Variable(NextDelay),
}

struct TimerStatus {
	state: TimerState,
	remaining: Repetitions,
	next_fire: Instant,
	failure: Option<TimerFailure>,
	detached: bool,
}

struct TimerCore {
	pool: Weak<PoolShared>,
	schedule: Mutex<Schedule>,
	callback: Mutex<Callback>,
	status: Mutex<TimerStatus>,
	finished: Condvar,
	stop: CancellationToken,
	ignore_exceptions: AtomicBool,
	keep_alive: AtomicBool,
	fires: AtomicU64,
}

impl TimerCore {
	fn state(&self) -> TimerState {
		self.status.lock().state
	}

	/// Moves a running timer to `Finished`; returns whether it was running.
	fn finish(&self, reason: &'static str) -> bool {
		let mut status = self.status.lock();
		if status.state != TimerState::Running {
			return false;
		}
		status.state = TimerState::Finished;
		drop(status);
		self.stop.cancel();
		self.finished.notify_all();
		tracing::debug!(reason, fires = self.fires.load(Ordering::Relaxed), "timer.finished");
		true
	}

	/// Next fire instant measured from `now`.
	fn next_after(&self, now: Instant, previous: Instant) -> Instant {
		match &mut *self.schedule.lock() {
			Schedule::At(at) => *at,
			Schedule::After(delay) => now + *delay,
			Schedule::Every(period) => previous + *period,
			Schedule::Variable(next) => now + next(),
		}
	}

	/// Runs the callback once. Returns `true` when the timer is done.
	fn fire(&self) -> bool {
		let outcome = {
			let mut guard = self.callback.lock();
			let callback = &mut **guard;
			catch_unwind(AssertUnwindSafe(|| callback()))
		};
		self.fires.fetch_add(1, Ordering::Relaxed);

		let failure = match outcome {
			Ok(Ok(())) => None,
			Ok(Err(error)) => Some(TimerFailure::Error(Arc::new(error))),
			Err(payload) => Some(TimerFailure::Panic(panic_message(&*payload))),
		};

		let mut status = self.status.lock();
		status.remaining.decrement();
		let mut done = status.remaining.is_exhausted();
		if let Some(failure) = failure {
			tracing::warn!(%failure, "timer.fire.failed");
			status.failure.get_or_insert(failure);
			done |= !self.ignore_exceptions.load(Ordering::Relaxed);
		}
		if !done {
			let previous = status.next_fire;
			drop(status);
			let next = self.next_after(Instant::now(), previous);
			self.status.lock().next_fire = next;
		}
		done
	}
}

/// Body of the task driving one timer on the timer thread.
async fn drive(core: Arc<TimerCore>, closing: CancellationToken) {
	loop {
		let (state, detached, exhausted, next_fire) = {
			let status = core.status.lock();
			(status.state, status.detached, status.remaining.is_exhausted(), status.next_fire)
		};
		if state != TimerState::Running {
			return;
		}
		if exhausted {
			core.finish("exhausted");
			return;
		}
		let keep_alive = core.keep_alive.load(Ordering::Relaxed);
		if closing.is_cancelled() && !keep_alive {
			core.finish("pool closed");
			return;
		}
		if !detached && core.stop.is_cancelled() {
			core.finish("handle dropped");
			return;
		}

		if Instant::now() >= next_fire {
			tracing::trace!(fire = core.fires.load(Ordering::Relaxed) + 1, "timer.fire");
			if core.fire() {
				core.finish("done");
				return;
			}
			tokio::task::yield_now().await;
			continue;
		}

		tokio::select! {
			() = tokio::time::sleep_until(next_fire.into()) => {}
			() = core.stop.cancelled() => {}
			() = closing.cancelled(), if !keep_alive => {}
		}
	}
}

/// User handle of a scheduled callback.
///
/// Configure with the builder methods, then [`Timer::start`]. Dropping a
/// timer that was not started detached stops it.
pub struct Timer {
	core: Arc<TimerCore>,
}

impl std::fmt::Debug for Timer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let status = self.core.status.lock();
		f.debug_struct("Timer")
			.field("state", &status.state)
			.field("remaining", &status.remaining)
			.field("fires", &self.core.fires.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl Timer {
	fn new(pool: &TimerPool, schedule: Schedule, repetitions: Repetitions, callback: Callback) -> Self {
		Self {
			core: Arc::new(TimerCore {
				pool: Arc::downgrade(&pool.shared),
				schedule: Mutex::new(schedule),
				callback: Mutex::new(callback),
				status: Mutex::new(TimerStatus {
					state: TimerState::Unstarted,
					remaining: repetitions,
					next_fire: Instant::now(),
					failure: None,
					detached: false,
				}),
				finished: Condvar::new(),
				stop: CancellationToken::new(),
				ignore_exceptions: AtomicBool::new(false),
				keep_alive: AtomicBool::new(false),
				fires: AtomicU64::new(0),
			}),
		}
	}

	/// Keeps firing after a callback failure.
	pub fn ignore_exceptions(self, ignore: bool) -> Self {
		self.core.ignore_exceptions.store(ignore, Ordering::Relaxed);
		self
	}

	/// Keeps running to its natural end when the pool shuts down.
	pub fn keep_alive(self, keep_alive: bool) -> Self {
		self.core.keep_alive.store(keep_alive, Ordering::Relaxed);
		self
	}

	/// Hands the timer to its pool.
	///
	/// A detached timer keeps running after this handle is dropped.
	///
	/// # Errors
	///
	/// `StartupError` when the timer was already started or the pool is gone
	/// or closed.
	pub fn start(&self, detached: bool) -> Result<()> {
		let pool = self.core.pool.upgrade().ok_or_else(|| Error::startup("timer pool is gone"))?;
		{
			let mut status = self.core.status.lock();
			if status.state != TimerState::Unstarted {
				return Err(Error::startup("timer already started"));
			}
			let now = Instant::now();
			status.next_fire = self.core.next_after(now, now);
			status.state = TimerState::Running;
			status.detached = detached;
		}

		let core = Arc::clone(&self.core);
		let pushed = if pool.is_timer_thread() {
			pool.channel.try_push(core)
		} else {
			pool.channel.push_blocking(core)
		};
		if let Err(error) = pushed {
			self.core.finish("not scheduled");
			return Err(match error {
				ChannelError::Closed => Error::startup("timer pool is closed"),
				ChannelError::Full => Error::startup("timer channel is full"),
			});
		}
		tracing::trace!(detached, "timer.start");
		Ok(())
	}

	/// Finishes a running timer. No effect otherwise.
	pub fn stop(&self) {
		self.core.finish("stopped");
	}

	pub fn state(&self) -> TimerState {
		self.core.state()
	}

	pub fn is_finished(&self) -> bool {
		self.state() == TimerState::Finished
	}

	/// Number of times the callback ran.
	pub fn fire_count(&self) -> u64 {
		self.core.fires.load(Ordering::Relaxed)
	}

	pub fn has_exception(&self) -> bool {
		self.core.status.lock().failure.is_some()
	}

	/// Returns the first captured failure as an error.
	pub fn rethrow(&self) -> Result<(), TimerFailure> {
		match &self.core.status.lock().failure {
			Some(failure) => Err(failure.clone()),
			None => Ok(()),
		}
	}

	/// Blocks until the timer finishes or `timeout` passes.
	///
	/// Returns whether the timer finished. Must not be called on the timer
	/// thread.
	pub fn wait_finished(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		let mut status = self.core.status.lock();
		while status.state != TimerState::Finished {
			if self.core.finished.wait_until(&mut status, deadline).timed_out() {
				return status.state == TimerState::Finished;
			}
		}
		true
	}
}

impl Drop for Timer {
	fn drop(&mut self) {
		let detached = self.core.status.lock().detached;
		if !detached {
			self.core.stop.cancel();
		}
	}
}

struct PoolShared {
	channel: Channel<Arc<TimerCore>>,
	closing: CancellationToken,
	thread_id: OnceLock<ThreadId>,
}

impl PoolShared {
	fn is_timer_thread(&self) -> bool {
		self.thread_id.get() == Some(&std::thread::current().id())
	}
}

/// Owner of the timer thread.
///
/// Closing or dropping the pool closes its channel, finishes every timer not
/// marked `keep_alive` and joins the thread once the remaining timers end.
pub struct TimerPool {
	shared: Arc<PoolShared>,
	thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TimerPool {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TimerPool")
			.field("channel", &self.shared.channel)
			.field("closing", &self.shared.closing.is_cancelled())
			.finish()
	}
}

impl TimerPool {
	/// Spawns the timer thread with a channel of `capacity` timers.
	///
	/// # Errors
	///
	/// `ValueError` for an invalid capacity, `StartupError` when the thread
	/// cannot be created.
	pub fn new(capacity: usize) -> Result<Self> {
		let shared = Arc::new(PoolShared {
			channel: Channel::new(capacity)?,
			closing: CancellationToken::new(),
			thread_id: OnceLock::new(),
		});
		let runtime = local_runtime(ThreadRole::Timer)?;
		let worker = Arc::clone(&shared);
		let thread = spawn_role_thread(ThreadRole::Timer, move || {
			let _ = worker.thread_id.set(std::thread::current().id());
			let channel = worker.channel.clone();
			let closing = worker.closing.clone();
			drop(worker);
			LocalSet::new().block_on(&runtime, run_pool(channel, closing));
		})?;
		tracing::debug!(capacity, "timer.pool.started");
		Ok(Self {
			shared,
			thread: Mutex::new(Some(thread)),
		})
	}

	/// Fires once at `at`.
	pub fn one_shot<F>(&self, at: Instant, callback: F) -> Timer
	where
		F: FnMut() -> anyhow::Result<()> + Send + 'static,
	{
		Timer::new(self, Schedule::At(at), Repetitions::Count(1), Box::new(callback))
	}

	/// Fires once, `delay` after start.
	pub fn after<F>(&self, delay: Duration, callback: F) -> Timer
	where
		F: FnMut() -> anyhow::Result<()> + Send + 'static,
	{
		Timer::new(self, Schedule::After(delay), Repetitions::Count(1), Box::new(callback))
	}

	/// Fires every `period`, the first time one period after start.
	pub fn interval<F>(&self, period: Duration, repetitions: Repetitions, callback: F) -> Timer
	where
		F: FnMut() -> anyhow::Result<()> + Send + 'static,
	{
		Timer::new(self, Schedule::Every(period), repetitions, Box::new(callback))
	}

	/// Fires after delays produced by `next_delay`, asked before each fire.
	pub fn variable<D, F>(&self, repetitions: Repetitions, next_delay: D, callback: F) -> Timer
	where
		D: FnMut() -> Duration + Send + 'static,
		F: FnMut() -> anyhow::Result<()> + Send + 'static,
	{
		Timer::new(self, Schedule::Variable(Box::new(next_delay)), repetitions, Box::new(callback))
	}

	pub fn is_closing(&self) -> bool {
		self.shared.closing.is_cancelled()
	}

	/// Stops accepting timers and joins the timer thread.
	///
	/// Timers not marked `keep_alive` finish at their next wake-up; the call
	/// returns once the others have run out. Idempotent.
	pub fn close(&self) {
		self.shared.channel.close();
		self.shared.closing.cancel();
		let thread = self.thread.lock().take();
		if let Some(thread) = thread {
			join_role_thread(ThreadRole::Timer, thread);
			tracing::debug!("timer.pool.closed");
		}
	}
}

impl Drop for TimerPool {
	fn drop(&mut self) {
		self.close();
	}
}

async fn run_pool(channel: Channel<Arc<TimerCore>>, closing: CancellationToken) {
	let mut tasks = JoinSet::new();
	loop {
		tokio::select! {
			popped = channel.pop() => match popped {
				Some(core) => {
					tasks.spawn_local(drive(core, closing.clone()));
				}
				None => break,
			},
			Some(result) = tasks.join_next(), if !tasks.is_empty() => report(result),
		}
	}
	tracing::debug!(remaining = tasks.len(), "timer.pool.draining");
	while let Some(result) = tasks.join_next().await {
		report(result);
	}
}

fn report(result: std::result::Result<(), tokio::task::JoinError>) {
	if let Err(error) = result
		&& let Some(panic) = join_error_panic_message(error)
	{
		tracing::error!(%panic, "timer.task.panicked");
	}
}
