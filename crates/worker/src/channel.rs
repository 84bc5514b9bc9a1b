use std::collections::VecDeque;
use std::sync::Arc;

use arbor_common::{Result, validate_capacity};
use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

/// Push failure on a [`Channel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
	/// The channel was closed.
	#[error("channel is closed")]
	Closed,
	/// The channel is at capacity and a non-waiting push was used.
	#[error("channel is full")]
	Full,
}

struct ChannelState<T> {
	queue: VecDeque<T>,
	closed: bool,
}

struct ChannelInner<T> {
	capacity: usize,
	state: Mutex<ChannelState<T>>,
	readable: Condvar,
	writable: Condvar,
	notify_recv: Notify,
	notify_send: Notify,
}

impl<T> ChannelInner<T> {
	fn wake_receiver(&self) {
		self.readable.notify_one();
		self.notify_recv.notify_one();
	}

	fn wake_sender(&self) {
		self.writable.notify_one();
		self.notify_send.notify_one();
	}
}

/// Bounded FIFO channel with many producers and many consumers.
///
/// Every operation has a blocking form for plain threads and an async form
/// for tasks. Closing lets receivers drain queued items before they observe
/// the end of the stream.
pub struct Channel<T> {
	inner: Arc<ChannelInner<T>>,
}

impl<T> Clone for Channel<T> {
	fn clone(&self) -> Self {
		Self {
			inner: Arc::clone(&self.inner),
		}
	}
}

impl<T> std::fmt::Debug for Channel<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.inner.state.lock();
		f.debug_struct("Channel")
			.field("capacity", &self.inner.capacity)
			.field("len", &state.queue.len())
			.field("closed", &state.closed)
			.finish()
	}
}

impl<T> Channel<T> {
	/// Creates a channel holding at most `capacity` items.
	///
	/// # Errors
	///
	/// `ValueError` unless `capacity` is a power of two of at least one.
	pub fn new(capacity: usize) -> Result<Self> {
		let capacity = validate_capacity(capacity)?;
		Ok(Self {
			inner: Arc::new(ChannelInner {
				capacity,
				state: Mutex::new(ChannelState {
					queue: VecDeque::with_capacity(capacity),
					closed: false,
				}),
				readable: Condvar::new(),
				writable: Condvar::new(),
				notify_recv: Notify::new(),
				notify_send: Notify::new(),
			}),
		})
	}

	pub fn capacity(&self) -> usize {
		self.inner.capacity
	}

	pub fn len(&self) -> usize {
		self.inner.state.lock().queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn is_closed(&self) -> bool {
		self.inner.state.lock().closed
	}

	/// Closes the channel. Queued items stay poppable.
	pub fn close(&self) {
		let mut state = self.inner.state.lock();
		if state.closed {
			return;
		}
		state.closed = true;
		drop(state);
		self.inner.readable.notify_all();
		self.inner.writable.notify_all();
		self.inner.notify_recv.notify_waiters();
		self.inner.notify_send.notify_waiters();
	}

	/// Enqueues without waiting.
	pub fn try_push(&self, value: T) -> Result<(), ChannelError> {
		let mut state = self.inner.state.lock();
		if state.closed {
			return Err(ChannelError::Closed);
		}
		if state.queue.len() >= self.inner.capacity {
			return Err(ChannelError::Full);
		}
		state.queue.push_back(value);
		drop(state);
		self.inner.wake_receiver();
		Ok(())
	}

	/// Enqueues, parking the calling thread while the channel is full.
	pub fn push_blocking(&self, value: T) -> Result<(), ChannelError> {
		let mut state = self.inner.state.lock();
		loop {
			if state.closed {
				return Err(ChannelError::Closed);
			}
			if state.queue.len() < self.inner.capacity {
				state.queue.push_back(value);
				drop(state);
				self.inner.wake_receiver();
				return Ok(());
			}
			self.inner.writable.wait(&mut state);
		}
	}

	/// Enqueues, suspending the task while the channel is full.
	pub async fn push(&self, value: T) -> Result<(), ChannelError> {
		loop {
			// Registered before the check so a concurrent pop cannot be missed.
			let notified = self.inner.notify_send.notified();
			{
				let mut state = self.inner.state.lock();
				if state.closed {
					return Err(ChannelError::Closed);
				}
				if state.queue.len() < self.inner.capacity {
					state.queue.push_back(value);
					drop(state);
					self.inner.wake_receiver();
					return Ok(());
				}
			}
			notified.await;
		}
	}

	/// Dequeues without waiting.
	pub fn try_pop(&self) -> Option<T> {
		let value = self.inner.state.lock().queue.pop_front()?;
		self.inner.wake_sender();
		Some(value)
	}

	/// Dequeues, parking the calling thread while the channel is empty.
	///
	/// Returns `None` once the channel is closed and drained.
	pub fn pop_blocking(&self) -> Option<T> {
		let mut state = self.inner.state.lock();
		loop {
			if let Some(value) = state.queue.pop_front() {
				drop(state);
				self.inner.wake_sender();
				return Some(value);
			}
			if state.closed {
				return None;
			}
			self.inner.readable.wait(&mut state);
		}
	}

	/// Dequeues, suspending the task while the channel is empty.
	///
	/// Returns `None` once the channel is closed and drained. Cancel-safe: an
	/// item is only taken on the poll that returns it.
	pub async fn pop(&self) -> Option<T> {
		loop {
			let notified = self.inner.notify_recv.notified();
			{
				let mut state = self.inner.state.lock();
				if let Some(value) = state.queue.pop_front() {
					drop(state);
					self.inner.wake_sender();
					return Some(value);
				}
				if state.closed {
					return None;
				}
			}
			notified.await;
		}
	}
}
