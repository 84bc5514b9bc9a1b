use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::subscriber::{PublisherId, StreamError, Subscriber};

static NEXT_PUBLISHER_ID: AtomicU64 = AtomicU64::new(1);

/// How many subscribers a publisher keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
	/// One subscriber; a new subscription replaces the previous one.
	Single,
	/// Any number of subscribers, notified in subscription order.
	Multi,
}

#[derive(Clone)]
enum Terminal {
	Open,
	Completed,
	Failed(StreamError),
}

struct PublisherState<T> {
	subscribers: Vec<Weak<dyn Subscriber<T>>>,
	terminal: Terminal,
}

/// Synchronous fan-out of values to weakly held subscribers.
///
/// Subscribers are not kept alive by the publisher; a [`Pipeline`](crate::Pipeline)
/// or the subscriber's owner holds the strong reference. Dead entries are
/// pruned lazily on the next subscription or publication.
pub struct Publisher<T> {
	id: PublisherId,
	policy: Policy,
	terminable: bool,
	state: Mutex<PublisherState<T>>,
}

impl<T> fmt::Debug for Publisher<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Publisher")
			.field("id", &self.id)
			.field("policy", &self.policy)
			.field("terminable", &self.terminable)
			.finish_non_exhaustive()
	}
}

impl<T: 'static> Default for Publisher<T> {
	fn default() -> Self {
		Self::multi()
	}
}

fn is_same<T: 'static>(weak: &Weak<dyn Subscriber<T>>, subscriber: *const dyn Subscriber<T>) -> bool {
	std::ptr::addr_eq(weak.as_ptr(), subscriber)
}

impl<T: 'static> Publisher<T> {
	/// Creates a terminable publisher with the given policy.
	pub fn new(policy: Policy) -> Self {
		Self {
			id: NEXT_PUBLISHER_ID.fetch_add(1, Ordering::Relaxed),
			policy,
			terminable: true,
			state: Mutex::new(PublisherState {
				subscribers: Vec::new(),
				terminal: Terminal::Open,
			}),
		}
	}

	pub fn multi() -> Self {
		Self::new(Policy::Multi)
	}

	pub fn single() -> Self {
		Self::new(Policy::Single)
	}

	/// Disables completion and error termination.
	///
	/// `complete` and `error` become no-ops; subscribers stay connected.
	#[must_use]
	pub fn unterminatable(mut self) -> Self {
		self.terminable = false;
		self
	}

	pub fn id(&self) -> PublisherId {
		self.id
	}

	pub fn policy(&self) -> Policy {
		self.policy
	}

	pub fn is_terminable(&self) -> bool {
		self.terminable
	}

	/// Returns `true` once `complete` or `error` has run.
	pub fn is_terminated(&self) -> bool {
		!matches!(self.state.lock().terminal, Terminal::Open)
	}

	/// Number of live subscribers.
	pub fn subscriber_count(&self) -> usize {
		self.state.lock().subscribers.iter().filter(|s| s.strong_count() > 0).count()
	}

	/// Adds `subscriber`; subscribing the same subscriber twice is a no-op.
	///
	/// Returns `false` when the publisher already terminated. The terminal
	/// notification is replayed to the late subscriber in that case.
	pub fn subscribe(&self, subscriber: &Arc<dyn Subscriber<T>>) -> bool {
		let terminal = {
			let mut state = self.state.lock();
			match &state.terminal {
				Terminal::Open => {
					state.subscribers.retain(|s| s.strong_count() > 0);
					if state.subscribers.iter().any(|s| is_same(s, Arc::as_ptr(subscriber))) {
						return true;
					}
					if self.policy == Policy::Single && !state.subscribers.is_empty() {
						tracing::trace!(publisher = self.id, "publisher.single.replace");
						state.subscribers.clear();
					}
					state.subscribers.push(Arc::downgrade(subscriber));
					return true;
				}
				terminal => terminal.clone(),
			}
		};

		match terminal {
			Terminal::Completed => subscriber.on_complete(),
			Terminal::Failed(error) => subscriber.on_error(&error),
			Terminal::Open => {}
		}
		false
	}

	/// Removes `subscriber`. Returns `true` if it was subscribed.
	pub fn unsubscribe(&self, subscriber: &Weak<dyn Subscriber<T>>) -> bool {
		let mut state = self.state.lock();
		let before = state.subscribers.len();
		state.subscribers.retain(|s| !is_same(s, subscriber.as_ptr()) && s.strong_count() > 0);
		before != state.subscribers.len()
	}

	/// Delivers `value` to every live subscriber, in subscription order.
	pub fn publish(&self, value: &T) {
		self.publish_as(self.id, value);
	}

	/// Delivers `value` tagged with another publisher's id.
	///
	/// Used by forwarding stages so downstream subscribers see the origin.
	pub fn publish_as(&self, origin: PublisherId, value: &T) {
		let live = self.live();
		for subscriber in live {
			subscriber.on_next(origin, value);
		}
	}

	/// Completes the publisher and releases all subscribers.
	pub fn complete(&self) {
		if !self.terminable {
			tracing::trace!(publisher = self.id, "publisher.complete.ignored");
			return;
		}
		for subscriber in self.terminate(Terminal::Completed) {
			subscriber.on_complete();
		}
	}

	/// Fails the publisher and releases all subscribers.
	pub fn error(&self, error: StreamError) {
		if !self.terminable {
			tracing::trace!(publisher = self.id, %error, "publisher.error.ignored");
			return;
		}
		for subscriber in self.terminate(Terminal::Failed(Arc::clone(&error))) {
			subscriber.on_error(&error);
		}
	}

	fn live(&self) -> Vec<Arc<dyn Subscriber<T>>> {
		let mut state = self.state.lock();
		let mut live = Vec::with_capacity(state.subscribers.len());
		state.subscribers.retain(|s| match s.upgrade() {
			Some(subscriber) => {
				live.push(subscriber);
				true
			}
			None => false,
		});
		live
	}

	fn terminate(&self, terminal: Terminal) -> Vec<Arc<dyn Subscriber<T>>> {
		let mut state = self.state.lock();
		if !matches!(state.terminal, Terminal::Open) {
			return Vec::new();
		}
		state.terminal = terminal;
		std::mem::take(&mut state.subscribers).iter().filter_map(Weak::upgrade).collect()
	}
}
