use std::sync::Arc;

/// Identifier of the publisher that delivered a value.
pub type PublisherId = u64;

/// Error travelling down a pipeline.
pub type StreamError = Arc<anyhow::Error>;

/// Receiving end of a publication.
///
/// Callbacks run synchronously on the publishing thread and must finish before
/// `publish` returns to its caller.
pub trait Subscriber<T>: Send + Sync {
	/// Receives one value from `publisher`.
	fn on_next(&self, publisher: PublisherId, value: &T);

	/// The upstream publisher completed.
	fn on_complete(&self) {}

	/// The upstream publisher failed.
	fn on_error(&self, error: &StreamError) {
		let _ = error;
	}
}

type NextFn<T> = dyn Fn(PublisherId, &T) + Send + Sync;
type CompleteFn = dyn Fn() + Send + Sync;
type ErrorFn = dyn Fn(&StreamError) + Send + Sync;

/// Closure-backed subscriber.
pub struct Callbacks<T> {
	next: Box<NextFn<T>>,
	complete: Option<Box<CompleteFn>>,
	error: Option<Box<ErrorFn>>,
}

impl<T> Callbacks<T> {
	/// Creates a subscriber running `next` for every value.
	pub fn new(next: impl Fn(PublisherId, &T) + Send + Sync + 'static) -> Self {
		Self {
			next: Box::new(next),
			complete: None,
			error: None,
		}
	}

	/// Runs `f` when the upstream completes.
	#[must_use]
	pub fn with_complete(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
		self.complete = Some(Box::new(f));
		self
	}

	/// Runs `f` when the upstream fails.
	#[must_use]
	pub fn with_error(mut self, f: impl Fn(&StreamError) + Send + Sync + 'static) -> Self {
		self.error = Some(Box::new(f));
		self
	}
}

impl<T> std::fmt::Debug for Callbacks<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Callbacks")
			.field("complete", &self.complete.is_some())
			.field("error", &self.error.is_some())
			.finish_non_exhaustive()
	}
}

impl<T> Subscriber<T> for Callbacks<T> {
	fn on_next(&self, publisher: PublisherId, value: &T) {
		(self.next)(publisher, value);
	}

	fn on_complete(&self) {
		if let Some(f) = &self.complete {
			f();
		}
	}

	fn on_error(&self, error: &StreamError) {
		if let Some(f) = &self.error {
			f(error);
		}
	}
}

/// Wraps a value callback into a shareable subscriber.
pub fn subscriber_fn<T>(next: impl Fn(PublisherId, &T) + Send + Sync + 'static) -> Arc<Callbacks<T>> {
	Arc::new(Callbacks::new(next))
}
