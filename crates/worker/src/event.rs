//! Units of work dispatched on the UI thread.

use std::future::Future;

use async_trait::async_trait;

/// Weight of an event that does not declare one.
pub const DEFAULT_WEIGHT: f32 = 0.0;

/// Work scheduled onto the event handler.
///
/// Each event runs as its own task on the UI thread. `run` may await
/// channel receives, timers or other tasks; the handler keeps dispatching
/// while it is suspended.
#[async_trait(?Send)]
pub trait Event: Send + 'static {
	async fn run(self: Box<Self>) -> anyhow::Result<()>;

	/// Contribution towards the next rendered frame; a frame is requested
	/// once the accumulated weight reaches 1.
	fn weight(&self) -> f32 {
		DEFAULT_WEIGHT
	}

	/// Label used in logs.
	fn name(&self) -> &'static str {
		std::any::type_name::<Self>()
	}
}

pub type BoxedEvent = Box<dyn Event>;

/// Event wrapping a synchronous closure.
pub struct FnEvent<F> {
	f: F,
	weight: f32,
}

impl<F> FnEvent<F>
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	pub fn new(f: F) -> Self {
		Self { f, weight: DEFAULT_WEIGHT }
	}

	pub fn with_weight(mut self, weight: f32) -> Self {
		self.weight = weight;
		self
	}
}

#[async_trait(?Send)]
impl<F> Event for FnEvent<F>
where
	F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
	async fn run(self: Box<Self>) -> anyhow::Result<()> {
		(self.f)()
	}

	fn weight(&self) -> f32 {
		self.weight
	}

	fn name(&self) -> &'static str {
		"fn"
	}
}

/// Event building its future on the UI thread.
///
/// Only the factory crosses threads, so the future itself may hold
/// thread-bound state.
pub struct FutureEvent<F> {
	make: F,
}

impl<F, Fut> FutureEvent<F>
where
	F: FnOnce() -> Fut + Send + 'static,
	Fut: Future<Output = anyhow::Result<()>> + 'static,
{
	pub fn new(make: F) -> Self {
		Self { make }
	}
}

#[async_trait(?Send)]
impl<F, Fut> Event for FutureEvent<F>
where
	F: FnOnce() -> Fut + Send + 'static,
	Fut: Future<Output = anyhow::Result<()>> + 'static,
{
	async fn run(self: Box<Self>) -> anyhow::Result<()> {
		(self.make)().await
	}

	fn name(&self) -> &'static str {
		"future"
	}
}
