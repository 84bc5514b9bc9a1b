//! The UI thread: a cooperative event loop over a bounded channel.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::thread::{JoinHandle, ThreadId};

use arbor_common::{Error, Result};
use arbor_graph::Graph;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::{JoinError, JoinSet, LocalSet};

use crate::channel::{Channel, ChannelError};
use crate::event::{BoxedEvent, Event, FnEvent, FutureEvent};
use crate::panic::join_error_panic_message;
use crate::spawn::{join_role_thread, local_runtime, spawn_role_thread};
use crate::ThreadRole;

/// Draws a frame on behalf of the event loop.
///
/// Called on the UI thread.
pub trait FrameRenderer: Send + Sync {
	fn render_frame(&self, graph: &Graph) -> anyhow::Result<()>;
}

struct HandlerShared {
	channel: Channel<BoxedEvent>,
	graph: Graph,
	renderer: Option<Arc<dyn FrameRenderer>>,
	thread: Mutex<Option<JoinHandle<()>>>,
	thread_id: Arc<OnceLock<ThreadId>>,
}

impl HandlerShared {
	fn close(&self) {
		self.channel.close();
		let handle = self.thread.lock().take();
		if let Some(handle) = handle {
			join_role_thread(ThreadRole::Ui, handle);
			tracing::debug!("event.handler.closed");
		}
	}
}

impl Drop for HandlerShared {
	fn drop(&mut self) {
		self.close();
	}
}

/// Dispatches events on the dedicated UI thread.
///
/// Cheap to clone. The thread started by [`EventHandler::start`] claims the
/// graph's UI role for its whole lifetime, so every event runs where graph
/// mutators are allowed.
#[derive(Clone)]
pub struct EventHandler {
	shared: Arc<HandlerShared>,
}

impl std::fmt::Debug for EventHandler {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventHandler")
			.field("channel", &self.shared.channel)
			.field("thread", &self.shared.thread_id.get())
			.finish_non_exhaustive()
	}
}

impl EventHandler {
	/// Creates a stopped handler with a channel of `capacity` events.
	///
	/// # Errors
	///
	/// `ValueError` for an invalid capacity.
	pub fn new(graph: Graph, capacity: usize, renderer: Option<Arc<dyn FrameRenderer>>) -> Result<Self> {
		Ok(Self {
			shared: Arc::new(HandlerShared {
				channel: Channel::new(capacity)?,
				graph,
				renderer,
				thread: Mutex::new(None),
				thread_id: Arc::default(),
			}),
		})
	}

	/// Spawns the UI thread and waits until it holds the UI role.
	///
	/// A handler starts at most once. Must not be called from inside an
	/// async runtime.
	///
	/// # Errors
	///
	/// `StartupError` when the handler was already started, the UI role is
	/// held by another thread, or the thread cannot be created.
	pub fn start(&self) -> Result<()> {
		let mut slot = self.shared.thread.lock();
		if slot.is_some() || self.shared.thread_id.get().is_some() {
			return Err(Error::startup("event handler already started"));
		}

		let (ready_tx, ready_rx) = oneshot::channel();
		let event_loop = EventLoop {
			thread_id: Arc::clone(&self.shared.thread_id),
			channel: self.shared.channel.clone(),
			graph: self.shared.graph.clone(),
			renderer: self.shared.renderer.clone(),
		};
		let handle = spawn_role_thread(ThreadRole::Ui, move || event_loop.run(ready_tx))?;

		match ready_rx.blocking_recv() {
			Ok(Ok(())) => {
				*slot = Some(handle);
				tracing::debug!("event.handler.started");
				Ok(())
			}
			Ok(Err(error)) => {
				join_role_thread(ThreadRole::Ui, handle);
				Err(error)
			}
			Err(_) => {
				join_role_thread(ThreadRole::Ui, handle);
				Err(Error::startup("UI thread exited during startup"))
			}
		}
	}

	/// Returns `true` on the handler's UI thread.
	pub fn is_event_thread(&self) -> bool {
		self.shared.thread_id.get() == Some(&std::thread::current().id())
	}

	pub fn graph(&self) -> &Graph {
		&self.shared.graph
	}

	/// Number of events waiting for dispatch.
	pub fn pending(&self) -> usize {
		self.shared.channel.len()
	}

	/// Queues `event`, waiting for room when the channel is full.
	///
	/// On the UI thread itself a full channel is refused with
	/// [`ChannelError::Full`] instead, since waiting there would stall the
	/// loop that drains it.
	pub fn schedule(&self, event: impl Event) -> Result<(), ChannelError> {
		self.schedule_boxed(Box::new(event))
	}

	pub fn schedule_boxed(&self, event: BoxedEvent) -> Result<(), ChannelError> {
		let result = if self.is_event_thread() {
			self.shared.channel.try_push(event)
		} else {
			self.shared.channel.push_blocking(event)
		};
		if let Err(error) = &result {
			tracing::debug!(%error, "event.schedule.refused");
		}
		result
	}

	/// Queues a closure as an anonymous event.
	pub fn schedule_fn<F>(&self, f: F) -> Result<(), ChannelError>
	where
		F: FnOnce() -> anyhow::Result<()> + Send + 'static,
	{
		self.schedule(FnEvent::new(f))
	}

	/// Queues a future built on the UI thread by `make`.
	pub fn schedule_future<F, Fut>(&self, make: F) -> Result<(), ChannelError>
	where
		F: FnOnce() -> Fut + Send + 'static,
		Fut: Future<Output = anyhow::Result<()>> + 'static,
	{
		self.schedule(FutureEvent::new(make))
	}

	/// Queues `event` from inside a task, suspending while the channel is full.
	pub async fn send(&self, event: impl Event) -> Result<(), ChannelError> {
		self.shared.channel.push(Box::new(event)).await
	}

	/// Closes the channel, lets in-flight events finish and joins the thread.
	pub fn close(&self) {
		self.shared.close();
	}

	pub fn is_closed(&self) -> bool {
		self.shared.channel.is_closed()
	}
}

/// State moved onto the UI thread.
struct EventLoop {
	thread_id: Arc<OnceLock<ThreadId>>,
	channel: Channel<BoxedEvent>,
	graph: Graph,
	renderer: Option<Arc<dyn FrameRenderer>>,
}

impl EventLoop {
	fn run(self, ready: oneshot::Sender<Result<()>>) {
		let _ = self.thread_id.set(std::thread::current().id());
		let runtime = match local_runtime(ThreadRole::Ui) {
			Ok(runtime) => runtime,
			Err(error) => {
				let _ = ready.send(Err(error));
				return;
			}
		};
		let guard = match self.graph.claim_ui_thread() {
			Ok(guard) => guard,
			Err(error) => {
				let _ = ready.send(Err(error));
				return;
			}
		};
		if ready.send(Ok(())).is_err() {
			return;
		}

		LocalSet::new().block_on(&runtime, self.dispatch());
		drop(guard);
	}

	async fn dispatch(self) {
		let mut tasks = JoinSet::new();
		let mut weight = 0.0f32;
		let mut handled_since_render = false;

		loop {
			while let Some(result) = tasks.try_join_next() {
				report(result);
			}

			let event = match self.channel.try_pop() {
				Some(event) => event,
				None => {
					if handled_since_render {
						self.render();
						weight = 0.0;
						handled_since_render = false;
					}
					tokio::select! {
						popped = self.channel.pop() => match popped {
							Some(event) => event,
							None => break,
						},
						Some(result) = tasks.join_next(), if !tasks.is_empty() => {
							report(result);
							continue;
						}
					}
				}
			};

			let name = event.name();
			weight += event.weight();
			handled_since_render = true;
			tracing::trace!(event = name, pending = self.channel.len(), "event.dispatch");
			tasks.spawn_local(async move {
				if let Err(error) = event.run().await {
					tracing::error!(event = name, error = %format!("{error:#}"), "event.failed");
				}
			});
			tokio::task::yield_now().await;

			if weight >= 1.0 {
				self.render();
				weight = 0.0;
				handled_since_render = false;
			}
		}

		tracing::debug!(in_flight = tasks.len(), "event.loop.draining");
		while let Some(result) = tasks.join_next().await {
			report(result);
		}
		if handled_since_render {
			self.render();
		}
	}

	fn render(&self) {
		let Some(renderer) = &self.renderer else {
			return;
		};
		tracing::trace!("event.render");
		if let Err(error) = renderer.render_frame(&self.graph) {
			tracing::error!(error = %format!("{error:#}"), "event.render.failed");
		}
	}
}

fn report(result: std::result::Result<(), JoinError>) {
	if let Err(error) = result
		&& let Some(panic) = join_error_panic_message(error)
	{
		tracing::error!(%panic, "event.panicked");
	}
}
