//! The render thread.
//!
//! Frames are handed over from the UI thread one at a time. Before a frame
//! leaves the UI thread the graph is synchronised and frozen on behalf of the
//! render thread, which therefore reads a stable snapshot while the UI thread
//! keeps mutating overlays. The render thread unfreezes when it is done.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{JoinHandle, ThreadId};

use arbor_graph::{Graph, NodeHandle, Result};
use arbor_worker::{Channel, FrameRenderer, ThreadRole, panic_message, spawn_role_thread};
use parking_lot::{Condvar, Mutex};

/// Draws the scene.
pub trait Renderer: Send + 'static {
	/// Draws one frame. `dirty` lists the nodes that changed since the
	/// previous frame. The graph is frozen for the calling thread.
	fn draw(&mut self, graph: &Graph, dirty: &[NodeHandle]) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
struct FrameSlot {
	in_flight: bool,
	stopped: bool,
	rendered: u64,
}

struct RenderShared {
	graph: Graph,
	frames: Channel<Vec<NodeHandle>>,
	slot: Mutex<FrameSlot>,
	idle: Condvar,
}

impl RenderShared {
	fn frame_done(&self, drawn: bool) {
		let mut slot = self.slot.lock();
		slot.in_flight = false;
		if drawn {
			slot.rendered += 1;
		}
		drop(slot);
		self.idle.notify_all();
	}
}

/// Owner of the render thread; the event handler's frame renderer.
pub struct RenderManager {
	shared: Arc<RenderShared>,
	render_thread: ThreadId,
	thread: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RenderManager {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RenderManager")
			.field("thread", &self.render_thread)
			.field("slot", &*self.shared.slot.lock())
			.finish()
	}
}

impl RenderManager {
	/// Spawns the render thread drawing `graph` with `renderer`.
	pub fn new(graph: Graph, renderer: Box<dyn Renderer>) -> Result<Self> {
		let shared = Arc::new(RenderShared {
			graph,
			frames: Channel::new(1)?,
			slot: Mutex::new(FrameSlot::default()),
			idle: Condvar::new(),
		});
		let worker = Arc::clone(&shared);
		let thread = spawn_role_thread(ThreadRole::Render, move || render_loop(&worker, renderer))?;
		tracing::debug!("render.started");
		Ok(Self {
			shared,
			render_thread: thread.thread().id(),
			thread: Mutex::new(Some(thread)),
		})
	}

	/// Frames drawn so far, failed ones excluded.
	pub fn frames_rendered(&self) -> u64 {
		self.shared.slot.lock().rendered
	}

	/// Blocks until no frame is in flight.
	pub fn wait_idle(&self) {
		let mut slot = self.shared.slot.lock();
		while slot.in_flight && !slot.stopped {
			self.shared.idle.wait(&mut slot);
		}
	}

	/// Draws the frame in flight, if any, and joins the render thread.
	pub fn stop(&self) {
		self.shared.frames.close();
		let thread = self.thread.lock().take();
		if let Some(thread) = thread {
			if let Err(payload) = thread.join() {
				tracing::error!(panic = %panic_message(&*payload), "render.thread.panicked");
			}
			tracing::debug!(frames = self.frames_rendered(), "render.stopped");
		}
	}
}

impl FrameRenderer for RenderManager {
	fn render_frame(&self, graph: &Graph) -> anyhow::Result<()> {
		{
			let mut slot = self.shared.slot.lock();
			while slot.in_flight && !slot.stopped {
				self.shared.idle.wait(&mut slot);
			}
			if slot.stopped {
				anyhow::bail!("render thread has stopped");
			}
			slot.in_flight = true;
		}

		let dirty = match graph.synchronise() {
			Ok(dirty) => dirty,
			Err(error) => {
				self.shared.frame_done(false);
				return Err(error.into());
			}
		};
		graph.freeze(self.render_thread);
		tracing::trace!(dirty = dirty.len(), "render.frame.submit");
		if let Err(error) = self.shared.frames.try_push(dirty) {
			graph.unfreeze();
			self.shared.frame_done(false);
			return Err(error.into());
		}
		Ok(())
	}
}

impl Drop for RenderManager {
	fn drop(&mut self) {
		self.stop();
	}
}

fn render_loop(shared: &RenderShared, mut renderer: Box<dyn Renderer>) {
	let current = std::thread::current().id();
	while let Some(dirty) = shared.frames.pop_blocking() {
		let outcome = catch_unwind(AssertUnwindSafe(|| renderer.draw(&shared.graph, &dirty)));
		let drawn = match outcome {
			Ok(Ok(())) => true,
			Ok(Err(error)) => {
				tracing::error!(error = %format!("{error:#}"), "render.draw.failed");
				false
			}
			Err(payload) => {
				tracing::error!(panic = %panic_message(&*payload), "render.draw.panicked");
				false
			}
		};
		if shared.graph.frozen_by() == Some(current) {
			shared.graph.unfreeze();
		}
		drop(dirty);
		shared.frame_done(drawn);
	}

	shared.slot.lock().stopped = true;
	shared.idle.notify_all();
}
