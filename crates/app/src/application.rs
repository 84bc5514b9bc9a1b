use std::sync::Arc;

use arbor_graph::{Error, Graph, Result};
use arbor_worker::{EventHandler, FrameRenderer, TimerPool};
use parking_lot::Mutex;

use crate::config::AppConfig;
use crate::logging::init_logging;
use crate::render::{RenderManager, Renderer};

static CURRENT: Mutex<Option<AppContext>> = Mutex::new(None);

/// Shared access to the running application's graph, event handler and
/// timer pool.
#[derive(Debug, Clone)]
pub struct AppContext {
	graph: Graph,
	events: EventHandler,
	timers: Arc<TimerPool>,
}

impl AppContext {
	pub fn graph(&self) -> &Graph {
		&self.graph
	}

	pub fn events(&self) -> &EventHandler {
		&self.events
	}

	pub fn timers(&self) -> &TimerPool {
		&self.timers
	}
}

/// The process-wide application.
///
/// Dropping it shuts it down.
#[derive(Debug)]
pub struct Application {
	context: AppContext,
	render: Option<Arc<RenderManager>>,
	running: bool,
}

impl Application {
	/// Builds the graph, timer pool, render thread and event handler, then
	/// starts the UI thread.
	///
	/// Without a `renderer` no render thread is spawned and frames are
	/// skipped.
	///
	/// # Errors
	///
	/// `StartupError` when an application is already running or a thread
	/// fails to start, `ValueError` for an invalid configuration.
	pub fn start(config: AppConfig, renderer: Option<Box<dyn Renderer>>) -> Result<Self> {
		let mut current = CURRENT.lock();
		if current.is_some() {
			return Err(Error::startup("an application is already running"));
		}
		config.validate().map_err(|error| Error::value(error.to_string()))?;
		init_logging(&config.log);

		let graph = Graph::new();
		let timers = Arc::new(TimerPool::new(config.timers.capacity)?);
		let render = renderer
			.map(|renderer| RenderManager::new(graph.clone(), renderer).map(Arc::new))
			.transpose()?;
		let frames = render.clone().map(|render| render as Arc<dyn FrameRenderer>);
		let events = EventHandler::new(graph.clone(), config.events.capacity, frames)?;
		events.start()?;

		let context = AppContext { graph, events, timers };
		*current = Some(context.clone());
		tracing::info!(
			events = config.events.capacity,
			timers = config.timers.capacity,
			render = render.is_some(),
			"app.started"
		);
		Ok(Self {
			context,
			render,
			running: true,
		})
	}

	/// Context of the running application, if any.
	pub fn current() -> Option<AppContext> {
		CURRENT.lock().clone()
	}

	pub fn context(&self) -> &AppContext {
		&self.context
	}

	pub fn render(&self) -> Option<&RenderManager> {
		self.render.as_deref()
	}

	/// Drains pending events, joins the timer and render threads and
	/// releases the graph.
	///
	/// Must not be called from an event or timer callback.
	pub fn shutdown(mut self) {
		self.stop();
	}

	fn stop(&mut self) {
		if !std::mem::take(&mut self.running) {
			return;
		}
		self.context.events.close();
		self.context.timers.close();
		if let Some(render) = self.render.take() {
			render.stop();
		}
		self.context.graph.shutdown();
		CURRENT.lock().take();
		tracing::info!("app.shutdown");
	}
}

impl Drop for Application {
	fn drop(&mut self) {
		self.stop();
	}
}
