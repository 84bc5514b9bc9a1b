use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use arbor_graph::{ErrorKind, Graph, NodeKind};
use arbor_worker::{ChannelError, Event, EventHandler, FnEvent, FrameRenderer};
use async_trait::async_trait;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;

struct Leaf;

impl NodeKind for Leaf {}

#[derive(Default)]
struct CountingRenderer {
	frames: AtomicUsize,
}

impl FrameRenderer for CountingRenderer {
	fn render_frame(&self, graph: &Graph) -> anyhow::Result<()> {
		assert!(graph.is_ui_thread());
		self.frames.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}
}

fn handler() -> EventHandler {
	EventHandler::new(Graph::new(), 8, None).unwrap()
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record(log: &Log, entry: &'static str) -> impl FnOnce() -> anyhow::Result<()> + Send + 'static {
	let log = Arc::clone(log);
	move || {
		log.lock().push(entry);
		Ok(())
	}
}

#[test]
fn rejects_invalid_capacity() {
	let err = EventHandler::new(Graph::new(), 12, None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn events_run_in_order_on_the_ui_thread() {
	let handler = handler();
	handler.start().unwrap();
	let log = Log::default();

	let graph = handler.graph().clone();
	handler
		.schedule_fn({
			let log = Arc::clone(&log);
			move || {
				log.lock().push(if graph.is_ui_thread() { "ui" } else { "elsewhere" });
				Ok(())
			}
		})
		.unwrap();
	for entry in ["a", "b", "c"] {
		handler.schedule_fn(record(&log, entry)).unwrap();
	}
	handler.close();

	assert_eq!(*log.lock(), vec!["ui", "a", "b", "c"]);
	assert!(handler.is_closed());
	assert!(!handler.graph().is_ui_thread());
	assert_eq!(handler.graph().ui_thread(), None);
}

#[test]
fn events_may_mutate_the_graph() {
	let handler = handler();
	handler.start().unwrap();

	let graph = handler.graph().clone();
	handler
		.schedule_fn(move || {
			let node = graph.root().create_child(Leaf)?.handle();
			node.set_name("leaf")?;
			Ok(())
		})
		.unwrap();
	handler.close();

	assert!(handler.graph().node_by_name("leaf").is_some());
}

#[test]
fn start_twice_fails() {
	let handler = handler();
	handler.start().unwrap();
	assert_eq!(handler.start().unwrap_err().kind(), ErrorKind::Startup);
	handler.close();
}

#[test]
fn start_fails_when_ui_role_taken() {
	let graph = Graph::new();
	let _ui = graph.claim_ui_thread().unwrap();
	let handler = EventHandler::new(graph, 8, None).unwrap();
	assert_eq!(handler.start().unwrap_err().kind(), ErrorKind::Startup);
}

#[test]
fn failing_and_panicking_events_do_not_stop_the_loop() {
	let handler = handler();
	handler.start().unwrap();
	let log = Log::default();

	handler.schedule_fn(|| anyhow::bail!("event failed")).unwrap();
	handler.schedule_fn(|| panic!("event exploded")).unwrap();
	handler.schedule_fn(record(&log, "after")).unwrap();
	handler.close();

	assert_eq!(*log.lock(), vec!["after"]);
}

#[test]
fn suspended_event_lets_later_events_run() {
	let handler = handler();
	handler.start().unwrap();
	let log = Log::default();
	let (tx, rx) = tokio::sync::oneshot::channel::<()>();

	handler
		.schedule_future({
			let log = Arc::clone(&log);
			move || async move {
				rx.await?;
				log.lock().push("resumed");
				Ok(())
			}
		})
		.unwrap();
	handler
		.schedule_fn({
			let log = Arc::clone(&log);
			move || {
				log.lock().push("wake");
				let _ = tx.send(());
				Ok(())
			}
		})
		.unwrap();
	handler.close();

	assert_eq!(*log.lock(), vec!["wake", "resumed"]);
}

#[test]
fn tasks_can_send_follow_up_events() {
	let handler = handler();
	handler.start().unwrap();
	let log = Log::default();

	let (done_tx, done_rx) = tokio::sync::oneshot::channel();
	let sender = handler.clone();
	let follow_up = {
		let log = Arc::clone(&log);
		move || {
			log.lock().push("follow-up");
			let _ = done_tx.send(());
			Ok(())
		}
	};
	handler
		.schedule_future(move || async move {
			sender.send(FnEvent::new(follow_up)).await?;
			Ok(())
		})
		.unwrap();
	done_rx.blocking_recv().unwrap();
	handler.close();

	assert_eq!(*log.lock(), vec!["follow-up"]);
}

#[test]
fn scheduling_on_full_channel_from_ui_thread_is_refused() {
	let handler = EventHandler::new(Graph::new(), 2, None).unwrap();
	handler.start().unwrap();
	let results = Arc::new(Mutex::new(Vec::new()));

	let (done_tx, done_rx) = tokio::sync::oneshot::channel();
	let inner = handler.clone();
	handler
		.schedule_fn({
			let results = Arc::clone(&results);
			move || {
				for _ in 0..3 {
					results.lock().push(inner.schedule_fn(|| Ok(())));
				}
				let _ = done_tx.send(());
				Ok(())
			}
		})
		.unwrap();
	done_rx.blocking_recv().unwrap();
	handler.close();

	assert_eq!(*results.lock(), vec![Ok(()), Ok(()), Err(ChannelError::Full)]);
}

#[test]
fn schedule_after_close_is_refused() {
	let handler = handler();
	handler.start().unwrap();
	handler.close();
	assert_eq!(handler.schedule_fn(|| Ok(())), Err(ChannelError::Closed));
}

struct Heavy;

#[async_trait(?Send)]
impl Event for Heavy {
	async fn run(self: Box<Self>) -> anyhow::Result<()> {
		Ok(())
	}

	fn weight(&self) -> f32 {
		0.5
	}
}

#[test]
fn accumulated_weight_triggers_frames() {
	let renderer = Arc::new(CountingRenderer::default());
	let handler = EventHandler::new(Graph::new(), 8, Some(renderer.clone())).unwrap();
	for _ in 0..4 {
		handler.schedule(Heavy).unwrap();
	}
	handler.start().unwrap();
	handler.close();

	assert_eq!(renderer.frames.load(Ordering::SeqCst), 2);
}

#[test]
fn draining_the_queue_renders_once() {
	let renderer = Arc::new(CountingRenderer::default());
	let handler = EventHandler::new(Graph::new(), 8, Some(renderer.clone())).unwrap();
	handler.schedule_fn(|| Ok(())).unwrap();
	handler.start().unwrap();
	handler.close();

	assert_eq!(renderer.frames.load(Ordering::SeqCst), 1);
}

#[test]
fn idle_handler_never_renders() {
	let renderer = Arc::new(CountingRenderer::default());
	let handler = EventHandler::new(Graph::new(), 8, Some(renderer.clone())).unwrap();
	handler.start().unwrap();
	handler.close();

	assert_eq!(renderer.frames.load(Ordering::SeqCst), 0);
}
