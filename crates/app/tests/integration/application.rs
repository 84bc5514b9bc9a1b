use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use arbor_app::{AppConfig, Application, ChannelConfig, Renderer};
use arbor_graph::{ErrorKind, Graph, NodeContext, NodeHandle, NodeKind, PropertyKey, Result};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serial_test::serial;

const VALUE: PropertyKey<i32> = PropertyKey::new("value");

struct Dial;

impl NodeKind for Dial {
	fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
		ctx.declare(&VALUE, 0)?;
		Ok(())
	}
}

type Frames = Arc<Mutex<Vec<Vec<(String, i32)>>>>;

/// Records the dirty dials of every frame. The first frame optionally
/// reports that it started and waits for a go-ahead.
#[derive(Default)]
struct Recorder {
	frames: Frames,
	gate: Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>,
}

impl Renderer for Recorder {
	fn draw(&mut self, graph: &Graph, dirty: &[NodeHandle]) -> anyhow::Result<()> {
		anyhow::ensure!(graph.frozen_by() == Some(std::thread::current().id()), "graph not frozen for renderer");
		if let Some((started, go)) = self.gate.take() {
			started.send(())?;
			go.recv()?;
		}
		let mut frame = Vec::new();
		for node in dirty {
			frame.push((node.name()?, node.get::<i32>(VALUE.name())?));
		}
		self.frames.lock().push(frame);
		Ok(())
	}
}

#[test]
#[serial]
fn one_application_per_process() {
	let app = Application::start(AppConfig::default(), None).unwrap();
	assert!(Application::current().is_some());

	let err = Application::start(AppConfig::default(), None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Startup);

	app.shutdown();
	assert!(Application::current().is_none());

	let again = Application::start(AppConfig::default(), None).unwrap();
	drop(again);
	assert!(Application::current().is_none());
}

#[test]
#[serial]
fn invalid_config_is_refused() {
	let config = AppConfig {
		events: ChannelConfig { capacity: 12 },
		..AppConfig::default()
	};
	let err = Application::start(config, None).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Value);
	assert!(Application::current().is_none());
}

#[test]
#[serial]
fn events_run_on_the_ui_thread_of_the_current_graph() {
	let app = Application::start(AppConfig::default(), None).unwrap();
	let context = Application::current().unwrap();
	assert!(context.graph().same_graph(app.context().graph()));

	let seen = Arc::new(Mutex::new(Vec::new()));
	context
		.events()
		.schedule_fn({
			let seen = Arc::clone(&seen);
			move || {
				let context = Application::current().ok_or_else(|| anyhow::anyhow!("no application"))?;
				seen.lock().push(context.graph().is_ui_thread());
				Ok(())
			}
		})
		.unwrap();
	app.shutdown();

	assert_eq!(*seen.lock(), vec![true]);
}

#[test]
#[serial]
fn timer_callbacks_hand_work_to_the_ui_thread() {
	let app = Application::start(AppConfig::default(), None).unwrap();
	let context = app.context().clone();
	let seen = Arc::new(Mutex::new(Vec::new()));

	let timer = context.timers().after(Duration::from_millis(5), {
		let events = context.events().clone();
		let graph = context.graph().clone();
		let seen = Arc::clone(&seen);
		move || {
			let graph = graph.clone();
			let seen = Arc::clone(&seen);
			events.schedule_fn(move || {
				seen.lock().push(graph.is_ui_thread());
				Ok(())
			})?;
			Ok(())
		}
	});
	timer.start(false).unwrap();
	assert!(timer.wait_finished(Duration::from_secs(2)));
	assert!(!timer.has_exception());
	app.shutdown();

	assert_eq!(*seen.lock(), vec![true]);
}

#[test]
#[serial]
fn render_thread_draws_synchronised_dirty_nodes() {
	let recorder = Recorder::default();
	let frames = Arc::clone(&recorder.frames);
	let app = Application::start(AppConfig::default(), Some(Box::new(recorder))).unwrap();

	let graph = app.context().graph().clone();
	app.context()
		.events()
		.schedule_fn(move || {
			let dial = graph.root().create_child(Dial)?.handle();
			dial.set_name("dial")?;
			dial.set(VALUE.name(), 5)?;
			Ok(())
		})
		.unwrap();
	app.shutdown();

	assert_eq!(*frames.lock(), vec![vec![("dial".to_owned(), 5)]]);
}

#[test]
#[serial]
fn render_thread_reads_a_snapshot_while_ui_mutates() {
	let (started_tx, started_rx) = mpsc::channel();
	let (go_tx, go_rx) = mpsc::channel();
	let recorder = Recorder {
		gate: Some((started_tx, go_rx)),
		..Recorder::default()
	};
	let frames = Arc::clone(&recorder.frames);
	let app = Application::start(AppConfig::default(), Some(Box::new(recorder))).unwrap();
	let events = app.context().events().clone();

	let graph = app.context().graph().clone();
	events
		.schedule_fn(move || {
			let dial = graph.root().create_child(Dial)?.handle();
			dial.set_name("dial")?;
			dial.set(VALUE.name(), 5)?;
			Ok(())
		})
		.unwrap();
	started_rx.recv_timeout(Duration::from_secs(2)).unwrap();

	let (set_tx, set_rx) = mpsc::channel();
	let graph = app.context().graph().clone();
	events
		.schedule_fn(move || {
			let dial = graph.node_by_name("dial").ok_or_else(|| anyhow::anyhow!("dial missing"))?;
			dial.set(VALUE.name(), 7)?;
			set_tx.send(())?;
			Ok(())
		})
		.unwrap();
	set_rx.recv_timeout(Duration::from_secs(2)).unwrap();
	go_tx.send(()).unwrap();
	app.shutdown();

	assert_eq!(
		*frames.lock(),
		vec![vec![("dial".to_owned(), 5)], vec![("dial".to_owned(), 7)]]
	);
}
