//! Copy-on-write behaviour while a reader holds the freeze.

use std::sync::{Arc, Barrier};
use std::thread;

use arbor_graph::ErrorKind;
use pretty_assertions::assert_eq;

use crate::common::{INT, panel, ui_graph, widget};

#[test]
fn freeze_is_first_come() {
	let (graph, _ui) = ui_graph();
	let me = thread::current().id();
	graph.freeze(me);

	let other = thread::spawn({
		let graph = graph.clone();
		move || {
			graph.freeze(thread::current().id());
			thread::current().id()
		}
	})
	.join()
	.unwrap();

	assert_eq!(graph.frozen_by(), Some(me));
	assert_ne!(graph.frozen_by(), Some(other));
	graph.unfreeze();
	assert_eq!(graph.frozen_by(), None);
}

#[test]
fn freeze_guard_unfreezes_only_what_it_froze() {
	let (graph, _ui) = ui_graph();
	{
		let _guard = graph.freeze_current();
		assert!(graph.frozen_by().is_some());
		let nested = graph.freeze_current();
		drop(nested);
		assert!(graph.frozen_by().is_some());
	}
	assert_eq!(graph.frozen_by(), None);
}

#[test]
fn frozen_ui_thread_reads_its_own_snapshot() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());

	let guard = graph.freeze_current();
	INT.set(&node, 9).unwrap();
	assert_eq!(INT.get(&node).unwrap(), 0);
	drop(guard);

	assert_eq!(INT.get(&node).unwrap(), 9);
	graph.synchronise().unwrap();
	assert_eq!(INT.get(&node).unwrap(), 9);
}

/// Runs `check` on a separate thread that freezes the graph first.
fn on_frozen_reader<R: Send>(graph: &arbor_graph::Graph, check: impl FnOnce() -> R + Send) -> R {
	thread::scope(|scope| {
		scope
			.spawn(|| {
				graph.freeze(thread::current().id());
				let result = check();
				graph.unfreeze();
				result
			})
			.join()
			.unwrap()
	})
}

#[test]
fn structural_writes_go_to_overlay_while_frozen() {
	let (graph, _ui) = ui_graph();
	let parent = panel(&graph.root());
	let (a, b) = (widget(&parent), widget(&parent));

	let reader = graph.clone();
	let barrier = Arc::new(Barrier::new(2));
	thread::scope(|scope| {
		let render = scope.spawn({
			let (parent, a, b, barrier) = (parent.clone(), a.clone(), b.clone(), Arc::clone(&barrier));
			move || {
				reader.freeze(thread::current().id());
				barrier.wait();
				barrier.wait();
				let seen = parent.children().unwrap();
				reader.unfreeze();
				(seen, vec![a.erase(), b.erase()])
			}
		});
		barrier.wait();
		a.stack_front().unwrap();
		assert_eq!(parent.children().unwrap(), vec![b.erase(), a.erase()]);
		barrier.wait();
		let (seen, original) = render.join().unwrap();
		assert_eq!(seen, original);
	});

	graph.synchronise().unwrap();
	let after = on_frozen_reader(&graph, || parent.children().unwrap());
	assert_eq!(after, vec![b.erase(), a.erase()]);
}

#[test]
fn nodes_removed_while_frozen_survive_for_reader() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());
	INT.set(&node, 4).unwrap();
	graph.synchronise().unwrap();

	let reader = graph.clone();
	let barrier = Arc::new(Barrier::new(2));
	thread::scope(|scope| {
		let render = scope.spawn({
			let (node, barrier) = (node.clone(), Arc::clone(&barrier));
			move || {
				reader.freeze(thread::current().id());
				barrier.wait();
				barrier.wait();
				let value = INT.get(&node);
				let children = reader.root().child_count();
				reader.unfreeze();
				(value.unwrap(), children.unwrap())
			}
		});
		barrier.wait();
		node.remove().unwrap();
		assert_eq!(node.get::<i32>("int").unwrap_err().kind(), ErrorKind::HandleExpired);
		barrier.wait();
		assert_eq!(render.join().unwrap(), (4, 1));
	});

	assert_eq!(graph.node_count(), 1);
	graph.synchronise().unwrap();
	assert!(!node.is_alive());
	assert_eq!(graph.root().child_count().unwrap(), 0);
}

#[test]
fn nodes_created_while_frozen_appear_after_synchronise() {
	let (graph, _ui) = ui_graph();
	let reader = graph.clone();
	let barrier = Arc::new(Barrier::new(2));

	let child = thread::scope(|scope| {
		let render = scope.spawn({
			let barrier = Arc::clone(&barrier);
			move || {
				reader.freeze(thread::current().id());
				barrier.wait();
				barrier.wait();
				let count = reader.root().child_count().unwrap();
				reader.unfreeze();
				count
			}
		});
		barrier.wait();
		let child = widget(&graph.root());
		barrier.wait();
		assert_eq!(render.join().unwrap(), 0);
		child
	});

	assert_eq!(graph.root().children().unwrap(), vec![child.erase()]);
	graph.synchronise().unwrap();
	let seen = on_frozen_reader(&graph, || graph.root().child_count().unwrap());
	assert_eq!(seen, 1);
}

#[test]
fn synchronise_requires_ui_thread() {
	let (graph, _ui) = ui_graph();
	let err = on_frozen_reader(&graph, || graph.synchronise().unwrap_err());
	assert_eq!(err.kind(), ErrorKind::Thread);
}

#[test]
fn refreeze_without_synchronise_shows_latest_values() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());

	let guard = graph.freeze_current();
	INT.set(&node, 5).unwrap();
	drop(guard);
	INT.set(&node, 10).unwrap();
	let ui_before = INT.get(&node).unwrap();
	assert_eq!(ui_before, 10);

	let seen = on_frozen_reader(&graph, || INT.get(&node).unwrap());
	assert_eq!(seen, ui_before);
	assert_eq!(graph.synchronise().unwrap(), vec![node.erase()]);
	assert_eq!(INT.get(&node).unwrap(), 10);
}

#[test]
fn refreeze_without_synchronise_shows_latest_child_order() {
	let (graph, _ui) = ui_graph();
	let parent = panel(&graph.root());
	let (a, b) = (widget(&parent), widget(&parent));

	let guard = graph.freeze_current();
	a.stack_front().unwrap();
	drop(guard);
	b.stack_front().unwrap();
	let ui_before = parent.children().unwrap();
	assert_eq!(ui_before, vec![a.erase(), b.erase()]);

	let seen = on_frozen_reader(&graph, || parent.children().unwrap());
	assert_eq!(seen, ui_before);
}

#[test]
fn refreeze_without_synchronise_drops_removed_nodes() {
	let (graph, _ui) = ui_graph();
	let parent = panel(&graph.root());
	let (a, b) = (widget(&parent), widget(&parent));

	let guard = graph.freeze_current();
	a.remove().unwrap();
	drop(guard);
	assert_eq!(graph.node_count(), 3);

	let (children, alive) = on_frozen_reader(&graph, || (parent.children().unwrap(), a.is_alive()));
	assert_eq!(children, vec![b.erase()]);
	assert!(!alive);
	assert_eq!(graph.node_count(), 3);
}
