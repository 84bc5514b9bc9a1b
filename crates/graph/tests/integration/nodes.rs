use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use arbor_graph::{Error, ErrorKind, Graph, NodeContext, NodeKind, PropertyKey, Result, USER_FLAG_COUNT};
use parking_lot::Mutex;

use crate::common::{INT, LABEL, Panel, Widget, panel, ui_graph, widget};

// ── Identity and naming ──

#[test]
fn uuids_are_unique_and_resolvable() {
	let (graph, _ui) = ui_graph();
	let nodes: Vec<_> = (0..32).map(|_| widget(&graph.root())).collect();
	let uuids: HashSet<_> = nodes.iter().map(|n| n.uuid().unwrap()).collect();
	assert_eq!(uuids.len(), nodes.len());

	for node in &nodes {
		assert_eq!(graph.node_by_uuid(node.uuid().unwrap()), Some(node.erase()));
	}
}

#[test]
fn unnamed_node_gets_stable_mnemonic() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());

	let name = node.name().unwrap();
	assert_eq!(name.len(), 8);
	assert_eq!(node.name().unwrap(), name);
	assert_eq!(graph.node_by_name(&name), Some(node.erase()));
	assert_eq!(graph.name_of(node.uuid().unwrap()).unwrap(), name);
}

#[test]
fn root_is_named_root() {
	let graph = Graph::new();
	assert_eq!(graph.root().name().unwrap(), "root");
	assert_eq!(graph.root().parent().unwrap(), graph.root());
	assert_eq!(graph.node_count(), 1);
}

#[test]
fn renaming_frees_the_old_name() {
	let (graph, _ui) = ui_graph();
	let (a, b) = (widget(&graph.root()), widget(&graph.root()));
	a.set_name("button").unwrap();
	a.set_name("toggle").unwrap();
	assert_eq!(b.set_name("button").unwrap(), "button");
	assert!(graph.node_by_name("toggle").is_some());
}

#[test]
fn removed_node_releases_name_and_uuid() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());
	node.set_name("gone").unwrap();
	let uuid = node.uuid().unwrap();

	node.remove().unwrap();
	assert!(graph.node_by_name("gone").is_none());
	assert!(graph.node_by_uuid(uuid).is_none());
	assert_eq!(graph.name_of(uuid).unwrap_err().kind(), ErrorKind::Name);
}

#[test]
fn removal_during_shutdown_keeps_registrations() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());
	node.set_name("lingering").unwrap();
	let uuid = node.uuid().unwrap();

	graph.shutdown();
	node.remove().unwrap();
	assert!(!node.is_alive());
	assert_eq!(graph.node_count(), 1);
	assert!(graph.node_by_uuid(uuid).is_some());
	assert_eq!(graph.name_of(uuid).unwrap(), "lingering");
}

// ── Layout declaration ──

/// Keeps the context its hooks were given.
#[derive(Default)]
struct Retained(Mutex<Option<NodeContext<Retained>>>);

impl NodeKind for Retained {
	fn finalize(&self, ctx: &NodeContext<Self>) -> Result<()> {
		*self.0.lock() = Some(ctx.clone());
		Ok(())
	}
}

#[test]
fn declaring_after_creation_fails_finalized() {
	let (graph, _ui) = ui_graph();
	let node = graph.root().create_child(Retained::default()).unwrap().handle();
	assert!(node.is_finalized().unwrap());

	let ctx = node.kind().unwrap().0.lock().clone().unwrap();
	let err = ctx.add_property("late", 0u8, true).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Finalized);
	let err = ctx.add_slot::<()>("late_slot").unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Finalized);
}

struct Duplicated;

impl NodeKind for Duplicated {
	fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
		ctx.add_property("x", 0i32, true)?;
		ctx.add_signal::<i32>("x")
	}
}

#[test]
fn duplicate_declaration_rejects_creation() {
	let (graph, _ui) = ui_graph();
	let err = graph.root().create_child(Duplicated).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::NotUnique);
	assert_eq!(graph.node_count(), 1);
	assert_eq!(graph.root().child_count().unwrap(), 0);
}

/// Builds a child during `declare`, then fails.
struct Abandoning;

impl NodeKind for Abandoning {
	fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
		let child = ctx.create_child(Widget)?.handle();
		child.set_name("stranded")?;
		Err(Error::value("declare gave up"))
	}
}

#[test]
fn failed_creation_discards_children_built_by_hooks() {
	let (graph, _ui) = ui_graph();
	let err = graph.root().create_child(Abandoning).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Value);
	assert_eq!(graph.node_count(), 1);
	assert_eq!(graph.root().child_count().unwrap(), 0);
	assert!(graph.node_by_name("stranded").is_none());
	assert!(graph.dirty_nodes().is_empty());
}

struct Counted(Arc<AtomicUsize>);

impl NodeKind for Counted {
	fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
		assert!(!ctx.is_finalized().unwrap());
		self.0.fetch_add(1, Ordering::SeqCst);
		Ok(())
	}

	fn finalize(&self, ctx: &NodeContext<Self>) -> Result<()> {
		assert_eq!(ctx.parent().unwrap(), ctx.graph().unwrap().root());
		self.0.fetch_add(10, Ordering::SeqCst);
		Ok(())
	}
}

#[test]
fn hooks_run_once_in_order() {
	let (graph, _ui) = ui_graph();
	let calls = Arc::new(AtomicUsize::new(0));
	let node = graph.root().create_child(Counted(Arc::clone(&calls))).unwrap().handle();
	assert_eq!(calls.load(Ordering::SeqCst), 11);
	assert!(Arc::ptr_eq(&node.kind().unwrap().0, &calls));
}

// ── Properties ──

#[test]
fn property_lookup_checks_name_and_type() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());

	assert_eq!(node.get::<i32>("missing").unwrap_err().kind(), ErrorKind::Name);
	assert_eq!(node.get::<String>("int").unwrap_err().kind(), ErrorKind::Type);
	assert_eq!(node.set("int", 1u64).unwrap_err().kind(), ErrorKind::Type);
	assert_eq!(node.connect_property::<bool>("label").unwrap_err().kind(), ErrorKind::Type);
}

#[test]
fn set_requires_ui_thread() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());

	let err = thread::scope(|scope| scope.spawn(|| node.set("int", 5)).join().unwrap()).unwrap_err();
	assert_eq!(err.kind(), ErrorKind::Thread);

	let value = thread::scope(|scope| scope.spawn(|| node.get::<i32>("int")).join().unwrap()).unwrap();
	assert_eq!(value, 0);
}

#[test]
fn callback_can_adjust_or_reject_values() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());
	node.set_callback("int", |value: &mut i32| {
		*value = (*value).min(100);
		*value >= 0
	})
	.unwrap();

	assert!(node.set("int", 250).unwrap());
	assert_eq!(INT.get(&node).unwrap(), 100);
	assert!(!node.set("int", -1).unwrap());
	assert_eq!(INT.get(&node).unwrap(), 100);

	node.clear_callback::<i32>("int").unwrap();
	assert!(node.set("int", -1).unwrap());
	assert!(node.reset::<i32>("int").unwrap());
	assert_eq!(INT.get(&node).unwrap(), 0);
}

#[test]
fn hidden_property_does_not_dirty_node() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());
	let before = node.property_hash().unwrap();

	LABEL.set(&node, "caption".to_owned()).unwrap();
	assert!(graph.dirty_nodes().is_empty());
	assert_ne!(node.property_hash().unwrap(), before);
	assert_eq!(LABEL.get(&node).unwrap(), "caption");
}

#[test]
fn property_hash_tracks_values() {
	let (graph, _ui) = ui_graph();
	let (a, b) = (widget(&graph.root()), widget(&graph.root()));
	assert_eq!(a.property_hash().unwrap(), b.property_hash().unwrap());

	INT.set(&a, 3).unwrap();
	assert_ne!(a.property_hash().unwrap(), b.property_hash().unwrap());
	INT.set(&b, 3).unwrap();
	assert_eq!(a.property_hash().unwrap(), b.property_hash().unwrap());
}

const RATIO: PropertyKey<f32> = PropertyKey::new("ratio");

struct Scaled;

impl NodeKind for Scaled {
	fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
		ctx.declare(&RATIO, 1.0)
	}
}

#[test]
fn typed_key_round_trip() {
	let (graph, _ui) = ui_graph();
	let node = graph.root().create_child(Scaled).unwrap().handle();
	assert!(RATIO.set(&node, 0.5).unwrap());
	assert_eq!(RATIO.get(&node).unwrap(), 0.5);
	assert_eq!(node.type_name().unwrap(), std::any::type_name::<Scaled>());
}

// ── Flags ──

#[test]
fn user_flags_are_range_checked() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());

	assert_eq!(node.flag(USER_FLAG_COUNT).unwrap_err().kind(), ErrorKind::Index);
	assert_eq!(node.set_flag(USER_FLAG_COUNT, true).unwrap_err().kind(), ErrorKind::Index);

	node.set_flag(USER_FLAG_COUNT - 1, true).unwrap();
	assert!(node.flag(USER_FLAG_COUNT - 1).unwrap());
	assert!(!node.flag(0).unwrap());
	assert!(node.is_dirty().unwrap());
}

#[test]
fn enabled_and_visible_default_on() {
	let (graph, _ui) = ui_graph();
	let node = widget(&graph.root());
	assert!(node.is_enabled().unwrap());
	assert!(node.is_visible().unwrap());

	node.set_visible(false).unwrap();
	node.set_enabled(false).unwrap();
	assert!(!node.is_visible().unwrap());
	assert!(!node.is_enabled().unwrap());
}

// ── Handles and owners ──

#[test]
fn owner_drop_removes_node() {
	let (graph, _ui) = ui_graph();
	let created = graph.root().create_child(Widget).unwrap();
	let handle = created.handle();
	let owner = created.owner().unwrap();
	assert_eq!(created.owner().unwrap_err().kind(), ErrorKind::Internal);

	drop(owner);
	assert!(!handle.is_alive());
	assert_eq!(handle.get::<i32>("int").unwrap_err().kind(), ErrorKind::HandleExpired);
	assert_eq!(graph.node_count(), 1);
}

#[test]
fn owner_drop_during_shutdown_is_noop() {
	let (graph, _ui) = ui_graph();
	let created = graph.root().create_child(Widget).unwrap();
	let owner = created.owner().unwrap();

	graph.shutdown();
	drop(owner);
	assert!(created.handle().is_alive());
}

#[test]
fn owner_of_removed_node_drops_quietly() {
	let (graph, _ui) = ui_graph();
	let created = graph.root().create_child(Widget).unwrap();
	let owner = created.owner().unwrap();
	owner.remove().unwrap();
	drop(owner);
	assert_eq!(graph.node_count(), 1);
}

#[test]
fn handles_outliving_graph_are_expired() {
	let handle = {
		let (graph, _ui) = ui_graph();
		widget(&graph.root())
	};
	assert!(!handle.is_alive());
	assert_eq!(handle.uuid().unwrap_err().kind(), ErrorKind::HandleExpired);
}

#[test]
fn downcast_checks_kind() {
	let (graph, _ui) = ui_graph();
	let node = panel(&graph.root()).erase();
	assert!(node.downcast::<Panel>().is_ok());
	assert_eq!(node.downcast::<Widget>().unwrap_err().kind(), ErrorKind::Type);
}

#[test]
fn ui_role_is_exclusive() {
	let (graph, ui) = ui_graph();
	assert!(graph.is_ui_thread());
	assert_eq!(graph.claim_ui_thread().unwrap_err().kind(), ErrorKind::Startup);

	drop(ui);
	assert!(!graph.is_ui_thread());
	let _again = graph.claim_ui_thread().unwrap();
}

#[test]
fn clear_removes_everything_but_root() {
	let (graph, _ui) = ui_graph();
	let parent = panel(&graph.root());
	let child = widget(&parent);
	widget(&graph.root());

	graph.clear().unwrap();
	assert_eq!(graph.node_count(), 1);
	assert!(!child.is_alive());
	assert!(graph.root().children().unwrap().is_empty());
}
