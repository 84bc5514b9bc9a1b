//! Graph state, the UI-thread role and the freeze/synchronise protocol.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

use arbor_common::{Error, Result};
use indexmap::IndexSet;
use parking_lot::ReentrantMutex;
use rustc_hash::FxHashMap;
use uuid::Uuid;

use crate::arena::{Arena, NodeId};
use crate::flags::NodeFlags;
use crate::handle::NodeHandle;
use crate::names::NameRegistry;
use crate::node::{NodeRecord, Root, Structure};

pub(crate) struct GraphState {
	pub nodes: Arena<NodeRecord>,
	pub root: NodeId,
	pub uuids: FxHashMap<Uuid, NodeId>,
	pub names: NameRegistry,
	/// Nodes flagged dirty since the last synchronise.
	pub dirty: IndexSet<NodeId>,
	/// Nodes holding overlays that synchronise must flush.
	pub pending: IndexSet<NodeId>,
	/// Nodes removed while frozen.
	pub graveyard: Vec<NodeId>,
	pub frozen_by: Option<ThreadId>,
	pub ui_thread: Option<ThreadId>,
}

impl GraphState {
	fn is_frozen_thread(&self) -> bool {
		self.frozen_by == Some(thread::current().id())
	}

	/// Whether the calling thread reads overlays: the UI thread does, unless
	/// it froze the graph itself.
	pub fn sees_overlay(&self) -> bool {
		let current = thread::current().id();
		self.ui_thread == Some(current) && self.frozen_by != Some(current)
	}

	pub fn ensure_ui(&self, operation: &str) -> Result<()> {
		if self.ui_thread == Some(thread::current().id()) {
			Ok(())
		} else {
			Err(Error::thread(operation))
		}
	}

	/// Record visible to the calling thread.
	///
	/// Nodes removed while frozen stay readable by the frozen thread only.
	pub fn record(&self, id: NodeId) -> Result<&NodeRecord> {
		match self.nodes.get(id) {
			Some(record) if !record.removed || self.is_frozen_thread() => Ok(record),
			_ => Err(Error::expired()),
		}
	}

	/// Record that is still part of the tree.
	pub fn live(&self, id: NodeId) -> Result<&NodeRecord> {
		match self.nodes.get(id) {
			Some(record) if !record.removed => Ok(record),
			_ => Err(Error::expired()),
		}
	}

	pub fn live_mut(&mut self, id: NodeId) -> Result<&mut NodeRecord> {
		match self.nodes.get_mut(id) {
			Some(record) if !record.removed => Ok(record),
			_ => Err(Error::expired()),
		}
	}

	/// Structure as read by the calling thread.
	pub fn structure(&self, id: NodeId) -> Result<&Structure> {
		let overlay = self.sees_overlay();
		Ok(self.record(id)?.view(overlay))
	}

	/// Structure as the writer sees it.
	pub fn latest(&self, id: NodeId) -> Result<&Structure> {
		Ok(self.live(id)?.latest())
	}

	/// Applies `f` to the structure selected by the write rule.
	///
	/// The overlay is targeted when it exists, or when the graph is frozen
	/// and the node finalized. `dirty` sets the dirty bit and records the node.
	pub fn write_structure(&mut self, id: NodeId, dirty: bool, f: impl FnOnce(&mut Structure)) -> Result<()> {
		let frozen = self.frozen_by.is_some();
		let record = self.live_mut(id)?;
		let overlaid = record.modified.is_some() || (frozen && record.is_finalized());
		let target = if overlaid {
			&mut **record.modified.get_or_insert_with(|| Box::new(record.canonical.clone()))
		} else {
			&mut record.canonical
		};
		f(target);
		if dirty {
			target.flags.insert(NodeFlags::DIRTY);
			self.dirty.insert(id);
		}
		if overlaid {
			self.pending.insert(id);
		}
		Ok(())
	}

	/// Freezes for `thread` if unfrozen. Returns `None` when already frozen.
	///
	/// Leftovers of an earlier freeze are settled first so the frozen thread
	/// starts from what the UI thread saw: overlays are folded and tombstoned
	/// records are handed back for the caller to drop outside the borrow.
	fn freeze_for(&mut self, thread: ThreadId) -> Option<Vec<NodeRecord>> {
		if self.frozen_by.is_some() {
			return None;
		}
		let pending: Vec<NodeId> = self.pending.drain(..).collect();
		for id in &pending {
			if let Ok(record) = self.live_mut(*id) {
				record.fold();
			}
		}
		let graveyard = std::mem::take(&mut self.graveyard);
		let freed: Vec<NodeRecord> = graveyard.into_iter().filter_map(|id| self.nodes.remove(id)).collect();
		self.frozen_by = Some(thread);
		tracing::trace!(?thread, folded = pending.len(), freed = freed.len(), "graph.freeze");
		Some(freed)
	}

	/// Detaches `id` and its subtree, returning the records to drop.
	///
	/// Must be dropped by the caller after the state borrow ends, since
	/// records own user values. While frozen, records move to the graveyard
	/// instead.
	pub fn remove_subtree(&mut self, id: NodeId, shutting_down: bool) -> Result<Vec<NodeRecord>> {
		if id == self.root {
			return Err(Error::graph("the root node cannot be removed"));
		}
		let parent = self.latest(id)?.parent;
		self.write_structure(parent, true, |s| s.children.retain(|child| *child != id))?;
		Ok(self.discard_subtree(id, shutting_down))
	}

	/// Drops `id` and its descendants without detaching `id` from its parent.
	///
	/// Nodes are tombstoned instead while frozen. Returns the freed records.
	pub fn discard_subtree(&mut self, id: NodeId, shutting_down: bool) -> Vec<NodeRecord> {
		let mut order = Vec::new();
		let mut stack = vec![(id, false)];
		while let Some((node, expanded)) = stack.pop() {
			if expanded {
				order.push(node);
				continue;
			}
			stack.push((node, true));
			if let Ok(structure) = self.latest(node) {
				stack.extend(structure.children.iter().rev().map(|child| (*child, false)));
			}
		}

		let frozen = self.frozen_by.is_some();
		let mut freed = Vec::new();
		for node in order {
			let Ok(record) = self.live_mut(node) else {
				continue;
			};
			let uuid = record.uuid;
			if frozen {
				record.removed = true;
				self.graveyard.push(node);
			} else if let Some(record) = self.nodes.remove(node) {
				freed.push(record);
			}
			if !shutting_down {
				self.uuids.remove(&uuid);
				self.names.release(uuid);
			}
			self.dirty.shift_remove(&node);
			self.pending.shift_remove(&node);
		}
		tracing::debug!(node = ?id, removed = freed.len(), frozen, "graph.remove");
		freed
	}
}

/// Shared interior of a [`Graph`]; handles hold it weakly.
pub(crate) struct GraphShared {
	state: ReentrantMutex<RefCell<GraphState>>,
	shutting_down: AtomicBool,
}

impl GraphShared {
	/// Runs `f` with shared access to the state.
	///
	/// `f` must not call user code: the state stays borrowed for its duration.
	pub fn read<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
		let guard = self.state.lock();
		let state = guard.borrow();
		f(&state)
	}

	/// Runs `f` with exclusive access to the state. Same rule as [`Self::read`].
	pub fn write<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> R {
		let guard = self.state.lock();
		let mut state = guard.borrow_mut();
		f(&mut state)
	}

	pub fn is_shutting_down(&self) -> bool {
		self.shutting_down.load(Ordering::Acquire)
	}

	/// Flags `id` dirty through the write rule.
	pub fn mark_dirty(&self, id: NodeId) {
		self.write(|state| {
			if state.write_structure(id, true, |_| {}).is_ok() {
				tracing::trace!(node = ?id, "graph.mark_dirty");
			}
		});
	}

	/// Removes the subtree at `id`, dropping records outside the borrow.
	pub fn remove(&self, id: NodeId) -> Result<()> {
		let shutting_down = self.is_shutting_down();
		let freed = self.write(|state| {
			state.ensure_ui("remove")?;
			state.remove_subtree(id, shutting_down)
		})?;
		drop(freed);
		Ok(())
	}
}

/// The scene graph.
///
/// Cheap to clone; every clone refers to the same tree. All state sits
/// behind one recursive mutex. Mutators must run on the thread holding the
/// UI role (see [`Graph::claim_ui_thread`]).
#[derive(Clone)]
pub struct Graph {
	shared: Arc<GraphShared>,
}

impl std::fmt::Debug for Graph {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Graph")
			.field("nodes", &self.node_count())
			.field("frozen_by", &self.frozen_by())
			.finish_non_exhaustive()
	}
}

impl Default for Graph {
	fn default() -> Self {
		Self::new()
	}
}

impl Graph {
	/// Creates a graph holding only its root node, named `root`.
	pub fn new() -> Self {
		let shared = Arc::new_cyclic(|weak| {
			let mut nodes = Arena::default();
			let root = nodes.insert_with(|id| {
				let mut record = NodeRecord::new(id, id, Arc::new(Root), weak.clone());
				record.canonical.flags.insert(NodeFlags::FINALIZED);
				record
			});
			let mut uuids = FxHashMap::default();
			let mut names = NameRegistry::default();
			if let Some(record) = nodes.get(root) {
				uuids.insert(record.uuid, root);
				names.assign(record.uuid, "root");
			}
			GraphShared {
				state: ReentrantMutex::new(RefCell::new(GraphState {
					nodes,
					root,
					uuids,
					names,
					dirty: IndexSet::new(),
					pending: IndexSet::new(),
					graveyard: Vec::new(),
					frozen_by: None,
					ui_thread: None,
				})),
				shutting_down: AtomicBool::new(false),
			}
		});
		Self { shared }
	}

	pub(crate) fn from_shared(shared: Arc<GraphShared>) -> Self {
		Self { shared }
	}

	fn handle(&self, id: NodeId) -> NodeHandle {
		NodeHandle::new(Arc::downgrade(&self.shared), id)
	}

	/// Returns `true` when both values refer to the same graph.
	pub fn same_graph(&self, other: &Graph) -> bool {
		Arc::ptr_eq(&self.shared, &other.shared)
	}

	pub fn root(&self) -> NodeHandle {
		self.handle(self.shared.read(|state| state.root))
	}

	pub fn node_by_uuid(&self, uuid: Uuid) -> Option<NodeHandle> {
		self.shared.read(|state| state.uuids.get(&uuid).copied()).map(|id| self.handle(id))
	}

	pub fn node_by_name(&self, name: &str) -> Option<NodeHandle> {
		let id = self
			.shared
			.read(|state| state.names.lookup(name).and_then(|uuid| state.uuids.get(&uuid).copied()));
		id.map(|id| self.handle(id))
	}

	/// Name of the node with `uuid`, assigning its mnemonic if it has none.
	///
	/// # Errors
	///
	/// `NameError` when no live node has `uuid`.
	pub fn name_of(&self, uuid: Uuid) -> Result<String> {
		self.shared.write(|state| {
			if !state.uuids.contains_key(&uuid) {
				return Err(Error::name("node", &uuid.to_string()));
			}
			Ok(state.names.name_of(uuid))
		})
	}

	/// Names the node with `uuid`, returning the name actually assigned.
	///
	/// A taken `proposal` gets the smallest free `_k` suffix (k ≥ 2).
	pub fn set_name(&self, uuid: Uuid, proposal: &str) -> Result<String> {
		self.shared.write(|state| {
			state.ensure_ui("set_name")?;
			if !state.uuids.contains_key(&uuid) {
				return Err(Error::name("node", &uuid.to_string()));
			}
			let name = state.names.assign(uuid, proposal);
			tracing::trace!(%uuid, proposal, name = %name, "graph.set_name");
			Ok(name)
		})
	}

	/// Removes every node but the root.
	pub fn clear(&self) -> Result<()> {
		let shutting_down = self.shared.is_shutting_down();
		let freed = self.shared.write(|state| {
			state.ensure_ui("clear")?;
			let children = state.latest(state.root)?.children.clone();
			let mut freed = Vec::new();
			for child in children {
				freed.extend(state.remove_subtree(child, shutting_down)?);
			}
			Ok::<_, Error>(freed)
		})?;
		tracing::debug!(removed = freed.len(), "graph.clear");
		drop(freed);
		Ok(())
	}

	/// Folds every overlay into canonical storage and returns the nodes that
	/// were dirty. Does not change the freeze state.
	pub fn synchronise(&self) -> Result<Vec<NodeHandle>> {
		let (dirty, freed) = self.shared.write(|state| {
			state.ensure_ui("synchronise")?;
			let dirty: Vec<NodeId> = state.dirty.drain(..).collect();
			let pending: Vec<NodeId> = state.pending.drain(..).collect();
			for id in dirty.iter().chain(&pending) {
				if let Ok(record) = state.live_mut(*id) {
					record.flush();
				}
			}
			let graveyard = std::mem::take(&mut state.graveyard);
			let freed: Vec<NodeRecord> = graveyard.into_iter().filter_map(|id| state.nodes.remove(id)).collect();
			let dirty: Vec<NodeId> = dirty.into_iter().filter(|id| state.live(*id).is_ok()).collect();
			Ok::<_, Error>((dirty, freed))
		})?;
		tracing::debug!(dirty = dirty.len(), freed = freed.len(), "graph.synchronise");
		drop(freed);
		Ok(dirty.into_iter().map(|id| self.handle(id)).collect())
	}

	/// Freezes the graph for `thread` unless it is already frozen.
	pub fn freeze(&self, thread: ThreadId) {
		let freed = self.shared.write(|state| state.freeze_for(thread));
		drop(freed);
	}

	pub fn unfreeze(&self) {
		self.shared.write(|state| {
			if let Some(thread) = state.frozen_by.take() {
				tracing::trace!(?thread, "graph.unfreeze");
			}
		});
	}

	pub fn frozen_by(&self) -> Option<ThreadId> {
		self.shared.read(|state| state.frozen_by)
	}

	/// Freezes for the calling thread until the guard drops.
	///
	/// The guard only unfreezes if this call did the freezing.
	pub fn freeze_current(&self) -> FreezeGuard {
		let current = thread::current().id();
		let freed = self.shared.write(|state| state.freeze_for(current));
		FreezeGuard {
			graph: self.clone(),
			froze: freed.is_some(),
		}
	}

	pub fn dirty_nodes(&self) -> Vec<NodeHandle> {
		let ids: Vec<NodeId> = self.shared.read(|state| state.dirty.iter().copied().collect());
		ids.into_iter().map(|id| self.handle(id)).collect()
	}

	/// Number of nodes in the tree, root included.
	pub fn node_count(&self) -> usize {
		self.shared.read(|state| state.nodes.len() - state.graveyard.len())
	}

	/// Claims the UI role for the calling thread until the guard drops.
	///
	/// # Errors
	///
	/// `StartupError` when a thread already holds the role.
	pub fn claim_ui_thread(&self) -> Result<UiThreadGuard> {
		let current = thread::current().id();
		self.shared.write(|state| match state.ui_thread {
			Some(holder) => Err(Error::startup(format!("UI thread role already held by {holder:?}"))),
			None => {
				state.ui_thread = Some(current);
				tracing::debug!(thread = ?current, "graph.ui_thread.claim");
				Ok(UiThreadGuard {
					graph: self.clone(),
					thread: current,
				})
			}
		})
	}

	pub fn is_ui_thread(&self) -> bool {
		let current = thread::current().id();
		self.shared.read(|state| state.ui_thread == Some(current))
	}

	pub fn ui_thread(&self) -> Option<ThreadId> {
		self.shared.read(|state| state.ui_thread)
	}

	/// Marks the graph as shutting down: owner drops stop removing nodes.
	pub fn shutdown(&self) {
		if !self.shared.shutting_down.swap(true, Ordering::AcqRel) {
			tracing::debug!("graph.shutdown");
		}
	}

	pub fn is_shutting_down(&self) -> bool {
		self.shared.is_shutting_down()
	}
}

/// Releases the UI role on drop.
#[must_use = "dropping the guard releases the UI thread role"]
pub struct UiThreadGuard {
	graph: Graph,
	thread: ThreadId,
}

impl std::fmt::Debug for UiThreadGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UiThreadGuard").field("thread", &self.thread).finish()
	}
}

impl Drop for UiThreadGuard {
	fn drop(&mut self) {
		let thread = self.thread;
		self.graph.shared.write(|state| {
			if state.ui_thread == Some(thread) {
				state.ui_thread = None;
			}
		});
		tracing::debug!(?thread, "graph.ui_thread.release");
	}
}

/// Unfreezes the graph on drop if it froze it.
#[must_use = "dropping the guard unfreezes the graph"]
pub struct FreezeGuard {
	graph: Graph,
	froze: bool,
}

impl std::fmt::Debug for FreezeGuard {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FreezeGuard").field("froze", &self.froze).finish()
	}
}

impl Drop for FreezeGuard {
	fn drop(&mut self) {
		if self.froze {
			self.graph.unfreeze();
		}
	}
}
