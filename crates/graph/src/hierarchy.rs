//! Tree navigation, child creation, reparenting and z-order.

use std::any::TypeId;
use std::collections::HashSet;
use std::sync::Arc;

use arbor_common::{Error, Result};

use crate::arena::NodeId;
use crate::context::NodeContext;
use crate::flags::NodeFlags;
use crate::graph::{GraphShared, GraphState};
use crate::handle::{Handle, NewNode, NodeHandle};
use crate::node::{NodeKind, NodeRecord};

impl GraphState {
	/// Strict ancestors of `id` as seen by the caller, nearest first.
	fn ancestors(&self, id: NodeId) -> Result<Vec<NodeId>> {
		let mut chain = Vec::new();
		let mut current = id;
		loop {
			let parent = self.structure(current)?.parent;
			if parent == current {
				return Ok(chain);
			}
			chain.push(parent);
			current = parent;
		}
	}

	/// Parent of `id` and its position among the parent's children.
	fn position(&self, id: NodeId, latest: bool) -> Result<(NodeId, Option<usize>)> {
		let structure = if latest { self.latest(id)? } else { self.structure(id)? };
		let parent = structure.parent;
		if parent == id {
			return Ok((id, None));
		}
		let siblings = if latest { self.latest(parent)? } else { self.structure(parent)? };
		Ok((parent, siblings.children.iter().position(|child| *child == id)))
	}

	fn is_in_subtree(&self, id: NodeId, root: NodeId) -> Result<bool> {
		let mut current = id;
		loop {
			if current == root {
				return Ok(true);
			}
			let parent = self.latest(current)?.parent;
			if parent == current {
				return Ok(false);
			}
			current = parent;
		}
	}
}

/// Where `restack` moves a node within its parent's children.
#[derive(Clone, Copy)]
enum Placement {
	Front,
	Back,
	Before(NodeId),
	Behind(NodeId),
}

impl GraphShared {
	fn restack(&self, id: NodeId, placement: Placement) -> Result<()> {
		self.write(|state| {
			state.ensure_ui("z-order change")?;
			let (parent, _) = state.position(id, true)?;
			if parent == id {
				return match placement {
					Placement::Front | Placement::Back => Ok(()),
					Placement::Before(_) | Placement::Behind(_) => Err(Error::graph("the root node has no siblings")),
				};
			}
			if let Placement::Before(target) | Placement::Behind(target) = placement {
				if target == id {
					return Ok(());
				}
				if state.position(target, true)?.0 != parent {
					return Err(Error::graph("z-order target is not a sibling"));
				}
			}
			state.write_structure(parent, true, |s| {
				s.children.retain(|child| *child != id);
				let index = match placement {
					Placement::Front => s.children.len(),
					Placement::Back => 0,
					Placement::Before(target) => s.children.iter().position(|c| *c == target).map_or(s.children.len(), |i| i + 1),
					Placement::Behind(target) => s.children.iter().position(|c| *c == target).unwrap_or(0),
				};
				s.children.insert(index, id);
			})
		})
	}

	fn compare_siblings(&self, id: NodeId, other: NodeId) -> Result<Option<std::cmp::Ordering>> {
		self.read(|state| {
			let (parent, index) = state.position(id, false)?;
			let (other_parent, other_index) = state.position(other, false)?;
			if parent != other_parent || id == other {
				return Ok(None);
			}
			Ok(index.zip(other_index).map(|(a, b)| a.cmp(&b)))
		})
	}
}

impl<K> Handle<K> {
	pub fn parent(&self) -> Result<NodeHandle> {
		let parent = self.shared()?.read(|state| Ok::<_, Error>(state.structure(self.id())?.parent))?;
		Ok(self.sibling(parent))
	}

	/// Child at `index`, back to front.
	///
	/// # Errors
	///
	/// `IndexError` when `index >= child_count()`.
	pub fn child(&self, index: usize) -> Result<NodeHandle> {
		let child = self.shared()?.read(|state| {
			let children = &state.structure(self.id())?.children;
			children
				.get(index)
				.copied()
				.ok_or_else(|| Error::index("child", index, children.len()))
		})?;
		Ok(self.sibling(child))
	}

	pub fn child_count(&self) -> Result<usize> {
		self.shared()?.read(|state| Ok(state.structure(self.id())?.children.len()))
	}

	/// Children, back to front.
	pub fn children(&self) -> Result<Vec<NodeHandle>> {
		let ids = self
			.shared()?
			.read(|state| Ok::<_, Error>(state.structure(self.id())?.children.clone()))?;
		Ok(ids.into_iter().map(|id| self.sibling(id)).collect())
	}

	/// Returns `true` when `other` is a strict ancestor of this node.
	pub fn has_ancestor<C>(&self, other: &Handle<C>) -> Result<bool> {
		if !self.same_graph(other) {
			return Ok(false);
		}
		let ancestors = self.shared()?.read(|state| state.ancestors(self.id()))?;
		Ok(ancestors.contains(&other.id()))
	}

	/// Deepest node that is an ancestor-or-self of both nodes.
	///
	/// Returns an expired handle when either node is gone.
	///
	/// # Errors
	///
	/// `GraphError` when the nodes belong to different graphs.
	pub fn common_ancestor<C>(&self, other: &Handle<C>) -> Result<NodeHandle> {
		if !self.is_alive() || !other.is_alive() {
			return Ok(NodeHandle::expired());
		}
		if !self.same_graph(other) {
			return Err(Error::graph("nodes belong to different graphs"));
		}
		let common = self.shared()?.read(|state| {
			let mine: HashSet<NodeId> = std::iter::once(self.id()).chain(state.ancestors(self.id())?).collect();
			let theirs = std::iter::once(other.id()).chain(state.ancestors(other.id())?);
			let mut found = state.root;
			for id in theirs {
				if mine.contains(&id) {
					found = id;
					break;
				}
			}
			Ok::<_, Error>(found)
		})?;
		Ok(self.sibling(common))
	}

	/// Nearest strict ancestor whose kind is `A`.
	pub fn first_ancestor<A: NodeKind>(&self) -> Result<Option<Handle<A>>> {
		let found = self.shared()?.read(|state| {
			for id in state.ancestors(self.id())? {
				if state.record(id)?.kind_id == TypeId::of::<A>() {
					return Ok(Some(id));
				}
			}
			Ok::<_, Error>(None)
		})?;
		Ok(found.map(|id| self.sibling(id)))
	}

	/// Moves the node to the front of `new_parent`'s children.
	///
	/// # Errors
	///
	/// `HandleExpired` when `new_parent` is gone. `GraphError` for the root,
	/// or when `new_parent` lies in this node's subtree.
	pub fn reparent<C>(&self, new_parent: &Handle<C>) -> Result<()> {
		new_parent.shared()?;
		if !self.same_graph(new_parent) {
			return Err(Error::graph("nodes belong to different graphs"));
		}
		let (id, target) = (self.id(), new_parent.id());
		self.shared()?.write(|state| {
			state.ensure_ui("reparent")?;
			let old_parent = state.latest(id)?.parent;
			state.latest(target).map_err(|_| Error::expired())?;
			if old_parent == target {
				return Ok(());
			}
			if id == state.root {
				return Err(Error::graph("the root node cannot be reparented"));
			}
			if state.is_in_subtree(target, id)? {
				return Err(Error::graph("cannot reparent a node into its own subtree"));
			}
			state.write_structure(old_parent, true, |s| s.children.retain(|child| *child != id))?;
			state.write_structure(target, true, |s| s.children.push(id))?;
			state.write_structure(id, true, |s| s.parent = target)?;
			tracing::trace!(node = ?id, from = ?old_parent, to = ?target, "graph.reparent");
			Ok(())
		})
	}

	/// Creates a child of kind `C`, appended frontmost.
	///
	/// Runs the kind's `declare` and `finalize` hooks before sealing the
	/// layout and registering the node.
	pub fn create_child<C: NodeKind>(&self, kind: C) -> Result<NewNode<C>> {
		let shared = self.shared()?;
		let parent = self.id();
		let kind = Arc::new(kind);
		let graph = Arc::downgrade(&shared);

		let id = shared.write(|state| {
			state.ensure_ui("create_child")?;
			state.live(parent)?;
			Ok::<_, Error>(
				state
					.nodes
					.insert_with(|id| NodeRecord::new(id, parent, Arc::clone(&kind), graph)),
			)
		})?;

		let child: Handle<C> = self.sibling(id);
		let ctx = NodeContext::new(child.clone());
		if let Err(error) = kind.declare(&ctx).and_then(|()| kind.finalize(&ctx)) {
			let discarded = shared.write(|state| state.discard_subtree(id, false));
			drop(discarded);
			return Err(error);
		}

		let mut discarded = None;
		let registered = shared.write(|state| -> Result<()> {
			let record = state.live_mut(id)?;
			record.canonical.flags.insert(NodeFlags::FINALIZED);
			let uuid = record.uuid;
			if state.uuids.contains_key(&uuid) {
				discarded = state.nodes.remove(id);
				return Err(Error::not_unique(format!("node uuid {uuid} already registered")));
			}
			state.uuids.insert(uuid, id);
			state.write_structure(parent, false, |s| s.children.push(id))?;
			tracing::trace!(node = ?id, parent = ?parent, kind = std::any::type_name::<C>(), "graph.create_child");
			Ok(())
		});
		drop(discarded);
		registered?;
		Ok(NewNode::new(child))
	}

	/// Returns `true` when the node is frontmost among its siblings.
	pub fn is_in_front(&self) -> Result<bool> {
		self.shared()?.read(|state| {
			let (parent, index) = state.position(self.id(), false)?;
			let count = state.structure(parent)?.children.len();
			Ok(index.is_none_or(|index| index + 1 == count))
		})
	}

	/// Returns `true` when the node is backmost among its siblings.
	pub fn is_in_back(&self) -> Result<bool> {
		self.shared()?
			.read(|state| Ok(state.position(self.id(), false)?.1.is_none_or(|index| index == 0)))
	}

	/// Returns `true` when this node is drawn in front of `sibling`.
	///
	/// Nodes with different parents are never ordered.
	pub fn is_before<C>(&self, sibling: &Handle<C>) -> Result<bool> {
		if !self.same_graph(sibling) {
			return Ok(false);
		}
		let order = self.shared()?.compare_siblings(self.id(), sibling.id())?;
		Ok(order == Some(std::cmp::Ordering::Greater))
	}

	/// Returns `true` when this node is drawn behind `sibling`.
	pub fn is_behind<C>(&self, sibling: &Handle<C>) -> Result<bool> {
		if !self.same_graph(sibling) {
			return Ok(false);
		}
		let order = self.shared()?.compare_siblings(self.id(), sibling.id())?;
		Ok(order == Some(std::cmp::Ordering::Less))
	}

	pub fn stack_front(&self) -> Result<()> {
		self.shared()?.restack(self.id(), Placement::Front)
	}

	pub fn stack_back(&self) -> Result<()> {
		self.shared()?.restack(self.id(), Placement::Back)
	}

	/// Moves the node to just in front of `sibling`.
	///
	/// # Errors
	///
	/// `GraphError` when `sibling` has a different parent.
	pub fn stack_before<C>(&self, sibling: &Handle<C>) -> Result<()> {
		if !self.same_graph(sibling) {
			return Err(Error::graph("z-order target is not a sibling"));
		}
		self.shared()?.restack(self.id(), Placement::Before(sibling.id()))
	}

	/// Moves the node to just behind `sibling`.
	pub fn stack_behind<C>(&self, sibling: &Handle<C>) -> Result<()> {
		if !self.same_graph(sibling) {
			return Err(Error::graph("z-order target is not a sibling"));
		}
		self.shared()?.restack(self.id(), Placement::Behind(sibling.id()))
	}
}
