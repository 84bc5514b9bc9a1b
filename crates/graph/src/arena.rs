//! Generational storage for node records.

use std::fmt;

use slab::Slab;

/// Handle to a node record in the graph arena.
///
/// Carries the slot index and the generation the slot had when the node was
/// inserted, so a handle to a freed node never resolves to its successor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
	idx: u32,
	generation: u32,
}

impl NodeId {
	/// Id that never resolves.
	pub(crate) const DANGLING: Self = Self {
		idx: u32::MAX,
		generation: u32::MAX,
	};

	/// Raw slot index (diagnostics only).
	#[must_use]
	pub const fn index(self) -> u32 {
		self.idx
	}

	#[must_use]
	pub const fn generation(self) -> u32 {
		self.generation
	}
}

impl fmt::Debug for NodeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "NodeId({}@gen{})", self.idx, self.generation)
	}
}

pub(crate) struct Arena<T> {
	slots: Slab<T>,
	generations: Vec<u32>,
}

impl<T> Default for Arena<T> {
	fn default() -> Self {
		Self {
			slots: Slab::new(),
			generations: Vec::new(),
		}
	}
}

impl<T> Arena<T> {
	/// Inserts the value built by `f`, which receives the id it will live under.
	pub fn insert_with(&mut self, f: impl FnOnce(NodeId) -> T) -> NodeId {
		let entry = self.slots.vacant_entry();
		let idx = entry.key();
		if self.generations.len() <= idx {
			self.generations.resize(idx + 1, 0);
		}
		let id = NodeId {
			idx: idx as u32,
			generation: self.generations[idx],
		};
		entry.insert(f(id));
		id
	}

	fn live(&self, id: NodeId) -> bool {
		self.generations.get(id.idx as usize) == Some(&id.generation) && self.slots.contains(id.idx as usize)
	}

	pub fn get(&self, id: NodeId) -> Option<&T> {
		if self.live(id) { self.slots.get(id.idx as usize) } else { None }
	}

	pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
		if self.live(id) { self.slots.get_mut(id.idx as usize) } else { None }
	}

	pub fn remove(&mut self, id: NodeId) -> Option<T> {
		if !self.live(id) {
			return None;
		}
		let idx = id.idx as usize;
		self.generations[idx] = self.generations[idx].wrapping_add(1);
		Some(self.slots.remove(idx))
	}

	pub fn len(&self) -> usize {
		self.slots.len()
	}

	pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
		self.slots.iter().map(|(idx, _)| NodeId {
			idx: idx as u32,
			generation: self.generations[idx],
		})
	}
}
