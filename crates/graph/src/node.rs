//! Node records and the node-kind extension point.

use std::any::{Any, TypeId};
use std::sync::{Arc, Weak};

use arbor_common::{Error, Result};
use arbor_reactive::{PublisherId, Subscriber};
use indexmap::IndexMap;
use uuid::Uuid;

use crate::arena::NodeId;
use crate::context::NodeContext;
use crate::flags::NodeFlags;
use crate::graph::GraphShared;
use crate::port::ErasedPort;
use crate::property::{ErasedProperty, PropertyCell};
use crate::value::{PropertyValue, combine_hashes};

/// Behaviour attached to a node.
///
/// `declare` establishes the node's layout (properties, slots, signals);
/// `finalize` runs once the layout is complete. After both hooks return the
/// layout is sealed.
pub trait NodeKind: Any + Send + Sync + Sized {
	fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
		let _ = ctx;
		Ok(())
	}

	fn finalize(&self, ctx: &NodeContext<Self>) -> Result<()> {
		let _ = ctx;
		Ok(())
	}
}

/// Kind of the graph's root node.
#[derive(Debug, Default, Clone, Copy)]
pub struct Root;

impl NodeKind for Root {}

/// Hierarchy data duplicated into the copy-on-write overlay.
#[derive(Debug, Clone)]
pub(crate) struct Structure {
	pub parent: NodeId,
	/// Back to front.
	pub children: Vec<NodeId>,
	pub flags: NodeFlags,
}

/// Marks its node dirty whenever a visible property publishes.
pub(crate) struct RedrawObserver {
	graph: Weak<GraphShared>,
	node: NodeId,
}

impl<T> Subscriber<T> for RedrawObserver {
	fn on_next(&self, _publisher: PublisherId, _value: &T) {
		if let Some(graph) = self.graph.upgrade() {
			graph.mark_dirty(self.node);
		}
	}
}

pub(crate) struct NodeRecord {
	pub uuid: Uuid,
	pub kind: Arc<dyn Any + Send + Sync>,
	pub kind_id: TypeId,
	pub type_name: &'static str,
	pub canonical: Structure,
	pub modified: Option<Box<Structure>>,
	/// Removed while frozen; kept for the frozen reader until synchronise.
	pub removed: bool,
	pub properties: IndexMap<&'static str, Box<dyn ErasedProperty>>,
	pub slots: IndexMap<&'static str, Box<dyn ErasedPort>>,
	pub signals: IndexMap<&'static str, Box<dyn ErasedPort>>,
	pub property_hash: u64,
	pub redraw: Arc<RedrawObserver>,
}

impl NodeRecord {
	pub fn new<K: NodeKind>(id: NodeId, parent: NodeId, kind: Arc<K>, graph: Weak<GraphShared>) -> Self {
		Self {
			uuid: Uuid::new_v4(),
			kind,
			kind_id: TypeId::of::<K>(),
			type_name: std::any::type_name::<K>(),
			canonical: Structure {
				parent,
				children: Vec::new(),
				flags: NodeFlags::INITIAL,
			},
			modified: None,
			removed: false,
			properties: IndexMap::new(),
			slots: IndexMap::new(),
			signals: IndexMap::new(),
			property_hash: combine_hashes([]),
			redraw: Arc::new(RedrawObserver { graph, node: id }),
		}
	}

	pub fn is_finalized(&self) -> bool {
		self.canonical.flags.contains(NodeFlags::FINALIZED)
	}

	/// Overlay when `overlay` is requested and one exists, else canonical.
	pub fn view(&self, overlay: bool) -> &Structure {
		match &self.modified {
			Some(modified) if overlay => modified,
			_ => &self.canonical,
		}
	}

	/// What the writer sees: overlay if present.
	pub fn latest(&self) -> &Structure {
		self.view(true)
	}

	pub fn recompute_hash(&mut self) {
		self.property_hash = combine_hashes(self.properties.values().map(|p| p.latest_hash()));
	}

	/// Moves every overlay into canonical storage. The dirty bit is kept.
	pub fn fold(&mut self) {
		if let Some(modified) = self.modified.take() {
			self.canonical = *modified;
		}
		for property in self.properties.values_mut() {
			property.flush();
		}
	}

	/// Folds the overlays and clears the dirty bit.
	pub fn flush(&mut self) {
		self.fold();
		self.canonical.flags.remove(NodeFlags::DIRTY);
	}

	pub fn property<T: PropertyValue>(&self, name: &str) -> Result<&PropertyCell<T>> {
		let erased = self.properties.get(name).ok_or_else(|| Error::name("property", name))?;
		let found = erased.value_type();
		erased
			.as_any()
			.downcast_ref()
			.ok_or_else(|| Error::type_mismatch("property", name, std::any::type_name::<T>(), found))
	}

	pub fn property_mut<T: PropertyValue>(&mut self, name: &str) -> Result<&mut PropertyCell<T>> {
		let erased = self.properties.get_mut(name).ok_or_else(|| Error::name("property", name))?;
		let found = erased.value_type();
		erased
			.as_any_mut()
			.downcast_mut()
			.ok_or_else(|| Error::type_mismatch("property", name, std::any::type_name::<T>(), found))
	}

	/// Checks that `what` named `name` may still be declared.
	pub fn check_declarable(&self, what: &str, name: &str) -> Result<()> {
		if self.is_finalized() {
			return Err(Error::finalized(what, name));
		}
		let taken = self.properties.contains_key(name) || self.slots.contains_key(name) || self.signals.contains_key(name);
		if taken {
			return Err(Error::not_unique(format!("{} already declares '{name}'", self.type_name)));
		}
		Ok(())
	}
}
