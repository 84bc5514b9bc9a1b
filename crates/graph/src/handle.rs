//! Weak node handles, unique owners and freshly created nodes.

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arbor_common::{Error, ErrorKind, Result};
use uuid::Uuid;

use crate::arena::NodeId;
use crate::flags::{NodeFlags, USER_FLAG_COUNT};
use crate::graph::{Graph, GraphShared};
use crate::node::NodeKind;
use crate::port::{SignalHandle, SlotHandle};
use crate::property::{PropertyCallback, PropertyHandle};
use crate::value::PropertyValue;

/// Marker kind of a [`NodeHandle`].
#[derive(Debug)]
pub enum Untyped {}

/// Weak, cloneable reference to a node of kind `K`.
///
/// A handle may outlive its node; every access checks liveness and fails
/// with `HandleExpired` once the node is gone.
pub struct Handle<K = Untyped> {
	graph: Weak<GraphShared>,
	id: NodeId,
	_kind: PhantomData<fn() -> K>,
}

/// Handle whose node kind is not known statically.
pub type NodeHandle = Handle<Untyped>;

impl<K> Clone for Handle<K> {
	fn clone(&self) -> Self {
		Self {
			graph: self.graph.clone(),
			id: self.id,
			_kind: PhantomData,
		}
	}
}

impl<K> PartialEq for Handle<K> {
	fn eq(&self, other: &Self) -> bool {
		self.id == other.id && Weak::ptr_eq(&self.graph, &other.graph)
	}
}

impl<K> Eq for Handle<K> {}

impl<K> Hash for Handle<K> {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.id.hash(state);
	}
}

impl<K> fmt::Debug for Handle<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Handle({:?})", self.id)
	}
}

impl<K> Handle<K> {
	pub(crate) fn new(graph: Weak<GraphShared>, id: NodeId) -> Self {
		Self {
			graph,
			id,
			_kind: PhantomData,
		}
	}

	/// A handle that never resolves.
	pub fn expired() -> Self {
		Self::new(Weak::new(), NodeId::DANGLING)
	}

	pub fn id(&self) -> NodeId {
		self.id
	}

	pub(crate) fn shared(&self) -> Result<Arc<GraphShared>> {
		self.graph.upgrade().ok_or_else(Error::expired)
	}

	pub(crate) fn same_graph<C>(&self, other: &Handle<C>) -> bool {
		Weak::ptr_eq(&self.graph, &other.graph)
	}

	pub(crate) fn sibling<C>(&self, id: NodeId) -> Handle<C> {
		Handle::new(self.graph.clone(), id)
	}

	/// Returns `true` while the node is readable by the calling thread.
	pub fn is_alive(&self) -> bool {
		self.graph
			.upgrade()
			.is_some_and(|graph| graph.read(|state| state.record(self.id).is_ok()))
	}

	pub fn graph(&self) -> Result<Graph> {
		Ok(Graph::from_shared(self.shared()?))
	}

	/// Forgets the static kind.
	pub fn erase(&self) -> NodeHandle {
		self.sibling(self.id)
	}

	/// Checks the node's kind and returns a typed handle.
	///
	/// # Errors
	///
	/// `TypeError` when the node is not a `C`.
	pub fn downcast<C: NodeKind>(&self) -> Result<Handle<C>> {
		let (kind_id, found) = self.shared()?.read(|state| {
			let record = state.record(self.id)?;
			Ok::<_, Error>((record.kind_id, record.type_name))
		})?;
		if kind_id != TypeId::of::<C>() {
			return Err(Error::new(
				ErrorKind::Type,
				format!("node of kind {found} is not a {}", std::any::type_name::<C>()),
			));
		}
		Ok(self.sibling(self.id))
	}

	pub fn uuid(&self) -> Result<Uuid> {
		self.shared()?.read(|state| Ok(state.record(self.id)?.uuid))
	}

	/// Node name, assigning its mnemonic on first request.
	pub fn name(&self) -> Result<String> {
		self.shared()?.write(|state| {
			let uuid = state.record(self.id)?.uuid;
			Ok(state.names.name_of(uuid))
		})
	}

	/// Renames the node; returns the name actually assigned.
	pub fn set_name(&self, proposal: &str) -> Result<String> {
		let uuid = self.uuid()?;
		self.graph()?.set_name(uuid, proposal)
	}

	/// Rust type name of the node kind.
	pub fn type_name(&self) -> Result<&'static str> {
		self.shared()?.read(|state| Ok(state.record(self.id)?.type_name))
	}

	/// Combined hash of every property value, in layout order.
	pub fn property_hash(&self) -> Result<u64> {
		self.shared()?.read(|state| Ok(state.record(self.id)?.property_hash))
	}

	pub fn get<T: PropertyValue>(&self, name: &str) -> Result<T> {
		self.shared()?.get_property(self.id, name)
	}

	/// Sets a property from the UI thread. Returns `false` when the
	/// property callback rejected the value.
	pub fn set<T: PropertyValue>(&self, name: &str, value: T) -> Result<bool> {
		self.shared()?.set_property(self.id, name, value)
	}

	/// Restores a property's declared default.
	pub fn reset<T: PropertyValue>(&self, name: &str) -> Result<bool> {
		let shared = self.shared()?;
		let default = shared.default_property::<T>(self.id, name)?;
		shared.set_property(self.id, name, default)
	}

	pub fn connect_property<T: PropertyValue>(&self, name: &str) -> Result<PropertyHandle<T>> {
		let name = self.shared()?.property_name::<T>(self.id, name)?;
		Ok(PropertyHandle::new(self.erase(), name))
	}

	/// Replaces the property callback. UI thread only.
	pub fn set_callback<T: PropertyValue>(
		&self,
		name: &str,
		callback: impl Fn(&mut T) -> bool + Send + Sync + 'static,
	) -> Result<()> {
		let callback: PropertyCallback<T> = Arc::new(callback);
		self.shared()?.set_property_callback(self.id, name, Some(callback))
	}

	pub fn clear_callback<T: PropertyValue>(&self, name: &str) -> Result<()> {
		self.shared()?.set_property_callback::<T>(self.id, name, None)
	}

	/// Delivers `value` to a slot. UI thread only.
	pub fn call<T: Send + Sync + 'static>(&self, name: &str, value: T) -> Result<()> {
		self.shared()?.call_slot(self.id, name, value)
	}

	pub fn connect_slot<T: Send + Sync + 'static>(&self, name: &str) -> Result<SlotHandle<T>> {
		let name = self.shared()?.slot_name::<T>(self.id, name)?;
		Ok(SlotHandle::new(self.erase(), name))
	}

	pub fn connect_signal<T: Send + Sync + 'static>(&self, name: &str) -> Result<SignalHandle<T>> {
		let name = self.shared()?.signal_name::<T>(self.id, name)?;
		Ok(SignalHandle::new(self.erase(), name))
	}

	fn flags(&self) -> Result<NodeFlags> {
		self.shared()?.read(|state| Ok(state.structure(self.id)?.flags))
	}

	fn set_flags(&self, operation: &str, flags: NodeFlags, value: bool) -> Result<()> {
		self.shared()?.write(|state| {
			state.ensure_ui(operation)?;
			state.write_structure(self.id, true, |s| s.flags.set(flags, value))
		})
	}

	/// User flag `index`.
	///
	/// # Errors
	///
	/// `IndexError` when `index >= USER_FLAG_COUNT`.
	pub fn flag(&self, index: usize) -> Result<bool> {
		if index >= USER_FLAG_COUNT {
			return Err(Error::index("user flag", index, USER_FLAG_COUNT));
		}
		Ok(self.flags()?.contains(NodeFlags::user(index)))
	}

	pub fn set_flag(&self, index: usize, value: bool) -> Result<()> {
		if index >= USER_FLAG_COUNT {
			return Err(Error::index("user flag", index, USER_FLAG_COUNT));
		}
		self.set_flags("set_flag", NodeFlags::user(index), value)
	}

	pub fn is_enabled(&self) -> Result<bool> {
		Ok(self.flags()?.contains(NodeFlags::ENABLED))
	}

	pub fn set_enabled(&self, value: bool) -> Result<()> {
		self.set_flags("set_enabled", NodeFlags::ENABLED, value)
	}

	pub fn is_visible(&self) -> Result<bool> {
		Ok(self.flags()?.contains(NodeFlags::VISIBLE))
	}

	pub fn set_visible(&self, value: bool) -> Result<()> {
		self.set_flags("set_visible", NodeFlags::VISIBLE, value)
	}

	pub fn is_dirty(&self) -> Result<bool> {
		Ok(self.flags()?.contains(NodeFlags::DIRTY))
	}

	pub fn is_finalized(&self) -> Result<bool> {
		Ok(self.flags()?.contains(NodeFlags::FINALIZED))
	}

	/// Removes the node and its subtree. UI thread only.
	///
	/// # Errors
	///
	/// `GraphError` for the root node.
	pub fn remove(&self) -> Result<()> {
		self.shared()?.remove(self.id)
	}
}

impl<K: NodeKind> Handle<K> {
	/// The node's kind value.
	pub fn kind(&self) -> Result<Arc<K>> {
		let kind = self.shared()?.read(|state| Ok::<_, Error>(Arc::clone(&state.record(self.id)?.kind)))?;
		kind.downcast::<K>()
			.map_err(|_| Error::internal("typed handle does not match the node kind"))
	}
}

/// Unique owner of a node; dropping it removes the node.
///
/// Removal runs through the UI-thread mutator path. Dropping an owner whose
/// node is already gone, or while the graph shuts down, does nothing.
pub struct Owner<K = Untyped> {
	handle: Handle<K>,
}

impl<K> Owner<K> {
	pub fn handle(&self) -> Handle<K> {
		self.handle.clone()
	}
}

impl<K> std::ops::Deref for Owner<K> {
	type Target = Handle<K>;

	fn deref(&self) -> &Handle<K> {
		&self.handle
	}
}

impl<K> fmt::Debug for Owner<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Owner({:?})", self.handle.id)
	}
}

impl<K> Drop for Owner<K> {
	fn drop(&mut self) {
		let Some(graph) = self.handle.graph.upgrade() else {
			return;
		};
		if graph.is_shutting_down() {
			return;
		}
		match graph.remove(self.handle.id) {
			Ok(()) => {}
			Err(error) if error.is(ErrorKind::HandleExpired) => {}
			Err(error) => {
				tracing::warn!(node = ?self.handle.id, %error, "owner.drop.remove_failed");
			}
		}
	}
}

/// Result of `create_child`: any number of handles, one owner.
pub struct NewNode<K> {
	handle: Handle<K>,
	owner_taken: AtomicBool,
}

impl<K> fmt::Debug for NewNode<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("NewNode")
			.field("handle", &self.handle)
			.field("owner_taken", &self.owner_taken.load(Ordering::Relaxed))
			.finish()
	}
}

impl<K> NewNode<K> {
	pub(crate) fn new(handle: Handle<K>) -> Self {
		Self {
			handle,
			owner_taken: AtomicBool::new(false),
		}
	}

	pub fn handle(&self) -> Handle<K> {
		self.handle.clone()
	}

	/// Takes the node's owner.
	///
	/// # Errors
	///
	/// `InternalError` on the second call.
	pub fn owner(&self) -> Result<Owner<K>> {
		if self.owner_taken.swap(true, Ordering::AcqRel) {
			return Err(Error::internal("node owner already taken"));
		}
		Ok(Owner {
			handle: self.handle.clone(),
		})
	}
}
