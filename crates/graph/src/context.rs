use std::ops::Deref;
use std::sync::Arc;

use arbor_common::Result;
use arbor_reactive::Publisher;

use crate::handle::Handle;
use crate::port::{SignalKey, SlotKey};
use crate::property::PropertyKey;
use crate::value::PropertyValue;

/// A node's view of itself, handed to its kind's hooks.
///
/// Declares the node's layout, wires slot callbacks and emits signals.
/// Layout declarations fail with `FinalizedError` once the node is sealed.
pub struct NodeContext<K> {
	handle: Handle<K>,
}

impl<K> std::fmt::Debug for NodeContext<K> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("NodeContext").field(&self.handle).finish()
	}
}

impl<K> Clone for NodeContext<K> {
	fn clone(&self) -> Self {
		Self {
			handle: self.handle.clone(),
		}
	}
}

impl<K> Deref for NodeContext<K> {
	type Target = Handle<K>;

	fn deref(&self) -> &Handle<K> {
		&self.handle
	}
}

impl<K> NodeContext<K> {
	pub(crate) fn new(handle: Handle<K>) -> Self {
		Self { handle }
	}

	pub fn handle(&self) -> &Handle<K> {
		&self.handle
	}

	/// Declares a property named `name` holding `default`.
	///
	/// Visible properties mark the node dirty whenever they change.
	pub fn add_property<T: PropertyValue>(&self, name: &'static str, default: T, visible: bool) -> Result<()> {
		self.handle.shared()?.declare_property(self.handle.id(), name, default, visible)
	}

	/// Declares the property described by `key`.
	pub fn declare<T: PropertyValue>(&self, key: &PropertyKey<T>, default: T) -> Result<()> {
		self.add_property(key.name(), default, key.is_visible())
	}

	pub fn add_slot<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<()> {
		self.handle.shared()?.declare_slot::<T>(self.handle.id(), name)
	}

	pub fn declare_slot<T: Send + Sync + 'static>(&self, key: &SlotKey<T>) -> Result<()> {
		self.add_slot::<T>(key.name())
	}

	pub fn add_signal<T: Send + Sync + 'static>(&self, name: &'static str) -> Result<()> {
		self.handle.shared()?.declare_signal::<T>(self.handle.id(), name)
	}

	pub fn declare_signal<T: Send + Sync + 'static>(&self, key: &SignalKey<T>) -> Result<()> {
		self.add_signal::<T>(key.name())
	}

	/// Runs `handler` for every value delivered to the slot.
	///
	/// The node keeps the handler alive; a later call replaces it.
	pub fn on_slot<T: Send + Sync + 'static>(&self, name: &str, handler: impl Fn(&T) + Send + Sync + 'static) -> Result<()> {
		self.handle.shared()?.set_slot_handler(self.handle.id(), name, handler)
	}

	/// The slot's internal publisher, for custom subscriptions.
	pub fn slot_publisher<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<Publisher<T>>> {
		self.handle.shared()?.slot_publisher(self.handle.id(), name)
	}

	/// Publishes `value` on the signal named `name`.
	pub fn emit<T: Send + Sync + 'static>(&self, name: &str, value: &T) -> Result<()> {
		self.handle.shared()?.emit_signal(self.handle.id(), name, value)
	}

	pub fn emit_key<T: Send + Sync + 'static>(&self, key: &SignalKey<T>, value: &T) -> Result<()> {
		self.emit(key.name(), value)
	}
}
