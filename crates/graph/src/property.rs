//! Typed node properties.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use arbor_common::Result;
use arbor_reactive::{Publisher, PublisherId, Sink, Source, StreamError, Subscriber};

use crate::arena::NodeId;
use crate::graph::GraphShared;
use crate::handle::{Handle, NodeHandle};
use crate::value::PropertyValue;

/// Validator/mutator run before a value is stored; `false` rejects the write.
pub type PropertyCallback<T> = Arc<dyn Fn(&mut T) -> bool + Send + Sync>;

/// Type-erased view of a [`PropertyCell`] stored in a node layout.
pub(crate) trait ErasedProperty: Send + Sync {
	fn as_any(&self) -> &dyn Any;
	fn as_any_mut(&mut self) -> &mut dyn Any;
	fn value_type(&self) -> &'static str;
	fn latest_hash(&self) -> u64;
	fn flush(&mut self);
}

pub(crate) struct PropertyCell<T: PropertyValue> {
	value: T,
	modified: Option<T>,
	default: T,
	pub callback: Option<PropertyCallback<T>>,
	pub publisher: Arc<Publisher<T>>,
	pub input: Arc<PropertyInput<T>>,
}

impl<T: PropertyValue> PropertyCell<T> {
	pub fn new(default: T, input: PropertyInput<T>) -> Self {
		Self {
			value: default.clone(),
			modified: None,
			default,
			callback: None,
			publisher: Arc::new(Publisher::multi().unterminatable()),
			input: Arc::new(input),
		}
	}

	/// Value seen by a reader that may (`overlay`) or may not see overlays.
	pub fn current(&self, overlay: bool) -> &T {
		match &self.modified {
			Some(modified) if overlay => modified,
			_ => &self.value,
		}
	}

	pub fn default_value(&self) -> &T {
		&self.default
	}

	/// Stores `value`, into the overlay when one exists or `to_overlay` asks
	/// for it. Returns whether the overlay was written.
	pub fn write(&mut self, value: T, to_overlay: bool) -> bool {
		if self.modified.is_some() || to_overlay {
			self.modified = Some(value);
			true
		} else {
			self.value = value;
			false
		}
	}
}

impl<T: PropertyValue> ErasedProperty for PropertyCell<T> {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}

	fn value_type(&self) -> &'static str {
		std::any::type_name::<T>()
	}

	fn latest_hash(&self) -> u64 {
		self.current(true).value_hash()
	}

	fn flush(&mut self) {
		if let Some(value) = self.modified.take() {
			self.value = value;
		}
	}
}

/// Subscriber side of a property: every value received is `set` on it.
///
/// Completion is absorbed and errors are logged, so a property never
/// terminates the pipelines it feeds.
pub(crate) struct PropertyInput<T> {
	graph: Weak<GraphShared>,
	node: NodeId,
	name: &'static str,
	_value: PhantomData<fn(T)>,
}

impl<T> PropertyInput<T> {
	pub fn new(graph: Weak<GraphShared>, node: NodeId, name: &'static str) -> Self {
		Self {
			graph,
			node,
			name,
			_value: PhantomData,
		}
	}
}

impl<T: PropertyValue> Subscriber<T> for PropertyInput<T> {
	fn on_next(&self, _publisher: PublisherId, value: &T) {
		let Some(graph) = self.graph.upgrade() else {
			return;
		};
		if let Err(error) = graph.set_property(self.node, self.name, value.clone()) {
			tracing::warn!(property = self.name, node = ?self.node, %error, "property.input.rejected");
		}
	}

	fn on_complete(&self) {
		tracing::trace!(property = self.name, "property.input.complete_absorbed");
	}

	fn on_error(&self, error: &StreamError) {
		tracing::warn!(property = self.name, node = ?self.node, %error, "property.input.error_swallowed");
	}
}

/// Statically named, typed property of a node kind.
///
/// ```ignore
/// const WIDTH: PropertyKey<f32> = PropertyKey::new("width");
/// ctx.declare(&WIDTH, 100.0)?;
/// WIDTH.set(&node, 120.0)?;
/// ```
#[derive(Debug)]
pub struct PropertyKey<T> {
	name: &'static str,
	visible: bool,
	_value: PhantomData<fn() -> T>,
}

impl<T> Clone for PropertyKey<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for PropertyKey<T> {}

impl<T: PropertyValue> PropertyKey<T> {
	/// A visible property: changing it marks the node dirty.
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			visible: true,
			_value: PhantomData,
		}
	}

	/// A property whose changes do not require a redraw.
	pub const fn hidden(name: &'static str) -> Self {
		Self {
			name,
			visible: false,
			_value: PhantomData,
		}
	}

	pub const fn name(&self) -> &'static str {
		self.name
	}

	pub const fn is_visible(&self) -> bool {
		self.visible
	}

	pub fn get<K>(&self, node: &Handle<K>) -> Result<T> {
		node.get(self.name)
	}

	pub fn set<K>(&self, node: &Handle<K>, value: T) -> Result<bool> {
		node.set(self.name, value)
	}

	pub fn connect<K>(&self, node: &Handle<K>) -> Result<PropertyHandle<T>> {
		node.connect_property(self.name)
	}
}

/// Reactive endpoint of one property, usable as source and sink.
///
/// Resolution fails with `HandleExpired` once the node is gone.
pub struct PropertyHandle<T> {
	node: NodeHandle,
	name: &'static str,
	_value: PhantomData<fn() -> T>,
}

impl<T> Clone for PropertyHandle<T> {
	fn clone(&self) -> Self {
		Self {
			node: self.node.clone(),
			name: self.name,
			_value: PhantomData,
		}
	}
}

impl<T> std::fmt::Debug for PropertyHandle<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PropertyHandle")
			.field("node", &self.node)
			.field("name", &self.name)
			.finish()
	}
}

impl<T: PropertyValue> PropertyHandle<T> {
	pub(crate) fn new(node: NodeHandle, name: &'static str) -> Self {
		Self {
			node,
			name,
			_value: PhantomData,
		}
	}

	pub fn name(&self) -> &'static str {
		self.name
	}

	pub fn node(&self) -> &NodeHandle {
		&self.node
	}

	pub fn get(&self) -> Result<T> {
		self.node.get(self.name)
	}

	pub fn set(&self, value: T) -> Result<bool> {
		self.node.set(self.name, value)
	}
}

impl<T: PropertyValue> Source<T> for PropertyHandle<T> {
	fn publisher(&self) -> Result<Arc<Publisher<T>>> {
		let graph = self.node.shared()?;
		graph.read(|state| Ok(Arc::clone(&state.record(self.node.id())?.property::<T>(self.name)?.publisher)))
	}
}

impl<T: PropertyValue> Sink<T> for PropertyHandle<T> {
	fn subscriber(&self) -> Result<Arc<dyn Subscriber<T>>> {
		let graph = self.node.shared()?;
		graph.read(|state| {
			let input = Arc::clone(&state.record(self.node.id())?.property::<T>(self.name)?.input);
			Ok(input as Arc<dyn Subscriber<T>>)
		})
	}
}

impl GraphShared {
	/// Adds a property to a node that is still being declared.
	pub(crate) fn declare_property<T: PropertyValue>(
		self: &Arc<Self>,
		id: NodeId,
		name: &'static str,
		default: T,
		visible: bool,
	) -> Result<()> {
		let graph = Arc::downgrade(self);
		self.write(|state| {
			let record = state.live_mut(id)?;
			record.check_declarable("property", name)?;

			let cell = PropertyCell::new(default, PropertyInput::new(graph, id, name));
			if visible {
				let redraw: Arc<dyn Subscriber<T>> = record.redraw.clone();
				cell.publisher.subscribe(&redraw);
			}
			record.properties.insert(name, Box::new(cell));
			record.recompute_hash();
			tracing::trace!(node = ?id, property = name, visible, "property.declare");
			Ok(())
		})
	}

	pub(crate) fn get_property<T: PropertyValue>(&self, id: NodeId, name: &str) -> Result<T> {
		self.read(|state| {
			let overlay = state.sees_overlay();
			Ok(state.record(id)?.property::<T>(name)?.current(overlay).clone())
		})
	}

	pub(crate) fn default_property<T: PropertyValue>(&self, id: NodeId, name: &str) -> Result<T> {
		self.read(|state| Ok(state.record(id)?.property::<T>(name)?.default_value().clone()))
	}

	/// Runs the callback, stores the value and publishes it.
	///
	/// Returns `false` when the callback rejected the value.
	pub(crate) fn set_property<T: PropertyValue>(&self, id: NodeId, name: &str, mut value: T) -> Result<bool> {
		let callback = self.read(|state| {
			state.ensure_ui("property set")?;
			Ok::<_, arbor_common::Error>(state.live(id)?.property::<T>(name)?.callback.clone())
		})?;

		if let Some(callback) = callback
			&& !callback(&mut value)
		{
			tracing::trace!(node = ?id, property = name, "property.set.rejected");
			return Ok(false);
		}

		let publisher = self.write(|state| {
			let frozen = state.frozen_by.is_some();
			let record = state.live_mut(id)?;
			let to_overlay = frozen && record.is_finalized();
			let cell = record.property_mut::<T>(name)?;
			let overlaid = cell.write(value.clone(), to_overlay);
			let publisher = Arc::clone(&cell.publisher);
			record.recompute_hash();
			if overlaid {
				state.pending.insert(id);
			}
			Ok::<_, arbor_common::Error>(publisher)
		})?;

		publisher.publish(&value);
		Ok(true)
	}

	pub(crate) fn set_property_callback<T: PropertyValue>(
		&self,
		id: NodeId,
		name: &str,
		callback: Option<PropertyCallback<T>>,
	) -> Result<()> {
		self.write(|state| {
			state.ensure_ui("set_callback")?;
			state.live_mut(id)?.property_mut::<T>(name)?.callback = callback;
			Ok(())
		})
	}

	/// Static name of a declared property, validating its type.
	pub(crate) fn property_name<T: PropertyValue>(&self, id: NodeId, name: &str) -> Result<&'static str> {
		self.read(|state| {
			let record = state.record(id)?;
			record.property::<T>(name)?;
			record
				.properties
				.get_key_value(name)
				.map(|(key, _)| *key)
				.ok_or_else(|| arbor_common::Error::name("property", name))
		})
	}
}
