//! Slots (incoming) and signals (outgoing) of a node.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use arbor_common::{Error, Result};
use arbor_reactive::{Callbacks, Publisher, PublisherId, Sink, Source, StreamError, Subscriber};

use crate::arena::NodeId;
use crate::graph::GraphShared;
use crate::handle::{Handle, NodeHandle};
use crate::node::NodeRecord;

/// Type-erased slot or signal stored in a node layout.
pub(crate) trait ErasedPort: Send + Sync {
	fn as_any(&self) -> &dyn Any;
	fn as_any_mut(&mut self) -> &mut dyn Any;
	fn value_type(&self) -> &'static str;
}

/// Forwards externally received values to the slot's internal publisher.
pub(crate) struct SlotInput<T> {
	name: &'static str,
	publisher: Arc<Publisher<T>>,
}

impl<T: Send + Sync + 'static> Subscriber<T> for SlotInput<T> {
	fn on_next(&self, publisher: PublisherId, value: &T) {
		self.publisher.publish_as(publisher, value);
	}

	fn on_error(&self, error: &StreamError) {
		tracing::warn!(slot = self.name, %error, "slot.input.error");
	}
}

pub(crate) struct SlotCell<T> {
	pub input: Arc<SlotInput<T>>,
	pub publisher: Arc<Publisher<T>>,
	/// Subscriber installed by `on_slot`, kept alive by the node.
	pub handler: Option<Arc<dyn Subscriber<T>>>,
}

impl<T: Send + Sync + 'static> SlotCell<T> {
	fn new(name: &'static str) -> Self {
		let publisher = Arc::new(Publisher::single().unterminatable());
		Self {
			input: Arc::new(SlotInput {
				name,
				publisher: Arc::clone(&publisher),
			}),
			publisher,
			handler: None,
		}
	}
}

impl<T: Send + Sync + 'static> ErasedPort for SlotCell<T> {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}

	fn value_type(&self) -> &'static str {
		std::any::type_name::<T>()
	}
}

pub(crate) struct SignalCell<T: 'static> {
	pub publisher: Arc<Publisher<T>>,
}

impl<T: Send + Sync + 'static> ErasedPort for SignalCell<T> {
	fn as_any(&self) -> &dyn Any {
		self
	}

	fn as_any_mut(&mut self) -> &mut dyn Any {
		self
	}

	fn value_type(&self) -> &'static str {
		std::any::type_name::<T>()
	}
}

impl<T: 'static> Drop for SignalCell<T> {
	fn drop(&mut self) {
		// Records are dropped outside the graph borrow, so subscribers may
		// re-enter the graph here.
		self.publisher.complete();
	}
}

fn downcast<'a, C: 'static>(port: &'a dyn ErasedPort, what: &str, name: &str, expected: &str) -> Result<&'a C> {
	port.as_any()
		.downcast_ref()
		.ok_or_else(|| Error::type_mismatch(what, name, expected, port.value_type()))
}

impl NodeRecord {
	pub fn slot<T: Send + Sync + 'static>(&self, name: &str) -> Result<&SlotCell<T>> {
		let port = self.slots.get(name).ok_or_else(|| Error::name("slot", name))?;
		downcast(&**port, "slot", name, std::any::type_name::<T>())
	}

	pub fn slot_mut<T: Send + Sync + 'static>(&mut self, name: &str) -> Result<&mut SlotCell<T>> {
		let port = self.slots.get_mut(name).ok_or_else(|| Error::name("slot", name))?;
		let found = port.value_type();
		port.as_any_mut()
			.downcast_mut()
			.ok_or_else(|| Error::type_mismatch("slot", name, std::any::type_name::<T>(), found))
	}

	pub fn signal<T: Send + Sync + 'static>(&self, name: &str) -> Result<&SignalCell<T>> {
		let port = self.signals.get(name).ok_or_else(|| Error::name("signal", name))?;
		downcast(&**port, "signal", name, std::any::type_name::<T>())
	}
}

/// Statically named, typed slot of a node kind.
#[derive(Debug)]
pub struct SlotKey<T> {
	name: &'static str,
	_value: PhantomData<fn(T)>,
}

impl<T> Clone for SlotKey<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for SlotKey<T> {}

impl<T: Send + Sync + 'static> SlotKey<T> {
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			_value: PhantomData,
		}
	}

	pub const fn name(&self) -> &'static str {
		self.name
	}

	pub fn call<K>(&self, node: &Handle<K>, value: T) -> Result<()> {
		node.call(self.name, value)
	}

	pub fn connect<K>(&self, node: &Handle<K>) -> Result<SlotHandle<T>> {
		node.connect_slot(self.name)
	}
}

/// Statically named, typed signal of a node kind.
#[derive(Debug)]
pub struct SignalKey<T> {
	name: &'static str,
	_value: PhantomData<fn() -> T>,
}

impl<T> Clone for SignalKey<T> {
	fn clone(&self) -> Self {
		*self
	}
}

impl<T> Copy for SignalKey<T> {}

impl<T: Send + Sync + 'static> SignalKey<T> {
	pub const fn new(name: &'static str) -> Self {
		Self {
			name,
			_value: PhantomData,
		}
	}

	pub const fn name(&self) -> &'static str {
		self.name
	}

	pub fn connect<K>(&self, node: &Handle<K>) -> Result<SignalHandle<T>> {
		node.connect_signal(self.name)
	}
}

/// External end of a slot; connect a publisher into it.
pub struct SlotHandle<T> {
	node: NodeHandle,
	name: &'static str,
	_value: PhantomData<fn(T)>,
}

impl<T> Clone for SlotHandle<T> {
	fn clone(&self) -> Self {
		Self {
			node: self.node.clone(),
			name: self.name,
			_value: PhantomData,
		}
	}
}

impl<T> std::fmt::Debug for SlotHandle<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SlotHandle").field("node", &self.node).field("name", &self.name).finish()
	}
}

impl<T: Send + Sync + 'static> SlotHandle<T> {
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

	/// Delivers `value` directly.
	pub fn call(&self, value: T) -> Result<()> {
		self.node.call(self.name, value)
	}
}

impl<T: Send + Sync + 'static> Sink<T> for SlotHandle<T> {
	fn subscriber(&self) -> Result<Arc<dyn Subscriber<T>>> {
		let graph = self.node.shared()?;
		graph.read(|state| {
			let input = Arc::clone(&state.record(self.node.id())?.slot::<T>(self.name)?.input);
			Ok(input as Arc<dyn Subscriber<T>>)
		})
	}
}

/// External end of a signal; connect subscribers to it.
pub struct SignalHandle<T> {
	node: NodeHandle,
	name: &'static str,
	_value: PhantomData<fn() -> T>,
}

impl<T> Clone for SignalHandle<T> {
	fn clone(&self) -> Self {
		Self {
			node: self.node.clone(),
			name: self.name,
			_value: PhantomData,
		}
	}
}

impl<T> std::fmt::Debug for SignalHandle<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SignalHandle").field("node", &self.node).field("name", &self.name).finish()
	}
}

impl<T: Send + Sync + 'static> SignalHandle<T> {
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
}

impl<T: Send + Sync + 'static> Source<T> for SignalHandle<T> {
	fn publisher(&self) -> Result<Arc<Publisher<T>>> {
		let graph = self.node.shared()?;
		graph.read(|state| Ok(Arc::clone(&state.record(self.node.id())?.signal::<T>(self.name)?.publisher)))
	}
}

impl GraphShared {
	pub(crate) fn declare_slot<T: Send + Sync + 'static>(&self, id: NodeId, name: &'static str) -> Result<()> {
		self.write(|state| {
			let record = state.live_mut(id)?;
			record.check_declarable("slot", name)?;
			record.slots.insert(name, Box::new(SlotCell::<T>::new(name)));
			tracing::trace!(node = ?id, slot = name, "slot.declare");
			Ok(())
		})
	}

	pub(crate) fn declare_signal<T: Send + Sync + 'static>(&self, id: NodeId, name: &'static str) -> Result<()> {
		self.write(|state| {
			let record = state.live_mut(id)?;
			record.check_declarable("signal", name)?;
			let cell = SignalCell::<T> {
				publisher: Arc::new(Publisher::multi()),
			};
			record.signals.insert(name, Box::new(cell));
			tracing::trace!(node = ?id, signal = name, "signal.declare");
			Ok(())
		})
	}

	/// Installs `handler` as the slot's internal subscriber.
	pub(crate) fn set_slot_handler<T: Send + Sync + 'static>(
		&self,
		id: NodeId,
		name: &str,
		handler: impl Fn(&T) + Send + Sync + 'static,
	) -> Result<()> {
		let handler: Arc<dyn Subscriber<T>> = Arc::new(Callbacks::new(move |_, value: &T| handler(value)));
		let previous = self.write(|state| {
			let slot = state.live_mut(id)?.slot_mut::<T>(name)?;
			slot.publisher.subscribe(&handler);
			Ok::<_, Error>(slot.handler.replace(handler))
		})?;
		drop(previous);
		Ok(())
	}

	pub(crate) fn slot_publisher<T: Send + Sync + 'static>(&self, id: NodeId, name: &str) -> Result<Arc<Publisher<T>>> {
		self.read(|state| Ok(Arc::clone(&state.record(id)?.slot::<T>(name)?.publisher)))
	}

	pub(crate) fn call_slot<T: Send + Sync + 'static>(&self, id: NodeId, name: &str, value: T) -> Result<()> {
		let input = self.read(|state| {
			state.ensure_ui("slot call")?;
			Ok::<_, Error>(Arc::clone(&state.live(id)?.slot::<T>(name)?.input))
		})?;
		input.publisher.publish(&value);
		Ok(())
	}

	pub(crate) fn emit_signal<T: Send + Sync + 'static>(&self, id: NodeId, name: &str, value: &T) -> Result<()> {
		let publisher = self.read(|state| Ok::<_, Error>(Arc::clone(&state.live(id)?.signal::<T>(name)?.publisher)))?;
		publisher.publish(value);
		Ok(())
	}

	pub(crate) fn slot_name<T: Send + Sync + 'static>(&self, id: NodeId, name: &str) -> Result<&'static str> {
		self.read(|state| {
			let record = state.record(id)?;
			record.slot::<T>(name)?;
			record
				.slots
				.get_key_value(name)
				.map(|(key, _)| *key)
				.ok_or_else(|| Error::name("slot", name))
		})
	}

	pub(crate) fn signal_name<T: Send + Sync + 'static>(&self, id: NodeId, name: &str) -> Result<&'static str> {
		self.read(|state| {
			let record = state.record(id)?;
			record.signal::<T>(name)?;
			record
				.signals
				.get_key_value(name)
				.map(|(key, _)| *key)
				.ok_or_else(|| Error::name("signal", name))
		})
	}
}
