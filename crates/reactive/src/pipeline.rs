use std::any::Any;
use std::sync::{Arc, Weak};

use arbor_common::Result;

use crate::publisher::Publisher;
use crate::subscriber::Subscriber;

/// Something that can hand out a publisher of `T`.
pub trait Source<T> {
	/// Resolves the publisher to subscribe to.
	///
	/// # Errors
	///
	/// Graph-backed sources fail with `HandleExpired` once their node is gone.
	fn publisher(&self) -> Result<Arc<Publisher<T>>>;
}

/// Something that can hand out a subscriber of `T`.
pub trait Sink<T> {
	/// Resolves the subscriber to connect.
	///
	/// # Errors
	///
	/// Graph-backed sinks fail with `HandleExpired` once their node is gone.
	fn subscriber(&self) -> Result<Arc<dyn Subscriber<T>>>;
}

impl<T> Source<T> for Arc<Publisher<T>> {
	fn publisher(&self) -> Result<Arc<Publisher<T>>> {
		Ok(Arc::clone(self))
	}
}

impl<T, S: Subscriber<T> + 'static> Sink<T> for Arc<S> {
	fn subscriber(&self) -> Result<Arc<dyn Subscriber<T>>> {
		Ok(Arc::clone(self) as Arc<dyn Subscriber<T>>)
	}
}

impl<T> Sink<T> for Arc<dyn Subscriber<T>> {
	fn subscriber(&self) -> Result<Arc<dyn Subscriber<T>>> {
		Ok(Arc::clone(self))
	}
}

/// One publisher to subscriber edge.
struct Link<T: 'static> {
	publisher: Weak<Publisher<T>>,
	subscriber: Arc<dyn Subscriber<T>>,
}

impl<T: 'static> Drop for Link<T> {
	fn drop(&mut self) {
		if let Some(publisher) = self.publisher.upgrade() {
			publisher.unsubscribe(&Arc::downgrade(&self.subscriber));
		}
	}
}

/// Guard over one or more connected links.
///
/// The guard owns every sink it connected. Dropping it unsubscribes each link
/// from its publisher.
#[must_use = "dropping a Pipeline disconnects it"]
#[derive(Default)]
pub struct Pipeline {
	links: Vec<Box<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Pipeline {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Pipeline").field("links", &self.links.len()).finish()
	}
}

impl Pipeline {
	/// A pipeline with no links.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Merges `other` into this pipeline.
	pub fn chain(mut self, mut other: Pipeline) -> Self {
		self.links.append(&mut other.links);
		self
	}

	/// Number of links held.
	pub fn len(&self) -> usize {
		self.links.len()
	}

	pub fn is_empty(&self) -> bool {
		self.links.is_empty()
	}
}

/// Subscribes `sink` to `source` and returns the guard owning the link.
///
/// # Errors
///
/// Propagates the resolution failure of either end.
pub fn connect<T: 'static>(source: &impl Source<T>, sink: &impl Sink<T>) -> Result<Pipeline> {
	let publisher = source.publisher()?;
	let subscriber = sink.subscriber()?;
	publisher.subscribe(&subscriber);
	tracing::trace!(publisher = publisher.id(), "pipeline.connect");

	let link = Link {
		publisher: Arc::downgrade(&publisher),
		subscriber,
	};
	Ok(Pipeline {
		links: vec![Box::new(link)],
	})
}
