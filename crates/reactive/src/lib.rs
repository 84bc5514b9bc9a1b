//! Synchronous publish/subscribe primitives.
//!
//! Publishers hold their subscribers weakly; a [`Pipeline`] returned by
//! [`connect`] keeps a link alive until it is dropped.

mod pipeline;
mod publisher;
mod subscriber;

pub use pipeline::{Pipeline, Sink, Source, connect};
pub use publisher::{Policy, Publisher};
pub use subscriber::{Callbacks, PublisherId, StreamError, Subscriber, subscriber_fn};
