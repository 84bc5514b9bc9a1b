//! Reactive scene graph.
//!
//! A tree of long-lived nodes, each carrying typed properties, slots and
//! signals. One UI thread mutates the tree; a render thread may [`Graph::freeze`]
//! it and read a stable snapshot while the UI thread keeps writing into
//! per-node overlays, which [`Graph::synchronise`] folds back in.
//!
//! ```ignore
//! struct Label;
//!
//! const TEXT: PropertyKey<String> = PropertyKey::new("text");
//!
//! impl NodeKind for Label {
//!     fn declare(&self, ctx: &NodeContext<Self>) -> Result<()> {
//!         ctx.declare(&TEXT, String::new())
//!     }
//! }
//!
//! let graph = Graph::new();
//! let _ui = graph.claim_ui_thread()?;
//! let label = graph.root().create_child(Label)?.handle();
//! TEXT.set(&label, "hello".into())?;
//! ```

mod arena;
mod context;
mod flags;
mod graph;
mod handle;
mod hierarchy;
mod mnemonic;
mod names;
mod node;
mod port;
mod property;
mod value;

pub use arena::NodeId;
pub use arbor_common::{Error, ErrorKind, Result};
pub use context::NodeContext;
pub use flags::{NodeFlags, USER_FLAG_COUNT};
pub use graph::{FreezeGuard, Graph, UiThreadGuard};
pub use handle::{Handle, NewNode, NodeHandle, Owner, Untyped};
pub use node::{NodeKind, Root};
pub use port::{SignalHandle, SignalKey, SlotHandle, SlotKey};
pub use property::{PropertyCallback, PropertyHandle, PropertyKey};
pub use value::PropertyValue;
