//! Threads around the arbor scene graph: the UI event loop, the timer pool
//! and the bounded channels feeding them.
//!
//! Both loops run a tokio current-thread runtime with a `LocalSet`, so every
//! event or timer is its own cooperative task on a single OS thread.

mod channel;
mod class;
mod event;
mod handler;
mod panic;
mod spawn;
mod timer;

pub use channel::{Channel, ChannelError};
pub use class::ThreadRole;
pub use event::{BoxedEvent, DEFAULT_WEIGHT, Event, FnEvent, FutureEvent};
pub use handler::{EventHandler, FrameRenderer};
pub use panic::{join_error_panic_message, panic_message};
pub use spawn::spawn_role_thread;
pub use timer::{Repetitions, Timer, TimerFailure, TimerPool, TimerState};
