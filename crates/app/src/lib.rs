//! Process-level wiring for arbor.
//!
//! [`Application::start`] reads an [`AppConfig`], installs logging and brings
//! up the three threads around one [`arbor_graph::Graph`]: the UI event loop,
//! the timer pool and, given a [`Renderer`], the render thread.

mod application;
mod config;
mod logging;
mod render;

pub use application::{AppContext, Application};
pub use config::{AppConfig, ChannelConfig, ConfigError, LogConfig};
pub use logging::init_logging;
pub use render::{RenderManager, Renderer};
