use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` overrides `config.filter`. Returns `false` when a subscriber
/// was already installed, which is left in place.
pub fn init_logging(config: &LogConfig) -> bool {
	let filter = EnvFilter::try_from_default_env()
		.or_else(|_| EnvFilter::try_new(&config.filter))
		.unwrap_or_else(|_| EnvFilter::new("info"));
	let installed = tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_ansi(config.ansi)
		.with_thread_names(true)
		.try_init()
		.is_ok();
	if installed {
		tracing::debug!(filter = %config.filter, "app.logging.installed");
	}
	installed
}
