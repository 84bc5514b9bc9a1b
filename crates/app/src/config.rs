//! Application configuration read from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [events]
//! capacity = 32
//!
//! [timers]
//! capacity = 32
//!
//! [log]
//! filter = "info"
//! ansi = true
//! ```

use std::path::{Path, PathBuf};

use arbor_common::{DEFAULT_CAPACITY, validate_capacity};
use serde::Deserialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised while loading or validating an [`AppConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Reading the configuration file failed.
	#[error("I/O error reading {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	/// The document is not valid TOML or does not match the schema.
	#[error("invalid configuration: {0}")]
	Parse(#[from] toml::de::Error),

	/// A channel capacity is not a power of two.
	#[error("[{section}] {source}")]
	Capacity {
		section: &'static str,
		#[source]
		source: arbor_common::Error,
	},

	/// The log filter directive does not parse.
	#[error("invalid log filter {filter:?}: {source}")]
	Filter {
		filter: String,
		#[source]
		source: tracing_subscriber::filter::ParseError,
	},
}

/// Sizing of a bounded channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
	pub capacity: usize,
}

impl Default for ChannelConfig {
	fn default() -> Self {
		Self {
			capacity: DEFAULT_CAPACITY,
		}
	}
}

/// Log output settings. `RUST_LOG` takes precedence over `filter`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
	pub filter: String,
	pub ansi: bool,
}

impl Default for LogConfig {
	fn default() -> Self {
		Self {
			filter: "info".to_owned(),
			ansi: true,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
	pub events: ChannelConfig,
	pub timers: ChannelConfig,
	pub log: LogConfig,
}

impl AppConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(source)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates the file at `path`.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::from_toml_str(&source)?;
		tracing::debug!(path = %path.display(), "config.loaded");
		Ok(config)
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		for (section, channel) in [("events", &self.events), ("timers", &self.timers)] {
			validate_capacity(channel.capacity).map_err(|source| ConfigError::Capacity { section, source })?;
		}
		EnvFilter::try_new(&self.log.filter).map_err(|source| ConfigError::Filter {
			filter: self.log.filter.clone(),
			source,
		})?;
		Ok(())
	}
}
