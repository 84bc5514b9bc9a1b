//! Error taxonomy shared by every arbor crate.

use std::fmt;
use std::panic::Location;

use thiserror::Error;

/// Classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Bootstrap precondition violated (e.g. already running).
	Startup,
	/// Numeric or shape argument out of domain.
	Value,
	/// Out-of-range flag or child index.
	Index,
	/// Runtime name lookup failed.
	Name,
	/// Runtime type check failed.
	Type,
	/// Identity or declaration collision.
	NotUnique,
	/// Operation on a handle whose target is gone.
	HandleExpired,
	/// Hierarchical precondition violated.
	Graph,
	/// Layout declaration after node finalisation.
	Finalized,
	/// Mutator invoked off the UI thread.
	Thread,
	/// Invariant violation signalling a bug.
	Internal,
}

impl ErrorKind {
	/// Stable display name of the kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Startup => "StartupError",
			Self::Value => "ValueError",
			Self::Index => "IndexError",
			Self::Name => "NameError",
			Self::Type => "TypeError",
			Self::NotUnique => "NotUniqueError",
			Self::HandleExpired => "HandleExpiredError",
			Self::Graph => "GraphError",
			Self::Finalized => "FinalizedError",
			Self::Thread => "ThreadError",
			Self::Internal => "InternalError",
		}
	}
}

impl fmt::Display for ErrorKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Tagged error value carrying a message and the site that raised it.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct Error {
	kind: ErrorKind,
	message: String,
	origin: &'static Location<'static>,
}

/// Result alias using [`Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
	/// Creates an error of `kind`, recording the caller as origin.
	#[track_caller]
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
			origin: Location::caller(),
		}
	}

	#[track_caller]
	pub fn startup(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Startup, message)
	}

	#[track_caller]
	pub fn value(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Value, message)
	}

	/// Index `index` not below `len`.
	#[track_caller]
	pub fn index(what: &str, index: usize, len: usize) -> Self {
		Self::new(ErrorKind::Index, format!("{what} index {index} out of range (len {len})"))
	}

	/// No item of `what` (property, slot, signal, node) named `name`.
	#[track_caller]
	pub fn name(what: &str, name: &str) -> Self {
		Self::new(ErrorKind::Name, format!("no {what} named '{name}'"))
	}

	/// Stored type of `name` does not match the requested type.
	#[track_caller]
	pub fn type_mismatch(what: &str, name: &str, expected: &str, found: &str) -> Self {
		Self::new(ErrorKind::Type, format!("{what} '{name}' has type {found}, requested {expected}"))
	}

	#[track_caller]
	pub fn not_unique(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::NotUnique, message)
	}

	#[track_caller]
	pub fn expired() -> Self {
		Self::new(ErrorKind::HandleExpired, "node handle expired")
	}

	#[track_caller]
	pub fn graph(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Graph, message)
	}

	/// `what` named `name` declared after finalisation.
	#[track_caller]
	pub fn finalized(what: &str, name: &str) -> Self {
		Self::new(ErrorKind::Finalized, format!("cannot declare {what} '{name}' on a finalized node"))
	}

	/// `operation` attempted off the UI thread.
	#[track_caller]
	pub fn thread(operation: &str) -> Self {
		Self::new(ErrorKind::Thread, format!("{operation} must run on the UI thread"))
	}

	#[track_caller]
	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(ErrorKind::Internal, message)
	}

	pub fn kind(&self) -> ErrorKind {
		self.kind
	}

	pub fn message(&self) -> &str {
		&self.message
	}

	/// Source location that raised the error.
	pub fn origin(&self) -> &'static Location<'static> {
		self.origin
	}

	/// Returns `true` when the error is of `kind`.
	pub fn is(&self, kind: ErrorKind) -> bool {
		self.kind == kind
	}
}
