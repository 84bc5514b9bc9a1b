//! Shared error taxonomy and small primitives for arbor crates.

mod capacity;
mod error;

pub use capacity::{DEFAULT_CAPACITY, validate_capacity};
pub use error::{Error, ErrorKind, Result};
