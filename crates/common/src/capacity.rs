//! Capacity validation for bounded channels.

use crate::{Error, Result};

/// Default capacity of event and timer channels.
pub const DEFAULT_CAPACITY: usize = 32;

/// Checks that `capacity` is a power of two of at least one.
///
/// # Errors
///
/// Returns a `ValueError` for zero or non-power-of-two capacities.
#[track_caller]
pub fn validate_capacity(capacity: usize) -> Result<usize> {
	if capacity == 0 {
		return Err(Error::value("channel capacity must be at least 1"));
	}
	if !capacity.is_power_of_two() {
		return Err(Error::value(format!("channel capacity {capacity} is not a power of two")));
	}
	Ok(capacity)
}
