//! Panic payload extraction for task and thread boundaries.

use std::any::Any;

use tokio::task::JoinError;

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
	if let Some(message) = payload.downcast_ref::<&'static str>() {
		(*message).to_owned()
	} else if let Some(message) = payload.downcast_ref::<String>() {
		message.clone()
	} else {
		"non-string panic payload".to_owned()
	}
}

/// Panic text of a failed task, or `None` when it was cancelled.
pub fn join_error_panic_message(error: JoinError) -> Option<String> {
	let payload = error.try_into_panic().ok()?;
	Some(panic_message(&*payload))
}
