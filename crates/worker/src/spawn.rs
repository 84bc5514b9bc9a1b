use arbor_common::{Error, Result};

use crate::ThreadRole;

/// Spawns the dedicated OS thread for `role`, named after it.
///
/// # Errors
///
/// `StartupError` when the OS refuses the thread.
pub fn spawn_role_thread<F, R>(role: ThreadRole, f: F) -> Result<std::thread::JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(role = role.as_str(), "worker.spawn_thread");
	std::thread::Builder::new()
		.name(role.thread_name().to_owned())
		.spawn(f)
		.map_err(|error| Error::startup(format!("cannot spawn {} thread: {error}", role.thread_name())))
}

/// Builds the single-threaded runtime that drives a role's local tasks.
pub(crate) fn local_runtime(role: ThreadRole) -> Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_current_thread()
		.enable_time()
		.build()
		.map_err(|error| Error::startup(format!("cannot build {} runtime: {error}", role.as_str())))
}

/// Joins `handle` unless called from the thread itself, logging a panic.
pub(crate) fn join_role_thread(role: ThreadRole, handle: std::thread::JoinHandle<()>) {
	if handle.thread().id() == std::thread::current().id() {
		tracing::warn!(role = role.as_str(), "worker.join.self");
		return;
	}
	if let Err(payload) = handle.join() {
		tracing::error!(role = role.as_str(), panic = %crate::panic::panic_message(&*payload), "worker.thread.panicked");
	}
}
