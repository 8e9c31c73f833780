//! Task spawning and cooperative scheduling.
//!
//! Long-running work (the full library scan, the persistence writers, the
//! change listener) is spawned here. Chunked loops call [`yield_now`] between
//! chunks so other tasks keep making progress on a single-threaded runtime.

pub use tokio::task::{spawn_blocking, yield_now, JoinError, JoinHandle};

/// Spawns a new asynchronous task on the current runtime.
///
/// The returned handle can be awaited for the task's output or dropped to
/// detach the task.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
