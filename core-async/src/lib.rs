//! Async runtime facade for the photo-sweep core.
//!
//! Every core crate reaches the executor through this crate instead of
//! depending on Tokio directly. Keeping the surface in one place means the
//! loader, the persistence actors and the change listener all share one set of
//! primitives and one test harness.
//!
//! # Modules
//!
//! - `task`: spawning, cooperative yielding
//! - `time`: sleeps, timeouts and wall-clock helpers
//! - `sync`: locks, channels and cancellation
//! - `runtime`: blocking entry point used by the attribute macros
//!
//! # Examples
//!
//! ```rust
//! use core_async::task;
//! use core_async::time::{sleep, Duration};
//!
//! async fn example() {
//!     let handle = task::spawn(async {
//!         sleep(Duration::from_millis(5)).await;
//!         42
//!     });
//!     assert_eq!(handle.await.unwrap(), 42);
//! }
//! ```

// Async entry-point/test macros, so downstream crates never name Tokio.
pub use core_async_macros::{main, test};

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

pub use task::spawn;
pub use time::{sleep, Duration, Instant};
