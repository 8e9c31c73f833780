//! Synchronization primitives.
//!
//! All primitives are async-aware and `Send + Sync`; holding a `Mutex` guard
//! across an `.await` does not block the executor thread.
//!
//! ```rust
//! use core_async::sync::{watch, Mutex};
//!
//! async fn example() {
//!     let marks = Mutex::new(Vec::<String>::new());
//!     marks.lock().await.push("A".to_string());
//!
//!     let (tx, rx) = watch::channel(0u64);
//!     tx.send(1).unwrap();
//!     assert_eq!(*rx.borrow(), 1);
//! }
//! ```

pub use tokio::sync::{
    broadcast, mpsc, oneshot, watch, Barrier, Mutex, MutexGuard, Notify, RwLock, RwLockReadGuard,
    RwLockWriteGuard, Semaphore, SemaphorePermit,
};

pub use tokio_util::sync::CancellationToken;
