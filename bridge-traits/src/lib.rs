//! # Host Bridge Traits
//!
//! Capabilities the photo-sweep core needs from its host platform.
//!
//! ## Overview
//!
//! The core never touches the photo library, the file system or the wall
//! clock directly. Each of those is a trait defined here and implemented per
//! platform (desktop shims in `bridge-desktop`, native adapters on mobile).
//!
//! ## Traits
//!
//! - [`MediaLibrary`](library::MediaLibrary) - Photo library reads, thumbnails, deletion, collections, change feed
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Application-private file I/O with atomic replace
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! let library = config.media_library
//!     .ok_or_else(|| Error::CapabilityMissing {
//!         capability: "MediaLibrary".to_string(),
//!         message: "No media library adapter provided.".to_string(),
//!     })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Hosts should map
//! user cancellations (declined deletion dialogs, cancelled image requests)
//! to `BridgeError::Cancelled` so the core can tell them apart from failures.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod library;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use library::{
    AssetMediaType, AuthorizationStatus, LibraryAsset, LibraryChange, LibraryCollection,
    MediaLibrary, ThumbnailQuality, ThumbnailRequest,
};
pub use storage::FileSystemAccess;
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
