//! Photo library cleanup core.
//!
//! Re-exports the workspace crates a host application needs: build a
//! [`CoreConfig`] with the host's [`MediaLibrary`] bridge, create a
//! [`SyncManager`], and drive it from the UI.
//!
//! ```rust,ignore
//! use photo_sweep::{CoreConfig, SyncConfig, SyncManager};
//!
//! let core = CoreConfig::builder()
//!     .media_library(host_library)
//!     .build()?;
//! let manager = SyncManager::new(&core, SyncConfig::default()).await?;
//! manager.start().await?;
//! ```
//!
//! The `desktop-shims` feature (on by default) supplies a filesystem bridge
//! when the host does not provide one.

pub use bridge_traits::{
    AuthorizationStatus, BridgeError, FileSystemAccess, LibraryAsset, LibraryChange,
    LibraryCollection, MediaLibrary, ThumbnailQuality, ThumbnailRequest,
};
pub use core_library::{Group, GroupId, ItemId, MediaItem, PreviewEntry, SystemGroup, YearGroup};
pub use core_runtime::logging::{init_logging, LoggingConfig};
pub use core_runtime::{CoreConfig, CoreConfigBuilder, CoreEvent, EventBus, FeatureFlags};
pub use core_sync::{
    LibrarySnapshot, LoadPhase, RefreshOutcome, SyncConfig, SyncError, SyncManager,
};
pub use core_thumbnails::{Thumbnail, ThumbnailCache, ThumbnailConfig};
