//! # Core Configuration Module
//!
//! Provides configuration management for the photo-sweep core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! holding every host bridge the core needs plus a few runtime settings. It
//! enforces fail-fast validation so a missing capability surfaces at startup
//! rather than in the middle of a library scan.
//!
//! ## Required Dependencies
//!
//! - `MediaLibrary` - The photo library adapter (no portable default exists)
//! - `FileSystemAccess` - Persisted working sets (desktop default: tokio fs)
//!
//! ## Optional Dependencies (with defaults)
//!
//! - `Clock` - Time source for refresh throttling (default: system clock)
//!
//! When the `desktop-shims` feature is enabled, a `TokioFileSystem` rooted at
//! `data_dir` (or the platform data directory) is injected automatically if no
//! file system is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .data_dir("/path/to/app-data")
//!     .media_library(Arc::new(MyPhotoLibrary::new()))
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! The builder returns `Error::CapabilityMissing` with an actionable message
//! when a required bridge is absent:
//!
//! ```ignore
//! let err = CoreConfig::builder().build().unwrap_err();
//! assert!(err.to_string().contains("MediaLibrary"));
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::{Clock, FileSystemAccess, MediaLibrary, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;

/// Upper bound for the event bus buffer.
const MAX_EVENT_BUFFER_SIZE: usize = 10_000;

/// Core configuration for the photo-sweep core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Directory holding the persisted working sets. When `None`, the file
    /// system bridge's data directory is used.
    pub data_dir: Option<PathBuf>,

    /// Photo library adapter (required)
    pub media_library: Arc<dyn MediaLibrary>,

    /// File system access abstraction (required, desktop default available)
    pub file_system: Arc<dyn FileSystemAccess>,

    /// Time source
    pub clock: Arc<dyn Clock>,

    /// Capacity of the core event bus
    pub event_buffer_size: usize,

    pub features: FeatureFlags,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("data_dir", &self.data_dir)
            .field("media_library", &"MediaLibrary { ... }")
            .field("file_system", &"FileSystemAccess { ... }")
            .field("clock", &"Clock { ... }")
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Start listening to library change notifications when the manager
    /// starts.
    pub enable_change_listener: bool,

    /// Rebuild preview thumbnails for persisted preview ids at startup.
    pub enable_preview_restore: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_change_listener: true,
            enable_preview_restore: true,
        }
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - The data directory, when set, is not empty
    /// - The event buffer size is within bounds
    pub fn validate(&self) -> Result<()> {
        if let Some(dir) = &self.data_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::Config("Data directory cannot be empty".to_string()));
            }
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size > MAX_EVENT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "Event buffer size exceeds maximum of {}",
                MAX_EVENT_BUFFER_SIZE
            )));
        }

        Ok(())
    }
}

fn media_library_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaLibrary".to_string(),
        message: "A MediaLibrary implementation is required to read the photo library. \
                 iOS/macOS: inject the Photos-backed adapter. \
                 Android: inject the MediaStore-backed adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system(data_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs = match data_dir {
        Some(dir) => TokioFileSystem::with_data_directory(dir.clone()),
        None => TokioFileSystem::new(),
    };
    Ok(Arc::new(fs))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system(_data_dir: Option<&PathBuf>) -> Result<Arc<dyn FileSystemAccess>> {
    Err(Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required to persist deletion marks. \
                 Desktop: enable the 'desktop-shims' feature to use the default TokioFileSystem. \
                 Mobile: inject a file system rooted in the app container."
            .to_string(),
    })
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    data_dir: Option<PathBuf>,
    media_library: Option<Arc<dyn MediaLibrary>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
    clock: Option<Arc<dyn Clock>>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl CoreConfigBuilder {
    /// Sets the directory for persisted working sets.
    ///
    /// ```
    /// use core_runtime::config::CoreConfig;
    ///
    /// let builder = CoreConfig::builder().data_dir("/path/to/app-data");
    /// ```
    pub fn data_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.data_dir = Some(path.into());
        self
    }

    /// Sets the photo library adapter (required).
    pub fn media_library(mut self, library: Arc<dyn MediaLibrary>) -> Self {
        self.media_library = Some(library);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the desktop default (tokio fs-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Sets the time source. Defaults to the system clock.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the event bus capacity.
    ///
    /// Default: 100 events
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn enable_change_listener(mut self, enabled: bool) -> Self {
        self.features.enable_change_listener = enabled;
        self
    }

    pub fn enable_preview_restore(mut self, enabled: bool) -> Self {
        self.features.enable_preview_restore = enabled;
        self
    }

    /// Sets all feature flags at once.
    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error if:
    /// - The media library bridge is missing
    /// - No file system bridge is available
    /// - Configuration values are invalid
    pub fn build(self) -> Result<CoreConfig> {
        let media_library = self.media_library.ok_or_else(media_library_missing_error)?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system(self.data_dir.as_ref())?,
        };

        let config = CoreConfig {
            data_dir: self.data_dir,
            media_library,
            file_system,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}
