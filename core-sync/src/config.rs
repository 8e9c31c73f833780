//! Tuning for loading, refresh throttling and thumbnails.

use core_runtime::Error as RuntimeError;
use core_thumbnails::ThumbnailConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sync manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Number of most recent items grouped and published by the quick phase
    pub quick_batch_size: usize,

    /// Page size of the full scan; the loader yields after every page
    pub chunk_size: usize,

    /// Minimum spacing between non-forced refreshes
    pub refresh_throttle: Duration,

    /// Title of the host collection backing the "Saved" group
    pub saved_collection_title: String,

    /// Edge length of preview thumbnails rebuilt for marked items, in pixels
    pub preview_thumbnail_size: u32,

    /// Number of top groups whose covers are fetched after each load
    pub warm_limit: usize,

    pub thumbnails: ThumbnailConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            quick_batch_size: 300,
            chunk_size: 500,
            refresh_throttle: Duration::from_secs(2),
            saved_collection_title: "Saved".to_string(),
            preview_thumbnail_size: 240,
            warm_limit: 12,
            thumbnails: ThumbnailConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Validate sizes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if:
    /// - Any batch, page or thumbnail size is zero
    /// - The quick batch is larger than ten full-scan pages
    /// - The saved collection title is blank
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.quick_batch_size == 0 {
            return Err(RuntimeError::Config("quick_batch_size must be greater than 0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(RuntimeError::Config("chunk_size must be greater than 0".to_string()));
        }
        if self.quick_batch_size > self.chunk_size.saturating_mul(10) {
            return Err(RuntimeError::Config(format!(
                "quick_batch_size ({}) must not exceed 10 x chunk_size ({})",
                self.quick_batch_size, self.chunk_size
            )));
        }
        if self.preview_thumbnail_size == 0
            || self.thumbnails.fast_size == 0
            || self.thumbnails.high_size == 0
        {
            return Err(RuntimeError::Config("thumbnail sizes must be greater than 0".to_string()));
        }
        if self.thumbnails.capacity == 0 {
            return Err(RuntimeError::Config("thumbnail capacity must be greater than 0".to_string()));
        }
        if self.saved_collection_title.trim().is_empty() {
            return Err(RuntimeError::Config("saved_collection_title must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.quick_batch_size, 300);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.refresh_throttle, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = SyncConfig {
            chunk_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SyncConfig {
            quick_batch_size: 0,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = SyncConfig::default();
        config.thumbnails.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_quick_batch_rejected() {
        let config = SyncConfig {
            quick_batch_size: 5001,
            chunk_size: 500,
            ..SyncConfig::default()
        };
        assert!(matches!(config.validate(), Err(RuntimeError::Config(_))));
    }

    #[test]
    fn test_blank_collection_title_rejected() {
        let config = SyncConfig {
            saved_collection_title: "  ".to_string(),
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
