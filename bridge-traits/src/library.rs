//! Media Library Abstraction
//!
//! The photo library is owned by the host platform (Photos on Apple
//! platforms, MediaStore on Android, a directory index on desktop). The core
//! only ever sees it through [`MediaLibrary`]: paged, creation-date ordered
//! reads, on-demand thumbnails, batch deletion, a single named collection for
//! saved items, and a change feed.

use async_trait::async_trait;
use bytes::Bytes;
use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Host authorization state for library access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet.
    #[default]
    NotDetermined,
    /// Full access.
    Authorized,
    /// Access to a user-selected subset of the library.
    Limited,
    /// The user refused access.
    Denied,
    /// Access is blocked by policy (parental controls, MDM).
    Restricted,
}

impl AuthorizationStatus {
    /// Whether library reads are allowed in this state.
    pub fn is_authorized(&self) -> bool {
        matches!(self, Self::Authorized | Self::Limited)
    }

    /// Whether prompting the user could still change the outcome.
    pub fn can_prompt(&self) -> bool {
        matches!(self, Self::NotDetermined)
    }
}

/// Broad media type reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssetMediaType {
    Image,
    Video,
    Audio,
    #[default]
    Unknown,
}

/// A library asset as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryAsset {
    /// Host-assigned identifier, stable across launches.
    pub id: String,
    /// Creation timestamp (Unix seconds). Some hosts omit it for imported media.
    pub created_at: Option<i64>,
    /// Byte size hint, when cheaply available.
    pub byte_size: Option<u64>,
    pub media_type: AssetMediaType,
}

impl LibraryAsset {
    pub fn new(id: impl Into<String>, created_at: Option<i64>) -> Self {
        Self {
            id: id.into(),
            created_at,
            byte_size: None,
            media_type: AssetMediaType::Image,
        }
    }

    pub fn with_byte_size(mut self, byte_size: u64) -> Self {
        self.byte_size = Some(byte_size);
        self
    }

    pub fn with_media_type(mut self, media_type: AssetMediaType) -> Self {
        self.media_type = media_type;
        self
    }
}

/// A user-visible named collection (album).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryCollection {
    pub id: String,
    pub title: String,
    pub asset_count: usize,
}

/// Rendering tier for a thumbnail request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThumbnailQuality {
    /// Fast, possibly degraded rendition.
    Fast,
    /// Full-quality rendition at the requested size.
    High,
}

/// Target size and tier of a thumbnail request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRequest {
    pub width: u32,
    pub height: u32,
    pub quality: ThumbnailQuality,
}

impl ThumbnailRequest {
    pub fn square(size: u32, quality: ThumbnailQuality) -> Self {
        Self {
            width: size,
            height: size,
            quality,
        }
    }
}

/// A batch of changes observed in the library.
///
/// Hosts coalesce platform notifications into batches. An empty batch means
/// "something changed, details unknown".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryChange {
    pub inserted: Vec<String>,
    pub removed: Vec<String>,
    pub updated: Vec<String>,
}

impl LibraryChange {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.removed.len() + self.updated.len()
    }
}

/// Media library trait
///
/// Every listing call returns assets in creation-date descending order
/// (newest first). Paging is by offset into that ordering.
///
/// # Cancellation
///
/// `request_thumbnail` and `delete_assets` return [`BridgeError::Cancelled`]
/// when the host cancels the request or the user declines a confirmation
/// dialog. Callers treat it as "no result" and never as a hard failure.
///
/// [`BridgeError::Cancelled`]: crate::error::BridgeError::Cancelled
///
/// # Example
///
/// ```ignore
/// use bridge_traits::library::MediaLibrary;
///
/// async fn newest(library: &dyn MediaLibrary) -> Result<Vec<LibraryAsset>> {
///     if !library.authorization_status().await?.is_authorized() {
///         return Ok(Vec::new());
///     }
///     library.fetch_recent(300).await
/// }
/// ```
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Current authorization state. Never prompts.
    async fn authorization_status(&self) -> Result<AuthorizationStatus>;

    /// Prompt the user for access and return the resulting state.
    async fn request_authorization(&self) -> Result<AuthorizationStatus>;

    /// Total number of assets visible to the app.
    async fn asset_count(&self) -> Result<usize>;

    /// The `limit` most recently created assets.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<LibraryAsset>>;

    /// A page of the full creation-descending listing.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<LibraryAsset>>;

    /// Resolve identifiers to assets. Identifiers that no longer exist are
    /// silently omitted.
    async fn fetch_assets_by_id(&self, ids: &[String]) -> Result<Vec<LibraryAsset>>;

    /// Collections whose title matches exactly.
    async fn fetch_collections(&self, title: &str) -> Result<Vec<LibraryCollection>>;

    /// Assets contained in a collection.
    async fn fetch_collection_assets(&self, collection_id: &str) -> Result<Vec<LibraryAsset>>;

    /// Render a thumbnail for an asset.
    async fn request_thumbnail(&self, asset_id: &str, request: ThumbnailRequest) -> Result<Bytes>;

    /// Permanently delete assets. Hosts may show a confirmation dialog.
    async fn delete_assets(&self, ids: &[String]) -> Result<()>;

    /// Create a collection and return it.
    async fn create_collection(&self, title: &str) -> Result<LibraryCollection>;

    async fn add_to_collection(&self, collection_id: &str, ids: &[String]) -> Result<()>;

    async fn remove_from_collection(&self, collection_id: &str, ids: &[String]) -> Result<()>;

    /// Subscribe to library change batches.
    fn subscribe_changes(&self) -> broadcast::Receiver<LibraryChange>;
}
