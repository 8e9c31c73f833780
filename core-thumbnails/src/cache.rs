//! Two-tier thumbnail cache keyed by group identity
//!
//! Each group shows one cover image: the thumbnail of its representative
//! item. Covers are fetched in two tiers. A fast, possibly degraded rendition
//! is cached as soon as it arrives and then replaced by the full-quality
//! rendition.
//!
//! ## Usage
//!
//! ```ignore
//! use core_thumbnails::{ThumbnailCache, ThumbnailConfig};
//!
//! let cache = ThumbnailCache::new(library, ThumbnailConfig::default());
//!
//! // Render path: never blocks.
//! if let Some(cover) = cache.get_cached(&group) {
//!     draw(cover.data);
//! }
//!
//! // Background path: joins an in-flight load for the same group.
//! let cover = cache.fetch(&group).await;
//! ```

use bridge_traits::library::{MediaLibrary, ThumbnailQuality, ThumbnailRequest};
use bytes::Bytes;
use core_library::models::{Group, GroupId, ItemId};
use futures::future::{self, BoxFuture, FutureExt, Shared};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Sizes and capacity of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailConfig {
    /// Edge length of the fast tier, in pixels.
    pub fast_size: u32,
    /// Edge length of the full-quality tier, in pixels.
    pub high_size: u32,
    /// Maximum number of cached covers.
    pub capacity: usize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            fast_size: 120,
            high_size: 480,
            capacity: 256,
        }
    }
}

impl ThumbnailConfig {
    fn request(&self, quality: ThumbnailQuality) -> ThumbnailRequest {
        match quality {
            ThumbnailQuality::Fast => ThumbnailRequest::square(self.fast_size, quality),
            ThumbnailQuality::High => ThumbnailRequest::square(self.high_size, quality),
        }
    }
}

/// A rendered cover for one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// Item the cover was rendered from.
    pub item_id: ItemId,
    pub data: Bytes,
    pub quality: ThumbnailQuality,
}

type SharedLoad = Shared<BoxFuture<'static, Option<Thumbnail>>>;

struct InFlight {
    generation: u64,
    item_id: ItemId,
    load: SharedLoad,
}

/// State shared between the cache handle and its in-flight loads.
struct Inner {
    library: Arc<dyn MediaLibrary>,
    config: ThumbnailConfig,
    entries: Mutex<LruCache<GroupId, Thumbnail>>,
    in_flight: Mutex<HashMap<GroupId, InFlight>>,
}

impl Inner {
    fn is_current(&self, group_id: &GroupId, generation: u64) -> bool {
        self.in_flight
            .lock()
            .get(group_id)
            .is_some_and(|flight| flight.generation == generation)
    }

    fn cached_for(&self, group_id: &GroupId, item_id: &ItemId) -> Option<Thumbnail> {
        self.entries
            .lock()
            .peek(group_id)
            .filter(|thumb| &thumb.item_id == item_id)
            .cloned()
    }

    /// Store a result unless the load was superseded or invalidated.
    fn store(&self, group_id: &GroupId, generation: u64, thumbnail: Thumbnail) {
        let in_flight = self.in_flight.lock();
        if in_flight.get(group_id).map(|f| f.generation) != Some(generation) {
            debug!(group = %group_id, "Dropping superseded thumbnail");
            return;
        }
        self.entries.lock().put(group_id.clone(), thumbnail);
    }

    fn release(&self, group_id: &GroupId, generation: u64) {
        let mut in_flight = self.in_flight.lock();
        if in_flight.get(group_id).map(|f| f.generation) == Some(generation) {
            in_flight.remove(group_id);
        }
    }

    async fn request(&self, item_id: &ItemId, quality: ThumbnailQuality) -> Option<Bytes> {
        match self
            .library
            .request_thumbnail(item_id.as_str(), self.config.request(quality))
            .await
        {
            Ok(data) => Some(data),
            Err(e) if e.is_cancelled() => {
                debug!(item = %item_id, ?quality, "Thumbnail request cancelled");
                None
            }
            Err(e) => {
                debug!(item = %item_id, ?quality, error = %e, "Thumbnail request failed");
                None
            }
        }
    }

    async fn load(
        self: Arc<Self>,
        group_id: GroupId,
        item_id: ItemId,
        generation: u64,
    ) -> Option<Thumbnail> {
        let mut best = self.cached_for(&group_id, &item_id);

        if best.is_none() {
            if let Some(data) = self.request(&item_id, ThumbnailQuality::Fast).await {
                let fast = Thumbnail {
                    item_id: item_id.clone(),
                    data,
                    quality: ThumbnailQuality::Fast,
                };
                self.store(&group_id, generation, fast.clone());
                best = Some(fast);
            }
        }

        if self.is_current(&group_id, generation) {
            if let Some(data) = self.request(&item_id, ThumbnailQuality::High).await {
                let high = Thumbnail {
                    item_id: item_id.clone(),
                    data,
                    quality: ThumbnailQuality::High,
                };
                self.store(&group_id, generation, high.clone());
                best = Some(high);
            }
        }

        self.release(&group_id, generation);
        best
    }
}

/// Cover cache with a synchronous lookup path and at most one in-flight
/// load per group.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<Inner>,
    next_generation: Arc<AtomicU64>,
}

impl ThumbnailCache {
    pub fn new(library: Arc<dyn MediaLibrary>, config: ThumbnailConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Inner {
                library,
                config,
                entries: Mutex::new(LruCache::new(capacity)),
                in_flight: Mutex::new(HashMap::new()),
            }),
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &ThumbnailConfig {
        &self.inner.config
    }

    /// Cached cover for the group's current representative. No I/O.
    pub fn get_cached(&self, group: &Group) -> Option<Thumbnail> {
        let representative = group.representative()?;
        self.inner
            .entries
            .lock()
            .get(group.id())
            .filter(|thumb| thumb.item_id == representative.id)
            .cloned()
    }

    /// Best available cover for the group.
    ///
    /// Returns the cached full-quality cover when there is one. Otherwise
    /// joins the group's in-flight load, or starts one. Returns `None` when
    /// the group is empty or no tier could be rendered; a later call retries.
    pub async fn fetch(&self, group: &Group) -> Option<Thumbnail> {
        let representative = group.representative()?;
        let group_id = group.id().clone();
        let item_id = representative.id.clone();

        if let Some(cached) = self.inner.cached_for(&group_id, &item_id) {
            if cached.quality == ThumbnailQuality::High {
                return Some(cached);
            }
        }

        let load = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&group_id) {
                Some(flight) if flight.item_id == item_id => flight.load.clone(),
                _ => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let load = Arc::clone(&self.inner)
                        .load(group_id.clone(), item_id.clone(), generation)
                        .boxed()
                        .shared();
                    in_flight.insert(
                        group_id,
                        InFlight {
                            generation,
                            item_id,
                            load: load.clone(),
                        },
                    );
                    load
                }
            }
        };

        load.await
    }

    /// Fetch covers for the first `limit` groups concurrently.
    ///
    /// Returns how many of those groups have a cover afterwards.
    pub async fn warm(&self, groups: &[Group], limit: usize) -> usize {
        let loads = groups.iter().take(limit).map(|group| self.fetch(group));
        let results = future::join_all(loads).await;
        let warmed = results.iter().filter(|thumb| thumb.is_some()).count();
        debug!(requested = limit.min(groups.len()), warmed, "Warmed thumbnails");
        warmed
    }

    /// Forget the cover for a group and detach any in-flight load, whose
    /// result will not be cached.
    pub fn invalidate(&self, group_id: &GroupId) {
        self.inner.in_flight.lock().remove(group_id);
        self.inner.entries.lock().pop(group_id);
    }

    pub fn clear(&self) {
        self.inner.in_flight.lock().clear();
        self.inner.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.lock().is_empty()
    }

    /// Number of groups with a load in progress.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().len()
    }
}
