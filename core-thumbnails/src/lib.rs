//! # Thumbnail Module
//!
//! Group cover thumbnails for the grouped library index.
//!
//! ## Overview
//!
//! - Two tiers per cover: a fast rendition first, full quality after
//! - Synchronous lookup for the render path ([`ThumbnailCache::get_cached`])
//! - One in-flight load per group, shared by every caller
//! - Bounded concurrent pre-warm of the top groups
//!
//! Covers are keyed by [`GroupId`](core_library::models::GroupId), which is
//! stable across rebuilds, so a refresh does not throw the cache away.

pub mod cache;

pub use bridge_traits::library::ThumbnailQuality;
pub use cache::{Thumbnail, ThumbnailCache, ThumbnailConfig};
