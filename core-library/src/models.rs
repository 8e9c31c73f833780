//! Domain models for the grouped library index
//!
//! Items come from the host library; groups and year groups are derived from
//! them on every load and never persisted.

use bridge_traits::library::{AssetMediaType, LibraryAsset};
use bytes::Bytes;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

// =============================================================================
// ID Types
// =============================================================================

/// Host-assigned identifier of a library item, stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for ItemId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Identity of a group.
///
/// Derived from the bucket key (`month-2024-01`, `system-saved`) rather than
/// generated, so a rebuilt index yields the same identity for the same bucket
/// and cached thumbnails survive a refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    pub fn for_month(year: i32, month: u32) -> Self {
        Self(format!("month-{:04}-{:02}", year, month))
    }

    pub fn for_system(kind: SystemGroup) -> Self {
        Self(format!("system-{}", kind.key()))
    }

    /// Parse a persisted or externally supplied key.
    pub fn from_key(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `(year, month)` for month group ids.
    pub fn month(&self) -> Option<(i32, u32)> {
        let rest = self.0.strip_prefix("month-")?;
        let (year, month) = rest.rsplit_once('-')?;
        let year = year.parse().ok()?;
        let month = month.parse().ok()?;
        (1..=12).contains(&month).then_some((year, month))
    }

    pub fn system(&self) -> Option<SystemGroup> {
        match self.0.strip_prefix("system-")? {
            "pending-deletion" => Some(SystemGroup::PendingDeletion),
            "saved" => Some(SystemGroup::Saved),
            _ => None,
        }
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Items
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    #[default]
    Unknown,
}

impl From<AssetMediaType> for MediaKind {
    fn from(value: AssetMediaType) -> Self {
        match value {
            AssetMediaType::Image => MediaKind::Image,
            AssetMediaType::Video => MediaKind::Video,
            AssetMediaType::Audio => MediaKind::Audio,
            AssetMediaType::Unknown => MediaKind::Unknown,
        }
    }
}

/// A library item as the core sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub id: ItemId,
    /// Creation time. Items without one are never placed in a month group.
    pub created_at: Option<DateTime<Utc>>,
    pub byte_size_hint: Option<u64>,
    pub kind: MediaKind,
}

impl MediaItem {
    pub fn new(id: impl Into<ItemId>, created_at: Option<DateTime<Utc>>) -> Self {
        Self {
            id: id.into(),
            created_at,
            byte_size_hint: None,
            kind: MediaKind::Image,
        }
    }

    pub fn with_byte_size(mut self, bytes: u64) -> Self {
        self.byte_size_hint = Some(bytes);
        self
    }

    pub fn from_asset(asset: &LibraryAsset) -> Self {
        Self {
            id: ItemId::new(asset.id.clone()),
            created_at: asset
                .created_at
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
            byte_size_hint: asset.byte_size,
            kind: asset.media_type.into(),
        }
    }

    /// `(year, month)` of the creation time in UTC.
    pub fn month_key(&self) -> Option<(i32, u32)> {
        self.created_at.map(|at| (at.year(), at.month()))
    }
}

// =============================================================================
// Groups
// =============================================================================

/// Named groups that are not month buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemGroup {
    /// Items currently marked for deletion.
    PendingDeletion,
    /// Items in the saved collection.
    Saved,
}

impl SystemGroup {
    pub fn key(&self) -> &'static str {
        match self {
            SystemGroup::PendingDeletion => "pending-deletion",
            SystemGroup::Saved => "saved",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            SystemGroup::PendingDeletion => "Pending Deletion",
            SystemGroup::Saved => "Saved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GroupKind {
    Month { year: i32, month: u32 },
    System { group: SystemGroup },
}

/// An ordered bucket of items.
///
/// The ordered identifier list and the identifier-to-item map always hold
/// exactly the same identifiers; both are private and only change through
/// [`Group::insert`] and [`Group::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    id: GroupId,
    title: String,
    kind: GroupKind,
    item_ids: Vec<ItemId>,
    items: HashMap<ItemId, MediaItem>,
    last_viewed_index: usize,
}

impl Group {
    /// An empty month group. Returns `None` for an invalid month.
    pub fn month(year: i32, month: u32) -> Option<Self> {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self {
            id: GroupId::for_month(year, month),
            title: first_day.format("%B %Y").to_string(),
            kind: GroupKind::Month { year, month },
            item_ids: Vec::new(),
            items: HashMap::new(),
            last_viewed_index: 0,
        })
    }

    pub fn system(group: SystemGroup) -> Self {
        Self {
            id: GroupId::for_system(group),
            title: group.title().to_string(),
            kind: GroupKind::System { group },
            item_ids: Vec::new(),
            items: HashMap::new(),
            last_viewed_index: 0,
        }
    }

    pub fn id(&self) -> &GroupId {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn is_system(&self) -> bool {
        matches!(self.kind, GroupKind::System { .. })
    }

    /// First day of the month for month groups.
    pub fn month_date(&self) -> Option<NaiveDate> {
        match self.kind {
            GroupKind::Month { year, month } => NaiveDate::from_ymd_opt(year, month, 1),
            GroupKind::System { .. } => None,
        }
    }

    pub fn year(&self) -> Option<i32> {
        match self.kind {
            GroupKind::Month { year, .. } => Some(year),
            GroupKind::System { .. } => None,
        }
    }

    pub fn len(&self) -> usize {
        self.item_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.item_ids.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.items.contains_key(id)
    }

    pub fn item_ids(&self) -> &[ItemId] {
        &self.item_ids
    }

    pub fn get(&self, id: &ItemId) -> Option<&MediaItem> {
        self.items.get(id)
    }

    /// Items in group order.
    pub fn items(&self) -> impl Iterator<Item = &MediaItem> + '_ {
        self.item_ids.iter().filter_map(|id| self.items.get(id))
    }

    /// Append an item. Returns `false` if the identifier is already present.
    pub fn insert(&mut self, item: MediaItem) -> bool {
        if self.items.contains_key(&item.id) {
            return false;
        }
        self.item_ids.push(item.id.clone());
        self.items.insert(item.id.clone(), item);
        true
    }

    pub fn remove(&mut self, id: &ItemId) -> Option<MediaItem> {
        let item = self.items.remove(id)?;
        self.item_ids.retain(|existing| existing != id);
        if self.last_viewed_index >= self.item_ids.len() {
            self.last_viewed_index = self.item_ids.len().saturating_sub(1);
        }
        Some(item)
    }

    pub fn last_viewed_index(&self) -> usize {
        self.last_viewed_index
    }

    /// Clamped to the last valid position.
    pub fn set_last_viewed_index(&mut self, index: usize) {
        self.last_viewed_index = index.min(self.item_ids.len().saturating_sub(1));
    }

    /// The item shown as the group's cover.
    pub fn representative(&self) -> Option<&MediaItem> {
        self.item_ids
            .get(self.last_viewed_index)
            .or_else(|| self.item_ids.first())
            .and_then(|id| self.items.get(id))
    }

    /// Sum of known byte sizes.
    pub fn total_byte_size(&self) -> u64 {
        self.items.values().filter_map(|item| item.byte_size_hint).sum()
    }
}

/// Month groups of one calendar year, newest month first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearGroup {
    pub year: i32,
    pub groups: Vec<Group>,
}

impl YearGroup {
    pub fn item_count(&self) -> usize {
        self.groups.iter().map(Group::len).sum()
    }
}

/// Thumbnail and size captured when an item was marked for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewEntry {
    pub item_id: ItemId,
    pub thumbnail: Bytes,
    pub byte_size: u64,
}

// =============================================================================
// Tests
// =============================================================================
