//! Published library state
//!
//! [`LibraryContent`] is the single owner of everything the manager mutates:
//! loaded items, the saved collection, the mark set and previews. It lives
//! behind one async mutex. Every change is followed by a publish of a fully
//! built [`LibrarySnapshot`] while the lock is still held, so readers never
//! see a half-applied change and publishes happen in mutation order.

use bridge_traits::library::AuthorizationStatus;
use core_async::sync::{watch, Mutex, MutexGuard};
use core_library::grouping::{build_index, system_group};
use core_library::models::{
    Group, GroupId, ItemId, MediaItem, PreviewEntry, SystemGroup, YearGroup,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Consumer view of the library. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    pub authorization: AuthorizationStatus,
    /// Month groups newest first, followed by the non-empty system groups.
    pub groups: Arc<Vec<Group>>,
    pub years: Arc<Vec<YearGroup>>,
    pub marked: Arc<HashSet<ItemId>>,
    /// Previews in the order items were marked.
    pub previews: Arc<Vec<PreviewEntry>>,
    /// The quick phase (or a full load) has published groups.
    pub initial_data_ready: bool,
    /// A full scan is running.
    pub background_loading: bool,
    /// The last full scan finished and its result is published.
    pub load_complete: bool,
    /// Load that produced `groups`.
    pub generation: u64,
}

impl LibrarySnapshot {
    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|group| group.id() == id)
    }

    pub fn month_groups(&self) -> impl Iterator<Item = &Group> + '_ {
        self.groups.iter().filter(|group| !group.is_system())
    }

    pub fn system_group(&self, kind: SystemGroup) -> Option<&Group> {
        self.group(&GroupId::for_system(kind))
    }

    /// Items across month groups.
    pub fn item_count(&self) -> usize {
        self.month_groups().map(Group::len).sum()
    }
}

/// Mutable library state. Only reachable through [`SharedState::lock`].
#[derive(Debug, Default)]
pub struct LibraryContent {
    pub authorization: AuthorizationStatus,
    /// Items of the last published load, creation-date descending.
    pub items: Arc<Vec<MediaItem>>,
    pub saved: Vec<MediaItem>,
    pub saved_collection_id: Option<String>,
    pub marked: HashSet<ItemId>,
    /// Persisted preview identifiers; always a subset of `marked`.
    pub preview_ids: HashSet<ItemId>,
    pub previews: Vec<PreviewEntry>,
    pub initial_data_ready: bool,
    pub background_loading: bool,
    pub load_complete: bool,
    pub generation: u64,
    groups: Arc<Vec<Group>>,
    years: Arc<Vec<YearGroup>>,
    /// Requested last-viewed index per group, reapplied on every regroup.
    last_viewed: HashMap<GroupId, usize>,
}

impl LibraryContent {
    pub fn new(marked: HashSet<ItemId>, preview_ids: HashSet<ItemId>) -> Self {
        Self {
            marked,
            preview_ids,
            ..Self::default()
        }
    }

    /// Rebuild groups from the current items, saved items and marks.
    pub fn regroup(&mut self) {
        let index = build_index(&self.items, &self.marked);

        let mut groups = index.groups;
        let pending = system_group(
            SystemGroup::PendingDeletion,
            self.items
                .iter()
                .filter(|item| self.marked.contains(&item.id))
                .cloned(),
        );
        if !pending.is_empty() {
            groups.push(pending);
        }
        let saved = system_group(SystemGroup::Saved, self.saved.iter().cloned());
        if !saved.is_empty() {
            groups.push(saved);
        }

        let mut years = index.years;
        for group in groups
            .iter_mut()
            .chain(years.iter_mut().flat_map(|year| year.groups.iter_mut()))
        {
            if let Some(&viewed) = self.last_viewed.get(group.id()) {
                group.set_last_viewed_index(viewed);
            }
        }

        self.groups = Arc::new(groups);
        self.years = Arc::new(years);
    }

    /// Remember the last-viewed index of a group. The index is clamped to
    /// the group's size each time groups are rebuilt. Returns `false` if no
    /// such group is published.
    pub fn set_last_viewed_index(&mut self, id: &GroupId, index: usize) -> bool {
        if !self.groups.iter().any(|group| group.id() == id) {
            return false;
        }
        self.last_viewed.insert(id.clone(), index);

        let groups = Arc::make_mut(&mut self.groups);
        let years = Arc::make_mut(&mut self.years);
        for group in groups
            .iter_mut()
            .chain(years.iter_mut().flat_map(|year| year.groups.iter_mut()))
            .filter(|group| group.id() == id)
        {
            group.set_last_viewed_index(index);
        }
        true
    }

    pub fn groups(&self) -> &Arc<Vec<Group>> {
        &self.groups
    }

    pub fn find_item(&self, id: &ItemId) -> Option<&MediaItem> {
        self.items
            .iter()
            .chain(self.saved.iter())
            .find(|item| &item.id == id)
    }

    /// Drop identifiers from the marks, the preview ids and the previews.
    /// Returns the identifiers that were present in any of them.
    pub fn forget(&mut self, ids: &[ItemId]) -> Vec<ItemId> {
        let mut removed = Vec::new();
        for id in ids {
            let was_marked = self.marked.remove(id);
            let had_preview = self.preview_ids.remove(id);
            if was_marked || had_preview {
                removed.push(id.clone());
            }
        }
        if !removed.is_empty() {
            self.previews.retain(|entry| !removed.contains(&entry.item_id));
        }
        removed
    }

    /// Insert or replace the preview for a marked item.
    pub fn upsert_preview(&mut self, entry: PreviewEntry) {
        self.preview_ids.insert(entry.item_id.clone());
        match self
            .previews
            .iter_mut()
            .find(|existing| existing.item_id == entry.item_id)
        {
            Some(existing) => *existing = entry,
            None => self.previews.push(entry),
        }
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        LibrarySnapshot {
            authorization: self.authorization,
            groups: Arc::clone(&self.groups),
            years: Arc::clone(&self.years),
            marked: Arc::new(self.marked.clone()),
            previews: Arc::new(self.previews.clone()),
            initial_data_ready: self.initial_data_ready,
            background_loading: self.background_loading,
            load_complete: self.load_complete,
            generation: self.generation,
        }
    }
}

/// Library content plus the watch channel it is published on.
pub struct SharedState {
    content: Mutex<LibraryContent>,
    published: watch::Sender<LibrarySnapshot>,
}

impl SharedState {
    pub fn new(content: LibraryContent) -> Self {
        let (published, _) = watch::channel(content.snapshot());
        Self {
            content: Mutex::new(content),
            published,
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, LibraryContent> {
        self.content.lock().await
    }

    /// Publish the content. Call while holding the lock.
    pub fn publish(&self, content: &LibraryContent) {
        self.published.send_replace(content.snapshot());
    }

    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        self.published.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, month: u32) -> MediaItem {
        MediaItem::new(id, Utc.with_ymd_and_hms(2024, month, 1, 0, 0, 0).single())
    }

    fn content_with(items: Vec<MediaItem>) -> LibraryContent {
        let mut content = LibraryContent::default();
        content.items = Arc::new(items);
        content
    }

    #[test]
    fn test_regroup_moves_marked_items_to_pending_group() {
        let mut content = content_with(vec![item("A", 2), item("B", 2), item("C", 1)]);
        content.marked.insert(ItemId::from("B"));
        content.regroup();

        let snapshot = content.snapshot();
        let february = snapshot.group(&GroupId::for_month(2024, 2)).unwrap();
        assert_eq!(february.item_ids(), &[ItemId::from("A")]);

        let pending = snapshot.system_group(SystemGroup::PendingDeletion).unwrap();
        assert_eq!(pending.item_ids(), &[ItemId::from("B")]);
        assert_eq!(snapshot.item_count(), 2);
    }

    #[test]
    fn test_empty_system_groups_are_omitted() {
        let mut content = content_with(vec![item("A", 3)]);
        content.regroup();

        let snapshot = content.snapshot();
        assert_eq!(snapshot.groups.len(), 1);
        assert!(snapshot.system_group(SystemGroup::Saved).is_none());
    }

    #[test]
    fn test_saved_group_follows_month_groups() {
        let mut content = content_with(vec![item("A", 3)]);
        content.saved = vec![item("A", 3)];
        content.regroup();

        let snapshot = content.snapshot();
        assert_eq!(snapshot.groups.len(), 2);
        assert!(snapshot.groups[1].is_system());
        assert_eq!(snapshot.groups[1].title(), "Saved");
    }

    #[test]
    fn test_forget_prunes_marks_and_previews() {
        let mut content = LibraryContent::new(
            [ItemId::from("A"), ItemId::from("B")].into_iter().collect(),
            HashSet::new(),
        );
        content.upsert_preview(PreviewEntry {
            item_id: ItemId::from("A"),
            thumbnail: bytes::Bytes::from_static(b"a"),
            byte_size: 10,
        });

        let removed = content.forget(&[ItemId::from("A"), ItemId::from("Z")]);

        assert_eq!(removed, vec![ItemId::from("A")]);
        assert!(!content.marked.contains(&ItemId::from("A")));
        assert!(content.marked.contains(&ItemId::from("B")));
        assert!(content.previews.is_empty());
        assert!(content.preview_ids.is_empty());
    }

    #[test]
    fn test_upsert_preview_replaces_existing_entry() {
        let mut content = LibraryContent::default();
        for size in [1, 2] {
            content.upsert_preview(PreviewEntry {
                item_id: ItemId::from("A"),
                thumbnail: bytes::Bytes::new(),
                byte_size: size,
            });
        }

        assert_eq!(content.previews.len(), 1);
        assert_eq!(content.previews[0].byte_size, 2);
    }

    #[test]
    fn test_last_viewed_index_survives_regroup() {
        let mut content = content_with(vec![item("A", 2), item("B", 2), item("C", 2)]);
        content.regroup();
        let february = GroupId::for_month(2024, 2);

        assert!(content.set_last_viewed_index(&february, 2));
        assert!(!content.set_last_viewed_index(&GroupId::for_month(2023, 1), 1));

        content.items = Arc::new(vec![item("A", 2), item("B", 2), item("C", 2), item("D", 2)]);
        content.regroup();
        let snapshot = content.snapshot();
        assert_eq!(snapshot.group(&february).unwrap().last_viewed_index(), 2);
        assert_eq!(snapshot.years[0].groups[0].last_viewed_index(), 2);

        // Clamped when the group shrinks, restored when it grows back.
        content.marked.insert(ItemId::from("C"));
        content.marked.insert(ItemId::from("D"));
        content.regroup();
        assert_eq!(content.snapshot().group(&february).unwrap().last_viewed_index(), 1);

        content.marked.clear();
        content.regroup();
        assert_eq!(content.snapshot().group(&february).unwrap().last_viewed_index(), 2);
    }

    #[core_async::test]
    async fn test_publish_is_visible_to_subscribers() {
        let state = SharedState::new(LibraryContent::default());
        let mut rx = state.subscribe();

        {
            let mut content = state.lock().await;
            content.items = Arc::new(vec![item("A", 5)]);
            content.initial_data_ready = true;
            content.regroup();
            state.publish(&content);
        }

        rx.changed().await.unwrap();
        let snapshot = rx.borrow().clone();
        assert!(snapshot.initial_data_ready);
        assert_eq!(snapshot.groups.len(), 1);
        assert_eq!(state.snapshot().item_count(), 1);
    }
}
