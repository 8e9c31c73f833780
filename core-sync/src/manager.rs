//! # Sync Manager
//!
//! Owns the library state, the persisted deletion sets, the loader and the
//! thumbnail cache, and exposes the operations a UI drives.
//!
//! ## Overview
//!
//! - Authorization: `request_authorization` prompts only when the user has
//!   not been asked; `check_status` never prompts.
//! - Loading: one load at a time. A refresh requested while a load runs is
//!   queued once; further requests fold into the queued one. Non-forced
//!   refreshes are throttled; a forced refresh always runs and restarts the
//!   throttle window.
//! - Deletion state: marks and previews change only under the state lock,
//!   are republished immediately, and are persisted through one writer per
//!   set.
//! - Library mutations (delete, save, restore) are counted while their host
//!   call runs and until the reload they schedule has finished, so the
//!   change notification they cause does not trigger a second reload.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncManager};
//!
//! let manager = SyncManager::new(&core_config, SyncConfig::default()).await?;
//! manager.start().await?;
//!
//! let mut snapshots = manager.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     render(&snapshots.borrow());
//! }
//! ```

use crate::config::SyncConfig;
use crate::error::Result;
use crate::loader::{emit_status, LoadOutcome, LoadPlan, ProgressiveLoader};
use crate::phase::LoadPhase;
use crate::state::{LibraryContent, LibrarySnapshot, SharedState};
use crate::throttle::RefreshThrottle;
use bridge_traits::library::{
    AuthorizationStatus, LibraryChange, MediaLibrary, ThumbnailQuality, ThumbnailRequest,
};
use bytes::Bytes;
use core_async::sync::{broadcast, watch, CancellationToken, Mutex};
use core_async::task::{self, JoinHandle};
use core_library::models::{GroupId, ItemId, MediaItem, PreviewEntry, SystemGroup};
use core_library::persistence::{PersistedSetKind, PersistedSetStore, SetWriter};
use core_runtime::config::{CoreConfig, FeatureFlags};
use core_runtime::events::{CoreEvent, DeletionEvent, EventBus, LibraryEvent};
use core_thumbnails::ThumbnailCache;
use futures::future::{self, Either};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// What happened to a refresh request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// A load started.
    Started,
    /// A load is running; one rerun will follow it.
    Queued,
    /// A rerun was already queued; this request folded into it.
    Coalesced,
    /// Inside the throttle window.
    Throttled,
    /// Library access is not granted.
    NotAuthorized,
}

impl RefreshOutcome {
    /// Whether a load will run because of this request.
    pub fn is_scheduled(&self) -> bool {
        matches!(
            self,
            RefreshOutcome::Started | RefreshOutcome::Queued | RefreshOutcome::Coalesced
        )
    }
}

#[derive(Debug, Default)]
struct LoadSlot {
    running: bool,
    pending: Option<LoadPlan>,
    /// Own mutations whose reload is scheduled. Cleared when the slot goes
    /// idle.
    settling: usize,
}

struct ChangeListener {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SyncManager {
    config: Arc<SyncConfig>,
    features: FeatureFlags,
    library: Arc<dyn MediaLibrary>,
    event_bus: EventBus,
    state: Arc<SharedState>,
    loader: Arc<ProgressiveLoader>,
    thumbnails: ThumbnailCache,
    marks_writer: Arc<SetWriter>,
    previews_writer: Arc<SetWriter>,
    throttle: Arc<Mutex<RefreshThrottle>>,
    load_slot: Arc<Mutex<LoadSlot>>,
    generation: Arc<AtomicU64>,
    /// Own mutations whose host call is in flight.
    own_mutations: Arc<AtomicUsize>,
    idle: Arc<watch::Sender<bool>>,
    listener: Arc<Mutex<Option<ChangeListener>>>,
}

impl SyncManager {
    /// Create a manager and load the persisted deletion state.
    ///
    /// Must be called from within a runtime: the persistence writers are
    /// spawned here. No library access happens until [`start`](Self::start),
    /// [`check_status`](Self::check_status) or
    /// [`request_authorization`](Self::request_authorization) is called.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid or the data
    /// directory cannot be resolved.
    #[instrument(skip_all)]
    pub async fn new(core: &CoreConfig, config: SyncConfig) -> Result<Self> {
        core.validate()?;
        config.validate()?;

        let fs = Arc::clone(&core.file_system);
        let data_dir = match &core.data_dir {
            Some(dir) => dir.clone(),
            None => fs.get_data_directory().await?,
        };

        let marks_store =
            PersistedSetStore::new(Arc::clone(&fs), &data_dir, PersistedSetKind::DeletionMarks);
        let previews_store = PersistedSetStore::new(fs, &data_dir, PersistedSetKind::PreviewIds);

        let marked = marks_store.load().await;
        let mut preview_ids = previews_store.load().await;
        let stored_previews = preview_ids.len();
        preview_ids.retain(|id| marked.contains(id));

        let marks_writer = SetWriter::spawn(marks_store);
        let previews_writer = SetWriter::spawn(previews_store);
        if preview_ids.len() != stored_previews {
            debug!(
                dropped = stored_previews - preview_ids.len(),
                "Dropping preview ids without a mark"
            );
            previews_writer.submit(preview_ids.clone());
        }

        info!(
            marked = marked.len(),
            previews = preview_ids.len(),
            "Loaded deletion state"
        );

        let config = Arc::new(config);
        let library = Arc::clone(&core.media_library);
        let event_bus = EventBus::new(core.event_buffer_size);
        let state = Arc::new(SharedState::new(LibraryContent::new(marked, preview_ids)));
        let loader = Arc::new(ProgressiveLoader::new(
            Arc::clone(&library),
            Arc::clone(&config),
            event_bus.clone(),
            Arc::clone(&state),
        ));
        let thumbnails = ThumbnailCache::new(Arc::clone(&library), config.thumbnails);
        let throttle = RefreshThrottle::new(Arc::clone(&core.clock), config.refresh_throttle);
        let (idle, _) = watch::channel(true);

        Ok(Self {
            config,
            features: core.features,
            library,
            event_bus,
            state,
            loader,
            thumbnails,
            marks_writer: Arc::new(marks_writer),
            previews_writer: Arc::new(previews_writer),
            throttle: Arc::new(Mutex::new(throttle)),
            load_slot: Arc::new(Mutex::new(LoadSlot::default())),
            generation: Arc::new(AtomicU64::new(0)),
            own_mutations: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(idle),
            listener: Arc::new(Mutex::new(None)),
        })
    }

    /// Clone for background tasks (shares all state)
    fn clone_for_task(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            features: self.features,
            library: Arc::clone(&self.library),
            event_bus: self.event_bus.clone(),
            state: Arc::clone(&self.state),
            loader: Arc::clone(&self.loader),
            thumbnails: self.thumbnails.clone(),
            marks_writer: Arc::clone(&self.marks_writer),
            previews_writer: Arc::clone(&self.previews_writer),
            throttle: Arc::clone(&self.throttle),
            load_slot: Arc::clone(&self.load_slot),
            generation: Arc::clone(&self.generation),
            own_mutations: Arc::clone(&self.own_mutations),
            idle: Arc::clone(&self.idle),
            listener: Arc::clone(&self.listener),
        }
    }

    /// Start the change listener and preview restore as configured, then
    /// check authorization and load if access is granted. Never prompts.
    pub async fn start(&self) -> Result<AuthorizationStatus> {
        if self.features.enable_change_listener {
            self.start_change_listener().await;
        }

        let status = self.check_status().await?;

        if self.features.enable_preview_restore && status.is_authorized() {
            let manager = self.clone_for_task();
            task::spawn(async move {
                manager.restore_previews().await;
            });
        }

        Ok(status)
    }

    // ------------------------------------------------------------------
    // Authorization
    // ------------------------------------------------------------------

    /// Ask for library access if the user has not been asked yet, then
    /// load if access is granted.
    #[instrument(skip(self))]
    pub async fn request_authorization(&self) -> Result<AuthorizationStatus> {
        let mut status = self.library.authorization_status().await?;
        if status.can_prompt() {
            info!("Requesting library access");
            status = self.library.request_authorization().await?;
        }

        self.update_authorization(status).await;
        self.load_if_authorized(status).await;
        Ok(status)
    }

    /// Re-read the authorization status without prompting, and load when
    /// authorized.
    #[instrument(skip(self))]
    pub async fn check_status(&self) -> Result<AuthorizationStatus> {
        let status = self.library.authorization_status().await?;
        self.update_authorization(status).await;
        self.load_if_authorized(status).await;
        Ok(status)
    }

    /// The initial load if nothing is published yet, otherwise a throttled
    /// refresh.
    async fn load_if_authorized(&self, status: AuthorizationStatus) {
        if !status.is_authorized() {
            return;
        }
        let outcome = if self.state.snapshot().initial_data_ready {
            self.refresh(false).await
        } else {
            self.start_initial_load().await
        };
        debug!(?outcome, "Load after authorization check");
    }

    async fn update_authorization(&self, status: AuthorizationStatus) {
        let mut content = self.state.lock().await;
        if content.authorization == status {
            return;
        }
        content.authorization = status;
        self.state.publish(&content);
        drop(content);

        debug!(?status, "Authorization status changed");
        emit_status(&self.event_bus, status);
    }

    // ------------------------------------------------------------------
    // Loading
    // ------------------------------------------------------------------

    /// Reload the library.
    ///
    /// Non-forced calls inside the throttle window are rejected. A call made
    /// while a load runs schedules one rerun after it.
    #[instrument(skip(self))]
    pub async fn refresh(&self, force: bool) -> RefreshOutcome {
        self.refresh_with(force, false).await
    }

    async fn refresh_with(&self, force: bool, own_mutation: bool) -> RefreshOutcome {
        if !self.state.snapshot().authorization.is_authorized() {
            debug!("Refresh skipped, library access not granted");
            return RefreshOutcome::NotAuthorized;
        }

        if !self.throttle.lock().await.try_acquire(force) {
            debug!("Refresh throttled");
            return RefreshOutcome::Throttled;
        }

        self.start_load(LoadPlan::refresh(force), own_mutation).await
    }

    async fn start_initial_load(&self) -> RefreshOutcome {
        self.throttle.lock().await.try_acquire(true);
        self.start_load(LoadPlan::initial(), false).await
    }

    async fn start_load(&self, plan: LoadPlan, own_mutation: bool) -> RefreshOutcome {
        let mut slot = self.load_slot.lock().await;
        if own_mutation {
            slot.settling += 1;
        }

        if slot.running {
            // The running load publishes first results; a rerun never needs
            // the quick phase.
            return match slot.pending.as_mut() {
                Some(pending) => {
                    pending.forced |= plan.forced;
                    RefreshOutcome::Coalesced
                }
                None => {
                    slot.pending = Some(LoadPlan {
                        quick: false,
                        ..plan
                    });
                    RefreshOutcome::Queued
                }
            };
        }

        slot.running = true;
        self.idle.send_replace(false);
        drop(slot);

        let manager = self.clone_for_task();
        task::spawn(async move {
            manager.run_loads(plan).await;
        });

        RefreshOutcome::Started
    }

    /// Run loads until no rerun is queued.
    async fn run_loads(&self, mut plan: LoadPlan) {
        loop {
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            let outcome = self.loader.run(generation, plan).await;
            self.after_load(outcome).await;

            let mut slot = self.load_slot.lock().await;
            match slot.pending.take() {
                Some(next) => plan = next,
                None => {
                    slot.running = false;
                    slot.settling = 0;
                    self.idle.send_replace(true);
                    return;
                }
            }
        }
    }

    async fn after_load(&self, outcome: LoadOutcome) {
        match outcome {
            LoadOutcome::NotAuthorized(status) => {
                debug!(?status, "Load halted");
            }
            LoadOutcome::Completed { missing_marks, .. } => {
                if !missing_marks.is_empty() {
                    self.reconcile_unseen_marks(&missing_marks).await;
                }

                let limit = self.config.warm_limit;
                if limit > 0 {
                    let groups = self.state.snapshot().groups;
                    let thumbnails = self.thumbnails.clone();
                    task::spawn(async move {
                        thumbnails.warm(&groups, limit).await;
                    });
                }
            }
        }
    }

    /// Purge marks a complete scan did not see, once the library confirms
    /// they are gone. A page that shifted during the scan can hide a live
    /// item.
    async fn reconcile_unseen_marks(&self, unseen: &[ItemId]) {
        let found = match self.library.fetch_assets_by_id(&to_strings(unseen)).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(error = %e, "Failed to confirm unseen marks");
                return;
            }
        };

        let found: HashSet<&str> = found.iter().map(|asset| asset.id.as_str()).collect();
        let missing: Vec<ItemId> = unseen
            .iter()
            .filter(|id| !found.contains(id.as_str()))
            .cloned()
            .collect();
        debug!(
            unseen = unseen.len(),
            missing = missing.len(),
            "Confirmed unseen marks"
        );
        if !missing.is_empty() {
            info!(count = missing.len(), "Marked items no longer in library");
            self.reconcile_invalid_identifiers(&missing).await;
        }
    }

    /// Resolve once no load is running or queued.
    pub async fn wait_for_idle(&self) {
        let mut idle = self.idle.subscribe();
        idle.wait_for(|idle| *idle).await.ok();
    }

    pub fn is_loading(&self) -> bool {
        !*self.idle.borrow()
    }

    pub fn load_phase(&self) -> LoadPhase {
        self.loader.phase()
    }

    // ------------------------------------------------------------------
    // Deletion marks
    // ------------------------------------------------------------------

    pub async fn mark_for_deletion(&self, id: &ItemId) -> usize {
        self.mark_many(std::slice::from_ref(id)).await
    }

    /// Mark an item and store the thumbnail and size shown in the review
    /// list. An already marked item gets its preview replaced.
    #[instrument(skip(self, thumbnail))]
    pub async fn mark_for_deletion_with_preview(
        &self,
        id: &ItemId,
        thumbnail: Bytes,
        byte_size: u64,
    ) -> usize {
        let mut content = self.state.lock().await;
        let inserted = content.marked.insert(id.clone());
        content.upsert_preview(PreviewEntry {
            item_id: id.clone(),
            thumbnail,
            byte_size,
        });
        if inserted {
            content.regroup();
            self.marks_writer.submit(content.marked.clone());
        }
        self.previews_writer.submit(content.preview_ids.clone());
        self.state.publish(&content);
        let total_marked = content.marked.len();
        drop(content);

        if inserted {
            self.event_bus
                .emit(CoreEvent::Deletion(DeletionEvent::Marked {
                    item_ids: vec![id.to_string()],
                    total_marked,
                }))
                .ok();
        }
        usize::from(inserted)
    }

    /// Add items to the pending-deletion set. Returns how many were not
    /// already marked.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn mark_many(&self, ids: &[ItemId]) -> usize {
        let mut content = self.state.lock().await;
        let changed: Vec<ItemId> = ids
            .iter()
            .filter(|id| content.marked.insert((*id).clone()))
            .cloned()
            .collect();
        if changed.is_empty() {
            return 0;
        }

        content.regroup();
        self.marks_writer.submit(content.marked.clone());
        self.state.publish(&content);
        let total_marked = content.marked.len();
        drop(content);

        debug!(changed = changed.len(), total_marked, "Marked for deletion");
        self.event_bus
            .emit(CoreEvent::Deletion(DeletionEvent::Marked {
                item_ids: to_strings(&changed),
                total_marked,
            }))
            .ok();
        changed.len()
    }

    pub async fn unmark_for_deletion(&self, id: &ItemId) -> usize {
        self.unmark_many(std::slice::from_ref(id)).await
    }

    /// Remove items from the pending-deletion set along with their previews.
    /// Returns how many were marked.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn unmark_many(&self, ids: &[ItemId]) -> usize {
        let mut content = self.state.lock().await;
        let removed = content.forget(ids);
        if removed.is_empty() {
            return 0;
        }

        content.regroup();
        self.marks_writer.submit(content.marked.clone());
        self.previews_writer.submit(content.preview_ids.clone());
        self.state.publish(&content);
        let total_marked = content.marked.len();
        drop(content);

        debug!(changed = removed.len(), total_marked, "Unmarked");
        self.event_bus
            .emit(CoreEvent::Deletion(DeletionEvent::Unmarked {
                item_ids: to_strings(&removed),
                total_marked,
            }))
            .ok();
        removed.len()
    }

    /// Purge identifiers that no longer exist from both persisted sets and
    /// the previews. Returns how many were purged.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn reconcile_invalid_identifiers(&self, ids: &[ItemId]) -> usize {
        let mut content = self.state.lock().await;
        let removed = content.forget(ids);
        if removed.is_empty() {
            return 0;
        }

        content.regroup();
        self.marks_writer.submit(content.marked.clone());
        self.previews_writer.submit(content.preview_ids.clone());
        self.state.publish(&content);
        drop(content);

        info!(count = removed.len(), "Purged stale identifiers");
        self.event_bus
            .emit(CoreEvent::Deletion(DeletionEvent::Reconciled {
                item_ids: to_strings(&removed),
            }))
            .ok();
        removed.len()
    }

    /// Rebuild previews for persisted preview ids that have none in memory.
    ///
    /// Identifiers the library no longer resolves are reconciled away.
    /// Returns how many previews were rebuilt.
    #[instrument(skip(self))]
    pub async fn restore_previews(&self) -> usize {
        let pending: Vec<ItemId> = {
            let content = self.state.lock().await;
            let present: HashSet<&ItemId> =
                content.previews.iter().map(|entry| &entry.item_id).collect();
            let mut pending: Vec<ItemId> = content
                .preview_ids
                .iter()
                .filter(|id| !present.contains(id))
                .cloned()
                .collect();
            pending.sort();
            pending
        };
        if pending.is_empty() {
            return 0;
        }

        let assets = match self.library.fetch_assets_by_id(&to_strings(&pending)).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(error = %e, "Failed to resolve preview identifiers");
                return 0;
            }
        };

        let missing: Vec<ItemId> = {
            let found: HashSet<&str> = assets.iter().map(|asset| asset.id.as_str()).collect();
            pending
                .iter()
                .filter(|id| !found.contains(id.as_str()))
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            self.reconcile_invalid_identifiers(&missing).await;
        }

        let request =
            ThumbnailRequest::square(self.config.preview_thumbnail_size, ThumbnailQuality::Fast);
        let mut restored = 0;

        for asset in &assets {
            let thumbnail = match self.library.request_thumbnail(&asset.id, request).await {
                Ok(thumbnail) => thumbnail,
                Err(e) => {
                    debug!(item = %asset.id, error = %e, "Preview thumbnail unavailable");
                    continue;
                }
            };

            let item_id = ItemId::new(asset.id.clone());
            let mut content = self.state.lock().await;
            // Unmarked, or re-marked with a fresh preview, while rendering.
            if !content.marked.contains(&item_id)
                || content.previews.iter().any(|entry| entry.item_id == item_id)
            {
                continue;
            }
            content.upsert_preview(PreviewEntry {
                item_id,
                thumbnail,
                byte_size: asset.byte_size.unwrap_or(0),
            });
            self.state.publish(&content);
            restored += 1;
        }

        debug!(restored, "Restored previews");
        restored
    }

    // ------------------------------------------------------------------
    // Library mutations
    // ------------------------------------------------------------------

    /// Permanently delete items from the library.
    ///
    /// On success the items leave the marks, the previews and the published
    /// groups, and a forced refresh follows. On failure or when the user
    /// declines, nothing changes and `false` is returned.
    #[instrument(skip(self), fields(count = ids.len()))]
    pub async fn hard_delete(&self, ids: &[ItemId]) -> bool {
        if ids.is_empty() {
            return true;
        }

        let raw = to_strings(ids);
        self.begin_own_mutation();

        if let Err(e) = self.library.delete_assets(&raw).await {
            self.end_own_mutation(false).await;
            let cancelled = e.is_cancelled();
            if cancelled {
                info!("Deletion declined");
            } else {
                error!(error = %e, "Deletion failed");
            }
            self.event_bus
                .emit(CoreEvent::Deletion(DeletionEvent::DeleteFailed {
                    item_count: ids.len(),
                    cancelled,
                    message: e.to_string(),
                }))
                .ok();
            return false;
        }

        {
            let mut content = self.state.lock().await;
            content.forget(ids);

            let deleted: HashSet<&ItemId> = ids.iter().collect();
            let remaining: Vec<MediaItem> = content
                .items
                .iter()
                .filter(|item| !deleted.contains(&item.id))
                .cloned()
                .collect();
            content.items = Arc::new(remaining);
            content.saved.retain(|item| !deleted.contains(&item.id));

            content.regroup();
            self.marks_writer.submit(content.marked.clone());
            self.previews_writer.submit(content.preview_ids.clone());
            self.state.publish(&content);
        }

        info!(count = ids.len(), "Deleted items");
        self.event_bus
            .emit(CoreEvent::Deletion(DeletionEvent::Deleted { item_ids: raw }))
            .ok();

        self.end_own_mutation(true).await;
        true
    }

    /// Delete every marked item.
    pub async fn delete_all_marked(&self) -> bool {
        let ids = self.marked_ids();
        self.hard_delete(&ids).await
    }

    /// Add an item to the saved collection, creating the collection on first
    /// use. Returns `false` if it is already saved or the host call fails.
    #[instrument(skip(self))]
    pub async fn bookmark(&self, id: &ItemId) -> bool {
        self.begin_own_mutation();

        match self.add_to_saved(id).await {
            Ok(true) => {
                self.event_bus
                    .emit(CoreEvent::Library(LibraryEvent::Bookmarked {
                        item_id: id.to_string(),
                    }))
                    .ok();
                self.end_own_mutation(true).await;
                true
            }
            Ok(false) => {
                debug!("Already saved");
                self.end_own_mutation(false).await;
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to save item");
                self.end_own_mutation(false).await;
                false
            }
        }
    }

    /// Remove an item from the saved collection. Returns `false` if it was
    /// not saved or the host call fails.
    #[instrument(skip(self))]
    pub async fn unbookmark(&self, id: &ItemId) -> bool {
        self.begin_own_mutation();

        match self.remove_from_saved(id).await {
            Ok(true) => {
                self.event_bus
                    .emit(CoreEvent::Library(LibraryEvent::Unbookmarked {
                        item_id: id.to_string(),
                    }))
                    .ok();
                self.end_own_mutation(true).await;
                true
            }
            Ok(false) => {
                self.end_own_mutation(false).await;
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to unsave item");
                self.end_own_mutation(false).await;
                false
            }
        }
    }

    /// Move an item out of a system group into `to_group`.
    ///
    /// The item is unmarked. Restoring to the saved group adds it to the
    /// saved collection unless it is already there; restoring to a month
    /// group takes it out of the saved collection. Returns `false` for an
    /// unknown destination or a failed host call, leaving marks untouched.
    #[instrument(skip(self))]
    pub async fn restore(&self, id: &ItemId, to_group: &GroupId) -> bool {
        let to_saved = match (to_group.system(), to_group.month()) {
            (Some(SystemGroup::Saved), _) => true,
            (None, Some(_)) => false,
            _ => {
                warn!(group = %to_group, "Unknown restore destination");
                return false;
            }
        };

        self.begin_own_mutation();
        let result = if to_saved {
            self.add_to_saved(id).await
        } else {
            self.remove_from_saved(id).await
        };

        let collection_changed = match result {
            Ok(changed) => changed,
            Err(e) => {
                warn!(error = %e, "Restore failed");
                self.end_own_mutation(false).await;
                return false;
            }
        };

        self.unmark_for_deletion(id).await;
        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::Restored {
                item_id: id.to_string(),
                group_id: to_group.to_string(),
            }))
            .ok();

        self.end_own_mutation(collection_changed).await;
        true
    }

    async fn saved_collection_id(&self, create: bool) -> Result<Option<String>> {
        if let Some(id) = self.state.lock().await.saved_collection_id.clone() {
            return Ok(Some(id));
        }

        let title = &self.config.saved_collection_title;
        let existing = self.library.fetch_collections(title).await?.into_iter().next();
        let collection = match existing {
            Some(collection) => Some(collection),
            None if create => {
                info!(title = %title, "Creating saved collection");
                Some(self.library.create_collection(title).await?)
            }
            None => None,
        };

        let id = collection.map(|collection| collection.id);
        if let Some(id) = &id {
            self.state.lock().await.saved_collection_id = Some(id.clone());
        }
        Ok(id)
    }

    async fn collection_contains(&self, collection_id: &str, id: &ItemId) -> Result<bool> {
        let assets = self.library.fetch_collection_assets(collection_id).await?;
        Ok(assets.iter().any(|asset| asset.id == id.as_str()))
    }

    /// Returns `false` when the item is already in the collection.
    async fn add_to_saved(&self, id: &ItemId) -> Result<bool> {
        let Some(collection_id) = self.saved_collection_id(true).await? else {
            return Ok(false);
        };
        if self.collection_contains(&collection_id, id).await? {
            return Ok(false);
        }

        self.library
            .add_to_collection(&collection_id, &[id.to_string()])
            .await?;

        let known = self.state.lock().await.find_item(id).cloned();
        let item = match known {
            Some(item) => Some(item),
            None => self
                .library
                .fetch_assets_by_id(&[id.to_string()])
                .await?
                .first()
                .map(MediaItem::from_asset),
        };

        if let Some(item) = item {
            let mut content = self.state.lock().await;
            if !content.saved.iter().any(|saved| saved.id == item.id) {
                content.saved.push(item);
                content.regroup();
                self.state.publish(&content);
            }
        }
        Ok(true)
    }

    /// Returns `false` when the item is not in the collection.
    async fn remove_from_saved(&self, id: &ItemId) -> Result<bool> {
        let Some(collection_id) = self.saved_collection_id(false).await? else {
            return Ok(false);
        };
        if !self.collection_contains(&collection_id, id).await? {
            return Ok(false);
        }

        self.library
            .remove_from_collection(&collection_id, &[id.to_string()])
            .await?;

        let mut content = self.state.lock().await;
        content.saved.retain(|saved| &saved.id != id);
        content.regroup();
        self.state.publish(&content);
        Ok(true)
    }

    fn begin_own_mutation(&self) {
        self.own_mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Finish a mutation of our own, optionally with a forced reload.
    ///
    /// The reload is counted in the load slot before the in-flight count
    /// drops, so changes stay suppressed until that reload goes idle.
    async fn end_own_mutation(&self, reload: bool) {
        if reload {
            let outcome = self.refresh_with(true, true).await;
            debug!(?outcome, "Reload after own mutation");
        }
        self.own_mutations.fetch_sub(1, Ordering::SeqCst);
    }

    async fn is_own_mutation_pending(&self) -> bool {
        self.own_mutations.load(Ordering::SeqCst) > 0 || self.load_slot.lock().await.settling > 0
    }

    // ------------------------------------------------------------------
    // Change notifications
    // ------------------------------------------------------------------

    /// Start reacting to library change notifications. No-op if already
    /// listening.
    pub async fn start_change_listener(&self) {
        let mut listener = self.listener.lock().await;
        if listener.is_some() {
            return;
        }

        let token = CancellationToken::new();
        let receiver = self.library.subscribe_changes();
        let manager = self.clone_for_task();
        let cancelled = token.clone();
        let handle = task::spawn(async move {
            manager.listen(receiver, cancelled).await;
        });

        *listener = Some(ChangeListener { token, handle });
        debug!("Change listener started");
    }

    async fn listen(
        &self,
        mut receiver: broadcast::Receiver<LibraryChange>,
        token: CancellationToken,
    ) {
        loop {
            let received = {
                let cancelled = token.cancelled();
                let next = receiver.recv();
                futures::pin_mut!(cancelled, next);
                match future::select(cancelled, next).await {
                    Either::Left(_) => break,
                    Either::Right((received, _)) => received,
                }
            };

            match received {
                Ok(change) => self.handle_change(change).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Change listener lagged");
                    self.handle_change(LibraryChange::default()).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Change feed closed");
                    break;
                }
            }
        }
        debug!("Change listener stopped");
    }

    async fn handle_change(&self, change: LibraryChange) {
        if self.is_own_mutation_pending().await {
            debug!(changes = change.len(), "Ignoring change caused by own mutation");
            return;
        }

        self.event_bus
            .emit(CoreEvent::Library(LibraryEvent::ExternalChange {
                change_count: change.len(),
            }))
            .ok();

        if !change.removed.is_empty() {
            let removed: Vec<ItemId> = change.removed.iter().cloned().map(ItemId::from).collect();
            self.reconcile_invalid_identifiers(&removed).await;
        }

        let outcome = self.refresh(false).await;
        debug!(?outcome, "Refresh after external change");
    }

    /// Stop the change listener and wait for pending writes.
    pub async fn shutdown(&self) {
        let listener = self.listener.lock().await.take();
        if let Some(listener) = listener {
            listener.token.cancel();
            if let Err(e) = listener.handle.await {
                warn!(error = %e, "Change listener task failed");
            }
        }

        if let Err(e) = self.flush().await {
            warn!(error = %e, "Failed to flush deletion state");
        }
        info!("Sync manager shut down");
    }

    /// Wait until every submitted mark and preview snapshot is on disk.
    pub async fn flush(&self) -> Result<()> {
        self.marks_writer.flush().await?;
        self.previews_writer.flush().await?;
        Ok(())
    }

    /// Record where the user stopped in a group. The index survives reloads
    /// and picks the group's representative thumbnail.
    pub async fn set_last_viewed_index(&self, group: &GroupId, index: usize) -> bool {
        let mut content = self.state.lock().await;
        if !content.set_last_viewed_index(group, index) {
            debug!(group = %group, "Unknown group for last viewed index");
            return false;
        }
        self.state.publish(&content);
        true
    }

    // ------------------------------------------------------------------
    // Read-only state
    // ------------------------------------------------------------------

    pub fn subscribe(&self) -> watch::Receiver<LibrarySnapshot> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> LibrarySnapshot {
        self.state.snapshot()
    }

    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.state.snapshot().authorization
    }

    pub fn is_marked(&self, id: &ItemId) -> bool {
        self.state.snapshot().marked.contains(id)
    }

    /// Marked identifiers, sorted.
    pub fn marked_ids(&self) -> Vec<ItemId> {
        let mut ids: Vec<ItemId> = self.state.snapshot().marked.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn previews(&self) -> Arc<Vec<PreviewEntry>> {
        self.state.snapshot().previews
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }
}

fn to_strings(ids: &[ItemId]) -> Vec<String> {
    ids.iter().map(|id| id.as_str().to_string()).collect()
}
