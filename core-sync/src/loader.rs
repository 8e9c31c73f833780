//! # Progressive Loader
//!
//! Builds the grouped index in up to three phases.
//!
//! ## Workflow
//!
//! 1. **Authorization**: read the host status without prompting. Anything
//!    other than authorized or limited halts the load.
//! 2. **Quick** (initial load only): group the most recent
//!    `quick_batch_size` items and publish them, so the first screen renders
//!    before the full scan starts.
//! 3. **Full**: page through the whole library `chunk_size` items at a time,
//!    yielding between pages. A failed page is skipped and the load is marked
//!    partial. The saved collection is read, everything is grouped once, and
//!    the result replaces the published index in a single publish.
//!
//! A complete (non-partial) scan under full authorization also reports marked
//! identifiers that no longer exist in the library.

use crate::config::SyncConfig;
use crate::phase::LoadPhase;
use crate::state::SharedState;
use bridge_traits::library::{AuthorizationStatus, LibraryAsset, MediaLibrary};
use core_async::sync::watch;
use core_async::task;
use core_async::time::Instant;
use core_library::models::{ItemId, MediaItem};
use core_runtime::events::{AuthorizationEvent, CoreEvent, EventBus, LoadingEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What a load should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadPlan {
    /// Run the quick phase before the full scan.
    pub quick: bool,
    /// The load bypassed the refresh throttle.
    pub forced: bool,
}

impl LoadPlan {
    pub fn initial() -> Self {
        Self {
            quick: true,
            forced: true,
        }
    }

    pub fn refresh(forced: bool) -> Self {
        Self {
            quick: false,
            forced,
        }
    }
}

/// Result of one load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Access is not granted; nothing was fetched.
    NotAuthorized(AuthorizationStatus),
    Completed {
        generation: u64,
        item_count: usize,
        group_count: usize,
        /// At least one page failed.
        partial: bool,
        /// Marked identifiers not seen by a complete scan. Candidates only:
        /// offset paging can skip a live item.
        missing_marks: Vec<ItemId>,
    },
}

pub struct ProgressiveLoader {
    library: Arc<dyn MediaLibrary>,
    config: Arc<SyncConfig>,
    event_bus: EventBus,
    state: Arc<SharedState>,
    phase: watch::Sender<LoadPhase>,
}

impl ProgressiveLoader {
    pub fn new(
        library: Arc<dyn MediaLibrary>,
        config: Arc<SyncConfig>,
        event_bus: EventBus,
        state: Arc<SharedState>,
    ) -> Self {
        let (phase, _) = watch::channel(LoadPhase::Idle);
        Self {
            library,
            config,
            event_bus,
            state,
            phase,
        }
    }

    pub fn phase(&self) -> LoadPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<LoadPhase> {
        self.phase.subscribe()
    }

    fn enter(&self, to: LoadPhase) {
        let current = self.phase();
        match current.advance(to) {
            Ok(next) => {
                self.phase.send_replace(next);
            }
            Err(e) => {
                // Only reachable if two loads overlap, which the manager prevents.
                warn!(error = %e, "Unexpected load phase transition");
                self.phase.send_replace(to);
            }
        }
    }

    /// Run one load. Must not be called concurrently.
    #[instrument(skip(self))]
    pub async fn run(&self, generation: u64, plan: LoadPlan) -> LoadOutcome {
        let started = Instant::now();
        self.enter(LoadPhase::Authorizing);

        let status = self.check_authorization().await;
        if !status.is_authorized() {
            info!(?status, "Library access not granted, load halted");
            self.enter(LoadPhase::Halted);
            return LoadOutcome::NotAuthorized(status);
        }

        self.event_bus
            .emit(CoreEvent::Loading(LoadingEvent::Started {
                generation,
                forced: plan.forced,
            }))
            .ok();

        if plan.quick {
            self.enter(LoadPhase::Quick);
            self.quick_phase(generation).await;
        }

        self.enter(LoadPhase::Full);
        let outcome = self.full_phase(generation, status).await;
        self.enter(LoadPhase::Complete);

        if let LoadOutcome::Completed {
            item_count,
            group_count,
            partial,
            ..
        } = &outcome
        {
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(item_count, group_count, partial, duration_ms, "Library load completed");
            self.event_bus
                .emit(CoreEvent::Loading(LoadingEvent::Completed {
                    generation,
                    item_count: *item_count,
                    group_count: *group_count,
                    partial: *partial,
                    duration_ms,
                }))
                .ok();
        }

        outcome
    }

    /// Read the host status and publish it. Never prompts.
    async fn check_authorization(&self) -> AuthorizationStatus {
        let status = match self.library.authorization_status().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "Failed to read authorization status");
                AuthorizationStatus::NotDetermined
            }
        };

        let mut content = self.state.lock().await;
        let changed = content.authorization != status;
        content.authorization = status;
        if !status.is_authorized() {
            content.background_loading = false;
        }
        self.state.publish(&content);
        drop(content);

        if changed {
            emit_status(&self.event_bus, status);
        }
        status
    }

    async fn quick_phase(&self, generation: u64) {
        let assets = match self.library.fetch_recent(self.config.quick_batch_size).await {
            Ok(assets) => assets,
            Err(e) => {
                warn!(error = %e, "Quick phase fetch failed, waiting for full scan");
                return;
            }
        };
        let items = to_items(&assets);
        let item_count = items.len();

        let group_count = {
            let mut content = self.state.lock().await;
            content.items = Arc::new(items);
            content.regroup();
            content.initial_data_ready = true;
            content.background_loading = true;
            content.load_complete = false;
            content.generation = generation;
            let count = content.groups().len();
            self.state.publish(&content);
            count
        };

        debug!(item_count, group_count, "Quick phase published");
        self.event_bus
            .emit(CoreEvent::Loading(LoadingEvent::InitialDataReady {
                generation,
                item_count,
                group_count,
            }))
            .ok();
    }

    async fn full_phase(&self, generation: u64, status: AuthorizationStatus) -> LoadOutcome {
        {
            let mut content = self.state.lock().await;
            if !content.background_loading {
                content.background_loading = true;
                self.state.publish(&content);
            }
        }

        let chunk_size = self.config.chunk_size;
        let total = match self.library.asset_count().await {
            Ok(total) => Some(total),
            Err(e) => {
                warn!(error = %e, "Asset count unavailable, paging until exhausted");
                None
            }
        };

        let mut items: Vec<MediaItem> = Vec::with_capacity(total.unwrap_or(0));
        let mut partial = false;
        let mut offset = 0;

        loop {
            if let Some(total) = total {
                if offset >= total {
                    break;
                }
            }

            match self.library.fetch_page(offset, chunk_size).await {
                Ok(page) => {
                    let fetched = page.len();
                    items.extend(page.iter().map(MediaItem::from_asset));
                    debug!(offset, fetched, loaded = items.len(), "Chunk processed");
                    self.event_bus
                        .emit(CoreEvent::Loading(LoadingEvent::ChunkProcessed {
                            generation,
                            loaded: items.len(),
                            total: total.unwrap_or(items.len()),
                        }))
                        .ok();
                    if total.is_none() && fetched < chunk_size {
                        break;
                    }
                }
                Err(e) => {
                    warn!(offset, error = %e, "Chunk fetch failed, skipping");
                    partial = true;
                    self.event_bus
                        .emit(CoreEvent::Loading(LoadingEvent::ChunkFailed {
                            generation,
                            offset,
                            message: e.to_string(),
                        }))
                        .ok();
                    if total.is_none() {
                        break;
                    }
                }
            }

            offset += chunk_size;
            task::yield_now().await;
        }

        let saved = self.fetch_saved().await;
        let seen: HashSet<&ItemId> = items.iter().map(|item| &item.id).collect();

        let mut content = self.state.lock().await;

        let missing_marks = if !partial && status == AuthorizationStatus::Authorized {
            let mut missing: Vec<ItemId> = content
                .marked
                .iter()
                .filter(|id| !seen.contains(id))
                .cloned()
                .collect();
            missing.sort();
            missing
        } else {
            Vec::new()
        };
        drop(seen);

        let item_count = items.len();
        content.items = Arc::new(items);
        if let Some((collection_id, saved)) = saved {
            content.saved_collection_id = collection_id;
            content.saved = saved;
        }
        content.regroup();
        content.initial_data_ready = true;
        content.background_loading = false;
        content.load_complete = true;
        content.generation = generation;
        let group_count = content.groups().len();
        self.state.publish(&content);
        drop(content);

        LoadOutcome::Completed {
            generation,
            item_count,
            group_count,
            partial,
            missing_marks,
        }
    }

    /// The saved collection's id and items. `None` keeps what was loaded
    /// before.
    async fn fetch_saved(&self) -> Option<(Option<String>, Vec<MediaItem>)> {
        let title = &self.config.saved_collection_title;
        let collections = match self.library.fetch_collections(title).await {
            Ok(collections) => collections,
            Err(e) => {
                warn!(error = %e, "Failed to look up saved collection");
                return None;
            }
        };

        let Some(collection) = collections.into_iter().next() else {
            return Some((None, Vec::new()));
        };

        match self.library.fetch_collection_assets(&collection.id).await {
            Ok(assets) => Some((Some(collection.id), to_items(&assets))),
            Err(e) => {
                warn!(error = %e, "Failed to read saved collection");
                None
            }
        }
    }
}

pub(crate) fn emit_status(event_bus: &EventBus, status: AuthorizationStatus) {
    event_bus
        .emit(CoreEvent::Authorization(AuthorizationEvent::StatusChanged {
            status: status_key(status).to_string(),
            authorized: status.is_authorized(),
        }))
        .ok();
}

fn status_key(status: AuthorizationStatus) -> &'static str {
    match status {
        AuthorizationStatus::NotDetermined => "not_determined",
        AuthorizationStatus::Authorized => "authorized",
        AuthorizationStatus::Limited => "limited",
        AuthorizationStatus::Denied => "denied",
        AuthorizationStatus::Restricted => "restricted",
    }
}

fn to_items(assets: &[LibraryAsset]) -> Vec<MediaItem> {
    assets.iter().map(MediaItem::from_asset).collect()
}
