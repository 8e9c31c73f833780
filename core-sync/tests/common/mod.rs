//! In-memory photo library shared by the sync integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{
    AuthorizationStatus, LibraryAsset, LibraryChange, LibraryCollection, ManualClock,
    MediaLibrary, ThumbnailRequest,
};
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use core_async::sync::{broadcast, Semaphore};
use core_async::time::{timeout, Duration};
use core_runtime::config::{CoreConfig, FeatureFlags};
use core_runtime::events::CoreEvent;
use core_sync::{SyncConfig, SyncManager};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// How `delete_assets` answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehavior {
    Succeed,
    Fail,
    Decline,
}

struct FakeState {
    status: AuthorizationStatus,
    prompt_answer: AuthorizationStatus,
    /// Newest first.
    assets: Vec<LibraryAsset>,
    collections: Vec<(LibraryCollection, Vec<String>)>,
    delete_behavior: DeleteBehavior,
    failing_offsets: HashSet<usize>,
    /// Present in the library but skipped by `fetch_page`, as when pages
    /// shift during a scan.
    hidden_from_pages: HashSet<String>,
}

/// Scriptable [`MediaLibrary`] with call counters.
pub struct FakeLibrary {
    state: Mutex<FakeState>,
    changes: broadcast::Sender<LibraryChange>,
    gated: AtomicBool,
    gate: Semaphore,
    collections_gated: AtomicBool,
    collection_gate: Semaphore,
    pub prompts: AtomicUsize,
    pub loads: AtomicUsize,
    pub recent_fetches: AtomicUsize,
    pub collection_adds: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl FakeLibrary {
    pub fn new(status: AuthorizationStatus) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(FakeState {
                status,
                prompt_answer: AuthorizationStatus::Authorized,
                assets: Vec::new(),
                collections: Vec::new(),
                delete_behavior: DeleteBehavior::Succeed,
                failing_offsets: HashSet::new(),
                hidden_from_pages: HashSet::new(),
            }),
            changes,
            gated: AtomicBool::new(false),
            gate: Semaphore::new(0),
            collections_gated: AtomicBool::new(false),
            collection_gate: Semaphore::new(0),
            prompts: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
            recent_fetches: AtomicUsize::new(0),
            collection_adds: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn authorized() -> Self {
        Self::new(AuthorizationStatus::Authorized)
    }

    pub fn with_assets(self, assets: Vec<LibraryAsset>) -> Self {
        self.state.lock().unwrap().assets = assets;
        self
    }

    pub fn set_status(&self, status: AuthorizationStatus) {
        self.state.lock().unwrap().status = status;
    }

    pub fn set_prompt_answer(&self, status: AuthorizationStatus) {
        self.state.lock().unwrap().prompt_answer = status;
    }

    pub fn set_delete_behavior(&self, behavior: DeleteBehavior) {
        self.state.lock().unwrap().delete_behavior = behavior;
    }

    pub fn fail_page_at(&self, offset: usize) {
        self.state.lock().unwrap().failing_offsets.insert(offset);
    }

    pub fn hide_from_pages(&self, id: &str) {
        self.state.lock().unwrap().hidden_from_pages.insert(id.to_string());
    }

    pub fn add_collection(&self, id: &str, title: &str, asset_ids: &[&str]) {
        let ids: Vec<String> = asset_ids.iter().map(|id| id.to_string()).collect();
        self.state.lock().unwrap().collections.push((
            LibraryCollection {
                id: id.to_string(),
                title: title.to_string(),
                asset_count: ids.len(),
            },
            ids,
        ));
    }

    pub fn collection_ids(&self, title: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .collections
            .iter()
            .find(|(collection, _)| collection.title == title)
            .map(|(_, ids)| ids.clone())
            .unwrap_or_default()
    }

    /// Remove an asset behind the app's back and notify listeners.
    pub fn remove_externally(&self, id: &str) {
        self.state.lock().unwrap().assets.retain(|asset| asset.id != id);
        let _ = self.changes.send(LibraryChange {
            removed: vec![id.to_string()],
            ..LibraryChange::default()
        });
    }

    /// Block `fetch_page` until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gated.store(true, Ordering::SeqCst);
    }

    pub fn open_gate(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.add_permits(1_000);
    }

    /// Block `add_to_collection` until
    /// [`open_collection_gate`](Self::open_collection_gate).
    pub fn close_collection_gate(&self) {
        self.collections_gated.store(true, Ordering::SeqCst);
    }

    pub fn open_collection_gate(&self) {
        self.collections_gated.store(false, Ordering::SeqCst);
        self.collection_gate.add_permits(1_000);
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    fn find_collection<'a>(
        state: &'a mut FakeState,
        collection_id: &str,
    ) -> BridgeResult<&'a mut Vec<String>> {
        state
            .collections
            .iter_mut()
            .find(|(collection, _)| collection.id == collection_id)
            .map(|(_, ids)| ids)
            .ok_or_else(|| BridgeError::NotFound(collection_id.to_string()))
    }

    fn assets_by_id(state: &FakeState, ids: &[String]) -> Vec<LibraryAsset> {
        state
            .assets
            .iter()
            .filter(|asset| ids.contains(&asset.id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MediaLibrary for FakeLibrary {
    async fn authorization_status(&self) -> BridgeResult<AuthorizationStatus> {
        Ok(self.state.lock().unwrap().status)
    }

    async fn request_authorization(&self) -> BridgeResult<AuthorizationStatus> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.status = state.prompt_answer;
        Ok(state.status)
    }

    async fn asset_count(&self) -> BridgeResult<usize> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().assets.len())
    }

    async fn fetch_recent(&self, limit: usize) -> BridgeResult<Vec<LibraryAsset>> {
        self.recent_fetches.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(state.assets.iter().take(limit).cloned().collect())
    }

    async fn fetch_page(&self, offset: usize, limit: usize) -> BridgeResult<Vec<LibraryAsset>> {
        if self.gated.load(Ordering::SeqCst) {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
        }
        let state = self.state.lock().unwrap();
        if state.failing_offsets.contains(&offset) {
            return Err(BridgeError::OperationFailed(format!("page at {offset}")));
        }
        Ok(state
            .assets
            .iter()
            .filter(|asset| !state.hidden_from_pages.contains(&asset.id))
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_assets_by_id(&self, ids: &[String]) -> BridgeResult<Vec<LibraryAsset>> {
        let state = self.state.lock().unwrap();
        Ok(Self::assets_by_id(&state, ids))
    }

    async fn fetch_collections(&self, title: &str) -> BridgeResult<Vec<LibraryCollection>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .iter()
            .filter(|(collection, _)| collection.title == title)
            .map(|(collection, _)| collection.clone())
            .collect())
    }

    async fn fetch_collection_assets(&self, collection_id: &str) -> BridgeResult<Vec<LibraryAsset>> {
        let mut state = self.state.lock().unwrap();
        let ids = Self::find_collection(&mut state, collection_id)?.clone();
        Ok(Self::assets_by_id(&state, &ids))
    }

    async fn request_thumbnail(&self, asset_id: &str, request: ThumbnailRequest) -> BridgeResult<Bytes> {
        Ok(Bytes::from(format!("{asset_id}@{}", request.width)))
    }

    async fn delete_assets(&self, ids: &[String]) -> BridgeResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        match state.delete_behavior {
            DeleteBehavior::Fail => Err(BridgeError::OperationFailed("delete refused".into())),
            DeleteBehavior::Decline => Err(BridgeError::Cancelled),
            DeleteBehavior::Succeed => {
                state.assets.retain(|asset| !ids.contains(&asset.id));
                drop(state);
                let _ = self.changes.send(LibraryChange {
                    removed: ids.to_vec(),
                    ..LibraryChange::default()
                });
                Ok(())
            }
        }
    }

    async fn create_collection(&self, title: &str) -> BridgeResult<LibraryCollection> {
        let mut state = self.state.lock().unwrap();
        let collection = LibraryCollection {
            id: format!("collection-{}", state.collections.len() + 1),
            title: title.to_string(),
            asset_count: 0,
        };
        state.collections.push((collection.clone(), Vec::new()));
        Ok(collection)
    }

    async fn add_to_collection(&self, collection_id: &str, ids: &[String]) -> BridgeResult<()> {
        self.collection_adds.fetch_add(1, Ordering::SeqCst);
        if self.collections_gated.load(Ordering::SeqCst) {
            if let Ok(permit) = self.collection_gate.acquire().await {
                permit.forget();
            }
        }
        let mut state = self.state.lock().unwrap();
        let members = Self::find_collection(&mut state, collection_id)?;
        members.extend(ids.iter().cloned());
        let _ = self.changes.send(LibraryChange {
            updated: vec![collection_id.to_string()],
            ..LibraryChange::default()
        });
        Ok(())
    }

    async fn remove_from_collection(&self, collection_id: &str, ids: &[String]) -> BridgeResult<()> {
        let mut state = self.state.lock().unwrap();
        let members = Self::find_collection(&mut state, collection_id)?;
        members.retain(|id| !ids.contains(id));
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<LibraryChange> {
        self.changes.subscribe()
    }
}

/// Asset created on the first of the given month.
pub fn asset(id: &str, year: i32, month: u32) -> LibraryAsset {
    let created = Utc
        .with_ymd_and_hms(year, month, 1, 12, 0, 0)
        .single()
        .map(|at| at.timestamp());
    LibraryAsset::new(id, created).with_byte_size(1_000)
}

/// `count` assets named `item-0..`, one per day going back from June 2024.
pub fn assets(count: usize) -> Vec<LibraryAsset> {
    let newest = Utc.with_ymd_and_hms(2024, 6, 30, 12, 0, 0).unwrap().timestamp();
    (0..count)
        .map(|i| LibraryAsset::new(format!("item-{i}"), Some(newest - i as i64 * 86_400)))
        .collect()
}

pub fn temp_dir() -> PathBuf {
    std::env::temp_dir().join(format!("photo-sweep-sync-{}", uuid::Uuid::new_v4()))
}

pub struct Harness {
    pub library: Arc<FakeLibrary>,
    pub clock: Arc<ManualClock>,
    pub data_dir: PathBuf,
    pub manager: SyncManager,
}

impl Harness {
    pub async fn new(library: FakeLibrary) -> Self {
        Self::with_config(library, test_config(), FeatureFlags::default(), temp_dir()).await
    }

    pub async fn with_config(
        library: FakeLibrary,
        config: SyncConfig,
        features: FeatureFlags,
        data_dir: PathBuf,
    ) -> Self {
        let library = Arc::new(library);
        let clock = Arc::new(ManualClock::default());
        let core = CoreConfig::builder()
            .data_dir(data_dir.clone())
            .media_library(library.clone())
            .file_system(Arc::new(TokioFileSystem::with_data_directory(data_dir.clone())))
            .clock(clock.clone())
            .features(features)
            .build()
            .unwrap();
        let manager = SyncManager::new(&core, config).await.unwrap();
        Self {
            library,
            clock,
            data_dir,
            manager,
        }
    }

    /// Move the clock past the refresh throttle window.
    pub fn pass_throttle_window(&self) {
        self.clock.advance(chrono::Duration::seconds(5));
    }
}

pub fn test_config() -> SyncConfig {
    SyncConfig {
        quick_batch_size: 2,
        chunk_size: 4,
        warm_limit: 0,
        ..SyncConfig::default()
    }
}

/// Receive events until one matches, failing after a second.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<CoreEvent>, mut matches: F) -> CoreEvent
where
    F: FnMut(&CoreEvent) -> bool,
{
    timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event bus closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drain every event already buffered.
pub fn drain(events: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
