//! Persisted identifier sets
//!
//! Two small sets outlive the process: the identifiers marked for deletion and
//! the identifiers that have a preview entry. Each is stored as a flat JSON
//! array of strings in the application data directory.
//!
//! Saves go through a temporary file and a rename, so a crash mid-write
//! leaves the previous contents in place. Loads never fail: a missing or
//! unreadable file is an empty set.
//!
//! Each set has exactly one [`SetWriter`] that owns its store. Callers submit
//! snapshots and move on; the writer persists them in submission order and
//! skips snapshots already superseded by a newer one.

use crate::error::{LibraryError, Result};
use crate::models::ItemId;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use core_async::sync::{mpsc, oneshot};
use core_async::task::{self, JoinHandle};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Which persisted set a store manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PersistedSetKind {
    DeletionMarks,
    PreviewIds,
}

impl PersistedSetKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            PersistedSetKind::DeletionMarks => "deletion_marks.json",
            PersistedSetKind::PreviewIds => "deletion_preview_ids.json",
        }
    }
}

/// Load/save access to one persisted identifier set.
#[derive(Clone)]
pub struct PersistedSetStore {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    kind: PersistedSetKind,
}

impl PersistedSetStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, dir: impl AsRef<Path>, kind: PersistedSetKind) -> Self {
        let path = dir.as_ref().join(kind.file_name());
        Self { fs, path, kind }
    }

    /// A store in the file system bridge's data directory.
    pub async fn in_data_directory(
        fs: Arc<dyn FileSystemAccess>,
        kind: PersistedSetKind,
    ) -> Result<Self> {
        let dir = fs.get_data_directory().await?;
        Ok(Self::new(fs, dir, kind))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> PersistedSetKind {
        self.kind
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Read the set. Missing, unreadable or malformed files yield an empty set.
    pub async fn load(&self) -> HashSet<ItemId> {
        match self.try_load().await {
            Ok(Some(set)) => {
                debug!(kind = ?self.kind, count = set.len(), "Loaded persisted set");
                set
            }
            Ok(None) => {
                debug!(kind = ?self.kind, "No persisted set yet");
                HashSet::new()
            }
            Err(e) => {
                warn!(kind = ?self.kind, error = %e, "Persisted set unreadable, starting empty");
                HashSet::new()
            }
        }
    }

    async fn try_load(&self) -> Result<Option<HashSet<ItemId>>> {
        if !self.fs.exists(&self.path).await? {
            return Ok(None);
        }
        let data = self.fs.read_file(&self.path).await?;
        let ids: Vec<String> = serde_json::from_slice(&data)?;
        Ok(Some(ids.into_iter().map(ItemId::from).collect()))
    }

    /// Replace the persisted set atomically.
    pub async fn save(&self, set: &HashSet<ItemId>) -> Result<()> {
        let mut ids: Vec<&str> = set.iter().map(ItemId::as_str).collect();
        ids.sort_unstable();
        let data = Bytes::from(serde_json::to_vec(&ids)?);

        if let Some(parent) = self.path.parent() {
            self.fs.create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        self.fs.write_file(&tmp, data).await?;

        if let Err(e) = self.fs.rename(&tmp, &self.path).await {
            self.fs.delete_file(&tmp).await.ok();
            return Err(LibraryError::Persistence {
                path: self.path.display().to_string(),
                message: e.to_string(),
            });
        }

        debug!(kind = ?self.kind, count = ids.len(), "Saved persisted set");
        Ok(())
    }
}

enum WriterCommand {
    Save(HashSet<ItemId>),
    Flush(oneshot::Sender<()>),
}

/// Single writer for one persisted set.
///
/// `submit` never waits for I/O. Snapshots are written in the order they were
/// submitted; when several are queued only the newest is written.
pub struct SetWriter {
    kind: PersistedSetKind,
    tx: mpsc::UnboundedSender<WriterCommand>,
    handle: JoinHandle<()>,
}

impl SetWriter {
    /// Spawn the writer task. Must be called from within a runtime.
    pub fn spawn(store: PersistedSetStore) -> Self {
        let kind = store.kind();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = task::spawn(run_writer(store, rx));
        Self { kind, tx, handle }
    }

    pub fn kind(&self) -> PersistedSetKind {
        self.kind
    }

    /// Queue a snapshot for persistence.
    pub fn submit(&self, snapshot: HashSet<ItemId>) {
        if self.tx.send(WriterCommand::Save(snapshot)).is_err() {
            warn!(kind = ?self.kind, "Set writer stopped, snapshot dropped");
        }
    }

    /// Wait until every snapshot submitted before this call has been handled.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(done_tx))
            .map_err(|_| LibraryError::WriterClosed)?;
        done_rx.await.map_err(|_| LibraryError::WriterClosed)
    }

    /// Drain the queue and stop the writer.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(kind = ?self.kind, error = %e, "Set writer task failed");
        }
    }
}

async fn run_writer(store: PersistedSetStore, mut rx: mpsc::UnboundedReceiver<WriterCommand>) {
    while let Some(command) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();

        let mut next = Some(command);
        while let Some(command) = next {
            match command {
                WriterCommand::Save(snapshot) => latest = Some(snapshot),
                WriterCommand::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(snapshot) = latest {
            if let Err(e) = store.save(&snapshot).await {
                warn!(kind = ?store.kind(), error = %e, "Failed to persist set");
            }
        }

        for done in waiters {
            done.send(()).ok();
        }
    }

    debug!(kind = ?store.kind(), "Set writer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_desktop::TokioFileSystem;
    use bridge_traits::error::{BridgeError, Result as BridgeResult};
    use mockall::mock;
    use mockall::predicate::*;

    fn scratch() -> (Arc<dyn FileSystemAccess>, PathBuf) {
        let dir = std::env::temp_dir().join(format!("photo-sweep-sets-{}", uuid::Uuid::new_v4()));
        let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::with_data_directory(dir.clone()));
        (fs, dir)
    }

    fn ids(values: &[&str]) -> HashSet<ItemId> {
        values.iter().map(|v| ItemId::from(*v)).collect()
    }

    #[core_async::test]
    async fn test_missing_file_loads_empty() {
        let (fs, dir) = scratch();
        let store = PersistedSetStore::new(fs, &dir, PersistedSetKind::DeletionMarks);

        assert!(store.load().await.is_empty());
    }

    #[core_async::test]
    async fn test_save_then_load_round_trips() {
        let (fs, dir) = scratch();
        let store = PersistedSetStore::new(fs, &dir, PersistedSetKind::DeletionMarks);

        store.save(&ids(&["B", "A", "C"])).await.unwrap();
        assert_eq!(store.load().await, ids(&["A", "B", "C"]));

        store.save(&HashSet::new()).await.unwrap();
        assert!(store.load().await.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[core_async::test]
    async fn test_large_set_round_trips() {
        let (fs, dir) = scratch();
        let store = PersistedSetStore::new(fs, &dir, PersistedSetKind::PreviewIds);
        let set: HashSet<ItemId> = (0..10_000).map(|i| ItemId::new(format!("asset-{i:05}"))).collect();

        store.save(&set).await.unwrap();
        assert_eq!(store.load().await, set);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[core_async::test]
    async fn test_saved_file_is_sorted_json_array_without_leftovers() {
        let (fs, dir) = scratch();
        let store = PersistedSetStore::new(fs, &dir, PersistedSetKind::DeletionMarks);

        store.save(&ids(&["b", "a"])).await.unwrap();

        let raw = std::fs::read_to_string(dir.join("deletion_marks.json")).unwrap();
        assert_eq!(raw, "[\"a\",\"b\"]");
        assert!(!dir.join("deletion_marks.json.tmp").exists());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[core_async::test]
    async fn test_malformed_file_loads_empty() {
        let (fs, dir) = scratch();
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("deletion_preview_ids.json"), b"{not json").unwrap();
        let store = PersistedSetStore::new(fs, &dir, PersistedSetKind::PreviewIds);

        assert!(store.load().await.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[core_async::test]
    async fn test_sets_are_independent() {
        let (fs, dir) = scratch();
        let marks = PersistedSetStore::new(fs.clone(), &dir, PersistedSetKind::DeletionMarks);
        let previews = PersistedSetStore::new(fs, &dir, PersistedSetKind::PreviewIds);

        marks.save(&ids(&["A"])).await.unwrap();

        assert_eq!(marks.load().await, ids(&["A"]));
        assert!(previews.load().await.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    mock! {
        FileSystem {}

        #[async_trait]
        impl FileSystemAccess for FileSystem {
            async fn get_data_directory(&self) -> BridgeResult<PathBuf>;
            async fn exists(&self, path: &Path) -> BridgeResult<bool>;
            async fn create_dir_all(&self, path: &Path) -> BridgeResult<()>;
            async fn read_file(&self, path: &Path) -> BridgeResult<Bytes>;
            async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()>;
            async fn delete_file(&self, path: &Path) -> BridgeResult<()>;
            async fn rename(&self, from: &Path, to: &Path) -> BridgeResult<()>;
        }
    }

    #[core_async::test]
    async fn test_failed_temp_write_never_touches_target() {
        let mut fs = MockFileSystem::new();
        fs.expect_create_dir_all().returning(|_| Ok(()));
        fs.expect_write_file()
            .with(eq(PathBuf::from("/data/deletion_marks.json.tmp")), always())
            .times(1)
            .returning(|_, _| Err(BridgeError::OperationFailed("disk full".to_string())));
        fs.expect_rename().never();

        let store = PersistedSetStore::new(Arc::new(fs), "/data", PersistedSetKind::DeletionMarks);
        let err = store.save(&ids(&["A"])).await.unwrap_err();

        assert!(matches!(err, LibraryError::Bridge(_)));
    }

    #[core_async::test]
    async fn test_failed_rename_cleans_up_temp_file() {
        let mut fs = MockFileSystem::new();
        fs.expect_create_dir_all().returning(|_| Ok(()));
        fs.expect_write_file().returning(|_, _| Ok(()));
        fs.expect_rename()
            .times(1)
            .returning(|_, _| Err(BridgeError::OperationFailed("busy".to_string())));
        fs.expect_delete_file()
            .with(eq(PathBuf::from("/data/deletion_marks.json.tmp")))
            .times(1)
            .returning(|_| Ok(()));

        let store = PersistedSetStore::new(Arc::new(fs), "/data", PersistedSetKind::DeletionMarks);
        let err = store.save(&ids(&["A"])).await.unwrap_err();

        assert!(matches!(err, LibraryError::Persistence { .. }));
    }

    #[core_async::test]
    async fn test_read_error_loads_empty() {
        let mut fs = MockFileSystem::new();
        fs.expect_exists().returning(|_| Ok(true));
        fs.expect_read_file()
            .returning(|_| Err(BridgeError::PermissionDenied("sandbox".to_string())));

        let store = PersistedSetStore::new(Arc::new(fs), "/data", PersistedSetKind::PreviewIds);
        assert!(store.load().await.is_empty());
    }

    #[core_async::test]
    async fn test_writer_persists_last_submitted_snapshot() {
        let (fs, dir) = scratch();
        let store = PersistedSetStore::new(fs, &dir, PersistedSetKind::DeletionMarks);
        let writer = SetWriter::spawn(store.clone());

        writer.submit(ids(&["A"]));
        writer.submit(ids(&["A", "B"]));
        writer.submit(ids(&["B"]));
        writer.flush().await.unwrap();

        assert_eq!(store.load().await, ids(&["B"]));

        writer.submit(ids(&[]));
        writer.shutdown().await;
        assert!(store.load().await.is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[core_async::test]
    async fn test_writer_survives_save_failures() {
        let mut fs = MockFileSystem::new();
        fs.expect_create_dir_all().returning(|_| Ok(()));
        fs.expect_write_file()
            .times(2)
            .returning(|_, _| Err(BridgeError::OperationFailed("disk full".to_string())));

        let store = PersistedSetStore::new(Arc::new(fs), "/data", PersistedSetKind::DeletionMarks);
        let writer = SetWriter::spawn(store);

        writer.submit(ids(&["A"]));
        writer.flush().await.unwrap();
        writer.submit(ids(&["B"]));
        writer.flush().await.unwrap();
    }
}
