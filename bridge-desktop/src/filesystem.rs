//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::FileSystemAccess,
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const APP_DIR_NAME: &str = "photo-sweep";

/// Tokio-based file system implementation
///
/// Persistent data lives in the platform data directory (`~/.local/share`,
/// `~/Library/Application Support`, `%APPDATA%`) under `photo-sweep/`.
pub struct TokioFileSystem {
    data_dir: PathBuf,
}

impl TokioFileSystem {
    /// Create a file system accessor rooted at the platform data directory.
    pub fn new() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".local")
                    .join("share")
            })
            .join(APP_DIR_NAME);

        Self { data_dir }
    }

    /// Create a file system accessor rooted at a custom directory.
    pub fn with_data_directory(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

impl Default for TokioFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn get_data_directory(&self) -> Result<PathBuf> {
        if !fs::try_exists(&self.data_dir)
            .await
            .map_err(Self::map_io_error)?
        {
            fs::create_dir_all(&self.data_dir)
                .await
                .map_err(Self::map_io_error)?;
            debug!(path = ?self.data_dir, "Created data directory");
        }
        Ok(self.data_dir.clone())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_dir_all(parent).await?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        // rename(2) replaces the destination atomically on the same volume.
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    fn scratch_dir() -> PathBuf {
        env::temp_dir().join(format!("photo-sweep-fs-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_data_directory_is_created() {
        let root = scratch_dir();
        let fs = TokioFileSystem::with_data_directory(root.clone());

        let dir = fs.get_data_directory().await.unwrap();
        assert_eq!(dir, root);
        assert!(fs.exists(&dir).await.unwrap());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let root = scratch_dir();
        let fs = TokioFileSystem::with_data_directory(root.clone());
        let file = root.join("nested").join("marks.json");

        let data = Bytes::from("[\"A\"]");
        fs.write_file(&file, data.clone()).await.unwrap();

        assert_eq!(fs.read_file(&file).await.unwrap(), data);

        fs.delete_file(&file).await.unwrap();
        assert!(!fs.exists(&file).await.unwrap());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_rename_replaces_destination() {
        let root = scratch_dir();
        let fs = TokioFileSystem::with_data_directory(root.clone());
        let target = root.join("marks.json");
        let tmp = root.join("marks.json.tmp");

        fs.write_file(&target, Bytes::from("old")).await.unwrap();
        fs.write_file(&tmp, Bytes::from("new")).await.unwrap();
        fs.rename(&tmp, &target).await.unwrap();

        assert_eq!(fs.read_file(&target).await.unwrap(), Bytes::from("new"));
        assert!(!fs.exists(&tmp).await.unwrap());

        tokio::fs::remove_dir_all(&root).await.ok();
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let fs = TokioFileSystem::with_data_directory(scratch_dir());
        let err = fs
            .read_file(Path::new("/definitely/not/here.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
