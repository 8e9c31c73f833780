//! File System Abstraction
//!
//! The core persists its small working sets (deletion marks, preview ids) as
//! flat files in an application-private directory. All of that I/O goes
//! through [`FileSystemAccess`] so hosts can point it at a sandboxed
//! container and tests can root it in a temporary directory.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn replace(fs: &dyn FileSystemAccess, target: &Path, data: Bytes) -> Result<()> {
///     let tmp = target.with_extension("tmp");
///     fs.write_file(&tmp, data).await?;
///     fs.rename(&tmp, target).await
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Directory for persistent application data.
    async fn get_data_directory(&self) -> Result<PathBuf>;

    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating or truncating it
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// Move `from` over `to`, replacing any existing file.
    ///
    /// Implementations must make the replacement atomic when both paths are on
    /// the same volume: a reader sees either the old or the new contents.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;
}
