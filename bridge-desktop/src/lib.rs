//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! - `FileSystemAccess` using `tokio::fs` and the `dirs` platform directories
//!
//! The photo library itself has no portable desktop equivalent; hosts inject
//! their own `MediaLibrary` adapter.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::TokioFileSystem;
//!
//! let fs = TokioFileSystem::new();
//! let config = CoreConfig::builder()
//!     .file_system(Arc::new(fs))
//!     .media_library(library)
//!     .build()?;
//! ```

mod filesystem;

pub use filesystem::TokioFileSystem;
