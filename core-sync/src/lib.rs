//! # Library Sync Module
//!
//! Keeps a grouped view of the device photo library in step with the host
//! and tracks which items the user has marked for deletion.
//!
//! ## Overview
//!
//! - Checking and requesting library access
//! - Loading the library progressively: a quick first screen, then a full
//!   chunked scan in the background
//! - Throttling and coalescing refresh requests
//! - Persisting deletion marks and preview identifiers
//! - Deleting, saving and restoring items through the host library
//! - Reacting to library changes made outside the app
//!
//! ## Components
//!
//! - **Load Phases** (`phase`): validated transitions of a single load
//! - **Refresh Throttle** (`throttle`): minimum interval between non-forced loads
//! - **Shared State** (`state`): mutable content and the published snapshot
//! - **Progressive Loader** (`loader`): runs one load against the host library
//! - **Sync Manager** (`manager`): the public entry point

pub mod config;
pub mod error;
pub mod loader;
pub mod manager;
pub mod phase;
pub mod state;
pub mod throttle;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use loader::{LoadOutcome, LoadPlan, ProgressiveLoader};
pub use manager::{RefreshOutcome, SyncManager};
pub use phase::LoadPhase;
pub use state::{LibrarySnapshot, SharedState};
pub use throttle::RefreshThrottle;
