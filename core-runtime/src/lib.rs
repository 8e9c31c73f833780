//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the photo-sweep core:
//! - Logging and tracing setup
//! - Configuration management (host bridges, feature flags)
//! - Event bus for load phases and deletion-state changes
//!
//! Every other core crate depends on this one for its configuration types and
//! event definitions.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{CoreConfig, CoreConfigBuilder, FeatureFlags};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream};
