//! # Library Model Module
//!
//! Owns the in-memory shape of the photo library and the small amount of
//! state that survives restarts.
//!
//! ## Overview
//!
//! This module provides:
//! - Item, group and year-group models ([`models`])
//! - Month and year grouping as pure functions ([`grouping`])
//! - The persisted deletion-mark and preview identifier sets, each with a
//!   single background writer ([`persistence`])

pub mod error;
pub mod grouping;
pub mod models;
pub mod persistence;

pub use error::{LibraryError, Result};
pub use grouping::{build_index, group_by_month, group_by_year, system_group, GroupedIndex};
pub use models::{
    Group, GroupId, GroupKind, ItemId, MediaItem, MediaKind, PreviewEntry, SystemGroup, YearGroup,
};
pub use persistence::{PersistedSetKind, PersistedSetStore, SetWriter};
