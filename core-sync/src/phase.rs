//! # Load Phase State Machine
//!
//! Tracks where the progressive loader is with validated transitions.
//!
//! ## State Machine
//!
//! ```text
//! Idle | Complete | Halted → Authorizing
//! Authorizing → Quick | Full | Halted
//! Quick → Full → Complete
//! ```
//!
//! The initial load runs the quick phase; refreshes go straight from
//! `Authorizing` to `Full`. Nothing is terminal: `Complete` and `Halted` are
//! re-entered on the next load.

use crate::{Result, SyncError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadPhase {
    /// No load has run yet
    #[default]
    Idle,
    /// Checking library access
    Authorizing,
    /// Grouping the most recent items
    Quick,
    /// Scanning the whole library in chunks
    Full,
    /// The last load published a complete index
    Complete,
    /// The last load stopped because access was not granted
    Halted,
}

impl LoadPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPhase::Idle => "idle",
            LoadPhase::Authorizing => "authorizing",
            LoadPhase::Quick => "quick",
            LoadPhase::Full => "full",
            LoadPhase::Complete => "complete",
            LoadPhase::Halted => "halted",
        }
    }

    /// Whether a load is in progress.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            LoadPhase::Authorizing | LoadPhase::Quick | LoadPhase::Full
        )
    }

    /// Move to `to`, or fail if the transition is not allowed.
    pub fn advance(self, to: LoadPhase) -> Result<LoadPhase> {
        let valid = match (self, to) {
            (LoadPhase::Idle | LoadPhase::Complete | LoadPhase::Halted, LoadPhase::Authorizing) => {
                true
            }
            (LoadPhase::Authorizing, LoadPhase::Quick | LoadPhase::Full | LoadPhase::Halted) => {
                true
            }
            (LoadPhase::Quick, LoadPhase::Full) => true,
            (LoadPhase::Full, LoadPhase::Complete) => true,
            _ => false,
        };

        if valid {
            Ok(to)
        } else {
            Err(SyncError::InvalidPhaseTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for LoadPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
