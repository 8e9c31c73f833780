//! Refresh throttle
//!
//! At most one non-forced refresh starts per window. A refresh that starts,
//! forced or not, opens a new window.

use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub struct RefreshThrottle {
    clock: Arc<dyn Clock>,
    window: Duration,
    window_start: Option<DateTime<Utc>>,
}

impl RefreshThrottle {
    pub fn new(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            clock,
            window,
            window_start: None,
        }
    }

    /// Whether a non-forced refresh would be rejected right now.
    pub fn is_throttled(&self) -> bool {
        let Some(start) = self.window_start else {
            return false;
        };
        let elapsed = self.clock.now().signed_duration_since(start);
        // A clock that moved backwards ends the window.
        match elapsed.to_std() {
            Ok(elapsed) => elapsed < self.window,
            Err(_) => false,
        }
    }

    /// Decide whether a refresh may start, opening a new window if so.
    pub fn try_acquire(&mut self, force: bool) -> bool {
        if !force && self.is_throttled() {
            return false;
        }
        self.window_start = Some(self.clock.now());
        true
    }

    pub fn reset(&mut self) {
        self.window_start = None;
    }
}
