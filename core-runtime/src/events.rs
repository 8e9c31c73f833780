//! # Event Bus System
//!
//! Typed, broadcast-based notifications from the core to whoever is
//! listening (the UI layer, analytics, tests).
//!
//! ## Overview
//!
//! - **Event Types**: one enum per concern, wrapped by [`CoreEvent`]
//! - **EventBus**: a `broadcast` channel for publishing events
//! - **EventStream**: a receiver wrapper with optional filtering
//!
//! The published library snapshot (see `core-sync`) carries the state; events
//! carry the transitions. A consumer that only renders the current grouping
//! never needs the bus. One that must observe that the quick phase finished
//! before the full phase did (a `watch` channel may skip intermediate values)
//! subscribes here.
//!
//! ```text
//! ┌──────────────────┐  emit   ┌──────────┐  subscribe  ┌────────────┐
//! │ ProgressiveLoader├────────>│          ├────────────>│ UI layer   │
//! └──────────────────┘         │ EventBus │             └────────────┘
//! ┌──────────────────┐  emit   │          │  subscribe  ┌────────────┐
//! │ SyncManager      ├────────>│          ├────────────>│ Tests      │
//! └──────────────────┘         └──────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, DeletionEvent, EventBus};
//!
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Deletion(DeletionEvent::Marked {
//!     item_ids: vec!["IMG_0001".to_string()],
//!     total_marked: 1,
//! }))
//! .ok();
//!
//! assert!(matches!(rx.try_recv(), Ok(CoreEvent::Deletion(_))));
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. Non-fatal.
//! - **`RecvError::Closed`**: every sender was dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error that publishers ignore with
//! `.ok()`.

use core_async::sync::broadcast;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Library access permission changes
    Authorization(AuthorizationEvent),
    /// Progressive loading phases
    Loading(LoadingEvent),
    /// Deletion working-set changes
    Deletion(DeletionEvent),
    /// Library mutations and external changes
    Library(LibraryEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Authorization(e) => e.description(),
            CoreEvent::Loading(e) => e.description(),
            CoreEvent::Deletion(e) => e.description(),
            CoreEvent::Library(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Deletion(DeletionEvent::DeleteFailed {
                cancelled: false, ..
            }) => EventSeverity::Error,
            CoreEvent::Loading(LoadingEvent::ChunkFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Deletion(DeletionEvent::DeleteFailed { cancelled: true, .. }) => {
                EventSeverity::Info
            }
            CoreEvent::Authorization(AuthorizationEvent::StatusChanged { authorized, .. }) => {
                if *authorized {
                    EventSeverity::Info
                } else {
                    EventSeverity::Warning
                }
            }
            CoreEvent::Loading(LoadingEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Deletion(DeletionEvent::Deleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Authorization Events
// ============================================================================

/// Events related to photo library access permission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthorizationEvent {
    /// The host reported a new authorization state.
    StatusChanged {
        /// Host status, snake_case (`authorized`, `limited`, `denied`, ...).
        status: String,
        /// Whether reads are now permitted.
        authorized: bool,
    },
}

impl AuthorizationEvent {
    fn description(&self) -> &str {
        match self {
            AuthorizationEvent::StatusChanged { .. } => "Library authorization changed",
        }
    }
}

// ============================================================================
// Loading Events
// ============================================================================

/// Events emitted while the progressive loader runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LoadingEvent {
    /// A load began.
    Started {
        /// Monotonic load counter.
        generation: u64,
        /// Whether the load bypassed the refresh throttle.
        forced: bool,
    },
    /// The quick subset was grouped and published.
    InitialDataReady {
        generation: u64,
        /// Items in the quick subset.
        item_count: usize,
        /// Month groups built from the quick subset.
        group_count: usize,
    },
    /// One chunk of the full scan was processed.
    ChunkProcessed {
        generation: u64,
        /// Items loaded so far.
        loaded: usize,
        /// Items the library reported at the start of the scan.
        total: usize,
    },
    /// One chunk of the full scan failed and was skipped.
    ChunkFailed {
        generation: u64,
        /// Offset of the failed chunk.
        offset: usize,
        message: String,
    },
    /// The full scan finished and the complete index was published.
    Completed {
        generation: u64,
        item_count: usize,
        group_count: usize,
        /// Whether any chunk failed.
        partial: bool,
        duration_ms: u64,
    },
}

impl LoadingEvent {
    fn description(&self) -> &str {
        match self {
            LoadingEvent::Started { .. } => "Library load started",
            LoadingEvent::InitialDataReady { .. } => "Recent items ready",
            LoadingEvent::ChunkProcessed { .. } => "Library chunk processed",
            LoadingEvent::ChunkFailed { .. } => "Library chunk failed",
            LoadingEvent::Completed { .. } => "Library load completed",
        }
    }
}

// ============================================================================
// Deletion Events
// ============================================================================

/// Events related to the pending-deletion working set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum DeletionEvent {
    /// Items were added to the pending-deletion set.
    Marked {
        item_ids: Vec<String>,
        /// Set size after the change.
        total_marked: usize,
    },
    /// Items were removed from the pending-deletion set.
    Unmarked {
        item_ids: Vec<String>,
        total_marked: usize,
    },
    /// Items were permanently deleted from the library.
    Deleted { item_ids: Vec<String> },
    /// A deletion request did not go through. Nothing was changed.
    DeleteFailed {
        item_count: usize,
        /// The user declined the host confirmation.
        cancelled: bool,
        message: String,
    },
    /// Persisted identifiers that no longer exist were purged.
    Reconciled { item_ids: Vec<String> },
}

impl DeletionEvent {
    fn description(&self) -> &str {
        match self {
            DeletionEvent::Marked { .. } => "Items marked for deletion",
            DeletionEvent::Unmarked { .. } => "Items unmarked",
            DeletionEvent::Deleted { .. } => "Items deleted",
            DeletionEvent::DeleteFailed { .. } => "Deletion failed",
            DeletionEvent::Reconciled { .. } => "Stale identifiers purged",
        }
    }
}

// ============================================================================
// Library Events
// ============================================================================

/// Events related to library mutations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LibraryEvent {
    /// The host reported a change not caused by this process.
    ExternalChange {
        /// Number of affected assets (0 when the host gave no detail).
        change_count: usize,
    },
    /// An item was added to the saved collection.
    Bookmarked { item_id: String },
    /// An item was removed from the saved collection.
    Unbookmarked { item_id: String },
    /// An item was moved back out of a system group.
    Restored {
        item_id: String,
        /// Destination group key.
        group_id: String,
    },
}

impl LibraryEvent {
    fn description(&self) -> &str {
        match self {
            LibraryEvent::ExternalChange { .. } => "Library changed externally",
            LibraryEvent::Bookmarked { .. } => "Item saved",
            LibraryEvent::Unbookmarked { .. } => "Item unsaved",
            LibraryEvent::Restored { .. } => "Item restored",
        }
    }
}

// ============================================================================
// Event Bus Implementation
// ============================================================================

/// Central broadcaster for [`CoreEvent`]s.
///
/// Cloning the bus yields another handle to the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus.
    ///
    /// `capacity` is the number of events buffered per subscriber before the
    /// slowest one starts receiving `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if nobody is listening.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional filter.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let loading_only = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Loading(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Only events at or above `min` severity will be returned.
    pub fn min_severity(self, min: EventSeverity) -> Self {
        self.filter(move |event| event.severity() >= min)
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without waiting.
    ///
    /// Returns `None` if no matching events are currently buffered.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
