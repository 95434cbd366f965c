//! # Event Bus System
//!
//! Provides an event-driven architecture for the manifest sync core using
//! `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The event bus replaces implicit property-store callbacks with explicit
//! publication:
//! - **Property events**: published by the host's property store whenever a
//!   project or file property changes; the property router subscribes to them
//! - **Rescan events**: lifecycle of background full rescans
//! - **Manifest events**: structural changes and persistence checkpoints
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit    ┌───────────┐  subscribe  ┌─────────────────┐
//! │ Property store ├──────────>│           ├────────────>│ Property router │
//! └────────────────┘           │ EventBus  │             └─────────────────┘
//! ┌────────────────┐   emit    │ (broadcast│  subscribe  ┌─────────────────┐
//! │ Sync engine    ├──────────>│  channel) ├────────────>│ UI collaborator │
//! └────────────────┘           └───────────┘             └─────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, PropertyEvent, PropertyScope};
//!
//! let bus = EventBus::new(16);
//! let mut subscriber = bus.subscribe();
//!
//! bus.emit(CoreEvent::Property(PropertyEvent::Changed {
//!     project: "demo".to_string(),
//!     scope: PropertyScope::Project,
//!     key: "included_resource_directories".to_string(),
//!     old_value: Some("src".to_string()),
//!     new_value: Some("/".to_string()),
//! }))
//! .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events. A lagging
//!   property router cannot know which properties changed, so it should
//!   schedule a full rescan for every open manifest.
//! - **`RecvError::Closed`**: all senders have been dropped; treat as shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Project or file property changed in the host property store
    Property(PropertyEvent),
    /// Full rescan lifecycle
    Rescan(RescanEvent),
    /// Manifest structure and persistence
    Manifest(ManifestEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Property(e) => e.description(),
            CoreEvent::Rescan(e) => e.description(),
            CoreEvent::Manifest(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Rescan(RescanEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Manifest(ManifestEvent::VerificationWarnings { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Rescan(RescanEvent::Cancelled { .. }) => EventSeverity::Warning,
            CoreEvent::Rescan(RescanEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::Manifest(ManifestEvent::Saved { .. })
            | CoreEvent::Manifest(ManifestEvent::Created { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Project this event belongs to.
    pub fn project(&self) -> &str {
        match self {
            CoreEvent::Property(PropertyEvent::Changed { project, .. }) => project,
            CoreEvent::Rescan(e) => e.project(),
            CoreEvent::Manifest(e) => e.project(),
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
// Property Events
// ============================================================================

/// Which resource a property belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PropertyScope {
    /// Project-level property
    Project,
    /// Property attached to one file, by project-relative path
    File { path: String },
}

/// Change notifications from the host property store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PropertyEvent {
    Changed {
        project: String,
        scope: PropertyScope,
        /// Unqualified property key, e.g. `file_copyright`
        key: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },
}

impl PropertyEvent {
    fn description(&self) -> &str {
        match self {
            PropertyEvent::Changed { .. } => "Property changed",
        }
    }
}

// ============================================================================
// Rescan Events
// ============================================================================

/// Lifecycle of a full rescan job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RescanEvent {
    Started {
        project: String,
        job_id: String,
        /// Why the rescan was scheduled (e.g. "exclude patterns changed")
        reason: String,
    },
    Completed {
        project: String,
        job_id: String,
        files: u64,
        verification_code: String,
        duration_ms: u64,
    },
    /// Superseded or cancelled; the manifest still owes a rescan.
    Cancelled {
        project: String,
        job_id: String,
        files_processed: u64,
    },
    Failed {
        project: String,
        job_id: String,
        message: String,
    },
}

impl RescanEvent {
    fn description(&self) -> &str {
        match self {
            RescanEvent::Started { .. } => "Rescan started",
            RescanEvent::Completed { .. } => "Rescan completed",
            RescanEvent::Cancelled { .. } => "Rescan cancelled",
            RescanEvent::Failed { .. } => "Rescan failed",
        }
    }

    fn project(&self) -> &str {
        match self {
            RescanEvent::Started { project, .. }
            | RescanEvent::Completed { project, .. }
            | RescanEvent::Cancelled { project, .. }
            | RescanEvent::Failed { project, .. } => project,
        }
    }
}

// ============================================================================
// Manifest Events
// ============================================================================

/// Structural changes and persistence checkpoints of a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ManifestEvent {
    Created { project: String, path: String },
    Opened { project: String, files: u64 },
    Saved { project: String, path: String },
    FileAdded { project: String, path: String },
    FileUpdated { project: String, path: String },
    FileRemoved { project: String, path: String },
    /// The loaded document failed semantic verification; load still succeeded.
    VerificationWarnings { project: String, warnings: Vec<String> },
    Disabled { project: String },
}

impl ManifestEvent {
    fn description(&self) -> &str {
        match self {
            ManifestEvent::Created { .. } => "Manifest created",
            ManifestEvent::Opened { .. } => "Manifest opened",
            ManifestEvent::Saved { .. } => "Manifest saved",
            ManifestEvent::FileAdded { .. } => "File added to manifest",
            ManifestEvent::FileUpdated { .. } => "File updated in manifest",
            ManifestEvent::FileRemoved { .. } => "File removed from manifest",
            ManifestEvent::VerificationWarnings { .. } => "Manifest verification warnings",
            ManifestEvent::Disabled { .. } => "Manifest disabled",
        }
    }

    fn project(&self) -> &str {
        match self {
            ManifestEvent::Created { project, .. }
            | ManifestEvent::Opened { project, .. }
            | ManifestEvent::Saved { project, .. }
            | ManifestEvent::FileAdded { project, .. }
            | ManifestEvent::FileUpdated { project, .. }
            | ManifestEvent::FileRemoved { project, .. }
            | ManifestEvent::VerificationWarnings { project, .. }
            | ManifestEvent::Disabled { project } => project,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero; `CoreConfig` rejects that value.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none. Publishers treat "no subscribers" as normal.
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

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(16);
/// let properties = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Property(_)));
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

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
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

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
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
