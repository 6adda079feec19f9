//! Event types for the MOSS submission pipeline
//!
//! Provides the progress event definitions and EventBus shared between the
//! protocol core and the external job runner. The core emits events as a
//! broadcast stream; how they are recorded (database status transitions,
//! user notification) is entirely the subscriber's concern.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress events emitted while a submission job is driven to completion
///
/// Events are broadcast via [`EventBus`] and can be serialized for
/// transmission to external observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MossEvent {
    /// File upload to the service began
    ///
    /// Triggers:
    /// - Job runner: transition job status to "uploading"
    UploadStarted {
        /// Run identifier for this generation attempt chain
        job_id: Uuid,
        /// Number of comparison files being uploaded
        file_count: usize,
        /// When upload started
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// All files accepted by the service
    UploadFinished {
        job_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Terminal query sent; the service is now computing the report
    ///
    /// Triggers:
    /// - Job runner: transition job status to "processing"
    ProcessingStarted {
        job_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The service produced a result URL
    ProcessingFinished {
        job_id: Uuid,
        /// Result URL reported by the service
        report_url: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A retry was scheduled after a recoverable failure
    ///
    /// Triggers:
    /// - Job runner: surface "still trying" state to the user
    RetryScheduled {
        job_id: Uuid,
        /// Attempt number about to run (0-based)
        attempt: u32,
        /// Backoff sleep before the attempt, in milliseconds
        delay_ms: u64,
        /// Display text of the error that caused the retry
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One match fragment could not be parsed and was omitted from the result
    ///
    /// The report itself still completes; subscribers that care about
    /// completeness can count these.
    MatchSkipped {
        job_id: Uuid,
        /// Index of the match within the report
        index: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MossEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &str {
        match self {
            MossEvent::UploadStarted { .. } => "UploadStarted",
            MossEvent::UploadFinished { .. } => "UploadFinished",
            MossEvent::ProcessingStarted { .. } => "ProcessingStarted",
            MossEvent::ProcessingFinished { .. } => "ProcessingFinished",
            MossEvent::RetryScheduled { .. } => "RetryScheduled",
            MossEvent::MatchSkipped { .. } => "MatchSkipped",
        }
    }

    /// Run identifier the event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            MossEvent::UploadStarted { job_id, .. }
            | MossEvent::UploadFinished { job_id, .. }
            | MossEvent::ProcessingStarted { job_id, .. }
            | MossEvent::ProcessingFinished { job_id, .. }
            | MossEvent::RetryScheduled { job_id, .. }
            | MossEvent::MatchSkipped { job_id, .. } => *job_id,
        }
    }
}

/// Central event distribution bus for pipeline progress events
///
/// Uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block the protocol core)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MossEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<MossEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: MossEvent) -> Result<usize, broadcast::error::SendError<MossEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring whether anyone is listening
    ///
    /// Progress events are advisory; a job runs to completion whether or not
    /// an observer is attached.
    pub fn emit_lossy(&self, event: MossEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
