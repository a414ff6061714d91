//! Tracker events and the broadcast hub that carries them to the UI shell.
//!
//! The registry and the start orchestrator hold an `Arc<EventBus>` and
//! publish [`TrackerEvent`]s; the UI shell subscribes.

use chrono::{DateTime, Utc};
use fwtrack_core::job::JobEntity;
use fwtrack_core::types::JobId;
use serde::Serialize;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient, non-blocking message for the user.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Indicator payloads
// ---------------------------------------------------------------------------

/// Rendered state of a job indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorState {
    Active,
    Completed,
    Failed,
    Stopped,
}

/// Everything the display surface needs to draw one indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndicatorView {
    pub job_id: JobId,
    /// Hover title; the target server's name.
    pub title: String,
    pub state: IndicatorState,
    /// Short text drawn inside the indicator (`"42%"`, `"✔"`, `"❕"`).
    pub label: String,
}

/// A user action offered from the job detail view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAction {
    Stop,
    Untrack,
}

/// Full field set of a job for the detail view.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    pub job: JobEntity,
    /// `"42%"`, or a completion marker for the progress sentinel.
    pub progress_text: String,
    pub actions: Vec<JobAction>,
}

// ---------------------------------------------------------------------------
// TrackerEvent
// ---------------------------------------------------------------------------

/// Everything the tracker tells the UI shell.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    Notification(Notification),

    /// A new indicator must be attached to the display surface.
    IndicatorMounted(IndicatorView),

    /// An attached indicator changed state or label.
    IndicatorUpdated(IndicatorView),

    /// An indicator must be detached from the display surface.
    IndicatorUnmounted { job_id: JobId },

    /// The user selected an indicator; open the detail view.
    DetailOpened(JobDetail),

    /// A start request was accepted; close the input form.
    FormClosed { job_id: JobId },
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Events buffered per subscriber before the slowest one starts lagging.
const EVENT_BUFFER: usize = 1024;

/// Fan-out hub between the tracker and the UI shell.
///
/// ```rust
/// use fwtrack_events::bus::{EventBus, Severity};
///
/// let events = EventBus::default();
/// let _shell = events.subscribe();
/// events.notify("Upgrade finished", Severity::Success);
/// ```
pub struct EventBus {
    sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
    /// A subscriber that falls more than `buffer` events behind skips the
    /// oldest ones and sees `RecvError::Lagged`.
    pub fn new(buffer: usize) -> Self {
        Self {
            sender: broadcast::channel(buffer).0,
        }
    }

    /// Send `event` to every subscriber. Dropped when nobody listens.
    pub fn publish(&self, event: TrackerEvent) {
        if self.sender.send(event).is_err() {
            tracing::trace!("Tracker event published without subscribers");
        }
    }

    /// Publish a user-facing notification.
    pub fn notify(&self, message: impl Into<String>, severity: Severity) {
        let notification = Notification::new(message, severity);
        tracing::debug!(
            severity = ?notification.severity,
            message = %notification.message,
            "Notification",
        );
        self.publish(TrackerEvent::Notification(notification));
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUFFER)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
