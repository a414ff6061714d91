//! Job entity model: the canonical in-memory record of one automation job.
//!
//! A [`JobEntity`] mirrors a row of the remote job store plus two pieces of
//! session-local state (`visible` and `start_phase`) that never travel to
//! the server. Entities are mutated only through [`JobEntity::update`],
//! which performs an unconditional field-wise overwrite.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Progress sentinel reported by the gateway once a job has fully finished.
///
/// Renders as completed regardless of the reported status.
pub const PROGRESS_COMPLETE: u8 = 101;

/// Error-text fragment the backend writes when a user cancels a job.
pub const USER_CANCELLATION_MARKER: &str = "stopped by user";

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Remote lifecycle state of a job.
///
/// Any status string the gateway sends that is not one of the five known
/// values deserializes to [`JobStatus::Unknown`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    /// Parse a raw status string. Unrecognised values map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "stopped" => Self::Stopped,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
            Self::Unknown => "unknown",
        }
    }

    /// `pending` or `running`.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// `completed`, `failed` or `stopped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StartPhase
// ---------------------------------------------------------------------------

/// Local state of the two-phase start saga for jobs started in this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPhase {
    /// Prepare succeeded; the initiate call has not resolved yet.
    Prepared,
    /// The initiate call was accepted by the gateway.
    Initiated,
    /// The initiate call failed. The job exists remotely but may never run.
    InitiateFailed,
}

// ---------------------------------------------------------------------------
// Cancellation relabel
// ---------------------------------------------------------------------------

/// Whether a failure's error text means the user cancelled the job.
///
/// The backend reports user cancellation as a `failed` status with a
/// marker in the error text. This is the single place that heuristic lives.
pub fn is_user_cancellation(error: Option<&str>) -> bool {
    error.is_some_and(|e| e.contains(USER_CANCELLATION_MARKER))
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Server-reported descriptive fields carried alongside the lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    pub automation_type: Option<String>,
    pub serial_number: Option<String>,
    pub template: Option<String>,
    /// Free-form payload. For firmware upgrades this is the target version.
    pub data: Option<serde_json::Value>,
    pub user_id: Option<String>,
    pub force_direct_upgrade: Option<bool>,
    pub intermediate_version: Option<String>,
}

impl JobMetadata {
    /// Overwrite every field that is present in `other`.
    pub fn merge(&mut self, other: JobMetadata) {
        if other.automation_type.is_some() {
            self.automation_type = other.automation_type;
        }
        if other.serial_number.is_some() {
            self.serial_number = other.serial_number;
        }
        if other.template.is_some() {
            self.template = other.template;
        }
        if other.data.is_some() {
            self.data = other.data;
        }
        if other.user_id.is_some() {
            self.user_id = other.user_id;
        }
        if other.force_direct_upgrade.is_some() {
            self.force_direct_upgrade = other.force_direct_upgrade;
        }
        if other.intermediate_version.is_some() {
            self.intermediate_version = other.intermediate_version;
        }
    }
}

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// A partial set of job fields. `None` means "leave as is".
///
/// `error` is doubly optional so an update can explicitly clear it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub server_name: Option<String>,
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub error: Option<Option<String>>,
    pub visible: Option<bool>,
    pub metadata: JobMetadata,
}

// ---------------------------------------------------------------------------
// JobEntity
// ---------------------------------------------------------------------------

/// One automation job as known to this client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobEntity {
    pub id: JobId,
    pub server_name: String,
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub error: Option<String>,
    /// Local construction time, not the server-side creation time.
    pub created_at: Timestamp,
    /// Session-local flag: does this job have an on-screen indicator.
    pub visible: bool,
    pub metadata: JobMetadata,
    /// Only set for jobs started through this client.
    pub start_phase: Option<StartPhase>,
}

impl JobEntity {
    /// Create a pending, visible entity stamped with the current time.
    pub fn new(id: impl Into<JobId>, server_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            server_name: server_name.into(),
            status: JobStatus::Pending,
            progress: 0,
            message: String::new(),
            error: None,
            created_at: Utc::now(),
            visible: true,
            metadata: JobMetadata::default(),
            start_phase: None,
        }
    }

    /// Override the local creation timestamp.
    pub fn with_created_at(mut self, created_at: Timestamp) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the progress sentinel marks this job as fully finished.
    pub fn is_progress_complete(&self) -> bool {
        self.progress == PROGRESS_COMPLETE
    }

    /// Merge every present field of `update` into this entity.
    ///
    /// Overwrites unconditionally, `visible` included. Callers that must
    /// keep `visible` re-apply it afterwards.
    pub fn update(&mut self, update: JobUpdate) {
        if let Some(server_name) = update.server_name {
            self.server_name = server_name;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(message) = update.message {
            self.message = message;
        }
        if let Some(error) = update.error {
            self.error = error;
        }
        if let Some(visible) = update.visible {
            self.visible = visible;
        }
        self.metadata.merge(update.metadata);
    }

    /// Relabel a user-cancelled failure as `stopped`.
    ///
    /// Returns `true` if the status changed.
    pub fn relabel_user_cancellation(&mut self) -> bool {
        if self.status == JobStatus::Failed && is_user_cancellation(self.error.as_deref()) {
            self.status = JobStatus::Stopped;
            true
        } else {
            false
        }
    }

    /// Age of the entity relative to `now`.
    pub fn age(&self, now: Timestamp) -> chrono::Duration {
        now - self.created_at
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
