//! Per-job visual indicator.
//!
//! An [`IndicatorController`] renders a job's `(progress, status)` pair
//! into one of four display states and tells the UI shell about changes
//! through the [`EventBus`]. It holds no reference to the job entity
//! itself; the registry pushes fresh values on every poll.

use std::sync::Arc;

use fwtrack_core::job::{JobEntity, JobStatus, PROGRESS_COMPLETE};
use fwtrack_core::types::JobId;
use fwtrack_events::{EventBus, IndicatorState, IndicatorView, JobAction, JobDetail, TrackerEvent};

/// Label drawn for completed jobs.
pub const COMPLETED_GLYPH: &str = "✔";

/// Label drawn for failed jobs.
pub const FAILED_GLYPH: &str = "❕";

/// Map a job's progress and status to its display state.
///
/// The progress sentinel wins over whatever status the gateway reports.
pub fn render_state(progress: u8, status: JobStatus) -> IndicatorState {
    if progress == PROGRESS_COMPLETE {
        return IndicatorState::Completed;
    }
    match status {
        JobStatus::Completed => IndicatorState::Completed,
        JobStatus::Failed => IndicatorState::Failed,
        JobStatus::Stopped => IndicatorState::Stopped,
        JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => IndicatorState::Active,
    }
}

/// Text drawn inside the indicator.
pub fn render_label(state: IndicatorState, progress: u8) -> String {
    match state {
        IndicatorState::Completed => COMPLETED_GLYPH.to_string(),
        IndicatorState::Failed => FAILED_GLYPH.to_string(),
        IndicatorState::Active | IndicatorState::Stopped => format!("{progress}%"),
    }
}

/// Progress as shown in the detail view.
pub fn progress_text(progress: u8) -> String {
    if progress == PROGRESS_COMPLETE {
        "completed ✓".to_string()
    } else {
        format!("{progress}%")
    }
}

/// Build the detail view of `job`.
///
/// `stop` is only offered while the job is active; `untrack` always is.
pub fn job_detail(job: &JobEntity) -> JobDetail {
    let mut actions = Vec::with_capacity(2);
    if job.is_active() {
        actions.push(JobAction::Stop);
    }
    actions.push(JobAction::Untrack);

    JobDetail {
        job: job.clone(),
        progress_text: progress_text(job.progress),
        actions,
    }
}

/// The on-screen indicator of one visible job.
pub struct IndicatorController {
    job_id: JobId,
    title: String,
    state: IndicatorState,
    label: String,
    events: Arc<EventBus>,
}

impl IndicatorController {
    /// Attach a new indicator for `job` and announce it.
    pub fn mount(job: &JobEntity, events: Arc<EventBus>) -> Self {
        let state = render_state(job.progress, job.status);
        let controller = Self {
            job_id: job.id.clone(),
            title: job.server_name.clone(),
            state,
            label: render_label(state, job.progress),
            events,
        };
        tracing::debug!(job_id = %controller.job_id, state = ?state, "Indicator mounted");
        controller
            .events
            .publish(TrackerEvent::IndicatorMounted(controller.view()));
        controller
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn state(&self) -> IndicatorState {
        self.state
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current rendering as sent to the UI shell.
    pub fn view(&self) -> IndicatorView {
        IndicatorView {
            job_id: self.job_id.clone(),
            title: self.title.clone(),
            state: self.state,
            label: self.label.clone(),
        }
    }

    /// Re-render from fresh values.
    ///
    /// Publishes `IndicatorUpdated` and returns `true` only if the state
    /// or label changed.
    pub fn update(&mut self, progress: u8, status: JobStatus) -> bool {
        let state = render_state(progress, status);
        let label = render_label(state, progress);
        if state == self.state && label == self.label {
            return false;
        }

        self.state = state;
        self.label = label;
        self.events
            .publish(TrackerEvent::IndicatorUpdated(self.view()));
        true
    }

    /// The user picked this indicator: open the job's detail view.
    pub fn select(&self, job: &JobEntity) -> JobDetail {
        let detail = job_detail(job);
        self.events
            .publish(TrackerEvent::DetailOpened(detail.clone()));
        detail
    }

    /// Detach the indicator. The job entity is left alone.
    pub fn remove(self) {
        tracing::debug!(job_id = %self.job_id, "Indicator removed");
        self.events.publish(TrackerEvent::IndicatorUnmounted {
            job_id: self.job_id,
        });
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
