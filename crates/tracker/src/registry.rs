//! Job registry: the single owner of all known job entities.
//!
//! [`JobRegistry`] polls the [`JobGateway`] on a self re-arming schedule,
//! reconciles each snapshot into local [`JobEntity`] values, drives one
//! [`IndicatorController`] per visible job, and hides old inactive jobs.
//!
//! Entities are never deleted; they are only hidden. Shared via
//! `Arc<JobRegistry>`; nothing about it is global.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fwtrack_core::job::{JobEntity, JobStatus, JobUpdate, StartPhase};
use fwtrack_core::types::{JobId, Timestamp};
use fwtrack_events::{EventBus, JobDetail, Severity};
use fwtrack_gateway::messages::RemoteSnapshot;
use fwtrack_gateway::{GatewayError, JobGateway};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::indicator::IndicatorController;

/// Consecutive failed polls before the user is notified.
pub const SUSTAINED_FAILURE_POLLS: u32 = 2;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Polling and retention settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// User whose tracked jobs are listed.
    pub user_id: String,
    /// Delay before the next poll after a successful one.
    pub poll_interval: Duration,
    /// Delay before the next poll after a failed one.
    pub poll_backoff: Duration,
    /// Inactive jobs older than this are hidden.
    pub retention: chrono::Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            user_id: "admin".into(),
            poll_interval: Duration::from_secs(10),
            poll_backoff: Duration::from_secs(30),
            retention: chrono::Duration::days(7),
        }
    }
}

// ---------------------------------------------------------------------------
// Reconciliation outcome
// ---------------------------------------------------------------------------

/// A status change observed during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTransition {
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
}

/// What one reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Jobs seen for the first time, in snapshot order.
    pub created: Vec<JobId>,
    /// Jobs that already existed and were merged.
    pub updated: Vec<JobId>,
    /// Status changes of existing jobs.
    pub transitions: Vec<StatusTransition>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from user-triggered registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// No entity with this id is known.
    #[error("Job {0} not found")]
    JobNotFound(JobId),

    /// The operation needs a pending or running job.
    #[error("Job {id} is not active (status: {status})")]
    NotActive { id: JobId, status: JobStatus },

    /// The job has been hidden and has no indicator.
    #[error("Job {0} is not visible")]
    NotVisible(JobId),

    /// The remote call failed; local state is unchanged.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

// ---------------------------------------------------------------------------
// JobRegistry
// ---------------------------------------------------------------------------

/// Owns every [`JobEntity`] and the indicators of the visible ones.
///
/// Lock order is always `jobs` before `indicators`. Neither lock is held
/// across a gateway call.
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, JobEntity>>,
    indicators: RwLock<HashMap<JobId, IndicatorController>>,
    gateway: Arc<dyn JobGateway>,
    events: Arc<EventBus>,
    config: RegistryConfig,
    failed_polls: AtomicU32,
}

impl JobRegistry {
    pub fn new(gateway: Arc<dyn JobGateway>, events: Arc<EventBus>, config: RegistryConfig) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            indicators: RwLock::new(HashMap::new()),
            gateway,
            events,
            config,
            failed_polls: AtomicU32::new(0),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    // ---- read interface ----

    pub async fn get(&self, id: &str) -> Option<JobEntity> {
        self.jobs.read().await.get(id).cloned()
    }

    /// All entities, visible or not, ordered by creation time then id.
    pub async fn snapshot(&self) -> Vec<JobEntity> {
        let mut jobs: Vec<JobEntity> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        jobs
    }

    /// Ids of jobs that currently have an indicator, sorted.
    pub async fn visible_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.visible)
            .map(|job| job.id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Whether `server_name` already has a pending or running job.
    pub async fn has_active_job_for(&self, server_name: &str) -> bool {
        self.jobs
            .read()
            .await
            .values()
            .any(|job| job.is_active() && job.server_name == server_name)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    // ---- reconciliation ----

    /// Merge a remote snapshot into the local entities.
    ///
    /// Existing entities are overwritten field by field but keep their
    /// `visible` flag; unknown ids become new visible entities. Entities
    /// missing from the snapshot are left alone.
    pub async fn reconcile(&self, snapshot: RemoteSnapshot) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let mut finished = Vec::new();

        {
            let mut jobs = self.jobs.write().await;
            for (id, remote) in snapshot {
                let update = JobUpdate::from(remote);

                match jobs.get_mut(&id) {
                    Some(job) => {
                        let previous = job.status;
                        let visible = job.visible;
                        job.update(update);
                        job.visible = visible;
                        job.relabel_user_cancellation();

                        if job.status != previous {
                            tracing::info!(
                                job_id = %id,
                                from = %previous,
                                to = %job.status,
                                "Job status changed",
                            );
                            if job.visible && job.is_terminal() {
                                finished.push(job.clone());
                            }
                            outcome.transitions.push(StatusTransition {
                                job_id: id.clone(),
                                from: previous,
                                to: job.status,
                            });
                        }
                        outcome.updated.push(id);
                    }
                    None => {
                        let mut job = JobEntity::new(id.clone(), String::new());
                        job.update(update);
                        job.visible = true;
                        job.relabel_user_cancellation();
                        tracing::info!(job_id = %id, status = %job.status, "Discovered tracked job");
                        jobs.insert(id.clone(), job);
                        outcome.created.push(id);
                    }
                }
            }
        }

        for job in &finished {
            self.notify_finished(job);
        }
        outcome
    }

    /// Fetch the remote snapshot, reconcile it and refresh indicators.
    ///
    /// A failure leaves every entity as it was. An error notification is
    /// published once the failures reach [`SUSTAINED_FAILURE_POLLS`] in a
    /// row; a successful poll resets the count.
    pub async fn poll(&self) -> Result<ReconcileOutcome, RegistryError> {
        let snapshot = match self.gateway.list_jobs(&self.config.user_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let failed = self.failed_polls.fetch_add(1, Ordering::SeqCst).saturating_add(1);
                tracing::warn!(error = %e, consecutive = failed, "Failed to fetch tracked jobs");
                if failed == SUSTAINED_FAILURE_POLLS {
                    self.events
                        .notify(format!("Failed to refresh automation jobs: {e}"), Severity::Error);
                }
                return Err(e.into());
            }
        };
        self.failed_polls.store(0, Ordering::SeqCst);

        let outcome = self.reconcile(snapshot).await;
        self.refresh_indicators().await;
        Ok(outcome)
    }

    /// Poll until `cancel` fires.
    ///
    /// Each cycle sweeps retention, polls, then sleeps for the poll
    /// interval (or the backoff after a failure). The next cycle only
    /// starts once the previous poll has returned.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            user_id = %self.config.user_id,
            interval_secs = self.config.poll_interval.as_secs(),
            backoff_secs = self.config.poll_backoff.as_secs(),
            "Job polling started",
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.retention_sweep().await;

            let delay = match self.poll().await {
                Ok(outcome) => {
                    tracing::debug!(
                        created = outcome.created.len(),
                        updated = outcome.updated.len(),
                        transitions = outcome.transitions.len(),
                        "Poll complete",
                    );
                    self.config.poll_interval
                }
                Err(_) => self.config.poll_backoff,
            };

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("Job polling stopped");
    }

    // ---- retention ----

    /// Hide inactive jobs older than the retention period.
    pub async fn retention_sweep(&self) -> Vec<JobId> {
        self.retention_sweep_at(Utc::now()).await
    }

    /// [`retention_sweep`](Self::retention_sweep) against a fixed clock.
    pub async fn retention_sweep_at(&self, now: Timestamp) -> Vec<JobId> {
        let mut hidden = Vec::new();
        {
            let mut jobs = self.jobs.write().await;
            for job in jobs.values_mut() {
                if job.visible && !job.is_active() && job.age(now) > self.config.retention {
                    job.visible = false;
                    hidden.push(job.id.clone());
                }
            }
        }

        if !hidden.is_empty() {
            let mut indicators = self.indicators.write().await;
            for id in &hidden {
                if let Some(controller) = indicators.remove(id) {
                    controller.remove();
                }
            }
            tracing::info!(count = hidden.len(), "Retention: hid old jobs");
        }
        hidden
    }

    // ---- user actions ----

    /// Dismiss a job's indicator. The entity stays in the registry.
    pub async fn hide(&self, id: &str) -> Result<(), RegistryError> {
        {
            let mut jobs = self.jobs.write().await;
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| RegistryError::JobNotFound(id.to_string()))?;
            job.visible = false;
        }

        if let Some(controller) = self.indicators.write().await.remove(id) {
            controller.remove();
        }
        tracing::debug!(job_id = %id, "Job hidden");
        Ok(())
    }

    /// Stop tracking a job on the backend, then hide it.
    ///
    /// On failure the job keeps its indicator and the error is returned.
    pub async fn untrack(&self, id: &str) -> Result<(), RegistryError> {
        let job = self.require(id).await?;

        if let Err(e) = self.gateway.untrack_job(id).await {
            tracing::warn!(job_id = %id, error = %e, "Failed to untrack job");
            self.events
                .notify(format!("Failed to untrack {}: {e}", job.server_name), Severity::Error);
            return Err(e.into());
        }

        self.hide(id).await?;
        self.events.notify(
            format!("Stopped tracking the job on {}", job.server_name),
            Severity::Success,
        );
        Ok(())
    }

    /// Ask the backend to stop a pending or running job.
    ///
    /// The local status is not touched; the next poll reports the change.
    pub async fn stop(&self, id: &str) -> Result<(), RegistryError> {
        let job = self.require(id).await?;
        if !job.is_active() {
            return Err(RegistryError::NotActive {
                id: job.id,
                status: job.status,
            });
        }

        match self.gateway.stop_job(id).await {
            Ok(()) => {
                tracing::info!(job_id = %id, "Stop requested");
                self.events.notify(
                    format!("Stop requested for the job on {}", job.server_name),
                    Severity::Success,
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(job_id = %id, error = %e, "Failed to stop job");
                self.events
                    .notify(format!("Failed to stop {}: {e}", job.server_name), Severity::Error);
                Err(e.into())
            }
        }
    }

    /// Open the detail view of a visible job.
    pub async fn select(&self, id: &str) -> Result<JobDetail, RegistryError> {
        let jobs = self.jobs.read().await;
        let job = jobs
            .get(id)
            .ok_or_else(|| RegistryError::JobNotFound(id.to_string()))?;

        let indicators = self.indicators.read().await;
        let controller = indicators
            .get(id)
            .ok_or_else(|| RegistryError::NotVisible(id.to_string()))?;
        Ok(controller.select(job))
    }

    // ---- start orchestration hooks ----

    /// Register a job started from this client and mount its indicator.
    ///
    /// If a poll already discovered the same id, only the local start
    /// state and the request metadata are merged into it.
    pub async fn insert_started(&self, entity: JobEntity) {
        let id = entity.id.clone();
        let mut jobs = self.jobs.write().await;
        let job = match jobs.entry(id.clone()) {
            Entry::Occupied(occupied) => {
                let existing = occupied.into_mut();
                existing.start_phase = entity.start_phase;
                existing.metadata.merge(entity.metadata);
                existing
            }
            Entry::Vacant(vacant) => vacant.insert(entity),
        };

        if job.visible {
            let mut indicators = self.indicators.write().await;
            if !indicators.contains_key(&id) {
                let controller = IndicatorController::mount(job, Arc::clone(&self.events));
                indicators.insert(id.clone(), controller);
            }
        }
        tracing::info!(job_id = %id, "Started job registered");
    }

    /// Record the outcome of a background initiate call.
    pub async fn set_start_phase(&self, id: &str, phase: StartPhase) {
        if let Some(job) = self.jobs.write().await.get_mut(id) {
            job.start_phase = Some(phase);
        }
    }

    // ---- private helpers ----

    async fn require(&self, id: &str) -> Result<JobEntity, RegistryError> {
        self.get(id)
            .await
            .ok_or_else(|| RegistryError::JobNotFound(id.to_string()))
    }

    /// Push `(progress, status)` of every visible job to its indicator,
    /// mounting indicators on first sight.
    async fn refresh_indicators(&self) {
        let jobs = self.jobs.read().await;
        let mut indicators = self.indicators.write().await;

        for job in jobs.values().filter(|job| job.visible) {
            match indicators.get_mut(&job.id) {
                Some(controller) => {
                    controller.update(job.progress, job.status);
                }
                None => {
                    let controller = IndicatorController::mount(job, Arc::clone(&self.events));
                    indicators.insert(job.id.clone(), controller);
                }
            }
        }
    }

    fn notify_finished(&self, job: &JobEntity) {
        let (message, severity) = match job.status {
            JobStatus::Completed => (
                format!("Upgrade completed on {}", job.server_name),
                Severity::Success,
            ),
            JobStatus::Failed => (
                format!(
                    "Upgrade failed on {}: {}",
                    job.server_name,
                    job.error.as_deref().unwrap_or("unknown error"),
                ),
                Severity::Error,
            ),
            JobStatus::Stopped => (
                format!("Upgrade stopped on {}", job.server_name),
                Severity::Warning,
            ),
            JobStatus::Pending | JobStatus::Running | JobStatus::Unknown => return,
        };
        self.events.notify(message, severity);
    }
}
