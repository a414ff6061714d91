//! Two-phase job start: prepare synchronously, initiate in the background.
//!
//! A job only becomes visible once the backend has accepted the prepare
//! call. The initiate call runs as a spawned task whose outcome is
//! recorded on the entity as a [`StartPhase`]; its failure never hides
//! the job or changes its status.

use std::sync::Arc;

use fwtrack_core::firmware::{FirmwareVersion, SearchCriteria, ServerInfo};
use fwtrack_core::job::{JobEntity, JobMetadata, StartPhase};
use fwtrack_core::types::JobId;
use fwtrack_core::upgrade::{self, SubmissionBlock, UpgradePlan, UpgradeSelection};
use fwtrack_events::{EventBus, Severity, TrackerEvent};
use fwtrack_gateway::messages::{PrepareJobRequest, PrepareParams, AUTOMATION_TYPE_SERVER_UPGRADE};
use fwtrack_gateway::{GatewayError, JobGateway};
use tokio::task::JoinHandle;

use crate::registry::JobRegistry;

/// A firmware upgrade the user asked for.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub server: ServerInfo,
    pub target_version: String,
    pub selection: UpgradeSelection,
}

/// Why a start attempt produced no job.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The request did not pass the submission guard.
    #[error("Upgrade not allowed: {0}")]
    Blocked(#[from] SubmissionBlock),

    /// The firmware catalogue could not be loaded for planning.
    #[error("Failed to load firmware versions: {0}")]
    Catalogue(#[source] GatewayError),

    /// The backend refused or failed the prepare call.
    #[error("Failed to create upgrade job: {0}")]
    Prepare(#[source] GatewayError),
}

/// A job whose prepare call succeeded.
#[derive(Debug)]
pub struct StartedJob {
    pub job_id: JobId,
    /// Resolves to the final start phase once initiate returns. May be
    /// dropped; the task keeps running.
    pub initiate: JoinHandle<StartPhase>,
}

/// Drives the prepare/initiate sequence and hands new jobs to the registry.
pub struct StartOrchestrator {
    gateway: Arc<dyn JobGateway>,
    registry: Arc<JobRegistry>,
    events: Arc<EventBus>,
}

impl StartOrchestrator {
    pub fn new(
        gateway: Arc<dyn JobGateway>,
        registry: Arc<JobRegistry>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            gateway,
            registry,
            events,
        }
    }

    /// Look a server up in the inventory.
    pub async fn find_server(
        &self,
        criteria: SearchCriteria,
        term: &str,
    ) -> Result<ServerInfo, GatewayError> {
        self.gateway.find_server(criteria, term).await
    }

    /// The firmware catalogue offered as upgrade targets.
    pub async fn firmware_versions(&self) -> Result<Vec<FirmwareVersion>, GatewayError> {
        self.gateway.list_firmware_versions().await
    }

    /// Plan an upgrade of `server` to `target_version` against the current
    /// catalogue.
    pub async fn plan(
        &self,
        server: &ServerInfo,
        target_version: &str,
    ) -> Result<UpgradePlan, GatewayError> {
        let catalogue = self.firmware_versions().await?;
        Ok(upgrade::plan_from_catalogue(&server.version, target_version, &catalogue))
    }

    /// Start a firmware upgrade.
    ///
    /// Returns once the job is prepared and registered. The initiate call
    /// continues in the background.
    pub async fn start(&self, request: StartRequest) -> Result<StartedJob, StartError> {
        let server_name = request.server.server_name().to_string();

        let plan = self
            .plan(&request.server, &request.target_version)
            .await
            .map_err(StartError::Catalogue)?;
        let has_active = self.registry.has_active_job_for(&server_name).await;
        upgrade::check_submission(&plan, &request.selection, has_active)?;

        let effective = plan.with_force_direct(request.selection.force_direct);
        let intermediate_version = if effective.intermediate_version_required {
            request.selection.intermediate().map(str::to_string)
        } else {
            None
        };

        let prepare = PrepareJobRequest::server_upgrade(PrepareParams {
            server_name: server_name.clone(),
            serial_number: request.server.serial.clone(),
            data: request.target_version.clone(),
            force_direct_upgrade: effective.forced_direct,
            intermediate_version: intermediate_version.clone(),
        });

        let prepared = match self.gateway.prepare_job(&prepare).await {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(server_name = %server_name, error = %e, "Prepare failed");
                self.events
                    .notify(format!("Failed to create upgrade job: {e}"), Severity::Error);
                return Err(StartError::Prepare(e));
            }
        };

        let job_id = prepared.instance_id.clone();
        let mut entity = JobEntity::new(
            job_id.clone(),
            prepared.server_name.clone().unwrap_or_else(|| server_name.clone()),
        );
        entity.metadata = JobMetadata {
            automation_type: Some(prepare.automation_type.clone()),
            serial_number: Some(request.server.serial.clone()),
            template: None,
            data: Some(serde_json::Value::String(request.target_version.clone())),
            user_id: Some(self.registry.config().user_id.clone()),
            force_direct_upgrade: Some(effective.forced_direct),
            intermediate_version,
        };
        entity.update(prepared.echoed_update());
        entity.start_phase = Some(StartPhase::Prepared);

        self.registry.insert_started(entity).await;
        self.events.publish(TrackerEvent::FormClosed {
            job_id: job_id.clone(),
        });
        self.events.notify(
            format!("Upgrade of {server_name} to {} created", request.target_version),
            Severity::Success,
        );

        let initiate = self.spawn_initiate(job_id.clone(), server_name);
        Ok(StartedJob { job_id, initiate })
    }

    // ---- private helpers ----

    fn spawn_initiate(&self, job_id: JobId, server_name: String) -> JoinHandle<StartPhase> {
        let gateway = Arc::clone(&self.gateway);
        let registry = Arc::clone(&self.registry);
        let events = Arc::clone(&self.events);

        tokio::spawn(async move {
            let phase = match gateway
                .initiate_job(AUTOMATION_TYPE_SERVER_UPGRADE, &job_id)
                .await
            {
                Ok(()) => {
                    tracing::info!(job_id = %job_id, "Job initiated");
                    StartPhase::Initiated
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Initiate failed");
                    events.notify(
                        format!("Upgrade job on {server_name} created but failed to start: {e}"),
                        Severity::Warning,
                    );
                    StartPhase::InitiateFailed
                }
            };
            registry.set_start_phase(&job_id, phase).await;
            phase
        })
    }
}
