#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fwtrack_core::firmware::{FirmwareVersion, SearchCriteria, ServerInfo};
use fwtrack_core::job::JobStatus;
use fwtrack_events::{EventBus, Notification, TrackerEvent};
use fwtrack_gateway::messages::{PrepareJobRequest, PreparedJob, RemoteJobData, RemoteSnapshot};
use fwtrack_gateway::{GatewayError, JobGateway};
use fwtrack_tracker::registry::{JobRegistry, RegistryConfig};
use tokio::sync::broadcast;
use tokio::sync::Notify;
use tokio::time::Instant;

/// In-memory [`JobGateway`] with scriptable failures.
#[derive(Default)]
pub struct FakeGateway {
    pub snapshot: Mutex<RemoteSnapshot>,
    /// Number of upcoming `list_jobs` calls that fail.
    pub list_failures: AtomicUsize,
    /// Simulated latency of `list_jobs`.
    pub list_delay: Mutex<Duration>,
    pub list_calls: Mutex<Vec<Instant>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,

    /// Id returned by `prepare_job`; `None` makes prepare fail.
    pub prepare_id: Mutex<Option<String>>,
    /// Extra fields returned alongside the prepared id.
    pub prepare_echo: Mutex<serde_json::Map<String, serde_json::Value>>,
    pub prepare_requests: Mutex<Vec<PrepareJobRequest>>,

    pub initiate_fails: AtomicBool,
    /// When set, `initiate_job` waits for `initiate_gate` before answering.
    pub hold_initiate: AtomicBool,
    pub initiate_gate: Notify,

    pub stop_fails: AtomicBool,
    pub untrack_fails: AtomicBool,
    pub catalogue: Mutex<Vec<FirmwareVersion>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_remote(&self, id: &str, row: RemoteJobData) {
        self.snapshot.lock().unwrap().insert(id.to_string(), row);
    }

    pub fn list_calls(&self) -> Vec<Instant> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl JobGateway for FakeGateway {
    async fn list_jobs(&self, _user_id: &str) -> Result<RemoteSnapshot, GatewayError> {
        self.list_calls.lock().unwrap().push(Instant::now());
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failing = self
            .list_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(GatewayError::ApiError {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        Ok(self.snapshot.lock().unwrap().clone())
    }

    async fn prepare_job(&self, request: &PrepareJobRequest) -> Result<PreparedJob, GatewayError> {
        self.record("prepare");
        self.prepare_requests.lock().unwrap().push(request.clone());
        match self.prepare_id.lock().unwrap().clone() {
            Some(instance_id) => Ok(PreparedJob {
                instance_id,
                server_name: Some(request.params.server_name.clone()),
                echo: self.prepare_echo.lock().unwrap().clone(),
            }),
            None => Err(GatewayError::Rejected("missing parameters".into())),
        }
    }

    async fn initiate_job(
        &self,
        _automation_type: &str,
        instance_id: &str,
    ) -> Result<(), GatewayError> {
        if self.hold_initiate.load(Ordering::SeqCst) {
            self.initiate_gate.notified().await;
        }
        self.record(format!("initiate:{instance_id}"));
        if self.initiate_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("executor unavailable".into()));
        }
        Ok(())
    }

    async fn stop_job(&self, instance_id: &str) -> Result<(), GatewayError> {
        self.record(format!("stop:{instance_id}"));
        if self.stop_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("Unexpected error".into()));
        }
        Ok(())
    }

    async fn untrack_job(&self, instance_id: &str) -> Result<(), GatewayError> {
        self.record(format!("untrack:{instance_id}"));
        if self.untrack_fails.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected("Unexpected error".into()));
        }
        self.snapshot.lock().unwrap().remove(instance_id);
        Ok(())
    }

    async fn list_firmware_versions(&self) -> Result<Vec<FirmwareVersion>, GatewayError> {
        Ok(self.catalogue.lock().unwrap().clone())
    }

    async fn find_server(
        &self,
        _criteria: SearchCriteria,
        term: &str,
    ) -> Result<ServerInfo, GatewayError> {
        Ok(server(term, "4.1(1a)"))
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

pub fn remote(server_name: &str, status: JobStatus, progress: u8) -> RemoteJobData {
    RemoteJobData {
        server_name: server_name.to_string(),
        status,
        progress,
        is_tracked: true,
        automation_type: Some("server_upgrade".into()),
        ..Default::default()
    }
}

pub fn server(name: &str, version: &str) -> ServerInfo {
    ServerInfo {
        domain: "UCS-DOMAIN".into(),
        usr_lbl: format!("Server {name}"),
        dn: format!("sys/rack-unit-{name}"),
        serial: format!("SN-{name}"),
        name: "lab".into(),
        version: version.into(),
    }
}

pub fn registry_with(gateway: Arc<FakeGateway>) -> (Arc<JobRegistry>, Arc<EventBus>) {
    let events = Arc::new(EventBus::default());
    let registry = Arc::new(JobRegistry::new(
        gateway,
        Arc::clone(&events),
        RegistryConfig::default(),
    ));
    (registry, events)
}

/// Drain every event currently buffered on `rx`.
pub fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn notifications(events: &[TrackerEvent]) -> Vec<Notification> {
    events
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::Notification(n) => Some(n.clone()),
            _ => None,
        })
        .collect()
}
