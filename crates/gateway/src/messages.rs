//! Wire types exchanged with the backend automation API.
//!
//! Job listings arrive as raw rows of the backend job store, so the
//! deserializers here are lenient: booleans may be stored as `0`/`1`,
//! progress may be any number, and the template column is spelled
//! `tamplate` in older schemas.

use std::collections::BTreeMap;

use fwtrack_core::job::{JobMetadata, JobStatus, JobUpdate, PROGRESS_COMPLETE};
use fwtrack_core::types::JobId;
use serde::{Deserialize, Deserializer, Serialize};

use crate::gateway::GatewayError;

/// Automation type used for firmware upgrades.
pub const AUTOMATION_TYPE_SERVER_UPGRADE: &str = "server_upgrade";

/// Envelope `status` value for a successful call.
const STATUS_SUCCESS: &str = "success";

// ---------------------------------------------------------------------------
// Job listing
// ---------------------------------------------------------------------------

/// One job row as reported by `list_jobs`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RemoteJobData {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, rename = "isTracked", deserialize_with = "deserialize_flag")]
    pub is_tracked: bool,
    #[serde(default)]
    pub automation_type: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default, alias = "tamplate")]
    pub template: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_flag")]
    pub force_direct_upgrade: Option<bool>,
    #[serde(default)]
    pub intermediate_version: Option<String>,
}

/// Remote jobs keyed by id.
pub type RemoteSnapshot = BTreeMap<JobId, RemoteJobData>;

impl From<RemoteJobData> for JobUpdate {
    /// Every lifecycle field is overwritten; `visible` is never touched.
    fn from(remote: RemoteJobData) -> Self {
        JobUpdate {
            server_name: Some(remote.server_name),
            status: Some(remote.status),
            progress: Some(remote.progress),
            message: Some(remote.message.unwrap_or_default()),
            error: Some(remote.error),
            visible: None,
            metadata: JobMetadata {
                automation_type: remote.automation_type,
                serial_number: remote.serial_number,
                template: remote.template,
                data: remote.data,
                user_id: remote.user_id,
                force_direct_upgrade: remote.force_direct_upgrade,
                intermediate_version: remote.intermediate_version,
            },
        }
    }
}

/// Drop rows that are no longer tracked.
pub fn tracked_only(rows: BTreeMap<JobId, RemoteJobData>) -> RemoteSnapshot {
    rows.into_iter().filter(|(_, row)| row.is_tracked).collect()
}

// ---------------------------------------------------------------------------
// Prepare / initiate
// ---------------------------------------------------------------------------

/// Body of the prepare call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepareJobRequest {
    pub automation_type: String,
    pub params: PrepareParams,
}

/// Job parameters for a firmware upgrade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrepareParams {
    pub server_name: String,
    pub serial_number: String,
    /// Target firmware version.
    pub data: String,
    pub force_direct_upgrade: bool,
    pub intermediate_version: Option<String>,
}

impl PrepareJobRequest {
    /// Build a firmware-upgrade prepare request.
    pub fn server_upgrade(params: PrepareParams) -> Self {
        Self {
            automation_type: AUTOMATION_TYPE_SERVER_UPGRADE.to_string(),
            params,
        }
    }
}

/// Response data of a successful prepare call.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreparedJob {
    pub instance_id: JobId,
    #[serde(default)]
    pub server_name: Option<String>,
    /// Everything else the backend echoes back.
    #[serde(flatten)]
    pub echo: serde_json::Map<String, serde_json::Value>,
}

impl PreparedJob {
    /// Lifecycle fields the backend echoed for the new job.
    ///
    /// Only `status`, `progress`, `message` and `error` are read; anything
    /// missing or of the wrong type is left unset.
    pub fn echoed_update(&self) -> JobUpdate {
        let progress = self
            .echo
            .get("progress")
            .and_then(serde_json::Value::as_f64)
            .map(|p| p.clamp(0.0, PROGRESS_COMPLETE as f64).round() as u8);

        JobUpdate {
            status: self
                .echo
                .get("status")
                .and_then(serde_json::Value::as_str)
                .map(JobStatus::parse),
            progress,
            message: self
                .echo
                .get("message")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            error: self
                .echo
                .get("error")
                .and_then(serde_json::Value::as_str)
                .map(|e| Some(e.to_string())),
            ..Default::default()
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct InitiateJobRequest<'a> {
    pub automation_type: &'a str,
    pub instance_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct InstanceRequest<'a> {
    pub instance_id: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct SearchServerRequest<'a> {
    pub search_type: &'a str,
    pub search_term: &'a str,
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// `{status, data, response|message|error}` wrapper used by most endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: String,
    pub data: Option<T>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap the payload of a successful envelope.
    pub fn into_result(self) -> Result<T, GatewayError> {
        if self.status != STATUS_SUCCESS {
            let reason = self
                .error
                .or(self.message)
                .or(self.response)
                .unwrap_or_else(|| format!("status '{}'", self.status));
            return Err(GatewayError::Rejected(reason));
        }
        self.data
            .ok_or_else(|| GatewayError::Decode("success envelope without data".into()))
    }
}

/// Plain acknowledgement returned by the stop and untrack endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct Ack {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Ack {
    /// The backend reports some failures with a 2xx status and an `error` field.
    pub fn into_result(self) -> Result<(), GatewayError> {
        match self.error {
            Some(error) => Err(GatewayError::Rejected(error)),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Lenient deserializers
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl Flag {
    fn truthy(self) -> bool {
        match self {
            Flag::Bool(b) => b,
            Flag::Int(i) => i != 0,
            Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
        }
    }
}

fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.is_some_and(Flag::truthy))
}

fn deserialize_optional_flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Flag>::deserialize(deserializer)?.map(Flag::truthy))
}

/// Clamp any numeric progress into `0..=PROGRESS_COMPLETE`.
fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0);
    Ok(raw.clamp(0.0, PROGRESS_COMPLETE as f64).round() as u8)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const ROW: &str = r#"{
        "instance_id": "A1",
        "user_id": "admin",
        "server_name": "server1",
        "serial_number": "SN123",
        "tamplate": "",
        "data": "4.2.1",
        "status": "running",
        "progress": 40,
        "message": "Upgrading",
        "automation_type": "server_upgrade",
        "isTracked": 1,
        "created_at": "2026-01-01T10:00:00",
        "error": null
    }"#;

    #[test]
    fn parse_store_row() {
        let row: RemoteJobData = serde_json::from_str(ROW).unwrap();
        assert_eq!(row.server_name, "server1");
        assert_eq!(row.status, JobStatus::Running);
        assert_eq!(row.progress, 40);
        assert!(row.is_tracked);
        assert_eq!(row.template.as_deref(), Some(""));
        assert_eq!(row.data, Some(serde_json::json!("4.2.1")));
    }

    #[test]
    fn tracked_flag_accepts_bool_int_and_text() {
        for (raw, expected) in [("true", true), ("0", false), ("\"1\"", true), ("null", false)] {
            let json = format!(r#"{{"isTracked": {raw}}}"#);
            let row: RemoteJobData = serde_json::from_str(&json).unwrap();
            assert_eq!(row.is_tracked, expected, "isTracked = {raw}");
        }
    }

    #[test]
    fn missing_fields_take_defaults() {
        let row: RemoteJobData = serde_json::from_str("{}").unwrap();
        assert_eq!(row.status, JobStatus::Pending);
        assert_eq!(row.progress, 0);
        assert!(!row.is_tracked);
    }

    #[test]
    fn progress_is_clamped() {
        let row: RemoteJobData = serde_json::from_str(r#"{"progress": 250}"#).unwrap();
        assert_eq!(row.progress, PROGRESS_COMPLETE);
        let row: RemoteJobData = serde_json::from_str(r#"{"progress": -3}"#).unwrap();
        assert_eq!(row.progress, 0);
    }

    #[test]
    fn tracked_only_drops_untracked_rows() {
        let rows: BTreeMap<JobId, RemoteJobData> = serde_json::from_str(
            r#"{"A1": {"isTracked": true}, "A2": {"isTracked": false}}"#,
        )
        .unwrap();
        let snapshot = tracked_only(rows);
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["A1"]);
    }

    #[test]
    fn remote_row_converts_to_full_overwrite() {
        let row: RemoteJobData = serde_json::from_str(ROW).unwrap();
        let update = JobUpdate::from(row);
        assert_eq!(update.status, Some(JobStatus::Running));
        assert_eq!(update.error, Some(None));
        assert_eq!(update.message.as_deref(), Some("Upgrading"));
        assert!(update.visible.is_none());
    }

    #[test]
    fn success_envelope_yields_data() {
        let env: ApiEnvelope<PreparedJob> = serde_json::from_str(
            r#"{"status": "success", "data": {"instance_id": "A1", "server_name": "server1", "status": "pending"}}"#,
        )
        .unwrap();
        let prepared = env.into_result().unwrap();
        assert_eq!(prepared.instance_id, "A1");
        assert_eq!(prepared.echo["status"], "pending");
    }

    #[test]
    fn prepare_echo_maps_to_lifecycle_update() {
        let prepared: PreparedJob = serde_json::from_str(
            r#"{"instance_id": "A1", "status": "pending", "progress": 0, "message": "starting", "isTracked": 1}"#,
        )
        .unwrap();
        let update = prepared.echoed_update();
        assert_eq!(update.status, Some(JobStatus::Pending));
        assert_eq!(update.progress, Some(0));
        assert_eq!(update.message.as_deref(), Some("starting"));
        assert!(update.error.is_none());
        assert!(update.visible.is_none());
        assert!(update.server_name.is_none());
    }

    #[test]
    fn prepare_without_echo_changes_nothing() {
        let prepared: PreparedJob = serde_json::from_str(r#"{"instance_id": "A1"}"#).unwrap();
        assert_eq!(prepared.echoed_update(), JobUpdate::default());
    }

    #[test]
    fn error_envelope_is_rejected() {
        let env: ApiEnvelope<PreparedJob> = serde_json::from_str(
            r#"{"status": "error", "response": "missing parameters"}"#,
        )
        .unwrap();
        assert_matches!(env.into_result(), Err(GatewayError::Rejected(m)) if m == "missing parameters");
    }

    #[test]
    fn success_envelope_without_data_is_malformed() {
        let env: ApiEnvelope<PreparedJob> =
            serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        assert_matches!(env.into_result(), Err(GatewayError::Decode(_)));
    }

    #[test]
    fn ack_with_error_is_rejected() {
        let ack: Ack = serde_json::from_str(r#"{"error": "Unexpected error"}"#).unwrap();
        assert_matches!(ack.into_result(), Err(GatewayError::Rejected(_)));
        let ack: Ack = serde_json::from_str(r#"{"message": "ok"}"#).unwrap();
        assert!(ack.into_result().is_ok());
    }

    #[test]
    fn prepare_request_serializes_upgrade_params() {
        let request = PrepareJobRequest::server_upgrade(PrepareParams {
            server_name: "server1".into(),
            serial_number: "SN123".into(),
            data: "3.9".into(),
            force_direct_upgrade: false,
            intermediate_version: Some("4.0".into()),
        });
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["automation_type"], AUTOMATION_TYPE_SERVER_UPGRADE);
        assert_eq!(json["params"]["data"], "3.9");
        assert_eq!(json["params"]["intermediate_version"], "4.0");
    }
}
