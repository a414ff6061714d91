//! The [`JobGateway`] trait and its error type.

use async_trait::async_trait;
use fwtrack_core::firmware::{FirmwareVersion, SearchCriteria, ServerInfo};

use crate::messages::{PrepareJobRequest, PreparedJob, RemoteSnapshot};

/// Errors from the remote job gateway.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Job gateway API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The backend answered but refused the operation.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The response body did not have the expected shape.
    #[error("Malformed response: {0}")]
    Decode(String),
}

/// Operations the tracker needs from the backend job store.
///
/// Implementations must be cheap to share behind an `Arc`.
#[async_trait]
pub trait JobGateway: Send + Sync {
    /// All jobs `user_id` still tracks, keyed by job id.
    async fn list_jobs(&self, user_id: &str) -> Result<RemoteSnapshot, GatewayError>;

    /// Register a new job. Must succeed before the job can be initiated.
    async fn prepare_job(&self, request: &PrepareJobRequest) -> Result<PreparedJob, GatewayError>;

    /// Ask the backend to begin executing a prepared job.
    async fn initiate_job(&self, automation_type: &str, instance_id: &str)
        -> Result<(), GatewayError>;

    async fn stop_job(&self, instance_id: &str) -> Result<(), GatewayError>;

    /// Stop tracking a job server-side; it disappears from `list_jobs`.
    async fn untrack_job(&self, instance_id: &str) -> Result<(), GatewayError>;

    async fn list_firmware_versions(&self) -> Result<Vec<FirmwareVersion>, GatewayError>;

    /// Look a server up in the inventory.
    async fn find_server(
        &self,
        criteria: SearchCriteria,
        term: &str,
    ) -> Result<ServerInfo, GatewayError>;
}
