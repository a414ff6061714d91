//! REST implementation of [`JobGateway`] over the backend automation API.
//!
//! Wraps the `/api/automations/*` endpoints using [`reqwest`].

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use fwtrack_core::firmware::{FirmwareVersion, SearchCriteria, ServerInfo};
use fwtrack_core::types::JobId;

use crate::gateway::{GatewayError, JobGateway};
use crate::messages::{
    tracked_only, Ack, ApiEnvelope, InitiateJobRequest, InstanceRequest, PrepareJobRequest,
    PreparedJob, RemoteJobData, RemoteSnapshot, SearchServerRequest,
};

/// Path prefix shared by every automation endpoint.
const API_PREFIX: &str = "/api/automations";

/// HTTP client for the backend automation API.
pub struct HttpJobGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobGateway {
    /// Create a gateway with its own connection pool.
    ///
    /// * `base_url`        - Backend origin, e.g. `http://host:5000`.
    /// * `request_timeout` - Upper bound on every individual request.
    pub fn new(base_url: String, request_timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Create a gateway reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{API_PREFIX}/{path}", self.base_url)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`GatewayError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(GatewayError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a `{status, data, ...}` envelope.
    ///
    /// The backend sends envelopes with 4xx codes too, so the body is read
    /// before the status code is considered.
    async fn parse_envelope<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        let body = response.text().await?;
        match serde_json::from_str::<ApiEnvelope<T>>(&body) {
            Ok(envelope) => envelope.into_result(),
            Err(_) if !status.is_success() => Err(GatewayError::ApiError {
                status: status.as_u16(),
                body,
            }),
            Err(e) => Err(GatewayError::Decode(e.to_string())),
        }
    }

    /// Parse a plain `{message|error}` acknowledgement.
    async fn parse_ack(response: reqwest::Response) -> Result<(), GatewayError> {
        let response = Self::ensure_success(response).await?;
        let ack = response.json::<Ack>().await?;
        ack.into_result()
    }
}

#[async_trait]
impl JobGateway for HttpJobGateway {
    async fn list_jobs(&self, user_id: &str) -> Result<RemoteSnapshot, GatewayError> {
        let response = self
            .client
            .get(self.endpoint("list"))
            .query(&[("user_id", user_id)])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let rows = response.json::<BTreeMap<JobId, RemoteJobData>>().await?;
        let snapshot = tracked_only(rows);
        tracing::debug!(user_id, count = snapshot.len(), "Fetched tracked jobs");
        Ok(snapshot)
    }

    async fn prepare_job(&self, request: &PrepareJobRequest) -> Result<PreparedJob, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("prepare-automation"))
            .json(request)
            .send()
            .await?;

        let prepared: PreparedJob = Self::parse_envelope(response).await?;
        tracing::info!(
            job_id = %prepared.instance_id,
            automation_type = %request.automation_type,
            server_name = %request.params.server_name,
            "Job prepared",
        );
        Ok(prepared)
    }

    async fn initiate_job(
        &self,
        automation_type: &str,
        instance_id: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint("start-automation"))
            .json(&InitiateJobRequest {
                automation_type,
                instance_id,
            })
            .send()
            .await?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn stop_job(&self, instance_id: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint("stop-automation"))
            .json(&InstanceRequest { instance_id })
            .send()
            .await?;

        Self::parse_ack(response).await
    }

    async fn untrack_job(&self, instance_id: &str) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(self.endpoint("unTrack_automation"))
            .json(&InstanceRequest { instance_id })
            .send()
            .await?;

        Self::parse_ack(response).await
    }

    async fn list_firmware_versions(&self) -> Result<Vec<FirmwareVersion>, GatewayError> {
        let response = self
            .client
            .get(self.endpoint("pull-fw-list-package"))
            .send()
            .await?;

        Self::parse_envelope(response).await
    }

    async fn find_server(
        &self,
        criteria: SearchCriteria,
        term: &str,
    ) -> Result<ServerInfo, GatewayError> {
        let response = self
            .client
            .post(self.endpoint("search_server"))
            .json(&SearchServerRequest {
                search_type: criteria.as_str(),
                search_term: term,
            })
            .send()
            .await?;

        Self::parse_envelope(response).await
    }
}
