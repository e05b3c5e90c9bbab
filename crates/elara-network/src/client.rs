//! Thin HTTP client mirroring the server's endpoints. Transport failures
//! surface as `ElaraError::Transport`; callers treat them as advisory, not
//! fatal — a dead peer is a fact, not an emergency.

use std::time::Duration;

use elara_core::constants::HTTP_TIMEOUT_SECS;
use elara_core::types::Timestamp;
use elara_core::ElaraError;

use crate::types::{
    AttestationsResponse, ErrorResponse, RecordSummary, RecordsResponse, StatusResponse,
    SubmitResponse, WitnessResponse,
};

pub struct NetworkClient {
    client: reqwest::Client,
}

impl Default for NetworkClient {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .expect("reqwest client construction is infallible"),
        }
    }

    fn base(host: &str, port: u16) -> String {
        format!("http://{host}:{port}")
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ElaraError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ElaraError::Transport(e.to_string()));
        }
        let reason = response
            .json::<ErrorResponse>()
            .await
            .map(|e| e.error)
            .unwrap_or_else(|_| status.to_string());
        Err(ElaraError::PeerRejected {
            status: status.as_u16(),
            reason,
        })
    }

    pub async fn get_status(&self, host: &str, port: u16) -> Result<StatusResponse, ElaraError> {
        let response = self
            .client
            .get(format!("{}/status", Self::base(host, port)))
            .send()
            .await
            .map_err(|e| ElaraError::Transport(e.to_string()))?;
        Self::parse(response).await
    }

    /// POST raw record wire bytes to a peer.
    pub async fn submit_record(
        &self,
        host: &str,
        port: u16,
        wire: Vec<u8>,
    ) -> Result<SubmitResponse, ElaraError> {
        let response = self
            .client
            .post(format!("{}/records", Self::base(host, port)))
            .body(wire)
            .send()
            .await
            .map_err(|e| ElaraError::Transport(e.to_string()))?;
        Self::parse(response).await
    }

    pub async fn query_records(
        &self,
        host: &str,
        port: u16,
        since: Option<Timestamp>,
        limit: usize,
    ) -> Result<Vec<RecordSummary>, ElaraError> {
        let mut request = self
            .client
            .get(format!("{}/records", Self::base(host, port)))
            .query(&[("limit", limit.to_string())]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_string())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ElaraError::Transport(e.to_string()))?;
        let body: RecordsResponse = Self::parse(response).await?;
        Ok(body.records)
    }

    /// Ask a peer to counter-sign a record's wire bytes.
    pub async fn request_witness(
        &self,
        host: &str,
        port: u16,
        wire: Vec<u8>,
    ) -> Result<WitnessResponse, ElaraError> {
        let response = self
            .client
            .post(format!("{}/witness", Self::base(host, port)))
            .body(wire)
            .send()
            .await
            .map_err(|e| ElaraError::Transport(e.to_string()))?;
        Self::parse(response).await
    }

    pub async fn query_attestations(
        &self,
        host: &str,
        port: u16,
        record_id: &str,
    ) -> Result<AttestationsResponse, ElaraError> {
        let response = self
            .client
            .get(format!("{}/attestations", Self::base(host, port)))
            .query(&[("record_id", record_id)])
            .send()
            .await
            .map_err(|e| ElaraError::Transport(e.to_string()))?;
        Self::parse(response).await
    }
}
