//! WebSocket client for the progress stream.
//!
//! [`ProgressStreamClient`] holds the connection configuration for the
//! backend's `/ws/agent-logs` endpoint. Call
//! [`ProgressStreamClient::connect`] once per job to obtain a live
//! [`ProgressConnection`].

use std::time::Duration;

use thirdchair_core::types::JobId;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;

/// Path of the progress-stream endpoint, relative to the WebSocket base.
pub const PROGRESS_PATH: &str = "/ws/agent-logs";

/// The raw stream type produced by [`ProgressStreamClient::connect`].
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Configuration handle for the progress stream.
#[derive(Debug, Clone)]
pub struct ProgressStreamClient {
    ws_url: String,
    connect_timeout: Duration,
}

/// A live progress-stream connection owned by one job.
pub struct ProgressConnection {
    /// Job the connection was opened for.
    pub job_id: JobId,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: WsStream,
}

impl std::fmt::Debug for ProgressConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressConnection")
            .field("job_id", &self.job_id)
            .finish_non_exhaustive()
    }
}

impl ProgressStreamClient {
    /// * `ws_url`          - WebSocket base URL, e.g. `ws://host:8000`.
    /// * `connect_timeout` - upper bound on the TCP + handshake phase.
    pub fn new(ws_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            connect_timeout,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.ws_url.clone(), config.connect_timeout)
    }

    /// WebSocket base URL (e.g. `ws://host:8000`).
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Full stream URL for a job. The job id is appended as a query
    /// parameter so a backend that supports it can tag or filter events.
    pub fn stream_url(&self, job_id: JobId) -> String {
        format!("{}{}?job_id={}", self.ws_url, PROGRESS_PATH, job_id)
    }

    /// Connect to the progress-stream endpoint for `job_id`.
    pub async fn connect(&self, job_id: JobId) -> Result<ProgressConnection, StreamError> {
        let url = self.stream_url(job_id);

        let connecting = tokio::time::timeout(self.connect_timeout, connect_async(&url));
        let (ws_stream, _response) = connecting
            .await
            .map_err(|_| StreamError::Timeout(self.connect_timeout))?
            .map_err(|e| {
                StreamError::Connection(format!(
                    "Failed to connect to progress stream at {}: {e}",
                    self.ws_url
                ))
            })?;

        tracing::info!(job_id = %job_id, "Connected to progress stream at {}", self.ws_url);

        Ok(ProgressConnection { job_id, ws_stream })
    }
}

/// Errors that can occur when opening the progress stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The handshake did not finish within the connect timeout.
    #[error("Connection timed out after {0:?}")]
    Timeout(Duration),
}
