//! REST API client for the analysis backend.
//!
//! Wraps the backend HTTP endpoints (login, document upload, chat,
//! analysis submission and report post-processing) using [`reqwest`].

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thirdchair_core::error::CoreError;
use thirdchair_core::session::Credentials;
use thirdchair_core::staging::StagedFile;

use crate::config::ClientConfig;

/// Multipart field name under which every document is sent.
const FILES_FIELD: &str = "files";

/// HTTP client for one backend instance.
#[derive(Debug, Clone)]
pub struct AnalysisApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response of `POST /login`.
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
}

/// Response of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub response: Option<String>,
}

/// Response of the report post-processing endpoints.
#[derive(Debug, Deserialize)]
pub struct ProcessResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub processed_report: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Errors from the REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend error ({status}): {}", message.as_deref().unwrap_or("<no detail>"))]
    Status {
        status: u16,
        /// Server-supplied `detail` / `error` text, if any.
        message: Option<String>,
    },

    /// A 2xx body could not be decoded into the expected shape.
    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether retrying the same idempotent call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(e) => e.is_timeout() || e.is_connect(),
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) => false,
        }
    }

    /// Convert into a user-facing [`CoreError::Request`].
    ///
    /// The server's message wins when present; otherwise `fallback`
    /// builds one from the status code.
    pub fn into_request_error(self, fallback: impl FnOnce(u16) -> String) -> CoreError {
        match self {
            Self::Status {
                status,
                message: Some(message),
            } => CoreError::request(status, message),
            Self::Status {
                status,
                message: None,
            } => CoreError::request(status, fallback(status)),
            Self::Request(e) => CoreError::Request {
                status: e.status().map(|s| s.as_u16()),
                message: format!("Network error: {e}"),
            },
            Self::Decode(message) => CoreError::Request {
                status: None,
                message,
            },
        }
    }

    /// Convert a post-processing failure into [`CoreError::Processing`].
    ///
    /// Status and decode failures carry the server's message, or
    /// `fallback` when there is none. Transport failures stay request
    /// errors.
    pub fn into_processing_error(self, fallback: &str) -> CoreError {
        match self {
            Self::Status {
                message: Some(message),
                ..
            } => CoreError::Processing(message),
            Self::Status { message: None, .. } | Self::Decode(_) => {
                CoreError::Processing(fallback.to_string())
            }
            err @ Self::Request(_) => err.into_request_error(http_status_message),
        }
    }
}

/// Generic message used when the server gives no detail.
pub fn http_status_message(status: u16) -> String {
    format!("HTTP error! status: {status}")
}

/// Extract a human-readable message from an error body.
///
/// Understands `{"detail": "..."}`, validation lists
/// `{"detail": [{"msg": "..."}, ...]}` (joined with `", "`), and
/// `{"error": "..."}`.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;

    let message = match value.get("detail") {
        Some(Value::String(detail)) => Some(detail.clone()),
        Some(Value::Array(items)) => {
            let msgs: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .collect();
            (!msgs.is_empty()).then(|| msgs.join(", "))
        }
        _ => None,
    }
    .or_else(|| value.get("error").and_then(Value::as_str).map(str::to_string));

    message.filter(|m| !m.trim().is_empty())
}

impl AnalysisApi {
    /// Build a client with the configured request and connect timeouts.
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self { client, api_url }
    }

    /// HTTP base URL, e.g. `http://localhost:8000`.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Exchange credentials for a bearer token via form-encoded
    /// `POST /login`.
    pub async fn login(&self, credentials: &Credentials) -> Result<String, ApiError> {
        let response = self
            .client
            .post(self.url("/login"))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()
            .await?;

        let body: LoginResponse = Self::parse_response(response).await?;
        Ok(body.access_token)
    }

    /// Stage documents server-side for chat (`POST /upload-multiple`).
    pub async fn upload_documents(
        &self,
        files: &[StagedFile],
        token: &str,
    ) -> Result<Value, ApiError> {
        tracing::debug!(files = files.len(), "Uploading documents for chat");
        let response = self
            .client
            .post(self.url("/upload-multiple"))
            .bearer_auth(token)
            .multipart(multipart_form(files)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Ask a question about the uploaded documents (`POST /chat?query=`).
    pub async fn chat(&self, query: &str, token: &str) -> Result<ChatResponse, ApiError> {
        let response = self
            .client
            .post(self.url("/chat"))
            .query(&[("query", query)])
            .bearer_auth(token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Submit documents to an analysis endpoint, returning the raw payload.
    pub async fn submit_analysis(
        &self,
        path: &str,
        files: &[StagedFile],
    ) -> Result<Value, ApiError> {
        tracing::debug!(path, files = files.len(), "Submitting analysis");
        let response = self
            .client
            .post(self.url(path))
            .multipart(multipart_form(files)?)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Forward a raw report to a post-processing endpoint as
    /// `{"report_data": ...}`.
    pub async fn process_report(
        &self,
        path: &str,
        report_data: &Value,
    ) -> Result<ProcessResponse, ApiError> {
        tracing::debug!(path, "Post-processing report");
        let response = self
            .client
            .post(self.url(path))
            .json(&serde_json::json!({ "report_data": report_data }))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Ensure the response has a success status code. On failure the
    /// body is mined for a server-supplied message.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = status.as_u16(), body = %body, "Backend returned error");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("invalid JSON body: {e}")))
    }
}

fn multipart_form(files: &[StagedFile]) -> Result<Form, ApiError> {
    files.iter().try_fold(Form::new(), |form, file| -> Result<Form, ApiError> {
        let part = Part::bytes(file.content().to_vec())
            .file_name(file.name().to_string())
            .mime_str(file.kind().mime_type())?;
        Ok(form.part(FILES_FIELD, part))
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn detail_string_is_used() {
        assert_eq!(
            error_message(r#"{"detail":"Incorrect username or password"}"#).as_deref(),
            Some("Incorrect username or password")
        );
    }

    #[test]
    fn validation_detail_list_is_joined() {
        let body =
            r#"{"detail":[{"loc":["query"],"msg":"field required"},{"msg":"value too short"}]}"#;
        assert_eq!(
            error_message(body).as_deref(),
            Some("field required, value too short")
        );
    }

    #[test]
    fn error_field_is_fallback() {
        assert_eq!(
            error_message(r#"{"error":"No documents found"}"#).as_deref(),
            Some("No documents found")
        );
        assert_eq!(
            error_message(r#"{"detail":[],"error":"boom"}"#).as_deref(),
            Some("boom")
        );
    }

    #[test]
    fn unusable_bodies_yield_none() {
        assert_eq!(error_message("Internal Server Error"), None);
        assert_eq!(error_message(r#"{"detail":""}"#), None);
        assert_eq!(error_message(r#"{"other":1}"#), None);
    }

    #[test]
    fn status_error_prefers_server_message() {
        let err = ApiError::Status {
            status: 400,
            message: Some("Too many files".into()),
        }
        .into_request_error(http_status_message);
        assert_matches!(
            err,
            CoreError::Request { status: Some(400), message } if message == "Too many files"
        );

        let err = ApiError::Status {
            status: 502,
            message: None,
        }
        .into_request_error(http_status_message);
        assert_eq!(err.to_string(), "HTTP error! status: 502");
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn processing_failures_keep_server_message() {
        let err = ApiError::Status {
            status: 400,
            message: Some("Report schema mismatch".into()),
        }
        .into_processing_error("Failed to process the style report");
        assert_matches!(err, CoreError::Processing(m) if m == "Report schema mismatch");

        let err = ApiError::Status {
            status: 503,
            message: None,
        }
        .into_processing_error("Failed to process the style report");
        assert_matches!(err, CoreError::Processing(m) if m == "Failed to process the style report");

        let err = ApiError::Decode("expected value".into())
            .into_processing_error("Failed to process the style report");
        assert_matches!(err, CoreError::Processing(m) if m == "Failed to process the style report");
    }

    #[test]
    fn transient_classification() {
        assert!(ApiError::Status { status: 503, message: None }.is_transient());
        assert!(!ApiError::Status { status: 422, message: None }.is_transient());
        assert!(!ApiError::Decode("x".into()).is_transient());
    }

    #[test]
    fn multipart_form_accepts_all_kinds() {
        let files = vec![
            StagedFile::new("a.pdf", b"%PDF".to_vec()).unwrap(),
            StagedFile::new("b.docx", b"PK".to_vec()).unwrap(),
            StagedFile::new("c.txt", b"text".to_vec()).unwrap(),
        ];
        assert!(multipart_form(&files).is_ok());
    }
}
