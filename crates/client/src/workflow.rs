//! Parameterized analysis workflow.
//!
//! [`AnalysisWorkflow`] drives one job at a time through
//! submit -> post-process -> normalize while a progress listener runs
//! concurrently on its own task. The two analysis flows differ only in
//! their [`WorkflowSpec`].
//!
//! The listener is cancelled and joined before the job is marked
//! terminal, so no progress message can reach the log afterwards.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thirdchair_core::error::CoreError;
use thirdchair_core::job::Job;
use thirdchair_core::report::{
    normalize_consistency, normalize_firm_standard, AnalysisResult, Normalizer,
};
use thirdchair_core::staging::{StagedFile, StagingBuffer};
use thirdchair_core::types::JobId;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::api::{http_status_message, AnalysisApi, ApiError};
use crate::client::{ProgressStreamClient, StreamError};
use crate::config::ClientConfig;
use crate::events::{WorkflowEvent, EVENT_CHANNEL_CAPACITY};
use crate::processor::{process_messages, JobSlot};
use crate::retry::{retry_with_backoff, BackoffConfig};

/// Message for an empty staging buffer.
pub const NO_DOCUMENTS: &str = "Please upload at least one document";

/// Message for a consistency run with a single document.
pub const NEED_TWO_DOCUMENTS: &str =
    "Multi-document analysis requires at least 2 documents for comparison";

/// Upper bound on the graceful close of the progress stream.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Static description of one analysis flow.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowSpec {
    pub name: &'static str,
    /// Multipart endpoint receiving the documents.
    pub analyze_path: &'static str,
    /// JSON endpoint turning the raw payload into a processed report.
    pub process_path: &'static str,
    pub min_files: usize,
    /// Message used when fewer than `min_files` (but at least one) are staged.
    pub min_files_message: &'static str,
    /// Picks the `report_data` forwarded to `process_path`.
    pub report_data: fn(&Value) -> Value,
    pub normalize: Normalizer,
    /// Message used when post-processing reports failure without detail.
    pub processing_failure: &'static str,
}

impl WorkflowSpec {
    /// Cross-document consistency analysis. The raw payload is forwarded
    /// whole.
    pub const CONSISTENCY: WorkflowSpec = WorkflowSpec {
        name: "consistency",
        analyze_path: "/analyze-consistency",
        process_path: "/process-coherence-report",
        min_files: 2,
        min_files_message: NEED_TWO_DOCUMENTS,
        report_data: whole_payload,
        normalize: normalize_consistency,
        processing_failure: "Failed to process the coherence report",
    };

    /// Firm-standard (style) analysis. Only the payload's `result` field
    /// is forwarded.
    pub const FIRM_STANDARD: WorkflowSpec = WorkflowSpec {
        name: "firm_standard",
        analyze_path: "/analyze-firm-standards",
        process_path: "/process-style-report",
        min_files: 1,
        min_files_message: NO_DOCUMENTS,
        report_data: result_field,
        normalize: normalize_firm_standard,
        processing_failure: "Failed to process the style report",
    };

    /// Check the staged file count before anything touches the network.
    pub fn validate(&self, file_count: usize) -> Result<(), CoreError> {
        if file_count == 0 {
            return Err(CoreError::Validation(NO_DOCUMENTS.to_string()));
        }
        if file_count < self.min_files {
            return Err(CoreError::Validation(self.min_files_message.to_string()));
        }
        Ok(())
    }
}

fn whole_payload(payload: &Value) -> Value {
    payload.clone()
}

fn result_field(payload: &Value) -> Value {
    payload.get("result").cloned().unwrap_or(Value::Null)
}

/// A 2xx analysis payload may still carry an `error` member.
fn payload_error(payload: &Value) -> Option<String> {
    match payload.get("error")? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Runs analyses of one kind and publishes their progress.
pub struct AnalysisWorkflow {
    api: Arc<AnalysisApi>,
    stream: ProgressStreamClient,
    spec: WorkflowSpec,
    job: JobSlot,
    event_tx: broadcast::Sender<WorkflowEvent>,
    log_capacity: usize,
    backoff: BackoffConfig,
}

impl AnalysisWorkflow {
    pub fn new(
        api: Arc<AnalysisApi>,
        stream: ProgressStreamClient,
        spec: WorkflowSpec,
        log_capacity: usize,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            stream,
            spec,
            job: Arc::new(RwLock::new(None)),
            event_tx,
            log_capacity,
            backoff: BackoffConfig::default(),
        }
    }

    /// Build a workflow with its own HTTP client from configuration.
    pub fn from_config(config: &ClientConfig, spec: WorkflowSpec) -> Result<Self, ApiError> {
        let api = Arc::new(AnalysisApi::new(config)?);
        Ok(Self::new(
            api,
            ProgressStreamClient::from_config(config),
            spec,
            config.progress_log_capacity,
        ))
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn spec(&self) -> &WorkflowSpec {
        &self.spec
    }

    /// Subscribe to workflow events.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Copy of the current (or most recent) job.
    pub async fn snapshot(&self) -> Option<Job> {
        self.job.read().await.clone()
    }

    /// Submit the staged files and wait for the normalized report.
    ///
    /// Validation failures return before a job exists. Otherwise the job
    /// ends `completed` or `failed` and the returned error carries the
    /// message recorded on it. The staging buffer is cleared only on
    /// success.
    pub async fn run(
        &self,
        staging: &mut StagingBuffer,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, CoreError> {
        self.spec.validate(staging.len())?;

        let files = staging.snapshot();
        let job_id = self.start_job(Arc::clone(&files)).await?;

        let listener_cancel = cancel.child_token();
        let listener = self.spawn_listener(job_id, listener_cancel.clone());

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CoreError::Cancelled),
            result = self.submit_and_process(&files, cancel) => result,
        };

        listener_cancel.cancel();
        if let Err(e) = listener.await {
            tracing::warn!(job_id = %job_id, error = %e, "Progress listener task failed");
        }

        self.finish_job(job_id, &outcome).await;

        if outcome.is_ok() {
            staging.clear();
        }
        outcome
    }

    // ---- private helpers ----

    /// Install a fresh job in the slot, refusing while another is in flight.
    async fn start_job(&self, files: Arc<[StagedFile]>) -> Result<JobId, CoreError> {
        let file_count = files.len();
        let mut job = Job::new(files, self.log_capacity);
        job.begin()?;
        let job_id = job.id();

        {
            let mut slot = self.job.write().await;
            if let Some(current) = slot.as_ref().filter(|j| j.status().is_in_flight()) {
                return Err(CoreError::InvalidState(format!(
                    "job {} is still in progress",
                    current.id()
                )));
            }
            *slot = Some(job);
        }

        tracing::info!(
            job_id = %job_id,
            workflow = self.spec.name,
            files = file_count,
            "Analysis started",
        );
        let _ = self.event_tx.send(WorkflowEvent::JobStarted {
            job_id,
            workflow: self.spec.name,
            file_count,
        });
        Ok(job_id)
    }

    async fn submit_and_process(
        &self,
        files: &[StagedFile],
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, CoreError> {
        let payload = self
            .api
            .submit_analysis(self.spec.analyze_path, files)
            .await
            .map_err(|e| e.into_request_error(http_status_message))?;

        if let Some(message) = payload_error(&payload) {
            return Err(CoreError::Request {
                status: None,
                message,
            });
        }

        let report_data = (self.spec.report_data)(&payload);
        let api = self.api.as_ref();
        let process_path = self.spec.process_path;
        let report_data = &report_data;

        let response = retry_with_backoff(
            &self.backoff,
            cancel,
            "process_report",
            ApiError::is_transient,
            move || api.process_report(process_path, report_data),
        )
        .await
        .ok_or(CoreError::Cancelled)?
        .map_err(|e| e.into_processing_error(self.spec.processing_failure))?;

        if !response.success {
            let message = response
                .error
                .filter(|e| !e.trim().is_empty())
                .unwrap_or_else(|| self.spec.processing_failure.to_string());
            return Err(CoreError::Processing(message));
        }

        (self.spec.normalize)(response.processed_report.unwrap_or(Value::Null))
    }

    async fn finish_job(&self, job_id: JobId, outcome: &Result<AnalysisResult, CoreError>) {
        let mut slot = self.job.write().await;
        let Some(job) = slot.as_mut().filter(|j| j.id() == job_id) else {
            return;
        };

        let (transition, event) = match outcome {
            Ok(result) => {
                tracing::info!(
                    job_id = %job_id,
                    total_issues = result.total_issues(),
                    log_len = job.log_len(),
                    "Analysis completed",
                );
                (
                    job.complete(result.clone()),
                    WorkflowEvent::JobCompleted {
                        job_id,
                        total_issues: result.total_issues(),
                    },
                )
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Analysis failed");
                (
                    job.fail(e.to_string()),
                    WorkflowEvent::JobFailed {
                        job_id,
                        error: e.to_string(),
                    },
                )
            }
        };

        if let Err(e) = transition {
            tracing::error!(job_id = %job_id, error = %e, "Failed to record job outcome");
        }
        let _ = self.event_tx.send(event);
    }

    fn spawn_listener(
        &self,
        job_id: JobId,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let stream = self.stream.clone();
        let slot = Arc::clone(&self.job);
        let event_tx = self.event_tx.clone();
        let backoff = self.backoff.clone();

        tokio::spawn(async move {
            run_listener(&stream, job_id, &slot, &event_tx, &backoff, &cancel).await;
        })
    }
}

/// Connect (with backoff), then process frames until cancelled or closed.
///
/// A stream that cannot be opened only costs live updates; the
/// submission carries on regardless.
async fn run_listener(
    stream: &ProgressStreamClient,
    job_id: JobId,
    slot: &JobSlot,
    event_tx: &broadcast::Sender<WorkflowEvent>,
    backoff: &BackoffConfig,
    cancel: &CancellationToken,
) {
    let connected = retry_with_backoff(
        backoff,
        cancel,
        "progress_connect",
        |_: &StreamError| true,
        move || stream.connect(job_id),
    )
    .await;

    let conn = match connected {
        None => return,
        Some(Ok(conn)) => conn,
        Some(Err(e)) => {
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                "Progress stream unavailable, continuing without live updates",
            );
            let _ = event_tx.send(WorkflowEvent::StreamDisconnected { job_id });
            return;
        }
    };
    let _ = event_tx.send(WorkflowEvent::StreamConnected { job_id });

    let mut ws_stream = conn.ws_stream;
    process_messages(&mut ws_stream, job_id, slot, event_tx, cancel).await;

    if let Ok(Err(e)) = tokio::time::timeout(CLOSE_TIMEOUT, ws_stream.close(None)).await {
        tracing::debug!(job_id = %job_id, error = %e, "Progress stream close failed");
    }
    let _ = event_tx.send(WorkflowEvent::StreamDisconnected { job_id });
}
