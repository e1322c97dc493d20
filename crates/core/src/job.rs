//! Analysis job state machine and progress application.
//!
//! ```text
//! idle --begin--> submitting --complete/fail--> completed | failed
//! submitting --first progress event--> awaiting_progress --complete/fail--> completed | failed
//! ```
//!
//! A terminal job ignores any further progress events, so messages that
//! trail in after the owning request finished never reach the log.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::report::AnalysisResult;
use crate::staging::StagedFile;
use crate::types::{JobId, Timestamp};

/// Active-agent label shown before any job has started.
pub const AGENT_WAITING: &str = "Waiting for documents...";

/// Active-agent label used when a progress event carries no agent.
pub const AGENT_ANALYZING: &str = "Analyzing documents...";

/// Default number of progress messages retained per job.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Lifecycle status of a [`Job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Idle,
    Submitting,
    AwaitingProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether a submission is currently outstanding.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Submitting | Self::AwaitingProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Submitting => "submitting",
            Self::AwaitingProgress => "awaiting_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One inbound message from the progress stream.
///
/// `job_id` is optional: untagged events are attributed to whichever job
/// owns the connection, tagged events must match it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub message: String,
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub job_id: Option<String>,
}

impl ProgressEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            agent: None,
            progress: None,
            job_id: None,
        }
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }
}

/// One submit-and-track cycle for a snapshot of staged files.
#[derive(Debug, Clone)]
pub struct Job {
    id: JobId,
    files: Arc<[StagedFile]>,
    status: JobStatus,
    progress: f64,
    active_agent: String,
    log: VecDeque<String>,
    log_capacity: usize,
    result: Option<AnalysisResult>,
    error: Option<String>,
    created_at: Timestamp,
    finished_at: Option<Timestamp>,
}

impl Job {
    /// Create an idle job over an immutable file snapshot.
    pub fn new(files: Arc<[StagedFile]>, log_capacity: usize) -> Self {
        Self {
            id: JobId::new_v4(),
            files,
            status: JobStatus::Idle,
            progress: 0.0,
            active_agent: AGENT_WAITING.to_string(),
            log: VecDeque::new(),
            log_capacity: log_capacity.max(1),
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Progress percentage in `0..=100`.
    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn active_agent(&self) -> &str {
        &self.active_agent
    }

    /// Progress messages in arrival order, oldest first.
    pub fn log(&self) -> impl Iterator<Item = &str> {
        self.log.iter().map(String::as_str)
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    /// Human-readable failure message for a failed job.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<Timestamp> {
        self.finished_at
    }

    /// `idle -> submitting`.
    pub fn begin(&mut self) -> Result<(), CoreError> {
        if self.status != JobStatus::Idle {
            return Err(self.invalid("begin"));
        }
        self.status = JobStatus::Submitting;
        self.progress = 0.0;
        self.active_agent = AGENT_ANALYZING.to_string();
        Ok(())
    }

    /// Whether an event belongs to this job (untagged events always do).
    pub fn accepts(&self, event: &ProgressEvent) -> bool {
        match event.job_id.as_deref() {
            None => true,
            Some(tag) => tag == self.id.to_string(),
        }
    }

    /// Apply a progress event. Returns `false` when the event was dropped
    /// because the job is not in flight or the event belongs elsewhere.
    pub fn apply_progress(&mut self, event: &ProgressEvent) -> bool {
        if !self.status.is_in_flight() || !self.accepts(event) {
            return false;
        }

        self.status = JobStatus::AwaitingProgress;

        if self.log.len() == self.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(event.message.clone());

        self.active_agent = event
            .agent
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(AGENT_ANALYZING)
            .to_string();

        // Non-finite values would poison the clamp below.
        if let Some(p) = event.progress.filter(|p| p.is_finite()) {
            self.progress = p.clamp(0.0, 100.0);
        }

        true
    }

    /// `submitting | awaiting_progress -> completed`.
    pub fn complete(&mut self, result: AnalysisResult) -> Result<(), CoreError> {
        if !self.status.is_in_flight() {
            return Err(self.invalid("complete"));
        }
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.result = Some(result);
        self.error = None;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    /// `submitting | awaiting_progress -> failed`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        if !self.status.is_in_flight() {
            return Err(self.invalid("fail"));
        }
        self.status = JobStatus::Failed;
        self.result = None;
        self.error = Some(message.into());
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    fn invalid(&self, action: &str) -> CoreError {
        CoreError::InvalidState(format!(
            "cannot {action} job {} in state {}",
            self.id, self.status
        ))
    }
}
