//! Events published while an analysis workflow runs.
//!
//! Observers (the CLI progress view, tests) subscribe through
//! [`AnalysisWorkflow::subscribe`](crate::workflow::AnalysisWorkflow::subscribe).

use serde::Serialize;
use thirdchair_core::types::JobId;

/// Capacity of the workflow's broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A state change of the job owned by a workflow.
#[derive(Debug, Clone, Serialize)]
pub enum WorkflowEvent {
    /// A job was created and its submission is starting.
    JobStarted {
        job_id: JobId,
        workflow: &'static str,
        file_count: usize,
    },

    /// The progress stream for a job was opened.
    StreamConnected { job_id: JobId },

    /// The progress stream for a job closed or could not be opened.
    StreamDisconnected { job_id: JobId },

    /// A progress event was applied to the job.
    ProgressUpdated {
        job_id: JobId,
        message: String,
        /// Active agent label after applying the event.
        agent: String,
        /// Completion percentage (0-100) after applying the event.
        percent: f64,
    },

    /// The job finished with a normalized report.
    JobCompleted { job_id: JobId, total_issues: u32 },

    /// The job failed; `error` is the message shown to the user.
    JobFailed { job_id: JobId, error: String },
}

impl WorkflowEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            Self::JobStarted { job_id, .. }
            | Self::StreamConnected { job_id }
            | Self::StreamDisconnected { job_id }
            | Self::ProgressUpdated { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::JobCompleted { .. } | Self::JobFailed { .. })
    }
}
