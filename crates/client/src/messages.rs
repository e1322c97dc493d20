//! Progress-stream message parser.
//!
//! The backend sends JSON text frames shaped like
//! `{"message": "...", "agent": "...", "progress": 40}` over
//! `/ws/agent-logs`. `agent`, `progress` and `job_id` are optional.

use thirdchair_core::job::ProgressEvent;

/// Parse a progress-stream text frame into a [`ProgressEvent`].
///
/// Returns `Err` for malformed JSON or frames without a `message`.
/// Callers log and drop such frames.
pub fn parse_message(text: &str) -> Result<ProgressEvent, serde_json::Error> {
    serde_json::from_str(text)
}
