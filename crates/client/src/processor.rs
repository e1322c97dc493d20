//! Progress-stream message processing loop.
//!
//! Reads raw frames from a progress-stream connection, parses them into
//! [`ProgressEvent`]s, applies them to the job that owns the connection,
//! and emits [`WorkflowEvent::ProgressUpdated`] for every applied event.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use thirdchair_core::job::Job;
use thirdchair_core::types::JobId;
use tokio::sync::{broadcast, RwLock};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;

use crate::events::WorkflowEvent;
use crate::messages::parse_message;

/// Shared slot holding the workflow's current job.
pub type JobSlot = Arc<RwLock<Option<Job>>>;

/// Process frames until the stream closes, errors, or `cancel` fires.
///
/// Events are applied only while the slot still holds job `job_id`;
/// the job itself drops events tagged for another job and anything that
/// arrives after it became terminal.
pub async fn process_messages<S>(
    ws_stream: &mut S,
    job_id: JobId,
    slot: &JobSlot,
    event_tx: &broadcast::Sender<WorkflowEvent>,
    cancel: &CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(job_id = %job_id, "Progress listener cancelled");
                break;
            }
            next = ws_stream.next() => match next {
                Some(msg_result) => msg_result,
                None => break,
            },
        };

        match msg_result {
            Ok(Message::Text(text)) => {
                handle_text_message(&text, job_id, slot, event_tx).await;
            }
            Ok(Message::Binary(_)) => {
                tracing::trace!(job_id = %job_id, "Ignoring binary frame");
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => {
                // Handled automatically by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(job_id = %job_id, ?frame, "Progress stream closed");
                break;
            }
            Ok(Message::Frame(_)) => {}
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }
}

/// Parse a single text frame and apply it to the owning job.
async fn handle_text_message(
    text: &str,
    job_id: JobId,
    slot: &JobSlot,
    event_tx: &broadcast::Sender<WorkflowEvent>,
) {
    let event = match parse_message(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                raw_message = %text,
                "Failed to parse progress message",
            );
            return;
        }
    };

    let mut guard = slot.write().await;
    let Some(job) = guard.as_mut().filter(|job| job.id() == job_id) else {
        tracing::debug!(job_id = %job_id, "Progress event for a job that is no longer current");
        return;
    };

    if !job.apply_progress(&event) {
        tracing::debug!(
            job_id = %job_id,
            tag = ?event.job_id,
            status = %job.status(),
            "Dropped progress event",
        );
        return;
    }

    tracing::debug!(
        job_id = %job_id,
        agent = job.active_agent(),
        percent = job.progress(),
        "Progress",
    );
    let _ = event_tx.send(WorkflowEvent::ProgressUpdated {
        job_id,
        message: event.message,
        agent: job.active_agent().to_string(),
        percent: job.progress(),
    });
}
