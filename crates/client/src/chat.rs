//! Chat with uploaded documents.
//!
//! [`ChatService`] keeps the conversation [`Transcript`]. Failures never
//! abort the conversation: they are appended as `Error: ...` replies.

use std::sync::Arc;

use serde_json::Value;
use thirdchair_core::chat::{normalize_query, ChatMessage, Transcript};
use thirdchair_core::error::CoreError;
use thirdchair_core::session::Session;
use thirdchair_core::staging::StagedFile;

use crate::api::{http_status_message, AnalysisApi};
use crate::workflow::NO_DOCUMENTS;

/// Message for a 2xx chat reply without a `response` member.
pub const INVALID_RESPONSE: &str = "Invalid response format from server";

/// Fallback message when a failed upload carries no server detail.
pub const UPLOAD_FAILED: &str = "Upload failed";

pub struct ChatService {
    api: Arc<AnalysisApi>,
    session: Arc<Session>,
    transcript: Transcript,
}

impl ChatService {
    pub fn new(api: Arc<AnalysisApi>, session: Arc<Session>) -> Self {
        Self {
            api,
            session,
            transcript: Transcript::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Send one question. Blank input is ignored and returns `None`;
    /// otherwise the appended reply (or inline error) is returned.
    pub async fn send(&mut self, input: &str) -> Option<&ChatMessage> {
        let query = normalize_query(input)?;
        self.transcript.push_user(query);

        match self.ask(query).await {
            Ok(reply) => self.transcript.push_bot(reply),
            Err(e) => {
                tracing::warn!(error = %e, "Chat request failed");
                self.transcript.push_error(&e);
            }
        }
        self.transcript.last()
    }

    /// Stage documents server-side so later questions can refer to them.
    pub async fn upload_documents(&self, files: &[StagedFile]) -> Result<Value, CoreError> {
        if files.is_empty() {
            return Err(CoreError::Validation(NO_DOCUMENTS.to_string()));
        }
        let token = self.session.require_token()?;

        let body = self
            .api
            .upload_documents(files, &token)
            .await
            .map_err(|e| e.into_request_error(|_| UPLOAD_FAILED.to_string()))?;

        tracing::info!(files = files.len(), "Documents uploaded for chat");
        Ok(body)
    }

    async fn ask(&self, query: &str) -> Result<String, CoreError> {
        let token = self.session.require_token()?;

        let response = self
            .api
            .chat(query, &token)
            .await
            .map_err(|e| e.into_request_error(http_status_message))?;

        response.response.ok_or_else(|| CoreError::Request {
            status: None,
            message: INVALID_RESPONSE.to_string(),
        })
    }
}
