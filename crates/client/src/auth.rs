//! Login and logout against the backend.

use std::sync::Arc;

use thirdchair_core::error::CoreError;
use thirdchair_core::session::{Credentials, Session};

use crate::api::AnalysisApi;

/// Fallback message when a failed login carries no server detail.
pub const LOGIN_FAILED: &str = "Login failed";

/// Exchanges credentials for a token and records it on the [`Session`].
#[derive(Debug, Clone)]
pub struct AuthService {
    api: Arc<AnalysisApi>,
    session: Arc<Session>,
}

impl AuthService {
    pub fn new(api: Arc<AnalysisApi>, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Validate credentials locally, then `POST /login`.
    ///
    /// On success the token is persisted and session subscribers are
    /// notified. On failure the session is left untouched.
    pub async fn login(&self, credentials: &Credentials) -> Result<(), CoreError> {
        let errors = credentials.validate();
        if !errors.is_empty() {
            return Err(CoreError::Validation(errors.join("; ")));
        }

        let token = self
            .api
            .login(credentials)
            .await
            .map_err(|e| e.into_request_error(|_| LOGIN_FAILED.to_string()))?;

        self.session.sign_in(token)?;
        tracing::info!(username = %credentials.username, "Logged in");
        Ok(())
    }

    /// Forget the token locally. The backend keeps no session state.
    pub fn logout(&self) -> Result<(), CoreError> {
        self.session.sign_out()
    }
}
