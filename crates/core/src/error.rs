/// Client-side error taxonomy.
///
/// The `Display` output of every variant is the human-readable message
/// shown to the user, so server-supplied details pass through verbatim.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// A client-side precondition failed (e.g. not enough staged files).
    #[error("{0}")]
    Validation(String),

    /// The backend answered with a non-success status, or the request
    /// never reached it (`status` is `None` for transport failures).
    #[error("{message}")]
    Request { status: Option<u16>, message: String },

    /// The post-processing step rejected or failed to normalize a report.
    #[error("{0}")]
    Processing(String),

    /// A protected call was attempted without a session token.
    #[error("{0}")]
    Authentication(String),

    /// The owning operation was cancelled before it finished.
    #[error("Analysis cancelled")]
    Cancelled,

    /// A job transition was requested from a state that does not allow it.
    #[error("Invalid job state: {0}")]
    InvalidState(String),

    /// The persisted session token could not be read or written.
    #[error("Session storage error: {0}")]
    Session(String),
}

impl CoreError {
    /// Build a [`CoreError::Request`] with a status code.
    pub fn request(status: u16, message: impl Into<String>) -> Self {
        Self::Request {
            status: Some(status),
            message: message.into(),
        }
    }

    /// HTTP status carried by a request error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }
}
