use std::path::PathBuf;
use std::time::Duration;

use thirdchair_core::job::DEFAULT_LOG_CAPACITY;

/// Client configuration loaded from environment variables.
///
/// All fields have defaults suitable for a backend running locally.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// HTTP base URL of the backend (default: `http://localhost:8000`).
    pub api_url: String,
    /// WebSocket base URL of the backend (default: `ws://localhost:8000`).
    pub ws_url: String,
    /// Per-request timeout. Analyses can take minutes (default: `600`s).
    pub request_timeout: Duration,
    /// TCP/WebSocket connect timeout (default: `10`s).
    pub connect_timeout: Duration,
    /// Progress messages retained per job (default: `1000`).
    pub progress_log_capacity: usize,
    /// Where the session token is persisted.
    pub session_file: PathBuf,
}

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}'")]
    Invalid { var: &'static str, value: String },
}

impl ClientConfig {
    /// Defaults pointing at the given backend, for tests and embedding.
    pub fn new(api_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            api_url: trim_base(api_url.into()),
            ws_url: trim_base(ws_url.into()),
            request_timeout: Duration::from_secs(600),
            connect_timeout: Duration::from_secs(10),
            progress_log_capacity: DEFAULT_LOG_CAPACITY,
            session_file: default_session_file(None),
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default                          |
    /// |------------------------------------|----------------------------------|
    /// | `THIRDCHAIR_API_URL`               | `http://localhost:8000`          |
    /// | `THIRDCHAIR_WS_URL`                | `ws://localhost:8000`            |
    /// | `THIRDCHAIR_REQUEST_TIMEOUT_SECS`  | `600`                            |
    /// | `THIRDCHAIR_CONNECT_TIMEOUT_SECS`  | `10`                             |
    /// | `THIRDCHAIR_PROGRESS_LOG_CAPACITY` | `1000`                           |
    /// | `THIRDCHAIR_SESSION_FILE`          | `$HOME/.thirdchair/session.json` |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) over an arbitrary lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url =
            lookup("THIRDCHAIR_API_URL").unwrap_or_else(|| "http://localhost:8000".into());
        let ws_url = lookup("THIRDCHAIR_WS_URL").unwrap_or_else(|| "ws://localhost:8000".into());

        let mut config = Self::new(api_url, ws_url);

        if let Some(secs) = parse_var(&lookup, "THIRDCHAIR_REQUEST_TIMEOUT_SECS")? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "THIRDCHAIR_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize>(&lookup, "THIRDCHAIR_PROGRESS_LOG_CAPACITY")? {
            if capacity == 0 {
                return Err(ConfigError::Invalid {
                    var: "THIRDCHAIR_PROGRESS_LOG_CAPACITY",
                    value: "0".into(),
                });
            }
            config.progress_log_capacity = capacity;
        }

        config.session_file = match lookup("THIRDCHAIR_SESSION_FILE") {
            Some(path) if !path.trim().is_empty() => PathBuf::from(path),
            _ => default_session_file(lookup("HOME")),
        };

        Ok(config)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

fn default_session_file(home: Option<String>) -> PathBuf {
    let home = home
        .or_else(|| std::env::var("HOME").ok())
        .unwrap_or_else(|| ".".into());
    PathBuf::from(home).join(".thirdchair").join("session.json")
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}
