//! Authentication session context.
//!
//! [`Session`] owns the single bearer token and is passed explicitly to
//! whatever needs it. Sign-in state changes are observable through a
//! [`tokio::sync::watch`] channel. Persistence is delegated to a
//! [`TokenStore`].

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::CoreError;

/// Message for protected calls made while signed out.
pub const NOT_AUTHENTICATED: &str = "Not authenticated. Please login first.";

/// Storage backend for the session token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>, CoreError>;
    fn save(&self, token: &str) -> Result<(), CoreError>;
    fn clear(&self) -> Result<(), CoreError>;
}

/// Process-local store, used by tests and one-shot invocations.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }

    fn slot(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, CoreError> {
        self.token
            .lock()
            .map_err(|_| CoreError::Session("token store lock poisoned".into()))
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, CoreError> {
        Ok(self.slot()?.clone())
    }

    fn save(&self, token: &str) -> Result<(), CoreError> {
        *self.slot()? = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), CoreError> {
        *self.slot()? = None;
        Ok(())
    }
}

/// On-disk layout of the session file: `{"token": "..."}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    #[serde(default)]
    token: Option<String>,
}

/// JSON file store, e.g. `~/.thirdchair/session.json`.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, action: &str, e: impl std::fmt::Display) -> CoreError {
        CoreError::Session(format!("cannot {action} {}: {e}", self.path.display()))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, CoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error("read", e)),
        };
        let file: SessionFile =
            serde_json::from_str(&raw).map_err(|e| self.io_error("parse", e))?;
        Ok(file.token.filter(|t| !t.is_empty()))
    }

    fn save(&self, token: &str) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error("create", e))?;
        }
        let body = serde_json::to_string_pretty(&SessionFile {
            token: Some(token.to_string()),
        })
        .map_err(|e| self.io_error("encode", e))?;
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        let mut file = owner_only(&mut options)
            .open(&self.path)
            .map_err(|e| self.io_error("open", e))?;
        restrict_permissions(&file).map_err(|e| self.io_error("protect", e))?;
        file.write_all(body.as_bytes()).map_err(|e| self.io_error("write", e))
    }

    fn clear(&self) -> Result<(), CoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error("remove", e)),
        }
    }
}

/// The token file is created readable by its owner only.
#[cfg(unix)]
fn owner_only(options: &mut std::fs::OpenOptions) -> &mut std::fs::OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    options.mode(0o600)
}

#[cfg(not(unix))]
fn owner_only(options: &mut std::fs::OpenOptions) -> &mut std::fs::OpenOptions {
    options
}

/// Tighten a pre-existing file that was created with a looser mode.
#[cfg(unix)]
fn restrict_permissions(file: &std::fs::File) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &std::fs::File) -> std::io::Result<()> {
    Ok(())
}

/// Sign-in credentials for `POST /login`.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns an empty `Vec` if valid; otherwise human-readable errors.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.username.trim().is_empty() {
            errors.push("Email must not be empty".to_string());
        }
        if self.password.is_empty() {
            errors.push("Password must not be empty".to_string());
        }
        errors
    }
}

/// Injected authentication context.
pub struct Session {
    store: Box<dyn TokenStore>,
    state: watch::Sender<Option<String>>,
}

impl Session {
    /// Create a session, restoring any token the store already holds.
    pub fn new(store: impl TokenStore + 'static) -> Result<Self, CoreError> {
        let initial = store.load()?;
        let (state, _) = watch::channel(initial);
        Ok(Self {
            store: Box::new(store),
            state,
        })
    }

    /// A signed-out session backed by memory only.
    pub fn in_memory() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            store: Box::new(MemoryTokenStore::new()),
            state,
        }
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// The current token, or [`CoreError::Authentication`] when signed out.
    pub fn require_token(&self) -> Result<String, CoreError> {
        self.token()
            .ok_or_else(|| CoreError::Authentication(NOT_AUTHENTICATED.to_string()))
    }

    /// Persist a freshly issued token and notify subscribers.
    pub fn sign_in(&self, token: impl Into<String>) -> Result<(), CoreError> {
        let token = token.into();
        self.store.save(&token)?;
        self.state.send_replace(Some(token));
        tracing::info!("Signed in");
        Ok(())
    }

    /// Forget the token and notify subscribers.
    pub fn sign_out(&self) -> Result<(), CoreError> {
        self.store.clear()?;
        self.state.send_replace(None);
        tracing::info!("Signed out");
        Ok(())
    }

    /// Observe sign-in state changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.state.subscribe()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("signed_in", &self.is_signed_in())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn require_token_when_signed_out() {
        let session = Session::in_memory();
        assert!(!session.is_signed_in());
        assert_matches!(
            session.require_token(),
            Err(CoreError::Authentication(msg)) if msg == NOT_AUTHENTICATED
        );
    }

    #[test]
    fn sign_in_and_out_round_trip() {
        let session = Session::new(MemoryTokenStore::new()).unwrap();
        session.sign_in("abc").unwrap();
        assert_eq!(session.require_token().unwrap(), "abc");
        session.sign_out().unwrap();
        assert!(session.token().is_none());
    }

    #[test]
    fn session_restores_stored_token() {
        let session = Session::new(MemoryTokenStore::with_token("saved")).unwrap();
        assert_eq!(session.token().as_deref(), Some("saved"));
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let session = Session::in_memory();
        let mut rx = session.subscribe();
        assert!(rx.borrow_and_update().is_none());

        session.sign_in("t1").unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_deref(), Some("t1"));

        session.sign_out().unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
    }

    #[test]
    fn file_store_persists_token_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = FileTokenStore::new(&path);

        assert_eq!(store.load().unwrap(), None);
        store.save("jwt-value").unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["token"], "jwt-value");
        assert_eq!(store.load().unwrap().as_deref(), Some("jwt-value"));

        store.clear().unwrap();
        assert!(!path.exists());
        // Clearing twice is fine.
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileTokenStore::new(&path);

        store.save("first").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        // A file left behind with a looser mode is tightened on save.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        store.save("second").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "not json").unwrap();

        assert_matches!(
            FileTokenStore::new(&path).load(),
            Err(CoreError::Session(msg)) if msg.contains("parse")
        );
    }

    #[test]
    fn credentials_validation() {
        assert!(Credentials::new("a@b.com", "pw").validate().is_empty());
        let errors = Credentials::new("  ", "").validate();
        assert_eq!(errors.len(), 2);
    }
}
