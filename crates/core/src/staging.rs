//! Client-side file staging.
//!
//! [`StagingBuffer`] accumulates user-selected documents in selection
//! order before they are submitted. Entries are identified by an opaque
//! handle, so two files with the same name may be staged side by side.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::error::CoreError;
use crate::types::Timestamp;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Document kinds accepted by the file selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Pdf,
    Doc,
    Docx,
    Text,
}

impl FileKind {
    /// All accepted kinds, in the order they are advertised to users.
    pub const ALL: [FileKind; 4] = [Self::Pdf, Self::Doc, Self::Docx, Self::Text];

    /// Resolve a kind from a file extension (without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// Resolve a kind from the extension of a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Text => "txt",
        }
    }

    /// MIME type sent with the multipart part for this kind.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Doc => "application/msword",
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Text => "text/plain",
        }
    }

    /// Comma-separated list of accepted extensions, e.g. `.pdf, .doc`.
    pub fn accepted_extensions() -> String {
        Self::ALL
            .iter()
            .map(|k| format!(".{}", k.extension()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// A user-selected document held in memory until submission.
///
/// Equality is by handle: staging the same bytes twice yields two
/// distinct entries.
#[derive(Debug, Clone)]
pub struct StagedFile {
    handle: Uuid,
    name: String,
    kind: FileKind,
    content: Arc<[u8]>,
    staged_at: Timestamp,
}

impl StagedFile {
    /// Stage in-memory content under the given file name.
    ///
    /// Fails with [`CoreError::Validation`] when the extension is not
    /// one of the accepted document kinds.
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Result<Self, CoreError> {
        let name = name.into();
        let kind = accepted_kind(&name)?;

        Ok(Self {
            handle: Uuid::new_v4(),
            name,
            kind,
            content: Arc::from(content.into()),
            staged_at: Utc::now(),
        })
    }

    /// Read a document from disk and stage it under its file name.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                CoreError::Validation(format!("'{}' is not a file path", path.display()))
            })?
            .to_string();

        // Check the extension before reading potentially large content.
        let kind = accepted_kind(&name)?;

        let content = tokio::fs::read(path).await.map_err(|e| {
            CoreError::Validation(format!("Cannot read '{}': {e}", path.display()))
        })?;

        Ok(Self {
            handle: Uuid::new_v4(),
            name,
            kind,
            content: Arc::from(content),
            staged_at: Utc::now(),
        })
    }

    pub fn handle(&self) -> Uuid {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn staged_at(&self) -> Timestamp {
        self.staged_at
    }

    /// Size formatted as megabytes with two decimals, e.g. `0.25 MB`.
    pub fn display_size(&self) -> String {
        format!("{:.2} MB", self.size() as f64 / BYTES_PER_MB)
    }
}

fn accepted_kind(name: &str) -> Result<FileKind, CoreError> {
    FileKind::from_file_name(name).ok_or_else(|| {
        CoreError::Validation(format!(
            "Unsupported file type for '{name}' (accepted: {})",
            FileKind::accepted_extensions()
        ))
    })
}

impl PartialEq for StagedFile {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl Eq for StagedFile {}

/// Ordered list of staged files awaiting submission.
#[derive(Debug, Clone, Default)]
pub struct StagingBuffer {
    files: Vec<StagedFile>,
}

impl StagingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly selected files after any already staged.
    pub fn add(&mut self, files: impl IntoIterator<Item = StagedFile>) {
        let before = self.files.len();
        self.files.extend(files);
        tracing::debug!(
            added = self.files.len() - before,
            total = self.files.len(),
            "Staged files",
        );
    }

    /// Remove the entry at `index`. Out-of-range indices are a no-op.
    pub fn remove(&mut self, index: usize) -> Option<StagedFile> {
        if index < self.files.len() {
            Some(self.files.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn files(&self) -> &[StagedFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Immutable snapshot of the current selection, taken at submission.
    pub fn snapshot(&self) -> Arc<[StagedFile]> {
        Arc::from(self.files.clone())
    }
}
