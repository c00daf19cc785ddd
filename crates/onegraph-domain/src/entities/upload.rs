//! Upload session state, persisted as `meta.json` per session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle status of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Accepting parts.
    Open,
    /// Completion in progress; no further parts accepted.
    Finalizing,
    /// Files moved into the raw corpus; session is spent.
    Closed,
}

/// Durable metadata of one upload session.
///
/// `files` is insertion-ordered and duplicate-free; `segments` records the
/// file count of each accepted part; `total_files == files.len()` holds at
/// every persisted state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Session identifier, 32 hex chars.
    pub upload_id: String,
    /// Target collection.
    pub collection: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
    /// Completion time, once closed.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Normalised relative paths accepted so far, in upload order.
    #[serde(default)]
    pub files: Vec<String>,
    /// Files per accepted part.
    #[serde(default)]
    pub segments: Vec<usize>,
    /// Total accepted files; always `files.len()`.
    #[serde(default)]
    pub total_files: usize,
}

impl SessionMeta {
    /// Fresh open session with no files.
    #[must_use]
    pub fn new(upload_id: impl Into<String>, collection: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            upload_id: upload_id.into(),
            collection: collection.into(),
            status: SessionStatus::Open,
            created_at: now,
            updated_at: now,
            completed_at: None,
            files: Vec::new(),
            segments: Vec::new(),
            total_files: 0,
        }
    }

    /// Check the invariants enforced when loading a persisted meta file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] when `total_files` disagrees with the
    /// file list or the list contains duplicates.
    pub fn validate(&self) -> Result<()> {
        if self.total_files != self.files.len() {
            return Err(Error::storage(format!(
                "session {}: total_files={} but files={}",
                self.upload_id,
                self.total_files,
                self.files.len()
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for file in &self.files {
            if !seen.insert(file.as_str()) {
                return Err(Error::storage(format!(
                    "session {}: duplicate file entry '{file}'",
                    self.upload_id
                )));
            }
        }
        Ok(())
    }
}
