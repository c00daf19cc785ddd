//! Upload-session protocol: chunked uploads that finalise into a raw
//! corpus directory and seed exactly one indexing job.
//!
//! Sessions advance `open → finalizing → closed`, persisted as a
//! `meta.json` under `<workspace>/<sessions dirname>/<upload_id>/`. Parts
//! are validated in full before anything is persisted, and persisted
//! files of a failed part are rolled back.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use onegraph_domain::constants::is_allowed_extension;
use onegraph_domain::entities::{IndexJob, JobState, SessionMeta, SessionStatus};
use onegraph_domain::error::{Error, Result};
use onegraph_domain::ports::{JobQueue, JobStore};
use onegraph_domain::CollectionId;

/// One file of an upload part.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied name, possibly with directories and backslashes.
    pub name: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

/// Result of opening a session.
#[derive(Debug, Clone)]
pub struct SessionInit {
    /// New session identifier, 32 hex chars.
    pub upload_id: String,
    /// Maximum files the caller may send per part.
    pub batch_size: usize,
}

/// Result of completing a session.
#[derive(Debug, Clone)]
pub struct SessionCompletion {
    /// Minted job identifier.
    pub job_id: String,
    /// Files moved into the raw corpus.
    pub total_files: usize,
    /// Absolute path of the raw corpus directory.
    pub raw_path: PathBuf,
}

/// Manages upload sessions and seeds indexing jobs at completion.
pub struct UploadSessionManager {
    workspace_dir: PathBuf,
    sessions_root: PathBuf,
    batch_size: usize,
    job_store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl UploadSessionManager {
    /// Create a manager rooted at the workspace directory.
    #[must_use]
    pub fn new(
        workspace_dir: PathBuf,
        sessions_dirname: &str,
        batch_size: usize,
        job_store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        let sessions_root = workspace_dir.join(sessions_dirname);
        Self {
            workspace_dir,
            sessions_root,
            batch_size: batch_size.max(1),
            job_store,
            queue,
        }
    }

    /// Open a session for a collection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a bad collection name and
    /// [`Error::Io`] when the session directory cannot be created.
    pub async fn init(&self, collection: &str) -> Result<SessionInit> {
        let collection = CollectionId::new(collection)?;
        let upload_id = Uuid::new_v4().simple().to_string();

        let session_dir = self.sessions_root.join(&upload_id);
        std::fs::create_dir_all(session_dir.join("tmp"))?;

        let meta = SessionMeta::new(&upload_id, collection.as_str());
        write_meta(&session_dir, &meta)?;

        info!(
            event = "upload_session_opened",
            upload_id = %upload_id,
            collection = %collection,
        );
        Ok(SessionInit {
            upload_id,
            batch_size: self.batch_size,
        })
    }

    /// Append one part of files to an open session.
    ///
    /// All files are validated before anything is persisted; on any
    /// failure the files persisted for this part are removed again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionConflict`] when the session is not open,
    /// [`Error::InvalidArgument`] for empty or oversized batches, unsafe
    /// paths, disallowed extensions and duplicates, and
    /// [`Error::Io`]/[`Error::Storage`] for persistence failures.
    pub async fn append_part(&self, upload_id: &str, files: Vec<UploadedFile>) -> Result<usize> {
        let session_dir = self.session_dir(upload_id)?;
        let mut meta = read_meta(&session_dir)?;
        require_open(&meta)?;

        if files.is_empty() {
            return Err(Error::invalid_argument("upload part contains no files"));
        }
        if files.len() > self.batch_size {
            return Err(Error::invalid_argument(format!(
                "upload part of {} files exceeds batch size {}",
                files.len(),
                self.batch_size
            )));
        }

        let tmp_dir = session_dir.join("tmp");
        let existing: HashSet<&str> = meta.files.iter().map(String::as_str).collect();
        let mut in_batch: HashSet<String> = HashSet::new();
        let mut validated: Vec<(String, &UploadedFile)> = Vec::with_capacity(files.len());

        for file in &files {
            let rel_path = safe_relative_path(&file.name)?;
            check_extension(&rel_path)?;
            if existing.contains(rel_path.as_str()) || !in_batch.insert(rel_path.clone()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate file path '{rel_path}' in upload"
                )));
            }
            if tmp_dir.join(&rel_path).exists() {
                return Err(Error::invalid_argument(format!(
                    "file '{rel_path}' already exists in session"
                )));
            }
            validated.push((rel_path, file));
        }

        let mut persisted: Vec<PathBuf> = Vec::with_capacity(validated.len());
        for (rel_path, file) in &validated {
            let target = tmp_dir.join(rel_path);
            let write_result = target
                .parent()
                .map_or(Ok(()), std::fs::create_dir_all)
                .and_then(|()| std::fs::write(&target, &file.content));
            if let Err(err) = write_result {
                rollback_files(&persisted);
                return Err(err.into());
            }
            persisted.push(target);
        }

        let accepted = validated.len();
        meta.files
            .extend(validated.into_iter().map(|(rel_path, _)| rel_path));
        meta.segments.push(accepted);
        meta.total_files = meta.files.len();
        meta.updated_at = Utc::now();
        if let Err(err) = write_meta(&session_dir, &meta) {
            rollback_files(&persisted);
            return Err(err);
        }

        info!(
            event = "upload_part_accepted",
            upload_id = %upload_id,
            files = accepted,
            total_files = meta.total_files,
        );
        Ok(accepted)
    }

    /// Finalise a session: move files into the raw corpus, create the
    /// job state and enqueue the indexing job.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionConflict`] when the session is not open,
    /// [`Error::InvalidArgument`] for an empty session, and
    /// [`Error::Storage`] when a source file is missing, a target exists
    /// or a move fails.
    pub async fn complete(&self, upload_id: &str) -> Result<SessionCompletion> {
        let session_dir = self.session_dir(upload_id)?;
        let mut meta = read_meta(&session_dir)?;
        require_open(&meta)?;
        if meta.files.is_empty() {
            return Err(Error::invalid_argument(
                "cannot complete an upload session with no files",
            ));
        }

        meta.status = SessionStatus::Finalizing;
        meta.updated_at = Utc::now();
        write_meta(&session_dir, &meta)?;

        let job_id = Uuid::new_v4().simple().to_string();
        let raw_dir = self
            .workspace_dir
            .join(&meta.collection)
            .join(&job_id)
            .join("raw");
        let tmp_dir = session_dir.join("tmp");

        let mut moved = 0usize;
        for rel_path in &meta.files {
            let source = tmp_dir.join(rel_path);
            if !source.is_file() {
                return Err(Error::storage(format!(
                    "session {upload_id}: missing uploaded file '{rel_path}'"
                )));
            }
            let target = raw_dir.join(rel_path);
            if target.exists() {
                return Err(Error::storage(format!(
                    "session {upload_id}: target '{rel_path}' already exists"
                )));
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::rename(&source, &target).map_err(|err| {
                Error::storage(format!(
                    "session {upload_id}: failed to move '{rel_path}': {err}"
                ))
            })?;
            moved += 1;
        }

        meta.status = SessionStatus::Closed;
        meta.completed_at = Some(Utc::now());
        meta.updated_at = Utc::now();
        write_meta(&session_dir, &meta)?;

        let mut job_state = JobState::new(&job_id, &meta.collection);
        job_state.stats.total_files = moved;
        job_state.stats.session_segments = meta.segments.clone();
        job_state.stats.session_batches = meta.segments.len();
        job_state.stats.session_total_files = moved;
        self.job_store.save(&mut job_state).await?;

        self.queue
            .enqueue(&IndexJob {
                job_id: job_id.clone(),
                collection: meta.collection.clone(),
                raw_path: raw_dir.to_string_lossy().into_owned(),
            })
            .await?;

        if let Err(err) = std::fs::remove_dir_all(&session_dir) {
            warn!(
                event = "session_cleanup_failed",
                upload_id = %upload_id,
                error = %err,
            );
        }

        info!(
            event = "upload_session_completed",
            upload_id = %upload_id,
            job_id = %job_id,
            collection = %meta.collection,
            total_files = moved,
        );
        Ok(SessionCompletion {
            job_id,
            total_files: moved,
            raw_path: raw_dir,
        })
    }

    fn session_dir(&self, upload_id: &str) -> Result<PathBuf> {
        let dir = self.sessions_root.join(upload_id);
        if !dir.is_dir() {
            return Err(Error::NotFound {
                resource: format!("upload session '{upload_id}'"),
            });
        }
        Ok(dir)
    }
}

fn require_open(meta: &SessionMeta) -> Result<()> {
    if meta.status != SessionStatus::Open {
        return Err(Error::session_conflict(format!(
            "session {} is not open (status: {:?})",
            meta.upload_id, meta.status
        )));
    }
    Ok(())
}

fn read_meta(session_dir: &Path) -> Result<SessionMeta> {
    let raw = std::fs::read_to_string(session_dir.join("meta.json"))
        .map_err(|err| Error::storage(format!("cannot read session meta: {err}")))?;
    let meta: SessionMeta = serde_json::from_str(&raw)
        .map_err(|err| Error::storage(format!("corrupt session meta: {err}")))?;
    meta.validate()?;
    Ok(meta)
}

/// Atomically persist the meta file (write temp, rename over).
fn write_meta(session_dir: &Path, meta: &SessionMeta) -> Result<()> {
    let target = session_dir.join("meta.json");
    let staging = session_dir.join("meta.json.tmp");
    std::fs::write(&staging, serde_json::to_vec_pretty(meta)?)?;
    std::fs::rename(&staging, &target)?;
    Ok(())
}

fn rollback_files(persisted: &[PathBuf]) {
    for path in persisted {
        if let Err(err) = std::fs::remove_file(path) {
            warn!(event = "part_rollback_failed", path = %path.display(), error = %err);
        }
    }
}

/// Normalise a client-supplied name to a safe relative path.
///
/// Backslashes become `/`, leading slashes are stripped; traversal
/// segments, empty components and an empty basename are rejected.
fn safe_relative_path(name: &str) -> Result<String> {
    let sanitized = name.replace('\\', "/");
    let sanitized = sanitized.trim_start_matches('/');
    if sanitized.is_empty() {
        return Err(Error::invalid_argument("invalid file name"));
    }
    let mut parts = Vec::new();
    for component in sanitized.split('/') {
        if component.is_empty() || component == "." || component == ".." {
            return Err(Error::invalid_argument(format!(
                "invalid relative path '{name}'"
            )));
        }
        parts.push(component);
    }
    Ok(parts.join("/"))
}

fn check_extension(rel_path: &str) -> Result<()> {
    let basename = rel_path.rsplit('/').next().unwrap_or(rel_path);
    let extension = basename
        .rfind('.')
        .filter(|idx| *idx > 0)
        .map(|idx| basename[idx..].to_ascii_lowercase())
        .unwrap_or_default();
    if !is_allowed_extension(&extension) {
        return Err(Error::invalid_argument(format!(
            "extension '{extension}' is not allowed"
        )));
    }
    Ok(())
}
