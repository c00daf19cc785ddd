//! Application configuration.
//!
//! Resolution order: built-in defaults, then an optional `onegraph.toml`,
//! then `ONEGRAPH_`-prefixed environment variables. Every key of the
//! indexing core is recognised here; components receive plain values,
//! never the whole config.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use onegraph_domain::constants::{
    DEFAULT_EMBEDDING_RETRY_ATTEMPTS, DEFAULT_EMBEDDING_RETRY_BACKOFF, DEFAULT_FAISS_INDEX_FILENAME,
    DEFAULT_FAISS_METADATA_FILENAME, DEFAULT_INDEX_QUEUE_NAME, DEFAULT_JOB_STATE_PREFIX,
    DEFAULT_MAX_EMBEDDING_BATCH, DEFAULT_NEO4J_EDGE_BATCH_SIZE, DEFAULT_NEO4J_NODE_BATCH_SIZE,
    DEFAULT_NEO4J_WRITE_BACKOFF_SEC, DEFAULT_NEO4J_WRITE_MAX_ATTEMPTS,
    DEFAULT_UPLOAD_SESSION_BATCH_SIZE, DEFAULT_UPLOAD_SESSION_DIRNAME,
};
use onegraph_domain::error::{Error, Result};

/// Default configuration file next to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "onegraph.toml";

/// All recognised settings of the indexing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for raw corpora and upload sessions.
    pub workspace_dir: PathBuf,
    /// Root for per-collection vector index artefacts.
    pub indexes_dir: PathBuf,
    /// Directory name for upload sessions under the workspace.
    pub upload_session_dirname: String,
    /// Maximum files per upload part.
    pub upload_session_batch_size: usize,

    /// Texts per embedding API call.
    pub max_embedding_batch: usize,
    /// Retry attempts per embedding batch.
    pub embedding_retry_attempts: usize,
    /// Linear backoff factor (seconds) between embedding retries.
    pub embedding_retry_backoff: f64,
    /// Base URL of the OpenAI-compatible embedding API.
    pub embedding_api_base: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// API key for the embedding service.
    pub openai_api_key: Option<String>,

    /// Bolt URI of the Neo4j server.
    pub neo4j_uri: String,
    /// Neo4j user.
    pub neo4j_username: String,
    /// Neo4j password.
    pub neo4j_password: String,
    /// Neo4j database name.
    pub neo4j_database: String,
    /// Node rows per graph upsert batch.
    pub neo4j_node_batch_size: usize,
    /// Edge rows per graph upsert batch.
    pub neo4j_edge_batch_size: usize,
    /// Attempts per graph write batch.
    pub neo4j_write_max_attempts: usize,
    /// Fixed backoff (seconds) between graph write attempts.
    pub neo4j_write_backoff_sec: f64,

    /// Redis connection URL.
    pub redis_url: String,
    /// Key prefix for persisted job states.
    pub job_state_prefix: String,
    /// Redis list carrying queued index jobs.
    pub index_queue_name: String,

    /// Vector index binary filename.
    pub faiss_index_filename: String,
    /// Vector index metadata sidecar filename.
    pub faiss_metadata_filename: String,

    /// Optional YAML pointer file naming the ontology schema.
    pub graph_schema_config: Option<PathBuf>,
    /// Optional explicit ontology schema path.
    pub graph_schema_path: Option<PathBuf>,

    /// Log level for the tracing subscriber.
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("/workspace"),
            indexes_dir: PathBuf::from("/indexes"),
            upload_session_dirname: DEFAULT_UPLOAD_SESSION_DIRNAME.to_owned(),
            upload_session_batch_size: DEFAULT_UPLOAD_SESSION_BATCH_SIZE,
            max_embedding_batch: DEFAULT_MAX_EMBEDDING_BATCH,
            embedding_retry_attempts: DEFAULT_EMBEDDING_RETRY_ATTEMPTS,
            embedding_retry_backoff: DEFAULT_EMBEDDING_RETRY_BACKOFF,
            embedding_api_base: "https://api.openai.com/v1".to_owned(),
            embedding_model: "text-embedding-3-large".to_owned(),
            openai_api_key: None,
            neo4j_uri: "bolt://neo4j:7687".to_owned(),
            neo4j_username: "neo4j".to_owned(),
            neo4j_password: "neo4j".to_owned(),
            neo4j_database: "neo4j".to_owned(),
            neo4j_node_batch_size: DEFAULT_NEO4J_NODE_BATCH_SIZE,
            neo4j_edge_batch_size: DEFAULT_NEO4J_EDGE_BATCH_SIZE,
            neo4j_write_max_attempts: DEFAULT_NEO4J_WRITE_MAX_ATTEMPTS,
            neo4j_write_backoff_sec: DEFAULT_NEO4J_WRITE_BACKOFF_SEC,
            redis_url: "redis://localhost:6379/0".to_owned(),
            job_state_prefix: DEFAULT_JOB_STATE_PREFIX.to_owned(),
            index_queue_name: DEFAULT_INDEX_QUEUE_NAME.to_owned(),
            faiss_index_filename: DEFAULT_FAISS_INDEX_FILENAME.to_owned(),
            faiss_metadata_filename: DEFAULT_FAISS_METADATA_FILENAME.to_owned(),
            graph_schema_config: None,
            graph_schema_path: None,
            log_level: "info".to_owned(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `onegraph.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a provider value cannot be
    /// deserialised.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(DEFAULT_CONFIG_FILE))
    }

    /// Load configuration from an explicit file and the environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a provider value cannot be
    /// deserialised.
    pub fn load_from(path: &Path) -> Result<Self> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ONEGRAPH_"))
            .extract()
            .map_err(|err| Error::config(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_recognised_key() {
        let config = AppConfig::default();
        assert_eq!(config.max_embedding_batch, 64);
        assert_eq!(config.embedding_retry_attempts, 5);
        assert_eq!(config.neo4j_node_batch_size, 500);
        assert_eq!(config.index_queue_name, "onegraph:indexer:queue");
        assert_eq!(config.faiss_index_filename, "index.faiss");
        assert_eq!(config.faiss_metadata_filename, "chunks.jsonl");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onegraph.toml");
        std::fs::write(
            &path,
            "max_embedding_batch = 16\nworkspace_dir = \"/srv/corpora\"\n",
        )
        .unwrap();
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.max_embedding_batch, 16);
        assert_eq!(config.workspace_dir, PathBuf::from("/srv/corpora"));
        assert_eq!(config.neo4j_edge_batch_size, 500);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.redis_url, "redis://localhost:6379/0");
    }
}
