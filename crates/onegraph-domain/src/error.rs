//! Error handling types

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the OneGraph indexing service
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Missing configuration field
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    /// Invalid argument provided by a caller
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument
        message: String,
    },

    /// Extracted data violates the ontology contract. Fatal to the job.
    #[error("Schema validation failed: {message}")]
    SchemaValidation {
        /// Description of the violation
        message: String,
        /// Source document path, when known
        path: Option<String>,
    },

    /// Per-document extraction failure. Soft: the job continues.
    #[error("Extraction failed for '{path}': {message}")]
    Extraction {
        /// Description of the failure
        message: String,
        /// Source document path
        path: String,
    },

    /// Embedding provider operation error
    #[error("Embedding provider error: {message}")]
    Embedding {
        /// Description of the embedding error
        message: String,
    },

    /// Graph database operation error
    #[error("Graph database error: {message}")]
    GraphDb {
        /// Description of the graph database error
        message: String,
        /// Backend error code, when the driver surfaces one
        code: Option<String>,
    },

    /// Inconsistent extraction output handed to the graph writer
    #[error("Data model error: {message}")]
    DataModel {
        /// Description of the inconsistency
        message: String,
    },

    /// Vector index build, persistence or query error
    #[error("Vector index error: {message}")]
    VectorIndex {
        /// Description of the vector index error
        message: String,
    },

    /// Queue operation error
    #[error("Queue error: {message}")]
    Queue {
        /// Description of the queue error
        message: String,
    },

    /// Job store or session store operation error
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error
        message: String,
    },

    /// Upload session is not in the status the operation requires
    #[error("Session conflict: {message}")]
    SessionConflict {
        /// Description of the conflict
        message: String,
    },

    /// Resource not found
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },
}

impl Error {
    /// Configuration error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Invalid-argument error from a message.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Schema validation error with an optional source path.
    pub fn schema_validation(message: impl Into<String>, path: Option<&str>) -> Self {
        Self::SchemaValidation {
            message: message.into(),
            path: path.map(str::to_owned),
        }
    }

    /// Embedding provider error from a message.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Graph database error without a backend code.
    pub fn graph_db(message: impl Into<String>) -> Self {
        Self::GraphDb {
            message: message.into(),
            code: None,
        }
    }

    /// Data model error from a message.
    pub fn data_model(message: impl Into<String>) -> Self {
        Self::DataModel {
            message: message.into(),
        }
    }

    /// Vector index error from a message.
    pub fn vector_index(message: impl Into<String>) -> Self {
        Self::VectorIndex {
            message: message.into(),
        }
    }

    /// Queue error from a message.
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
        }
    }

    /// Storage error from a message.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Session conflict error from a message.
    pub fn session_conflict(message: impl Into<String>) -> Self {
        Self::SessionConflict {
            message: message.into(),
        }
    }

    /// Whether the operation may be retried against the same backend.
    ///
    /// Graph and embedding backends fail transiently under load; the
    /// writer and batcher retry those. Everything else is deterministic.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::GraphDb { .. } | Self::Embedding { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(Error::graph_db("deadlock").is_transient());
        assert!(Error::embedding("rate limited").is_transient());
        assert!(!Error::invalid_argument("bad collection").is_transient());
        assert!(!Error::schema_validation("missing prop", None).is_transient());
    }
}
