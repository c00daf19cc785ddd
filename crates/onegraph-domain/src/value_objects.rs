//! Immutable validated value objects.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Maximum length of a collection name.
const COLLECTION_MAX_LEN: usize = 100;

/// User-supplied collection namespace.
///
/// Every persisted artefact (raw corpus, graph edges, vector index) is
/// scoped by collection. Valid names match `^[A-Za-z0-9_-]{1,100}$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(String);

impl CollectionId {
    /// Validate and wrap a collection name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] when the name is empty, longer
    /// than 100 characters, or contains characters outside
    /// `[A-Za-z0-9_-]`.
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.len() > COLLECTION_MAX_LEN {
            return Err(Error::invalid_argument(format!(
                "invalid collection name '{value}': must be 1..=100 characters"
            )));
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(Error::invalid_argument(format!(
                "invalid collection name '{value}': only [A-Za-z0-9_-] allowed"
            )));
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// The validated name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
