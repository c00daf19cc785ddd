//! Text chunks, the atomic unit of embedding and retrieval.

use serde::{Deserialize, Serialize};

use crate::constants::TEXT_SNIPPET_LEN;
use crate::entities::graph::NodeKey;

/// A contiguous span of a routine body or free text.
///
/// `chunk_id` is deterministic: the same `(node key, locator, segment
/// index)` always yields the same id across re-runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic chunk identifier.
    pub chunk_id: String,
    /// Chunk text, including any overlap prefix.
    pub text: String,
    /// Source path or signature inherited from the text unit.
    pub path: String,
    /// Optional locator inherited from the text unit.
    pub locator: Option<String>,
    /// The node this chunk belongs to.
    pub node_key: NodeKey,
}

/// One row of the vector index metadata sidecar (`chunks.jsonl`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Deterministic chunk identifier.
    pub chunk_id: String,
    /// Graph element id of the owning node, when resolved.
    pub node_id: Option<String>,
    /// Source path or signature.
    pub path: String,
    /// Optional locator.
    pub locator: Option<String>,
    /// Full chunk text.
    pub text: String,
    /// Leading snippet of the text for compact display.
    pub text_snippet: String,
}

impl ChunkRecord {
    /// Build a sidecar row for a chunk and its resolved node id.
    #[must_use]
    pub fn new(chunk: &Chunk, node_id: Option<String>) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            node_id,
            path: chunk.path.clone(),
            locator: chunk.locator.clone(),
            text: chunk.text.clone(),
            text_snippet: snippet(&chunk.text),
        }
    }
}

/// First [`TEXT_SNIPPET_LEN`] characters of a text, char-boundary safe.
#[must_use]
pub fn snippet(text: &str) -> String {
    text.chars().take(TEXT_SNIPPET_LEN).collect()
}
