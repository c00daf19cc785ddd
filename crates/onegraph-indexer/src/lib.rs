//! # Indexing Pipeline
//!
//! The asynchronous, multi-phase subsystem that consumes an uploaded raw
//! corpus of 1C Enterprise sources, extracts a typed property graph and a
//! text corpus, validates both against the ontology, writes them into the
//! graph database and the vector store, and publishes continuous progress
//! while tolerating partial failure.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`loader`] | Directory walk, decoding, extension classification |
//! | [`extractors`] | Per-format parsers producing nodes, edges, text units |
//! | [`chunker`] | Paragraph-preserving splitter with overlap |
//! | [`schema`] | Ontology loading and extraction validation |
//! | [`embedding`] | Batched, retried embedding computation |
//! | [`graph_writer`] | Chunked idempotent graph upserts |
//! | [`pipeline`] | Phase orchestration, merging, progress, failure policy |
//! | [`worker`] | Dequeuing consumer with startup recovery |
//! | [`upload`] | Upload-session protocol seeding jobs |

/// Paragraph-preserving text chunking.
pub mod chunker;
/// Batched embedding computation with retries.
pub mod embedding;
/// Per-format extractors.
pub mod extractors;
/// Batched graph upserts.
pub mod graph_writer;
/// Raw corpus loading.
pub mod loader;
/// Phase orchestration.
pub mod pipeline;
/// Ontology validation.
pub mod schema;
/// Upload-session protocol.
pub mod upload;
/// Dequeuing worker and recovery.
pub mod worker;

pub use chunker::chunk_text_units;
pub use embedding::EmbeddingBatcher;
pub use extractors::extract_document;
pub use graph_writer::{GraphWriter, NoProgress, WriteContext, WriteProgress};
pub use loader::{LoadedDocument, load_documents};
pub use pipeline::{IndexingPipeline, JobTracker};
pub use schema::SchemaValidator;
pub use upload::{UploadSessionManager, UploadedFile};
pub use worker::Worker;
