//! Concrete adapters behind the domain ports.

/// OpenAI-compatible HTTP embedding provider.
pub mod embedding;
/// Neo4j bolt adapter for the graph store port.
pub mod neo4j;
/// Redis adapters for the job store and queue ports.
pub mod redis_jobs;
/// Flat dense inner-product vector index.
pub mod vector_index;
