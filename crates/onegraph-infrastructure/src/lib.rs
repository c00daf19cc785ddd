//! # Infrastructure Layer
//!
//! Configuration, logging and the concrete adapters behind the domain
//! ports: Redis job store and queue, Neo4j graph store, the flat dense
//! vector index, and the HTTP embedding provider.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`config`] | Figment-based application configuration |
//! | [`logging`] | Tracing subscriber setup |
//! | [`adapters`] | Port implementations over external services |

/// Port implementations over external services.
pub mod adapters;
/// Application configuration.
pub mod config;
/// Structured logging setup.
pub mod logging;

pub use adapters::embedding::HttpEmbeddingProvider;
pub use adapters::neo4j::Neo4jGraphStore;
pub use adapters::redis_jobs::{RedisJobQueue, RedisJobStore, connect_redis};
pub use adapters::vector_index::{FlatIndexProvider, FlatVectorIndex, VectorHit};
pub use config::AppConfig;
pub use logging::{init_logging, parse_log_level};
