//! # Domain Layer
//!
//! Core types for the OneGraph indexing service: the property-graph data
//! model extracted from 1C Enterprise sources, job and upload-session
//! state, deterministic identity, and the ports the application layer
//! consumes.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`entities`] | Graph nodes/edges, chunks, jobs, upload sessions |
//! | [`value_objects`] | Validated collection identifiers |
//! | [`identity`] | Deterministic name-based GUIDs |
//! | [`ports`] | External provider and store interfaces |
//! | [`constants`] | Shared defaults and fixed tables |
//! | [`error`] | Domain error type |

/// Shared defaults and fixed tables.
pub mod constants;
/// Graph, job and upload-session entities.
pub mod entities;
/// Domain error types.
pub mod error;
/// Deterministic name-based GUID derivation.
pub mod identity;
/// External provider and store port interfaces.
pub mod ports;
/// Immutable validated value objects.
pub mod value_objects;

pub use entities::*;
pub use error::{Error, Result};
pub use identity::{GUID_NAMESPACE, stable_guid};
pub use value_objects::CollectionId;
