//! Deterministic name-based GUID derivation.
//!
//! Every synthetic identifier in the extracted graph (module, routine,
//! register and access-right guids, chunk ids) comes from [`stable_guid`].
//! Identical input yields identical output across processes and runs.

use uuid::Uuid;

/// Namespace for all name-based GUIDs.
///
/// Compatibility surface: changing this constant invalidates every
/// previously issued chunk id and node guid.
pub const GUID_NAMESPACE: Uuid = uuid::uuid!("9d2f4c0a-59ac-4b75-9b8d-7e2d8d2cb3a5");

/// Derive the deterministic GUID for a seed string.
#[must_use]
pub fn stable_guid(value: &str) -> String {
    Uuid::new_v5(&GUID_NAMESPACE, value.as_bytes()).to_string()
}
