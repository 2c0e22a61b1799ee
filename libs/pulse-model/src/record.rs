//! Per-entity persistence contract
//!
//! Upserts, retry replay and reconciliation work through these traits instead
//! of inspecting record types at runtime.

use serde::{de::DeserializeOwned, Serialize};

/// A persistable entity with a numeric primary key.
///
/// A key of `0` means "not yet assigned"; the store inserts and assigns one.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Type tag recorded in retry envelopes
    const TYPE_TAG: &'static str;

    fn key(&self) -> i64;

    fn set_key(&mut self, key: i64);

    /// Overwrite every non-key field with `other`'s current values
    fn apply_from(&mut self, other: &Self);
}

/// A record that takes part in store reconciliation
pub trait SyncEntity: Record {
    /// Deterministic hash of every field except the key
    fn content_hash(&self) -> String;
}
