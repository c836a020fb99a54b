//! Persistent key/value storage behind the state slices
//!
//! # Architecture
//!
//! - `KeyValueStore` trait: async single-key get/set/remove
//! - `SqliteStore`: durable on-device storage (primary)
//! - `MemoryStore`: process-local map for ephemeral sessions and tests
//!
//! There is no multi-key atomic write. Each key is owned by exactly one
//! slice (see [`keys`]), which stands in for locking between slices.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage keys, one owner slice each
pub mod keys {
    pub const USER_BALANCE: &str = "user.balance";
    pub const USER_NAME: &str = "user.name";
    pub const USER_REGISTERED: &str = "user.registered";
    pub const MOVEMENTS: &str = "movements.ledger";
    pub const AVATAR: &str = "avatar.selected";
    pub const NOTIFICATIONS: &str = "notifications.preferences";
    pub const PASSWORD: &str = "security.password";
}

/// Durable key/value storage
///
/// `get` on a missing key is `Ok(None)`. Errors are real faults (I/O,
/// quota, closed pool) and slices treat them as recoverable.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Short backend name for log lines
    fn backend_name(&self) -> &str;
}

/// Write a value, downgrading a fault to a warning
///
/// Returns whether the value reached storage.
pub(crate) async fn persist(store: &dyn KeyValueStore, key: &str, value: &str) -> bool {
    match store.set(key, value).await {
        Ok(()) => {
            tracing::debug!(key, backend = store.backend_name(), "Persisted");
            true
        }
        Err(e) => {
            tracing::warn!(
                key,
                backend = store.backend_name(),
                error = %e,
                "Failed to persist, keeping in-memory value"
            );
            false
        }
    }
}

/// Remove a key, downgrading a fault to a warning
pub(crate) async fn erase(store: &dyn KeyValueStore, key: &str) -> bool {
    match store.remove(key).await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                key,
                backend = store.backend_name(),
                error = %e,
                "Failed to remove persisted key"
            );
            false
        }
    }
}

/// Outcome of loading one key
pub(crate) enum Loaded {
    Present(String),
    Absent,
    /// Read failed; nothing derived from a fallback may be written back
    Faulted,
}

pub(crate) async fn load(store: &dyn KeyValueStore, key: &str) -> Loaded {
    match store.get(key).await {
        Ok(Some(value)) => Loaded::Present(value),
        Ok(None) => Loaded::Absent,
        Err(e) => {
            tracing::warn!(
                key,
                backend = store.backend_name(),
                error = %e,
                "Failed to read persisted key, using fallback"
            );
            Loaded::Faulted
        }
    }
}

/// Encode a value as JSON and write it, downgrading any failure to a warning
pub(crate) async fn persist_json<T>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool
where
    T: Serialize + ?Sized,
{
    match serde_json::to_string(value).map_err(StorageError::from) {
        Ok(raw) => persist(store, key, &raw).await,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to encode value, keeping in-memory value");
            false
        }
    }
}

/// Decode a stored JSON value; malformed data is logged and reads as absent
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw).map_err(StorageError::from) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Stored value is malformed, treating as absent");
            None
        }
    }
}
