use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

/// Remote key-value cache contract.
///
/// Implementations wrap a networked cache (or an in-process map) and must
/// satisfy these rules:
/// - Keys with an elapsed TTL are invisible to every read operation.
/// - `keys_with_prefix` enumerates live keys only.
/// - All operations may block on the network; callers treat failures as
///   transient unless told otherwise.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Returns `Ok(None)` if absent or expired.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write a value, replacing any previous value and TTL.
    ///
    /// `ttl = None` stores the value without expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Delete a key. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Reset the TTL of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remaining TTL of a key, `None` if absent or stored without expiry.
    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// List all live keys starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>>;

    /// Delete every key starting with `prefix` and return how many were removed.
    ///
    /// Default implementation enumerates then deletes. Backends with native
    /// pattern deletion should override it.
    async fn delete_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let keys = self.keys_with_prefix(prefix).await?;
        let mut removed = 0;
        for key in keys {
            if self.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> StoreResult<()> {
        self.get("__vrepo:ping").await.map(|_| ())
    }
}
