//! The store-level contract: atomic operations against the shared
//! key-value store, plus the key namespaces each lock flavor uses.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

/// Infrastructure failure inside the store client.
///
/// Carries no lock semantics; the manager converts it into
/// [`LockError::Store`](crate::error::LockError::Store).
#[derive(Error, Debug)]
#[error("store operation failed: {0}")]
pub struct StoreError(#[source] Box<dyn std::error::Error + Send + Sync>);

impl StoreError {
    pub fn new(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(source.into())
    }

    pub(crate) fn into_source(self) -> Box<dyn std::error::Error + Send + Sync> {
        self.0
    }
}

/// Result type for store-level operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic lock operations against the shared store.
///
/// Every method is one indivisible round trip: no other store operation
/// may interleave between the read a method implies and its write, and a
/// failed operation leaves no partial state. Backends typically get this
/// from server-side scripting (Redis Lua) or from a single mutex (the
/// in-memory store).
///
/// `Ok(false)` always means "the lock state refused this" (contention,
/// foreign token, nothing held); infrastructure trouble is `Err`.
pub trait LockStore: Send + Sync {
    /// Sets `key` to `token` only if `key` is absent, applying `lease`
    /// in the same atomic step. Returns whether the key was set.
    fn acquire(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Deletes `key` only if it currently holds `token`. Returns whether
    /// a deletion happened; `false` means the key expired or belongs to
    /// another owner and was left untouched.
    fn release(&self, key: &str, token: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Re-applies `lease` to `key` only if it currently holds `token`.
    fn renew(
        &self,
        key: &str,
        token: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Increments the hold count for `identity` in the counter structure
    /// at `key`. A 0 -> 1 transition is a fresh acquisition and
    /// (re)applies the lease; an already-positive count for the same
    /// identity succeeds immediately. A different identity holding the
    /// structure fails.
    fn reentrant_acquire(
        &self,
        key: &str,
        identity: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Decrements the hold count for `identity`; a count reaching zero
    /// removes the field, and an emptied structure deletes `key`.
    /// Returns `false` when `identity` held nothing (a caller error,
    /// not a store fault).
    fn reentrant_release(
        &self,
        key: &str,
        identity: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Re-applies `lease` to the counter structure if `identity` holds it.
    fn reentrant_renew(
        &self,
        key: &str,
        identity: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// One fair-lock attempt: enqueues `token` at the tail of the wait
    /// queue unless already present (insertion order is arrival order),
    /// then acquires `key` only if it is free AND `token` is at the
    /// queue head, popping the head on success. A failed attempt leaves
    /// the token enqueued so FIFO order survives retries.
    fn fair_acquire(
        &self,
        key: &str,
        queue_key: &str,
        token: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Removes `token` from the wait queue. Called when a waiter gives
    /// up (timeout, cancellation, failed single attempt); skipping this
    /// would stall every waiter behind the abandoned entry.
    fn fair_abandon(
        &self,
        queue_key: &str,
        token: &str,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Records `token` as a reader in the structure at `read_key` unless
    /// the writer key is held, stretching the structure's lease to at
    /// least `lease`. Readers are tracked per token so a stale handle
    /// can never release a hold it no longer owns.
    fn read_acquire(
        &self,
        read_key: &str,
        write_key: &str,
        token: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Removes `token` from the reader structure, deleting `read_key`
    /// when the last reader leaves. Returns `false` without mutating
    /// anything when `token` holds no read lock (stale or foreign
    /// handle).
    fn read_release(
        &self,
        read_key: &str,
        token: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Re-applies `lease` to the reader structure if `token` still holds
    /// a read lock in it.
    fn read_renew(
        &self,
        read_key: &str,
        token: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Sets the writer key to `token` with `lease` only while the writer
    /// key is absent and no reader is recorded.
    fn write_acquire(
        &self,
        write_key: &str,
        read_key: &str,
        token: &str,
        lease: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;
}

/// Key namespaces for the lock flavors.
///
/// Every flavor of one logical resource lives under a distinct suffix so
/// the variants never collide in the store.
#[derive(Debug, Clone)]
pub struct Keyspace {
    prefix: String,
}

pub(crate) const KEY_SEPARATOR: char = ':';

impl Keyspace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for the simple and fair flavors (the fair queue gates entry
    /// to the same key a simple lock would take).
    pub fn lock(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Counter structure for the reentrant flavor.
    pub fn reentrant(&self, key: &str) -> String {
        format!("{}:{}:rt", self.prefix, key)
    }

    /// Wait queue for the fair flavor.
    pub fn queue(&self, key: &str) -> String {
        format!("{}:{}:queue", self.prefix, key)
    }

    /// Shared reader count of the read-write pair.
    pub fn readers(&self, key: &str) -> String {
        format!("{}:{}:readers", self.prefix, key)
    }

    /// Exclusive writer key of the read-write pair.
    pub fn writer(&self, key: &str) -> String {
        format!("{}:{}:writer", self.prefix, key)
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new("storelock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flavor_namespaces_are_distinct() {
        let ks = Keyspace::default();
        let keys = [
            ks.lock("orders"),
            ks.reentrant("orders"),
            ks.queue("orders"),
            ks.readers("orders"),
            ks.writer("orders"),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn custom_prefix_is_applied() {
        let ks = Keyspace::new("app-locks");
        assert_eq!(ks.lock("r"), "app-locks:r");
        assert_eq!(ks.writer("r"), "app-locks:r:writer");
    }
}
