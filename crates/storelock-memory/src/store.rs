//! Mutex-serialized implementation of the store contract.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use storelock_core::store::{LockStore, StoreResult};

/// How long an abandoned fair-queue entry may outlive its last refresh.
/// Live waiters re-stamp the queue deadline on every attempt; only a
/// crashed waiter's entry ever ages out through this.
const QUEUE_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug)]
enum Entry {
    /// Simple / fair / writer key: one owner token.
    Value { token: String, deadline: Instant },
    /// Reentrant structure (hold count per owner identity) and the
    /// reader side of the read-write pair (one field per reader token).
    Counts {
        holders: HashMap<String, u64>,
        deadline: Instant,
    },
    /// Fair-lock wait queue in arrival order.
    Queue {
        waiting: VecDeque<String>,
        deadline: Instant,
    },
}

impl Entry {
    fn deadline(&self) -> Instant {
        match self {
            Entry::Value { deadline, .. }
            | Entry::Counts { deadline, .. }
            | Entry::Queue { deadline, .. } => *deadline,
        }
    }
}

/// Returns the entry at `key` if it has not expired, purging it if it
/// has. No key in the map means unlocked.
fn live<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if let Some(entry) = map.get(key) {
        if entry.deadline() <= now {
            map.remove(key);
            return None;
        }
    }
    map.get_mut(key)
}

/// In-memory [`LockStore`]: one mutex, so atomicity by construction.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T) -> T {
        let now = Instant::now();
        let mut map = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut map, now)
    }

    /// Number of live waiters in the fair queue at `queue_key`.
    /// Diagnostic accessor; the protocol itself never reads it.
    pub fn waiting(&self, queue_key: &str) -> usize {
        self.with_map(|map, now| match live(map, queue_key, now) {
            Some(Entry::Queue { waiting, .. }) => waiting.len(),
            _ => 0,
        })
    }

    /// Whether any live entry exists at the full store key.
    pub fn holds(&self, key: &str) -> bool {
        self.with_map(|map, now| live(map, key, now).is_some())
    }
}

impl LockStore for MemoryStore {
    async fn acquire(&self, key: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            if live(map, key, now).is_some() {
                return false;
            }
            map.insert(
                key.to_string(),
                Entry::Value {
                    token: token.to_string(),
                    deadline: now + lease,
                },
            );
            true
        }))
    }

    async fn release(&self, key: &str, token: &str) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            let owned = matches!(
                live(map, key, now),
                Some(Entry::Value { token: held, .. }) if held == token
            );
            if owned {
                map.remove(key);
            }
            owned
        }))
    }

    async fn renew(&self, key: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| match live(map, key, now) {
            Some(Entry::Value {
                token: held,
                deadline,
            }) if held == token => {
                *deadline = now + lease;
                true
            }
            _ => false,
        }))
    }

    async fn reentrant_acquire(
        &self,
        key: &str,
        identity: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| match live(map, key, now) {
            None => {
                let mut holders = HashMap::new();
                holders.insert(identity.to_string(), 1);
                map.insert(
                    key.to_string(),
                    Entry::Counts {
                        holders,
                        deadline: now + lease,
                    },
                );
                true
            }
            Some(Entry::Counts { holders, deadline }) => {
                if let Some(count) = holders.get_mut(identity) {
                    *count += 1;
                    *deadline = now + lease;
                    true
                } else if holders.is_empty() {
                    holders.insert(identity.to_string(), 1);
                    *deadline = now + lease;
                    true
                } else {
                    false
                }
            }
            Some(_) => false,
        }))
    }

    async fn reentrant_release(&self, key: &str, identity: &str) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            let mut delete_key = false;
            let released = match live(map, key, now) {
                Some(Entry::Counts { holders, .. }) => {
                    if let Some(count) = holders.get_mut(identity) {
                        if *count > 1 {
                            *count -= 1;
                        } else {
                            holders.remove(identity);
                            delete_key = holders.is_empty();
                        }
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if delete_key {
                map.remove(key);
            }
            released
        }))
    }

    async fn reentrant_renew(
        &self,
        key: &str,
        identity: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| match live(map, key, now) {
            Some(Entry::Counts { holders, deadline }) if holders.contains_key(identity) => {
                *deadline = now + lease;
                true
            }
            _ => false,
        }))
    }

    async fn fair_acquire(
        &self,
        key: &str,
        queue_key: &str,
        token: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            let queue_deadline = now + lease + QUEUE_GRACE;

            // Enqueue if absent; every attempt re-stamps the queue TTL.
            match live(map, queue_key, now) {
                Some(Entry::Queue { waiting, deadline }) => {
                    if !waiting.iter().any(|t| t == token) {
                        waiting.push_back(token.to_string());
                    }
                    *deadline = queue_deadline;
                }
                _ => {
                    map.insert(
                        queue_key.to_string(),
                        Entry::Queue {
                            waiting: VecDeque::from([token.to_string()]),
                            deadline: queue_deadline,
                        },
                    );
                }
            }

            let lock_free = live(map, key, now).is_none();
            let at_head = matches!(
                live(map, queue_key, now),
                Some(Entry::Queue { waiting, .. })
                    if waiting.front().map(String::as_str) == Some(token)
            );
            if !(lock_free && at_head) {
                return false;
            }

            let mut queue_empty = false;
            if let Some(Entry::Queue { waiting, .. }) = live(map, queue_key, now) {
                waiting.pop_front();
                queue_empty = waiting.is_empty();
            }
            if queue_empty {
                map.remove(queue_key);
            }
            map.insert(
                key.to_string(),
                Entry::Value {
                    token: token.to_string(),
                    deadline: now + lease,
                },
            );
            true
        }))
    }

    async fn fair_abandon(&self, queue_key: &str, token: &str) -> StoreResult<()> {
        self.with_map(|map, now| {
            let mut queue_empty = false;
            if let Some(Entry::Queue { waiting, .. }) = live(map, queue_key, now) {
                waiting.retain(|t| t != token);
                queue_empty = waiting.is_empty();
            }
            if queue_empty {
                map.remove(queue_key);
            }
        });
        Ok(())
    }

    async fn read_acquire(
        &self,
        read_key: &str,
        write_key: &str,
        token: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            if live(map, write_key, now).is_some() {
                return false;
            }
            match live(map, read_key, now) {
                Some(Entry::Counts { holders, deadline }) => {
                    holders.insert(token.to_string(), 1);
                    *deadline = (*deadline).max(now + lease);
                }
                _ => {
                    let mut holders = HashMap::new();
                    holders.insert(token.to_string(), 1);
                    map.insert(
                        read_key.to_string(),
                        Entry::Counts {
                            holders,
                            deadline: now + lease,
                        },
                    );
                }
            }
            true
        }))
    }

    async fn read_release(&self, read_key: &str, token: &str) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            let mut delete_key = false;
            let released = match live(map, read_key, now) {
                Some(Entry::Counts { holders, .. }) => {
                    // Only a token that actually holds a read lock may
                    // mutate the structure; a stale handle changes
                    // nothing.
                    if holders.remove(token).is_some() {
                        delete_key = holders.is_empty();
                        true
                    } else {
                        false
                    }
                }
                _ => false,
            };
            if delete_key {
                map.remove(read_key);
            }
            released
        }))
    }

    async fn read_renew(&self, read_key: &str, token: &str, lease: Duration) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| match live(map, read_key, now) {
            Some(Entry::Counts { holders, deadline }) if holders.contains_key(token) => {
                *deadline = now + lease;
                true
            }
            _ => false,
        }))
    }

    async fn write_acquire(
        &self,
        write_key: &str,
        read_key: &str,
        token: &str,
        lease: Duration,
    ) -> StoreResult<bool> {
        Ok(self.with_map(|map, now| {
            if live(map, write_key, now).is_some() {
                return false;
            }
            if matches!(
                live(map, read_key, now),
                Some(Entry::Counts { holders, .. }) if !holders.is_empty()
            ) {
                return false;
            }
            map.insert(
                write_key.to_string(),
                Entry::Value {
                    token: token.to_string(),
                    deadline: now + lease,
                },
            );
            true
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn second_acquire_fails_until_release() {
        let store = MemoryStore::new();
        assert!(store.acquire("k", "a", LEASE).await.unwrap());
        assert!(!store.acquire("k", "b", LEASE).await.unwrap());
        assert!(store.release("k", "a").await.unwrap());
        assert!(store.acquire("k", "b", LEASE).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_token_cannot_release() {
        let store = MemoryStore::new();
        assert!(store.acquire("k", "a", LEASE).await.unwrap());
        assert!(!store.release("k", "b").await.unwrap());
        // Key untouched by the failed release.
        assert!(store.holds("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn lease_expiry_frees_the_key() {
        let store = MemoryStore::new();
        assert!(store.acquire("k", "a", Duration::from_millis(100)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(store.acquire("k", "b", LEASE).await.unwrap());
        // The stale holder's release must now fail.
        assert!(!store.release("k", "a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn renew_extends_only_for_the_owner() {
        let store = MemoryStore::new();
        assert!(store.acquire("k", "a", Duration::from_millis(100)).await.unwrap());
        assert!(!store.renew("k", "b", LEASE).await.unwrap());
        assert!(store.renew("k", "a", Duration::from_millis(300)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.holds("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn reentrant_counts_nest_and_unwind() {
        let store = MemoryStore::new();
        for _ in 0..3 {
            assert!(store.reentrant_acquire("k", "me", LEASE).await.unwrap());
        }
        assert!(!store.reentrant_acquire("k", "other", LEASE).await.unwrap());
        for _ in 0..3 {
            assert!(store.reentrant_release("k", "me").await.unwrap());
        }
        // Fully unwound: the key is gone and an extra release fails.
        assert!(!store.holds("k"));
        assert!(!store.reentrant_release("k", "me").await.unwrap());
        assert!(store.reentrant_acquire("k", "other", LEASE).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn fair_queue_admits_in_arrival_order() {
        let store = MemoryStore::new();
        assert!(store.fair_acquire("k", "q", "w1", LEASE).await.unwrap());
        assert!(!store.fair_acquire("k", "q", "w2", LEASE).await.unwrap());
        assert!(!store.fair_acquire("k", "q", "w3", LEASE).await.unwrap());
        assert!(store.release("k", "w1").await.unwrap());
        // w3 retries first but w2 is at the head.
        assert!(!store.fair_acquire("k", "q", "w3", LEASE).await.unwrap());
        assert!(store.fair_acquire("k", "q", "w2", LEASE).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoning_a_waiter_unblocks_the_next() {
        let store = MemoryStore::new();
        assert!(store.fair_acquire("k", "q", "w1", LEASE).await.unwrap());
        assert!(!store.fair_acquire("k", "q", "w2", LEASE).await.unwrap());
        assert!(!store.fair_acquire("k", "q", "w3", LEASE).await.unwrap());
        store.fair_abandon("q", "w2").await.unwrap();
        assert!(store.release("k", "w1").await.unwrap());
        assert!(store.fair_acquire("k", "q", "w3", LEASE).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn readers_share_writers_exclude() {
        let store = MemoryStore::new();
        assert!(store.read_acquire("r", "w", "a", LEASE).await.unwrap());
        assert!(store.read_acquire("r", "w", "b", LEASE).await.unwrap());
        assert!(!store.write_acquire("w", "r", "t", LEASE).await.unwrap());
        assert!(store.read_release("r", "a").await.unwrap());
        assert!(!store.write_acquire("w", "r", "t", LEASE).await.unwrap());
        assert!(store.read_release("r", "b").await.unwrap());
        assert!(store.write_acquire("w", "r", "t", LEASE).await.unwrap());
        assert!(!store.read_acquire("r", "w", "c", LEASE).await.unwrap());
        assert!(store.release("w", "t").await.unwrap());
        assert!(store.read_acquire("r", "w", "c", LEASE).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn read_release_without_hold_fails() {
        let store = MemoryStore::new();
        assert!(!store.read_release("r", "a").await.unwrap());
        // A token that never acquired cannot touch live readers either.
        assert!(store.read_acquire("r", "w", "b", LEASE).await.unwrap());
        assert!(!store.read_release("r", "a").await.unwrap());
        assert!(store.holds("r"));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_reader_token_cannot_release_a_fresh_hold() {
        let store = MemoryStore::new();
        assert!(
            store
                .read_acquire("r", "w", "stale", Duration::from_millis(100))
                .await
                .unwrap()
        );
        tokio::time::sleep(Duration::from_millis(150)).await;

        // A fresh reader takes over after the expiry.
        assert!(store.read_acquire("r", "w", "live", LEASE).await.unwrap());

        // The expired token's release fails and leaves the structure
        // untouched, so writers stay excluded.
        assert!(!store.read_release("r", "stale").await.unwrap());
        assert!(!store.write_acquire("w", "r", "t", LEASE).await.unwrap());

        assert!(store.read_release("r", "live").await.unwrap());
        assert!(store.write_acquire("w", "r", "t", LEASE).await.unwrap());
    }
}
