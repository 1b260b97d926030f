//! The lock manager: the public face of the protocol, composing the
//! store contract and the acquisition controller into four lock flavors.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{Span, instrument};

use crate::acquire::acquire_with_retry;
use crate::backoff::Backoff;
use crate::error::{LockError, LockResult};
use crate::handle::{LockFlavor, LockHandle, OwnerIdentity, create_token};
use crate::store::{KEY_SEPARATOR, Keyspace, LockStore};

/// The store keys one acquisition operates on, resolved per flavor.
#[derive(Debug)]
enum Target {
    Simple { key: String },
    Reentrant { key: String },
    Fair { key: String, queue: String },
    Read { readers: String, writer: String },
    Write { writer: String, readers: String },
}

impl Target {
    fn new(keyspace: &Keyspace, flavor: LockFlavor, key: &str) -> Self {
        match flavor {
            LockFlavor::Simple => Target::Simple {
                key: keyspace.lock(key),
            },
            LockFlavor::Reentrant => Target::Reentrant {
                key: keyspace.reentrant(key),
            },
            LockFlavor::Fair => Target::Fair {
                key: keyspace.lock(key),
                queue: keyspace.queue(key),
            },
            LockFlavor::Read => Target::Read {
                readers: keyspace.readers(key),
                writer: keyspace.writer(key),
            },
            LockFlavor::Write => Target::Write {
                writer: keyspace.writer(key),
                readers: keyspace.readers(key),
            },
        }
    }
}

/// One atomic acquisition attempt, ready to be retried by the
/// controller.
struct Attempt<'a, S> {
    store: &'a S,
    target: &'a Target,
    token: &'a str,
    lease: Duration,
}

impl<S: LockStore> Attempt<'_, S> {
    async fn once(&self) -> LockResult<bool> {
        let acquired = match self.target {
            Target::Simple { key } => self.store.acquire(key, self.token, self.lease).await?,
            Target::Reentrant { key } => {
                self.store
                    .reentrant_acquire(key, self.token, self.lease)
                    .await?
            }
            Target::Fair { key, queue } => {
                self.store
                    .fair_acquire(key, queue, self.token, self.lease)
                    .await?
            }
            Target::Read { readers, writer } => {
                self.store
                    .read_acquire(readers, writer, self.token, self.lease)
                    .await?
            }
            Target::Write { writer, readers } => {
                self.store
                    .write_acquire(writer, readers, self.token, self.lease)
                    .await?
            }
        };
        Ok(acquired)
    }
}

/// Builder for a [`LockManager`].
pub struct LockManagerBuilder<S> {
    store: S,
    keyspace: Keyspace,
    backoff: Backoff,
}

impl<S: LockStore> LockManagerBuilder<S> {
    /// Sets the key namespace prefix (default `storelock`).
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.keyspace = Keyspace::new(prefix);
        self
    }

    /// Sets the retry backoff for blocking acquisition.
    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn build(self) -> LockManager<S> {
        LockManager {
            store: Arc::new(self.store),
            keyspace: self.keyspace,
            backoff: self.backoff,
        }
    }
}

/// Coordinates mutual exclusion across processes through a shared store.
///
/// The manager holds no lock state of its own: everything lives in the
/// store, so any number of managers in any number of processes may
/// operate on the same keys concurrently.
///
/// # Example
///
/// ```rust,ignore
/// let manager = LockManager::new(store);
///
/// if let Some(handle) = manager
///     .acquire("invoice-42", LockFlavor::Simple,
///              Duration::from_secs(1), Duration::from_secs(30))
///     .await?
/// {
///     // Critical section - we hold the lock.
///     process_invoice().await;
///     manager.release(handle).await?;
/// }
/// ```
pub struct LockManager<S> {
    store: Arc<S>,
    keyspace: Keyspace,
    backoff: Backoff,
}

impl<S: LockStore> LockManager<S> {
    /// Creates a manager with default namespace and backoff.
    pub fn new(store: S) -> Self {
        Self::builder(store).build()
    }

    /// Returns a builder for custom configuration.
    pub fn builder(store: S) -> LockManagerBuilder<S> {
        LockManagerBuilder {
            store,
            keyspace: Keyspace::default(),
            backoff: Backoff::default(),
        }
    }

    /// The underlying store client.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The key namespace this manager operates in.
    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    /// Acquires `key`, waiting up to `wait` with jittered backoff
    /// between attempts.
    ///
    /// Returns `Ok(None)` when the wait budget is exhausted; failing to
    /// acquire is a routine outcome, not an error. The calling task
    /// suspends cooperatively between attempts.
    pub async fn acquire(
        &self,
        key: &str,
        flavor: LockFlavor,
        wait: Duration,
        lease: Duration,
    ) -> LockResult<Option<LockHandle>> {
        let (_tx, cancel) = watch::channel(false);
        self.acquire_with_cancel(key, flavor, wait, lease, cancel)
            .await
    }

    /// Like [`acquire`](Self::acquire), but abortable through an
    /// external signal: sending `true` on the paired `watch::Sender`
    /// ends the wait with [`LockError::Cancelled`].
    ///
    /// A cancelled or timed-out fair acquisition removes its queue
    /// entry before returning, so abandoned waiters never stall the
    /// waiters behind them.
    #[instrument(
        skip(self, cancel),
        fields(
            lock.key = %key,
            flavor = %flavor,
            wait = ?wait,
            lease = ?lease,
            acquired = tracing::field::Empty,
            elapsed_ms = tracing::field::Empty,
        )
    )]
    pub async fn acquire_with_cancel(
        &self,
        key: &str,
        flavor: LockFlavor,
        wait: Duration,
        lease: Duration,
        cancel: watch::Receiver<bool>,
    ) -> LockResult<Option<LockHandle>> {
        self.validate(key, lease)?;

        let start = Instant::now();
        let token = token_for(flavor);
        let target = Target::new(&self.keyspace, flavor, key);
        let backoff = self.backoff.clamped_to_lease(lease);

        let attempt = Attempt {
            store: self.store.as_ref(),
            target: &target,
            token: &token,
            lease,
        };
        let attempt_ref = &attempt;
        let outcome = acquire_with_retry(move || attempt_ref.once(), wait, backoff, &cancel).await;

        match outcome {
            Ok(true) => {
                Span::current().record("acquired", true);
                Span::current().record("elapsed_ms", start.elapsed().as_millis() as u64);
                Ok(Some(LockHandle::new(
                    key.to_string(),
                    token,
                    lease,
                    flavor,
                )))
            }
            Ok(false) => {
                self.abandon_if_fair(&target, &token).await?;
                Span::current().record("acquired", false);
                Ok(None)
            }
            Err(LockError::Cancelled) => {
                self.abandon_if_fair(&target, &token).await?;
                Err(LockError::Cancelled)
            }
            Err(err) => Err(err),
        }
    }

    /// Issues exactly one atomic acquire and reports its result; never
    /// retries internally. For callers running their own retry policy
    /// or firing speculative attempts concurrently.
    #[instrument(
        skip(self),
        fields(lock.key = %key, flavor = %flavor, lease = ?lease, acquired = tracing::field::Empty)
    )]
    pub async fn try_acquire(
        &self,
        key: &str,
        flavor: LockFlavor,
        lease: Duration,
    ) -> LockResult<Option<LockHandle>> {
        self.validate(key, lease)?;

        let token = token_for(flavor);
        let target = Target::new(&self.keyspace, flavor, key);
        let attempt = Attempt {
            store: self.store.as_ref(),
            target: &target,
            token: &token,
            lease,
        };

        if attempt.once().await? {
            Span::current().record("acquired", true);
            Ok(Some(LockHandle::new(
                key.to_string(),
                token,
                lease,
                flavor,
            )))
        } else {
            // A one-shot caller is not a waiter; leave no queue entry.
            self.abandon_if_fair(&target, &token).await?;
            Span::current().record("acquired", false);
            Ok(None)
        }
    }

    /// Releases a held lock, consuming the handle.
    ///
    /// Returns `Ok(false)` when the store no longer credits this handle
    /// with the lock - the lease expired or another owner holds the key
    /// now. Expected under lease-expiry races; never an error.
    #[instrument(
        skip(self, handle),
        fields(lock.key = %handle.key(), flavor = %handle.flavor(), released = tracing::field::Empty)
    )]
    pub async fn release(&self, handle: LockHandle) -> LockResult<bool> {
        let target = Target::new(&self.keyspace, handle.flavor, &handle.key);
        let released = match &target {
            Target::Simple { key } | Target::Fair { key, .. } => {
                self.store.release(key, &handle.token).await?
            }
            Target::Reentrant { key } => self.store.reentrant_release(key, &handle.token).await?,
            Target::Read { readers, .. } => {
                self.store.read_release(readers, &handle.token).await?
            }
            Target::Write { writer, .. } => self.store.release(writer, &handle.token).await?,
        };
        Span::current().record("released", released);
        Ok(released)
    }

    /// Extends the lease on a still-held lock (explicit heartbeat).
    ///
    /// Returns `Ok(false)` when the lock is no longer held under this
    /// handle's token. Leases are never extended implicitly; a holder
    /// with a long critical section calls this before expiry.
    #[instrument(
        skip(self, handle),
        fields(lock.key = %handle.key(), flavor = %handle.flavor(), renewed = tracing::field::Empty)
    )]
    pub async fn renew(&self, handle: &LockHandle, new_lease: Duration) -> LockResult<bool> {
        if new_lease.is_zero() {
            return Err(LockError::InvalidLease);
        }
        let target = Target::new(&self.keyspace, handle.flavor, &handle.key);
        let renewed = match &target {
            Target::Simple { key } | Target::Fair { key, .. } => {
                self.store.renew(key, &handle.token, new_lease).await?
            }
            Target::Reentrant { key } => {
                self.store
                    .reentrant_renew(key, &handle.token, new_lease)
                    .await?
            }
            // The reader structure carries one shared TTL; renewal
            // extends it while this token still holds a read lock.
            Target::Read { readers, .. } => {
                self.store
                    .read_renew(readers, &handle.token, new_lease)
                    .await?
            }
            Target::Write { writer, .. } => {
                self.store.renew(writer, &handle.token, new_lease).await?
            }
        };
        Span::current().record("renewed", renewed);
        Ok(renewed)
    }

    /// Scoped acquisition: acquires, runs `work`, and releases on every
    /// exit path. A panic unwinding out of `work` still releases the
    /// lock and is then re-raised.
    ///
    /// Returns `Ok(None)` without running `work` when the wait budget
    /// is exhausted.
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        flavor: LockFlavor,
        wait: Duration,
        lease: Duration,
        work: F,
    ) -> LockResult<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let Some(handle) = self.acquire(key, flavor, wait, lease).await? else {
            return Ok(None);
        };
        let outcome = AssertUnwindSafe(work()).catch_unwind().await;
        let released = self.release(handle).await;
        match outcome {
            Ok(output) => {
                released?;
                Ok(Some(output))
            }
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }

    async fn abandon_if_fair(&self, target: &Target, token: &str) -> LockResult<()> {
        if let Target::Fair { queue, .. } = target {
            self.store.fair_abandon(queue, token).await?;
        }
        Ok(())
    }

    fn validate(&self, key: &str, lease: Duration) -> LockResult<()> {
        if key.is_empty() || key.contains(KEY_SEPARATOR) {
            return Err(LockError::InvalidKey(key.to_string()));
        }
        if lease.is_zero() {
            return Err(LockError::InvalidLease);
        }
        Ok(())
    }
}

/// The reentrant flavor locks by caller identity so nested acquisitions
/// find their own count; every other flavor gets a fresh unguessable
/// token per attempt.
fn token_for(flavor: LockFlavor) -> String {
    match flavor {
        LockFlavor::Reentrant => OwnerIdentity::current().into_string(),
        _ => create_token(),
    }
}
