//! Lock handles, flavors, and owner identification.

use std::fmt;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rand::Rng;

/// The acquisition semantics a handle was obtained under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockFlavor {
    /// Plain mutual exclusion: set-if-absent with a lease.
    Simple,
    /// Counter-based: the same process/task identity may re-acquire
    /// without blocking itself.
    Reentrant,
    /// FIFO admission through an explicit wait queue.
    Fair,
    /// Shared side of the read-write pair; any number may hold it while
    /// no writer does.
    Read,
    /// Exclusive side of the read-write pair.
    Write,
}

impl LockFlavor {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockFlavor::Simple => "simple",
            LockFlavor::Reentrant => "reentrant",
            LockFlavor::Fair => "fair",
            LockFlavor::Read => "read",
            LockFlavor::Write => "write",
        }
    }
}

impl fmt::Display for LockFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of one successful acquisition.
///
/// Carries everything release and renewal need: the caller's resource
/// key, the owner token set in the store, the lease it was acquired
/// under, and the flavor. Created only by the manager on success and
/// consumed by `release`. Deliberately neither `Clone` nor `Copy`:
/// a handle belongs to exactly one caller, and releasing through a
/// token that is not yours is undefined by contract.
#[derive(Debug)]
pub struct LockHandle {
    pub(crate) key: String,
    pub(crate) token: String,
    pub(crate) lease: Duration,
    pub(crate) flavor: LockFlavor,
}

impl LockHandle {
    pub(crate) fn new(key: String, token: String, lease: Duration, flavor: LockFlavor) -> Self {
        Self {
            key,
            token,
            lease,
            flavor,
        }
    }

    /// The caller-supplied resource key (without namespace prefix).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The owner token (or owner identity, for the reentrant flavor)
    /// this acquisition holds the lock under.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The lease the lock was acquired with.
    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn flavor(&self) -> LockFlavor {
        self.flavor
    }
}

/// Generates an owner token unique to one acquisition attempt.
///
/// Format: `{process_id}_{counter}_{random:016x}`. The random component
/// keeps tokens unguessable across processes; the counter keeps them
/// unique within one.
pub fn create_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let pid = process::id();

    let mut rng = rand::thread_rng();
    let random: u64 = rng.r#gen();

    format!("{}_{}_{:016x}", pid, counter, random)
}

/// Identity of the logical caller, used as the reentrancy key.
///
/// Combines the process id with the tokio task id (or OS thread id when
/// called outside a task) so two logical callers in the same process
/// never silently share a reentrant count. Unlike [`create_token`], the
/// same caller gets the same identity on every capture, which is what
/// lets nested acquisitions find their own count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity(String);

impl OwnerIdentity {
    /// Captures the identity of the current task (or thread).
    pub fn current() -> Self {
        let pid = process::id();
        match tokio::task::try_id() {
            Some(task_id) => Self(format!("{}:task-{}", pid, task_id)),
            None => Self(format!("{}:{:?}", pid, std::thread::current().id())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub(crate) fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for OwnerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
