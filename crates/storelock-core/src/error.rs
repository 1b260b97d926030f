//! Error types for lock operations.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur during lock operations.
///
/// Contention and wait exhaustion are NOT errors: a blocked lock is the
/// routine outcome of this protocol and is reported as a `None` result
/// instead. Only conditions the caller cannot retry past by waiting are
/// represented here.
#[derive(Error, Debug)]
pub enum LockError {
    /// The shared store is unreachable or a scripted operation failed.
    ///
    /// Never conflated with contention: callers must be able to tell
    /// "lock held by someone else" apart from "store is broken".
    #[error("store unavailable: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// A blocking wait was aborted by an external cancellation signal.
    #[error("lock operation was cancelled")]
    Cancelled,

    /// The resource key is empty or contains the namespace separator.
    #[error("invalid resource key: {0:?}")]
    InvalidKey(String),

    /// The requested lease is zero.
    ///
    /// Every acquisition must carry a bounded lease; an unbounded lock
    /// would outlive a crashed holder forever.
    #[error("invalid lease duration: lease must be non-zero")]
    InvalidLease,
}

impl From<StoreError> for LockError {
    fn from(err: StoreError) -> Self {
        LockError::Store(err.into_source())
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;
