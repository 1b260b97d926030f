//! In-process backend for the lock protocol.
//!
//! Keeps all lock state in one mutex-guarded map, which makes every
//! store operation trivially atomic. Lease deadlines use
//! [`tokio::time::Instant`] so paused-clock tests exercise expiry
//! deterministically.
//!
//! Useful for hermetic tests and for single-process deployments; for
//! coordination across processes use a shared backend such as
//! `storelock-redis`.

mod store;

pub use store::MemoryStore;
