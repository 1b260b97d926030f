//! Core lock protocol over a shared key-value store.
//!
//! Defines the atomic store contract ([`store::LockStore`]), the lock
//! handle and owner-token model, the blocking acquisition controller,
//! and the [`manager::LockManager`] composing them into four lock
//! flavors: simple, reentrant, fair, and read-write.

mod acquire;

pub mod backoff;
pub mod error;
pub mod handle;
pub mod manager;
pub mod prelude;
pub mod store;

pub use error::{LockError, LockResult};
pub use prelude::*;
