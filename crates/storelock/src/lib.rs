//! Mutual-exclusion coordination across processes that share nothing
//! but a key-value store.
//!
//! Processes serialize access to a logical resource named by a key.
//! Every acquisition carries a bounded lease, so a crashed holder can
//! never block others forever, and an unguessable owner token, so only
//! the acquirer can release. Four flavors are available:
//!
//! - **Simple** - plain mutual exclusion
//! - **Reentrant** - the same process/task may re-acquire without
//!   self-deadlock, tracked by a hold count
//! - **Fair** - strict FIFO admission through an explicit wait queue
//! - **Read-write** - many readers or one writer
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use storelock::{LockFlavor, LockManager, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let manager = LockManager::new(MemoryStore::new());
//!
//!     let handle = manager
//!         .acquire(
//!             "my-resource",
//!             LockFlavor::Simple,
//!             Duration::from_secs(1),   // wait budget
//!             Duration::from_secs(30),  // lease
//!         )
//!         .await?;
//!
//!     if let Some(handle) = handle {
//!         // Critical section - we hold the lock.
//!         println!("doing exclusive work");
//!         manager.release(handle).await?;
//!     } else {
//!         println!("lock contended, gave up after the wait budget");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Backends
//!
//! The manager is generic over the store contract. For coordination
//! across machines use the Redis backend:
//!
//! ```rust,no_run
//! use storelock::{LockManager, RedisStore};
//!
//! # async fn connect() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisStore::connect("redis://localhost:6379").await?;
//! let manager = LockManager::new(store);
//! # Ok(())
//! # }
//! ```
//!
//! For tests and single-process use, [`MemoryStore`] implements the
//! same contract hermetically.
//!
//! # Crate organization
//!
//! This is a meta-crate re-exporting:
//! - `storelock-core`: errors, store contract, acquisition controller,
//!   lock manager
//! - `storelock-memory`: in-process backend
//! - `storelock-redis`: Redis backend (Lua-scripted atomic operations)

pub use storelock_core::*;
pub use storelock_memory::MemoryStore;
pub use storelock_redis::{RedisStore, RedisStoreBuilder};
