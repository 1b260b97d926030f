//! Convenience prelude for the lock protocol types.

pub use crate::backoff::Backoff;
pub use crate::error::{LockError, LockResult};
pub use crate::handle::{LockFlavor, LockHandle, OwnerIdentity};
pub use crate::manager::{LockManager, LockManagerBuilder};
pub use crate::store::{Keyspace, LockStore, StoreError, StoreResult};
