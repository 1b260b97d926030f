//! Example: lock flavors over the in-process backend
//!
//! Run with: `cargo run --example memory_lock`

use std::time::Duration;

use storelock::{LockFlavor, LockManager, MemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manager = LockManager::new(MemoryStore::new());

    println!("Acquiring simple lock...");
    let handle = manager
        .acquire(
            "example-resource",
            LockFlavor::Simple,
            Duration::from_secs(1),
            Duration::from_secs(30),
        )
        .await?
        .expect("nothing is contending");
    println!("Acquired with token {}", handle.token());

    // A second attempt observes contention.
    let contended = manager
        .try_acquire("example-resource", LockFlavor::Simple, Duration::from_secs(30))
        .await?;
    println!("Concurrent attempt acquired: {}", contended.is_some());

    manager.release(handle).await?;
    println!("Released");

    // Scoped form: acquire, run, release on the way out.
    let sum = manager
        .with_lock(
            "example-resource",
            LockFlavor::Simple,
            Duration::from_secs(1),
            Duration::from_secs(30),
            || async { 2 + 2 },
        )
        .await?;
    println!("Scoped section computed: {:?}", sum);

    Ok(())
}
