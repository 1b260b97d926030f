//! Example: distributed locking through Redis
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set the REDIS_URL environment variable or
//! the default below is used.

use std::time::Duration;

use storelock::{LockFlavor, LockManager, RedisStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    println!("Connecting to Redis...");
    let store = RedisStore::connect(&redis_url).await?;
    let manager = LockManager::new(store);

    println!("Acquiring lock with a 5 second wait budget...");
    let handle = manager
        .acquire(
            "example-resource",
            LockFlavor::Simple,
            Duration::from_secs(5),
            Duration::from_secs(30),
        )
        .await?;

    match handle {
        Some(handle) => {
            println!("Lock acquired, doing work...");
            tokio::time::sleep(Duration::from_secs(2)).await;

            // Long critical sections renew explicitly before expiry.
            let renewed = manager.renew(&handle, Duration::from_secs(30)).await?;
            println!("Lease renewed: {}", renewed);

            let released = manager.release(handle).await?;
            println!("Released cleanly: {}", released);
        }
        None => {
            println!("Another process holds the lock, gave up after the wait budget");
        }
    }

    Ok(())
}
