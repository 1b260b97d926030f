//! Benchmarks for lock acquisition latency

use std::time::Duration;

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use storelock::{LockFlavor, LockManager, MemoryStore};

fn bench_memory_lock_acquisition(c: &mut Criterion) {
    let manager = LockManager::new(MemoryStore::new());
    let lease = Duration::from_secs(30);

    let mut group = c.benchmark_group("memory_lock");
    group.bench_function("try_acquire", |b| {
        b.to_async(tokio::runtime::Runtime::new().unwrap())
            .iter(|| async {
                if let Ok(Some(handle)) = manager
                    .try_acquire(black_box("bench-lock"), LockFlavor::Simple, lease)
                    .await
                {
                    let _ = manager.release(handle).await;
                }
            });
    });

    group.bench_function("reentrant_acquire", |b| {
        b.to_async(tokio::runtime::Runtime::new().unwrap())
            .iter(|| async {
                if let Ok(Some(handle)) = manager
                    .try_acquire(black_box("bench-rt-lock"), LockFlavor::Reentrant, lease)
                    .await
                {
                    let _ = manager.release(handle).await;
                }
            });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_lock_acquisition);
criterion_main!(benches);
