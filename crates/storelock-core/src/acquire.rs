//! The acquisition controller: blocking poll-and-backoff with a wait
//! deadline and cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::backoff::Backoff;
use crate::error::{LockError, LockResult};

/// Drives repeated atomic attempts until one succeeds, `wait` elapses,
/// or the cancel channel signals.
///
/// `attempt` performs exactly one atomic acquire against the store.
/// Between failed attempts the caller's task suspends for a jittered
/// backoff interval; this is cooperative waiting, never a busy spin.
/// A pause never sleeps past the wait deadline.
///
/// Returns `Ok(true)` on acquisition, `Ok(false)` when the wait budget
/// ran out (routine contention, not an error) and `Err(Cancelled)` when
/// the signal fired first. Store failures from `attempt` propagate.
pub(crate) async fn acquire_with_retry<F, Fut>(
    mut attempt: F,
    wait: Duration,
    backoff: Backoff,
    cancel: &watch::Receiver<bool>,
) -> LockResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = LockResult<bool>>,
{
    let deadline = Instant::now() + wait;

    loop {
        if *cancel.borrow() {
            return Err(LockError::Cancelled);
        }

        if attempt().await? {
            return Ok(true);
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(false);
        }

        let pause = backoff.interval().min(remaining);
        let mut cancel_rx = cancel.clone();
        let sleep = tokio::time::sleep(pause);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                changed = cancel_rx.changed() => match changed {
                    Ok(()) if *cancel_rx.borrow() => return Err(LockError::Cancelled),
                    // A non-true send: keep sleeping, keep listening.
                    Ok(()) => continue,
                    // Sender dropped without signalling: cancellation can
                    // no longer happen, finish the pause undisturbed.
                    Err(_) => {
                        sleep.as_mut().await;
                        break;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn no_cancel() -> watch::Receiver<bool> {
        let (_tx, rx) = watch::channel(false);
        rx
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_returns_immediately() {
        let acquired = acquire_with_retry(
            || async { Ok(true) },
            Duration::from_secs(1),
            Backoff::default(),
            &no_cancel(),
        )
        .await
        .unwrap();
        assert!(acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_wait_means_exactly_one_attempt() {
        let attempts = Cell::new(0u32);
        let acquired = acquire_with_retry(
            || {
                attempts.set(attempts.get() + 1);
                async { Ok(false) }
            },
            Duration::ZERO,
            Backoff::default(),
            &no_cancel(),
        )
        .await
        .unwrap();
        assert!(!acquired);
        assert_eq!(attempts.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_deadline_then_gives_up() {
        let attempts = Cell::new(0u32);
        let start = Instant::now();
        let acquired = acquire_with_retry(
            || {
                attempts.set(attempts.get() + 1);
                async { Ok(false) }
            },
            Duration::from_millis(500),
            Backoff::fixed(Duration::from_millis(100)),
            &no_cancel(),
        )
        .await
        .unwrap();
        assert!(!acquired);
        assert!(attempts.get() >= 5);
        assert!(start.elapsed() >= Duration::from_millis(500));
        // The last pause is truncated to the deadline.
        assert!(start.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_contention() {
        let attempts = Cell::new(0u32);
        let acquired = acquire_with_retry(
            || {
                attempts.set(attempts.get() + 1);
                let win = attempts.get() == 3;
                async move { Ok(win) }
            },
            Duration::from_secs(10),
            Backoff::fixed(Duration::from_millis(50)),
            &no_cancel(),
        )
        .await
        .unwrap();
        assert!(acquired);
        assert_eq!(attempts.get(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_wait() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(120)).await;
            let _ = tx.send(true);
        });

        let result = acquire_with_retry(
            || async { Ok(false) },
            Duration::from_secs(60),
            Backoff::fixed(Duration::from_secs(1)),
            &rx,
        )
        .await;
        assert!(matches!(result, Err(LockError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_never_attempts() {
        let (tx, rx) = watch::channel(true);
        let attempts = Cell::new(0u32);
        let result = acquire_with_retry(
            || {
                attempts.set(attempts.get() + 1);
                async { Ok(false) }
            },
            Duration::from_secs(1),
            Backoff::default(),
            &rx,
        )
        .await;
        drop(tx);
        assert!(matches!(result, Err(LockError::Cancelled)));
        assert_eq!(attempts.get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn store_errors_propagate() {
        let result = acquire_with_retry(
            || async {
                Err(LockError::Store(Box::new(std::io::Error::other(
                    "connection refused",
                ))))
            },
            Duration::from_secs(1),
            Backoff::default(),
            &no_cancel(),
        )
        .await;
        assert!(matches!(result, Err(LockError::Store(_))));
    }
}
