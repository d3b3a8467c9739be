//! Exponential backoff for reconnecting long-running operations.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Why [`exponential`] gave up
#[derive(Debug, thiserror::Error)]
pub enum BackoffError<E> {
    /// Every attempt failed
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error of the last attempt
        last: E,
    },
    /// Cancelled while waiting for the next attempt
    #[error("cancelled")]
    Cancelled,
}

/// Run `op` up to `attempts` times. After the n-th failure wait
/// `initial * 2^(n-1)` before trying again. The attempt number (1-based) is
/// passed to `op`.
pub async fn exponential<T, E, F, Fut>(
    attempts: u32,
    initial: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, BackoffError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = initial;
    let mut attempt = 1;
    loop {
        let err = match op(attempt).await {
            Ok(out) => return Ok(out),
            Err(err) => err,
        };
        if attempt >= attempts {
            return Err(BackoffError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }
        warn!(attempt, attempts, error = %err, ?delay, "attempt failed, backing off");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(BackoffError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = delay.saturating_mul(2);
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn doubles_the_delay_between_attempts() {
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut seen = vec![];

        let result: Result<(), _> =
            exponential(3, Duration::from_secs(15), &cancel, |attempt| {
                seen.push((attempt, start.elapsed().as_secs()));
                async { Err::<(), _>("down") }
            })
            .await;

        assert!(matches!(
            result,
            Err(BackoffError::Exhausted {
                attempts: 3,
                last: "down"
            })
        ));
        assert_eq!(seen, vec![(1, 0), (2, 15), (3, 45)]);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_the_first_success() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = exponential(5, Duration::from_secs(1), &cancel, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("not yet")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert!(matches!(result, Ok(3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_stops_waiting() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), _> =
            exponential(3, Duration::from_secs(3600), &cancel, |_| async {
                Err::<(), _>("down")
            })
            .await;

        assert!(matches!(result, Err(BackoffError::Cancelled)));
    }
}
