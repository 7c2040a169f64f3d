//! Linear backoff retry policy shared by every fallible dependency.
//!
//! A [`Backoff`] is built once per dependency with its own error classifier
//! and then wraps any number of operations. The delay before retry `k`
//! (1-based) is `initial + (k - 1) * increment`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Verdict of a classifier on a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The failure is transient; the attempt may be repeated.
    Retriable,
    /// Repeating the attempt cannot help.
    NonRetriable,
}

/// Terminal failure of a call made through a [`Backoff`].
#[derive(Debug, thiserror::Error)]
pub enum BackoffError<E> {
    /// The shutdown signal fired before the call could complete.
    #[error("Backoff: cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: u32 },

    /// The classifier rejected the failure; no further attempts were made.
    #[error("Backoff: non retriable failure on attempt {attempts}: {source}")]
    NonRetriable { attempts: u32, source: E },

    /// Every allowed attempt failed with a retriable error.
    #[error("Backoff: max attempts reached ({attempts}): {source}")]
    MaxAttemptsReached { attempts: u32, source: E },
}

impl<E> BackoffError<E> {
    /// Number of attempts started before the call gave up.
    pub fn attempts(&self) -> u32 {
        match self {
            BackoffError::Cancelled { attempts }
            | BackoffError::NonRetriable { attempts, .. }
            | BackoffError::MaxAttemptsReached { attempts, .. } => *attempts,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BackoffError::Cancelled { .. })
    }
}

type Classifier<E> = Arc<dyn Fn(&E) -> ErrorClass + Send + Sync>;

/// Retry policy with a linearly growing delay, generic over the error type
/// through the classifier supplied at construction.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use oxtel_common::backoff::{Backoff, ErrorClass};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = Backoff::new(2, |_: &std::io::Error| ErrorClass::NonRetriable)
///     .with_linear(Duration::from_millis(10), Duration::from_millis(10));
///
/// let cancel = CancellationToken::new();
/// let value = policy
///     .run(&cancel, || async { Ok::<_, std::io::Error>(42) })
///     .await
///     .unwrap();
/// assert_eq!(value, 42);
/// # }
/// ```
pub struct Backoff<E> {
    max_retries: u16,
    initial_delay: Duration,
    increment: Duration,
    classify: Classifier<E>,
}

impl<E> Clone for Backoff<E> {
    fn clone(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            initial_delay: self.initial_delay,
            increment: self.increment,
            classify: Arc::clone(&self.classify),
        }
    }
}

impl<E> std::fmt::Debug for Backoff<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backoff")
            .field("max_retries", &self.max_retries)
            .field("initial_delay", &self.initial_delay)
            .field("increment", &self.increment)
            .finish_non_exhaustive()
    }
}

impl<E> Backoff<E>
where
    E: std::fmt::Display,
{
    /// Creates a policy allowing `max_retries` retries after the first attempt.
    /// Delays default to 1s initial and 2s increment.
    pub fn new<F>(max_retries: u16, classify: F) -> Self
    where
        F: Fn(&E) -> ErrorClass + Send + Sync + 'static,
    {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            increment: Duration::from_secs(2),
            classify: Arc::new(classify),
        }
    }

    pub fn with_linear(mut self, initial_delay: Duration, increment: Duration) -> Self {
        self.initial_delay = initial_delay;
        self.increment = increment;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        u32::from(self.max_retries) + 1
    }

    pub fn classify(&self, err: &E) -> ErrorClass {
        (self.classify)(err)
    }

    /// Runs `op` until it succeeds, fails with a non retriable error, runs out
    /// of attempts, or `cancel` fires.
    ///
    /// Cancellation drops an in-flight attempt and interrupts a pending sleep;
    /// no attempt is started once the token is cancelled.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, BackoffError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delay = self.initial_delay;
        let mut attempts: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(BackoffError::Cancelled { attempts });
            }
            attempts += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BackoffError::Cancelled { attempts }),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if self.classify(&err) == ErrorClass::NonRetriable {
                return Err(BackoffError::NonRetriable {
                    attempts,
                    source: err,
                });
            }

            if attempts >= self.max_attempts() {
                return Err(BackoffError::MaxAttemptsReached {
                    attempts,
                    source: err,
                });
            }

            tracing::warn!(
                attempt = attempts,
                max_attempts = self.max_attempts(),
                retry_in = ?delay,
                error = %err,
                "Attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BackoffError::Cancelled { attempts }),
                _ = tokio::time::sleep(delay) => {}
            }
            delay += self.increment;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn refused() -> io::Error {
        io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused")
    }

    fn classify_io(err: &io::Error) -> ErrorClass {
        match err.kind() {
            io::ErrorKind::ConnectionRefused | io::ErrorKind::TimedOut => ErrorClass::Retriable,
            _ => ErrorClass::NonRetriable,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn always_retriable_makes_max_retries_plus_one_attempts() {
        let policy = Backoff::new(3, |_: &io::Error| ErrorClass::Retriable)
            .with_linear(Duration::from_millis(100), Duration::from_millis(100));
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(refused())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(matches!(err, BackoffError::MaxAttemptsReached { attempts: 4, .. }));
        assert!(err.to_string().contains("max attempts reached"));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_retries_means_single_attempt() {
        let policy = Backoff::new(0, |_: &io::Error| ErrorClass::Retriable);
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(refused())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_stops_after_first_attempt() {
        let policy = Backoff::new(5, classify_io);
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let err = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(io::Error::new(io::ErrorKind::InvalidData, "bad payload"))
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BackoffError::NonRetriable { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn linear_delays_accumulate_before_success() {
        let policy = Backoff::new(3, classify_io)
            .with_linear(Duration::from_secs(1), Duration::from_secs(2));
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let start = Instant::now();

        let value = policy
            .run(&cancel, || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(refused())
                } else {
                    Ok("delivered")
                }
            })
            .await
            .unwrap();

        let elapsed = start.elapsed();
        assert_eq!(value, "delivered");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(elapsed >= Duration::from_secs(4), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(5), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn delay_beyond_u64_millis_still_waits_and_cancels() {
        // Milliseconds of this delay do not fit in a u64.
        let huge = Duration::from_secs(u64::MAX / 4);
        let policy = Backoff::new(2, |_: &io::Error| ErrorClass::Retriable)
            .with_linear(huge, Duration::ZERO);
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let err = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(refused())
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, BackoffError::Cancelled { attempts: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_sleep() {
        let policy = Backoff::new(3, |_: &io::Error| ErrorClass::Retriable)
            .with_linear(Duration::from_secs(60), Duration::from_secs(60));
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = Instant::now();

        let err = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(refused())
            })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn cancelled_token_prevents_any_attempt() {
        let policy = Backoff::new(3, classify_io);
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = policy
            .run(&cancel, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(())
            })
            .await
            .unwrap_err();

        assert!(matches!(err, BackoffError::Cancelled { attempts: 0 }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
