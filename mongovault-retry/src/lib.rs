//! Bounded retry and backoff logic for Mongovault gateway probes.
//!
//! Connection establishment and liveness probes are the only operations the
//! transfer engine retries: they are idempotent and their failures are often
//! transient (VPN flaps, server warming up). Bulk writes are never routed
//! through this crate: re-running a partially applied insert is not safe.

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use futures::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by a retried operation
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("Operation '{operation}' exceeded its retry budget: {source}")]
    RetriesExhausted {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Transient error in '{operation}': {source}")]
    Transient {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("Permanent error in '{operation}': {source}")]
    Permanent {
        operation: &'static str,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Result type for retry operations
pub type RetryResult<T> = std::result::Result<T, RetryError>;

/// Boxed future for retry operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = RetryResult<T>> + Send + 'a>>;

/// Execute an operation with the probe backoff policy
///
/// The closure receives the 1-based attempt number. Errors it classifies as
/// [`RetryError::Permanent`] stop the loop immediately; transient errors are
/// retried until the policy's elapsed-time budget runs out.
pub async fn with_backoff<F, T>(op_name: &'static str, f: F) -> RetryResult<T>
where
    F: FnMut(usize) -> BoxFuture<'static, T>,
{
    with_custom_backoff(op_name, probe_policy(), f).await
}

/// Execute an operation with a custom backoff policy
pub async fn with_custom_backoff<F, T>(
    op_name: &'static str,
    mut policy: ExponentialBackoff,
    mut f: F,
) -> RetryResult<T>
where
    F: FnMut(usize) -> BoxFuture<'static, T>,
{
    let mut attempt = 1;

    loop {
        debug!("Attempting operation '{}' (attempt {})", op_name, attempt);

        match f(attempt).await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded after {} attempts",
                        op_name, attempt
                    );
                }
                return Ok(result);
            }
            Err(err @ RetryError::Permanent { .. }) => {
                warn!(
                    "Operation '{}' failed permanently on attempt {}",
                    op_name, attempt
                );
                return Err(err);
            }
            Err(err) => match policy.next_backoff() {
                Some(delay) => {
                    warn!(
                        "Operation '{}' failed on attempt {}: {}; retrying in {:?}",
                        op_name, attempt, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                None => {
                    return Err(RetryError::RetriesExhausted {
                        operation: op_name,
                        source: match err {
                            RetryError::Transient { source, .. } => source,
                            other => Box::new(other),
                        },
                    });
                }
            },
        }
    }
}

/// Backoff policy for connection probes: quick first retry, small total budget
///
/// The budget stays well under the engine's own connection timeouts so a dead
/// server still fails fast.
pub fn probe_policy() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(100))
        .with_max_interval(Duration::from_secs(1))
        .with_max_elapsed_time(Some(Duration::from_secs(3)))
        .with_multiplier(2.0)
        .build()
}

/// Helper macro for creating transient errors
#[macro_export]
macro_rules! transient_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Transient {
            operation: $op,
            source: Box::new($err),
        }
    };
}

/// Helper macro for creating permanent errors
#[macro_export]
macro_rules! permanent_error {
    ($op:expr, $err:expr) => {
        $crate::RetryError::Permanent {
            operation: $op,
            source: Box::new($err),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn tight_policy() -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(1))
            .with_max_interval(Duration::from_millis(2))
            .with_max_elapsed_time(Some(Duration::from_millis(20)))
            .build()
    }

    #[tokio::test]
    async fn test_successful_operation() {
        let result = with_backoff("probe", |_attempt| Box::pin(async { Ok("pong") })).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "pong");
    }

    #[tokio::test]
    async fn test_transient_failure_then_success() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = with_custom_backoff("probe", tight_policy(), move |_attempt| {
            let count = attempt_count_clone.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                if count < 2 {
                    Err(transient_error!(
                        "probe",
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionRefused,
                            "connection refused"
                        )
                    ))
                } else {
                    Ok("pong")
                }
            })
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failure_stops_immediately() {
        let attempt_count = Arc::new(AtomicUsize::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result: RetryResult<&str> =
            with_custom_backoff("probe", tight_policy(), move |_attempt| {
                attempt_count_clone.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {
                    Err(permanent_error!(
                        "probe",
                        std::io::Error::new(std::io::ErrorKind::PermissionDenied, "auth failed")
                    ))
                })
            })
            .await;

        assert!(matches!(result, Err(RetryError::Permanent { .. })));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let result: RetryResult<&str> = with_custom_backoff("probe", tight_policy(), |_attempt| {
            Box::pin(async {
                Err(transient_error!(
                    "probe",
                    std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out")
                ))
            })
        })
        .await;

        assert!(matches!(result, Err(RetryError::RetriesExhausted { .. })));
    }
}
