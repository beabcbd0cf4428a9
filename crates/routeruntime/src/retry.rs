//! Bounded exponential backoff for transient failures.

use routecore::{GatewayError, NodeError, RetryPolicy};
use std::fmt::Display;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Errors that know whether another attempt could succeed
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for GatewayError {
    fn is_transient(&self) -> bool {
        GatewayError::is_transient(self)
    }
}

impl Transient for NodeError {
    fn is_transient(&self) -> bool {
        NodeError::is_transient(self)
    }
}

/// Why a retried operation gave up
#[derive(Debug, PartialEq)]
pub enum Attempt<E> {
    Failed(E),
    Cancelled,
}

/// Run `op` until it succeeds, fails fatally, or exhausts `policy`
///
/// Cancellation is observed while an attempt is pending and during backoff.
/// `on_retry` is called with the 1-based number of the attempt that failed.
pub async fn with_retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    what: &str,
    mut on_retry: R,
    mut op: F,
) -> Result<T, Attempt<E>>
where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Attempt::Cancelled),
            result = op() => result,
        };

        let err = match result {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(what, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !err.is_transient() || attempt == max_attempts {
            return Err(Attempt::Failed(err));
        }

        let delay = policy.delay_for(attempt - 1);
        tracing::warn!(
            what,
            attempt,
            error = %err,
            delay_ms = delay.as_millis() as u64,
            "Transient failure, retrying"
        );
        on_retry(attempt, &err);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Attempt::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }

    unreachable!("max_attempts is at least one")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay_ms: 1,
            backoff_multiplier: 1.0,
            max_delay_ms: 1,
        }
    }

    #[tokio::test]
    async fn retries_transient_until_success() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<&str, Attempt<GatewayError>> =
            with_retry(&fast(3), &cancel, "embed", |_, _| {}, move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(GatewayError::Timeout { ms: 1_000 })
                } else {
                    Ok("vector")
                }
            })
            .await;

        assert_eq!(result, Ok("vector"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let retries = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result: Result<(), _> = with_retry(
            &fast(2),
            &cancel,
            "embed",
            move |_, _| {
                retries.fetch_add(1, Ordering::SeqCst);
            },
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(GatewayError::Unavailable("503".into()))
            },
        )
        .await;

        assert_eq!(result, Err(Attempt::Failed(GatewayError::Unavailable("503".into()))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(retries.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let call = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(GatewayError::Rejected("401".into()))
        };
        let result: Result<(), _> = with_retry(&fast(5), &cancel, "embed", |_, _| {}, call).await;

        assert!(matches!(result, Err(Attempt::Failed(GatewayError::Rejected(_)))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancellation_wins_over_pending_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), Attempt<GatewayError>> =
            with_retry(&fast(3), &cancel, "embed", |_, _| {}, || async {
                std::future::pending::<()>().await;
                Ok(())
            })
            .await;

        assert_eq!(result, Err(Attempt::Cancelled));
    }
}
