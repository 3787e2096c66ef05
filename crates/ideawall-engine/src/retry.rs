//! Bounded retry with exponential backoff
//!
//! Retry state is plain data carried through an explicit loop: attempt
//! number, delay schedule, and the last error are all inspectable, and the
//! whole future is cancellable by dropping it. Only errors classified
//! [`ErrorClass::Transient`] are retried; conflicts and rejections return
//! to the caller on the first attempt.

use ideawall_core::{BoardError, BoardResult, ErrorClass};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff schedule: `base * 2^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the second attempt.
    pub base: Duration,
    /// Upper bound on any single delay.
    pub cap: Duration,
    /// Total attempts, including the first.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (zero-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Run `op` up to `policy.max_attempts` times, sleeping the backoff delay
/// between transient failures.
///
/// Non-transient errors propagate immediately; exhausting the budget maps
/// the last transient error to [`BoardError::GatewayUnavailable`].
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    op_name: &str,
    mut op: F,
) -> BoardResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = BoardResult<T>>,
{
    let mut last_error = BoardError::Network("no attempt made".into());

    for attempt in 0..policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.class() == ErrorClass::Transient => {
                let delay = policy.delay_after(attempt);
                debug!(
                    op = op_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient failure, backing off"
                );
                last_error = error;
                if attempt + 1 < policy.max_attempts {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(error) => return Err(error),
        }
    }

    warn!(
        op = op_name,
        attempts = policy.max_attempts,
        error = %last_error,
        "retry budget exhausted"
    );
    Err(BoardError::GatewayUnavailable {
        attempts: policy.max_attempts,
        last_error: last_error.to_string(),
    })
}

/// Bound a gateway round trip to `timeout`, mapping elapse to
/// [`BoardError::Timeout`].
pub async fn bounded<T, Fut>(timeout: Duration, fut: Fut) -> BoardResult<T>
where
    Fut: Future<Output = BoardResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(BoardError::Timeout(timeout)),
    }
}
