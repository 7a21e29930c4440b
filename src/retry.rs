//! Retry and polling primitives
//!
//! `retry_with_backoff` guards the initial tree fetch; `poll_until_ready` drives
//! asynchronous image jobs to completion.

use std::future::Future;
use std::time::Duration;

/// Linear backoff: after failed attempt `n` the next attempt waits `base_delay × n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy used when fetching a new tree
    pub const TREE_FETCH: RetryPolicy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_millis(1000),
    };

    /// Delay to wait after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::TREE_FETCH
    }
}

/// Fixed-interval polling budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollPolicy {
    /// Budget for images generated during a conversation turn
    pub const IMAGE: PollPolicy = PollPolicy {
        max_attempts: 60,
        interval: Duration::from_millis(2000),
    };

    /// Short budget for one-off image requests
    pub const BRIEF: PollPolicy = PollPolicy {
        max_attempts: 10,
        interval: Duration::from_millis(2000),
    };
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::IMAGE
    }
}

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus<T> {
    Pending,
    Ready(T),
    Failed(String),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RetryError {
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: String },
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PollError {
    /// The job was still pending when the budget ran out
    #[error("Timed out after {attempts} polls")]
    TimedOut { attempts: u32 },

    #[error("Job failed: {0}")]
    Failed(String),
}

/// Runs `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut op: F) -> Result<T, RetryError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                tracing::warn!(attempt, max = policy.max_attempts, "Attempt failed: {}", e);
                last_error = e.to_string();
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}

/// Calls `check` at a fixed interval until it reports ready or failed.
///
/// `check` receives the 1-based poll number. Running out of attempts while still
/// pending is a [`PollError::TimedOut`], distinct from a job that reported failure.
pub async fn poll_until_ready<T, F, Fut>(policy: PollPolicy, mut check: F) -> Result<T, PollError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollStatus<T>>,
{
    for attempt in 1..=policy.max_attempts {
        match check(attempt).await {
            PollStatus::Ready(value) => return Ok(value),
            PollStatus::Failed(reason) => return Err(PollError::Failed(reason)),
            PollStatus::Pending => {
                tracing::debug!(attempt, max = policy.max_attempts, "Job still pending");
            }
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(PollError::TimedOut {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_fifth_attempt() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = retry_with_backoff(RetryPolicy::TREE_FETCH, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 5 {
                    Err(format!("failure {}", attempt))
                } else {
                    Ok("tree")
                }
            }
        })
        .await;

        assert_eq!(result, Ok("tree"));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(start.elapsed() >= Duration::from_millis(1000 + 2000 + 3000 + 4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts() {
        let calls = AtomicU32::new(0);

        let result: Result<(), RetryError> =
            retry_with_backoff(RetryPolicy::TREE_FETCH, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(format!("failure {}", attempt)) }
            })
            .await;

        assert_eq!(
            result,
            Err(RetryError::Exhausted {
                attempts: 5,
                last_error: "failure 5".to_string()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_first_success_does_not_wait() {
        let start = Instant::now();
        let result = retry_with_backoff(RetryPolicy::TREE_FETCH, |_| async {
            Ok::<_, String>(7)
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_delay_after() {
        let policy = RetryPolicy::TREE_FETCH;
        assert_eq!(policy.delay_after(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(4), Duration::from_millis(4000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_ready_after_pending() {
        let pending_polls = 3;
        let calls = AtomicU32::new(0);

        let result = poll_until_ready(PollPolicy::IMAGE, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt <= pending_polls {
                    PollStatus::Pending
                } else {
                    PollStatus::Ready("https://delivery/result.png".to_string())
                }
            }
        })
        .await;

        assert_eq!(result, Ok("https://delivery/result.png".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), pending_polls + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out() {
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<String, PollError> = poll_until_ready(PollPolicy::BRIEF, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { PollStatus::Pending }
        })
        .await;

        assert_eq!(result, Err(PollError::TimedOut { attempts: 10 }));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert!(start.elapsed() >= Duration::from_millis(2000 * 9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_failure_is_not_timeout() {
        let result: Result<String, PollError> = poll_until_ready(PollPolicy::IMAGE, |attempt| async move {
            if attempt == 1 {
                PollStatus::Pending
            } else {
                PollStatus::Failed("Content Moderated".to_string())
            }
        })
        .await;

        assert_eq!(result, Err(PollError::Failed("Content Moderated".to_string())));
    }
}
