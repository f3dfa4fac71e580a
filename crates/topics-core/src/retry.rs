use std::{fmt::Display, future::Future, time::Duration};

use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay_ms: u64,
    max_delay_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
            max_delay_ms,
        }
    }

    /// Policy that gives up after the first failure.
    pub fn no_retry() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay_ms(&self) -> u64 {
        self.base_delay_ms
    }

    pub fn max_delay_ms(&self) -> u64 {
        self.max_delay_ms
    }

    /// Linear backoff: retry `n` (1-based) waits `n * base`, capped at max.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let calculated = self.base_delay_ms.saturating_mul(u64::from(attempt.max(1)));
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// Run `op` until it succeeds, fails permanently, or the retry budget is spent.
    ///
    /// `op` is invoked once per attempt so each attempt builds a fresh request.
    /// `is_transient` decides whether an error is worth another attempt; the
    /// last observed error is returned once the budget is exhausted.
    pub async fn run<T, E, Op, Fut, C>(&self, mut op: Op, is_transient: C) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.max_retries || !is_transient(&err) {
                        return Err(err);
                    }
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 800, 30_000)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;
    use crate::error::TopicsError;

    #[test]
    fn first_retry_waits_base_delay() {
        let policy = RetryPolicy::new(2, 250, 8_000);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(250));
    }

    #[test]
    fn scales_linearly_for_attempts() {
        let policy = RetryPolicy::new(5, 100, 10_000);
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn caps_delay_at_max() {
        let policy = RetryPolicy::new(10, 1_000, 4_000);
        assert_eq!(policy.delay_for_attempt(7), Duration::from_millis(4_000));
    }

    #[test]
    fn defaults_match_service_budget() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 2);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1_600));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_two_server_errors_with_growing_delays() {
        let policy = RetryPolicy::new(2, 800, 30_000);
        let attempts = Arc::new(Mutex::new(Vec::<Instant>::new()));

        let result = policy
            .run(
                || {
                    let attempts = Arc::clone(&attempts);
                    async move {
                        let mut seen = attempts.lock().expect("attempt log");
                        seen.push(Instant::now());
                        if seen.len() < 3 {
                            Err(TopicsError::from_status(503, "unavailable"))
                        } else {
                            Ok("done")
                        }
                    }
                },
                TopicsError::is_transient,
            )
            .await;

        assert_eq!(result, Ok("done"));
        let seen = attempts.lock().expect("attempt log");
        assert_eq!(seen.len(), 3);
        let first_gap = seen[1] - seen[0];
        let second_gap = seen[2] - seen[1];
        assert_eq!(first_gap, Duration::from_millis(800));
        assert_eq!(second_gap, Duration::from_millis(1_600));
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let policy = RetryPolicy::default();
        let calls = Arc::new(Mutex::new(0_u32));
        let started = Instant::now();

        let result: Result<(), TopicsError> = policy
            .run(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        *calls.lock().expect("call count") += 1;
                        Err(TopicsError::from_status(404, "missing"))
                    }
                },
                TopicsError::is_transient,
            )
            .await;

        assert_eq!(result.expect_err("404 must fail").code, "not_found");
        assert_eq!(*calls.lock().expect("call count"), 1);
        assert_eq!(Instant::now(), started);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_budget_is_exhausted() {
        let policy = RetryPolicy::new(2, 10, 1_000);
        let calls = Arc::new(Mutex::new(0_u16));

        let result: Result<(), TopicsError> = policy
            .run(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        let mut calls = calls.lock().expect("call count");
                        *calls += 1;
                        Err(TopicsError::from_status(500 + *calls, "still failing"))
                    }
                },
                TopicsError::is_transient,
            )
            .await;

        assert_eq!(result.expect_err("must exhaust").status, Some(503));
        assert_eq!(*calls.lock().expect("call count"), 3);
    }
}
