//! Retry with exponential backoff, mirroring `merlya/core/resilience.py`.

use std::future::Future;
use std::time::Duration;

use crate::resilience::metrics::MetricsRegistry;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub base: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            base: 2.0,
        }
    }
}

impl RetryConfig {
    /// `delay_i = min(initial_delay * base^(i-1), max_delay)` for the sleep
    /// taken between attempt `i` and `i+1` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.base.powi(attempt as i32 - 1);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Runs `f` up to `config.max_attempts` times. `is_retriable` decides
/// whether an error should be retried; non-retriable errors are returned
/// immediately. Only real retries (not the first attempt) are counted
/// against `merlya_retry_attempts_total{function,attempt}`.
pub async fn retry<F, Fut, T, E>(
    function_name: &str,
    config: RetryConfig,
    metrics: &MetricsRegistry,
    is_retriable: impl Fn(&E) -> bool,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= config.max_attempts || !is_retriable(&err) {
                    return Err(err);
                }

                metrics
                    .counter("merlya_retry_attempts_total")
                    .inc_labeled(&format!("function={function_name},attempt={attempt}"));

                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(function = function_name, attempt, ?delay, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_and_is_capped() {
        let cfg = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            base: 2.0,
        };
        assert_eq!(cfg.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(cfg.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(cfg.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(cfg.delay_for_attempt(4), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn retries_until_success_and_stops_counting_first_attempt() {
        let metrics = MetricsRegistry::new();
        let calls = AtomicU32::new(0);

        let result: Result<u32, &'static str> = retry(
            "widgets.fetch",
            RetryConfig {
                max_attempts: 4,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                base: 2.0,
            },
            &metrics,
            |_| true,
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err("transient")
                    } else {
                        Ok(n)
                    }
                }
            },
        )
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two real retries (attempt=1, attempt=2), never attempt=3's first try.
        assert_eq!(
            metrics
                .counter("merlya_retry_attempts_total")
                .get_labeled("function=widgets.fetch,attempt=1"),
            1
        );
        assert_eq!(
            metrics
                .counter("merlya_retry_attempts_total")
                .get_labeled("function=widgets.fetch,attempt=2"),
            1
        );
    }

    #[tokio::test]
    async fn non_retriable_error_returns_immediately() {
        let metrics = MetricsRegistry::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), &'static str> = retry(
            "widgets.fetch",
            RetryConfig::default(),
            &metrics,
            |_| false,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;

        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
