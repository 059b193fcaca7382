//! Three-state circuit breaker guarding an async callable.
//!
//! Mirrors `merlya/core/resilience.py`: closed -> open on
//! `failure_threshold` consecutive failures, open -> half_open after
//! `recovery_timeout` has elapsed since the last failure, half_open ->
//! closed after `success_threshold` consecutive successes (any failure in
//! half_open sends it back to open).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            success_threshold: 2,
        }
    }
}

struct Inner {
    state: State,
    failure_count: u32,
    success_count: u32,
    last_failure_time: Option<Instant>,
}

/// Guards an async callable behind a three-state machine.
///
/// `call()` checks and, if necessary, transitions state under the lock,
/// then drops the guard before invoking the target so a slow target never
/// blocks other callers from observing the breaker's state.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure_time: None,
            }),
        }
    }

    pub async fn state(&self) -> State {
        self.inner.lock().await.state
    }

    /// Runs `f`, wrapping the target's error so callers can distinguish a
    /// fast-fail (`CoreError::CircuitBreakerOpen`) from a real failure of
    /// the underlying operation (`E`).
    pub async fn call<F, Fut, T, E>(&self, f: F) -> std::result::Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        {
            let mut guard = self.inner.lock().await;
            match guard.state {
                State::Open => {
                    let elapsed = guard
                        .last_failure_time
                        .map(|t| t.elapsed())
                        .unwrap_or(Duration::MAX);
                    if elapsed >= self.config.recovery_timeout {
                        guard.state = State::HalfOpen;
                        guard.success_count = 0;
                    } else {
                        return Err(CircuitError::Open(CoreError::CircuitBreakerOpen(
                            self.name.clone(),
                        )));
                    }
                }
                State::Closed | State::HalfOpen => {}
            }
        }

        match f().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure().await;
                Err(CircuitError::Inner(err))
            }
        }
    }

    async fn on_success(&self) {
        let mut guard = self.inner.lock().await;
        match guard.state {
            State::Closed => {
                guard.failure_count = 0;
            }
            State::HalfOpen => {
                guard.success_count += 1;
                if guard.success_count >= self.config.success_threshold {
                    guard.state = State::Closed;
                    guard.failure_count = 0;
                    guard.success_count = 0;
                    tracing::info!(breaker = %self.name, "circuit breaker closed");
                }
            }
            State::Open => {}
        }
    }

    async fn on_failure(&self) {
        let mut guard = self.inner.lock().await;
        guard.last_failure_time = Some(Instant::now());
        match guard.state {
            State::Closed => {
                guard.failure_count += 1;
                if guard.failure_count >= self.config.failure_threshold {
                    guard.state = State::Open;
                    tracing::warn!(breaker = %self.name, "circuit breaker opened");
                }
            }
            State::HalfOpen => {
                guard.state = State::Open;
                guard.success_count = 0;
                tracing::warn!(breaker = %self.name, "circuit breaker reopened from half_open");
            }
            State::Open => {}
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    #[error(transparent)]
    Open(CoreError),
    #[error(transparent)]
    Inner(E),
}

/// Process-wide registry mapping a key (conventionally `module.function`)
/// to its breaker. Safe under concurrent callers: insertion and lookup are
/// both guarded by a `parking_lot::Mutex`, held only long enough to clone
/// the `Arc`.
#[derive(Default)]
pub struct CircuitBreakerRegistry {
    breakers: parking_lot::Mutex<std::collections::HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, key: &str, config: CircuitBreakerConfig) -> Arc<CircuitBreaker> {
        let mut guard = self.breakers.lock();
        guard
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, config)))
            .clone()
    }

    pub fn reset(&self) {
        self.breakers.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn always_ok() -> std::result::Result<(), &'static str> {
        Ok(())
    }

    async fn always_err() -> std::result::Result<(), &'static str> {
        Err("boom")
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let cb = CircuitBreaker::new(
            "test.opens",
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_millis(100),
                success_threshold: 2,
            },
        );

        for _ in 0..3 {
            let res = cb.call(always_err).await;
            assert!(matches!(res, Err(CircuitError::Inner(_))));
        }

        assert_eq!(cb.state().await, State::Open);

        let res = cb.call(always_ok).await;
        assert!(matches!(res, Err(CircuitError::Open(_))));
    }

    #[tokio::test]
    async fn recovers_through_half_open_to_closed() {
        let cb = CircuitBreaker::new(
            "test.recovers",
            CircuitBreakerConfig {
                failure_threshold: 3,
                recovery_timeout: Duration::from_millis(100),
                success_threshold: 2,
            },
        );

        for _ in 0..3 {
            let _ = cb.call(always_err).await;
        }
        assert_eq!(cb.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(200)).await;

        let res = cb.call(always_ok).await;
        assert!(res.is_ok());
        assert_eq!(cb.state().await, State::HalfOpen);

        let res = cb.call(always_ok).await;
        assert!(res.is_ok());
        assert_eq!(cb.state().await, State::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = CircuitBreaker::new(
            "test.reopen",
            CircuitBreakerConfig {
                failure_threshold: 1,
                recovery_timeout: Duration::from_millis(50),
                success_threshold: 2,
            },
        );

        let _ = cb.call(always_err).await;
        assert_eq!(cb.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let res = cb.call(always_err).await;
        assert!(matches!(res, Err(CircuitError::Inner(_))));
        assert_eq!(cb.state().await, State::Open);
    }
}
