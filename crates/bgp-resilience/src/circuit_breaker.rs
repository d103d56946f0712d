//! Circuit breaker for external service calls.
//!
//! Opens after `failure_threshold` consecutive failures, rejects fast while
//! open, and admits a single half-open probe after `recovery_timeout`.

use parking_lot::Mutex;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing; requests are rejected without contacting the dependency.
    Open,
    /// Testing whether the dependency has recovered.
    HalfOpen,
}

/// Raised when the circuit is open and the call is rejected without being attempted.
#[derive(Debug, Error)]
#[error("circuit breaker '{0}' is open")]
pub struct CircuitBreakerOpenError(pub String);

struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Per-client circuit breaker. Cheap to clone (an `Arc` internally would be
/// typical; callers hold this behind their own `Arc` since one breaker
/// instance is shared by all callers of one external client).
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a breaker with the given name, failure threshold, and
    /// recovery cooldown.
    pub fn new(name: impl Into<String>, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    /// Current state, after applying the open → half-open cooldown check.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.inner.lock();
        self.maybe_half_open(&mut inner);
        inner.state
    }

    fn maybe_half_open(&self, inner: &mut Inner) {
        if inner.state == CircuitState::Open {
            if let Some(last) = inner.last_failure {
                if last.elapsed() >= self.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                }
            }
        }
    }

    /// Runs `f` under circuit-breaker protection. Fails fast with
    /// [`CircuitBreakerOpenError`] when open; otherwise awaits `f` and
    /// records the outcome.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let mut inner = self.inner.lock();
            self.maybe_half_open(&mut inner);
            if inner.state == CircuitState::Open {
                return Err(CallError::Open(CircuitBreakerOpenError(self.name.clone())));
            }
        }

        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(CallError::Inner(err))
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
            }
            CircuitState::Closed => {
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(breaker = %self.name, "circuit breaker opened");
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Manually resets the breaker to closed, clearing counters.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }
}

/// Outcome of a breaker-guarded call: either the breaker rejected it, or the
/// wrapped function ran and returned its own error.
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The circuit was open; the call was never attempted.
    #[error(transparent)]
    Open(CircuitBreakerOpenError),
    /// The call was attempted and the wrapped function failed.
    #[error(transparent)]
    Inner(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", 5, Duration::from_secs(60));
        for _ in 0..4 {
            let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|| async { Ok::<(), &str>(()) }).await;
        assert!(matches!(result, Err(CallError::Open(_))));
    }

    #[tokio::test]
    async fn half_open_probe_closes_on_success() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let result = cb.call(|| async { Ok::<(), &str>(()) }).await;
        assert!(result.is_ok());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_open_probe_reopens_on_failure() {
        let cb = CircuitBreaker::new("test", 1, Duration::from_millis(10));
        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let _ = cb.call(|| async { Err::<(), &str>("boom") }).await;
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
