//! Retry-with-backoff and a bounded connection semaphore, composed around a
//! [`CircuitBreaker`] the way the external service clients need it.

use crate::circuit_breaker::{CallError, CircuitBreaker};
use bgp_common::BgpError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// A resilient call wrapper: bounded concurrency, a shared circuit breaker,
/// and linear-backoff retry on transient failures.
pub struct ResilientClient {
    name: String,
    breaker: Arc<CircuitBreaker>,
    semaphore: Arc<Semaphore>,
    max_retries: u32,
    call_timeout: Duration,
}

impl ResilientClient {
    /// Builds a client guarded by a fresh circuit breaker and semaphore.
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        recovery_timeout: Duration,
        semaphore_permits: usize,
        max_retries: u32,
        call_timeout: Duration,
    ) -> Self {
        let name = name.into();
        Self {
            breaker: Arc::new(CircuitBreaker::new(name.clone(), failure_threshold, recovery_timeout)),
            semaphore: Arc::new(Semaphore::new(semaphore_permits)),
            max_retries,
            call_timeout,
            name,
        }
    }

    /// Runs `f` under the semaphore and circuit breaker, retrying transient
    /// failures up to `max_retries` times with linear backoff
    /// (`attempt * 100ms`). An open circuit fails fast without retrying and
    /// without acquiring the timeout budget.
    pub async fn call<F, Fut, T>(&self, f: F) -> Result<T, BgpError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, String>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| BgpError::Internal(format!("{}: semaphore closed", self.name)))?;

        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            let call_timeout = self.call_timeout;
            let outcome = self
                .breaker
                .call(|| async {
                    tokio::time::timeout(call_timeout, f())
                        .await
                        .map_err(|_| "call timed out".to_string())
                        .and_then(|r| r)
                })
                .await;

            match outcome {
                Ok(value) => return Ok(value),
                Err(CallError::Open(e)) => {
                    return Err(BgpError::Unavailable(e.to_string()));
                }
                Err(CallError::Inner(e)) => {
                    last_err = e;
                    if attempt < self.max_retries {
                        tracing::warn!(client = %self.name, attempt, error = %last_err, "retrying after transient failure");
                        tokio::time::sleep(Duration::from_millis(100 * (attempt as u64 + 1))).await;
                    }
                }
            }
        }

        Err(BgpError::Unavailable(format!("{}: {}", self.name, last_err)))
    }

    /// Current circuit breaker state, exposed for health/status endpoints.
    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_then_succeeds() {
        let client = ResilientClient::new("test", 5, Duration::from_secs(60), 4, 3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let result = client
            .call(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_retries_and_reports_unavailable() {
        let client = ResilientClient::new("test", 10, Duration::from_secs(60), 4, 2, Duration::from_secs(1));
        let result: Result<(), _> = client.call(|| async { Err("down".to_string()) }).await;
        assert!(matches!(result, Err(BgpError::Unavailable(_))));
    }
}
