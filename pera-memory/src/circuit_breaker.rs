use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

/// Wraps a durable backend call: after `failure_threshold` consecutive
/// failures, subsequent calls fail fast with [`Error::CircuitBreakerOpen`]
/// instead of incurring I/O latency, until `cooldown` elapses, at which
/// point one probe call is allowed through (half-open) to decide whether to
/// close again or re-open.
///
/// Grounded in the teacher's `memory-core/src/storage/circuit_breaker.rs`.
pub struct CircuitBreaker {
    state: Mutex<State>,
    opened_at: Mutex<Option<Instant>>,
    consecutive_failures: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    trips: AtomicU64,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(State::Closed),
            opened_at: Mutex::new(None),
            consecutive_failures: AtomicU32::new(0),
            failure_threshold,
            cooldown,
            trips: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn trip_count(&self) -> u64 {
        self.trips.load(Ordering::Relaxed)
    }

    fn allow_call(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            State::Closed => true,
            State::Open => {
                let elapsed = self.opened_at.lock().map(|at| at.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.cooldown {
                    *state = State::HalfOpen;
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => false,
        }
    }

    fn on_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        *self.state.lock() = State::Closed;
        *self.opened_at.lock() = None;
    }

    fn on_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        let mut state = self.state.lock();
        if *state == State::HalfOpen || failures >= self.failure_threshold {
            *state = State::Open;
            *self.opened_at.lock() = Some(Instant::now());
            self.trips.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Run `f` through the breaker. Returns [`Error::CircuitBreakerOpen`]
    /// without calling `f` at all when the breaker is open and the cooldown
    /// has not yet elapsed.
    pub async fn call<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.allow_call() {
            return Err(Error::CircuitBreakerOpen);
        }
        match f().await {
            Ok(value) => {
                self.on_success();
                Ok(value)
            }
            Err(err) => {
                self.on_failure();
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        let _ = breaker.call(|| async { Err::<(), Error>(Error::StoreFull) }).await;
        let _ = breaker.call(|| async { Err::<(), Error>(Error::StoreFull) }).await;
        let result = breaker.call(|| async { Ok::<(), Error>(()) }).await;
        assert!(matches!(result, Err(Error::CircuitBreakerOpen)));
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        let _ = breaker.call(|| async { Err::<(), Error>(Error::StoreFull) }).await;
        let _ = breaker.call(|| async { Ok::<(), Error>(()) }).await;
        let _ = breaker.call(|| async { Err::<(), Error>(Error::StoreFull) }).await;
        let result = breaker.call(|| async { Ok::<(), Error>(()) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn half_open_reopens_on_probe_failure() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let _ = breaker.call(|| async { Err::<(), Error>(Error::StoreFull) }).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let probe = breaker.call(|| async { Err::<(), Error>(Error::StoreFull) }).await;
        assert!(probe.is_err());
        let blocked = breaker.call(|| async { Ok::<(), Error>(()) }).await;
        assert!(matches!(blocked, Err(Error::CircuitBreakerOpen)));
    }
}
