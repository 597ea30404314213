use std::time::Duration;

use pera_types::config::RetryBackoff;

/// `nth` Fibonacci number (`fib(0) = 0`, `fib(1) = 1`), used by the
/// `Fibonacci` backoff strategy. Iterative to stay `O(n)` for the small
/// attempt counts retry budgets actually reach.
#[must_use]
pub fn fibonacci(n: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..n {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Delay before retry attempt `attempt` (1-indexed: the first retry is
/// attempt 1), before jitter. Growth base 2.0 for `Exponential`, matching
/// both the teacher's `2u32.pow(attempt - 1)` and the original's default
/// `base = 2` (`original_source/src/met/ejecucion/mecanismo_reintentos.py`).
#[must_use]
fn base_delay(backoff: RetryBackoff, base: Duration, attempt: u32) -> Duration {
    match backoff {
        RetryBackoff::None => base,
        RetryBackoff::Linear => base.saturating_mul(attempt.max(1)),
        RetryBackoff::Exponential => base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1))),
        RetryBackoff::Fibonacci => base.saturating_mul(u32::try_from(fibonacci(attempt)).unwrap_or(u32::MAX)),
    }
}

/// Delay before retry attempt `attempt`, including uniform jitter added in
/// `[0, base]` on top of the strategy's base delay (`spec.md` §4.3's retry
/// table), distinct from the teacher's centered jitter.
#[must_use]
pub fn compute_delay(backoff: RetryBackoff, base: Duration, attempt: u32) -> Duration {
    let delay = base_delay(backoff, base, attempt);
    let jitter = base.as_secs_f64().max(0.0) * rand::random::<f64>();
    delay.saturating_add(Duration::from_secs_f64(jitter))
}
