use std::time::Duration;

use tracing::debug;

use crate::error::LocationResult;

/// Bounded exponential backoff for transient failures.
///
/// The defaults give 3 attempts with delays of 100 ms and 400 ms between
/// them (each delay is the previous times the factor); a caller that also
/// waits after the final failure would sit out 1.6 s.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub tries: u32,
    /// Delay before the second attempt.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after every failed attempt.
    pub factor: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            base_delay: Duration::from_millis(100),
            factor: 4,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            tries: 1,
            base_delay: Duration::ZERO,
            factor: 1,
        }
    }

    /// Run `op`, retrying transient failures with backoff. Fatal errors
    /// and successful results return immediately.
    pub fn run<T>(&self, mut op: impl FnMut() -> LocationResult<T>) -> LocationResult<T> {
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match op() {
                Err(err) if err.is_transient() && attempt < self.tries.max(1) => {
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "retrying transient failure");
                    std::thread::sleep(delay);
                    delay *= self.factor;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
