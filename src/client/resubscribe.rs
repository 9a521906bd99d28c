//! Resubscribe backoff.
//!
//! After a subscription terminates with retry enabled, the client waits for
//! an interval chosen by a [`ResubscribePolicy`] before subscribing again.
//! The default [`FibonacciBackoff`] picks a random point in a window that
//! grows along the Fibonacci sequence:
//!
//! ```text
//! retries ≤ 14:  max = fib(retries) × 10 s
//! retries > 14:  max = 5538 s
//!                min = 30 % of max
//!                wait ∈ [min, max)
//! ```
//!
//! The average wait past the last Fibonacci step is around one hour. A
//! successful subscribe response resets the retry counter, restarting the
//! sequence.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::Error;

/// Last retry count that still follows the Fibonacci sequence
pub const MAX_FIBONACCI_STEP_INDEX: u32 = 14;

/// Scale of one Fibonacci step
pub const WAIT_TIME_MULTIPLIER: Duration = Duration::from_secs(10);

/// Window used once the Fibonacci steps are exhausted
pub const MAX_RETRY_WAIT_INTERVAL: Duration = Duration::from_secs(5538);

/// Lower bound of the window, in percent of its upper bound
pub const MIN_WAIT_PERCENT_PER_STEP: u32 = 30;

/// Input to a resubscribe policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResubscribeParam {
    /// Attempts made since the last successful subscription
    pub retries: u32,
    /// Why the previous attempt ended, if known
    pub reason: Option<Error>,
}

/// Chooses how long to wait before the next subscribe attempt.
pub trait ResubscribePolicy: Send {
    fn interval(&mut self, param: &ResubscribeParam) -> Duration;
}

impl<F> ResubscribePolicy for F
where
    F: FnMut(&ResubscribeParam) -> Duration + Send,
{
    fn interval(&mut self, param: &ResubscribeParam) -> Duration {
        self(param)
    }
}

/// `fib(0) = 0`, `fib(1) = 1`, ...
pub fn fibonacci(index: u32) -> u64 {
    let (mut a, mut b) = (0u64, 1u64);
    for _ in 0..index {
        let next = a.saturating_add(b);
        a = b;
        b = next;
    }
    a
}

/// Randomized Fibonacci backoff
#[derive(Debug)]
pub struct FibonacciBackoff {
    rng: StdRng,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl FibonacciBackoff {
    /// A backoff with a reproducible random sequence
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Upper bound of the wait window for `retries`
    pub fn max_wait(retries: u32) -> Duration {
        if retries <= MAX_FIBONACCI_STEP_INDEX {
            let steps = u32::try_from(fibonacci(retries)).unwrap_or(u32::MAX);
            WAIT_TIME_MULTIPLIER.saturating_mul(steps)
        } else {
            MAX_RETRY_WAIT_INTERVAL
        }
    }

    /// Lower bound of the wait window for `retries`
    pub fn min_wait(retries: u32) -> Duration {
        Self::max_wait(retries) * MIN_WAIT_PERCENT_PER_STEP / 100
    }
}

impl ResubscribePolicy for FibonacciBackoff {
    fn interval(&mut self, param: &ResubscribeParam) -> Duration {
        let max = Self::max_wait(param.retries);
        let wait = if max.is_zero() {
            Duration::ZERO
        } else {
            let min = Self::min_wait(param.retries);
            self.rng.gen_range(min..max)
        };

        debug!(
            "Computing resubscribe policy: attempts {}, max wait time {} ms, selected wait time {} ms",
            param.retries,
            max.as_millis(),
            wait.as_millis()
        );
        wait
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test_log::test]
    fn fibonacci_sequence() {
        let seq: Vec<u64> = (0..8).map(fibonacci).collect();
        assert_eq!(seq, vec![0, 1, 1, 2, 3, 5, 8, 13]);
        assert_eq!(fibonacci(MAX_FIBONACCI_STEP_INDEX), 377);
    }

    #[test_log::test]
    fn first_attempt_waits_zero() {
        let mut policy = FibonacciBackoff::seeded(7);
        let param = ResubscribeParam {
            retries: 0,
            reason: None,
        };
        assert_eq!(policy.interval(&param), Duration::ZERO);
    }

    #[test_log::test]
    fn window_caps_after_last_step() {
        assert_eq!(
            FibonacciBackoff::max_wait(MAX_FIBONACCI_STEP_INDEX),
            Duration::from_secs(3770)
        );
        assert_eq!(
            FibonacciBackoff::max_wait(MAX_FIBONACCI_STEP_INDEX + 1),
            MAX_RETRY_WAIT_INTERVAL
        );
        assert_eq!(FibonacciBackoff::max_wait(1000), MAX_RETRY_WAIT_INTERVAL);
    }

    #[test_log::test]
    fn closures_are_policies() {
        let mut policy = |_: &ResubscribeParam| Duration::from_millis(250);
        let param = ResubscribeParam {
            retries: 3,
            reason: Some(Error::Timeout),
        };
        assert_eq!(policy.interval(&param), Duration::from_millis(250));
    }

    proptest! {
        #[test]
        fn interval_stays_in_window(retries in 1u32..40, seed in any::<u64>()) {
            let mut policy = FibonacciBackoff::seeded(seed);
            let wait = policy.interval(&ResubscribeParam { retries, reason: None });
            prop_assert!(wait >= FibonacciBackoff::min_wait(retries));
            prop_assert!(wait < FibonacciBackoff::max_wait(retries));
        }
    }
}
