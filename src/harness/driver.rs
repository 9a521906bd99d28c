//! Contract between a service test case and the driver that runs it.

use std::collections::HashMap;
use std::future::Future;

use tracing::{debug, warn};

use super::scenario::{LogCheck, TestConfig};
use crate::error::{Error, Result};

/// Runs a configured end-to-end scenario.
///
/// An implementation starts the mock devices, lets them talk to the
/// service and checks the collected logs against
/// [`TestConfig::client_log_check`]. `Ok(())` means the run passed; any
/// error is the test failure.
pub trait Driver: Send + Sync {
    fn run(&self, config: &TestConfig) -> impl Future<Output = Result<()>> + Send;
}

/// Compare log expectations against the counts a driver observed.
///
/// A pattern missing from `observed` counts as zero occurrences.
///
/// # Errors
///
/// [`Error::LogMismatch`] for the first check whose count differs.
pub fn check_log_counts(checks: &[LogCheck], observed: &HashMap<String, usize>) -> Result<()> {
    for check in checks {
        let found = observed.get(&check.pattern).copied().unwrap_or(0);
        let expected = check.expected as usize;
        if found != expected {
            warn!(
                "log check failed: {:?} expected {} found {}",
                check.pattern, expected, found
            );
            return Err(Error::LogMismatch {
                pattern: check.pattern.clone(),
                expected,
                found,
            });
        }
        debug!("log check passed: {:?} x{}", check.pattern, found);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn matching_counts_pass() {
        let checks = vec![LogCheck::new("Update: Good Iteration", 80)];
        let observed = HashMap::from([("Update: Good Iteration".to_string(), 80)]);
        assert!(check_log_counts(&checks, &observed).is_ok());
    }

    #[test_log::test]
    fn first_mismatch_is_reported() {
        let checks = vec![LogCheck::new("a", 1), LogCheck::new("b", 2)];
        let observed = HashMap::from([("a".to_string(), 1), ("b".to_string(), 3)]);
        assert_eq!(
            check_log_counts(&checks, &observed),
            Err(Error::LogMismatch {
                pattern: "b".into(),
                expected: 2,
                found: 3,
            })
        );
    }

    #[test_log::test]
    fn absent_pattern_counts_as_zero() {
        let checks = vec![LogCheck::new("never", 0), LogCheck::new("once", 1)];
        let observed = HashMap::new();
        assert!(matches!(
            check_log_counts(&checks, &observed),
            Err(Error::LogMismatch { found: 0, expected: 1, .. })
        ));
    }
}
