//! The test configuration record handed to an end-to-end driver.

use std::fmt;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::schema::{logging_settings, PropertyPathHandle};

/// Properties of the logging-settings trait a client mutates against each
/// peer in one iteration, in order.
///
/// Every mutation is flushed as its own conditional update request.
pub const MUTATED_PROPERTIES: [PropertyPathHandle; 4] = [
    logging_settings::CURRENT_IMPORTANCE,
    logging_settings::IMPORTANCE_EXPIRATION,
    logging_settings::MIN_LOG_TIME,
    logging_settings::MAX_LOG_TIME,
];

/// Lines of `"Update: Good Iteration"` one client logs per iteration for
/// each of its peers.
///
/// The client logs the line once per update response that accepts every
/// dispatched path, so this is one line per entry of
/// [`MUTATED_PROPERTIES`]. Notifications from the peer do not log it.
pub const UPDATE_LOGS_PER_ITERATION_PER_PEER: u32 = MUTATED_PROPERTIES.len() as u32;

/// Log line counted by update scenarios
pub const GOOD_ITERATION_PATTERN: &str = "Update: Good Iteration";

/// Expected number of [`GOOD_ITERATION_PATTERN`] lines for a run.
///
/// `iterations × (total_clients − 1) × UPDATE_LOGS_PER_ITERATION_PER_PEER`;
/// a run without clients expects none.
pub const fn expected_good_iterations(iterations: u32, total_clients: u32) -> u32 {
    iterations
        .saturating_mul(total_clients.saturating_sub(1))
        .saturating_mul(UPDATE_LOGS_PER_ITERATION_PER_PEER)
}

/// How subscriptions are established between device and service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WdmOption {
    /// Both peers subscribe to each other
    MutualSubscribe,
    /// Only the client subscribes
    OneWaySubscribe,
}

impl WdmOption {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MutualSubscribe => "mutual_subscribe",
            Self::OneWaySubscribe => "one_way_subscribe",
        }
    }

    /// Mock-device flag selecting this mode
    pub const fn device_flag(self) -> &'static str {
        match self {
            Self::MutualSubscribe => "--wdm-mutual-subscribe",
            Self::OneWaySubscribe => "--wdm-one-way-subscribe",
        }
    }
}

impl fmt::Display for WdmOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait and update scenario run by the mock device.
///
/// Only the codes used by the service tests are named; anything else is
/// carried as [`TestCaseId::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestCaseId {
    /// One updatable trait, conditional updates
    UpdatableOneTraitConditional,
    /// One updatable trait, unconditional updates
    UpdatableOneTraitUnconditional,
    Other(u32),
}

impl TestCaseId {
    pub const fn code(self) -> u32 {
        match self {
            Self::UpdatableOneTraitConditional => 10,
            Self::UpdatableOneTraitUnconditional => 11,
            Self::Other(code) => code,
        }
    }

    pub const fn from_code(code: u32) -> Self {
        match code {
            10 => Self::UpdatableOneTraitConditional,
            11 => Self::UpdatableOneTraitUnconditional,
            other => Self::Other(other),
        }
    }
}

/// One log expectation: `pattern` must appear exactly `expected` times
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogCheck {
    pub pattern: String,
    pub expected: u32,
}

impl LogCheck {
    pub fn new(pattern: impl Into<String>, expected: u32) -> Self {
        Self {
            pattern: pattern.into(),
            expected,
        }
    }
}

impl<S: Into<String>> From<(S, u32)> for LogCheck {
    fn from((pattern, expected): (S, u32)) -> Self {
        Self::new(pattern, expected)
    }
}

/// Rendered value of a configuration key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Str(String),
    Int(u64),
    /// Rendered as 0/1
    Flag(bool),
    LogChecks(Vec<LogCheck>),
    List(Vec<String>),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Flag(b) => write!(f, "{}", u8::from(*b)),
            Self::LogChecks(checks) => {
                f.write_str("[")?;
                for (i, check) in checks.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "({:?}, {})", check.pattern, check.expected)?;
                }
                f.write_str("]")
            }
            Self::List(items) => write!(f, "{items:?}"),
        }
    }
}

/// Configuration record for one end-to-end service test run.
///
/// Every field is required; [`TestConfigBuilder::build`] refuses a record
/// with any of them missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestConfig {
    pub wdm_option: WdmOption,
    pub final_client_status: u32,
    pub enable_client_flip: bool,
    pub test_client_iterations: u32,
    pub test_client_delay: Duration,
    pub client_clear_state_between_iterations: bool,
    pub test_client_case: TestCaseId,
    pub total_client_count: u32,
    pub client_log_check: Vec<LogCheck>,
    pub test_tag: String,
    pub test_case_name: Vec<String>,
}

const KEYS: [&str; 11] = [
    "wdm_option",
    "final_client_status",
    "enable_client_flip",
    "test_client_iterations",
    "test_client_delay",
    "client_clear_state_between_iterations",
    "test_client_case",
    "total_client_count",
    "client_log_check",
    "test_tag",
    "test_case_name",
];

impl TestConfig {
    pub fn builder() -> TestConfigBuilder {
        TestConfigBuilder::default()
    }

    /// Key names, in declaration order
    pub const fn keys() -> [&'static str; 11] {
        KEYS
    }

    /// `(key, value)` pairs in the order of [`keys`](Self::keys)
    pub fn args(&self) -> Vec<(&'static str, ArgValue)> {
        let values = [
            ArgValue::Str(self.wdm_option.as_str().to_string()),
            ArgValue::Int(u64::from(self.final_client_status)),
            ArgValue::Flag(self.enable_client_flip),
            ArgValue::Int(u64::from(self.test_client_iterations)),
            ArgValue::Int(duration_ms(self.test_client_delay)),
            ArgValue::Flag(self.client_clear_state_between_iterations),
            ArgValue::Int(u64::from(self.test_client_case.code())),
            ArgValue::Int(u64::from(self.total_client_count)),
            ArgValue::LogChecks(self.client_log_check.clone()),
            ArgValue::Str(self.test_tag.clone()),
            ArgValue::List(self.test_case_name.clone()),
        ];
        KEYS.into_iter().zip(values).collect()
    }

    /// Command-line flags for the mock device
    pub fn device_args(&self) -> Vec<String> {
        let mut args = vec![
            self.wdm_option.device_flag().to_string(),
            "--test-case".to_string(),
            self.test_client_case.code().to_string(),
            // the mock device counts iterations, not clients
            "--total-count".to_string(),
            self.test_client_iterations.to_string(),
            "--test-delay".to_string(),
            duration_ms(self.test_client_delay).to_string(),
        ];
        if self.enable_client_flip {
            args.push("--enable-flip".to_string());
        }
        args.push("--final-status".to_string());
        args.push(self.final_client_status.to_string());
        if self.client_clear_state_between_iterations {
            args.push("--clear-state-between-iterations".to_string());
        }
        args
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Builder for [`TestConfig`]
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct TestConfigBuilder {
    wdm_option: Option<WdmOption>,
    final_client_status: Option<u32>,
    enable_client_flip: Option<bool>,
    test_client_iterations: Option<u32>,
    test_client_delay: Option<Duration>,
    client_clear_state_between_iterations: Option<bool>,
    test_client_case: Option<TestCaseId>,
    total_client_count: Option<u32>,
    client_log_check: Option<Vec<LogCheck>>,
    test_tag: Option<String>,
    test_case_name: Option<Vec<String>>,
}

impl TestConfigBuilder {
    pub fn wdm_option(mut self, option: WdmOption) -> Self {
        self.wdm_option = Some(option);
        self
    }

    pub fn final_client_status(mut self, status: u32) -> Self {
        self.final_client_status = Some(status);
        self
    }

    pub fn enable_client_flip(mut self, enabled: bool) -> Self {
        self.enable_client_flip = Some(enabled);
        self
    }

    pub fn test_client_iterations(mut self, iterations: u32) -> Self {
        self.test_client_iterations = Some(iterations);
        self
    }

    pub fn test_client_delay(mut self, delay: Duration) -> Self {
        self.test_client_delay = Some(delay);
        self
    }

    pub fn client_clear_state_between_iterations(mut self, clear: bool) -> Self {
        self.client_clear_state_between_iterations = Some(clear);
        self
    }

    pub fn test_client_case(mut self, case: TestCaseId) -> Self {
        self.test_client_case = Some(case);
        self
    }

    pub fn total_client_count(mut self, count: u32) -> Self {
        self.total_client_count = Some(count);
        self
    }

    pub fn client_log_check<I, C>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<LogCheck>,
    {
        self.client_log_check = Some(checks.into_iter().map(Into::into).collect());
        self
    }

    pub fn test_tag(mut self, tag: impl Into<String>) -> Self {
        self.test_tag = Some(tag.into());
        self
    }

    pub fn test_case_name<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.test_case_name = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// # Errors
    ///
    /// [`Error::Config`](crate::Error::Config) naming the first missing key.
    pub fn build(self) -> Result<TestConfig> {
        Ok(TestConfig {
            wdm_option: required(self.wdm_option, "wdm_option")?,
            final_client_status: required(self.final_client_status, "final_client_status")?,
            enable_client_flip: required(self.enable_client_flip, "enable_client_flip")?,
            test_client_iterations: required(
                self.test_client_iterations,
                "test_client_iterations",
            )?,
            test_client_delay: required(self.test_client_delay, "test_client_delay")?,
            client_clear_state_between_iterations: required(
                self.client_clear_state_between_iterations,
                "client_clear_state_between_iterations",
            )?,
            test_client_case: required(self.test_client_case, "test_client_case")?,
            total_client_count: required(self.total_client_count, "total_client_count")?,
            client_log_check: required(self.client_log_check, "client_log_check")?,
            test_tag: required(self.test_tag, "test_tag")?,
            test_case_name: required(self.test_case_name, "test_case_name")?,
        })
    }
}

fn required<T>(value: Option<T>, key: &str) -> Result<T> {
    value.ok_or_else(|| ConfigError::new(format!("missing test option `{key}`")).into())
}
