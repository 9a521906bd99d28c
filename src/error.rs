//! # Error Types
//!
//! This module defines all error types used throughout the library.
//!
//! ## Error Hierarchy
//!
//! The main [`Error`] enum covers all possible failure modes:
//!
//! | Variant | Cause | Recoverable? |
//! |---------|-------|--------------|
//! | [`Error::Config`] | Invalid configuration or test record | No (fix config) |
//! | [`Error::Protocol`] | Unexpected message or field | Maybe (resubscribe) |
//! | [`Error::IncorrectState`] | Operation not allowed in the current client state | Yes (wait) |
//! | [`Error::Timeout`] | Inactivity, liveness or response timeout | Maybe (resubscribe) |
//! | [`Error::StatusReport`] | Publisher answered with a failure status | Maybe |
//! | [`Error::ConnectionAborted`] | Subscription aborted while paths were queued | No |
//! | [`Error::MismatchUpdateRequiredVersion`] | Conditional update outdated | Yes (re-read, retry) |
//! | [`Error::MalformedUpdateResponse`] | Update response without version/status lists | No |
//! | [`Error::SchemaMismatch`] | Path cannot be expressed against the trait schema | No |
//! | [`Error::UpdateTooLarge`] | One property exceeds the maximum update size | No |
//! | [`Error::UnknownTrait`] | Trait data handle not in the sink catalog | No |
//! | [`Error::RuntimeShutdown`] | The client task has stopped | No |
//! | [`Error::LogMismatch`] | A log expectation of a test scenario was not met | No |
//! | [`Error::Driver`] | The end-to-end driver failed for another reason | No |
//!
//! ## Usage Pattern
//!
//! ```no_run
//! use wdm_next::prelude::*;
//!
//! async fn flush(client: &SubscriptionHandle) -> Result<()> {
//!     match client.flush_update().await {
//!         Ok(()) => {}
//!         Err(Error::RuntimeShutdown) => {
//!             // client task is gone
//!             return Err(Error::RuntimeShutdown);
//!         }
//!         Err(e) => {
//!             eprintln!("flush failed: {}", e);
//!             return Err(e);
//!         }
//!     }
//!     Ok(())
//! }
//! # fn main() {}
//! ```

use std::fmt;

use crate::message::StatusReport;

/// Result type alias using the library's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for all library operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Configuration error (invalid timeouts, missing test record fields, ...).
    Config(ConfigError),

    /// Protocol-level error (unexpected message type, subscription id mismatch).
    Protocol(ProtocolError),

    /// The operation is not valid in the client's current state.
    ///
    /// Carries the 5-character state code the client was in.
    IncorrectState(&'static str),

    /// A timer expired: inactivity while subscribing, liveness, or an
    /// outstanding request got no response.
    Timeout,

    /// The publisher answered a request with a non-success status report.
    StatusReport(StatusReport),

    /// The subscription was aborted while the path was still queued.
    ConnectionAborted,

    /// A conditional update was dropped because the local data version is
    /// invalid or older than the version the update was based on.
    MismatchUpdateRequiredVersion,

    /// A successful update response did not carry both version and status lists.
    MalformedUpdateResponse,

    /// A property path cannot be mapped onto the trait schema.
    SchemaMismatch,

    /// A single property does not fit into one update request.
    UpdateTooLarge {
        /// Size of the element that did not fit
        size: usize,
        /// Configured maximum update size
        max: usize,
    },

    /// The trait data handle is not registered in the sink catalog.
    UnknownTrait(u16),

    /// The client task has shut down.
    RuntimeShutdown,

    /// An expected log line did not appear the expected number of times.
    LogMismatch {
        /// Pattern that was checked
        pattern: String,
        /// Expected number of occurrences
        expected: usize,
        /// Observed number of occurrences
        found: usize,
    },

    /// The end-to-end driver failed.
    Driver(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "Configuration error: {}", e.message),
            Self::Protocol(e) => write!(f, "Protocol error: {}", e.message),
            Self::IncorrectState(state) => write!(f, "Incorrect state [{state}]"),
            Self::Timeout => write!(f, "Timed out"),
            Self::StatusReport(status) => write!(f, "Status report received: {status}"),
            Self::ConnectionAborted => write!(f, "Subscription aborted"),
            Self::MismatchUpdateRequiredVersion => {
                write!(f, "Data version does not match the update required version")
            }
            Self::MalformedUpdateResponse => write!(f, "Malformed update response"),
            Self::SchemaMismatch => write!(f, "Path does not match the trait schema"),
            Self::UpdateTooLarge { size, max } => {
                write!(f, "Update element of {size} bytes exceeds maximum of {max} bytes")
            }
            Self::UnknownTrait(handle) => write!(f, "Unknown trait data handle {handle}"),
            Self::RuntimeShutdown => write!(f, "Client task has shut down"),
            Self::LogMismatch {
                pattern,
                expected,
                found,
            } => write!(
                f,
                "Log check failed for {pattern:?}: expected {expected}, found {found}"
            ),
            Self::Driver(message) => write!(f, "Driver error: {message}"),
        }
    }
}

impl std::error::Error for Error {}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Protocol-level error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub message: String,
}

impl ProtocolError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}
