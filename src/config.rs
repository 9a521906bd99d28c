//! # Client Configuration
//!
//! This module provides the configuration type for the WDM subscription client.
//!
//! ## Quick Start
//!
//! The defaults match a typical device talking to a service over reliable
//! messaging:
//!
//! ```
//! use wdm_next::ClientConfig;
//! use std::time::Duration;
//!
//! let config = ClientConfig::builder()
//!     .inactivity_timeout_during_subscribing(Duration::from_secs(30))
//!     .max_update_size(512)
//!     .build();
//!
//! assert_eq!(config.max_update_size, 512);
//! ```
//!
//! ## Timers
//!
//! The client runs three independent timers:
//!
//! | Timer | Armed while | Driven by |
//! |-------|-------------|-----------|
//! | subscription | `SReq1`/`SReq2`, `ALIVE`, `RETRY` | `inactivity_timeout_during_subscribing`, liveness from the publisher, resubscribe policy |
//! | exchange | a subscribe, confirm or cancel request is outstanding | `response_timeout` |
//! | update | an update request is in flight | `update_timeout` |
//!
//! ## Liveness Margin
//!
//! An initiating client sends its subscribe confirm *before* the liveness
//! period runs out, leaving room for reliable-messaging retransmissions:
//!
//! ```text
//! margin = (wrm_max_retrans + 1) × wrm_initial_retrans_timeout
//! ```
//!
//! A liveness period not strictly greater than the margin is a configuration
//! problem and terminates the subscription with [`Error::Timeout`](crate::Error::Timeout).
//!
//! ## Configuration Options Reference
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `inactivity_timeout_during_subscribing` | None | Abort subscribing when the publisher stays silent |
//! | `subscribe_timeout_min` / `_max` | None | Liveness range requested from the publisher (seconds) |
//! | `response_timeout` | 10 s | Wait for a response to subscribe/confirm/cancel |
//! | `update_timeout` | 10 s | Wait for the status report of an update request |
//! | `wrm_max_retrans` | 3 | Reliable messaging retransmissions |
//! | `wrm_initial_retrans_timeout` | 2000 ms | Reliable messaging initial retransmission timeout |
//! | `max_update_size` | 1200 | Byte budget of one update request |
//! | `path_store_capacity` | 64 | Slots in the pending and dispatched path stores |
//! | `event_capacity` | 256 | Buffered [`ClientEvent`](crate::ClientEvent)s before events are dropped |

use std::time::Duration;
use tracing::warn;

/// Largest liveness timeout (in seconds) a publisher may grant.
pub const MAX_TIMEOUT_SEC: u32 = 3600;

/// Default wait for the response to a subscribe, confirm or cancel request.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default wait for the status report answering an update request.
pub const DEFAULT_UPDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default number of reliable-messaging retransmissions.
pub const DEFAULT_WRM_MAX_RETRANS: u32 = 3;

/// Default reliable-messaging initial retransmission timeout.
pub const DEFAULT_WRM_INITIAL_RETRANS_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default byte budget for a single update request.
pub const DEFAULT_MAX_UPDATE_SIZE: usize = 1200;

/// Largest accepted update size; larger values fall back to the default.
pub const MAX_UPDATE_SIZE_LIMIT: usize = u16::MAX as usize;

/// Default capacity of each update path store.
pub const DEFAULT_PATH_STORE_CAPACITY: usize = 64;

/// Default capacity of the event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// WDM subscription client configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Abort the subscribing phase after this much publisher silence (default: None)
    pub inactivity_timeout_during_subscribing: Option<Duration>,
    /// Minimum liveness timeout requested from the publisher, seconds (default: None)
    pub subscribe_timeout_min: Option<u32>,
    /// Maximum liveness timeout requested from the publisher, seconds (default: None)
    pub subscribe_timeout_max: Option<u32>,
    /// Response timeout for subscribe, confirm and cancel requests (default: 10 s)
    pub response_timeout: Duration,
    /// Response timeout for update requests (default: 10 s)
    pub update_timeout: Duration,
    /// Reliable messaging: maximum retransmissions (default: 3)
    pub wrm_max_retrans: u32,
    /// Reliable messaging: initial retransmission timeout (default: 2000 ms)
    pub wrm_initial_retrans_timeout: Duration,
    /// Byte budget of one update request (default: 1200)
    pub max_update_size: usize,
    /// Slots in each update path store (default: 64)
    pub path_store_capacity: usize,
    /// Buffered client events (default: 256)
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout_during_subscribing: None,
            subscribe_timeout_min: None,
            subscribe_timeout_max: None,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            update_timeout: DEFAULT_UPDATE_TIMEOUT,
            wrm_max_retrans: DEFAULT_WRM_MAX_RETRANS,
            wrm_initial_retrans_timeout: DEFAULT_WRM_INITIAL_RETRANS_TIMEOUT,
            max_update_size: DEFAULT_MAX_UPDATE_SIZE,
            path_store_capacity: DEFAULT_PATH_STORE_CAPACITY,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create a builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Time reserved for reliable-messaging retransmissions before the
    /// liveness period of an initiating client ends.
    pub fn liveness_margin(&self) -> Duration {
        self.wrm_initial_retrans_timeout
            .saturating_mul(self.wrm_max_retrans.saturating_add(1))
    }
}

/// Builder for `ClientConfig`
#[derive(Default)]
#[must_use]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    /// Abort subscribing if no message arrives from the publisher within
    /// `timeout`.
    ///
    /// Applies to the `SReq1` and `SReq2` states only. Each notification
    /// received while subscribing re-arms the timer.
    pub fn inactivity_timeout_during_subscribing(mut self, timeout: Duration) -> Self {
        self.config.inactivity_timeout_during_subscribing = Some(timeout);
        self
    }

    /// Liveness range (seconds) requested in the subscribe request.
    ///
    /// Values above [`MAX_TIMEOUT_SEC`] are clamped with a warning.
    pub fn subscribe_timeout(mut self, min_sec: u32, max_sec: u32) -> Self {
        self.config.subscribe_timeout_min = Some(clamp_timeout_sec(min_sec, "subscribe_timeout_min"));
        self.config.subscribe_timeout_max = Some(clamp_timeout_sec(max_sec, "subscribe_timeout_max"));
        self
    }

    /// Response timeout for subscribe, subscribe confirm and cancel requests.
    ///
    /// Default: 10 s
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_timeout = timeout;
        self
    }

    /// Response timeout for update requests.
    ///
    /// Default: 10 s
    pub fn update_timeout(mut self, timeout: Duration) -> Self {
        self.config.update_timeout = timeout;
        self
    }

    /// Reliable messaging parameters used to compute the liveness margin.
    pub fn wrm(mut self, max_retrans: u32, initial_retrans_timeout: Duration) -> Self {
        self.config.wrm_max_retrans = max_retrans;
        self.config.wrm_initial_retrans_timeout = initial_retrans_timeout;
        self
    }

    /// Byte budget of one update request.
    ///
    /// Values above [`MAX_UPDATE_SIZE_LIMIT`] or zero fall back to
    /// [`DEFAULT_MAX_UPDATE_SIZE`].
    pub fn max_update_size(mut self, size: usize) -> Self {
        self.config.max_update_size = if size == 0 || size > MAX_UPDATE_SIZE_LIMIT {
            warn!(
                "max_update_size {} out of range, using default {}",
                size, DEFAULT_MAX_UPDATE_SIZE
            );
            DEFAULT_MAX_UPDATE_SIZE
        } else {
            size
        };
        self
    }

    /// Number of slots in the pending and dispatched path stores.
    pub fn path_store_capacity(mut self, capacity: usize) -> Self {
        self.config.path_store_capacity = capacity.max(1);
        self
    }

    /// Number of [`ClientEvent`](crate::ClientEvent)s buffered for the application.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity.max(1);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ClientConfig {
        self.config
    }
}

fn clamp_timeout_sec(value: u32, field_name: &str) -> u32 {
    if value > MAX_TIMEOUT_SEC {
        warn!(
            "{} value {} exceeds maximum ({}), clamping",
            field_name, value, MAX_TIMEOUT_SEC
        );
        MAX_TIMEOUT_SEC
    } else {
        value
    }
}
