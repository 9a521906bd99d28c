//! # WDM Messages
//!
//! Typed representations of the messages exchanged between a subscription
//! client and a publisher. The client core consumes [`Inbound`] values and
//! produces [`Outbound`] values; how they travel is the business of a
//! [`Binding`](crate::net::Binding).
//!
//! ## Message Flow
//!
//! ```text
//!  Client                                   Publisher
//!    │ ── SubscribeRequest ──────────────────▶ │
//!    │ ◀──────────────────────── Notification ─│   (zero or more)
//!    │ ── StatusReport(Success) ─────────────▶ │
//!    │ ◀───────────────────── SubscribeResponse│
//!    │                                         │
//!    │ ── UpdateRequest ─────────────────────▶ │
//!    │ ◀───────── StatusReport + UpdateResponse│
//!    │                                         │
//!    │ ── SubscribeConfirm ──────────────────▶ │   (liveness)
//!    │ ◀──────────────── StatusReport(Success) │
//!    │                                         │
//!    │ ── SubscribeCancel ───────────────────▶ │
//!    │ ◀──────────────── StatusReport(Success) │
//! ```
//!
//! ## Status Reports
//!
//! | Profile | Code | Constant |
//! |---------|------|----------|
//! | Common (`0x0000_0000`) | `0x0000` | [`StatusCode::SUCCESS`] |
//! | Common | `0x001A` | [`StatusCode::TIMEOUT`] |
//! | Common | `0x0050` | [`StatusCode::INTERNAL_ERROR`] |
//! | WDM (`0x0000_000B`) | `0x0025` | [`StatusCode::VERSION_MISMATCH`] |
//! | WDM | `0x0028` | [`StatusCode::INVALID_SUBSCRIPTION_ID`] |

use std::fmt;

use bytes::Bytes;

use crate::error::Error;
use crate::schema::TraitPath;

/// Common profile id
pub const PROFILE_COMMON: u32 = 0x0000_0000;

/// Weave Data Management profile id
pub const PROFILE_WDM: u32 = 0x0000_000B;

// ============================================================================
// STATUS REPORTS
// ============================================================================

/// A `(profile, code)` pair identifying a status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode {
    pub profile_id: u32,
    pub code: u16,
}

impl StatusCode {
    pub const SUCCESS: Self = Self::common(0x0000);
    pub const TIMEOUT: Self = Self::common(0x001A);
    pub const INTERNAL_ERROR: Self = Self::common(0x0050);
    pub const VERSION_MISMATCH: Self = Self::wdm(0x0025);
    pub const INVALID_SUBSCRIPTION_ID: Self = Self::wdm(0x0028);

    pub const fn common(code: u16) -> Self {
        Self {
            profile_id: PROFILE_COMMON,
            code,
        }
    }

    pub const fn wdm(code: u16) -> Self {
        Self {
            profile_id: PROFILE_WDM,
            code,
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::SUCCESS
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}:0x{:04X}", self.profile_id, self.code)
    }
}

/// A status report, optionally carrying an [`UpdateResponse`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: StatusCode,
    pub update_response: Option<UpdateResponse>,
}

impl StatusReport {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            update_response: None,
        }
    }

    pub fn success() -> Self {
        Self::new(StatusCode::SUCCESS)
    }

    /// Attach per-element versions and statuses
    pub fn with_update_response(mut self, response: UpdateResponse) -> Self {
        self.update_response = Some(response);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)
    }
}

// ============================================================================
// SUBSCRIPTION MESSAGES
// ============================================================================

/// A subscribed path and the version the client already holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedPath {
    pub path: TraitPath,
    pub version: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeRequest {
    /// Only set for a counter-subscription
    pub subscription_id: Option<u64>,
    pub timeout_min_sec: Option<u32>,
    pub timeout_max_sec: Option<u32>,
    pub paths: Vec<VersionedPath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeResponse {
    pub subscription_id: u64,
    /// Liveness timeout granted by the publisher
    pub timeout_sec: Option<u32>,
}

/// One piece of trait data pushed by the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataElement {
    pub path: TraitPath,
    pub version: u64,
    pub payload: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Notification {
    pub data: Vec<DataElement>,
}

// ============================================================================
// UPDATE MESSAGES
// ============================================================================

/// Fixed per-element cost of an update element (path header, version, framing)
pub const UPDATE_ELEMENT_OVERHEAD: usize = 16;

/// Per-tag cost of an update element path
pub const UPDATE_TAG_SIZE: usize = 8;

/// One mutation sent to the publisher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateElement {
    pub path: TraitPath,
    pub profile_id: u32,
    /// Tags from the trait root to the written node
    pub tags: Vec<u64>,
    /// Set for conditional updates
    pub required_version: Option<u64>,
    /// The element replaces a whole dictionary; `tags` point to its parent
    pub replace_dictionary: bool,
    pub payload: Bytes,
}

impl UpdateElement {
    /// Number of bytes this element occupies in an update request
    pub fn encoded_len(&self) -> usize {
        UPDATE_ELEMENT_OVERHEAD + self.tags.len() * UPDATE_TAG_SIZE + self.payload.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateRequest {
    pub elements: Vec<UpdateElement>,
    /// More elements of the same trait follow in a later request
    pub partial: bool,
}

impl UpdateRequest {
    pub fn encoded_len(&self) -> usize {
        self.elements.iter().map(UpdateElement::encoded_len).sum()
    }
}

/// Additional information of the status report answering an update request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateResponse {
    /// Data versions created by each element, in request order
    pub versions: Option<Vec<u64>>,
    /// Per-element statuses, in request order
    pub statuses: Option<Vec<StatusCode>>,
}

impl UpdateResponse {
    /// A response acknowledging every element with success
    pub fn success(versions: Vec<u64>) -> Self {
        let statuses = vec![StatusCode::SUCCESS; versions.len()];
        Self {
            versions: Some(versions),
            statuses: Some(statuses),
        }
    }
}

// ============================================================================
// ENVELOPES
// ============================================================================

/// Messages the client sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    SubscribeRequest(SubscribeRequest),
    SubscribeConfirm { subscription_id: u64 },
    SubscribeCancel { subscription_id: u64 },
    UpdateRequest(UpdateRequest),
    /// Answer to a notification or a publisher cancel
    StatusReport(StatusReport),
}

impl Outbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscribeRequest(_) => "SubscribeRequest",
            Self::SubscribeConfirm { .. } => "SubscribeConfirm",
            Self::SubscribeCancel { .. } => "SubscribeCancel",
            Self::UpdateRequest(_) => "UpdateRequest",
            Self::StatusReport(_) => "StatusReport",
        }
    }
}

/// Messages and binding events the client receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    SubscribeResponse(SubscribeResponse),
    Notification(Notification),
    /// Answer to a subscribe, confirm or cancel request
    StatusReport(StatusReport),
    /// Publisher-initiated cancel
    CancelRequest {
        subscription_id: u64,
        /// Whether the message was authenticated as coming from the peer
        authentic: bool,
    },
    /// Answer to an update request
    UpdateResponse(StatusReport),
    /// The binding finished preparing
    BindingReady,
    /// The binding could not be prepared
    BindingFailed(Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{PropertyPathHandle, TraitDataHandle};

    #[test_log::test]
    fn success_is_common_zero() {
        assert!(StatusReport::success().is_success());
        assert!(!StatusReport::new(StatusCode::wdm(0)).is_success());
        assert!(!StatusReport::new(StatusCode::INTERNAL_ERROR).is_success());
        assert_eq!(StatusCode::TIMEOUT.to_string(), "0x00000000:0x001A");
    }

    #[test_log::test]
    fn encoded_len_counts_tags_and_payload() {
        let element = UpdateElement {
            path: TraitPath::new(TraitDataHandle::new(1), PropertyPathHandle::new(4)),
            profile_id: 0x0A01,
            tags: vec![3],
            required_version: None,
            replace_dictionary: false,
            payload: Bytes::from_static(b"abcd"),
        };
        assert_eq!(element.encoded_len(), UPDATE_ELEMENT_OVERHEAD + UPDATE_TAG_SIZE + 4);
    }
}
