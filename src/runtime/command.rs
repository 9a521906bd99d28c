//! # Commands (Internal)
//!
//! Handles never touch the [`ClientCore`](crate::client::ClientCore)
//! directly. They send [`Command`]s through an MPSC channel to the client
//! task, which applies them one at a time between network events:
//!
//! ```text
//! ┌────────────────────┐      Command channel      ┌─────────────────┐
//! │ SubscriptionHandle │ ───────────────────────▶ │   Client Task   │
//! │     (cloned)       │   cmd_tx.send(Command)   │   Event Loop    │
//! └────────────────────┘                          └─────────────────┘
//! ```
//!
//! ## Command Categories
//!
//! | Category | Commands |
//! |----------|----------|
//! | Lifecycle | `InitiateSubscription`, `InitiateCounterSubscription`, `EndSubscription`, `Abort`, `Shutdown` |
//! | Updates | `SetUpdated`, `FlushUpdate` |
//! | Resubscribe | `EnableResubscribe`, `DisableResubscribe`, `ResetResubscribe` |
//! | Queries | `Status`, `SinkVersion`, `Read` |
//!
//! Commands whose outcome the caller needs carry a
//! `oneshot::Sender<Result<T>>`; the rest are fire-and-forget.

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::client::resubscribe::ResubscribePolicy;
use crate::error::Result;
use crate::handles::ClientStatus;
use crate::schema::{TraitDataHandle, TraitPath};

/// Commands sent from handles to the client task
pub(crate) enum Command {
    InitiateSubscription,
    InitiateCounterSubscription {
        subscription_id: u64,
        liveness_timeout_sec: u32,
    },
    SetUpdated {
        path: TraitPath,
        payload: Option<Bytes>,
        conditional: bool,
        response: oneshot::Sender<Result<()>>,
    },
    FlushUpdate {
        response: oneshot::Sender<Result<()>>,
    },
    EndSubscription {
        response: oneshot::Sender<Result<()>>,
    },
    Abort,
    EnableResubscribe(Box<dyn ResubscribePolicy>),
    DisableResubscribe,
    ResetResubscribe,
    Status {
        response: oneshot::Sender<ClientStatus>,
    },
    SinkVersion {
        handle: TraitDataHandle,
        response: oneshot::Sender<Result<Option<u64>>>,
    },
    Read {
        path: TraitPath,
        response: oneshot::Sender<Result<Bytes>>,
    },
    /// Free the client and stop the task
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::InitiateSubscription => "InitiateSubscription",
            Self::InitiateCounterSubscription { .. } => "InitiateCounterSubscription",
            Self::SetUpdated { .. } => "SetUpdated",
            Self::FlushUpdate { .. } => "FlushUpdate",
            Self::EndSubscription { .. } => "EndSubscription",
            Self::Abort => "Abort",
            Self::EnableResubscribe(_) => "EnableResubscribe",
            Self::DisableResubscribe => "DisableResubscribe",
            Self::ResetResubscribe => "ResetResubscribe",
            Self::Status { .. } => "Status",
            Self::SinkVersion { .. } => "SinkVersion",
            Self::Read { .. } => "Read",
            Self::Shutdown { .. } => "Shutdown",
        };
        f.write_str(name)
    }
}
