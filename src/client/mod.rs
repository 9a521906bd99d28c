//! # Subscription Client Core (sans-I/O)
//!
//! Everything the WDM subscription client *decides* lives here; nothing in
//! this module performs I/O or reads the clock. Handlers take
//! `&mut ClientCore`, mutate it and push [`Action`]s describing the effects
//! the caller has to carry out.
//!
//! ## Responsibilities
//!
//! | Module | Handlers | Purpose |
//! |--------|----------|---------|
//! | [`subscription`] | `initiate_*`, `on_*`, `end_subscription`, `abort_subscription` | Subscription lifecycle |
//! | [`update`] | `set_updated`, `flush_update`, `on_update_response`, `on_update_timeout` | Update engine |
//! | [`resubscribe`] | — | Backoff policy between resubscribe attempts |
//! | [`path_store`] | — | Fixed-capacity stores of dirty paths |
//! | [`sink`] | — | Local copies of trait data |
//! | [`state`] | — | [`ClientState`] and [`ClientCore`] |
//!
//! ## Driving the Core
//!
//! ```
//! use wdm_next::client::{subscription, Action, ClientCore};
//! use wdm_next::client::sink::SinkCatalog;
//! use wdm_next::message::Outbound;
//! use wdm_next::ClientConfig;
//!
//! let mut core = ClientCore::new(ClientConfig::default(), SinkCatalog::default(), None);
//! core.set_binding_ready(true);
//!
//! let mut actions = Vec::new();
//! subscription::initiate_subscription(&mut core, &mut actions);
//!
//! assert!(actions
//!     .iter()
//!     .any(|a| matches!(a, Action::Send(Outbound::SubscribeRequest(_)))));
//! ```
//!
//! ## Contributor Notes
//!
//! - Handlers never return early without leaving the core consistent; errors
//!   that end the subscription go through `subscription::handle_terminated`
//! - Timer actions are idempotent: arming replaces the previous deadline

use std::time::Duration;

use crate::error::Error;
use crate::message::{Outbound, StatusCode, StatusReport};
use crate::schema::TraitPath;

pub mod path_store;
pub mod resubscribe;
pub mod sink;
pub mod state;
pub mod subscription;
pub mod update;

pub use state::{ClientCore, ClientState};

/// The timers a client owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timer {
    /// Inactivity while subscribing, liveness, or resubscribe holdoff
    Subscription,
    /// Response to a subscribe, confirm or cancel request
    Exchange,
    /// Response to an update request
    Update,
}

/// Effects requested by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Send a message to the publisher
    Send(Outbound),
    /// Arm (or re-arm) a timer
    ArmTimer { timer: Timer, after: Duration },
    /// Disarm a timer
    CancelTimer(Timer),
    /// Deliver an event to the application
    Emit(ClientEvent),
}

/// Events delivered to the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// A new request exchange was opened with the publisher
    ExchangeStart,
    /// The publisher showed signs of life
    SubscriptionActivity,
    /// The subscription is up
    SubscriptionEstablished { subscription_id: u64 },
    /// A notification was applied to the sinks
    NotificationProcessed { elements: usize },
    /// The subscription ended
    SubscriptionTerminated {
        will_retry: bool,
        reason: Option<Error>,
        status: Option<StatusReport>,
    },
    /// An updated path was acknowledged, rejected or dropped.
    ///
    /// `path` is `None` when the failure concerns the whole request.
    UpdateComplete {
        path: Option<TraitPath>,
        status: Option<StatusCode>,
        reason: Option<Error>,
    },
}

impl ClientEvent {
    /// True for an `UpdateComplete` carrying a success status
    pub fn is_update_success(&self) -> bool {
        matches!(
            self,
            Self::UpdateComplete {
                status: Some(status),
                reason: None,
                ..
            } if status.is_success()
        )
    }
}
