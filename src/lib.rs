//! # wdm-next
//!
//! An **async WDM (Weave Data Management) subscription client** for [tokio](https://tokio.rs),
//! together with the configuration contract of the end-to-end service tests
//! that drive it.
//!
//! WDM is a publish/subscribe data-management protocol: a client subscribes to
//! trait instances held by a publisher, receives notifications when the
//! publisher's data changes, and may push its own mutations back with update
//! requests that the publisher acknowledges with a status report.
//!
//! ## Features
//!
//! - **Subscription lifecycle**: subscribe, counter-subscribe (mutual
//!   subscription), liveness confirmation, cancel and abort
//! - **Resubscribe**: randomized Fibonacci backoff, pluggable policy
//! - **Updates**: pending/dispatched path stores, conditional updates guarded
//!   by data versions, dictionary replace, partial updates
//! - **Sans-I/O core**: every protocol decision is a pure function over
//!   [`client::ClientCore`] returning [`client::Action`]s
//! - **Test contract**: [`harness::TestConfig`] and the [`harness::Driver`] trait
//!   used by the end-to-end service scenarios
//!
//! ## Quick Start
//!
//! ```no_run
//! use wdm_next::prelude::*;
//! use wdm_next::schema::logging_settings;
//!
//! # async fn example() -> wdm_next::Result<()> {
//! let (binding, _peer) = wdm_next::net::channel_binding(16);
//! let handle = TraitDataHandle::new(1);
//!
//! let (client, mut events) = wdm_next::configure()
//!     .sink(handle, UpdatableSink::new(&logging_settings::SCHEMA))
//!     .resubscribe(FibonacciBackoff::default())
//!     .start(binding)?;
//!
//! client.initiate_subscription().await?;
//!
//! while let Some(event) = events.next().await {
//!     if let ClientEvent::SubscriptionEstablished { subscription_id } = event {
//!         println!("subscribed: {subscription_id:#x}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       User Application                           │
//! │   ┌────────────────────┐            ┌────────────────────┐       │
//! │   │ SubscriptionHandle │            │   ClientEvents     │       │
//! │   └─────────┬──────────┘            └─────────▲──────────┘       │
//! └─────────────┼─────────────────────────────────┼──────────────────┘
//!               │ Commands                        │ ClientEvent
//!               ▼                                 │
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   Client task (event loop)                       │
//! │  ┌────────────────────────────────────────────────────────────┐  │
//! │  │                      ClientCore                            │  │
//! │  │  • state (INIT → SReq1 → ALIVE ⇄ CONFM → ...)              │  │
//! │  │  • sink catalog (versions, dirty flags)                    │  │
//! │  │  • pending / dispatched path stores                        │  │
//! │  │  • resubscribe policy + retry counter                      │  │
//! │  └────────────────────────────────────────────────────────────┘  │
//! │  select!: commands │ binding inbound │ earliest timer            │
//! └──────────────────────────────┬───────────────────────────────────┘
//!                                ▼
//!                     ┌─────────────────────┐
//!                     │  Binding (to peer)  │
//!                     └─────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module | Visibility | Responsibility |
//! |--------|------------|----------------|
//! | [`client`] | Public | Sans-I/O state machine: subscription, update engine, resubscribe |
//! | [`handles`] | Public | [`SubscriptionHandle`], [`ClientEvents`] |
//! | [`config`] | Public | [`ClientConfig`] and its builder |
//! | [`builder`] | Public | [`configure()`] entry point |
//! | [`message`] | Public | Typed protocol messages and status reports |
//! | [`schema`] | Public | Trait schemas, property path handles |
//! | [`net`] | Public | [`net::Binding`] abstraction and the channel binding |
//! | [`harness`] | Public | End-to-end test configuration and driver contract |
//! | [`error`] | Public | [`Error`], [`Result`] |
//! | `runtime` | Internal | Command enum and the client event loop |
//!
//! ## The Client Task as State Machine Executor
//!
//! The client task owns a single [`client::ClientCore`]. Handlers in
//! [`client::subscription`] and [`client::update`] take `&mut ClientCore`
//! and push [`client::Action`] values; the task executes them (send through
//! the binding, arm or cancel a timer, deliver an event). Handles never touch
//! the state directly.
//!
//! ## Client States
//!
//! | State | Code | Meaning |
//! |-------|------|---------|
//! | `Free` | `FREE` | Released |
//! | `Initialized` | `INIT` | Ready to subscribe |
//! | `SubscribingRequest` | `SReq1` | Subscribe request sent, id not known |
//! | `SubscribingCounter` | `SReq2` | Counter-subscription, id known |
//! | `SubscriptionEstablishedIdle` | `ALIVE` | Subscription up, liveness timer armed |
//! | `SubscriptionEstablishedConfirming` | `CONFM` | Subscribe confirm outstanding |
//! | `Canceling` | `CANCL` | Cancel request outstanding |
//! | `ResubscribeHoldoff` | `RETRY` | Waiting for the backoff timer |
//! | `Aborting` | `ABTNG` | Tear-down in progress |
//! | `Aborted` | `ABORT` | Terminal until re-initialised |

pub mod builder;
pub mod client;
pub mod config;
pub mod error;
pub mod handles;
pub mod harness;
pub mod message;
pub mod net;
pub mod schema;

pub(crate) mod runtime;

pub use builder::{configure, ClientBuilder};
pub use client::resubscribe::{FibonacciBackoff, ResubscribeParam, ResubscribePolicy};
pub use client::sink::UpdatableSink;
pub use client::{ClientEvent, ClientState};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::*;
pub use handles::{ClientEvents, ClientStatus, SubscriptionHandle};
pub use message::{StatusCode, StatusReport};
pub use schema::{PropertyPathHandle, TraitDataHandle, TraitPath};

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub mod prelude {
    pub use crate::{
        ClientConfig, ClientEvent, ClientEvents, ClientState, Error, FibonacciBackoff,
        PropertyPathHandle, ResubscribePolicy, Result, StatusCode, StatusReport,
        SubscriptionHandle, TraitDataHandle, TraitPath, UpdatableSink,
    };
}
