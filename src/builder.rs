//! Builder for configuring and starting WDM subscription clients.
//!
//! ## Quick Start
//!
//! A client needs a [`Binding`] to its publisher and at least one trait
//! sink to update:
//!
//! ```no_run
//! use wdm_next::prelude::*;
//! use wdm_next::schema::logging_settings;
//!
//! # async fn example() -> wdm_next::Result<()> {
//! let (binding, _peer) = wdm_next::net::channel_binding(16);
//! let (client, _events) = wdm_next::configure()
//!     .sink(TraitDataHandle::new(1), UpdatableSink::new(&logging_settings::SCHEMA))
//!     .start(binding)?;
//! client.initiate_subscription().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder Pattern
//!
//! Timeouts and limits live in [`ClientConfig`]; resubscription is opt-in:
//!
//! ```no_run
//! use std::time::Duration;
//! use wdm_next::prelude::*;
//! use wdm_next::schema::logging_settings;
//!
//! # async fn example() -> wdm_next::Result<()> {
//! let (binding, _peer) = wdm_next::net::channel_binding(16);
//! let config = ClientConfig::builder()
//!     .subscribe_timeout(30, 120)
//!     .update_timeout(Duration::from_secs(5))
//!     .max_update_size(512)
//!     .build();
//!
//! let (client, events) = wdm_next::configure()
//!     .config(config)
//!     .sink(TraitDataHandle::new(1), UpdatableSink::new(&logging_settings::SCHEMA))
//!     .sink(TraitDataHandle::new(2), UpdatableSink::new(&logging_settings::SCHEMA))
//!     .resubscribe(FibonacciBackoff::default())
//!     .start(binding)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Sinks
//!
//! Every trait instance the client may update is registered up front under a
//! [`TraitDataHandle`]. Registering the same handle twice is a configuration
//! error, reported by [`start`](ClientBuilder::start).
//!
//! ## Runtime
//!
//! `start` spawns the client task on the current tokio runtime and must be
//! called from within one. The task lives until
//! [`SubscriptionHandle::shutdown`] is called or every handle is dropped.

use tokio::sync::mpsc;

use crate::client::resubscribe::ResubscribePolicy;
use crate::client::sink::{SinkCatalog, UpdatableSink};
use crate::client::state::ClientCore;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::handles::{ClientEvents, SubscriptionHandle};
use crate::net::Binding;
use crate::runtime::event_loop::client_task;
use crate::schema::TraitDataHandle;

/// Capacity of the handle → task command channel
const COMMAND_CAPACITY: usize = 64;

/// Entry point for building a client.
///
/// Equivalent to [`ClientBuilder::default`].
pub fn configure() -> ClientBuilder {
    ClientBuilder::default()
}

/// Builder for a WDM subscription client
#[must_use]
#[derive(Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    catalog: SinkCatalog,
    resubscribe: Option<Box<dyn ResubscribePolicy>>,
    first_error: Option<Error>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("config", &self.config)
            .field("sinks", &self.catalog.len())
            .field("resubscribe", &self.resubscribe.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Replace the whole client configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Register the sink backing trait instance `handle`.
    pub fn sink(mut self, handle: TraitDataHandle, sink: UpdatableSink) -> Self {
        if let Err(e) = self.catalog.add(handle, sink) {
            self.first_error.get_or_insert(e);
        }
        self
    }

    /// Resubscribe with `policy` whenever the subscription drops.
    ///
    /// Without a policy a failed subscription is reported once and the
    /// client waits for the next `initiate_subscription`.
    pub fn resubscribe(mut self, policy: impl ResubscribePolicy + 'static) -> Self {
        self.resubscribe = Some(Box::new(policy));
        self
    }

    /// Spawn the client task over `binding`.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error recorded while building, such
    /// as a trait handle registered twice.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start<B: Binding>(self, binding: B) -> Result<(SubscriptionHandle, ClientEvents)> {
        if let Some(e) = self.first_error {
            return Err(e);
        }

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_capacity.max(1));
        let core = ClientCore::new(self.config, self.catalog, self.resubscribe);

        tokio::spawn(client_task(binding, core, cmd_rx, event_tx));

        Ok((SubscriptionHandle::new(cmd_tx), ClientEvents::new(event_rx)))
    }
}
