//! Client state machine data.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::client::path_store::PathStore;
use crate::client::resubscribe::ResubscribePolicy;
use crate::client::sink::SinkCatalog;
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::handles::ClientStatus;

static NEXT_CLIENT_ID: AtomicU16 = AtomicU16::new(0);

/// Lifecycle states of a subscription client.
///
/// The declaration order is meaningful: `state < ResubscribeHoldoff` means
/// "not yet retrying or aborting".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ClientState {
    Free,
    Initialized,
    /// Subscribe request sent as the initiator
    SubscribingRequest,
    /// Subscribe request sent as a counter-subscriber
    SubscribingCounter,
    SubscriptionEstablishedIdle,
    SubscriptionEstablishedConfirming,
    Canceling,
    ResubscribeHoldoff,
    Aborting,
    Aborted,
}

impl ClientState {
    /// The 5-character code used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "FREE",
            Self::Initialized => "INIT",
            Self::SubscribingRequest => "SReq1",
            Self::SubscribingCounter => "SReq2",
            Self::SubscriptionEstablishedIdle => "ALIVE",
            Self::SubscriptionEstablishedConfirming => "CONFM",
            Self::Canceling => "CANCL",
            Self::ResubscribeHoldoff => "RETRY",
            Self::Aborting => "ABTNG",
            Self::Aborted => "ABORT",
        }
    }

    pub fn is_subscribing(&self) -> bool {
        matches!(self, Self::SubscribingRequest | Self::SubscribingCounter)
    }

    pub fn is_established(&self) -> bool {
        matches!(
            self,
            Self::SubscriptionEstablishedIdle | Self::SubscriptionEstablishedConfirming
        )
    }
}

impl std::fmt::Display for ClientState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a subscription client knows.
///
/// Owned by the client task; handlers in [`subscription`](super::subscription)
/// and [`update`](super::update) mutate it.
pub struct ClientCore {
    pub(crate) id: u16,
    pub(crate) state: ClientState,
    pub(crate) config: ClientConfig,
    pub(crate) is_initiator: bool,
    pub(crate) subscription_id: Option<u64>,
    /// Liveness granted by the publisher
    pub(crate) liveness_timeout: Option<Duration>,
    pub(crate) retry_counter: u32,
    pub(crate) resubscribe: Option<Box<dyn ResubscribePolicy>>,
    pub(crate) binding_ready: bool,
    /// An initiate request is parked until the binding is ready
    pub(crate) awaiting_binding: bool,

    pub(crate) catalog: SinkCatalog,
    pub(crate) pending: PathStore,
    pub(crate) dispatched: PathStore,
    pub(crate) update_in_flight: bool,
    pub(crate) flush_in_progress: bool,
    /// The last request left paths of its trait pending
    pub(crate) partial_update: bool,
    /// Round-robin cursor over the catalog
    pub(crate) cur_trait_idx: usize,
}

impl std::fmt::Debug for ClientCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCore")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("subscription_id", &self.subscription_id)
            .field("retry_counter", &self.retry_counter)
            .field("pending", &self.pending.len())
            .field("dispatched", &self.dispatched.len())
            .finish_non_exhaustive()
    }
}

impl ClientCore {
    pub fn new(
        config: ClientConfig,
        catalog: SinkCatalog,
        resubscribe: Option<Box<dyn ResubscribePolicy>>,
    ) -> Self {
        let id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        let capacity = config.path_store_capacity;
        Self {
            id,
            state: ClientState::Initialized,
            config,
            is_initiator: false,
            subscription_id: None,
            liveness_timeout: None,
            retry_counter: 0,
            resubscribe,
            binding_ready: false,
            awaiting_binding: false,
            catalog,
            pending: PathStore::new(capacity),
            dispatched: PathStore::new(capacity),
            update_in_flight: false,
            flush_in_progress: false,
            partial_update: false,
            cur_trait_idx: 0,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub(crate) fn move_to(&mut self, state: ClientState) {
        self.state = state;
        debug!("Client[{}] moving to [{}]", self.id, state.as_str());
    }

    pub(crate) fn incorrect_state(&self) -> Error {
        Error::IncorrectState(self.state.as_str())
    }

    /// Subscription id, once the publisher assigned one
    pub fn subscription_id(&self) -> Result<u64> {
        match self.state {
            ClientState::SubscribingCounter
            | ClientState::SubscriptionEstablishedIdle
            | ClientState::SubscriptionEstablishedConfirming
            | ClientState::Canceling => self.subscription_id.ok_or_else(|| self.incorrect_state()),
            _ => Err(self.incorrect_state()),
        }
    }

    pub fn is_retry_enabled(&self) -> bool {
        self.resubscribe.is_some()
    }

    pub fn is_initiator(&self) -> bool {
        self.is_initiator
    }

    pub fn retry_counter(&self) -> u32 {
        self.retry_counter
    }

    /// Mark the binding as usable (or not) without delivering an event
    pub fn set_binding_ready(&mut self, ready: bool) {
        self.binding_ready = ready;
    }

    pub fn catalog(&self) -> &SinkCatalog {
        &self.catalog
    }

    pub fn pending(&self) -> &PathStore {
        &self.pending
    }

    pub fn dispatched(&self) -> &PathStore {
        &self.dispatched
    }

    pub fn is_update_in_flight(&self) -> bool {
        self.update_in_flight
    }

    pub fn is_flush_in_progress(&self) -> bool {
        self.flush_in_progress
    }

    /// Snapshot for the application
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            state: self.state,
            subscription_id: self.subscription_id().ok(),
            is_initiator: self.is_initiator,
            retry_counter: self.retry_counter,
            liveness_timeout: self.liveness_timeout,
            pending_paths: self.pending.len(),
            dispatched_paths: self.dispatched.len(),
            update_in_flight: self.update_in_flight,
            flush_in_progress: self.flush_in_progress,
        }
    }

    /// Forget subscription-specific state after an abort
    pub(crate) fn reset(&mut self) {
        self.is_initiator = false;
        self.subscription_id = None;
        self.liveness_timeout = None;
        self.retry_counter = 0;
        self.awaiting_binding = false;
        self.update_in_flight = false;
        self.flush_in_progress = false;
        self.partial_update = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn state_order_separates_retry_and_abort() {
        assert!(ClientState::Canceling < ClientState::ResubscribeHoldoff);
        assert!(ClientState::ResubscribeHoldoff < ClientState::Aborting);
        assert!(ClientState::Initialized < ClientState::SubscribingRequest);
        assert_eq!(ClientState::SubscriptionEstablishedIdle.to_string(), "ALIVE");
    }

    #[test_log::test]
    fn subscription_id_needs_an_assigned_id() {
        let mut core = ClientCore::new(ClientConfig::default(), SinkCatalog::default(), None);
        assert_eq!(core.subscription_id(), Err(Error::IncorrectState("INIT")));

        core.subscription_id = Some(0x55);
        core.state = ClientState::SubscriptionEstablishedIdle;
        assert_eq!(core.subscription_id(), Ok(0x55));

        core.state = ClientState::SubscribingRequest;
        assert!(core.subscription_id().is_err());
    }
}
