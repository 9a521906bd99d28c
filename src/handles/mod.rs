//! # Handle Types
//!
//! The **user-facing API** of a running client. Starting a client yields two
//! values:
//!
//! | Handle | Role |
//! |--------|------|
//! | [`SubscriptionHandle`] | Drive the client: subscribe, mark updates, flush, cancel |
//! | [`ClientEvents`] | Receive [`ClientEvent`]s in order |
//!
//! `SubscriptionHandle` is cheap to clone; every clone talks to the same
//! client task. Once the task is gone every call returns
//! [`Error::RuntimeShutdown`].
//!
//! ## Pattern
//!
//! ```no_run
//! use wdm_next::prelude::*;
//! use wdm_next::schema::logging_settings;
//! use bytes::Bytes;
//!
//! # async fn example(client: SubscriptionHandle, mut events: ClientEvents) -> Result<()> {
//! let path = TraitPath::new(TraitDataHandle::new(1), logging_settings::MIN_LOG_TIME);
//! client.set_updated(path, Some(Bytes::from_static(b"\x0a")), true).await?;
//! client.flush_update().await?;
//!
//! while let Some(event) = events.next().await {
//!     if let ClientEvent::UpdateComplete { status, .. } = event {
//!         println!("update finished: {:?}", status);
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::Stream;
use tokio::sync::{mpsc, oneshot};

use crate::client::resubscribe::ResubscribePolicy;
use crate::client::{ClientEvent, ClientState};
use crate::error::{Error, Result};
use crate::runtime::Command;
use crate::schema::{TraitDataHandle, TraitPath};

/// Point-in-time view of a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ClientState,
    pub subscription_id: Option<u64>,
    pub is_initiator: bool,
    pub retry_counter: u32,
    /// Liveness granted by the publisher
    pub liveness_timeout: Option<Duration>,
    pub pending_paths: usize,
    pub dispatched_paths: usize,
    pub update_in_flight: bool,
    pub flush_in_progress: bool,
}

/// Handle to a running subscription client.
#[derive(Clone, Debug)]
pub struct SubscriptionHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl SubscriptionHandle {
    pub(crate) fn new(cmd_tx: mpsc::Sender<Command>) -> Self {
        Self { cmd_tx }
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| Error::RuntimeShutdown)
    }

    async fn request<T>(&self, cmd: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (response, response_rx) = oneshot::channel();
        self.send(cmd(response)).await?;
        response_rx.await.map_err(|_| Error::RuntimeShutdown)
    }

    /// Subscribe to the publisher as the initiator.
    ///
    /// Progress is reported through [`ClientEvents`]; a subscription that
    /// is already active is left alone.
    pub async fn initiate_subscription(&self) -> Result<()> {
        self.send(Command::InitiateSubscription).await
    }

    /// Subscribe back to a publisher that subscribed to us first.
    pub async fn initiate_counter_subscription(
        &self,
        subscription_id: u64,
        liveness_timeout_sec: u32,
    ) -> Result<()> {
        self.send(Command::InitiateCounterSubscription {
            subscription_id,
            liveness_timeout_sec,
        })
        .await
    }

    /// Mark a property as locally modified, optionally replacing its value.
    ///
    /// # Errors
    ///
    /// - [`Error::IncorrectState`]: conditional update while the trait has no valid version
    /// - [`Error::UnknownTrait`]: the trait is not registered
    /// - [`Error::SchemaMismatch`]: the property is not part of the trait
    pub async fn set_updated(
        &self,
        path: TraitPath,
        payload: Option<Bytes>,
        conditional: bool,
    ) -> Result<()> {
        self.request(|response| Command::SetUpdated {
            path,
            payload,
            conditional,
            response,
        })
        .await?
    }

    /// Send pending updates to the publisher.
    ///
    /// Returns once the first request is handed to the binding; results
    /// arrive as [`ClientEvent::UpdateComplete`].
    pub async fn flush_update(&self) -> Result<()> {
        self.request(|response| Command::FlushUpdate { response })
            .await?
    }

    /// Cancel the subscription with the publisher.
    pub async fn end_subscription(&self) -> Result<()> {
        self.request(|response| Command::EndSubscription { response })
            .await?
    }

    /// Drop the subscription without telling the publisher.
    pub async fn abort(&self) -> Result<()> {
        self.send(Command::Abort).await
    }

    /// Retry failed subscriptions with `policy`.
    pub async fn enable_resubscribe(&self, policy: impl ResubscribePolicy + 'static) -> Result<()> {
        self.send(Command::EnableResubscribe(Box::new(policy))).await
    }

    pub async fn disable_resubscribe(&self) -> Result<()> {
        self.send(Command::DisableResubscribe).await
    }

    /// Restart the backoff sequence and retry now.
    pub async fn reset_resubscribe(&self) -> Result<()> {
        self.send(Command::ResetResubscribe).await
    }

    pub async fn status(&self) -> Result<ClientStatus> {
        self.request(|response| Command::Status { response }).await
    }

    pub async fn state(&self) -> Result<ClientState> {
        Ok(self.status().await?.state)
    }

    /// Subscription id assigned by the publisher, once there is one.
    pub async fn subscription_id(&self) -> Result<Option<u64>> {
        Ok(self.status().await?.subscription_id)
    }

    /// Data version held for a trait; `None` when invalid.
    pub async fn sink_version(&self, handle: TraitDataHandle) -> Result<Option<u64>> {
        self.request(|response| Command::SinkVersion { handle, response })
            .await?
    }

    /// Local value of a property.
    pub async fn read(&self, path: TraitPath) -> Result<Bytes> {
        self.request(|response| Command::Read { path, response })
            .await?
    }

    /// Free the client and wait for its task to stop.
    ///
    /// Queued updates complete with [`Error::ConnectionAborted`].
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|response| Command::Shutdown { response })
            .await
    }
}

/// Events emitted by a client, in order.
///
/// Implements [`Stream`]; [`next`](Self::next) is the inherent shortcut.
#[derive(Debug)]
pub struct ClientEvents {
    rx: mpsc::Receiver<ClientEvent>,
}

impl ClientEvents {
    pub(crate) fn new(rx: mpsc::Receiver<ClientEvent>) -> Self {
        Self { rx }
    }

    /// Wait for the next event; `None` once the client task has stopped.
    pub async fn next(&mut self) -> Option<ClientEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is buffered.
    pub fn try_next(&mut self) -> Option<ClientEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for ClientEvents {
    type Item = ClientEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
