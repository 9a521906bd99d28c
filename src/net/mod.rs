//! Transport abstraction between the client task and the publisher.
//!
//! The client never touches sockets. It talks to a [`Binding`], which
//! carries typed WDM messages to one publisher and reports whether the
//! underlying connection is usable. A real deployment would implement
//! `Binding` over Weave reliable messaging; tests and the end-to-end
//! harness use the in-memory [`ChannelBinding`].

use std::future::Future;

use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::message::{Inbound, Outbound};

/// Message transport to a single publisher.
///
/// `recv` must be cancel-safe: the client task polls it inside
/// `tokio::select!` and drops the future whenever another branch wins.
pub trait Binding: Send + 'static {
    /// Whether messages can be sent right away.
    ///
    /// When `false`, the binding delivers [`Inbound::BindingReady`] or
    /// [`Inbound::BindingFailed`] once preparation finishes.
    fn is_ready(&self) -> bool;

    /// Send a message to the publisher.
    fn send(&mut self, message: Outbound) -> impl Future<Output = Result<()>> + Send;

    /// Next message or binding event; `None` once the binding is closed.
    fn recv(&mut self) -> impl Future<Output = Option<Inbound>> + Send;
}

/// In-memory binding backed by two mpsc channels
#[derive(Debug)]
pub struct ChannelBinding {
    tx: mpsc::Sender<Outbound>,
    rx: mpsc::Receiver<Inbound>,
    ready: bool,
}

/// The publisher side of a [`ChannelBinding`]
#[derive(Debug)]
pub struct BindingPeer {
    /// Deliver messages and binding events to the client
    pub tx: mpsc::Sender<Inbound>,
    /// Messages sent by the client
    pub rx: mpsc::Receiver<Outbound>,
}

/// Create a connected binding/peer pair.
///
/// The binding starts ready; see [`ChannelBinding::with_ready`].
pub fn channel_binding(capacity: usize) -> (ChannelBinding, BindingPeer) {
    let (out_tx, out_rx) = mpsc::channel(capacity.max(1));
    let (in_tx, in_rx) = mpsc::channel(capacity.max(1));
    (
        ChannelBinding {
            tx: out_tx,
            rx: in_rx,
            ready: true,
        },
        BindingPeer {
            tx: in_tx,
            rx: out_rx,
        },
    )
}

impl ChannelBinding {
    /// Start not ready; the peer then has to send [`Inbound::BindingReady`].
    #[must_use]
    pub fn with_ready(mut self, ready: bool) -> Self {
        self.ready = ready;
        self
    }
}

impl Binding for ChannelBinding {
    fn is_ready(&self) -> bool {
        self.ready
    }

    async fn send(&mut self, message: Outbound) -> Result<()> {
        self.tx
            .send(message)
            .await
            .map_err(|_| Error::ConnectionAborted)
    }

    async fn recv(&mut self) -> Option<Inbound> {
        let inbound = self.rx.recv().await;
        match &inbound {
            Some(Inbound::BindingReady) => self.ready = true,
            Some(Inbound::BindingFailed(_)) => self.ready = false,
            _ => {}
        }
        inbound
    }
}

impl BindingPeer {
    /// Next message from the client, `None` once the client is gone
    pub async fn next(&mut self) -> Option<Outbound> {
        self.rx.recv().await
    }

    /// Deliver a message or binding event to the client
    pub async fn deliver(&self, inbound: Inbound) -> Result<()> {
        self.tx
            .send(inbound)
            .await
            .map_err(|_| Error::RuntimeShutdown)
    }
}
