//! Shared fixtures for the integration tests.
//!
//! The publisher side is played by the test itself through a
//! [`BindingPeer`]: it reads what the client sends and delivers canned
//! responses.

#![allow(dead_code)]

use std::io;
use std::sync::{Arc, Mutex};

use wdm_next::message::{Inbound, Outbound, SubscribeResponse};
use wdm_next::net::{channel_binding, BindingPeer, ChannelBinding};
use wdm_next::prelude::*;
use wdm_next::schema::logging_settings;

pub const TRAIT: TraitDataHandle = TraitDataHandle::new(1);
pub const SUBSCRIPTION_ID: u64 = 0x5EED;

pub fn configure_tracing() {
    use std::sync::OnceLock;
    static TRACING_INIT: OnceLock<()> = OnceLock::new();
    TRACING_INIT.get_or_init(|| {
        let _ = tracing::subscriber::set_global_default(
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::builder()
                        .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                        .from_env_lossy(),
                )
                .with_test_writer()
                .finish(),
        );
    });
}

pub fn min_log_time() -> TraitPath {
    TraitPath::new(TRAIT, logging_settings::MIN_LOG_TIME)
}

pub fn max_log_time() -> TraitPath {
    TraitPath::new(TRAIT, logging_settings::MAX_LOG_TIME)
}

/// Builder with one logging-settings sink at `version`
pub fn logging_client(version: Option<u64>) -> wdm_next::ClientBuilder {
    let sink = UpdatableSink::new(&logging_settings::SCHEMA);
    let sink = match version {
        Some(v) => sink.with_version(v),
        None => sink,
    };
    wdm_next::configure().sink(TRAIT, sink)
}

pub fn start(
    builder: wdm_next::ClientBuilder,
) -> (SubscriptionHandle, ClientEvents, BindingPeer) {
    let (binding, peer): (ChannelBinding, BindingPeer) = channel_binding(16);
    let (client, events) = builder.start(binding).unwrap();
    (client, events, peer)
}

/// Next message from the client, failing the test if it is gone
pub async fn expect_sent(peer: &mut BindingPeer) -> Outbound {
    peer.next().await.expect("client closed the binding")
}

/// Skip events until one matches
pub async fn wait_for(
    events: &mut ClientEvents,
    mut matches: impl FnMut(&ClientEvent) -> bool,
) -> ClientEvent {
    loop {
        let event = events.next().await.expect("event stream ended");
        if matches(&event) {
            return event;
        }
    }
}

/// Answer the subscribe request and wait until the client is established
pub async fn establish(
    client: &SubscriptionHandle,
    events: &mut ClientEvents,
    peer: &mut BindingPeer,
    timeout_sec: Option<u32>,
) {
    client.initiate_subscription().await.unwrap();
    let request = expect_sent(peer).await;
    assert!(matches!(request, Outbound::SubscribeRequest(_)), "got {request:?}");
    peer.deliver(Inbound::SubscribeResponse(SubscribeResponse {
        subscription_id: SUBSCRIPTION_ID,
        timeout_sec,
    }))
    .await
    .unwrap();
    wait_for(events, |e| {
        matches!(e, ClientEvent::SubscriptionEstablished { .. })
    })
    .await;
}

/// In-memory sink for formatted log output
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn count(&self, pattern: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).matches(pattern).count()
    }

    /// Subscriber writing INFO and above into this capture
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync {
        let capture = self.clone();
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || capture.clone())
            .finish()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
