//! # Subscription Lifecycle Handlers
//!
//! Free functions that move a [`ClientCore`] through its states. Every
//! handler has the same shape:
//!
//! ```text
//! fn handler(core: &mut ClientCore, ..., actions: &mut Vec<Action>)
//! ```
//!
//! ## State Transitions
//!
//! ```text
//!            initiate                 SubscribeResponse
//!   INIT ─────────────▶ SReq1/SReq2 ─────────────────▶ ALIVE ◀──────┐
//!    ▲                      │                          │  │         │ StatusReport(Success)
//!    │ retry timer          │ timeout / failure        │  │ liveness│
//!    │                      ▼                          │  ▼         │
//!  RETRY ◀──────── (terminated, retry enabled)          │ CONFM ─────┘
//!                                                      │
//!                                end_subscription      ▼
//!                                                    CANCL ──▶ ABORT
//! ```
//!
//! Termination without retry always passes through `abort_subscription`,
//! which fails every queued update with [`Error::ConnectionAborted`] and
//! forgets subscription-specific state.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::client::resubscribe::{ResubscribeParam, ResubscribePolicy};
use crate::client::state::{ClientCore, ClientState};
use crate::client::{update, Action, ClientEvent, Timer};
use crate::config::MAX_TIMEOUT_SEC;
use crate::error::{Error, ProtocolError, Result};
use crate::message::{
    Notification, Outbound, StatusCode, StatusReport, SubscribeRequest, SubscribeResponse,
    VersionedPath,
};
use crate::schema::TraitPath;

// ============================================================================
// INITIATION
// ============================================================================

/// Start subscribing as the initiator.
///
/// With a resubscribe policy installed the first attempt goes through the
/// retry timer, so a failing publisher is retried from the start.
pub fn initiate_subscription(core: &mut ClientCore, actions: &mut Vec<Action>) {
    if !prepare_initiate(core) {
        return;
    }
    core.is_initiator = true;
    start(core, actions);
}

/// Subscribe back to a publisher that already subscribed to us.
pub fn initiate_counter_subscription(
    core: &mut ClientCore,
    subscription_id: u64,
    liveness_timeout_sec: u32,
    actions: &mut Vec<Action>,
) {
    if !prepare_initiate(core) {
        return;
    }
    core.is_initiator = false;
    core.subscription_id = Some(subscription_id);
    core.liveness_timeout = Some(Duration::from_secs(u64::from(
        liveness_timeout_sec.min(MAX_TIMEOUT_SEC),
    )));
    start(core, actions);
}

fn prepare_initiate(core: &mut ClientCore) -> bool {
    match core.state {
        ClientState::Initialized => true,
        ClientState::Aborted => {
            core.move_to(ClientState::Initialized);
            true
        }
        state => {
            warn!(
                "Client[{}] [{:>5}] initiate ignored, subscription already active",
                core.id,
                state.as_str()
            );
            false
        }
    }
}

fn start(core: &mut ClientCore, actions: &mut Vec<Action>) {
    if core.is_retry_enabled() {
        set_retry_timer(core, None, actions);
    } else {
        initiate(core, actions);
    }
}

/// Send the subscribe request, or park until the binding is ready.
fn initiate(core: &mut ClientCore, actions: &mut Vec<Action>) {
    match core.state {
        ClientState::SubscribingRequest | ClientState::SubscribingCounter => return,
        ClientState::Initialized => {}
        _ => {
            let reason = core.incorrect_state();
            terminate(core, reason, None, actions);
            return;
        }
    }

    if !core.binding_ready {
        debug!(
            "Client[{}] [{:>5}] waiting for binding",
            core.id,
            core.state.as_str()
        );
        core.awaiting_binding = true;
        return;
    }
    core.awaiting_binding = false;

    let paths = core
        .catalog
        .iter()
        .map(|instance| VersionedPath {
            path: TraitPath::root(instance.handle),
            version: instance.sink.version(),
        })
        .collect();
    let request = SubscribeRequest {
        subscription_id: if core.is_initiator {
            None
        } else {
            core.subscription_id
        },
        timeout_min_sec: core.config.subscribe_timeout_min,
        timeout_max_sec: core.config.subscribe_timeout_max,
        paths,
    };

    send_request(core, Outbound::SubscribeRequest(request), actions);
    core.move_to(if core.is_initiator {
        ClientState::SubscribingRequest
    } else {
        ClientState::SubscribingCounter
    });

    if let Err(e) = refresh_timer(core, actions) {
        terminate(core, e, None, actions);
    }
}

/// The binding became usable.
pub fn binding_ready(core: &mut ClientCore, actions: &mut Vec<Action>) {
    core.binding_ready = true;
    if core.awaiting_binding {
        initiate(core, actions);
    }
}

/// The binding could not be prepared or went away.
pub fn binding_failed(core: &mut ClientCore, reason: Error, actions: &mut Vec<Action>) {
    core.binding_ready = false;
    let active = core.awaiting_binding
        || core.state.is_subscribing()
        || core.state.is_established()
        || core.state == ClientState::Canceling;
    core.awaiting_binding = false;
    if active {
        terminate(core, reason, None, actions);
    }
}

// ============================================================================
// TIMERS
// ============================================================================

/// Re-arm the subscription timer for the current state.
pub fn refresh_timer(core: &mut ClientCore, actions: &mut Vec<Action>) -> Result<()> {
    actions.push(Action::CancelTimer(Timer::Subscription));

    match core.state {
        ClientState::SubscribingRequest | ClientState::SubscribingCounter => {
            if let Some(after) = core.config.inactivity_timeout_during_subscribing {
                actions.push(Action::ArmTimer {
                    timer: Timer::Subscription,
                    after,
                });
            }
            Ok(())
        }
        ClientState::SubscriptionEstablishedIdle => {
            let Some(liveness) = core.liveness_timeout else {
                return Ok(());
            };
            let after = if core.is_initiator {
                let margin = core.config.liveness_margin();
                if margin >= liveness {
                    error!(
                        "Client[{}] [{:>5}] liveness period {} ms <= margin {} ms",
                        core.id,
                        core.state.as_str(),
                        liveness.as_millis(),
                        margin.as_millis()
                    );
                    return Err(Error::Timeout);
                }
                liveness - margin
            } else {
                liveness
            };
            actions.push(Action::ArmTimer {
                timer: Timer::Subscription,
                after,
            });
            Ok(())
        }
        ClientState::SubscriptionEstablishedConfirming | ClientState::Aborting => Ok(()),
        _ => Err(core.incorrect_state()),
    }
}

/// A timer fired.
pub fn on_timer(core: &mut ClientCore, timer: Timer, actions: &mut Vec<Action>) {
    match timer {
        Timer::Subscription => on_subscription_timer(core, actions),
        Timer::Exchange => on_send_error(core, Error::Timeout, actions),
        Timer::Update => update::on_update_timeout(core, actions),
    }
}

fn on_subscription_timer(core: &mut ClientCore, actions: &mut Vec<Action>) {
    match core.state {
        ClientState::SubscribingRequest | ClientState::SubscribingCounter => {
            warn!(
                "Client[{}] [{:>5}] inactivity timeout while subscribing",
                core.id,
                core.state.as_str()
            );
            terminate(core, Error::Timeout, None, actions);
        }
        ClientState::SubscriptionEstablishedIdle => {
            if !core.is_initiator {
                warn!(
                    "Client[{}] [{:>5}] liveness timeout",
                    core.id,
                    core.state.as_str()
                );
                terminate(core, Error::Timeout, None, actions);
                return;
            }
            match core.subscription_id {
                Some(subscription_id) => {
                    debug!(
                        "Client[{}] [{:>5}] confirming liveness",
                        core.id,
                        core.state.as_str()
                    );
                    send_request(core, Outbound::SubscribeConfirm { subscription_id }, actions);
                    core.move_to(ClientState::SubscriptionEstablishedConfirming);
                    actions.push(Action::CancelTimer(Timer::Subscription));
                }
                None => {
                    let reason = core.incorrect_state();
                    terminate(core, reason, None, actions);
                }
            }
        }
        ClientState::ResubscribeHoldoff => {
            core.retry_counter = core.retry_counter.saturating_add(1);
            core.move_to(ClientState::Initialized);
            initiate(core, actions);
        }
        state => {
            debug!(
                "Client[{}] [{:>5}] timer ignored",
                core.id,
                state.as_str()
            );
        }
    }
}

/// An outstanding subscribe, confirm or cancel request failed or timed out.
pub fn on_send_error(core: &mut ClientCore, reason: Error, actions: &mut Vec<Action>) {
    match core.state {
        ClientState::SubscribingRequest
        | ClientState::SubscribingCounter
        | ClientState::SubscriptionEstablishedConfirming
        | ClientState::Canceling => terminate(core, reason, None, actions),
        ClientState::ResubscribeHoldoff
        | ClientState::Free
        | ClientState::Aborting
        | ClientState::Aborted => {
            debug!(
                "Client[{}] [{:>5}] send error ignored: {}",
                core.id,
                core.state.as_str(),
                reason
            );
        }
        _ => {
            let reason = core.incorrect_state();
            terminate(core, reason, None, actions);
        }
    }
}

// ============================================================================
// INBOUND MESSAGES
// ============================================================================

/// The publisher answered the subscribe request.
pub fn on_subscribe_response(
    core: &mut ClientCore,
    response: SubscribeResponse,
    actions: &mut Vec<Action>,
) {
    actions.push(Action::CancelTimer(Timer::Exchange));

    match core.state {
        ClientState::SubscribingRequest => {
            let liveness = match response.timeout_sec {
                Some(sec) if sec > MAX_TIMEOUT_SEC => {
                    let reason = ProtocolError::new(format!(
                        "liveness timeout {sec} s exceeds {MAX_TIMEOUT_SEC} s"
                    ));
                    terminate(core, reason.into(), None, actions);
                    return;
                }
                Some(sec) => Some(Duration::from_secs(u64::from(sec))),
                None => None,
            };
            core.subscription_id = Some(response.subscription_id);
            core.liveness_timeout = liveness;
        }
        ClientState::SubscribingCounter => {
            if core.subscription_id != Some(response.subscription_id) {
                let reason = ProtocolError::new(format!(
                    "subscription id 0x{:X} does not match counter-subscription",
                    response.subscription_id
                ));
                terminate(core, reason.into(), None, actions);
                return;
            }
        }
        state => {
            debug!(
                "Client[{}] [{:>5}] subscribe response ignored",
                core.id,
                state.as_str()
            );
            return;
        }
    }

    core.move_to(ClientState::SubscriptionEstablishedIdle);
    if let Err(e) = refresh_timer(core, actions) {
        terminate(core, e, None, actions);
        return;
    }
    core.retry_counter = 0;

    info!(
        "Client[{}] [{:>5}] subscription established, id 0x{:X}",
        core.id,
        core.state.as_str(),
        response.subscription_id
    );
    actions.push(Action::Emit(ClientEvent::SubscriptionActivity));
    actions.push(Action::Emit(ClientEvent::SubscriptionEstablished {
        subscription_id: response.subscription_id,
    }));

    if core.flush_in_progress {
        if core.pending.is_empty() {
            core.flush_in_progress = false;
        } else if let Err(e) = update::form_and_send_update(core, true, actions) {
            debug!("Client[{}] deferred flush failed: {}", core.id, e);
        }
    }
}

/// The publisher answered a subscribe, confirm or cancel request with a
/// status report.
pub fn on_status_report(core: &mut ClientCore, report: StatusReport, actions: &mut Vec<Action>) {
    actions.push(Action::CancelTimer(Timer::Exchange));

    match core.state {
        ClientState::SubscribingRequest | ClientState::SubscribingCounter => {
            warn!(
                "Client[{}] [{:>5}] subscribe rejected: {}",
                core.id,
                core.state.as_str(),
                report
            );
            terminate(
                core,
                Error::StatusReport(report.clone()),
                Some(report),
                actions,
            );
        }
        ClientState::SubscriptionEstablishedConfirming => {
            if !report.is_success() {
                terminate(
                    core,
                    Error::StatusReport(report.clone()),
                    Some(report),
                    actions,
                );
                return;
            }
            core.move_to(ClientState::SubscriptionEstablishedIdle);
            debug!(
                "Client[{}] [{:>5}] liveness confirmed",
                core.id,
                core.state.as_str()
            );
            actions.push(Action::Emit(ClientEvent::SubscriptionActivity));
            if let Err(e) = refresh_timer(core, actions) {
                terminate(core, e, None, actions);
            }
        }
        // heading out anyway; the application asked for the cancel
        ClientState::Canceling => abort_subscription(core, actions),
        state => {
            debug!(
                "Client[{}] [{:>5}] status report ignored",
                core.id,
                state.as_str()
            );
        }
    }
}

/// Apply a notification and acknowledge it.
pub fn on_notification(
    core: &mut ClientCore,
    notification: Notification,
    actions: &mut Vec<Action>,
) {
    match core.state {
        ClientState::SubscribingRequest
        | ClientState::SubscribingCounter
        | ClientState::SubscriptionEstablishedIdle
        | ClientState::SubscriptionEstablishedConfirming => {}
        state => {
            debug!(
                "Client[{}] [{:>5}] notification ignored",
                core.id,
                state.as_str()
            );
            return;
        }
    }

    if let Err(e) = refresh_timer(core, actions) {
        terminate(core, e, None, actions);
        return;
    }
    actions.push(Action::Emit(ClientEvent::SubscriptionActivity));

    let elements = notification.data.len();
    update::process_data_list(core, &notification.data, actions);

    actions.push(Action::Emit(ClientEvent::NotificationProcessed { elements }));
    actions.push(Action::Send(Outbound::StatusReport(StatusReport::success())));
}

/// The publisher cancels the subscription.
pub fn on_cancel_request(
    core: &mut ClientCore,
    subscription_id: u64,
    authentic: bool,
    actions: &mut Vec<Action>,
) {
    let canceled = authentic && core.subscription_id == Some(subscription_id);
    if !canceled {
        warn!(
            "Client[{}] [{:>5}] rejecting cancel for subscription 0x{:X}",
            core.id,
            core.state.as_str(),
            subscription_id
        );
        actions.push(Action::Send(Outbound::StatusReport(StatusReport::new(
            StatusCode::INVALID_SUBSCRIPTION_ID,
        ))));
        return;
    }

    info!(
        "Client[{}] [{:>5}] canceled by publisher",
        core.id,
        core.state.as_str()
    );
    actions.push(Action::Send(Outbound::StatusReport(StatusReport::success())));
    handle_terminated(core, false, None, None, actions);
}

// ============================================================================
// TEARDOWN
// ============================================================================

/// Cancel the subscription gracefully.
///
/// Before the subscription is established there is nothing to cancel and
/// the client aborts right away.
pub fn end_subscription(core: &mut ClientCore, actions: &mut Vec<Action>) -> Result<()> {
    match core.state {
        ClientState::SubscribingRequest | ClientState::SubscribingCounter => {
            debug!(
                "Client[{}] [{:>5}] subscription not established yet, abort",
                core.id,
                core.state.as_str()
            );
            abort_subscription(core, actions);
            Ok(())
        }
        ClientState::SubscriptionEstablishedIdle
        | ClientState::SubscriptionEstablishedConfirming => {
            // the outcome of a pending confirm no longer matters
            actions.push(Action::CancelTimer(Timer::Exchange));
            let subscription_id = core.subscription_id()?;
            send_request(core, Outbound::SubscribeCancel { subscription_id }, actions);
            core.move_to(ClientState::Canceling);
            Ok(())
        }
        _ => Err(core.incorrect_state()),
    }
}

/// Tear everything down without telling the publisher.
///
/// The resubscribe policy survives; the client may be initiated again.
pub fn abort_subscription(core: &mut ClientCore, actions: &mut Vec<Action>) {
    match core.state {
        ClientState::Free => {
            error!("Client[{}] [ FREE] abort on a freed client", core.id);
        }
        ClientState::Aborting | ClientState::Aborted => {}
        _ => {
            core.move_to(ClientState::Aborting);

            update::clear_pending_store(core, Error::ConnectionAborted, actions);
            update::clear_dispatched_store(core, Error::ConnectionAborted, actions);
            update::shutdown_update_client(core, actions);

            actions.push(Action::CancelTimer(Timer::Exchange));
            actions.push(Action::CancelTimer(Timer::Subscription));

            core.reset();
            core.move_to(ClientState::Aborted);
        }
    }
}

/// Common exit path of every failure.
pub fn handle_terminated(
    core: &mut ClientCore,
    will_retry: bool,
    reason: Option<Error>,
    status: Option<StatusReport>,
    actions: &mut Vec<Action>,
) {
    debug!(
        "Client[{}] [{:>5}] terminated, retry {}",
        core.id,
        core.state.as_str(),
        will_retry
    );

    if will_retry {
        // anything on the current exchange is an error from here on
        actions.push(Action::CancelTimer(Timer::Exchange));
        update::cancel_update_client(core, actions);
    } else {
        abort_subscription(core, actions);
    }

    actions.push(Action::Emit(ClientEvent::SubscriptionTerminated {
        will_retry,
        reason: reason.clone(),
        status,
    }));

    if will_retry && core.state != ClientState::Aborted {
        set_retry_timer(core, reason, actions);
    }
}

fn terminate(
    core: &mut ClientCore,
    reason: Error,
    status: Option<StatusReport>,
    actions: &mut Vec<Action>,
) {
    let will_retry = core.is_retry_enabled();
    handle_terminated(core, will_retry, Some(reason), status, actions);
}

// ============================================================================
// RESUBSCRIBE
// ============================================================================

fn set_retry_timer(core: &mut ClientCore, reason: Option<Error>, actions: &mut Vec<Action>) {
    if core.state >= ClientState::ResubscribeHoldoff {
        return;
    }
    let param = ResubscribeParam {
        retries: core.retry_counter,
        reason,
    };
    let Some(policy) = core.resubscribe.as_mut() else {
        return;
    };
    let after = policy.interval(&param);

    core.move_to(ClientState::ResubscribeHoldoff);
    info!(
        "Client[{}] [{:>5}] resubscribe in {} ms",
        core.id,
        core.state.as_str(),
        after.as_millis()
    );
    actions.push(Action::ArmTimer {
        timer: Timer::Subscription,
        after,
    });
}

pub fn enable_resubscribe(core: &mut ClientCore, policy: Box<dyn ResubscribePolicy>) {
    core.resubscribe = Some(policy);
}

/// Stop retrying. A client waiting to retry is aborted.
pub fn disable_resubscribe(core: &mut ClientCore, actions: &mut Vec<Action>) {
    core.resubscribe = None;
    if core.state == ClientState::ResubscribeHoldoff {
        actions.push(Action::CancelTimer(Timer::Subscription));
        abort_subscription(core, actions);
    }
}

/// Restart the backoff sequence and retry immediately.
pub fn reset_resubscribe(core: &mut ClientCore, actions: &mut Vec<Action>) {
    if core.state == ClientState::ResubscribeHoldoff {
        actions.push(Action::CancelTimer(Timer::Subscription));
        core.move_to(ClientState::Initialized);
    }
    core.retry_counter = 0;
    if core.state == ClientState::Initialized {
        set_retry_timer(core, None, actions);
    }
}

/// Release the client for good.
pub fn free(core: &mut ClientCore, actions: &mut Vec<Action>) {
    if core.state == ClientState::Free {
        return;
    }
    core.resubscribe = None;
    abort_subscription(core, actions);
    actions.push(Action::CancelTimer(Timer::Update));
    core.move_to(ClientState::Free);
}

/// Open an exchange: emit the start event, send and wait for a response.
pub(crate) fn send_request(core: &ClientCore, message: Outbound, actions: &mut Vec<Action>) {
    actions.push(Action::Emit(ClientEvent::ExchangeStart));
    actions.push(Action::Send(message));
    actions.push(Action::ArmTimer {
        timer: Timer::Exchange,
        after: core.config.response_timeout,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sink::{SinkCatalog, UpdatableSink};
    use crate::config::ClientConfig;
    use crate::schema::logging_settings::SCHEMA;
    use crate::schema::TraitDataHandle;

    fn core_with(config: ClientConfig, policy: Option<Box<dyn ResubscribePolicy>>) -> ClientCore {
        let mut catalog = SinkCatalog::default();
        catalog
            .add(
                TraitDataHandle::new(1),
                UpdatableSink::new(&SCHEMA).with_version(7),
            )
            .unwrap();
        let mut core = ClientCore::new(config, catalog, policy);
        core.set_binding_ready(true);
        core
    }

    fn sent(actions: &[Action]) -> Vec<&Outbound> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn terminated(actions: &[Action]) -> Option<(bool, Option<Error>)> {
        actions.iter().find_map(|a| match a {
            Action::Emit(ClientEvent::SubscriptionTerminated {
                will_retry, reason, ..
            }) => Some((*will_retry, reason.clone())),
            _ => None,
        })
    }

    fn establish(core: &mut ClientCore, timeout_sec: Option<u32>) -> Vec<Action> {
        let mut actions = Vec::new();
        initiate_subscription(core, &mut actions);
        on_subscribe_response(
            core,
            SubscribeResponse {
                subscription_id: 0xABCD,
                timeout_sec,
            },
            &mut actions,
        );
        actions
    }

    #[test_log::test]
    fn initiate_sends_versions_of_every_sink() {
        let mut core = core_with(ClientConfig::default(), None);
        let mut actions = Vec::new();
        initiate_subscription(&mut core, &mut actions);

        assert_eq!(core.state(), ClientState::SubscribingRequest);
        match sent(&actions).as_slice() {
            [Outbound::SubscribeRequest(request)] => {
                assert_eq!(request.subscription_id, None);
                assert_eq!(request.paths.len(), 1);
                assert_eq!(request.paths[0].version, Some(7));
            }
            other => panic!("unexpected sends {other:?}"),
        }
    }

    #[test_log::test]
    fn initiate_waits_for_binding() {
        let mut core = core_with(ClientConfig::default(), None);
        core.set_binding_ready(false);
        let mut actions = Vec::new();
        initiate_subscription(&mut core, &mut actions);
        assert!(sent(&actions).is_empty());
        assert_eq!(core.state(), ClientState::Initialized);

        binding_ready(&mut core, &mut actions);
        assert_eq!(core.state(), ClientState::SubscribingRequest);
        assert_eq!(sent(&actions).len(), 1);
    }

    #[test_log::test]
    fn response_establishes_and_arms_liveness_minus_margin() {
        let mut core = core_with(ClientConfig::default(), None);
        let actions = establish(&mut core, Some(30));

        assert_eq!(core.state(), ClientState::SubscriptionEstablishedIdle);
        assert_eq!(core.subscription_id(), Ok(0xABCD));
        assert!(actions.contains(&Action::ArmTimer {
            timer: Timer::Subscription,
            after: Duration::from_secs(22),
        }));
        assert!(actions.contains(&Action::Emit(ClientEvent::SubscriptionEstablished {
            subscription_id: 0xABCD
        })));
    }

    #[test_log::test]
    fn liveness_shorter_than_margin_terminates() {
        let mut core = core_with(ClientConfig::default(), None);
        let actions = establish(&mut core, Some(8));
        assert_eq!(terminated(&actions), Some((false, Some(Error::Timeout))));
        assert_eq!(core.state(), ClientState::Aborted);
    }

    #[test_log::test]
    fn liveness_timer_confirms_then_status_report_returns_to_alive() {
        let mut core = core_with(ClientConfig::default(), None);
        establish(&mut core, Some(30));

        let mut actions = Vec::new();
        on_timer(&mut core, Timer::Subscription, &mut actions);
        assert_eq!(core.state(), ClientState::SubscriptionEstablishedConfirming);
        assert_eq!(
            sent(&actions),
            vec![&Outbound::SubscribeConfirm {
                subscription_id: 0xABCD
            }]
        );

        let mut actions = Vec::new();
        on_status_report(&mut core, StatusReport::success(), &mut actions);
        assert_eq!(core.state(), ClientState::SubscriptionEstablishedIdle);
        assert!(actions.contains(&Action::Emit(ClientEvent::SubscriptionActivity)));
    }

    #[test_log::test]
    fn inactivity_timeout_retries_with_policy() {
        let config = ClientConfig::builder()
            .inactivity_timeout_during_subscribing(Duration::from_secs(5))
            .build();
        let policy: Box<dyn ResubscribePolicy> =
            Box::new(|_: &ResubscribeParam| Duration::from_secs(1));
        let mut core = core_with(config, Some(policy));

        let mut actions = Vec::new();
        initiate_subscription(&mut core, &mut actions);
        assert_eq!(core.state(), ClientState::ResubscribeHoldoff);

        on_timer(&mut core, Timer::Subscription, &mut actions);
        assert_eq!(core.state(), ClientState::SubscribingRequest);
        assert_eq!(core.retry_counter(), 1);

        let mut actions = Vec::new();
        on_timer(&mut core, Timer::Subscription, &mut actions);
        assert_eq!(terminated(&actions), Some((true, Some(Error::Timeout))));
        assert_eq!(core.state(), ClientState::ResubscribeHoldoff);
    }

    #[test_log::test]
    fn rejected_subscribe_reports_status() {
        let mut core = core_with(ClientConfig::default(), None);
        let mut actions = Vec::new();
        initiate_subscription(&mut core, &mut actions);

        let report = StatusReport::new(StatusCode::INTERNAL_ERROR);
        let mut actions = Vec::new();
        on_status_report(&mut core, report.clone(), &mut actions);
        assert_eq!(
            terminated(&actions),
            Some((false, Some(Error::StatusReport(report))))
        );
    }

    #[test_log::test]
    fn end_subscription_cancels_then_aborts_on_reply() {
        let mut core = core_with(ClientConfig::default(), None);
        establish(&mut core, Some(30));

        let mut actions = Vec::new();
        end_subscription(&mut core, &mut actions).unwrap();
        assert_eq!(core.state(), ClientState::Canceling);
        assert_eq!(
            sent(&actions),
            vec![&Outbound::SubscribeCancel {
                subscription_id: 0xABCD
            }]
        );

        let mut actions = Vec::new();
        on_status_report(&mut core, StatusReport::success(), &mut actions);
        assert_eq!(core.state(), ClientState::Aborted);
        assert_eq!(terminated(&actions), None);

        assert_eq!(
            end_subscription(&mut core, &mut actions),
            Err(Error::IncorrectState("ABORT"))
        );
    }

    #[test_log::test]
    fn cancel_request_checks_id_and_authenticity() {
        let mut core = core_with(ClientConfig::default(), None);
        establish(&mut core, Some(30));

        let mut actions = Vec::new();
        on_cancel_request(&mut core, 0xABCD, false, &mut actions);
        assert_eq!(
            sent(&actions),
            vec![&Outbound::StatusReport(StatusReport::new(
                StatusCode::INVALID_SUBSCRIPTION_ID
            ))]
        );
        assert_eq!(core.state(), ClientState::SubscriptionEstablishedIdle);

        let mut actions = Vec::new();
        on_cancel_request(&mut core, 0xABCD, true, &mut actions);
        assert_eq!(
            sent(&actions),
            vec![&Outbound::StatusReport(StatusReport::success())]
        );
        assert_eq!(terminated(&actions), Some((false, None)));
        assert_eq!(core.state(), ClientState::Aborted);
    }

    #[test_log::test]
    fn counter_subscription_checks_id() {
        let mut core = core_with(ClientConfig::default(), None);
        let mut actions = Vec::new();
        initiate_counter_subscription(&mut core, 0x77, 60, &mut actions);
        assert_eq!(core.state(), ClientState::SubscribingCounter);

        let mut actions = Vec::new();
        on_subscribe_response(
            &mut core,
            SubscribeResponse {
                subscription_id: 0x78,
                timeout_sec: None,
            },
            &mut actions,
        );
        assert!(matches!(
            terminated(&actions),
            Some((false, Some(Error::Protocol(_))))
        ));
    }

    #[test_log::test]
    fn disable_resubscribe_aborts_waiting_client() {
        let policy: Box<dyn ResubscribePolicy> =
            Box::new(|_: &ResubscribeParam| Duration::from_secs(60));
        let mut core = core_with(ClientConfig::default(), Some(policy));
        let mut actions = Vec::new();
        initiate_subscription(&mut core, &mut actions);
        assert_eq!(core.state(), ClientState::ResubscribeHoldoff);

        disable_resubscribe(&mut core, &mut actions);
        assert_eq!(core.state(), ClientState::Aborted);
        assert!(!core.is_retry_enabled());

        // aborted clients can start over
        initiate_subscription(&mut core, &mut actions);
        assert_eq!(core.state(), ClientState::SubscribingRequest);
    }
}
