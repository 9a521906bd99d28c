//! # Client Event Loop
//!
//! `client_task` owns the [`ClientCore`], the [`Binding`] and the three
//! client timers. Each iteration waits for exactly one of:
//!
//! - a [`Command`] from a handle
//! - an inbound message or binding event
//! - the earliest armed timer (one per iteration, even when several are due)
//!
//! feeds it to the matching handler and then carries out the resulting
//! [`Action`]s in order. Sending can fail; the failure is fed back into the
//! core and any follow-up actions join the same queue.

use std::collections::VecDeque;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::client::state::{ClientCore, ClientState};
use crate::client::{subscription, update, Action, ClientEvent, Timer};
use crate::error::Error;
use crate::message::{Inbound, Outbound};
use crate::net::Binding;
use crate::runtime::Command;

// ============================================================================
// TIMERS
// ============================================================================

#[derive(Debug, Default)]
struct Timers {
    subscription: Option<Instant>,
    exchange: Option<Instant>,
    update: Option<Instant>,
}

impl Timers {
    fn slot(&mut self, timer: Timer) -> &mut Option<Instant> {
        match timer {
            Timer::Subscription => &mut self.subscription,
            Timer::Exchange => &mut self.exchange,
            Timer::Update => &mut self.update,
        }
    }

    fn arm(&mut self, timer: Timer, deadline: Instant) {
        *self.slot(timer) = Some(deadline);
    }

    fn cancel(&mut self, timer: Timer) {
        *self.slot(timer) = None;
    }

    fn next_deadline(&self) -> Option<Instant> {
        [self.subscription, self.exchange, self.update]
            .into_iter()
            .flatten()
            .min()
    }

    /// Disarm and return the earliest timer due at `now`.
    ///
    /// Ties go to the exchange timer, then update, then subscription. Only
    /// one timer is taken so that the actions of its handler re-arm or
    /// cancel the others before they are looked at again.
    fn take_expired(&mut self, now: Instant) -> Option<Timer> {
        let timer = [Timer::Exchange, Timer::Update, Timer::Subscription]
            .into_iter()
            .filter_map(|timer| {
                let deadline = (*self.slot(timer))?;
                (deadline <= now).then_some((timer, deadline))
            })
            .min_by_key(|&(_, deadline)| deadline)
            .map(|(timer, _)| timer)?;
        self.cancel(timer);
        Some(timer)
    }
}

// ============================================================================
// CLIENT TASK
// ============================================================================

/// The client task
pub(crate) async fn client_task<B: Binding>(
    mut binding: B,
    mut core: ClientCore,
    mut cmd_rx: mpsc::Receiver<Command>,
    events: mpsc::Sender<ClientEvent>,
) {
    let mut timers = Timers::default();
    let mut binding_open = true;
    core.set_binding_ready(binding.is_ready());

    loop {
        let mut actions = Vec::new();
        let deadline = timers.next_deadline();

        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(Command::Shutdown { response }) => {
                        shutdown(&mut core, &mut binding, &mut timers, &events).await;
                        let _ = response.send(());
                        break;
                    }
                    None => {
                        shutdown(&mut core, &mut binding, &mut timers, &events).await;
                        break;
                    }
                    Some(cmd) => {
                        trace!("Client[{}] command {:?}", core.id, cmd);
                        handle_command(&mut core, cmd, &mut actions);
                    }
                }
            }

            inbound = binding.recv(), if binding_open => {
                match inbound {
                    Some(inbound) => handle_inbound(&mut core, inbound, &mut actions),
                    None => {
                        warn!("Client[{}] binding closed", core.id);
                        binding_open = false;
                        core.set_binding_ready(false);
                        if !matches!(core.state(), ClientState::Free | ClientState::Aborted) {
                            subscription::handle_terminated(
                                &mut core,
                                false,
                                Some(Error::ConnectionAborted),
                                None,
                                &mut actions,
                            );
                        }
                    }
                }
            }

            () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(timer) = timers.take_expired(Instant::now()) {
                    trace!("Client[{}] timer {:?} fired", core.id, timer);
                    subscription::on_timer(&mut core, timer, &mut actions);
                }
            }
        }

        execute_actions(&mut core, &mut binding, &mut timers, &events, actions).await;
    }

    info!("Client[{}] task stopped", core.id);
}

async fn shutdown<B: Binding>(
    core: &mut ClientCore,
    binding: &mut B,
    timers: &mut Timers,
    events: &mpsc::Sender<ClientEvent>,
) {
    info!("Client[{}] shutting down", core.id);
    let mut actions = Vec::new();
    subscription::free(core, &mut actions);
    execute_actions(core, binding, timers, events, actions).await;
}

fn handle_command(core: &mut ClientCore, cmd: Command, actions: &mut Vec<Action>) {
    match cmd {
        Command::InitiateSubscription => subscription::initiate_subscription(core, actions),
        Command::InitiateCounterSubscription {
            subscription_id,
            liveness_timeout_sec,
        } => subscription::initiate_counter_subscription(
            core,
            subscription_id,
            liveness_timeout_sec,
            actions,
        ),
        Command::SetUpdated {
            path,
            payload,
            conditional,
            response,
        } => {
            let _ = response.send(update::set_updated(core, path, payload, conditional));
        }
        Command::FlushUpdate { response } => {
            let _ = response.send(update::flush_update(core, actions));
        }
        Command::EndSubscription { response } => {
            let _ = response.send(subscription::end_subscription(core, actions));
        }
        Command::Abort => subscription::abort_subscription(core, actions),
        Command::EnableResubscribe(policy) => subscription::enable_resubscribe(core, policy),
        Command::DisableResubscribe => subscription::disable_resubscribe(core, actions),
        Command::ResetResubscribe => subscription::reset_resubscribe(core, actions),
        Command::Status { response } => {
            let _ = response.send(core.status());
        }
        Command::SinkVersion { handle, response } => {
            let version = core.catalog().locate(handle).map(|i| i.sink.version());
            let _ = response.send(version);
        }
        Command::Read { path, response } => {
            let value = core.catalog().locate(path.trait_handle).and_then(|i| {
                if i.sink.schema().is_valid(path.property) {
                    Ok(i.sink.read(path.property))
                } else {
                    Err(Error::SchemaMismatch)
                }
            });
            let _ = response.send(value);
        }
        // handled by the loop
        Command::Shutdown { .. } => {}
    }
}

fn handle_inbound(core: &mut ClientCore, inbound: Inbound, actions: &mut Vec<Action>) {
    match inbound {
        Inbound::SubscribeResponse(response) => {
            subscription::on_subscribe_response(core, response, actions);
        }
        Inbound::Notification(notification) => {
            subscription::on_notification(core, notification, actions);
        }
        Inbound::StatusReport(report) => subscription::on_status_report(core, report, actions),
        Inbound::CancelRequest {
            subscription_id,
            authentic,
        } => subscription::on_cancel_request(core, subscription_id, authentic, actions),
        Inbound::UpdateResponse(report) => update::on_update_response(core, report, actions),
        Inbound::BindingReady => subscription::binding_ready(core, actions),
        Inbound::BindingFailed(reason) => subscription::binding_failed(core, reason, actions),
    }
}

// ============================================================================
// ACTIONS
// ============================================================================

async fn execute_actions<B: Binding>(
    core: &mut ClientCore,
    binding: &mut B,
    timers: &mut Timers,
    events: &mpsc::Sender<ClientEvent>,
    actions: Vec<Action>,
) {
    let mut queue = VecDeque::from(actions);

    while let Some(action) = queue.pop_front() {
        match action {
            Action::Send(message) => {
                let kind = message.kind();
                let is_update = matches!(message, Outbound::UpdateRequest(_));
                let is_reply = matches!(message, Outbound::StatusReport(_));
                trace!("Client[{}] sending {}", core.id, kind);

                if let Err(e) = binding.send(message).await {
                    warn!("Client[{}] failed to send {}: {}", core.id, kind, e);
                    let mut follow_up = Vec::new();
                    if is_update {
                        update::on_update_timeout(core, &mut follow_up);
                    } else if is_reply {
                        if !matches!(core.state(), ClientState::Free | ClientState::Aborted) {
                            let will_retry = core.is_retry_enabled();
                            subscription::handle_terminated(
                                core,
                                will_retry,
                                Some(e),
                                None,
                                &mut follow_up,
                            );
                        }
                    } else {
                        subscription::on_send_error(core, e, &mut follow_up);
                    }
                    queue.extend(follow_up);
                }
            }
            Action::ArmTimer { timer, after } => timers.arm(timer, Instant::now() + after),
            Action::CancelTimer(timer) => timers.cancel(timer),
            Action::Emit(event) => match events.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => {
                    warn!("Client[{}] event channel full, dropping {:?}", core.id, event);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Client[{}] no event listener", core.id);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test_log::test(tokio::test(start_paused = true))]
    async fn timers_expire_in_deadline_order() {
        let mut timers = Timers::default();
        let now = Instant::now();
        timers.arm(Timer::Subscription, now + Duration::from_secs(5));
        timers.arm(Timer::Exchange, now + Duration::from_secs(2));
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(2)));

        assert_eq!(timers.take_expired(now + Duration::from_secs(1)), None);
        assert_eq!(
            timers.take_expired(now + Duration::from_secs(2)),
            Some(Timer::Exchange)
        );
        timers.cancel(Timer::Subscription);
        assert_eq!(timers.next_deadline(), None);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn coincident_timers_expire_one_at_a_time() {
        let mut timers = Timers::default();
        let now = Instant::now();
        let due = now + Duration::from_secs(10);
        timers.arm(Timer::Subscription, due);
        timers.arm(Timer::Update, due);
        timers.arm(Timer::Exchange, due);

        assert_eq!(timers.take_expired(due), Some(Timer::Exchange));
        // the exchange handler re-armed the subscription timer
        timers.arm(Timer::Subscription, due + Duration::from_secs(60));
        assert_eq!(timers.take_expired(due), Some(Timer::Update));
        assert_eq!(timers.take_expired(due), None);
        assert_eq!(
            timers.next_deadline(),
            Some(due + Duration::from_secs(60))
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn earlier_deadline_wins_over_priority() {
        let mut timers = Timers::default();
        let now = Instant::now();
        timers.arm(Timer::Exchange, now + Duration::from_secs(3));
        timers.arm(Timer::Subscription, now + Duration::from_secs(1));

        let late = now + Duration::from_secs(5);
        assert_eq!(timers.take_expired(late), Some(Timer::Subscription));
        assert_eq!(timers.take_expired(late), Some(Timer::Exchange));
    }
}
