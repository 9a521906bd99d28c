//! # Update Engine
//!
//! Local mutations flow from the application to the publisher through two
//! path stores:
//!
//! ```text
//!  set_updated ──▶ pending ──(form_and_send_update)──▶ dispatched ──▶ UpdateRequest
//!                    ▲                                      │
//!                    └──────── timeout / cancel ────────────┘
//!                                                           │ UpdateResponse
//!                                                           ▼
//!                                              UpdateComplete per path
//! ```
//!
//! Only one update request is in flight at a time, and a request carries
//! paths of a single trait instance. Traits take turns in round-robin order.
//!
//! ## Conditional Updates
//!
//! A conditional update is based on the data version the client held when
//! the first path of the trait was marked. The publisher rejects it if its
//! version moved on. Locally, pending conditional paths are purged with
//! [`Error::MismatchUpdateRequiredVersion`] whenever the sink's version
//! becomes invalid or falls behind the required version.
//!
//! ## Merging
//!
//! | Pending | Marked | Result |
//! |---------|--------|--------|
//! | `a` | `a` | `a` |
//! | `a` | `a.b` | `a` |
//! | `a.b` | `a` | `a` |
//! | anything | root | root |

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::client::path_store::{PathItem, PathStore};
use crate::client::sink::UpdatableSink;
use crate::client::state::{ClientCore, ClientState};
use crate::client::{subscription, Action, ClientEvent, Timer};
use crate::error::{Error, Result};
use crate::message::{DataElement, Outbound, StatusCode, StatusReport, UpdateElement, UpdateRequest};
use crate::schema::{TraitPath, TraitSchema};

/// True if `version` precedes `reference`, allowing for wrap-around.
pub fn is_version_older(version: u64, reference: u64) -> bool {
    version != reference && reference.wrapping_sub(version) < u64::MAX / 2
}

// ============================================================================
// MARKING
// ============================================================================

/// Mark `path` as locally modified.
///
/// `payload`, if given, becomes the new local value of the property. When
/// the pending store is full the path is dropped with a log line and no
/// error, matching the fire-and-forget nature of marking.
pub fn set_updated(
    core: &mut ClientCore,
    path: TraitPath,
    payload: Option<Bytes>,
    conditional: bool,
) -> Result<()> {
    let state = core.state.as_str();
    let instance = core.catalog.locate_mut(path.trait_handle)?;

    if !instance.sink.schema().is_valid(path.property) {
        return Err(Error::SchemaMismatch);
    }
    if conditional && instance.sink.version().is_none() {
        debug!("Rejected mutation of {}: no valid version", path);
        return Err(Error::IncorrectState(state));
    }
    if let Some(payload) = payload {
        instance.sink.store(path.property, payload);
    }

    if core.pending.is_full() {
        debug!("No more space in pending store, skip {}", path);
        return Ok(());
    }

    if conditional
        && !core.pending.is_trait_present(path.trait_handle)
        && !core.dispatched.is_trait_present(path.trait_handle)
    {
        let required = instance.sink.version();
        instance.sink.set_update_required_version(required);
        debug!("Set update required version to {:?}", required);
    }
    instance.sink.set_conditional(conditional);

    add_item_pending(core, path, false);
    Ok(())
}

fn add_item_pending(core: &mut ClientCore, path: TraitPath, force_merge: bool) {
    let Ok(instance) = core.catalog.locate_mut(path.trait_handle) else {
        return;
    };
    let schema = instance.sink.schema();

    if !core.pending.add(path, force_merge, false) {
        debug!("Pending store is full, skip {}", path);
        return;
    }

    for index in core.pending.indices_for_trait(path.trait_handle) {
        let Some(item) = core.pending.get(index) else {
            continue;
        };
        if item.path.property.is_root() {
            debug!("Root of t{} updated, merge all to root", path.trait_handle.value());
            core.pending.remove_trait(path.trait_handle);
            core.pending.add(TraitPath::root(path.trait_handle), false, false);
            break;
        }
        merge_dup(&mut core.pending, schema, index);
    }

    instance.dirty = true;
}

/// Drop the item at `index` if it or one of its ancestors is already pending.
fn merge_dup(store: &mut PathStore, schema: &TraitSchema, index: usize) {
    let Some(candidate) = store.get(index).copied() else {
        return;
    };
    let mut walk = candidate.path.property;
    while !walk.is_root() {
        let covered = store.iter().any(|(other, item)| {
            other != index
                && item.path.trait_handle == candidate.path.trait_handle
                && item.path.property == walk
        });
        if covered {
            debug!("Merge {} into p{}", candidate.path, walk.value());
            store.remove_at(index);
            return;
        }
        match schema.parent(walk) {
            Some(parent) => walk = parent,
            None => return,
        }
    }
}

// ============================================================================
// SENDING
// ============================================================================

/// Push pending paths to the publisher.
///
/// Does nothing if a flush is already running or nothing is pending. Before
/// the subscription is established the flush is remembered and resumed once
/// it is.
pub fn flush_update(core: &mut ClientCore, actions: &mut Vec<Action>) -> Result<()> {
    if core.flush_in_progress {
        debug!("Updating has been triggered, skip");
        return Ok(());
    }
    if core.pending.is_empty() {
        debug!("Updating queue is empty, skip");
        return Ok(());
    }

    core.flush_in_progress = true;
    if let Err(e) = form_and_send_update(core, false, actions) {
        core.flush_in_progress = false;
        return Err(e);
    }
    Ok(())
}

pub(crate) fn form_and_send_update(
    core: &mut ClientCore,
    notify_on_error: bool,
    actions: &mut Vec<Action>,
) -> Result<()> {
    if core.state != ClientState::SubscriptionEstablishedIdle {
        debug!("Client[{}] not active, update deferred", core.id);
        return Ok(());
    }
    if core.update_in_flight {
        debug!("Client[{}] update ongoing", core.id);
        return Ok(());
    }

    let result = send_single_update_request(core, actions);
    if let Err(e) = &result {
        if notify_on_error {
            actions.push(Action::Emit(ClientEvent::UpdateComplete {
                path: None,
                status: None,
                reason: Some(e.clone()),
            }));
        }
    }
    result
}

fn send_single_update_request(core: &mut ClientCore, actions: &mut Vec<Action>) -> Result<()> {
    core.partial_update = false;
    let request = build_update_request(core, actions)?;

    if request.elements.is_empty() {
        if core.pending.is_empty() {
            core.flush_in_progress = false;
        }
        return Ok(());
    }

    debug!(
        "Client[{}] sending update: {} elements, {} bytes, partial {}",
        core.id,
        request.elements.len(),
        request.encoded_len(),
        request.partial
    );
    actions.push(Action::Send(Outbound::UpdateRequest(request)));
    actions.push(Action::ArmTimer {
        timer: Timer::Update,
        after: core.config.update_timeout,
    });
    core.update_in_flight = true;
    Ok(())
}

/// Collect the pending paths of the next dirty trait into one request.
fn build_update_request(core: &mut ClientCore, actions: &mut Vec<Action>) -> Result<UpdateRequest> {
    let count = core.catalog.len();
    let mut request = UpdateRequest::default();

    debug!(
        "CurUpdatedItems in Pending = {}/{}",
        core.pending.len(),
        core.pending.capacity()
    );

    let mut handled = 0;
    while handled < count {
        let index = core.cur_trait_idx % count;
        let Some(instance) = core.catalog.get_mut(index) else {
            break;
        };
        let handle = instance.handle;

        if instance.dirty && !core.pending.is_trait_present(handle) {
            // everything of this trait was purged or merged away
            instance.dirty = false;
        }
        if !instance.dirty {
            handled += 1;
            core.cur_trait_idx = (index + 1) % count;
            continue;
        }

        debug!("T{} is dirty", index);
        match fill_trait(core, index, &mut request) {
            Ok(()) => {}
            Err(e) if !request.elements.is_empty() => {
                debug!("Suppressing error {}; will try again later", e);
            }
            Err(e) => {
                fail_trait_update(core, index, e.clone(), actions);
                return Err(e);
            }
        }
        break;
    }

    request.partial = core.partial_update;
    Ok(request)
}

/// Move pending paths of trait `index` into `request` until the size
/// budget is used up.
fn fill_trait(core: &mut ClientCore, index: usize, request: &mut UpdateRequest) -> Result<()> {
    let max = core.config.max_update_size;
    let Some(instance) = core.catalog.get_mut(index) else {
        return Ok(());
    };
    let handle = instance.handle;
    let required_version = instance.sink.update_required_version();

    while let Some(slot) = core.pending.first_index_for_trait(handle) {
        let Some(item) = core.pending.get(slot).copied() else {
            break;
        };
        let element = build_element(&instance.sink, item, required_version)?;
        let element_len = element.encoded_len();

        if request.encoded_len() + element_len > max {
            if request.elements.is_empty() {
                warn!("{} is too big to fit in an update request", item.path);
                return Err(Error::UpdateTooLarge {
                    size: element_len,
                    max,
                });
            }
            core.partial_update = true;
            return Ok(());
        }

        core.pending.remove_at(slot);
        core.dispatched.add(item.path, item.force_merge, item.private);
        request.elements.push(element);
    }

    instance.dirty = false;
    Ok(())
}

fn build_element(
    sink: &UpdatableSink,
    item: PathItem,
    required_version: Option<u64>,
) -> Result<UpdateElement> {
    let schema = sink.schema();
    let mut tags = schema.relative_path_tags(item.path.property)?;

    // a dictionary is replaced as a whole: the path names its parent
    let replace_dictionary = schema.is_dictionary(item.path.property) && !item.force_merge;
    if replace_dictionary && tags.pop().is_none() {
        return Err(Error::SchemaMismatch);
    }

    Ok(UpdateElement {
        path: item.path,
        profile_id: schema.profile_id,
        tags,
        required_version,
        replace_dictionary,
        payload: sink.read(item.path.property),
    })
}

/// Give up on every queued path of a trait.
fn fail_trait_update(core: &mut ClientCore, index: usize, reason: Error, actions: &mut Vec<Action>) {
    actions.push(Action::Emit(ClientEvent::UpdateComplete {
        path: None,
        status: None,
        reason: Some(reason.clone()),
    }));

    if let Some(instance) = core.catalog.get_mut(index) {
        core.dispatched.remove_trait(instance.handle);
        core.pending.remove_trait(instance.handle);
        instance.sink.clear_update_required_version();
        instance.sink.clear_version();
        instance.dirty = false;
    }

    if core.state == ClientState::SubscriptionEstablishedIdle {
        let will_retry = core.is_retry_enabled();
        subscription::handle_terminated(core, will_retry, Some(reason), None, actions);
    }
}

// ============================================================================
// RESPONSES
// ============================================================================

/// The publisher answered the update request in flight.
///
/// Versions and statuses are matched to dispatched paths in slot order.
pub fn on_update_response(core: &mut ClientCore, report: StatusReport, actions: &mut Vec<Action>) {
    if !core.update_in_flight {
        debug!("Client[{}] update response without request, ignore", core.id);
        return;
    }
    core.update_in_flight = false;
    actions.push(Action::CancelTimer(Timer::Update));

    if core.partial_update {
        debug!("Got StatusReport in the middle of a long update");
        core.partial_update = false;
    }
    debug!("Received Status Report {}", report.status);

    let whole_request_succeeded = report.is_success();
    let response = report.update_response.clone().unwrap_or_default();

    let error = if whole_request_succeeded
        && (response.versions.is_none() || response.statuses.is_none())
    {
        debug!("Version/status list is empty");
        Some(Error::MalformedUpdateResponse)
    } else {
        apply_update_response(core, &report, whole_request_succeeded, actions);
        None
    };

    if let Some(reason) = error {
        clear_dispatched_store(core, reason, actions);
    }

    purge_pending_update(core, actions);

    if !core.pending.is_empty() {
        if let Err(e) = form_and_send_update(core, true, actions) {
            debug!("Client[{}] follow-up update failed: {}", core.id, e);
        }
        return;
    }

    core.flush_in_progress = false;
    let mut resubscribe = false;
    for instance in core.catalog.iter_mut() {
        if instance.potential_data_loss {
            debug!("Potential data loss in tdh {}", instance.handle.value());
            instance.sink.clear_version();
            instance.potential_data_loss = false;
            resubscribe = true;
        }
    }
    if resubscribe && core.state == ClientState::SubscriptionEstablishedIdle {
        let will_retry = core.is_retry_enabled();
        subscription::handle_terminated(core, will_retry, None, None, actions);
    }
}

fn apply_update_response(
    core: &mut ClientCore,
    report: &StatusReport,
    whole_request_succeeded: bool,
    actions: &mut Vec<Action>,
) {
    let response = report.update_response.as_ref();
    let mut versions = response
        .and_then(|r| r.versions.as_deref())
        .map(|v| v.iter());
    let mut statuses = response
        .and_then(|r| r.statuses.as_deref())
        .map(|s| s.iter());

    let mut version_created = 0u64;
    let mut status = report.status;
    let mut all_succeeded = true;
    let dispatched: Vec<(usize, PathItem)> =
        core.dispatched.iter().map(|(i, item)| (i, *item)).collect();

    for (slot, item) in dispatched {
        // a short list repeats its last entry
        if let Some(v) = versions.as_mut().and_then(Iterator::next) {
            version_created = *v;
        }
        if !whole_request_succeeded {
            if let Some(s) = statuses.as_mut().and_then(Iterator::next) {
                status = *s;
            }
        }

        core.dispatched.remove_at(slot);
        if !item.private {
            actions.push(Action::Emit(ClientEvent::UpdateComplete {
                path: Some(item.path),
                status: Some(status),
                reason: None,
            }));
        }
        debug!(
            "item: {}, {}, status {}, version 0x{:X}",
            slot, item.path, status, version_created
        );

        let still_pending = core.pending.is_present(item.path);
        let Ok(instance) = core.catalog.locate_mut(item.path.trait_handle) else {
            continue;
        };
        if status.is_success() {
            if instance.sink.is_conditional() {
                instance
                    .sink
                    .set_update_required_version(still_pending.then_some(version_created));
            }
            if instance.potential_data_loss && instance.sink.version() == Some(version_created) {
                debug!("{} clearing potential data loss", item.path);
                instance.potential_data_loss = false;
            }
        } else {
            // forces a resubscribe; pending conditional paths then fail
            // with a version mismatch
            all_succeeded = false;
            instance.sink.clear_version();
        }
    }

    if all_succeeded {
        info!("Update: Good Iteration");
    }
}

/// The update request got no answer in time.
///
/// Dispatched paths go back to the pending store; if that leaves work queued
/// on an established subscription, the subscription is torn down so the
/// update is retried on a fresh one.
pub fn on_update_timeout(core: &mut ClientCore, actions: &mut Vec<Action>) {
    if !core.update_in_flight {
        return;
    }
    core.update_in_flight = false;
    warn!("Client[{}] update request timed out", core.id);

    for (_, item) in core.dispatched.iter() {
        if !item.private {
            actions.push(Action::Emit(ClientEvent::UpdateComplete {
                path: Some(item.path),
                status: Some(StatusCode::TIMEOUT),
                reason: Some(Error::Timeout),
            }));
        }
    }

    move_dispatched_to_pending(core);
    purge_pending_update(core, actions);

    if core.pending.is_empty() {
        core.flush_in_progress = false;
    } else if core.state == ClientState::SubscriptionEstablishedIdle {
        let will_retry = core.is_retry_enabled();
        subscription::handle_terminated(core, will_retry, Some(Error::Timeout), None, actions);
    }
}

fn move_dispatched_to_pending(core: &mut ClientCore) {
    for item in core.dispatched.drain() {
        if !item.private {
            add_item_pending(core, item.path, item.force_merge);
        }
    }
}

/// Drop pending conditional paths whose base version is gone.
fn purge_pending_update(core: &mut ClientCore, actions: &mut Vec<Action>) {
    debug!("PurgePendingUpdate: numItems before: {}", core.pending.len());

    for instance in core.catalog.iter_mut() {
        if !(instance.dirty
            && core.pending.is_trait_present(instance.handle)
            && instance.sink.is_conditional())
        {
            continue;
        }

        let current = instance.sink.version();
        let required = instance.sink.update_required_version();
        debug!(
            "<PurgeUpdate> current version {:?}, update required version {:?}",
            current, required
        );

        let stale = match (current, required) {
            (None, _) => true,
            (Some(current), Some(required)) => is_version_older(current, required),
            (Some(_), None) => false,
        };
        if !stale {
            continue;
        }

        for (_, item) in core.pending.iter() {
            if item.path.trait_handle == instance.handle && !item.private {
                actions.push(Action::Emit(ClientEvent::UpdateComplete {
                    path: Some(item.path),
                    status: None,
                    reason: Some(Error::MismatchUpdateRequiredVersion),
                }));
            }
        }
        core.pending.remove_trait(instance.handle);
        instance.sink.clear_update_required_version();
        instance.sink.clear_version();
    }

    debug!("PurgePendingUpdate: numItems after: {}", core.pending.len());
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Apply notified data to the sinks, keeping local modifications.
pub fn process_data_list(core: &mut ClientCore, data: &[DataElement], actions: &mut Vec<Action>) {
    for element in data {
        check_potential_data_loss(core, element.path);
        let dirty = is_dirty(core, element.path);

        let Ok(instance) = core.catalog.locate_mut(element.path.trait_handle) else {
            warn!("Notification for unknown trait {}", element.path);
            continue;
        };
        if !instance.sink.schema().is_valid(element.path.property) {
            warn!("Notification for unknown property {}", element.path);
            continue;
        }

        if dirty {
            debug!("{} has local changes, skip", element.path);
        } else {
            instance
                .sink
                .store(element.path.property, element.payload.clone());
        }
        instance.sink.set_version(element.version);
    }

    if core.update_in_flight {
        purge_pending_update(core, actions);
    }
}

/// Flag the trait if `path` overlaps a queued or dispatched local change.
pub fn check_potential_data_loss(core: &mut ClientCore, path: TraitPath) {
    let Ok(instance) = core.catalog.locate_mut(path.trait_handle) else {
        return;
    };
    let schema = instance.sink.schema();
    if core.dispatched.intersects(path, schema) || core.pending.intersects(path, schema) {
        instance.potential_data_loss = true;
    }
}

/// True if `path` or an ancestor has a local change not yet confirmed.
pub fn is_dirty(core: &ClientCore, path: TraitPath) -> bool {
    let Ok(instance) = core.catalog.locate(path.trait_handle) else {
        return false;
    };
    let schema = instance.sink.schema();
    core.dispatched.includes(path, schema) || core.pending.includes(path, schema)
}

// ============================================================================
// TEARDOWN
// ============================================================================

pub(crate) fn clear_pending_store(core: &mut ClientCore, reason: Error, actions: &mut Vec<Action>) {
    clear_path_store(&mut core.pending, reason, actions);
}

pub(crate) fn clear_dispatched_store(
    core: &mut ClientCore,
    reason: Error,
    actions: &mut Vec<Action>,
) {
    clear_path_store(&mut core.dispatched, reason, actions);
}

fn clear_path_store(store: &mut PathStore, reason: Error, actions: &mut Vec<Action>) {
    for item in store.drain() {
        if !item.private {
            actions.push(Action::Emit(ClientEvent::UpdateComplete {
                path: Some(item.path),
                status: Some(StatusCode::INTERNAL_ERROR),
                reason: Some(reason.clone()),
            }));
        }
    }
}

/// Forget the request in flight; its paths are queued again.
pub(crate) fn cancel_update_client(core: &mut ClientCore, actions: &mut Vec<Action>) {
    debug!("Client[{}] cancel update client", core.id);
    core.update_in_flight = false;
    actions.push(Action::CancelTimer(Timer::Update));
    move_dispatched_to_pending(core);
}

pub(crate) fn shutdown_update_client(core: &mut ClientCore, actions: &mut Vec<Action>) {
    core.update_in_flight = false;
    core.flush_in_progress = false;
    core.partial_update = false;
    core.cur_trait_idx = 0;
    for instance in core.catalog.iter_mut() {
        instance.dirty = false;
    }
    actions.push(Action::CancelTimer(Timer::Update));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::sink::SinkCatalog;
    use crate::config::ClientConfig;
    use crate::message::{SubscribeResponse, UpdateResponse};
    use crate::schema::logging_settings::*;
    use crate::schema::{PropertyPathHandle, TraitDataHandle};

    const T1: TraitDataHandle = TraitDataHandle::new(1);

    fn path(property: PropertyPathHandle) -> TraitPath {
        TraitPath::new(T1, property)
    }

    fn established(config: ClientConfig) -> ClientCore {
        let mut catalog = SinkCatalog::default();
        catalog
            .add(T1, UpdatableSink::new(&SCHEMA).with_version(10))
            .unwrap();
        let mut core = ClientCore::new(config, catalog, None);
        core.set_binding_ready(true);

        let mut actions = Vec::new();
        subscription::initiate_subscription(&mut core, &mut actions);
        subscription::on_subscribe_response(
            &mut core,
            SubscribeResponse {
                subscription_id: 1,
                timeout_sec: None,
            },
            &mut actions,
        );
        assert_eq!(core.state(), ClientState::SubscriptionEstablishedIdle);
        core
    }

    fn pending_paths(core: &ClientCore) -> Vec<PropertyPathHandle> {
        core.pending().iter().map(|(_, i)| i.path.property).collect()
    }

    fn requests(actions: &[Action]) -> Vec<&UpdateRequest> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Send(Outbound::UpdateRequest(r)) => Some(r),
                _ => None,
            })
            .collect()
    }

    fn completions(actions: &[Action]) -> Vec<&ClientEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(e @ ClientEvent::UpdateComplete { .. }) => Some(e),
                _ => None,
            })
            .collect()
    }

    fn version(core: &ClientCore) -> Option<u64> {
        core.catalog().locate(T1).unwrap().sink.version()
    }

    #[test_log::test]
    fn version_older_wraps() {
        assert!(is_version_older(1, 2));
        assert!(!is_version_older(2, 2));
        assert!(!is_version_older(3, 2));
        assert!(is_version_older(u64::MAX, 1));
    }

    #[test_log::test]
    fn descendants_merge_into_ancestors() {
        let mut core = established(ClientConfig::default());
        set_updated(&mut core, path(TRAIT_LOGGING_IMPORTANCE), None, false).unwrap();
        set_updated(&mut core, path(TRAIT_LOGGING_IMPORTANCE_VALUE), None, false).unwrap();
        set_updated(&mut core, path(MIN_LOG_TIME), None, false).unwrap();
        set_updated(&mut core, path(MIN_LOG_TIME), None, false).unwrap();
        assert_eq!(
            pending_paths(&core),
            vec![TRAIT_LOGGING_IMPORTANCE, MIN_LOG_TIME]
        );

        set_updated(&mut core, path(ROOT), None, false).unwrap();
        assert_eq!(pending_paths(&core), vec![ROOT]);

        set_updated(&mut core, path(MAX_LOG_TIME), None, false).unwrap();
        assert_eq!(pending_paths(&core), vec![ROOT]);
    }

    #[test_log::test]
    fn conditional_needs_valid_version() {
        let mut core = established(ClientConfig::default());
        core.catalog.locate_mut(T1).unwrap().sink.clear_version();
        assert_eq!(
            set_updated(&mut core, path(MIN_LOG_TIME), None, true),
            Err(Error::IncorrectState("ALIVE"))
        );
        assert!(core.pending().is_empty());
    }

    #[test_log::test]
    fn full_store_skips_silently() {
        let config = ClientConfig::builder().path_store_capacity(1).build();
        let mut core = established(config);
        set_updated(&mut core, path(MIN_LOG_TIME), None, false).unwrap();
        assert_eq!(set_updated(&mut core, path(MAX_LOG_TIME), None, false), Ok(()));
        assert_eq!(pending_paths(&core), vec![MIN_LOG_TIME]);
    }

    #[test_log::test]
    fn dictionary_is_replaced_from_its_parent() {
        let mut core = established(ClientConfig::default());
        set_updated(
            &mut core,
            path(TRAIT_LOGGING_IMPORTANCE),
            Some(Bytes::from_static(b"dict")),
            true,
        )
        .unwrap();

        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();

        let sent = requests(&actions);
        assert_eq!(sent.len(), 1);
        let element = &sent[0].elements[0];
        assert!(element.replace_dictionary);
        assert!(element.tags.is_empty());
        assert_eq!(element.required_version, Some(10));
        assert_eq!(element.payload, Bytes::from_static(b"dict"));
        assert!(core.is_update_in_flight());
        assert_eq!(core.dispatched().len(), 1);
        assert!(core.pending().is_empty());
    }

    #[test_log::test]
    fn successful_response_completes_every_path() {
        let mut core = established(ClientConfig::default());
        set_updated(&mut core, path(MIN_LOG_TIME), None, true).unwrap();
        set_updated(&mut core, path(MAX_LOG_TIME), None, true).unwrap();
        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();
        assert_eq!(requests(&actions)[0].elements.len(), 2);

        let report = StatusReport::success().with_update_response(UpdateResponse::success(vec![11, 11]));
        let mut actions = Vec::new();
        on_update_response(&mut core, report, &mut actions);

        let done = completions(&actions);
        assert_eq!(done.len(), 2);
        assert!(done.iter().all(|e| e.is_update_success()));
        assert!(core.dispatched().is_empty());
        assert!(!core.is_flush_in_progress());
        assert!(!core.is_update_in_flight());
        let sink = &core.catalog().locate(T1).unwrap().sink;
        assert_eq!(sink.update_required_version(), None);
        assert_eq!(sink.version(), Some(10));
    }

    #[test_log::test]
    fn rejected_element_invalidates_version() {
        let mut core = established(ClientConfig::default());
        set_updated(&mut core, path(MIN_LOG_TIME), None, true).unwrap();
        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();

        let report = StatusReport::new(StatusCode::INTERNAL_ERROR).with_update_response(UpdateResponse {
            versions: Some(vec![0]),
            statuses: Some(vec![StatusCode::VERSION_MISMATCH]),
        });
        let mut actions = Vec::new();
        on_update_response(&mut core, report, &mut actions);

        assert_eq!(
            completions(&actions),
            vec![&ClientEvent::UpdateComplete {
                path: Some(path(MIN_LOG_TIME)),
                status: Some(StatusCode::VERSION_MISMATCH),
                reason: None,
            }]
        );
        assert_eq!(version(&core), None);
    }

    #[test_log::test]
    fn success_without_lists_is_malformed() {
        let mut core = established(ClientConfig::default());
        set_updated(&mut core, path(MIN_LOG_TIME), None, false).unwrap();
        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();

        let mut actions = Vec::new();
        on_update_response(&mut core, StatusReport::success(), &mut actions);
        assert_eq!(
            completions(&actions),
            vec![&ClientEvent::UpdateComplete {
                path: Some(path(MIN_LOG_TIME)),
                status: Some(StatusCode::INTERNAL_ERROR),
                reason: Some(Error::MalformedUpdateResponse),
            }]
        );
        assert!(core.dispatched().is_empty());
    }

    #[test_log::test]
    fn oversized_requests_are_split() {
        // one element with a single tag and a 10 byte payload is 34 bytes
        let config = ClientConfig::builder().max_update_size(40).build();
        let mut core = established(config);
        let payload = Bytes::from_static(b"0123456789");
        set_updated(&mut core, path(MIN_LOG_TIME), Some(payload.clone()), false).unwrap();
        set_updated(&mut core, path(MAX_LOG_TIME), Some(payload), false).unwrap();

        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();
        let first = requests(&actions);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].elements.len(), 1);
        assert!(first[0].partial);
        assert_eq!(pending_paths(&core), vec![MAX_LOG_TIME]);

        let report = StatusReport::success().with_update_response(UpdateResponse::success(vec![11]));
        let mut actions = Vec::new();
        on_update_response(&mut core, report, &mut actions);
        let second = requests(&actions);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].elements[0].path, path(MAX_LOG_TIME));
        assert!(!second[0].partial);
        assert!(core.is_flush_in_progress());
    }

    #[test_log::test]
    fn property_larger_than_budget_fails_trait() {
        let config = ClientConfig::builder().max_update_size(20).build();
        let mut core = established(config);
        set_updated(
            &mut core,
            path(MIN_LOG_TIME),
            Some(Bytes::from(vec![0u8; 64])),
            false,
        )
        .unwrap();

        let mut actions = Vec::new();
        let result = flush_update(&mut core, &mut actions);
        assert!(matches!(result, Err(Error::UpdateTooLarge { max: 20, .. })));
        assert!(core.pending().is_empty());
        assert!(!core.is_flush_in_progress());
        assert_eq!(core.state(), ClientState::Aborted);
    }

    #[test_log::test]
    fn timeout_requeues_and_tears_down() {
        let mut core = established(ClientConfig::default());
        set_updated(&mut core, path(MIN_LOG_TIME), None, false).unwrap();
        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();

        let mut actions = Vec::new();
        on_update_timeout(&mut core, &mut actions);

        let done = completions(&actions);
        assert_eq!(
            done[0],
            &ClientEvent::UpdateComplete {
                path: Some(path(MIN_LOG_TIME)),
                status: Some(StatusCode::TIMEOUT),
                reason: Some(Error::Timeout),
            }
        );
        // without retry the requeued path is failed by the abort
        assert_eq!(
            done[1],
            &ClientEvent::UpdateComplete {
                path: Some(path(MIN_LOG_TIME)),
                status: Some(StatusCode::INTERNAL_ERROR),
                reason: Some(Error::ConnectionAborted),
            }
        );
        assert_eq!(core.state(), ClientState::Aborted);
    }

    #[test_log::test]
    fn flush_before_established_is_resumed() {
        let mut catalog = SinkCatalog::default();
        catalog
            .add(T1, UpdatableSink::new(&SCHEMA).with_version(3))
            .unwrap();
        let mut core = ClientCore::new(ClientConfig::default(), catalog, None);
        core.set_binding_ready(true);

        set_updated(&mut core, path(CURRENT_IMPORTANCE), None, false).unwrap();
        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();
        assert!(requests(&actions).is_empty());
        assert!(core.is_flush_in_progress());

        subscription::initiate_subscription(&mut core, &mut actions);
        let mut actions = Vec::new();
        subscription::on_subscribe_response(
            &mut core,
            SubscribeResponse {
                subscription_id: 9,
                timeout_sec: None,
            },
            &mut actions,
        );
        assert_eq!(requests(&actions).len(), 1);
    }

    #[test_log::test]
    fn notification_keeps_local_changes() {
        let mut core = established(ClientConfig::default());
        set_updated(
            &mut core,
            path(MIN_LOG_TIME),
            Some(Bytes::from_static(b"local")),
            false,
        )
        .unwrap();

        let data = vec![
            DataElement {
                path: path(MIN_LOG_TIME),
                version: 12,
                payload: Bytes::from_static(b"remote"),
            },
            DataElement {
                path: path(MAX_LOG_TIME),
                version: 12,
                payload: Bytes::from_static(b"remote"),
            },
        ];
        let mut actions = Vec::new();
        process_data_list(&mut core, &data, &mut actions);

        let instance = core.catalog().locate(T1).unwrap();
        assert_eq!(instance.sink.read(MIN_LOG_TIME), Bytes::from_static(b"local"));
        assert_eq!(instance.sink.read(MAX_LOG_TIME), Bytes::from_static(b"remote"));
        assert_eq!(instance.sink.version(), Some(12));
        assert!(instance.potential_data_loss);
        assert!(is_dirty(&core, path(MIN_LOG_TIME)));
        assert!(!is_dirty(&core, path(ROOT)));
    }

    #[test_log::test]
    fn invalid_version_purges_conditional_paths() {
        let mut core = established(ClientConfig::default());
        set_updated(&mut core, path(MIN_LOG_TIME), None, true).unwrap();
        let mut actions = Vec::new();
        flush_update(&mut core, &mut actions).unwrap();
        // marked while the first request is in flight
        set_updated(&mut core, path(MAX_LOG_TIME), None, true).unwrap();

        let report = StatusReport::new(StatusCode::INTERNAL_ERROR).with_update_response(UpdateResponse {
            versions: Some(vec![0]),
            statuses: Some(vec![StatusCode::VERSION_MISMATCH]),
        });
        let mut actions = Vec::new();
        on_update_response(&mut core, report, &mut actions);

        assert!(completions(&actions).contains(&&ClientEvent::UpdateComplete {
            path: Some(path(MAX_LOG_TIME)),
            status: None,
            reason: Some(Error::MismatchUpdateRequiredVersion),
        }));
        assert!(core.pending().is_empty());
        assert!(!core.is_flush_in_progress());
    }
}
