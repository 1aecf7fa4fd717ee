use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{trace, warn};

use warp_shared::{Envelope, Instant, Timer, Value};

use crate::connection::HostConnection;
use crate::downlink::observer::{dispatch, Notification, SharedObserver, ViewEvent};
use crate::error::ClientError;
use crate::link::list_state::ListModel;
use crate::link::map_state::MapModel;
use crate::link::value_state::ValueModel;
use crate::link::{list_state, map_state, value_state, DownlinkKind, LinkAddress, LinkState};

pub type ViewId = u64;

/// One attached view: its subscription flags plus registered observers.
/// Slots keep attachment order so notification fan-out is deterministic.
pub(crate) struct ViewSlot {
    pub id: ViewId,
    pub relinks: bool,
    pub syncs: bool,
    pub observers: Vec<SharedObserver>,
}

/// Kind-specific authoritative state.
pub(crate) enum LinkModel {
    Event,
    Value(ValueModel),
    List(ListModel),
    Map(MapModel),
}

/// The per-(host, node, lane) protocol state machine.
///
/// A machine is the single writer of its authoritative state; views only
/// read it or submit mutation requests that funnel through here. Machine
/// methods never invoke observers directly: they return [`Notification`]s
/// (and at most one outbound envelope) for the caller to act on after every
/// engine borrow has been released.
pub struct LinkMachine {
    pub(crate) address: LinkAddress,
    pub(crate) kind: DownlinkKind,
    pub(crate) host: Weak<RefCell<HostConnection>>,
    pub(crate) state: LinkState,
    pub(crate) ever_linked: bool,
    /// Linked acknowledgement for the current link cycle; cleared whenever
    /// the link drops, unlike the sticky `ever_linked`.
    pub(crate) remote_linked: bool,
    pub(crate) model: LinkModel,
    prio: f32,
    rate: f32,
    link_body: Value,
    unlink_delay_millis: i64,
    views: Vec<ViewSlot>,
    pending_replays: Vec<ViewId>,
    unlink_timer: Option<Timer>,
    next_view_id: ViewId,
    dead: bool,
}

impl LinkMachine {
    pub(crate) fn new(
        address: LinkAddress,
        kind: DownlinkKind,
        host: Weak<RefCell<HostConnection>>,
        prio: f32,
        rate: f32,
        link_body: Value,
        unlink_delay_millis: i64,
    ) -> Self {
        let model = match kind {
            DownlinkKind::Event => LinkModel::Event,
            DownlinkKind::Value => LinkModel::Value(ValueModel::new()),
            DownlinkKind::List => LinkModel::List(ListModel::new()),
            DownlinkKind::Map => LinkModel::Map(MapModel::new()),
        };
        Self {
            address,
            kind,
            host,
            state: LinkState::Unlinked,
            ever_linked: false,
            remote_linked: false,
            model,
            prio,
            rate,
            link_body,
            unlink_delay_millis,
            views: Vec::new(),
            pending_replays: Vec::new(),
            unlink_timer: None,
            next_view_id: 0,
            dead: false,
        }
    }

    pub fn address(&self) -> &LinkAddress {
        &self.address
    }

    pub fn kind(&self) -> DownlinkKind {
        self.kind
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Recomputed from attached views on every use, never cached.
    pub fn keep_linked(&self) -> bool {
        self.views.iter().any(|view| view.relinks)
    }

    /// Recomputed from attached views on every use, never cached.
    pub fn keep_synced(&self) -> bool {
        self.views.iter().any(|view| view.syncs)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), ClientError> {
        if self.ever_linked {
            Ok(())
        } else {
            Err(ClientError::NotOpen)
        }
    }

    pub(crate) fn ensure_kind(&self, expected: DownlinkKind) -> Result<(), ClientError> {
        if self.kind == expected {
            Ok(())
        } else {
            Err(ClientError::TypeMismatch {
                expected,
                found: self.kind,
            })
        }
    }

    // Notifications

    fn notify_slot(slot: &ViewSlot, event: &ViewEvent) -> Vec<Notification> {
        slot.observers
            .iter()
            .map(|observer| Notification {
                observer: observer.clone(),
                event: event.clone(),
            })
            .collect()
    }

    pub(crate) fn notify_all(&self, event: ViewEvent) -> Vec<Notification> {
        let mut out = Vec::new();
        for slot in &self.views {
            out.extend(Self::notify_slot(slot, &event));
        }
        out
    }

    /// All observers in attachment order, for transforming will-hooks.
    pub(crate) fn observer_list(&self) -> Vec<SharedObserver> {
        let mut out = Vec::new();
        for slot in &self.views {
            out.extend(slot.observers.iter().cloned());
        }
        out
    }

    // View attachment

    /// Attach a view. Attaching to an already-linked machine schedules a
    /// deferred replay for the new view only, so synchronous code can still
    /// register observers before the replay runs.
    pub(crate) fn add_view(&mut self, relinks: bool, syncs: bool) -> ViewId {
        let id = self.next_view_id;
        self.next_view_id += 1;
        self.views.push(ViewSlot {
            id,
            relinks,
            syncs,
            observers: Vec::new(),
        });
        self.unlink_timer = None;
        if matches!(self.state, LinkState::Linked | LinkState::Synced) {
            self.pending_replays.push(id);
        }
        id
    }

    pub(crate) fn add_observer(&mut self, id: ViewId, observer: SharedObserver) {
        if let Some(slot) = self.views.iter_mut().find(|slot| slot.id == id) {
            slot.observers.push(observer);
        }
    }

    /// Flag changes while open behave as a detach-and-reattach: the view
    /// keeps its slot but goes through the attach replay again.
    pub(crate) fn update_view_flags(&mut self, id: ViewId, relinks: bool, syncs: bool) {
        if let Some(slot) = self.views.iter_mut().find(|slot| slot.id == id) {
            slot.relinks = relinks;
            slot.syncs = syncs;
        }
        if matches!(self.state, LinkState::Linked | LinkState::Synced)
            && !self.pending_replays.contains(&id)
        {
            self.pending_replays.push(id);
        }
    }

    /// Detach a view. Removing the last view starts the unlink-delay timer
    /// rather than tearing down immediately, to tolerate attach/detach
    /// churn; a negative delay unlinks synchronously.
    pub(crate) fn remove_view(
        &mut self,
        id: ViewId,
        now: &Instant,
    ) -> (Vec<Notification>, Option<Envelope>) {
        self.views.retain(|slot| slot.id != id);
        self.pending_replays.retain(|pending| *pending != id);
        if !self.views.is_empty() {
            return (Vec::new(), None);
        }
        if self.unlink_delay_millis < 0 {
            return self.start_unlink();
        }
        self.unlink_timer = Some(Timer::new(
            now,
            Duration::from_millis(self.unlink_delay_millis as u64),
        ));
        (Vec::new(), None)
    }

    // Link lifecycle

    /// Issue a link or sync request if currently unlinked.
    pub(crate) fn initiate(&mut self, sync: bool) -> (Vec<Notification>, Option<Envelope>) {
        if self.state != LinkState::Unlinked || self.dead {
            return (Vec::new(), None);
        }
        let envelope = if sync {
            self.state = LinkState::Syncing;
            Envelope::sync(&self.address.node_uri, &self.address.lane_uri)
        } else {
            self.state = LinkState::Linking;
            Envelope::link(&self.address.node_uri, &self.address.lane_uri)
        }
        .with_prio_rate(self.prio, self.rate)
        .with_body(self.link_body.clone());
        let notifs = self.notify_all(if sync {
            ViewEvent::WillSync
        } else {
            ViewEvent::WillLink
        });
        (notifs, Some(envelope))
    }

    /// Request an unlink. The state transition out of `Unlinking` is driven
    /// by the response envelope, not by this call.
    pub(crate) fn start_unlink(&mut self) -> (Vec<Notification>, Option<Envelope>) {
        match self.state {
            LinkState::Unlinked => {
                if self.views.is_empty() {
                    self.dead = true;
                }
                (Vec::new(), None)
            }
            LinkState::Unlinking => (Vec::new(), None),
            _ => {
                self.state = LinkState::Unlinking;
                let notifs = self.notify_all(ViewEvent::WillUnlink);
                let envelope = Envelope::unlink(&self.address.node_uri, &self.address.lane_uri);
                (notifs, Some(envelope))
            }
        }
    }

    // Host lifecycle hooks

    pub(crate) fn host_did_connect(&mut self) -> (Vec<Notification>, Option<Envelope>) {
        let mut notifs = self.notify_all(ViewEvent::DidConnect);
        let sync = self.keep_synced();
        let (more, envelope) = self.initiate(sync);
        notifs.extend(more);
        (notifs, envelope)
    }

    pub(crate) fn host_did_disconnect(&mut self) -> Vec<Notification> {
        let mut notifs = self.notify_all(ViewEvent::DidDisconnect);
        self.state = LinkState::Unlinked;
        self.remote_linked = false;
        self.unlink_timer = None;
        self.pending_replays.clear();
        if !self.keep_linked() {
            self.dead = true;
            notifs.extend(self.notify_all(ViewEvent::DidClose));
        }
        notifs
    }

    pub(crate) fn host_did_fail(&mut self, reason: &str) -> Vec<Notification> {
        self.notify_all(ViewEvent::DidFail(reason.to_string()))
    }

    // Response envelopes

    pub(crate) fn on_linked(&mut self) -> Vec<Notification> {
        match self.state {
            LinkState::Linking => {
                self.state = LinkState::Linked;
                self.ever_linked = true;
                self.remote_linked = true;
                self.notify_all(ViewEvent::DidLink)
            }
            // A sync answers with linked first, then events, then synced.
            LinkState::Syncing => {
                self.ever_linked = true;
                self.remote_linked = true;
                self.notify_all(ViewEvent::DidLink)
            }
            _ => {
                trace!("ignoring linked response in state {:?}", self.state);
                Vec::new()
            }
        }
    }

    pub(crate) fn on_synced(&mut self) -> Vec<Notification> {
        match self.state {
            LinkState::Syncing => {
                self.state = LinkState::Synced;
                self.notify_all(ViewEvent::DidSync)
            }
            _ => {
                trace!("ignoring synced response in state {:?}", self.state);
                Vec::new()
            }
        }
    }

    /// View count and flags are re-checked now, at response time, not at
    /// the time the unlink was requested: re-linking can race an in-flight
    /// unlink, and a machine that gained subscribers mid-flight must
    /// survive and re-issue.
    pub(crate) fn on_unlinked(&mut self) -> (Vec<Notification>, Option<Envelope>) {
        match self.state {
            LinkState::Unlinking => {
                self.remote_linked = false;
                if self.views.is_empty() {
                    self.state = LinkState::Unlinked;
                    self.dead = true;
                    (self.notify_all(ViewEvent::DidUnlink), None)
                } else {
                    // Concurrently re-linked.
                    self.state = LinkState::Unlinked;
                    let sync = self.keep_synced();
                    self.initiate(sync)
                }
            }
            LinkState::Unlinked => (Vec::new(), None),
            _ => {
                // Unsolicited unlink: the remote lane is gone.
                let mut notifs = self.notify_all(ViewEvent::DidUnlink);
                self.state = LinkState::Unlinked;
                self.remote_linked = false;
                self.dead = true;
                notifs.extend(self.notify_all(ViewEvent::DidClose));
                (notifs, None)
            }
        }
    }

    // Timers and deferred work

    pub(crate) fn tick(&mut self, now: &Instant) -> (Vec<Notification>, Option<Envelope>) {
        let mut notifs = Vec::new();
        let mut envelope = None;
        if let Some(timer) = self.unlink_timer {
            if timer.ringing(now) {
                self.unlink_timer = None;
                if self.views.is_empty() {
                    let (more, env) = self.start_unlink();
                    notifs.extend(more);
                    envelope = env;
                }
            }
        }
        if !self.pending_replays.is_empty()
            && matches!(self.state, LinkState::Linked | LinkState::Synced)
        {
            let pending = std::mem::take(&mut self.pending_replays);
            for id in pending {
                if let Some(slot) = self.views.iter().find(|slot| slot.id == id) {
                    notifs.extend(self.replay_for(slot));
                }
            }
        }
        (notifs, envelope)
    }

    /// The attach-replay sequence for one late-joining view: linked, then
    /// the full current state as updates, then synced if already synced.
    fn replay_for(&self, slot: &ViewSlot) -> Vec<Notification> {
        let mut out = Self::notify_slot(slot, &ViewEvent::DidLink);
        match &self.model {
            LinkModel::Event => {}
            LinkModel::Value(model) => {
                if model.value.is_defined() {
                    out.extend(Self::notify_slot(
                        slot,
                        &ViewEvent::DidSet {
                            new_value: model.value.clone(),
                            old_value: Value::Absent,
                        },
                    ));
                }
            }
            LinkModel::List(model) => {
                for (index, entry) in model.entries().iter().enumerate() {
                    out.extend(Self::notify_slot(
                        slot,
                        &ViewEvent::DidUpdate {
                            key: Value::Int(index as i64),
                            new_value: entry.value.clone(),
                            old_value: Value::Absent,
                        },
                    ));
                }
            }
            LinkModel::Map(model) => {
                for (key, value) in model.entries() {
                    out.extend(Self::notify_slot(
                        slot,
                        &ViewEvent::DidUpdate {
                            key: key.clone(),
                            new_value: value.clone(),
                            old_value: Value::Absent,
                        },
                    ));
                }
            }
        }
        if self.state == LinkState::Synced {
            out.extend(Self::notify_slot(slot, &ViewEvent::DidSync));
        }
        out
    }
}

// Free functions working at the shared-handle level. These own the borrow
// choreography: no machine or host borrow is ever held across an observer
// callback.

pub(crate) fn address_of(machine: &Rc<RefCell<LinkMachine>>) -> (String, String) {
    let m = machine.borrow();
    (m.address.node_uri.clone(), m.address.lane_uri.clone())
}

/// Forward an envelope to the owning host connection.
pub(crate) fn push_to_host(
    machine: &Rc<RefCell<LinkMachine>>,
    envelope: Envelope,
) -> Result<(), ClientError> {
    let host = machine.borrow().host.upgrade();
    let Some(host) = host else {
        return Err(ClientError::HostClosed);
    };
    let result = host.borrow_mut().push(envelope);
    result
}

/// Like `push_to_host`, for lifecycle envelopes whose failure is not the
/// caller's concern.
pub(crate) fn push_lifecycle(machine: &Rc<RefCell<LinkMachine>>, envelope: Envelope) {
    if let Err(error) = push_to_host(machine, envelope) {
        warn!("dropping lifecycle envelope: {}", error);
    }
}

/// Fan out the optimistic command notification, then forward the command.
pub(crate) fn send_command(
    machine: &Rc<RefCell<LinkMachine>>,
    body: Value,
) -> Result<(), ClientError> {
    let notifs = machine.borrow().notify_all(ViewEvent::Command(body.clone()));
    dispatch(notifs);
    let (node_uri, lane_uri) = address_of(machine);
    push_to_host(machine, Envelope::command(node_uri, lane_uri, body))
}

/// Apply one inbound envelope previously routed to this machine.
pub fn process_envelope(machine: &Rc<RefCell<LinkMachine>>, envelope: Envelope) {
    match envelope {
        Envelope::Linked(_) => {
            let notifs = machine.borrow_mut().on_linked();
            dispatch(notifs);
        }
        Envelope::Synced(_) => {
            let notifs = machine.borrow_mut().on_synced();
            dispatch(notifs);
        }
        Envelope::Unlinked(_) => {
            let (notifs, reissue) = machine.borrow_mut().on_unlinked();
            dispatch(notifs);
            if let Some(envelope) = reissue {
                push_lifecycle(machine, envelope);
            }
        }
        Envelope::Event(inner) => apply_event(machine, inner.body),
        other => {
            trace!("link machine ignoring envelope kind {:?}", other.kind());
        }
    }
}

fn apply_event(machine: &Rc<RefCell<LinkMachine>>, body: Value) {
    let (applicable, kind) = {
        let m = machine.borrow();
        let applicable = matches!(
            m.state,
            LinkState::Linked | LinkState::Syncing | LinkState::Synced
        );
        (applicable, m.kind)
    };
    if !applicable {
        trace!("ignoring event message outside linked states");
        return;
    }
    let notifs = machine.borrow().notify_all(ViewEvent::Event(body.clone()));
    dispatch(notifs);
    match kind {
        DownlinkKind::Event => {}
        DownlinkKind::Value => value_state::apply_remote(machine, body),
        DownlinkKind::List => list_state::apply_remote(machine, body),
        DownlinkKind::Map => map_state::apply_remote(machine, body),
    }
}
