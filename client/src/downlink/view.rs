use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use warp_shared::{Instant, Value};

use crate::client::WarpClient;
use crate::downlink::observer::{dispatch, SharedObserver};
use crate::error::ClientError;
use crate::link::{
    list_state, map_state, push_lifecycle, push_to_host, send_command, value_state, DownlinkKind,
    LinkAddress, LinkMachine, LinkState, ViewId,
};

/// One logical subscription to a `(host, node, lane)` triple.
///
/// Many views can share one underlying link machine; each carries its own
/// observers and its own `relinks`/`syncs` flags, which the machine combines
/// (any-view-wins) when deciding whether to keep the link alive or synced.
pub struct DownlinkView {
    host_uri: String,
    address: LinkAddress,
    kind: DownlinkKind,
    relinks: bool,
    syncs: bool,
    prio: f32,
    rate: f32,
    body: Value,
    machine: Option<Rc<RefCell<LinkMachine>>>,
    view_id: ViewId,
}

impl DownlinkView {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        host_uri: String,
        address: LinkAddress,
        kind: DownlinkKind,
        relinks: bool,
        syncs: bool,
        prio: f32,
        rate: f32,
        body: Value,
        machine: Rc<RefCell<LinkMachine>>,
        view_id: ViewId,
    ) -> Self {
        Self {
            host_uri,
            address,
            kind,
            relinks,
            syncs,
            prio,
            rate,
            body,
            machine: Some(machine),
            view_id,
        }
    }

    pub fn host_uri(&self) -> &str {
        &self.host_uri
    }

    pub fn node_uri(&self) -> &str {
        &self.address.node_uri
    }

    pub fn lane_uri(&self) -> &str {
        &self.address.lane_uri
    }

    pub fn kind(&self) -> DownlinkKind {
        self.kind
    }

    pub fn relinks(&self) -> bool {
        self.relinks
    }

    pub fn syncs(&self) -> bool {
        self.syncs
    }

    /// Register an observer. Observers attached after the link is already up
    /// receive a full replay (`did_link`, current state, `did_sync`) on the
    /// next tick.
    pub fn observe(&self, observer: SharedObserver) {
        if let Some(machine) = self.attached() {
            machine.borrow_mut().add_observer(self.view_id, observer);
        }
    }

    /// Changing the flag while open behaves as a detach-and-reattach.
    pub fn set_relinks(&mut self, relinks: bool) {
        self.relinks = relinks;
        self.push_flags();
    }

    /// Changing the flag while open behaves as a detach-and-reattach.
    pub fn set_syncs(&mut self, syncs: bool) {
        self.syncs = syncs;
        self.push_flags();
    }

    fn push_flags(&self) {
        if let Some(machine) = self.attached() {
            machine
                .borrow_mut()
                .update_view_flags(self.view_id, self.relinks, self.syncs);
        }
    }

    /// Re-attach a closed view through the client. Opening an already-open
    /// view is a no-op.
    pub fn open(&mut self, client: &mut WarpClient) -> Result<(), ClientError> {
        if self.attached().is_some() {
            return Ok(());
        }
        let (machine, view_id) = client.attach(
            &self.host_uri,
            self.address.clone(),
            self.kind,
            self.relinks,
            self.syncs,
            self.prio,
            self.rate,
            self.body.clone(),
        )?;
        self.machine = Some(machine);
        self.view_id = view_id;
        Ok(())
    }

    /// Detach from the machine. Closing the last view starts the machine's
    /// unlink-delay countdown. Closing twice is a no-op.
    pub fn close(&mut self, now: &Instant) {
        if let Some(machine) = self.machine.take() {
            let (notifs, envelope) = machine.borrow_mut().remove_view(self.view_id, now);
            dispatch(notifs);
            if let Some(envelope) = envelope {
                push_lifecycle(&machine, envelope);
            }
        }
    }

    // Status proxies, all false when the view is detached.

    pub fn is_connected(&self) -> bool {
        self.with_host(|host| host.is_connected())
    }

    pub fn is_authenticated(&self) -> bool {
        self.with_host(|host| host.is_authenticated())
    }

    pub fn is_linked(&self) -> bool {
        match self.attached() {
            Some(machine) => {
                let m = machine.borrow();
                matches!(m.state(), LinkState::Linked | LinkState::Synced)
                    || (m.state() == LinkState::Syncing && m.remote_linked)
            }
            None => false,
        }
    }

    pub fn is_synced(&self) -> bool {
        match self.attached() {
            Some(machine) => machine.borrow().state() == LinkState::Synced,
            None => false,
        }
    }

    // Explicit link lifecycle requests.

    pub fn link(&self) -> Result<(), ClientError> {
        self.initiate(false)
    }

    pub fn sync(&self) -> Result<(), ClientError> {
        self.initiate(true)
    }

    fn initiate(&self, sync: bool) -> Result<(), ClientError> {
        let machine = self.machine_or_err()?;
        let (notifs, envelope) = machine.borrow_mut().initiate(sync);
        dispatch(notifs);
        match envelope {
            Some(envelope) => push_to_host(&machine, envelope),
            None => Ok(()),
        }
    }

    pub fn unlink(&self) -> Result<(), ClientError> {
        let machine = self.machine_or_err()?;
        let (notifs, envelope) = machine.borrow_mut().start_unlink();
        dispatch(notifs);
        match envelope {
            Some(envelope) => push_to_host(&machine, envelope),
            None => Ok(()),
        }
    }

    /// Send a command to the remote lane, echoing it to local observers
    /// first.
    pub fn command(&self, body: Value) -> Result<(), ClientError> {
        let machine = self.machine_or_err()?;
        send_command(&machine, body)
    }

    fn attached(&self) -> Option<Rc<RefCell<LinkMachine>>> {
        let machine = self.machine.as_ref()?;
        if machine.borrow().is_dead() {
            None
        } else {
            Some(machine.clone())
        }
    }

    pub(crate) fn machine_or_err(&self) -> Result<Rc<RefCell<LinkMachine>>, ClientError> {
        self.attached().ok_or(ClientError::HostClosed)
    }

    fn with_host(&self, read: impl Fn(&crate::connection::HostConnection) -> bool) -> bool {
        match self.attached() {
            Some(machine) => {
                let host = machine.borrow().host.upgrade();
                match host {
                    Some(host) => read(&host.borrow()),
                    None => false,
                }
            }
            None => false,
        }
    }
}

// The machine handle is not `Debug`, so the identity fields are printed by
// hand.
impl fmt::Debug for DownlinkView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownlinkView")
            .field("host_uri", &self.host_uri)
            .field("node_uri", &self.address.node_uri)
            .field("lane_uri", &self.address.lane_uri)
            .field("kind", &self.kind)
            .field("relinks", &self.relinks)
            .field("syncs", &self.syncs)
            .field("open", &self.machine.is_some())
            .finish()
    }
}

/// A view over a raw event lane: inbound events and outbound commands, no
/// local state.
pub struct EventDownlink {
    view: DownlinkView,
}

impl EventDownlink {
    pub(crate) fn new(view: DownlinkView) -> Self {
        Self { view }
    }
}

impl fmt::Debug for EventDownlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventDownlink").field(&self.view).finish()
    }
}

impl Deref for EventDownlink {
    type Target = DownlinkView;

    fn deref(&self) -> &DownlinkView {
        &self.view
    }
}

impl DerefMut for EventDownlink {
    fn deref_mut(&mut self) -> &mut DownlinkView {
        &mut self.view
    }
}

/// A view over a convergent single-value lane.
pub struct ValueDownlink {
    view: DownlinkView,
}

impl ValueDownlink {
    pub(crate) fn new(view: DownlinkView) -> Self {
        Self { view }
    }

    pub fn get(&self) -> Value {
        match self.view.attached() {
            Some(machine) => value_state::get(&machine),
            None => Value::Absent,
        }
    }

    pub fn set(&self, value: Value) -> Result<(), ClientError> {
        value_state::set(&self.view.machine_or_err()?, value)
    }
}

impl fmt::Debug for ValueDownlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ValueDownlink").field(&self.view).finish()
    }
}

impl Deref for ValueDownlink {
    type Target = DownlinkView;

    fn deref(&self) -> &DownlinkView {
        &self.view
    }
}

impl DerefMut for ValueDownlink {
    fn deref_mut(&mut self) -> &mut DownlinkView {
        &mut self.view
    }
}

/// A view over a convergent list lane, keyed by index in notifications.
pub struct ListDownlink {
    view: DownlinkView,
}

impl ListDownlink {
    pub(crate) fn new(view: DownlinkView) -> Self {
        Self { view }
    }

    pub fn len(&self) -> usize {
        match self.view.attached() {
            Some(machine) => list_state::len(&machine),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Value {
        match self.view.attached() {
            Some(machine) => list_state::get(&machine, index),
            None => Value::Absent,
        }
    }

    pub fn snapshot(&self) -> Vec<Value> {
        match self.view.attached() {
            Some(machine) => list_state::snapshot(&machine),
            None => Vec::new(),
        }
    }

    /// The stable id of the entry currently at `index`. The id follows the
    /// entry through moves, so callers can correlate entries across
    /// reorders.
    pub fn entry_id(&self, index: usize) -> Option<u64> {
        self.view
            .attached()
            .and_then(|machine| list_state::entry_id(&machine, index))
    }

    pub fn insert(&self, index: usize, value: Value) -> Result<(), ClientError> {
        list_state::insert(&self.view.machine_or_err()?, index, value)
    }

    pub fn set(&self, index: usize, value: Value) -> Result<(), ClientError> {
        list_state::set(&self.view.machine_or_err()?, index, value)
    }

    pub fn push(&self, value: Value) -> Result<(), ClientError> {
        self.insert(self.len(), value)
    }

    pub fn remove(&self, index: usize) -> Result<(), ClientError> {
        list_state::remove(&self.view.machine_or_err()?, index)
    }

    pub fn move_entry(&self, from: usize, to: usize) -> Result<(), ClientError> {
        list_state::move_entry(&self.view.machine_or_err()?, from, to)
    }

    pub fn drop_front(&self, count: usize) -> Result<(), ClientError> {
        list_state::drop_front(&self.view.machine_or_err()?, count)
    }

    pub fn take_front(&self, count: usize) -> Result<(), ClientError> {
        list_state::take_front(&self.view.machine_or_err()?, count)
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        list_state::clear(&self.view.machine_or_err()?)
    }
}

impl fmt::Debug for ListDownlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ListDownlink").field(&self.view).finish()
    }
}

impl Deref for ListDownlink {
    type Target = DownlinkView;

    fn deref(&self) -> &DownlinkView {
        &self.view
    }
}

impl DerefMut for ListDownlink {
    fn deref_mut(&mut self) -> &mut DownlinkView {
        &mut self.view
    }
}

/// A view over a convergent, key-ordered map lane.
pub struct MapDownlink {
    view: DownlinkView,
}

impl MapDownlink {
    pub(crate) fn new(view: DownlinkView) -> Self {
        Self { view }
    }

    pub fn len(&self) -> usize {
        match self.view.attached() {
            Some(machine) => map_state::len(&machine),
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &Value) -> Value {
        match self.view.attached() {
            Some(machine) => map_state::get(&machine, key),
            None => Value::Absent,
        }
    }

    pub fn snapshot(&self) -> BTreeMap<Value, Value> {
        match self.view.attached() {
            Some(machine) => map_state::snapshot(&machine),
            None => BTreeMap::new(),
        }
    }

    pub fn set(&self, key: Value, value: Value) -> Result<(), ClientError> {
        map_state::set(&self.view.machine_or_err()?, key, value)
    }

    pub fn delete(&self, key: Value) -> Result<(), ClientError> {
        map_state::delete(&self.view.machine_or_err()?, key)
    }

    pub fn drop_front(&self, count: usize) -> Result<(), ClientError> {
        map_state::drop_front(&self.view.machine_or_err()?, count)
    }

    pub fn take_front(&self, count: usize) -> Result<(), ClientError> {
        map_state::take_front(&self.view.machine_or_err()?, count)
    }

    pub fn clear(&self) -> Result<(), ClientError> {
        map_state::clear(&self.view.machine_or_err()?)
    }
}

impl fmt::Debug for MapDownlink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MapDownlink").field(&self.view).finish()
    }
}

impl Deref for MapDownlink {
    type Target = DownlinkView;

    fn deref(&self) -> &DownlinkView {
        &self.view
    }
}

impl DerefMut for MapDownlink {
    fn deref_mut(&mut self) -> &mut DownlinkView {
        &mut self.view
    }
}
