use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use warp_shared::{normalize_host, resolve_node, Envelope, Instant, Value};

use crate::client_config::ClientConfig;
use crate::connection::{HostConnection, TickAction};
use crate::downlink::observer::{deliver, dispatch};
use crate::downlink::{DownlinkView, EventDownlink, ListDownlink, MapDownlink, ValueDownlink};
use crate::error::ClientError;
use crate::link::{
    process_envelope, send_command, DownlinkKind, LinkAddress, LinkMachine, ViewId,
};
use crate::transport::Connector;

/// Per-downlink options supplied at open time.
#[derive(Debug, Clone)]
pub struct DownlinkOptions {
    /// Re-issue the link after a reconnect. Machines with no relinking view
    /// die on disconnect.
    pub relinks: bool,
    /// Request a state sync instead of a bare link.
    pub syncs: bool,
    /// Priority hint carried on the link request.
    pub prio: f32,
    /// Rate-limit hint carried on the link request.
    pub rate: f32,
    /// Body carried on the link request.
    pub body: Value,
}

impl Default for DownlinkOptions {
    fn default() -> Self {
        Self {
            relinks: true,
            syncs: false,
            prio: 0.0,
            rate: 0.0,
            body: Value::Absent,
        }
    }
}

impl DownlinkOptions {
    pub fn synced() -> Self {
        Self {
            syncs: true,
            ..Self::default()
        }
    }
}

/// The top-level engine handle: a registry of host connections sharing one
/// transport connector and one configuration.
///
/// Single-threaded and poll-driven: the embedding application calls
/// [`WarpClient::tick`] with the current instant; all timers, transport
/// events, and observer callbacks fire from inside that call.
pub struct WarpClient {
    config: ClientConfig,
    connector: Rc<dyn Connector>,
    hosts: HashMap<String, Rc<RefCell<HostConnection>>>,
}

impl WarpClient {
    pub fn new(connector: Rc<dyn Connector>, config: ClientConfig) -> Self {
        Self {
            config,
            connector,
            hosts: HashMap::new(),
        }
    }

    pub fn open_event_downlink(
        &mut self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        options: DownlinkOptions,
    ) -> Result<EventDownlink, ClientError> {
        self.open_downlink(host_uri, node_uri, lane_uri, DownlinkKind::Event, options)
            .map(EventDownlink::new)
    }

    pub fn open_value_downlink(
        &mut self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        options: DownlinkOptions,
    ) -> Result<ValueDownlink, ClientError> {
        self.open_downlink(host_uri, node_uri, lane_uri, DownlinkKind::Value, options)
            .map(ValueDownlink::new)
    }

    pub fn open_list_downlink(
        &mut self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        options: DownlinkOptions,
    ) -> Result<ListDownlink, ClientError> {
        self.open_downlink(host_uri, node_uri, lane_uri, DownlinkKind::List, options)
            .map(ListDownlink::new)
    }

    pub fn open_map_downlink(
        &mut self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        options: DownlinkOptions,
    ) -> Result<MapDownlink, ClientError> {
        self.open_downlink(host_uri, node_uri, lane_uri, DownlinkKind::Map, options)
            .map(MapDownlink::new)
    }

    fn open_downlink(
        &mut self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        kind: DownlinkKind,
        options: DownlinkOptions,
    ) -> Result<DownlinkView, ClientError> {
        let host_uri = normalize_host(host_uri)?;
        let node_uri = resolve_node(&host_uri, node_uri);
        let address = LinkAddress::new(node_uri, lane_uri);
        let (machine, view_id) = self.attach(
            &host_uri,
            address.clone(),
            kind,
            options.relinks,
            options.syncs,
            options.prio,
            options.rate,
            options.body.clone(),
        )?;
        Ok(DownlinkView::new(
            host_uri,
            address,
            kind,
            options.relinks,
            options.syncs,
            options.prio,
            options.rate,
            options.body,
            machine,
            view_id,
        ))
    }

    /// Attach one view to the machine for `address`, creating the machine
    /// (and registering it with its host) if none is live.
    ///
    /// The new view is added before the host fires the machine's connect
    /// hook, so the first link request already reflects this view's `syncs`
    /// flag.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn attach(
        &mut self,
        host_uri: &str,
        address: LinkAddress,
        kind: DownlinkKind,
        relinks: bool,
        syncs: bool,
        prio: f32,
        rate: f32,
        body: Value,
    ) -> Result<(Rc<RefCell<LinkMachine>>, ViewId), ClientError> {
        let host = self.host_for(host_uri);

        let existing = {
            let h = host.borrow();
            h.link(&address).filter(|machine| !machine.borrow().is_dead())
        };
        if let Some(machine) = existing {
            machine.borrow().ensure_kind(kind)?;
            let view_id = machine.borrow_mut().add_view(relinks, syncs);
            return Ok((machine, view_id));
        }

        let machine = Rc::new(RefCell::new(LinkMachine::new(
            address,
            kind,
            Rc::downgrade(&host),
            prio,
            rate,
            body,
            self.config.unlink_delay_millis,
        )));
        let view_id = machine.borrow_mut().add_view(relinks, syncs);
        let notifs = host.borrow_mut().open_link(machine.clone())?;
        dispatch(notifs);
        Ok((machine, view_id))
    }

    /// Send a one-shot command. If a live downlink covers the lane, its
    /// observers see the optimistic echo; otherwise the command goes out
    /// (or is buffered) raw.
    pub fn command(
        &mut self,
        host_uri: &str,
        node_uri: &str,
        lane_uri: &str,
        body: Value,
    ) -> Result<(), ClientError> {
        let host_uri = normalize_host(host_uri)?;
        let node_uri = resolve_node(&host_uri, node_uri);
        let address = LinkAddress::new(node_uri.clone(), lane_uri);
        let host = self.host_for(&host_uri);
        let machine = {
            let h = host.borrow();
            h.link(&address).filter(|machine| !machine.borrow().is_dead())
        };
        match machine {
            Some(machine) => send_command(&machine, body),
            None => host
                .borrow_mut()
                .push(Envelope::command(node_uri, lane_uri, body)),
        }
    }

    /// Store credentials for `host_uri` and authenticate now if connected.
    pub fn authenticate(&mut self, host_uri: &str, credentials: Value) -> Result<(), ClientError> {
        let host_uri = normalize_host(host_uri)?;
        let host = self.host_for(&host_uri);
        host.borrow_mut().authenticate(credentials);
        Ok(())
    }

    /// Drive every host connection one step: drain transport events, fire
    /// due timers, deliver routed envelopes, dispatch observer callbacks,
    /// and sweep hosts that closed themselves.
    pub fn tick(&mut self, now: &Instant) {
        let hosts: Vec<_> = self.hosts.values().cloned().collect();
        for host in hosts {
            let actions = host.borrow_mut().tick(now);
            for action in actions {
                match action {
                    TickAction::Notify(notification) => deliver(notification),
                    TickAction::Deliver { machine, envelope } => {
                        process_envelope(&machine, envelope)
                    }
                }
            }
        }
        self.hosts.retain(|_, host| !host.borrow().is_closed());
    }

    /// Tear down every host connection. Attached views observe the
    /// disconnect on their next status read; a later open re-creates hosts
    /// on demand.
    pub fn close(&mut self) {
        for host in self.hosts.values() {
            host.borrow_mut().close();
        }
        self.hosts.clear();
    }

    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    fn host_for(&mut self, host_uri: &str) -> Rc<RefCell<HostConnection>> {
        if let Some(host) = self.hosts.get(host_uri) {
            if !host.borrow().is_closed() {
                return host.clone();
            }
        }
        let host = Rc::new(RefCell::new(HostConnection::new(
            host_uri.to_string(),
            self.config.clone(),
            self.connector.clone(),
        )));
        self.hosts.insert(host_uri.to_string(), host.clone());
        host
    }
}
