use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::{info, trace, warn};

use warp_shared::{Envelope, Instant, Timer, Value};

use crate::client_config::ClientConfig;
use crate::connection::{Backoff, SendBuffer};
use crate::downlink::observer::Notification;
use crate::error::ClientError;
use crate::link::{LinkAddress, LinkMachine};
use crate::transport::{Channel, ChannelEvent, Connector};

/// Work produced by a host tick, to be performed by the caller after the
/// host borrow has been released: observer notifications, and inbound
/// envelopes routed to their link machines.
pub enum TickAction {
    Notify(Notification),
    Deliver {
        machine: Rc<RefCell<LinkMachine>>,
        envelope: Envelope,
    },
}

/// The connection lifecycle for a single remote host.
///
/// Owns the transport channel, the `(node, lane) -> machine` registry, the
/// disconnected send buffer, and the reconnect/idle timers. One instance per
/// host URI; the client registry sweeps instances once they mark themselves
/// closed.
pub struct HostConnection {
    host_uri: String,
    config: ClientConfig,
    connector: Rc<dyn Connector>,
    channel: Option<Box<dyn Channel>>,
    connected: bool,
    authenticated: bool,
    deauthenticated: bool,
    session: Value,
    credentials: Option<Value>,
    links: HashMap<LinkAddress, Rc<RefCell<LinkMachine>>>,
    send_buffer: SendBuffer,
    backoff: Backoff,
    reconnect_timer: Option<Timer>,
    idle_timer: Option<Timer>,
    closed: bool,
}

impl HostConnection {
    pub fn new(host_uri: String, config: ClientConfig, connector: Rc<dyn Connector>) -> Self {
        let send_buffer = SendBuffer::new(config.send_buffer_capacity);
        let backoff = Backoff::new(
            config.min_reconnect_delay,
            config.max_reconnect_delay,
            config.reconnect_backoff_factor,
        );
        Self {
            host_uri,
            config,
            connector,
            channel: None,
            connected: false,
            authenticated: false,
            deauthenticated: false,
            session: Value::Absent,
            credentials: None,
            links: HashMap::new(),
            send_buffer,
            backoff,
            reconnect_timer: None,
            idle_timer: None,
            closed: false,
        }
    }

    pub fn host_uri(&self) -> &str {
        &self.host_uri
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn is_deauthenticated(&self) -> bool {
        self.deauthenticated
    }

    pub fn session(&self) -> Value {
        self.session.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn link(&self, address: &LinkAddress) -> Option<Rc<RefCell<LinkMachine>>> {
        self.links.get(address).cloned()
    }

    /// Register a machine under its `(node, lane)` address.
    ///
    /// A dead machine still occupying the slot is replaced; a live one is a
    /// duplicate. If the host is already connected, the machine's connect
    /// hook fires immediately and its link request goes out; the returned
    /// notifications must be dispatched after the host borrow is released.
    pub fn open_link(
        &mut self,
        machine: Rc<RefCell<LinkMachine>>,
    ) -> Result<Vec<Notification>, ClientError> {
        let address = machine.borrow().address().clone();
        if let Some(existing) = self.links.get(&address) {
            if !existing.borrow().is_dead() {
                return Err(ClientError::DuplicateLink {
                    node_uri: address.node_uri,
                    lane_uri: address.lane_uri,
                });
            }
        }
        self.links.insert(address, machine.clone());
        self.idle_timer = None;
        self.closed = false;
        if self.connected {
            let (notifs, envelope) = machine.borrow_mut().host_did_connect();
            if let Some(envelope) = envelope {
                self.send(envelope);
            }
            Ok(notifs)
        } else {
            self.connect();
            Ok(Vec::new())
        }
    }

    /// Drop a machine from the registry. The last link starts the idle
    /// countdown lazily on the next tick.
    pub fn close_link(&mut self, address: &LinkAddress) {
        self.links.remove(address);
    }

    /// Hand an envelope to this host for delivery.
    ///
    /// Connected: serialize and send. Disconnected: commands are buffered up
    /// to capacity and a (re)connect is triggered, skipping any backoff wait
    /// still pending; every other kind is dropped with a warning, since the
    /// link handshake will be replayed on reconnect anyway. Every push
    /// restarts the idle countdown.
    pub fn push(&mut self, envelope: Envelope) -> Result<(), ClientError> {
        self.closed = false;
        self.idle_timer = None;
        if self.connected {
            self.send(envelope);
            return Ok(());
        }
        match &envelope {
            Envelope::Command(_) => {
                self.send_buffer.push(envelope)?;
                self.reconnect_timer = None;
                if self.channel.is_none() {
                    self.connect();
                }
                Ok(())
            }
            other => {
                warn!(
                    "dropping {:?} envelope for {}: not connected",
                    other.kind(),
                    self.host_uri
                );
                Ok(())
            }
        }
    }

    /// Store credentials and authenticate now if connected. The stored
    /// credentials are re-sent on every reconnection, before link re-issue.
    pub fn authenticate(&mut self, credentials: Value) {
        self.credentials = Some(credentials.clone());
        self.deauthenticated = false;
        if self.connected {
            self.send(Envelope::auth(credentials));
        }
    }

    /// Open the transport if it is not already open or pending.
    pub fn connect(&mut self) {
        if self.channel.is_none() {
            trace!("connecting to {}", self.host_uri);
            self.channel = Some(self.connector.connect(&self.host_uri));
            self.reconnect_timer = None;
        }
    }

    /// Tear the transport down and mark this host for the registry sweep.
    pub fn close(&mut self) {
        if let Some(channel) = &mut self.channel {
            channel.close();
        }
        self.channel = None;
        self.connected = false;
        self.authenticated = false;
        self.session = Value::Absent;
        self.reconnect_timer = None;
        self.idle_timer = None;
        self.closed = true;
    }

    fn send(&mut self, envelope: Envelope) {
        if let Some(channel) = &mut self.channel {
            if channel.send(&envelope.to_text()).is_err() {
                // The matching Closed/Error event will arrive via poll.
                warn!(
                    "send to {} failed, dropping {:?} envelope",
                    self.host_uri,
                    envelope.kind()
                );
            }
        }
    }

    fn machines(&self) -> Vec<Rc<RefCell<LinkMachine>>> {
        self.links.values().cloned().collect()
    }

    fn sweep_dead_links(&mut self) {
        self.links.retain(|_, machine| !machine.borrow().is_dead());
    }

    /// Advance timers and drain transport events. Returns the accumulated
    /// notifications and inbound deliveries for the caller to perform once
    /// the host borrow is released.
    pub fn tick(&mut self, now: &Instant) -> Vec<TickAction> {
        if self.closed {
            return Vec::new();
        }
        let mut actions = Vec::new();

        if let Some(timer) = self.reconnect_timer {
            if timer.ringing(now) {
                self.reconnect_timer = None;
                self.connect();
            }
        }

        let mut events = Vec::new();
        if let Some(channel) = &mut self.channel {
            while let Some(event) = channel.poll() {
                events.push(event);
            }
        }
        for event in events {
            match event {
                ChannelEvent::Open => self.handle_open(&mut actions),
                ChannelEvent::Message(text) => self.handle_message(text, &mut actions),
                ChannelEvent::Closed => self.handle_disconnect(None, now, &mut actions),
                ChannelEvent::Error(reason) => {
                    self.handle_disconnect(Some(reason), now, &mut actions)
                }
            }
        }

        for machine in self.machines() {
            let (notifs, envelope) = machine.borrow_mut().tick(now);
            actions.extend(notifs.into_iter().map(TickAction::Notify));
            if let Some(envelope) = envelope {
                if self.connected {
                    self.send(envelope);
                }
            }
        }
        self.sweep_dead_links();

        if self.links.is_empty() && self.send_buffer.is_empty() {
            match self.idle_timer {
                None => {
                    self.idle_timer = Some(Timer::new(now, self.config.idle_timeout));
                }
                Some(timer) if timer.ringing(now) => {
                    info!("closing idle connection to {}", self.host_uri);
                    self.close();
                }
                Some(_) => {}
            }
        } else {
            self.idle_timer = None;
        }

        actions
    }

    fn handle_open(&mut self, actions: &mut Vec<TickAction>) {
        info!("connected to {}", self.host_uri);
        self.connected = true;
        self.backoff.reset();
        self.reconnect_timer = None;
        if let Some(credentials) = self.credentials.clone() {
            self.send(Envelope::auth(credentials));
        }
        for envelope in self.send_buffer.drain() {
            self.send(envelope);
        }
        for machine in self.machines() {
            let (notifs, envelope) = machine.borrow_mut().host_did_connect();
            actions.extend(notifs.into_iter().map(TickAction::Notify));
            if let Some(envelope) = envelope {
                self.send(envelope);
            }
        }
    }

    fn handle_message(&mut self, text: String, actions: &mut Vec<TickAction>) {
        let envelope = match Envelope::parse(&text) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!("unparseable envelope from {}: {}", self.host_uri, error);
                return;
            }
        };
        match &envelope {
            Envelope::Authed(inner) => {
                info!("authenticated with {}", self.host_uri);
                self.authenticated = true;
                self.deauthenticated = false;
                self.session = inner.body.clone();
            }
            Envelope::Deauthed(inner) => {
                info!("deauthenticated by {}: {}", self.host_uri, inner.body);
                self.authenticated = false;
                self.deauthenticated = true;
                self.session = Value::Absent;
            }
            Envelope::Auth(_) | Envelope::Deauth(_) => {
                trace!("ignoring auth request envelope from {}", self.host_uri);
            }
            _ => {
                let address = match (envelope.node_uri(), envelope.lane_uri()) {
                    (Some(node_uri), Some(lane_uri)) => LinkAddress::new(node_uri, lane_uri),
                    _ => return,
                };
                match self.links.get(&address) {
                    Some(machine) => actions.push(TickAction::Deliver {
                        machine: machine.clone(),
                        envelope,
                    }),
                    None => {
                        trace!(
                            "ignoring {:?} envelope for unlinked lane {}/{}",
                            envelope.kind(),
                            address.node_uri,
                            address.lane_uri
                        );
                    }
                }
            }
        }
    }

    fn handle_disconnect(
        &mut self,
        reason: Option<String>,
        now: &Instant,
        actions: &mut Vec<TickAction>,
    ) {
        if self.channel.is_none() {
            return;
        }
        self.channel = None;
        self.connected = false;
        self.authenticated = false;
        self.session = Value::Absent;

        if let Some(reason) = &reason {
            warn!("transport failure on {}: {}", self.host_uri, reason);
            for machine in self.machines() {
                let notifs = machine.borrow_mut().host_did_fail(reason);
                actions.extend(notifs.into_iter().map(TickAction::Notify));
            }
        }
        for machine in self.machines() {
            let notifs = machine.borrow_mut().host_did_disconnect();
            actions.extend(notifs.into_iter().map(TickAction::Notify));
        }
        self.sweep_dead_links();

        if self.links.is_empty() && self.send_buffer.is_empty() {
            self.close();
        } else {
            let delay = self.backoff.next_delay();
            trace!("reconnecting to {} in {:?}", self.host_uri, delay);
            self.reconnect_timer = Some(Timer::new(now, delay));
        }
    }
}
