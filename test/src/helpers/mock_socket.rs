//! A scriptable in-memory transport.
//!
//! Every channel handed out by the connector shares one state cell, so a
//! test can script inbound events (`open`, `deliver`, `close_remote`,
//! `error`) and inspect every envelope the engine sent, in order.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use warp_client::{Channel, ChannelEvent, Connector, SendError};
use warp_shared::{Envelope, EnvelopeKind};

#[derive(Default)]
struct Inner {
    sent: Vec<Envelope>,
    inbound: VecDeque<ChannelEvent>,
    connects: usize,
    fail_sends: bool,
}

/// Test-side handle to the shared transport state.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Rc<RefCell<Inner>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connector(&self) -> Rc<dyn Connector> {
        Rc::new(MockConnector {
            inner: self.inner.clone(),
        })
    }

    /// Script the remote end accepting the connection.
    pub fn open(&self) {
        self.inner.borrow_mut().inbound.push_back(ChannelEvent::Open);
    }

    /// Script one inbound envelope.
    pub fn deliver(&self, envelope: Envelope) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(ChannelEvent::Message(envelope.to_text()));
    }

    /// Script one inbound raw frame, parseable or not.
    pub fn deliver_text(&self, text: &str) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(ChannelEvent::Message(text.to_string()));
    }

    /// Script the remote end closing the connection.
    pub fn close_remote(&self) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(ChannelEvent::Closed);
    }

    /// Script a transport failure.
    pub fn error(&self, reason: &str) {
        self.inner
            .borrow_mut()
            .inbound
            .push_back(ChannelEvent::Error(reason.to_string()));
    }

    /// How many times the engine has asked for a fresh channel.
    pub fn connects(&self) -> usize {
        self.inner.borrow().connects
    }

    /// Everything the engine has sent, oldest first.
    pub fn sent(&self) -> Vec<Envelope> {
        self.inner.borrow().sent.clone()
    }

    /// Drain the sent log.
    pub fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut self.inner.borrow_mut().sent)
    }

    pub fn sent_kinds(&self) -> Vec<EnvelopeKind> {
        self.inner
            .borrow()
            .sent
            .iter()
            .map(|envelope| envelope.kind())
            .collect()
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.inner.borrow_mut().fail_sends = fail;
    }
}

struct MockConnector {
    inner: Rc<RefCell<Inner>>,
}

impl Connector for MockConnector {
    fn connect(&self, _host_uri: &str) -> Box<dyn Channel> {
        self.inner.borrow_mut().connects += 1;
        Box::new(MockChannel {
            inner: self.inner.clone(),
            closed: false,
        })
    }
}

struct MockChannel {
    inner: Rc<RefCell<Inner>>,
    closed: bool,
}

impl Channel for MockChannel {
    fn send(&mut self, text: &str) -> Result<(), SendError> {
        let mut inner = self.inner.borrow_mut();
        if self.closed || inner.fail_sends {
            return Err(SendError);
        }
        let envelope = Envelope::parse(text).expect("engine sent unparseable envelope");
        inner.sent.push(envelope);
        Ok(())
    }

    fn poll(&mut self) -> Option<ChannelEvent> {
        if self.closed {
            return None;
        }
        self.inner.borrow_mut().inbound.pop_front()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
