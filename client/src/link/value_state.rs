//! Value-downlink state: a single convergent [`Value`].

use std::cell::RefCell;
use std::rc::Rc;

use warp_shared::{Envelope, Value};

use crate::downlink::observer::{dispatch, ViewEvent};
use crate::error::ClientError;
use crate::link::link_machine::{push_to_host, LinkMachine};
use crate::link::{DownlinkKind, LinkModel};

pub(crate) struct ValueModel {
    pub value: Value,
}

impl ValueModel {
    pub fn new() -> Self {
        Self {
            value: Value::Absent,
        }
    }
}

pub(crate) fn get(machine: &Rc<RefCell<LinkMachine>>) -> Value {
    let m = machine.borrow();
    match &m.model {
        LinkModel::Value(model) => model.value.clone(),
        _ => Value::Absent,
    }
}

/// Optimistic local write: transform, commit, notify, then send the command.
pub(crate) fn set(machine: &Rc<RefCell<LinkMachine>>, new_value: Value) -> Result<(), ClientError> {
    {
        let m = machine.borrow();
        m.ensure_kind(DownlinkKind::Value)?;
        m.ensure_open()?;
    }
    let value = run_will_set(machine, new_value);
    let old_value = commit(machine, value.clone());
    let notifs = machine.borrow().notify_all(ViewEvent::DidSet {
        new_value: value.clone(),
        old_value,
    });
    dispatch(notifs);

    let (node_uri, lane_uri) = {
        let m = machine.borrow();
        (m.address.node_uri.clone(), m.address.lane_uri.clone())
    };
    push_to_host(machine, Envelope::command(node_uri, lane_uri, value))
}

/// Inbound events take the same transform-commit-notify path, minus the
/// command. Events carrying the current value (echoes of our own writes)
/// are dropped without notifying.
pub(crate) fn apply_remote(machine: &Rc<RefCell<LinkMachine>>, body: Value) {
    let value = run_will_set(machine, body);
    {
        let m = machine.borrow();
        if let LinkModel::Value(model) = &m.model {
            if model.value == value {
                return;
            }
        }
    }
    let old_value = commit(machine, value.clone());
    let notifs = machine.borrow().notify_all(ViewEvent::DidSet {
        new_value: value,
        old_value,
    });
    dispatch(notifs);
}

fn run_will_set(machine: &Rc<RefCell<LinkMachine>>, mut value: Value) -> Value {
    let observers = machine.borrow().observer_list();
    for observer in observers {
        value = observer.will_set(value);
    }
    value
}

fn commit(machine: &Rc<RefCell<LinkMachine>>, value: Value) -> Value {
    let mut m = machine.borrow_mut();
    match &mut m.model {
        LinkModel::Value(model) => std::mem::replace(&mut model.value, value),
        _ => Value::Absent,
    }
}
