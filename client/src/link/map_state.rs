//! Map-downlink state: an ordered convergent `Value -> Value` map.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use log::{trace, warn};

use warp_shared::{Envelope, Item, Value};

use crate::downlink::observer::{dispatch, ViewEvent};
use crate::error::ClientError;
use crate::link::link_machine::{push_to_host, LinkMachine};
use crate::link::{DownlinkKind, LinkModel};

pub(crate) struct MapModel {
    entries: BTreeMap<Value, Value>,
}

impl MapModel {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn entries(&self) -> &BTreeMap<Value, Value> {
        &self.entries
    }
}

pub(crate) fn len(machine: &Rc<RefCell<LinkMachine>>) -> usize {
    match &machine.borrow().model {
        LinkModel::Map(model) => model.entries.len(),
        _ => 0,
    }
}

pub(crate) fn get(machine: &Rc<RefCell<LinkMachine>>, key: &Value) -> Value {
    match &machine.borrow().model {
        LinkModel::Map(model) => model.entries.get(key).cloned().unwrap_or(Value::Absent),
        _ => Value::Absent,
    }
}

pub(crate) fn snapshot(machine: &Rc<RefCell<LinkMachine>>) -> BTreeMap<Value, Value> {
    match &machine.borrow().model {
        LinkModel::Map(model) => model.entries.clone(),
        _ => BTreeMap::new(),
    }
}

pub(crate) fn set(
    machine: &Rc<RefCell<LinkMachine>>,
    key: Value,
    value: Value,
) -> Result<(), ClientError> {
    ensure(machine)?;
    let value = run_will_update(machine, &key, value);
    let old_value = commit_set(machine, key.clone(), value.clone());
    let notifs = machine.borrow().notify_all(ViewEvent::DidUpdate {
        key: key.clone(),
        new_value: value.clone(),
        old_value,
    });
    dispatch(notifs);
    send(machine, update_command(key, value))
}

/// Removing an absent key still sends the command; only the notification
/// is suppressed.
pub(crate) fn delete(machine: &Rc<RefCell<LinkMachine>>, key: Value) -> Result<(), ClientError> {
    ensure(machine)?;
    run_will_remove(machine, &key);
    let old_value = commit_remove(machine, &key);
    if let Some(old_value) = old_value {
        let notifs = machine.borrow().notify_all(ViewEvent::DidRemove {
            key: key.clone(),
            old_value,
        });
        dispatch(notifs);
    }
    send(machine, remove_command(key))
}

/// Remove the `count` smallest keys with a single will/did pair.
pub(crate) fn drop_front(
    machine: &Rc<RefCell<LinkMachine>>,
    count: usize,
) -> Result<(), ClientError> {
    ensure(machine)?;
    let notifs = machine.borrow().notify_all(ViewEvent::WillDrop(count));
    dispatch(notifs);
    commit_drop(machine, count);
    let notifs = machine.borrow().notify_all(ViewEvent::DidDrop(count));
    dispatch(notifs);
    send(machine, bulk_command("drop", count))
}

/// Retain only the `count` smallest keys with a single will/did pair.
pub(crate) fn take_front(
    machine: &Rc<RefCell<LinkMachine>>,
    count: usize,
) -> Result<(), ClientError> {
    ensure(machine)?;
    let notifs = machine.borrow().notify_all(ViewEvent::WillTake(count));
    dispatch(notifs);
    commit_take(machine, count);
    let notifs = machine.borrow().notify_all(ViewEvent::DidTake(count));
    dispatch(notifs);
    send(machine, bulk_command("take", count))
}

pub(crate) fn clear(machine: &Rc<RefCell<LinkMachine>>) -> Result<(), ClientError> {
    ensure(machine)?;
    let notifs = machine.borrow().notify_all(ViewEvent::WillClear);
    dispatch(notifs);
    commit_clear(machine);
    let notifs = machine.borrow().notify_all(ViewEvent::DidClear);
    dispatch(notifs);
    send(machine, Value::of_attr("clear", Value::Extant))
}

/// Apply one inbound event body, dispatched on its leading attribute tag.
pub(crate) fn apply_remote(machine: &Rc<RefCell<LinkMachine>>, body: Value) {
    match body.tag() {
        Some("update") => {
            let key = body.header().get("key").clone();
            if !key.is_defined() {
                warn!("map update event without key header, ignored");
                return;
            }
            let value = run_will_update(machine, &key, body.after_attrs());
            if get(machine, &key) == value {
                return;
            }
            let old_value = commit_set(machine, key.clone(), value.clone());
            let notifs = machine.borrow().notify_all(ViewEvent::DidUpdate {
                key,
                new_value: value,
                old_value,
            });
            dispatch(notifs);
        }
        Some("remove") => {
            let key = body.header().get("key").clone();
            if !key.is_defined() {
                warn!("map remove event without key header, ignored");
                return;
            }
            run_will_remove(machine, &key);
            if let Some(old_value) = commit_remove(machine, &key) {
                let notifs = machine
                    .borrow()
                    .notify_all(ViewEvent::DidRemove { key, old_value });
                dispatch(notifs);
            }
        }
        Some("drop") => {
            let count = body.header().as_i64().unwrap_or(0).max(0) as usize;
            let notifs = machine.borrow().notify_all(ViewEvent::WillDrop(count));
            dispatch(notifs);
            commit_drop(machine, count);
            let notifs = machine.borrow().notify_all(ViewEvent::DidDrop(count));
            dispatch(notifs);
        }
        Some("take") => {
            let count = body.header().as_i64().unwrap_or(0).max(0) as usize;
            let notifs = machine.borrow().notify_all(ViewEvent::WillTake(count));
            dispatch(notifs);
            commit_take(machine, count);
            let notifs = machine.borrow().notify_all(ViewEvent::DidTake(count));
            dispatch(notifs);
        }
        Some("clear") => {
            let notifs = machine.borrow().notify_all(ViewEvent::WillClear);
            dispatch(notifs);
            commit_clear(machine);
            let notifs = machine.borrow().notify_all(ViewEvent::DidClear);
            dispatch(notifs);
        }
        other => {
            trace!("map downlink ignoring event tagged {:?}", other);
        }
    }
}

// Hooks

fn run_will_update(machine: &Rc<RefCell<LinkMachine>>, key: &Value, mut value: Value) -> Value {
    let observers = machine.borrow().observer_list();
    for observer in observers {
        value = observer.will_update(key, value);
    }
    value
}

fn run_will_remove(machine: &Rc<RefCell<LinkMachine>>, key: &Value) {
    let observers = machine.borrow().observer_list();
    for observer in observers {
        observer.will_remove(key);
    }
}

// Commits

fn commit_set(machine: &Rc<RefCell<LinkMachine>>, key: Value, value: Value) -> Value {
    let mut m = machine.borrow_mut();
    if let LinkModel::Map(model) = &mut m.model {
        model.entries.insert(key, value).unwrap_or(Value::Absent)
    } else {
        Value::Absent
    }
}

fn commit_remove(machine: &Rc<RefCell<LinkMachine>>, key: &Value) -> Option<Value> {
    let mut m = machine.borrow_mut();
    if let LinkModel::Map(model) = &mut m.model {
        model.entries.remove(key)
    } else {
        None
    }
}

fn commit_drop(machine: &Rc<RefCell<LinkMachine>>, count: usize) {
    let mut m = machine.borrow_mut();
    if let LinkModel::Map(model) = &mut m.model {
        let dropped: Vec<Value> = model.entries.keys().take(count).cloned().collect();
        for key in dropped {
            model.entries.remove(&key);
        }
    }
}

fn commit_take(machine: &Rc<RefCell<LinkMachine>>, count: usize) {
    let mut m = machine.borrow_mut();
    if let LinkModel::Map(model) = &mut m.model {
        let keep: Vec<Value> = model.entries.keys().take(count).cloned().collect();
        model.entries.retain(|key, _| keep.contains(key));
    }
}

fn commit_clear(machine: &Rc<RefCell<LinkMachine>>) {
    let mut m = machine.borrow_mut();
    if let LinkModel::Map(model) = &mut m.model {
        model.entries.clear();
    }
}

// Command bodies

fn update_command(key: Value, value: Value) -> Value {
    Value::Record(vec![
        Item::attr("update", Value::Record(vec![Item::slot("key", key)])),
        Item::of(value),
    ])
}

fn remove_command(key: Value) -> Value {
    Value::of_attr("remove", Value::Record(vec![Item::slot("key", key)]))
}

fn bulk_command(tag: &str, count: usize) -> Value {
    Value::of_attr(tag, Value::Int(count as i64))
}

// Plumbing

fn ensure(machine: &Rc<RefCell<LinkMachine>>) -> Result<(), ClientError> {
    let m = machine.borrow();
    m.ensure_kind(DownlinkKind::Map)?;
    m.ensure_open()
}

fn send(machine: &Rc<RefCell<LinkMachine>>, body: Value) -> Result<(), ClientError> {
    let (node_uri, lane_uri) = {
        let m = machine.borrow();
        (m.address.node_uri.clone(), m.address.lane_uri.clone())
    };
    push_to_host(machine, Envelope::command(node_uri, lane_uri, body))
}
