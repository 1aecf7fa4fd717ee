//! List-downlink state: an ordered sequence of entries with stable ids.
//!
//! Remote events and local mutations both funnel through the same commit
//! helpers, so a command echoed back by the remote lane converges to a
//! no-op instead of a duplicate notification.

use std::cell::RefCell;
use std::rc::Rc;

use log::{trace, warn};

use warp_shared::{Envelope, Item, Value};

use crate::downlink::observer::{dispatch, ViewEvent};
use crate::error::ClientError;
use crate::link::link_machine::{push_to_host, LinkMachine};
use crate::link::{DownlinkKind, LinkModel};

/// A list member. The id survives moves, so callers reading it through
/// [`entry_id`] can correlate entries across reorders.
pub(crate) struct ListEntry {
    pub id: u64,
    pub value: Value,
}

pub(crate) struct ListModel {
    entries: Vec<ListEntry>,
    next_id: u64,
}

impl ListModel {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

pub(crate) fn len(machine: &Rc<RefCell<LinkMachine>>) -> usize {
    match &machine.borrow().model {
        LinkModel::List(model) => model.entries.len(),
        _ => 0,
    }
}

pub(crate) fn get(machine: &Rc<RefCell<LinkMachine>>, index: usize) -> Value {
    match &machine.borrow().model {
        LinkModel::List(model) => model
            .entries
            .get(index)
            .map(|entry| entry.value.clone())
            .unwrap_or(Value::Absent),
        _ => Value::Absent,
    }
}

pub(crate) fn entry_id(machine: &Rc<RefCell<LinkMachine>>, index: usize) -> Option<u64> {
    match &machine.borrow().model {
        LinkModel::List(model) => model.entries.get(index).map(|entry| entry.id),
        _ => None,
    }
}

pub(crate) fn snapshot(machine: &Rc<RefCell<LinkMachine>>) -> Vec<Value> {
    match &machine.borrow().model {
        LinkModel::List(model) => model
            .entries
            .iter()
            .map(|entry| entry.value.clone())
            .collect(),
        _ => Vec::new(),
    }
}

// Local mutators. Each one checks kind and openness, runs the will-hooks
// before touching state, commits, dispatches the did-hooks, then sends the
// convergence command.

pub(crate) fn insert(
    machine: &Rc<RefCell<LinkMachine>>,
    index: usize,
    value: Value,
) -> Result<(), ClientError> {
    ensure(machine)?;
    let value = run_will_update(machine, index, value);
    let index = commit_insert(machine, index, value.clone());
    notify_update(machine, index, value.clone(), Value::Absent);
    send(machine, update_command(index, value))
}

pub(crate) fn set(
    machine: &Rc<RefCell<LinkMachine>>,
    index: usize,
    value: Value,
) -> Result<(), ClientError> {
    ensure(machine)?;
    if index >= len(machine) {
        warn!("list set at index {} beyond end, ignored", index);
        return Ok(());
    }
    let value = run_will_update(machine, index, value);
    let old_value = commit_set(machine, index, value.clone());
    notify_update(machine, index, value.clone(), old_value);
    send(machine, update_command(index, value))
}

pub(crate) fn remove(machine: &Rc<RefCell<LinkMachine>>, index: usize) -> Result<(), ClientError> {
    ensure(machine)?;
    if index >= len(machine) {
        warn!("list remove at index {} beyond end, ignored", index);
        return Ok(());
    }
    run_will_remove(machine, index);
    let old_value = commit_remove(machine, index);
    let notifs = machine.borrow().notify_all(ViewEvent::DidRemove {
        key: Value::Int(index as i64),
        old_value,
    });
    dispatch(notifs);
    send(machine, remove_command(index))
}

pub(crate) fn move_entry(
    machine: &Rc<RefCell<LinkMachine>>,
    from: usize,
    to: usize,
) -> Result<(), ClientError> {
    ensure(machine)?;
    let length = len(machine);
    if from >= length || to >= length {
        warn!("list move {} -> {} beyond end, ignored", from, to);
        return Ok(());
    }
    let value = get(machine, from);
    let notifs = machine.borrow().notify_all(ViewEvent::WillMove {
        from,
        to,
        value: value.clone(),
    });
    dispatch(notifs);
    commit_move(machine, from, to);
    let notifs = machine.borrow().notify_all(ViewEvent::DidMove {
        from,
        to,
        value: value.clone(),
    });
    dispatch(notifs);
    send(machine, move_command(from, to, value))
}

/// Remove the first `count` entries with a single will/did pair.
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

/// Retain only the first `count` entries with a single will/did pair.
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
            let Some(index) = body.header().get("index").as_i64() else {
                warn!("list update event without index header, ignored");
                return;
            };
            let index = index.max(0) as usize;
            let value = run_will_update(machine, index, body.after_attrs());
            let length = len(machine);
            if index < length {
                if get(machine, index) == value {
                    return;
                }
                let old_value = commit_set(machine, index, value.clone());
                notify_update(machine, index, value, old_value);
            } else {
                let index = commit_insert(machine, index, value.clone());
                notify_update(machine, index, value, Value::Absent);
            }
        }
        Some("remove") => {
            let Some(index) = body.header().get("index").as_i64() else {
                warn!("list remove event without index header, ignored");
                return;
            };
            let index = index.max(0) as usize;
            if index >= len(machine) {
                return;
            }
            run_will_remove(machine, index);
            let old_value = commit_remove(machine, index);
            let notifs = machine.borrow().notify_all(ViewEvent::DidRemove {
                key: Value::Int(index as i64),
                old_value,
            });
            dispatch(notifs);
        }
        Some("move") => {
            let header = body.header();
            let (Some(from), Some(to)) = (header.get("from").as_i64(), header.get("to").as_i64())
            else {
                warn!("list move event without from/to headers, ignored");
                return;
            };
            let (from, to) = (from.max(0) as usize, to.max(0) as usize);
            let length = len(machine);
            if from >= length || to >= length || from == to {
                return;
            }
            let value = get(machine, from);
            let notifs = machine.borrow().notify_all(ViewEvent::WillMove {
                from,
                to,
                value: value.clone(),
            });
            dispatch(notifs);
            commit_move(machine, from, to);
            let notifs = machine
                .borrow()
                .notify_all(ViewEvent::DidMove { from, to, value });
            dispatch(notifs);
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
            trace!("list downlink ignoring event tagged {:?}", other);
        }
    }
}

// Hooks

fn run_will_update(machine: &Rc<RefCell<LinkMachine>>, index: usize, mut value: Value) -> Value {
    let key = Value::Int(index as i64);
    let observers = machine.borrow().observer_list();
    for observer in observers {
        value = observer.will_update(&key, value);
    }
    value
}

fn run_will_remove(machine: &Rc<RefCell<LinkMachine>>, index: usize) {
    let key = Value::Int(index as i64);
    let observers = machine.borrow().observer_list();
    for observer in observers {
        observer.will_remove(&key);
    }
}

fn notify_update(machine: &Rc<RefCell<LinkMachine>>, index: usize, new_value: Value, old_value: Value) {
    let notifs = machine.borrow().notify_all(ViewEvent::DidUpdate {
        key: Value::Int(index as i64),
        new_value,
        old_value,
    });
    dispatch(notifs);
}

// Commits

fn commit_insert(machine: &Rc<RefCell<LinkMachine>>, index: usize, value: Value) -> usize {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        let id = model.alloc_id();
        let index = index.min(model.entries.len());
        model.entries.insert(index, ListEntry { id, value });
        index
    } else {
        index
    }
}

fn commit_set(machine: &Rc<RefCell<LinkMachine>>, index: usize, value: Value) -> Value {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        if let Some(entry) = model.entries.get_mut(index) {
            return std::mem::replace(&mut entry.value, value);
        }
    }
    Value::Absent
}

fn commit_remove(machine: &Rc<RefCell<LinkMachine>>, index: usize) -> Value {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        if index < model.entries.len() {
            return model.entries.remove(index).value;
        }
    }
    Value::Absent
}

fn commit_move(machine: &Rc<RefCell<LinkMachine>>, from: usize, to: usize) {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        if from < model.entries.len() && to < model.entries.len() {
            let entry = model.entries.remove(from);
            model.entries.insert(to, entry);
        }
    }
}

fn commit_drop(machine: &Rc<RefCell<LinkMachine>>, count: usize) {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        let count = count.min(model.entries.len());
        model.entries.drain(..count);
    }
}

fn commit_take(machine: &Rc<RefCell<LinkMachine>>, count: usize) {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        model.entries.truncate(count);
    }
}

fn commit_clear(machine: &Rc<RefCell<LinkMachine>>) {
    let mut m = machine.borrow_mut();
    if let LinkModel::List(model) = &mut m.model {
        model.entries.clear();
    }
}

// Command bodies

fn update_command(index: usize, value: Value) -> Value {
    Value::Record(vec![
        Item::attr(
            "update",
            Value::Record(vec![Item::slot("index", index as i64)]),
        ),
        Item::of(value),
    ])
}

fn remove_command(index: usize) -> Value {
    Value::of_attr(
        "remove",
        Value::Record(vec![Item::slot("index", index as i64)]),
    )
}

fn move_command(from: usize, to: usize, value: Value) -> Value {
    Value::Record(vec![
        Item::attr(
            "move",
            Value::Record(vec![
                Item::slot("from", from as i64),
                Item::slot("to", to as i64),
            ]),
        ),
        Item::of(value),
    ])
}

fn bulk_command(tag: &str, count: usize) -> Value {
    Value::of_attr(tag, Value::Int(count as i64))
}

// Plumbing

fn ensure(machine: &Rc<RefCell<LinkMachine>>) -> Result<(), ClientError> {
    let m = machine.borrow();
    m.ensure_kind(DownlinkKind::List)?;
    m.ensure_open()
}

fn send(machine: &Rc<RefCell<LinkMachine>>, body: Value) -> Result<(), ClientError> {
    let (node_uri, lane_uri) = {
        let m = machine.borrow();
        (m.address.node_uri.clone(), m.address.lane_uri.clone())
    };
    push_to_host(machine, Envelope::command(node_uri, lane_uri, body))
}
