use std::rc::Rc;

use warp_shared::Value;

/// Callbacks a caller registers on a downlink view.
///
/// Every method has a no-op default, so implementors override only what
/// they watch. `will_set` / `will_update` may transform the value before it
/// is committed (clamping and validation hooks); all other hooks observe.
///
/// Methods take `&self`: the engine holds no borrow while invoking a hook,
/// so hooks are free to re-enter the engine (issue commands, mutate state,
/// open or close views). Implementations that accumulate state use interior
/// mutability.
pub trait DownlinkObserver {
    fn will_link(&self) {}
    fn did_link(&self) {}
    fn will_sync(&self) {}
    fn did_sync(&self) {}
    fn will_unlink(&self) {}
    fn did_unlink(&self) {}
    fn did_connect(&self) {}
    fn did_disconnect(&self) {}
    fn did_close(&self) {}
    fn did_fail(&self, _reason: &str) {}

    /// Every inbound event message, before kind-specific application.
    fn on_event(&self, _body: &Value) {}
    /// The optimistic local echo of an outbound command.
    fn on_command(&self, _body: &Value) {}

    // Value downlinks
    fn will_set(&self, new_value: Value) -> Value {
        new_value
    }
    fn did_set(&self, _new_value: &Value, _old_value: &Value) {}

    // Map and list downlinks (lists key by `Value::Int` index)
    fn will_update(&self, _key: &Value, new_value: Value) -> Value {
        new_value
    }
    fn did_update(&self, _key: &Value, _new_value: &Value, _old_value: &Value) {}
    fn will_remove(&self, _key: &Value) {}
    fn did_remove(&self, _key: &Value, _old_value: &Value) {}
    fn will_move(&self, _from: usize, _to: usize, _value: &Value) {}
    fn did_move(&self, _from: usize, _to: usize, _value: &Value) {}
    fn will_drop(&self, _lower: usize) {}
    fn did_drop(&self, _lower: usize) {}
    fn will_take(&self, _upper: usize) {}
    fn did_take(&self, _upper: usize) {}
    fn will_clear(&self) {}
    fn did_clear(&self) {}
}

pub type SharedObserver = Rc<dyn DownlinkObserver>;

/// One observable state change, reified so it can be delivered after the
/// engine has released its internal borrows.
#[derive(Clone)]
pub enum ViewEvent {
    WillLink,
    DidLink,
    WillSync,
    DidSync,
    WillUnlink,
    DidUnlink,
    DidConnect,
    DidDisconnect,
    DidClose,
    DidFail(String),
    Event(Value),
    Command(Value),
    DidSet {
        new_value: Value,
        old_value: Value,
    },
    DidUpdate {
        key: Value,
        new_value: Value,
        old_value: Value,
    },
    DidRemove {
        key: Value,
        old_value: Value,
    },
    WillMove {
        from: usize,
        to: usize,
        value: Value,
    },
    DidMove {
        from: usize,
        to: usize,
        value: Value,
    },
    WillDrop(usize),
    DidDrop(usize),
    WillTake(usize),
    DidTake(usize),
    WillClear,
    DidClear,
}

/// A pending delivery of one event to one observer.
pub struct Notification {
    pub observer: SharedObserver,
    pub event: ViewEvent,
}

pub fn deliver(notification: Notification) {
    let Notification { observer, event } = notification;
    match event {
        ViewEvent::WillLink => observer.will_link(),
        ViewEvent::DidLink => observer.did_link(),
        ViewEvent::WillSync => observer.will_sync(),
        ViewEvent::DidSync => observer.did_sync(),
        ViewEvent::WillUnlink => observer.will_unlink(),
        ViewEvent::DidUnlink => observer.did_unlink(),
        ViewEvent::DidConnect => observer.did_connect(),
        ViewEvent::DidDisconnect => observer.did_disconnect(),
        ViewEvent::DidClose => observer.did_close(),
        ViewEvent::DidFail(reason) => observer.did_fail(&reason),
        ViewEvent::Event(body) => observer.on_event(&body),
        ViewEvent::Command(body) => observer.on_command(&body),
        ViewEvent::DidSet {
            new_value,
            old_value,
        } => observer.did_set(&new_value, &old_value),
        ViewEvent::DidUpdate {
            key,
            new_value,
            old_value,
        } => observer.did_update(&key, &new_value, &old_value),
        ViewEvent::DidRemove { key, old_value } => observer.did_remove(&key, &old_value),
        ViewEvent::WillMove { from, to, value } => observer.will_move(from, to, &value),
        ViewEvent::DidMove { from, to, value } => observer.did_move(from, to, &value),
        ViewEvent::WillDrop(lower) => observer.will_drop(lower),
        ViewEvent::DidDrop(lower) => observer.did_drop(lower),
        ViewEvent::WillTake(upper) => observer.will_take(upper),
        ViewEvent::DidTake(upper) => observer.did_take(upper),
        ViewEvent::WillClear => observer.will_clear(),
        ViewEvent::DidClear => observer.did_clear(),
    }
}

/// Deliver a batch in order. Callers must have released every engine borrow
/// first; observers may re-enter the engine from their hooks.
pub fn dispatch(notifications: Vec<Notification>) {
    for notification in notifications {
        deliver(notification);
    }
}
