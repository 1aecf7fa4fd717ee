use crate::value::Value;

/// Addressing shared by every lane-scoped envelope kind.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneAddressed {
    pub node_uri: String,
    pub lane_uri: String,
    pub body: Value,
}

/// Link negotiation envelopes additionally carry priority and rate hints.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkAddressed {
    pub node_uri: String,
    pub lane_uri: String,
    pub prio: f32,
    pub rate: f32,
    pub body: Value,
}

/// Auth envelopes address the whole host, not a lane.
#[derive(Debug, Clone, PartialEq)]
pub struct HostAddressed {
    pub body: Value,
}

/// Discriminant used for routing decisions and log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Event,
    Command,
    Link,
    Linked,
    Sync,
    Synced,
    Unlink,
    Unlinked,
    Auth,
    Authed,
    Deauth,
    Deauthed,
}

/// One WARP protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Event(LaneAddressed),
    Command(LaneAddressed),
    Link(LinkAddressed),
    Linked(LinkAddressed),
    Sync(LinkAddressed),
    Synced(LinkAddressed),
    Unlink(LaneAddressed),
    Unlinked(LaneAddressed),
    Auth(HostAddressed),
    Authed(HostAddressed),
    Deauth(HostAddressed),
    Deauthed(HostAddressed),
}

impl Envelope {
    pub fn event(node_uri: impl Into<String>, lane_uri: impl Into<String>, body: Value) -> Self {
        Envelope::Event(LaneAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            body,
        })
    }

    pub fn command(node_uri: impl Into<String>, lane_uri: impl Into<String>, body: Value) -> Self {
        Envelope::Command(LaneAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            body,
        })
    }

    pub fn link(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Envelope::Link(LinkAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            prio: 0.0,
            rate: 0.0,
            body: Value::Absent,
        })
    }

    pub fn linked(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Envelope::Linked(LinkAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            prio: 0.0,
            rate: 0.0,
            body: Value::Absent,
        })
    }

    pub fn sync(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Envelope::Sync(LinkAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            prio: 0.0,
            rate: 0.0,
            body: Value::Absent,
        })
    }

    pub fn synced(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Envelope::Synced(LinkAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            prio: 0.0,
            rate: 0.0,
            body: Value::Absent,
        })
    }

    pub fn unlink(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Envelope::Unlink(LaneAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            body: Value::Absent,
        })
    }

    pub fn unlinked(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Envelope::Unlinked(LaneAddressed {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
            body: Value::Absent,
        })
    }

    pub fn auth(body: Value) -> Self {
        Envelope::Auth(HostAddressed { body })
    }

    pub fn authed(body: Value) -> Self {
        Envelope::Authed(HostAddressed { body })
    }

    pub fn deauth(body: Value) -> Self {
        Envelope::Deauth(HostAddressed { body })
    }

    pub fn deauthed(body: Value) -> Self {
        Envelope::Deauthed(HostAddressed { body })
    }

    pub fn with_prio_rate(mut self, prio: f32, rate: f32) -> Self {
        match &mut self {
            Envelope::Link(inner)
            | Envelope::Linked(inner)
            | Envelope::Sync(inner)
            | Envelope::Synced(inner) => {
                inner.prio = prio;
                inner.rate = rate;
            }
            _ => {}
        }
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        match &mut self {
            Envelope::Event(inner)
            | Envelope::Command(inner)
            | Envelope::Unlink(inner)
            | Envelope::Unlinked(inner) => inner.body = body,
            Envelope::Link(inner)
            | Envelope::Linked(inner)
            | Envelope::Sync(inner)
            | Envelope::Synced(inner) => inner.body = body,
            Envelope::Auth(inner)
            | Envelope::Authed(inner)
            | Envelope::Deauth(inner)
            | Envelope::Deauthed(inner) => inner.body = body,
        }
        self
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Event(_) => EnvelopeKind::Event,
            Envelope::Command(_) => EnvelopeKind::Command,
            Envelope::Link(_) => EnvelopeKind::Link,
            Envelope::Linked(_) => EnvelopeKind::Linked,
            Envelope::Sync(_) => EnvelopeKind::Sync,
            Envelope::Synced(_) => EnvelopeKind::Synced,
            Envelope::Unlink(_) => EnvelopeKind::Unlink,
            Envelope::Unlinked(_) => EnvelopeKind::Unlinked,
            Envelope::Auth(_) => EnvelopeKind::Auth,
            Envelope::Authed(_) => EnvelopeKind::Authed,
            Envelope::Deauth(_) => EnvelopeKind::Deauth,
            Envelope::Deauthed(_) => EnvelopeKind::Deauthed,
        }
    }

    /// `None` for the host-addressed auth kinds.
    pub fn node_uri(&self) -> Option<&str> {
        match self {
            Envelope::Event(inner)
            | Envelope::Command(inner)
            | Envelope::Unlink(inner)
            | Envelope::Unlinked(inner) => Some(&inner.node_uri),
            Envelope::Link(inner)
            | Envelope::Linked(inner)
            | Envelope::Sync(inner)
            | Envelope::Synced(inner) => Some(&inner.node_uri),
            _ => None,
        }
    }

    /// `None` for the host-addressed auth kinds.
    pub fn lane_uri(&self) -> Option<&str> {
        match self {
            Envelope::Event(inner)
            | Envelope::Command(inner)
            | Envelope::Unlink(inner)
            | Envelope::Unlinked(inner) => Some(&inner.lane_uri),
            Envelope::Link(inner)
            | Envelope::Linked(inner)
            | Envelope::Sync(inner)
            | Envelope::Synced(inner) => Some(&inner.lane_uri),
            _ => None,
        }
    }

    pub fn body(&self) -> &Value {
        match self {
            Envelope::Event(inner)
            | Envelope::Command(inner)
            | Envelope::Unlink(inner)
            | Envelope::Unlinked(inner) => &inner.body,
            Envelope::Link(inner)
            | Envelope::Linked(inner)
            | Envelope::Sync(inner)
            | Envelope::Synced(inner) => &inner.body,
            Envelope::Auth(inner)
            | Envelope::Authed(inner)
            | Envelope::Deauth(inner)
            | Envelope::Deauthed(inner) => &inner.body,
        }
    }
}
