//! The physical transport seam.
//!
//! The engine consumes transports purely through these traits; the crate
//! ships no concrete implementation (WebSocket and worker-proxy transports
//! live with the embedding application, the test harness provides a mock).

/// Returned when the underlying channel rejects a send.
pub struct SendError;

/// One I/O completion observed on a channel. These four events are the
/// engine's only suspension points besides timers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(String),
    Closed,
    Error(String),
}

/// A bidirectional text channel to one remote host.
pub trait Channel {
    fn send(&mut self, text: &str) -> Result<(), SendError>;
    /// Drain the next pending event, if any. Polled during the host tick.
    fn poll(&mut self) -> Option<ChannelEvent>;
    fn close(&mut self);
}

/// Opens channels. Shared between the client registry and every host
/// connection so hosts can reconnect autonomously.
pub trait Connector {
    fn connect(&self, host_uri: &str) -> Box<dyn Channel>;
}
