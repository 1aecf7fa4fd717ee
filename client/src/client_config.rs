use std::time::Duration;

/// Knobs governing host connection and link machine lifecycles.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Maximum number of command envelopes buffered while disconnected.
    /// Exceeding it surfaces `BufferOverflow` to the offending push.
    pub send_buffer_capacity: usize,
    /// Lower bound of the first reconnect delay. The first delay is drawn
    /// uniformly from `[min, 3 * min)`.
    pub min_reconnect_delay: Duration,
    /// Upper bound on any reconnect delay.
    pub max_reconnect_delay: Duration,
    /// Multiplier applied to the previous reconnect delay.
    pub reconnect_backoff_factor: f64,
    /// Grace period before an unused, connected host closes its transport.
    pub idle_timeout: Duration,
    /// Grace period between the last view detaching and the machine
    /// unlinking. Negative means unlink immediately and synchronously.
    pub unlink_delay_millis: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            send_buffer_capacity: 1024,
            min_reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(30),
            reconnect_backoff_factor: 1.8,
            idle_timeout: Duration::from_secs(1),
            unlink_delay_millis: 0,
        }
    }
}
