use std::time::Duration;

use super::Instant;

/// A one-shot poll timer.
///
/// Timers carry no callback: the owning entity checks `ringing` during its
/// tick and performs the due work itself. Dropping the owner drops (and so
/// cancels) every timer it holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    ringing_at: Instant,
}

impl Timer {
    pub fn new(now: &Instant, duration: Duration) -> Self {
        Self {
            ringing_at: now.add_duration(duration),
        }
    }

    pub fn ringing(&self, now: &Instant) -> bool {
        *now >= self.ringing_at
    }

    pub fn reset(&mut self, now: &Instant, duration: Duration) {
        self.ringing_at = now.add_duration(duration);
    }
}
