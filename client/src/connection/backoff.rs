use std::time::Duration;

use rand::Rng;

/// Exponential reconnect backoff with a jittered first delay.
///
/// The first delay is drawn uniformly from `[min, 3 * min)` so a fleet of
/// clients does not reconnect in lockstep; each subsequent delay is the
/// previous one scaled by `factor`, capped at `max`. A successful connect
/// resets the backoff to its initial unset state.
#[derive(Debug, Clone)]
pub struct Backoff {
    delay: Option<Duration>,
    min: Duration,
    max: Duration,
    factor: f64,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            delay: None,
            min,
            max,
            factor,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let next = match self.delay {
            None => {
                let min_ms = self.min.as_millis().max(1) as u64;
                Duration::from_millis(rand::thread_rng().gen_range(min_ms..min_ms * 3))
            }
            Some(previous) => previous.mul_f64(self.factor).min(self.max),
        };
        self.delay = Some(next);
        next
    }

    pub fn reset(&mut self) {
        self.delay = None;
    }

    pub fn is_waiting(&self) -> bool {
        self.delay.is_some()
    }
}
