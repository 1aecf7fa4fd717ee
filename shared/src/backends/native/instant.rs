use std::sync::OnceLock;
use std::time::Duration;

static EPOCH: OnceLock<std::time::Instant> = OnceLock::new();

/// A monotonic instant measured from a process-local epoch.
///
/// Engine entry points take `now: &Instant` explicitly instead of sampling
/// the clock internally, so tests can drive time deterministically with
/// [`Instant::add_millis`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant {
    micros: u64,
}

impl Instant {
    /// The current wall-driven instant.
    pub fn now() -> Self {
        let epoch = EPOCH.get_or_init(std::time::Instant::now);
        Self {
            micros: epoch.elapsed().as_micros() as u64,
        }
    }

    pub fn add_millis(&self, millis: u64) -> Self {
        Self {
            micros: self.micros + millis * 1_000,
        }
    }

    pub fn add_duration(&self, duration: Duration) -> Self {
        Self {
            micros: self.micros + duration.as_micros() as u64,
        }
    }

    /// Saturating duration since an earlier instant.
    pub fn duration_since(&self, earlier: &Instant) -> Duration {
        Duration::from_micros(self.micros.saturating_sub(earlier.micros))
    }
}
