mod native;

pub use native::{Instant, Timer};
