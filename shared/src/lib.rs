//! # Warp Shared
//! The value model, envelope codec, and timing backends shared by the
//! warp-client protocol engine and its test harness.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod backends;
mod codec;
mod envelope;
mod uri;
mod value;

pub use backends::{Instant, Timer};
pub use codec::{write_value, CodecError};
pub use envelope::{Envelope, EnvelopeKind, HostAddressed, LaneAddressed, LinkAddressed};
pub use uri::{normalize_host, resolve_node, UriError};
pub use value::{Item, Value, ABSENT};
