mod backoff;
mod host_connection;
mod send_buffer;

pub use backoff::Backoff;
pub use host_connection::{HostConnection, TickAction};
pub use send_buffer::SendBuffer;
