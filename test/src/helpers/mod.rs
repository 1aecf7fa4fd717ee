pub mod mock_socket;

pub use mock_socket::MockTransport;
pub use recorder::Recorder;
