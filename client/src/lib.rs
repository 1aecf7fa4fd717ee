//! # Warp Client
//! A multiplexed client for the WARP pub/sub protocol: any number of
//! downlink views share per-lane link state machines, which in turn share
//! per-host connections with automatic reconnect, authentication replay,
//! and idle teardown.
//!
//! The engine is single-threaded and poll-driven. The embedding application
//! supplies a [`Connector`] for the physical transport and calls
//! [`WarpClient::tick`] regularly with the current instant; every timer,
//! transport event, and observer callback fires from inside that call.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

mod client;
mod client_config;
mod connection;
mod downlink;
mod error;
mod link;
mod transport;

pub use client::{DownlinkOptions, WarpClient};
pub use client_config::ClientConfig;
pub use connection::{Backoff, HostConnection, SendBuffer};
pub use downlink::{
    DownlinkObserver, DownlinkView, EventDownlink, ListDownlink, MapDownlink, SharedObserver,
    ValueDownlink, ViewEvent,
};
pub use error::ClientError;
pub use link::{DownlinkKind, LinkAddress, LinkState};
pub use transport::{Channel, ChannelEvent, Connector, SendError};
