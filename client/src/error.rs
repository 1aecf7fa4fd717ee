use thiserror::Error;

use warp_shared::{CodecError, UriError};

use crate::link::DownlinkKind;

/// Errors surfaced synchronously by engine entry points.
///
/// Transport failures are deliberately absent: they are never returned, only
/// delivered to views through `did_fail` notifications alongside an
/// automatic recovery action (reconnect or host close).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// A link machine is already registered for this (node, lane) pair
    #[error("link already registered for node {node_uri:?}, lane {lane_uri:?}")]
    DuplicateLink { node_uri: String, lane_uri: String },

    /// A view of one downlink kind was attached to a machine of another
    #[error("downlink kind mismatch: requested {expected:?}, but the existing link is {found:?}")]
    TypeMismatch {
        expected: DownlinkKind,
        found: DownlinkKind,
    },

    /// A stateful downlink was mutated before it ever linked
    #[error("downlink has never linked; open it and wait for the link before mutating state")]
    NotOpen,

    /// The disconnected send buffer is full
    #[error("send buffer full ({capacity} envelopes) while disconnected")]
    BufferOverflow { capacity: usize },

    /// The host connection backing this operation has been torn down
    #[error("host connection has been closed")]
    HostClosed,

    /// Host or node URI failed to resolve
    #[error("uri error: {0}")]
    Uri(#[from] UriError),

    /// Envelope text failed to parse
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
