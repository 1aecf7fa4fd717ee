mod link_address;
mod link_machine;

pub mod list_state;
pub mod map_state;
pub mod value_state;

pub use link_address::LinkAddress;
pub use link_machine::{process_envelope, LinkMachine, ViewId};
pub(crate) use link_machine::{push_lifecycle, push_to_host, send_command, LinkModel};

/// Which convergent container a link machine carries. The registry stores
/// this tag and rejects mismatched attachment up front.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownlinkKind {
    Event,
    Value,
    List,
    Map,
}

/// The closed link lifecycle. Orthogonal concerns (authentication) live as
/// separate flags on the host, never in this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    Linking,
    Linked,
    Syncing,
    Synced,
    Unlinking,
}

impl LinkState {
    /// Any state with an established or in-flight link.
    pub fn is_linked_family(&self) -> bool {
        !matches!(self, LinkState::Unlinked)
    }
}
