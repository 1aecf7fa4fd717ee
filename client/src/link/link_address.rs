/// The (node, lane) half of a link's identity; the host half is implied by
/// the connection that owns the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkAddress {
    pub node_uri: String,
    pub lane_uri: String,
}

impl LinkAddress {
    pub fn new(node_uri: impl Into<String>, lane_uri: impl Into<String>) -> Self {
        Self {
            node_uri: node_uri.into(),
            lane_uri: lane_uri.into(),
        }
    }
}
