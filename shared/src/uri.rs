use thiserror::Error;

/// Errors that can occur while resolving host or node URIs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UriError {
    /// The host URI has no scheme separator
    #[error("host URI {uri:?} has no scheme")]
    MissingScheme { uri: String },

    /// The scheme is not one this client can transport
    #[error("unsupported scheme {scheme:?} in host URI {uri:?}")]
    UnsupportedScheme { scheme: String, uri: String },
}

const SCHEMES: [&str; 4] = ["warp", "warps", "ws", "wss"];

/// Canonicalize a host URI: validate the scheme and strip a trailing slash,
/// so one physical host never maps to two registry entries.
pub fn normalize_host(uri: &str) -> Result<String, UriError> {
    let Some((scheme, _rest)) = uri.split_once("://") else {
        return Err(UriError::MissingScheme {
            uri: uri.to_string(),
        });
    };
    if !SCHEMES.contains(&scheme) {
        return Err(UriError::UnsupportedScheme {
            scheme: scheme.to_string(),
            uri: uri.to_string(),
        });
    }
    Ok(uri.trim_end_matches('/').to_string())
}

/// Resolve a possibly host-relative node URI against its host.
///
/// Absolute node URIs (carrying their own scheme) pass through unchanged;
/// relative paths are rooted with a single leading slash.
pub fn resolve_node(_host_uri: &str, node_uri: &str) -> String {
    if node_uri.contains("://") {
        return node_uri.to_string();
    }
    if node_uri.starts_with('/') {
        node_uri.to_string()
    } else {
        format!("/{}", node_uri)
    }
}
