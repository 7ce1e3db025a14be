//! Error types shared by the discovery core and the bridge.

use thiserror::Error;

/// Lookup signal: the queried component, instance or peripheral group does
/// not exist. Enumeration stops on it; it is never reported as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("component not present")]
pub struct Absent;

/// A single publish could not be handed to the bus client.
#[derive(Debug, Error)]
#[error("publish to {topic} failed: {reason}")]
pub struct PublishError {
    pub topic: String,
    pub reason: String,
}

/// Failures of the bridge around the core (device RPC, config, transport).
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to reach {host}: {source}")]
    Rpc {
        host: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("RPC {method} returned HTTP {status}")]
    RpcStatus { method: String, status: u16 },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
