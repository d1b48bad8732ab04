/// Error taxonomy for the session core
use std::path::PathBuf;
use std::time::Duration;

use crate::core::lobby::ConnectionStatus;

/// Failures while establishing or running the peer connection.
/// All of them are terminal for the attempt; nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid peer id '{id}': {reason}")]
    InvalidPeerId { id: String, reason: String },

    #[error("connection manager is {status:?}, expected Advertising")]
    NotAdvertising { status: ConnectionStatus },

    #[error("failed to bind local endpoint: {reason}")]
    Bind { reason: String },

    #[error("transport failure: {reason}")]
    Transport { reason: String },

    #[error("handshake failed: {reason}")]
    Handshake { reason: String },

    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("endpoint closed before a peer connected")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ConnectionError {
    pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        ConnectionError::Transport {
            reason: format!("{context}: {err}"),
        }
    }

    pub(crate) fn handshake(reason: impl Into<String>) -> Self {
        ConnectionError::Handshake {
            reason: reason.into(),
        }
    }
}

/// Framing and codec failures on the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("stream i/o failed")]
    Io(#[from] std::io::Error),

    #[error("malformed message")]
    Decode(#[source] serde_json::Error),

    #[error("unencodable message")]
    Encode(#[source] serde_json::Error),

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
}

/// Failures of the local game record store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record store i/o failed at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record store is corrupt")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}
