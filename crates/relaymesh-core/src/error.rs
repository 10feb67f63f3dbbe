//! Error types for the relay core.

use thiserror::Error;

/// Relay error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Discovery saw neither the Root nor any Relay network
    #[error("no uplink found: neither root '{root}' nor relay '{relay}' is visible")]
    UplinkNotFound {
        /// Root network identity that was searched for
        root: String,
        /// Relay network identity that was searched for
        relay: String,
    },

    /// The uplink connection was not established within the retry policy
    #[error("connection to '{network}' timed out after {attempts} attempt(s)")]
    ConnectionTimeout {
        /// Network the connection was attempted against
        network: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// Inbound bytes do not match the fixed wire layout
    #[error("malformed packet: expected {expected} bytes, got {actual}")]
    MalformedPacket {
        /// Wire size the codec expects
        expected: usize,
        /// Number of bytes actually received
        actual: usize,
    },

    /// A transport collaborator operation failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Link formation has not produced an identity yet
    #[error("link not established")]
    LinkNotEstablished,

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;
