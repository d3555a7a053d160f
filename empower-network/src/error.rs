//! Error types for the EmPower1 network module.

use thiserror::Error;

/// Main error type for the network module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Serialization of an outbound message failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An inbound frame could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Peer id is empty or refers to this node
    #[error("Invalid peer: {0}")]
    InvalidPeer(String),

    /// A reception channel was already handed out
    #[error("Receiver already taken: {0}")]
    ReceiverTaken(&'static str),

    /// Message too large
    #[error("Message too large: {size} bytes (max: {max} bytes)")]
    MessageTooLarge {
        /// encoded size
        size: usize,
        /// allowed maximum
        max: usize,
    },
}

/// A specialized `Result` type for network operations
pub type NetworkResult<T> = std::result::Result<T, NetworkError>;
