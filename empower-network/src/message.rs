//! Network message envelope and serialization

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NetworkError, NetworkResult};

/// Maximum size of an encoded message in bytes (32MB)
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

/// Tag of a freshly proposed block.
pub const NEW_BLOCK: &str = "NEW_BLOCK";

/// Tag of a newly submitted transaction.
pub const NEW_TRANSACTION: &str = "NEW_TRANSACTION";

/// Message type tag. Unknown tags are kept verbatim and routed to the
/// registered handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Encoded block
    NewBlock,
    /// Encoded transaction
    NewTransaction,
    /// Any other message kind
    Other(String),
}

impl MessageType {
    /// Wire tag of the message type.
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::NewBlock => NEW_BLOCK,
            MessageType::NewTransaction => NEW_TRANSACTION,
            MessageType::Other(tag) => tag,
        }
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        match tag {
            NEW_BLOCK => MessageType::NewBlock,
            NEW_TRANSACTION => MessageType::NewTransaction,
            other => MessageType::Other(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            NEW_BLOCK => MessageType::NewBlock,
            NEW_TRANSACTION => MessageType::NewTransaction,
            _ => MessageType::Other(tag),
        }
    }
}

impl From<MessageType> for String {
    fn from(message_type: MessageType) -> Self {
        match message_type {
            MessageType::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope exchanged between peers: a type tag plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    /// Type tag
    pub message_type: MessageType,
    /// Encoded block, transaction or other payload
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl NetworkMessage {
    /// Creates a new envelope.
    pub fn new(message_type: impl Into<MessageType>, payload: Vec<u8>) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }

    /// Encodes the envelope into a frame.
    pub fn encode(&self) -> NetworkResult<Vec<u8>> {
        let frame = bincode::serialize(self).map_err(|e| NetworkError::Serialization(e.to_string()))?;
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: frame.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        Ok(frame)
    }

    /// Decodes an envelope from a frame.
    pub fn decode(frame: &[u8]) -> NetworkResult<Self> {
        if frame.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge {
                size: frame.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }
        bincode::deserialize(frame).map_err(|e| NetworkError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_tags() {
        assert_eq!(MessageType::from("NEW_BLOCK"), MessageType::NewBlock);
        assert_eq!(MessageType::from("NEW_TRANSACTION"), MessageType::NewTransaction);
        assert_eq!(
            MessageType::from("PING"),
            MessageType::Other("PING".to_string())
        );
        assert_eq!(MessageType::NewBlock.to_string(), "NEW_BLOCK");
        assert_eq!(String::from(MessageType::Other("X".into())), "X");
    }

    #[test]
    fn test_envelope_frame() {
        let message = NetworkMessage::new(MessageType::NewTransaction, vec![1, 2, 3]);
        let frame = message.encode().unwrap();
        assert_eq!(NetworkMessage::decode(&frame).unwrap(), message);

        let other = NetworkMessage::new("STATUS", vec![]);
        let decoded = NetworkMessage::decode(&other.encode().unwrap()).unwrap();
        assert_eq!(decoded.message_type, MessageType::Other("STATUS".into()));
    }

    #[test]
    fn test_truncated_frame_is_decode_error() {
        let frame = NetworkMessage::new(MessageType::NewBlock, vec![7; 16]).encode().unwrap();
        let result = NetworkMessage::decode(&frame[..frame.len() - 4]);
        assert!(matches!(result, Err(NetworkError::Decode(_))));
    }
}
