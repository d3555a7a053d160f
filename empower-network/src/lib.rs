//! EmPower1 Network
//!
//! Peer transport abstraction used by the consensus engine, the message
//! envelope exchanged between peers, and an in-process simulated network.

#![forbid(unsafe_code)]

pub mod error;
pub mod message;
pub mod simulated;
pub mod transport;

pub use error::{NetworkError, NetworkResult};
pub use message::{MessageType, NetworkMessage, MAX_MESSAGE_SIZE, NEW_BLOCK, NEW_TRANSACTION};
pub use simulated::{SimulatedNetwork, RECEPTION_CHANNEL_CAPACITY};
pub use transport::{MessageHandler, PayloadReceiver, Transport};
