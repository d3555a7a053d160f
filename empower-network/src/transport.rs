//! Transport abstraction consumed by the consensus engine.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::NetworkResult;
use crate::message::MessageType;

/// Callback for message types that have no dedicated reception channel.
/// Arguments are the sending peer id, the type tag and the payload.
pub type MessageHandler = Arc<dyn Fn(&str, &str, &[u8]) + Send + Sync>;

/// Receiving end of a reception channel carrying raw encoded payloads.
pub type PayloadReceiver = mpsc::Receiver<Vec<u8>>;

/// A message fan-out. Implementations deliver opaque payloads to peers and
/// surface inbound payloads through reception channels.
pub trait Transport: Send + Sync {
    /// Sends `payload` tagged with `message_type` to every connected peer.
    /// Delivery is best effort.
    fn broadcast(&self, message_type: MessageType, payload: Vec<u8>) -> NetworkResult<()>;

    /// Hands out the inbound block channel. Only the first call succeeds.
    fn take_block_receiver(&self) -> NetworkResult<PayloadReceiver>;

    /// Hands out the inbound transaction channel. Only the first call succeeds.
    fn take_transaction_receiver(&self) -> NetworkResult<PayloadReceiver>;

    /// Registers the handler for message types other than blocks and transactions.
    fn register_handler(&self, handler: MessageHandler);
}
