//! In-process simulated network.
//!
//! Each [`SimulatedNetwork`] is one node. Connecting to a peer adds it to the
//! node's fan-out list; broadcasts encode a [`NetworkMessage`] frame and hand
//! it to every peer, which decodes and routes it into its own reception
//! channels. Full channels drop the message.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, info_span, warn, Span};

use crate::error::{NetworkError, NetworkResult};
use crate::message::{MessageType, NetworkMessage};
use crate::transport::{MessageHandler, PayloadReceiver, Transport};

/// Capacity of each reception channel.
pub const RECEPTION_CHANNEL_CAPACITY: usize = 100;

const DEFAULT_NODE_ID: &str = "default_sim_node";

struct Inner {
    node_id: String,
    span: Span,
    peers: RwLock<HashMap<String, Weak<Inner>>>,
    handler: RwLock<Option<MessageHandler>>,
    block_tx: mpsc::Sender<Vec<u8>>,
    block_rx: Mutex<Option<PayloadReceiver>>,
    transaction_tx: mpsc::Sender<Vec<u8>>,
    transaction_rx: Mutex<Option<PayloadReceiver>>,
}

/// Handle to one simulated node. Clones share the same node.
#[derive(Clone)]
pub struct SimulatedNetwork {
    inner: Arc<Inner>,
}

impl SimulatedNetwork {
    /// Creates a node. An empty id falls back to a default.
    pub fn new(node_id: impl Into<String>) -> Self {
        let mut node_id = node_id.into();
        if node_id.is_empty() {
            node_id = DEFAULT_NODE_ID.to_string();
        }
        let span = info_span!("simnet", node = %node_id);
        let (block_tx, block_rx) = mpsc::channel(RECEPTION_CHANNEL_CAPACITY);
        let (transaction_tx, transaction_rx) = mpsc::channel(RECEPTION_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                node_id,
                span,
                peers: RwLock::new(HashMap::new()),
                handler: RwLock::new(None),
                block_tx,
                block_rx: Mutex::new(Some(block_rx)),
                transaction_tx,
                transaction_rx: Mutex::new(Some(transaction_rx)),
            }),
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Adds `peer` to this node's fan-out. Connecting twice is a no-op.
    pub fn connect_peer(&self, peer: &SimulatedNetwork) -> NetworkResult<()> {
        let peer_id = peer.node_id();
        if Arc::ptr_eq(&self.inner, &peer.inner) || peer_id == self.node_id() {
            return Err(NetworkError::InvalidPeer(format!(
                "{} cannot connect to itself",
                self.node_id()
            )));
        }
        let mut peers = self.inner.peers.write();
        if peers.contains_key(peer_id) {
            return Ok(());
        }
        peers.insert(peer_id.to_string(), Arc::downgrade(&peer.inner));
        info!(parent: &self.inner.span, peer = peer_id, "connected to peer");
        Ok(())
    }

    /// Removes a peer. Returns false if it was not connected.
    pub fn disconnect_peer(&self, peer_id: &str) -> bool {
        let removed = self.inner.peers.write().remove(peer_id).is_some();
        if removed {
            info!(parent: &self.inner.span, peer = peer_id, "disconnected from peer");
        } else {
            debug!(parent: &self.inner.span, peer = peer_id, "peer not found for disconnection");
        }
        removed
    }

    /// Ids of connected peers, sorted.
    pub fn peer_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.peers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Routes a message as if `peer_id` had sent it to this node.
    pub fn simulate_receive(&self, peer_id: &str, message_type: &str, payload: Vec<u8>) {
        debug!(
            parent: &self.inner.span,
            peer = peer_id,
            message_type,
            size = payload.len(),
            "simulating message reception"
        );
        self.inner.route(peer_id, NetworkMessage::new(message_type, payload));
    }
}

impl Inner {
    fn receive_frame(&self, from: &str, frame: &[u8]) {
        match NetworkMessage::decode(frame) {
            Ok(message) => self.route(from, message),
            Err(e) => warn!(parent: &self.span, peer = from, error = %e, "dropping undecodable frame"),
        }
    }

    fn route(&self, from: &str, message: NetworkMessage) {
        let (channel, label) = match &message.message_type {
            MessageType::NewBlock => (&self.block_tx, "block"),
            MessageType::NewTransaction => (&self.transaction_tx, "transaction"),
            MessageType::Other(tag) => {
                let handler = self.handler.read().clone();
                match handler {
                    Some(handler) => handler(from, tag, &message.payload),
                    None => warn!(
                        parent: &self.span,
                        peer = from,
                        message_type = %tag,
                        "no handler registered, message dropped"
                    ),
                }
                return;
            }
        };

        match channel.try_send(message.payload) {
            Ok(()) => debug!(parent: &self.span, peer = from, "routed {} payload", label),
            Err(TrySendError::Full(_)) => {
                warn!(parent: &self.span, peer = from, "{} channel full, message dropped", label)
            }
            Err(TrySendError::Closed(_)) => {
                debug!(parent: &self.span, peer = from, "{} channel closed, message dropped", label)
            }
        }
    }
}

impl Transport for SimulatedNetwork {
    fn broadcast(&self, message_type: MessageType, payload: Vec<u8>) -> NetworkResult<()> {
        let message = NetworkMessage::new(message_type, payload);
        let frame = message.encode()?;

        let peers: Vec<(String, Arc<Inner>)> = {
            let mut peers = self.inner.peers.write();
            // forget peers whose node has been dropped
            peers.retain(|_, peer| peer.strong_count() > 0);
            peers
                .iter()
                .filter_map(|(id, peer)| peer.upgrade().map(|p| (id.clone(), p)))
                .collect()
        };

        info!(
            parent: &self.inner.span,
            message_type = %message.message_type,
            size = message.payload.len(),
            peers = peers.len(),
            "broadcasting"
        );
        for (_, peer) in peers {
            peer.receive_frame(&self.inner.node_id, &frame);
        }
        Ok(())
    }

    fn take_block_receiver(&self) -> NetworkResult<PayloadReceiver> {
        self.inner
            .block_rx
            .lock()
            .take()
            .ok_or(NetworkError::ReceiverTaken("block"))
    }

    fn take_transaction_receiver(&self) -> NetworkResult<PayloadReceiver> {
        self.inner
            .transaction_rx
            .lock()
            .take()
            .ok_or(NetworkError::ReceiverTaken("transaction"))
    }

    fn register_handler(&self, handler: MessageHandler) {
        *self.inner.handler.write() = Some(handler);
        info!(parent: &self.inner.span, "message handler registered");
    }
}
