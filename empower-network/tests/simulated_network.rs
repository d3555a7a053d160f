use std::sync::Arc;

use empower_network::{MessageType, SimulatedNetwork, Transport, RECEPTION_CHANNEL_CAPACITY};
use parking_lot::Mutex;

fn pair() -> (SimulatedNetwork, SimulatedNetwork) {
    let a = SimulatedNetwork::new("node-a");
    let b = SimulatedNetwork::new("node-b");
    a.connect_peer(&b).unwrap();
    b.connect_peer(&a).unwrap();
    (a, b)
}

#[tokio::test]
async fn broadcast_routes_blocks_and_transactions() {
    let (a, b) = pair();
    let mut blocks = b.take_block_receiver().unwrap();
    let mut transactions = b.take_transaction_receiver().unwrap();

    a.broadcast(MessageType::NewBlock, vec![1, 2, 3]).unwrap();
    a.broadcast(MessageType::NewTransaction, vec![4, 5]).unwrap();

    assert_eq!(blocks.recv().await.unwrap(), vec![1, 2, 3]);
    assert_eq!(transactions.recv().await.unwrap(), vec![4, 5]);
}

#[tokio::test]
async fn broadcast_does_not_loop_back() {
    let (a, _b) = pair();
    let mut own_blocks = a.take_block_receiver().unwrap();
    a.broadcast(MessageType::NewBlock, vec![9]).unwrap();
    assert!(own_blocks.try_recv().is_err());
}

#[test]
fn connect_is_idempotent_and_disconnect_stops_delivery() {
    let (a, b) = pair();
    a.connect_peer(&b).unwrap();
    assert_eq!(a.peer_ids(), vec!["node-b".to_string()]);

    let mut blocks = b.take_block_receiver().unwrap();
    assert!(a.disconnect_peer("node-b"));
    assert!(!a.disconnect_peer("node-b"));

    a.broadcast(MessageType::NewBlock, vec![1]).unwrap();
    assert!(blocks.try_recv().is_err());
}

#[test]
fn full_channel_drops_messages() {
    let (a, b) = pair();
    let mut blocks = b.take_block_receiver().unwrap();

    for i in 0..RECEPTION_CHANNEL_CAPACITY + 5 {
        a.broadcast(MessageType::NewBlock, vec![i as u8]).unwrap();
    }

    let mut received = 0;
    while blocks.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, RECEPTION_CHANNEL_CAPACITY);
}

#[test]
fn other_types_go_to_handler() {
    let (a, b) = pair();
    let seen: Arc<Mutex<Vec<(String, String, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    b.register_handler(Arc::new(move |peer: &str, message_type: &str, payload: &[u8]| {
        sink.lock().push((peer.to_string(), message_type.to_string(), payload.to_vec()));
    }));

    a.broadcast(MessageType::Other("STATUS".into()), vec![7]).unwrap();
    b.simulate_receive("node-z", "PING", vec![]);

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], ("node-a".to_string(), "STATUS".to_string(), vec![7]));
    assert_eq!(seen[1].0, "node-z");
    assert_eq!(seen[1].1, "PING");
}

#[test]
fn simulate_receive_routes_known_types() {
    let net = SimulatedNetwork::new("solo");
    let mut blocks = net.take_block_receiver().unwrap();
    let mut transactions = net.take_transaction_receiver().unwrap();

    net.simulate_receive("peer", "NEW_BLOCK", vec![1]);
    net.simulate_receive("peer", "NEW_TRANSACTION", vec![2]);
    net.simulate_receive("peer", "UNKNOWN", vec![3]);

    assert_eq!(blocks.try_recv().unwrap(), vec![1]);
    assert_eq!(transactions.try_recv().unwrap(), vec![2]);
    assert!(blocks.try_recv().is_err());
}
