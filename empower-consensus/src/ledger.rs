//! Append-only, hash-linked block ledger.

use std::collections::HashMap;
use std::sync::Arc;

use empower_core::{Block, Hash, StructuralError};
use parking_lot::RwLock;
use tracing::info;

use crate::error::{ChainLinkageError, ConsensusError, Result};
use crate::state::UtxoState;

#[derive(Debug, Default)]
struct Chain {
    blocks: Vec<Arc<Block>>,
    by_hash: HashMap<Hash, Arc<Block>>,
}

/// Ordered sequence of committed blocks plus a hash index.
///
/// `add_block` holds the write lock across linkage checks, state application
/// and the append, so concurrent commits are serialized and a failed commit
/// leaves both the chain and the UTXO set as they were.
#[derive(Debug)]
pub struct Ledger {
    chain: RwLock<Chain>,
    state: Arc<UtxoState>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(Arc::new(UtxoState::new()))
    }
}

impl Ledger {
    /// Creates an empty ledger over `state`.
    pub fn new(state: Arc<UtxoState>) -> Self {
        Self {
            chain: RwLock::new(Chain::default()),
            state,
        }
    }

    /// Validates linkage, applies the block to the state machine and appends it.
    pub fn add_block(&self, block: Block) -> Result<()> {
        if block.hash.is_zero() {
            return Err(StructuralError::MissingBlockHash.into());
        }

        let mut chain = self.chain.write();
        let expected = chain.blocks.len() as u64;
        if block.height != expected {
            return Err(ChainLinkageError::HeightMismatch {
                expected,
                got: block.height,
            }
            .into());
        }

        let expected_prev = chain.blocks.last().map(|b| b.hash).unwrap_or_else(Hash::zero);
        if block.prev_block_hash != expected_prev {
            return Err(ChainLinkageError::PrevHashMismatch {
                height: block.height,
                expected: expected_prev,
                got: block.prev_block_hash,
            }
            .into());
        }

        self.state.apply_block(&block)?;

        let block = Arc::new(block);
        chain.by_hash.insert(block.hash, Arc::clone(&block));
        chain.blocks.push(Arc::clone(&block));
        info!(
            height = block.height,
            hash = %block.hash,
            txs = block.transactions.len(),
            "block committed"
        );
        Ok(())
    }

    /// Height of the tip, `-1` when empty.
    pub fn current_height(&self) -> i64 {
        self.chain.read().blocks.len() as i64 - 1
    }

    /// The tip block, if any.
    pub fn latest_block(&self) -> Option<Arc<Block>> {
        self.chain.read().blocks.last().cloned()
    }

    pub fn block_by_height(&self, height: u64) -> Result<Arc<Block>> {
        usize::try_from(height)
            .ok()
            .and_then(|h| self.chain.read().blocks.get(h).cloned())
            .ok_or_else(|| ConsensusError::BlockNotFound(format!("height {}", height)))
    }

    pub fn block_by_hash(&self, hash: &Hash) -> Result<Arc<Block>> {
        self.chain
            .read()
            .by_hash
            .get(hash)
            .cloned()
            .ok_or_else(|| ConsensusError::BlockNotFound(format!("hash {}", hash)))
    }

    /// Whether a block with this hash has been committed.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.chain.read().by_hash.contains_key(hash)
    }

    /// Number of committed blocks.
    pub fn len(&self) -> usize {
        self.chain.read().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.read().blocks.is_empty()
    }

    /// Snapshot of the committed blocks in height order.
    pub fn blocks(&self) -> Vec<Arc<Block>> {
        self.chain.read().blocks.clone()
    }

    /// Shared handle to the state machine for balance queries.
    pub fn state(&self) -> &Arc<UtxoState> {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empower_core::KeyPair;

    fn signed_child(parent: &Block, keypair: &KeyPair) -> Block {
        let mut block = Block::new(parent.height + 1, parent.hash, vec![], keypair.address());
        block.sign(keypair).unwrap();
        block
    }

    #[test]
    fn test_empty_ledger() {
        let ledger = Ledger::default();
        assert_eq!(ledger.current_height(), -1);
        assert!(ledger.latest_block().is_none());
        assert!(ledger.is_empty());
        assert!(matches!(ledger.block_by_height(0), Err(ConsensusError::BlockNotFound(_))));
        assert!(matches!(
            ledger.block_by_hash(&Hash::sha256(b"x")),
            Err(ConsensusError::BlockNotFound(_))
        ));
    }

    #[test]
    fn test_genesis_then_child() {
        let ledger = Ledger::default();
        let genesis = Block::genesis();
        ledger.add_block(genesis.clone()).unwrap();
        assert_eq!(ledger.current_height(), 0);

        let keypair = KeyPair::generate();
        let child = signed_child(&genesis, &keypair);
        ledger.add_block(child.clone()).unwrap();

        assert_eq!(ledger.current_height(), 1);
        assert_eq!(ledger.latest_block().unwrap().hash, child.hash);
        assert_eq!(ledger.block_by_height(1).unwrap().hash, child.hash);
        assert_eq!(ledger.block_by_hash(&genesis.hash).unwrap().height, 0);
        assert!(ledger.contains(&child.hash));
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_genesis_needs_zero_parent() {
        let ledger = Ledger::default();
        let keypair = KeyPair::generate();
        let mut block = Block::new(0, Hash::sha256(b"somewhere"), vec![], keypair.address());
        block.sign(&keypair).unwrap();
        assert!(matches!(
            ledger.add_block(block),
            Err(ConsensusError::ChainLinkage(ChainLinkageError::PrevHashMismatch { height: 0, .. }))
        ));
        assert_eq!(ledger.current_height(), -1);
    }

    #[test]
    fn test_wrong_parent_rejected() {
        let ledger = Ledger::default();
        ledger.add_block(Block::genesis()).unwrap();

        let keypair = KeyPair::generate();
        let mut orphan = Block::new(1, Hash::sha256(b"unknown parent"), vec![], keypair.address());
        orphan.sign(&keypair).unwrap();
        assert!(matches!(
            ledger.add_block(orphan),
            Err(ConsensusError::ChainLinkage(ChainLinkageError::PrevHashMismatch { height: 1, .. }))
        ));
        assert_eq!(ledger.current_height(), 0);
    }

    #[test]
    fn test_missing_hash_is_structural() {
        let ledger = Ledger::default();
        let unsigned = Block::new(0, Hash::zero(), vec![], KeyPair::generate().address());
        assert_eq!(
            ledger.add_block(unsigned),
            Err(ConsensusError::Structural(StructuralError::MissingBlockHash))
        );
    }
}
