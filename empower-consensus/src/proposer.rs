//! Block proposal construction.

use std::sync::Arc;

use empower_core::{Address, Block, Hash, KeyPair, EMPTY_AI_AUDIT_LOG_SEED, EMPTY_STATE_ROOT_SEED};
use tracing::{info, warn};

use crate::error::{ConsensusError, Result};
use crate::mempool::TransactionPool;
use crate::state::UtxoState;

/// Builds and signs blocks for the local validator.
pub struct ProposerService {
    keypair: KeyPair,
    pool: Arc<dyn TransactionPool>,
    state: Arc<UtxoState>,
    max_transactions: usize,
}

impl ProposerService {
    pub fn new(
        keypair: KeyPair,
        pool: Arc<dyn TransactionPool>,
        state: Arc<UtxoState>,
        max_transactions: usize,
    ) -> Self {
        Self {
            keypair,
            pool,
            state,
            max_transactions,
        }
    }

    /// Address the service signs as.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    /// Assembles a signed block at `height` on top of `prev_hash`.
    ///
    /// Up to `max_transactions` candidates are pulled from the pool. A
    /// candidate that fails [`empower_core::Transaction::verify`], or that would not apply
    /// on the current UTXO set, is left out and evicted from the pool so it
    /// cannot block later proposals.
    pub fn create_proposal(&self, height: u64, prev_hash: Hash, proposer: Address) -> Result<Block> {
        if proposer != self.keypair.address() {
            return Err(ConsensusError::ProposerKeyMismatch(proposer));
        }

        let mut candidates = Vec::new();
        for tx in self.pool.get_transactions(self.max_transactions) {
            match tx.verify() {
                Ok(()) => candidates.push(tx),
                Err(e) => {
                    warn!(tx_id = %tx.id, error = %e, "evicting unverifiable transaction");
                    self.pool.remove_transaction(&tx.id);
                }
            }
        }

        let (transactions, rejected) = self.state.filter_applicable(candidates);
        for (tx, e) in rejected {
            warn!(tx_id = %tx.id, error = %e, "evicting inapplicable transaction");
            self.pool.remove_transaction(&tx.id);
        }

        let mut block = Block::new(height, prev_hash, transactions, proposer);
        block.ai_audit_log = Hash::sha256(EMPTY_AI_AUDIT_LOG_SEED);
        block.state_root = Hash::sha256(EMPTY_STATE_ROOT_SEED);
        block.sign(&self.keypair)?;

        info!(
            height,
            hash = %block.hash,
            txs = block.transactions.len(),
            "created block proposal"
        );
        Ok(block)
    }
}
