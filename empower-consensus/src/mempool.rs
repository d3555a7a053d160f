use std::collections::HashMap;

use empower_core::{Hash, StructuralError, Transaction};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{ConsensusError, Result};

/// Source of candidate transactions for proposals.
pub trait TransactionPool: Send + Sync {
    /// Adds a transaction. Rejects transactions without an id and exact-id
    /// duplicates.
    fn add_transaction(&self, tx: Transaction) -> Result<()>;

    /// Up to `limit` pooled transactions, all of them when `limit` is 0.
    /// Selection order is unspecified.
    fn get_transactions(&self, limit: usize) -> Vec<Transaction>;

    /// Drops a transaction. Returns it if it was pooled.
    fn remove_transaction(&self, id: &Hash) -> Option<Transaction>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Represents the node's transaction memory pool.
/// It stores unconfirmed transactions that are waiting to be included in a block.
#[derive(Debug, Default)]
pub struct Mempool {
    transactions: RwLock<HashMap<Hash, Transaction>>,
}

impl Mempool {
    /// Creates a new empty Mempool.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &Hash) -> bool {
        self.transactions.read().contains_key(id)
    }

    pub fn get_transaction(&self, id: &Hash) -> Option<Transaction> {
        self.transactions.read().get(id).cloned()
    }

    pub fn clear(&self) {
        self.transactions.write().clear();
    }
}

impl TransactionPool for Mempool {
    fn add_transaction(&self, tx: Transaction) -> Result<()> {
        if tx.id.is_zero() {
            return Err(StructuralError::MissingTransactionId.into());
        }
        let mut transactions = self.transactions.write();
        if transactions.contains_key(&tx.id) {
            return Err(ConsensusError::DuplicateTransaction(tx.id));
        }
        info!(tx_id = %tx.id, tx_type = %tx.tx_type, "transaction added to mempool");
        transactions.insert(tx.id, tx);
        Ok(())
    }

    fn get_transactions(&self, limit: usize) -> Vec<Transaction> {
        let transactions = self.transactions.read();
        let take = if limit == 0 { transactions.len() } else { limit };
        transactions.values().take(take).cloned().collect()
    }

    fn remove_transaction(&self, id: &Hash) -> Option<Transaction> {
        let removed = self.transactions.write().remove(id);
        if removed.is_some() {
            debug!(tx_id = %id, "transaction removed from mempool");
        }
        removed
    }

    fn len(&self) -> usize {
        self.transactions.read().len()
    }
}
