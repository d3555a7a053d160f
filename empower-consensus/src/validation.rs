//! Pre-commit block acceptance checks.
//!
//! The ledger only checks linkage and state application; everything about
//! who may propose a block and whether its contents are intact is checked
//! here, before the block reaches [`crate::Ledger::add_block`].

use std::sync::Arc;

use empower_core::Block;
use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::validators::ValidatorRegistry;

pub struct ValidationService {
    registry: Arc<ValidatorRegistry>,
}

impl ValidationService {
    pub fn new(registry: Arc<ValidatorRegistry>) -> Self {
        Self { registry }
    }

    /// Checks, in order: the block hash, proposer membership, the proposer
    /// signature, the leader schedule, the transaction digest, then every
    /// transaction's id and signatures.
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        block.verify_hash()?;

        if !self.registry.is_validator(&block.proposer) {
            return Err(ValidationError::UnknownProposer(block.proposer).into());
        }

        block.verify_signature()?;

        let expected = self.registry.leader_for_height(block.height)?;
        if expected != block.proposer {
            return Err(ValidationError::NotScheduledLeader {
                height: block.height,
                expected,
                got: block.proposer,
            }
            .into());
        }

        block.verify_tx_digest()?;
        for tx in &block.transactions {
            tx.verify()?;
        }

        debug!(height = block.height, hash = %block.hash, "block passed validation");
        Ok(())
    }
}
