use serde::{Deserialize, Serialize};

use crate::crypto::{verify_signature, Address, Hash, KeyPair, Signature};
use crate::error::{Result, SignatureError, StructuralError};

use super::Transaction;

/// Fixed genesis timestamp, 2024-07-08T00:00:00Z in Unix nanoseconds.
pub const GENESIS_TIMESTAMP: i64 = 1_720_396_800_000_000_000;

/// Seed of the placeholder AI audit log commitment set by proposers.
pub const EMPTY_AI_AUDIT_LOG_SEED: &[u8] = b"empty_ai_audit_log";

/// Seed of the placeholder state root set by proposers.
pub const EMPTY_STATE_ROOT_SEED: &[u8] = b"empty_state_root";

/// A block in the chain.
///
/// `hash = SHA-256(header_for_signing ++ signature)`. The header covers the
/// height, timestamp, parent hash, transaction digest, proposer and AI audit
/// log; it excludes the final hash and the state root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain, genesis is 0
    pub height: u64,
    /// Unix nanoseconds
    pub timestamp: i64,
    /// Hash of the parent block, zero for genesis
    pub prev_block_hash: Hash,
    /// Included transactions in application order
    pub transactions: Vec<Transaction>,
    /// Digest of the included transaction ids as declared by the proposer
    pub tx_digest: Hash,
    /// Validator that proposed the block
    pub proposer: Address,
    /// Proposer signature over the header, absent for genesis
    pub signature: Option<Signature>,
    /// Final block hash
    pub hash: Hash,
    /// Commitment to the AI audit log
    pub ai_audit_log: Hash,
    /// Commitment to the post-application state
    pub state_root: Hash,
}

impl Block {
    /// Creates an unsigned block stamped with the current time.
    pub fn new(
        height: u64,
        prev_block_hash: Hash,
        transactions: Vec<Transaction>,
        proposer: Address,
    ) -> Self {
        let tx_digest = Self::transactions_digest(&transactions);
        Self {
            height,
            timestamp: chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            prev_block_hash,
            transactions,
            tx_digest,
            proposer,
            signature: None,
            hash: Hash::zero(),
            ai_audit_log: Hash::zero(),
            state_root: Hash::zero(),
        }
    }

    /// The genesis block. Identical on every node.
    pub fn genesis() -> Self {
        let mut block = Self::new(0, Hash::zero(), Vec::new(), Address::zero());
        block.timestamp = GENESIS_TIMESTAMP;
        block.hash = block.calculate_hash();
        block
    }

    /// SHA-256 over the concatenated transaction ids.
    pub fn transactions_digest(transactions: &[Transaction]) -> Hash {
        let mut data = Vec::with_capacity(transactions.len() * 32);
        for tx in transactions {
            data.extend_from_slice(tx.id.as_bytes());
        }
        Hash::sha256(&data)
    }

    /// Deterministic header bytes covered by the proposer signature.
    pub fn header_for_signing(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 32 * 4);
        buf.extend_from_slice(&self.height.to_be_bytes());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(self.prev_block_hash.as_bytes());
        buf.extend_from_slice(Self::transactions_digest(&self.transactions).as_bytes());
        buf.extend_from_slice(self.proposer.as_bytes());
        buf.extend_from_slice(self.ai_audit_log.as_bytes());
        buf
    }

    /// Recomputes the block hash from the header and signature.
    pub fn calculate_hash(&self) -> Hash {
        let mut data = self.header_for_signing();
        if let Some(signature) = &self.signature {
            data.extend_from_slice(signature.as_bytes());
        }
        Hash::sha256(&data)
    }

    /// Signs the header as the proposer and sets the final hash.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        if keypair.address() != self.proposer {
            return Err(SignatureError::UnauthorizedSigner(keypair.public_key.to_string()).into());
        }
        self.signature = Some(keypair.sign(&self.header_for_signing()));
        self.hash = self.calculate_hash();
        Ok(())
    }

    /// Verifies the proposer signature against the proposer address.
    pub fn verify_signature(&self) -> std::result::Result<(), SignatureError> {
        let signature = self.signature.as_ref().ok_or(SignatureError::MissingSignature)?;
        verify_signature(&self.proposer.public_key(), &self.header_for_signing(), signature)
    }

    /// Checks that the hash is set and matches the block contents.
    pub fn verify_hash(&self) -> std::result::Result<(), StructuralError> {
        if self.hash.is_zero() {
            return Err(StructuralError::MissingBlockHash);
        }
        let computed = self.calculate_hash();
        if computed != self.hash {
            return Err(StructuralError::BlockHashMismatch { hash: self.hash, computed });
        }
        Ok(())
    }

    /// Checks the declared transaction digest against the included transactions.
    pub fn verify_tx_digest(&self) -> std::result::Result<(), StructuralError> {
        let computed = Self::transactions_digest(&self.transactions);
        if computed != self.tx_digest {
            return Err(StructuralError::TransactionDigestMismatch {
                stored: self.tx_digest,
                computed,
            });
        }
        Ok(())
    }

    /// Ids of the included transactions, in block order.
    pub fn transaction_ids(&self) -> impl Iterator<Item = Hash> + '_ {
        self.transactions.iter().map(|tx| tx.id)
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a block from its wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
