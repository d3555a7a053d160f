//! Consensus error taxonomy.

use std::time::Duration;

use empower_core::{Address, Hash, OutPoint, PubKeyHash, SignatureError, StructuralError};
use empower_network::NetworkError;
use thiserror::Error;

use crate::engine::EngineState;

/// Height or parent hash does not extend the current tip. Fatal to that
/// `add_block` call; the ledger does not try to resolve it.
#[derive(Debug, PartialEq, Eq, Error, Clone)]
pub enum ChainLinkageError {
    #[error("invalid block height: expected {expected}, got {got}")]
    HeightMismatch { expected: u64, got: u64 },

    #[error("invalid previous hash at height {height}: expected {expected}, got {got}")]
    PrevHashMismatch { height: u64, expected: Hash, got: Hash },
}

/// A transaction cannot be applied to the UTXO set. Fatal to the whole block.
#[derive(Debug, PartialEq, Eq, Error, Clone)]
pub enum StateTransitionError {
    #[error("input UTXO {outpoint} for tx {tx_id} not found")]
    UtxoNotFound { outpoint: OutPoint, tx_id: Hash },

    #[error("output UTXO {outpoint} for tx {tx_id} already exists")]
    DuplicateOutput { outpoint: OutPoint, tx_id: Hash },

    #[error("standard transaction {0} has no inputs")]
    EmptyInputs(Hash),
}

/// Consensus-specific block acceptance failures.
#[derive(Debug, PartialEq, Eq, Error, Clone)]
pub enum ValidationError {
    #[error("proposer {0} is not a known validator")]
    UnknownProposer(Address),

    #[error("proposer {got} is not the scheduled leader for height {height} (expected {expected})")]
    NotScheduledLeader { height: u64, expected: Address, got: Address },
}

#[derive(Debug, PartialEq, Eq, Error, Clone)]
pub enum ConsensusError {
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    #[error("Chain linkage error: {0}")]
    ChainLinkage(#[from] ChainLinkageError),

    #[error("State transition error: {0}")]
    StateTransition(#[from] StateTransitionError),

    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    #[error("Block validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transport decode error: {0}")]
    TransportDecode(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Insufficient funds for {owner}: needed {needed}, found {found}")]
    InsufficientFunds { owner: PubKeyHash, needed: u64, found: u64 },

    #[error("Transaction {0} already in pool")]
    DuplicateTransaction(Hash),

    #[error("No validators registered")]
    NoValidators,

    #[error("Validator {0} already registered")]
    DuplicateValidator(Address),

    #[error("Signing key does not match proposer address {0}")]
    ProposerKeyMismatch(Address),

    #[error("Engine cannot start from state {0:?}")]
    EngineNotIdle(EngineState),

    #[error("{step} step timed out after {after:?}")]
    StepTimeout { step: &'static str, after: Duration },

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<empower_core::Error> for ConsensusError {
    fn from(err: empower_core::Error) -> Self {
        match err {
            empower_core::Error::Structural(e) => ConsensusError::Structural(e),
            empower_core::Error::Signature(e) => ConsensusError::Signature(e),
            empower_core::Error::SerializationError(e) => ConsensusError::SerializationError(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
