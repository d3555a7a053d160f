//! Error types for EmPower1 core

use thiserror::Error;

use crate::crypto::Hash;

/// Main error type for the core crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A block or transaction is missing a required part
    #[error("Structural error: {0}")]
    Structural(#[from] StructuralError),

    /// Signing or signature verification failed
    #[error("Signature error: {0}")]
    Signature(#[from] SignatureError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Malformed or incomplete data. Always fatal to the call and never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    /// The transaction has no id assigned
    #[error("transaction id is not set")]
    MissingTransactionId,

    /// The transaction id does not match the hash of its canonical payload
    #[error("transaction id {id} does not match payload hash {computed}")]
    TransactionIdMismatch {
        /// id carried by the transaction
        id: Hash,
        /// hash recomputed from the current field state
        computed: Hash,
    },

    /// The block has no hash assigned
    #[error("block hash is not set")]
    MissingBlockHash,

    /// The block hash does not match its header and signature
    #[error("block hash {hash} does not match computed hash {computed}")]
    BlockHashMismatch {
        /// hash carried by the block
        hash: Hash,
        /// hash recomputed from header and signature
        computed: Hash,
    },

    /// The stored transaction digest does not match the included transactions
    #[error("transaction digest {stored} does not match computed digest {computed}")]
    TransactionDigestMismatch {
        /// digest carried by the block
        stored: Hash,
        /// digest recomputed over the transaction ids
        computed: Hash,
    },
}

/// Signature failures. Fatal to the verification of that transaction or block only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// A signature did not verify
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Fewer valid signatures than the multisig threshold
    #[error("insufficient signatures: have {have}, need {need}")]
    InsufficientSignatures {
        /// signatures counted
        have: usize,
        /// required threshold
        need: usize,
    },

    /// The signer is not in the authorized key set
    #[error("signer {0} is not authorized")]
    UnauthorizedSigner(String),

    /// The signer already signed this transaction
    #[error("duplicate signature from signer {0}")]
    DuplicateSignature(String),

    /// Public key missing or not a valid ed25519 point
    #[error("invalid or missing public key: {0}")]
    InvalidPublicKey(String),

    /// No signature present
    #[error("signature missing")]
    MissingSignature,

    /// Multi-signer operation on a transaction without a multisig configuration
    #[error("transaction not configured for multi-signature")]
    MultiSigNotConfigured,

    /// Single-signer operation on a transaction configured for multisig
    #[error("transaction is configured for multi-signature, use add_signature")]
    MultiSigConfigured,
}

/// A specialized `Result` type for EmPower1 core operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
