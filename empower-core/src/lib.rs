//! EmPower1 Core
//!
//! Core data structures and cryptography for the EmPower1 ledger: hashes and
//! keys, transactions with their canonical payload, and hash-linked blocks.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]
#![forbid(unsafe_code)]

/// Cryptographic primitives and utilities.
pub mod crypto;

/// Core data structures.
pub mod types;

/// Common error types.
pub mod error;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::crypto::*;
    pub use crate::error::*;
    pub use crate::types::*;
}

/// Re-export the prelude for convenient access to common types.
pub use prelude::*;
