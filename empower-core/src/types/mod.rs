//! Core types for the EmPower1 ledger

mod block;
mod transaction;

pub use block::*;
pub use transaction::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::Hash;

/// Identifies a specific transaction output: `(creating tx id, output index)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    /// Id of the transaction that created the output
    pub tx_id: Hash,
    /// Position of the output within that transaction
    pub vout: u32,
}

impl OutPoint {
    /// Creates a new output reference.
    pub fn new(tx_id: Hash, vout: u32) -> Self {
        Self { tx_id, vout }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tx_id, self.vout)
    }
}
