//! EmPower1 consensus
//!
//! The single-node core of the ledger: a UTXO state machine with atomic block
//! application, an append-only hash-linked [`Ledger`], a [`ValidatorRegistry`]
//! with a round-robin leader schedule, the proposer and validation services,
//! and the [`ConsensusEngine`] that drives them slot by slot.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use empower_consensus::{
//!     ConsensusEngine, EngineComponents, EngineConfig, Ledger, Mempool, ProposerService,
//!     ValidationService, Validator, ValidatorRegistry,
//! };
//! use empower_core::KeyPair;
//! use empower_network::SimulatedNetwork;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = KeyPair::generate();
//! let address = keypair.address();
//! let config = EngineConfig::default();
//!
//! let ledger = Arc::new(Ledger::default());
//! let registry = Arc::new(ValidatorRegistry::with_validators([Validator::new(address, 100, 1.0)])?);
//! let pool = Arc::new(Mempool::new());
//! let proposer = ProposerService::new(keypair, pool.clone(), ledger.state().clone(), config.max_block_transactions);
//!
//! let engine = ConsensusEngine::new(address, config, EngineComponents {
//!     ledger: ledger.clone(),
//!     registry: registry.clone(),
//!     proposer: Arc::new(proposer),
//!     validation: Arc::new(ValidationService::new(registry)),
//!     pool,
//!     transport: Arc::new(SimulatedNetwork::new("node-1")),
//! });
//! engine.start()?;
//! // ...
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod mempool;
pub mod proposer;
pub mod state;
pub mod validation;
pub mod validators;

pub use config::EngineConfig;
pub use engine::{ConsensusEngine, EngineComponents, EngineState};
pub use error::{ChainLinkageError, ConsensusError, Result, StateTransitionError, ValidationError};
pub use ledger::Ledger;
pub use mempool::{Mempool, TransactionPool};
pub use proposer::ProposerService;
pub use state::{Utxo, UtxoOverlay, UtxoSet, UtxoState};
pub use validation::ValidationService;
pub use validators::{schedule_leader, Validator, ValidatorRegistry};
