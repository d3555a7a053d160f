//! Wires a validator node together.

use std::sync::Arc;

use anyhow::{Context, Result};
use empower_consensus::{
    ConsensusEngine, EngineComponents, Ledger, Mempool, ProposerService, ValidationService, Validator,
    ValidatorRegistry,
};
use empower_core::{Block, KeyPair};
use empower_network::{SimulatedNetwork, Transport};
use tracing::{debug, info};

use crate::config::NodeConfig;

/// Stake recorded for every validator started from config.
const DEFAULT_STAKE: u64 = 1_000;

pub struct Node {
    pub engine: ConsensusEngine,
    pub ledger: Arc<Ledger>,
    pub registry: Arc<ValidatorRegistry>,
    pub pool: Arc<Mempool>,
    pub network: SimulatedNetwork,
}

impl Node {
    /// Builds the node's components. The validator set is the configured
    /// addresses plus this node's own address.
    pub fn new(cfg: &NodeConfig, keypair: KeyPair) -> Result<Self> {
        let address = keypair.address();

        let mut addresses = cfg.validator_addresses()?;
        if !addresses.contains(&address) {
            addresses.push(address);
        }
        let registry = Arc::new(
            ValidatorRegistry::with_validators(
                addresses
                    .into_iter()
                    .map(|a| Validator::new(a, DEFAULT_STAKE, 1.0)),
            )
            .context("failed to load validator set")?,
        );

        let ledger = Arc::new(Ledger::default());
        if cfg.create_genesis && ledger.is_empty() {
            let genesis = Block::genesis();
            info!(hash = %genesis.hash, "creating genesis block");
            ledger.add_block(genesis).context("failed to commit genesis block")?;
            registry.update_height(0);
        }

        let network = SimulatedNetwork::new(cfg.node_id.clone());
        network.register_handler(Arc::new(|peer: &str, message_type: &str, payload: &[u8]| {
            debug!(peer, message_type, size = payload.len(), "ignoring unsupported message");
        }));

        let pool = Arc::new(Mempool::new());
        let proposer = ProposerService::new(
            keypair,
            pool.clone(),
            Arc::clone(ledger.state()),
            cfg.engine.max_block_transactions,
        );
        let engine = ConsensusEngine::new(
            address,
            cfg.engine.clone(),
            EngineComponents {
                ledger: ledger.clone(),
                registry: registry.clone(),
                proposer: Arc::new(proposer),
                validation: Arc::new(ValidationService::new(registry.clone())),
                pool: pool.clone(),
                transport: Arc::new(network.clone()),
            },
        );

        Ok(Self {
            engine,
            ledger,
            registry,
            pool,
            network,
        })
    }
}
