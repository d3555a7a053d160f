//! Node configuration: the confy file merged with command-line overrides.

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use empower_consensus::EngineConfig;
use empower_core::Address;
use serde::{Deserialize, Serialize};

/// confy application name.
pub const APP_NAME: &str = "empower1";

/// confy configuration name.
pub const CONFIG_NAME: &str = "node-config";

/// EmPower1 validator node
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Node ID used on the simulated network
    #[arg(long)]
    pub node_id: Option<String>,

    /// Slot length in milliseconds
    #[arg(long)]
    pub slot_ms: Option<u64>,

    /// Maximum transactions per proposed block
    #[arg(long)]
    pub max_block_txs: Option<usize>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Path to the log file (optional). If not provided, logs will only go to stdout.
    #[arg(long)]
    pub log_file: Option<String>,

    /// Additional validator address (hex), may be repeated
    #[arg(long = "validator")]
    pub validators: Vec<String>,

    /// Do not create a genesis block when the ledger is empty
    #[arg(long)]
    pub no_genesis: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: String,
    /// Hex addresses of the other validators; the node always adds itself
    pub validators: Vec<String>,
    /// Commit the genesis block at startup when the ledger is empty
    pub create_genesis: bool,
    pub engine: EngineConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "default_node".to_string(),
            validators: Vec::new(),
            create_genesis: true,
            engine: EngineConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Overrides file settings with whatever was given on the command line.
    pub fn merge_args(&mut self, args: &Args) {
        if let Some(node_id) = &args.node_id {
            self.node_id = node_id.clone();
        }
        if let Some(slot_ms) = args.slot_ms {
            self.engine.slot_duration_ms = slot_ms;
        }
        if let Some(max) = args.max_block_txs {
            self.engine.max_block_transactions = max;
        }
        for validator in &args.validators {
            if !self.validators.contains(validator) {
                self.validators.push(validator.clone());
            }
        }
        if args.no_genesis {
            self.create_genesis = false;
        }
    }

    /// Parses the configured validator addresses.
    pub fn validator_addresses(&self) -> Result<Vec<Address>> {
        self.validators
            .iter()
            .map(|s| Address::from_str(s).with_context(|| format!("invalid validator address {:?}", s)))
            .collect()
    }
}
