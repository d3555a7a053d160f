//! EmPower1 validator node: configuration and component wiring for the
//! `empower1d` binary.

pub mod config;
pub mod node;

pub use config::{Args, NodeConfig, APP_NAME, CONFIG_NAME};
pub use node::Node;
