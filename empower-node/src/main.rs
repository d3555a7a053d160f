use std::fs::File;

use anyhow::{Context, Result};
use clap::Parser;
use empower_consensus::TransactionPool;
use empower_core::KeyPair;
use empower_node::{Args, Node, NodeConfig, APP_NAME, CONFIG_NAME};
use tokio::signal;
use tracing::{error, info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global subscriber. `RUST_LOG` wins over `--log-level`.
/// The returned guard must live until shutdown so buffered file logs flush.
fn init_logging(args: &Args) -> Result<Option<WorkerGuard>> {
    let level = args.log_level.parse::<Level>().unwrap_or(Level::INFO);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let builder = FmtSubscriber::builder().with_env_filter(filter);

    if let Some(log_file_path) = &args.log_file {
        let file = File::create(log_file_path)
            .with_context(|| format!("failed to create log file {}", log_file_path))?;
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file);
        let subscriber = builder.with_writer(non_blocking_writer).with_ansi(false).finish();
        tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")?;
        Ok(Some(guard))
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .context("setting default subscriber failed")?;
        Ok(None)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args)?;

    match confy::get_configuration_file_path(APP_NAME, CONFIG_NAME) {
        Ok(path) => info!("Configuration file path: {:?}", path),
        Err(e) => error!("Failed to resolve configuration path: {:?}", e),
    }
    let mut cfg: NodeConfig = match confy::load(APP_NAME, CONFIG_NAME) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:?}. Using default.", e);
            NodeConfig::default()
        }
    };

    // Override config with CLI arguments if provided
    cfg.merge_args(&args);
    info!("Loaded configuration: {:#?}", cfg);

    let keypair = KeyPair::generate();
    info!(address = %keypair.address(), "generated validator identity");

    let node = Node::new(&cfg, keypair)?;
    info!(
        validators = node.registry.len(),
        height = node.ledger.current_height(),
        "starting consensus engine"
    );
    node.engine.start().context("failed to start consensus engine")?;

    info!("Node {} is running. Press Ctrl+C to shut down gracefully.", cfg.node_id);
    signal::ctrl_c().await.context("failed to listen for ctrl-c event")?;
    info!("Ctrl+C received, stopping consensus engine.");
    node.engine.stop().await;

    info!(
        height = node.ledger.current_height(),
        pending = node.pool.len(),
        "node stopped"
    );

    match confy::store(APP_NAME, CONFIG_NAME, &cfg) {
        Ok(_) => info!("Configuration updated and stored."),
        Err(e) => error!("Failed to store configuration: {:?}", e),
    };

    Ok(())
}
