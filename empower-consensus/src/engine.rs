//! Rotating-leader consensus engine.
//!
//! A single task drives every consensus decision. It waits on the stop
//! signal, the slot timer, inbound blocks and inbound transactions, and
//! handles one event at a time, so proposal and ingestion never race inside
//! the engine. Proposal and validation run on the blocking pool under a
//! per-step deadline; ledger commits run to completion.

use std::sync::Arc;

use empower_core::{Address, Block, Hash, Transaction};
use empower_network::{MessageType, PayloadReceiver, Transport};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::EngineConfig;
use crate::error::{ConsensusError, Result};
use crate::ledger::Ledger;
use crate::mempool::TransactionPool;
use crate::proposer::ProposerService;
use crate::validation::ValidationService;
use crate::validators::ValidatorRegistry;

/// Lifecycle of a [`ConsensusEngine`]. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// Collaborators the engine drives.
#[derive(Clone)]
pub struct EngineComponents {
    pub ledger: Arc<Ledger>,
    pub registry: Arc<ValidatorRegistry>,
    pub proposer: Arc<ProposerService>,
    pub validation: Arc<ValidationService>,
    pub pool: Arc<dyn TransactionPool>,
    pub transport: Arc<dyn Transport>,
}

struct RunningLoop {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct ConsensusEngine {
    inner: Arc<EngineInner>,
    span: Span,
    state: Mutex<EngineState>,
    control: tokio::sync::Mutex<Option<RunningLoop>>,
}

struct EngineInner {
    address: Address,
    config: EngineConfig,
    ledger: Arc<Ledger>,
    registry: Arc<ValidatorRegistry>,
    proposer: Arc<ProposerService>,
    validation: Arc<ValidationService>,
    pool: Arc<dyn TransactionPool>,
    transport: Arc<dyn Transport>,
}

impl ConsensusEngine {
    pub fn new(address: Address, config: EngineConfig, components: EngineComponents) -> Self {
        let span = info_span!("engine", validator = %address);
        Self {
            inner: Arc::new(EngineInner {
                address,
                config,
                ledger: components.ledger,
                registry: components.registry,
                proposer: components.proposer,
                validation: components.validation,
                pool: components.pool,
                transport: components.transport,
            }),
            span,
            state: Mutex::new(EngineState::Idle),
            control: tokio::sync::Mutex::new(None),
        }
    }

    /// Address this engine proposes as.
    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.inner.ledger
    }

    pub fn state(&self) -> EngineState {
        *self.state.lock()
    }

    /// Launches the round loop on the current tokio runtime.
    ///
    /// Only an `Idle` engine can start. The transport's block receiver must
    /// still be available; the transaction receiver is optional.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != EngineState::Idle {
            return Err(ConsensusError::EngineNotIdle(*state));
        }
        let mut control = self
            .control
            .try_lock()
            .map_err(|_| ConsensusError::EngineNotIdle(*state))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ConsensusError::Internal(format!("no tokio runtime: {}", e)))?;

        let blocks = self.inner.transport.take_block_receiver()?;
        let transactions = match self.inner.transport.take_transaction_receiver() {
            Ok(rx) => Some(rx),
            Err(e) => {
                warn!(parent: &self.span, error = %e, "transaction ingestion disabled");
                None
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let handle = runtime.spawn(
            inner
                .run(blocks, transactions, stop_rx)
                .instrument(self.span.clone()),
        );
        *control = Some(RunningLoop { stop_tx, handle });
        *state = EngineState::Running;
        info!(
            parent: &self.span,
            slot_ms = self.inner.config.slot_duration_ms,
            "consensus engine started"
        );
        Ok(())
    }

    /// Signals the loop and waits for it to exit. An in-flight commit
    /// finishes first. Calling it again, or on an engine that never started,
    /// just leaves the engine `Stopped`.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        {
            let mut state = self.state.lock();
            match *state {
                EngineState::Stopped => return,
                EngineState::Idle => {
                    *state = EngineState::Stopped;
                    return;
                }
                _ => *state = EngineState::Stopping,
            }
        }

        if let Some(running) = control.take() {
            info!(parent: &self.span, "stopping consensus engine");
            // the loop may already be gone if it panicked
            let _ = running.stop_tx.send(());
            if let Err(e) = running.handle.await {
                error!(parent: &self.span, error = %e, "consensus loop ended abnormally");
            }
        }
        *self.state.lock() = EngineState::Stopped;
        info!(parent: &self.span, "consensus engine stopped");
    }
}

impl EngineInner {
    async fn run(
        self: Arc<Self>,
        blocks: PayloadReceiver,
        mut transactions: Option<PayloadReceiver>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut blocks = Some(blocks);
        let mut ticker = tokio::time::interval(self.config.slot_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("consensus loop running");

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => {
                    info!("stop signal received");
                    break;
                }
                _ = ticker.tick() => {
                    self.on_slot().await;
                }
                payload = recv_optional(&mut blocks) => match payload {
                    Some(payload) => self.on_block(payload).await,
                    None => {
                        warn!("block channel closed");
                        blocks = None;
                    }
                },
                payload = recv_optional(&mut transactions) => match payload {
                    Some(payload) => self.on_transaction(payload),
                    None => {
                        warn!("transaction channel closed");
                        transactions = None;
                    }
                },
            }
        }
        info!("consensus loop exited");
    }

    async fn on_slot(&self) {
        let next_height = (self.ledger.current_height() + 1) as u64;
        let leader = match self.registry.leader_for_height(next_height) {
            Ok(leader) => leader,
            Err(e) => {
                warn!(height = next_height, error = %e, "cannot determine leader");
                return;
            }
        };
        if leader != self.address {
            debug!(height = next_height, %leader, "not the leader for this slot");
            return;
        }

        let prev_hash = self
            .ledger
            .latest_block()
            .map(|block| block.hash)
            .unwrap_or_else(Hash::zero);
        let proposer = Arc::clone(&self.proposer);
        let address = self.address;
        let block = match self
            .run_step("proposal", move || proposer.create_proposal(next_height, prev_hash, address))
            .await
        {
            Ok(block) => block,
            Err(e) => {
                warn!(height = next_height, error = %e, "proposal failed, skipping slot");
                return;
            }
        };

        let payload = match block.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!(height = next_height, error = %e, "failed to encode proposal");
                return;
            }
        };
        let hash = block.hash;
        if let Err(e) = self.commit(block) {
            warn!(height = next_height, error = %e, "local commit of proposal failed");
            return;
        }
        match self.transport.broadcast(MessageType::NewBlock, payload) {
            Ok(()) => info!(height = next_height, %hash, "proposed block broadcast"),
            Err(e) => warn!(height = next_height, error = %e, "broadcast failed"),
        }
    }

    async fn on_block(&self, payload: Vec<u8>) {
        let block = match Block::decode(&payload) {
            Ok(block) => block,
            Err(e) => {
                let e = ConsensusError::TransportDecode(e.to_string());
                warn!(size = payload.len(), error = %e, "discarding inbound block");
                return;
            }
        };
        if self.ledger.contains(&block.hash) {
            debug!(height = block.height, hash = %block.hash, "block already committed");
            return;
        }

        let height = block.height;
        let validation = Arc::clone(&self.validation);
        let block = match self
            .run_step("validation", move || validation.validate_block(&block).map(|()| block))
            .await
        {
            Ok(block) => block,
            Err(e) => {
                warn!(height, error = %e, "rejected inbound block");
                return;
            }
        };

        let hash = block.hash;
        match self.commit(block) {
            Ok(()) => info!(height, %hash, "inbound block committed"),
            Err(e) => warn!(height, %hash, error = %e, "inbound block failed to commit"),
        }
    }

    fn on_transaction(&self, payload: Vec<u8>) {
        let tx = match Transaction::decode(&payload) {
            Ok(tx) => tx,
            Err(e) => {
                let e = ConsensusError::TransportDecode(e.to_string());
                warn!(size = payload.len(), error = %e, "discarding inbound transaction");
                return;
            }
        };
        if let Err(e) = tx.verify() {
            warn!(tx_id = %tx.id, error = %e, "discarding unverifiable transaction");
            return;
        }
        let id = tx.id;
        match self.pool.add_transaction(tx) {
            Ok(()) => debug!(tx_id = %id, "inbound transaction pooled"),
            Err(ConsensusError::DuplicateTransaction(_)) => {
                debug!(tx_id = %id, "transaction already pooled")
            }
            Err(e) => warn!(tx_id = %id, error = %e, "failed to pool transaction"),
        }
    }

    /// Appends to the ledger, then records the height and prunes the pool.
    fn commit(&self, block: Block) -> Result<()> {
        let height = block.height;
        let tx_ids: Vec<Hash> = block.transaction_ids().collect();
        self.ledger.add_block(block)?;

        self.registry.update_height(height);
        for id in &tx_ids {
            self.pool.remove_transaction(id);
        }
        Ok(())
    }

    /// Runs `f` on the blocking pool, bounded by the step deadline.
    async fn run_step<T, F>(&self, step: &'static str, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let after = self.config.step_timeout();
        let span = Span::current();
        let task = tokio::task::spawn_blocking(move || span.in_scope(f));
        match tokio::time::timeout(after, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(ConsensusError::Internal(format!("{} step failed: {}", step, e))),
            Err(_) => Err(ConsensusError::StepTimeout { step, after }),
        }
    }
}

async fn recv_optional(rx: &mut Option<PayloadReceiver>) -> Option<Vec<u8>> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
