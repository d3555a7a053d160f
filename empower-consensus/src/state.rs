//! UTXO state machine.
//!
//! [`UtxoSet`] is the authoritative unspent-output map. Blocks are applied
//! through a [`UtxoOverlay`] that stages every deletion and insertion; the
//! overlay is folded into the set only after every transaction in the block
//! has applied, so a failing block leaves the set untouched.
//!
//! The set also remembers every transaction id it has applied. Output keys
//! are derived from the creating transaction's id, so refusing a known id is
//! what keeps a key from being created a second time after it was spent.

use std::collections::{HashMap, HashSet};

use empower_core::{Block, Hash, OutPoint, PubKeyHash, Transaction, TxType};
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ConsensusError, Result, StateTransitionError};

/// An unspent output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    /// Creating transaction and output index
    pub outpoint: OutPoint,
    /// Value held by the output
    pub amount: u64,
    /// Key hash of the owner
    pub owner: PubKeyHash,
}

/// A set of unspent transaction outputs (UTXOs).
#[derive(Debug, Clone, Default)]
pub struct UtxoSet {
    utxos: HashMap<OutPoint, Utxo>,
    applied: HashSet<Hash>,
}

impl UtxoSet {
    /// Creates a new, empty UTXO set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a UTXO to the set, replacing any entry under the same outpoint.
    pub fn add_utxo(&mut self, utxo: Utxo) {
        self.utxos.insert(utxo.outpoint, utxo);
    }

    /// Removes a UTXO from the set.
    pub fn remove_utxo(&mut self, outpoint: &OutPoint) -> Option<Utxo> {
        self.utxos.remove(outpoint)
    }

    /// Retrieves a UTXO from the set.
    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        self.utxos.get(outpoint)
    }

    /// Checks if a UTXO is in the set.
    pub fn contains_utxo(&self, outpoint: &OutPoint) -> bool {
        self.utxos.contains_key(outpoint)
    }

    /// Returns the number of UTXOs in the set.
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    /// Checks if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Whether a transaction with this id was already applied.
    pub fn is_applied(&self, tx_id: &Hash) -> bool {
        self.applied.contains(tx_id)
    }

    /// Returns an iterator over the UTXOs in the set.
    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &Utxo)> {
        self.utxos.iter()
    }

    /// Starts a staging overlay on top of this set.
    pub fn overlay(&self) -> UtxoOverlay<'_> {
        UtxoOverlay::new(self)
    }

    /// Applies every transaction of `block` in order. Either all of them
    /// apply or the set is left exactly as it was.
    pub fn apply_block(&mut self, block: &Block) -> Result<()> {
        let mut overlay = self.overlay();
        for tx in &block.transactions {
            overlay.apply_transaction(tx)?;
        }
        let changes = overlay.into_changes();
        self.commit(changes);
        Ok(())
    }

    fn commit(&mut self, changes: UtxoChanges) {
        for outpoint in &changes.spent {
            self.utxos.remove(outpoint);
        }
        for (_, utxo) in changes.created {
            self.add_utxo(utxo);
        }
        self.applied.extend(changes.applied);
    }

    /// Sum of all outputs owned by `owner`.
    pub fn balance(&self, owner: &PubKeyHash) -> u64 {
        self.utxos
            .values()
            .filter(|utxo| &utxo.owner == owner)
            .fold(0u64, |total, utxo| total.saturating_add(utxo.amount))
    }
}

/// Staged deletions and insertions produced by an overlay.
#[derive(Debug, Default)]
pub struct UtxoChanges {
    /// Outpoints removed from the base set
    pub spent: HashSet<OutPoint>,
    /// Outputs added on top of the base set
    pub created: HashMap<OutPoint, Utxo>,
    /// Ids of the staged transactions
    pub applied: HashSet<Hash>,
}

/// Copy-on-write view over a [`UtxoSet`].
///
/// Reads see the base set with the staged changes applied. Nothing touches
/// the base until [`UtxoOverlay::into_changes`] is committed by the owner.
pub struct UtxoOverlay<'a> {
    base: &'a UtxoSet,
    changes: UtxoChanges,
}

impl<'a> UtxoOverlay<'a> {
    /// Creates an empty overlay on `base`.
    pub fn new(base: &'a UtxoSet) -> Self {
        Self {
            base,
            changes: UtxoChanges::default(),
        }
    }

    /// Looks up an outpoint through the staged changes.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Utxo> {
        if let Some(utxo) = self.changes.created.get(outpoint) {
            return Some(utxo);
        }
        if self.changes.spent.contains(outpoint) {
            return None;
        }
        self.base.get_utxo(outpoint)
    }

    /// Whether `outpoint` is currently unspent in this view.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.get(outpoint).is_some()
    }

    /// Whether `tx_id` was applied in the base set or staged here.
    pub fn is_applied(&self, tx_id: &Hash) -> bool {
        self.changes.applied.contains(tx_id) || self.base.is_applied(tx_id)
    }

    /// Stages one transaction. The transaction is checked in full before
    /// anything is staged, so a rejected transaction leaves the overlay as
    /// it was.
    pub fn apply_transaction(&mut self, tx: &Transaction) -> Result<()> {
        if tx.tx_type == TxType::Standard && tx.inputs.is_empty() {
            return Err(StateTransitionError::EmptyInputs(tx.id).into());
        }

        let created = created_outpoints(tx);
        // replaying a known id would recreate keys even after they were spent
        if self.is_applied(&tx.id) || created.iter().any(|outpoint| self.contains(outpoint)) {
            return Err(StateTransitionError::DuplicateOutput {
                outpoint: OutPoint::new(tx.id, 0),
                tx_id: tx.id,
            }
            .into());
        }

        let mut spending = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            let outpoint = input.outpoint();
            // a second spend of the same outpoint within the tx sees it deleted
            if !spending.insert(outpoint) || !self.contains(&outpoint) {
                return Err(StateTransitionError::UtxoNotFound { outpoint, tx_id: tx.id }.into());
            }
        }

        for outpoint in spending {
            if self.changes.created.remove(&outpoint).is_none() {
                self.changes.spent.insert(outpoint);
            }
        }
        for (outpoint, output) in created.into_iter().zip(&tx.outputs) {
            self.changes.created.insert(
                outpoint,
                Utxo {
                    outpoint,
                    amount: output.value,
                    owner: output.owner,
                },
            );
        }
        self.changes.applied.insert(tx.id);
        debug!(tx_id = %tx.id, inputs = tx.inputs.len(), outputs = tx.outputs.len(), "staged transaction");
        Ok(())
    }

    /// Consumes the overlay, returning the staged changes.
    pub fn into_changes(self) -> UtxoChanges {
        self.changes
    }
}

fn created_outpoints(tx: &Transaction) -> Vec<OutPoint> {
    (0..tx.outputs.len() as u32)
        .map(|vout| OutPoint::new(tx.id, vout))
        .collect()
}

/// Shared, lock-guarded state machine. All balance queries read through
/// here; block application takes the write lock for the whole block.
#[derive(Debug, Default)]
pub struct UtxoState {
    set: RwLock<UtxoSet>,
}

impl UtxoState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a block atomically. See [`UtxoSet::apply_block`].
    pub fn apply_block(&self, block: &Block) -> Result<()> {
        self.set.write().apply_block(block)
    }

    /// Total value owned by `owner`.
    pub fn balance(&self, owner: &PubKeyHash) -> u64 {
        self.set.read().balance(owner)
    }

    /// Collects outputs owned by `owner` until `amount` is covered. Which
    /// outputs are picked is unspecified; only the total is meaningful.
    pub fn find_spendable_outputs(&self, owner: &PubKeyHash, amount: u64) -> Result<(Vec<Utxo>, u64)> {
        let set = self.set.read();
        let mut selected = Vec::new();
        let mut total = 0u64;
        for utxo in set.utxos.values().filter(|utxo| &utxo.owner == owner) {
            if total >= amount {
                break;
            }
            total = total.saturating_add(utxo.amount);
            selected.push(utxo.clone());
        }
        if total < amount {
            return Err(ConsensusError::InsufficientFunds {
                owner: *owner,
                needed: amount,
                found: total,
            });
        }
        Ok((selected, total))
    }

    /// Looks up a single unspent output.
    pub fn get_utxo(&self, outpoint: &OutPoint) -> Option<Utxo> {
        self.set.read().get_utxo(outpoint).cloned()
    }

    /// Number of unspent outputs.
    pub fn len(&self) -> usize {
        self.set.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.read().is_empty()
    }

    /// Copy of the current set.
    pub fn snapshot(&self) -> UtxoSet {
        self.set.read().clone()
    }

    /// Splits `candidates` into those that apply, in order, on top of the
    /// current set and those that do not. Candidates that depend on an
    /// earlier-rejected or later candidate are retried until no more apply.
    pub fn filter_applicable(&self, candidates: Vec<Transaction>) -> (Vec<Transaction>, Vec<(Transaction, ConsensusError)>) {
        let set = self.set.read();
        let mut overlay = set.overlay();
        let mut accepted = Vec::with_capacity(candidates.len());
        let mut pending = candidates;

        loop {
            let mut rejected = Vec::new();
            let before = accepted.len();
            for tx in pending {
                match overlay.apply_transaction(&tx) {
                    Ok(()) => accepted.push(tx),
                    Err(e) => rejected.push((tx, e)),
                }
            }
            if accepted.len() == before || rejected.is_empty() {
                return (accepted, rejected);
            }
            pending = rejected.into_iter().map(|(tx, _)| tx).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empower_core::{Hash, KeyPair, TxInput, TxOutput};

    fn owner() -> PubKeyHash {
        KeyPair::generate().public_key.to_pubkey_hash()
    }

    fn mint(value: u64, to: PubKeyHash) -> Transaction {
        let mut tx = Transaction::new(TxType::StimulusPayment, vec![], vec![TxOutput::new(value, to)], 0);
        tx.assign_id().unwrap();
        tx
    }

    fn spend(from: &[OutPoint], outputs: Vec<TxOutput>) -> Transaction {
        let inputs = from.iter().map(|op| TxInput::new(*op)).collect();
        let mut tx = Transaction::new_standard(inputs, outputs, 0);
        tx.assign_id().unwrap();
        tx
    }

    fn block_of(txs: Vec<Transaction>) -> Block {
        Block::new(0, Hash::zero(), txs, empower_core::Address::zero())
    }

    #[test]
    fn test_apply_block_spends_and_creates() {
        let alice = owner();
        let bob = owner();
        let funding = mint(100, alice);
        let mut set = UtxoSet::new();
        set.apply_block(&block_of(vec![funding.clone()])).unwrap();
        assert_eq!(set.balance(&alice), 100);

        let pay = spend(
            &[OutPoint::new(funding.id, 0)],
            vec![TxOutput::new(60, bob), TxOutput::new(40, alice)],
        );
        set.apply_block(&block_of(vec![pay.clone()])).unwrap();
        assert!(!set.contains_utxo(&OutPoint::new(funding.id, 0)));
        assert_eq!(set.balance(&alice), 40);
        assert_eq!(set.balance(&bob), 60);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_chained_spend_within_block() {
        let alice = owner();
        let funding = mint(10, alice);
        let hop = spend(&[OutPoint::new(funding.id, 0)], vec![TxOutput::new(10, alice)]);
        let hop2 = spend(&[OutPoint::new(hop.id, 0)], vec![TxOutput::new(10, alice)]);

        let mut set = UtxoSet::new();
        set.apply_block(&block_of(vec![funding, hop, hop2.clone()])).unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains_utxo(&OutPoint::new(hop2.id, 0)));
    }

    #[test]
    fn test_failed_block_leaves_set_untouched() {
        let alice = owner();
        let funding = mint(50, alice);
        let mut set = UtxoSet::new();
        set.apply_block(&block_of(vec![funding.clone()])).unwrap();

        let good = spend(&[OutPoint::new(funding.id, 0)], vec![TxOutput::new(50, alice)]);
        let missing = spend(&[OutPoint::new(Hash::sha256(b"nowhere"), 0)], vec![TxOutput::new(1, alice)]);
        let err = set.apply_block(&block_of(vec![good, missing])).unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::StateTransition(StateTransitionError::UtxoNotFound { .. })
        ));
        assert_eq!(set.len(), 1);
        assert!(set.contains_utxo(&OutPoint::new(funding.id, 0)));
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let alice = owner();
        let funding = mint(5, alice);
        let mut set = UtxoSet::new();
        set.apply_block(&block_of(vec![funding.clone()])).unwrap();
        let err = set.apply_block(&block_of(vec![funding.clone()])).unwrap_err();
        assert_eq!(
            err,
            ConsensusError::StateTransition(StateTransitionError::DuplicateOutput {
                outpoint: OutPoint::new(funding.id, 0),
                tx_id: funding.id,
            })
        );
    }

    #[test]
    fn test_spent_mint_cannot_be_replayed() {
        let alice = owner();
        let bob = owner();
        let funding = mint(100, alice);
        let op = OutPoint::new(funding.id, 0);
        let mut set = UtxoSet::new();
        set.apply_block(&block_of(vec![funding.clone()])).unwrap();
        set.apply_block(&block_of(vec![spend(&[op], vec![TxOutput::new(100, bob)])]))
            .unwrap();
        assert!(!set.contains_utxo(&op));

        assert_eq!(
            set.apply_block(&block_of(vec![funding.clone()])).unwrap_err(),
            ConsensusError::StateTransition(StateTransitionError::DuplicateOutput {
                outpoint: op,
                tx_id: funding.id,
            })
        );
        assert!(!set.contains_utxo(&op));
        assert_eq!(set.balance(&alice), 0);
        assert_eq!(set.balance(&bob), 100);
    }

    #[test]
    fn test_same_tx_twice_in_one_block() {
        let funding = mint(3, owner());
        let mut set = UtxoSet::new();
        assert!(matches!(
            set.apply_block(&block_of(vec![funding.clone(), funding.clone()])),
            Err(ConsensusError::StateTransition(StateTransitionError::DuplicateOutput { .. }))
        ));
        assert!(set.is_empty());
        assert!(!set.is_applied(&funding.id));
    }

    #[test]
    fn test_filter_applicable_drops_replays() {
        let alice = owner();
        let state = UtxoState::new();
        let funding = mint(8, alice);
        state.apply_block(&block_of(vec![funding.clone()])).unwrap();
        let op = OutPoint::new(funding.id, 0);
        state
            .apply_block(&block_of(vec![spend(&[op], vec![TxOutput::new(8, alice)])]))
            .unwrap();

        let (accepted, rejected) = state.filter_applicable(vec![funding.clone()]);
        assert!(accepted.is_empty());
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0.id, funding.id);
    }

    #[test]
    fn test_standard_without_inputs_rejected() {
        let mut tx = Transaction::new_standard(vec![], vec![TxOutput::new(1, owner())], 0);
        tx.assign_id().unwrap();
        let mut set = UtxoSet::new();
        assert_eq!(
            set.apply_block(&block_of(vec![tx.clone()])).unwrap_err(),
            ConsensusError::StateTransition(StateTransitionError::EmptyInputs(tx.id))
        );
    }

    #[test]
    fn test_same_input_twice_in_one_tx() {
        let alice = owner();
        let funding = mint(5, alice);
        let mut set = UtxoSet::new();
        set.apply_block(&block_of(vec![funding.clone()])).unwrap();
        let op = OutPoint::new(funding.id, 0);
        let greedy = spend(&[op, op], vec![TxOutput::new(10, alice)]);
        assert!(set.apply_block(&block_of(vec![greedy])).is_err());
        assert!(set.contains_utxo(&op));
    }

    #[test]
    fn test_find_spendable_outputs() {
        let alice = owner();
        let state = UtxoState::new();
        state
            .apply_block(&block_of(vec![mint(30, alice), mint(20, alice), mint(7, owner())]))
            .unwrap();

        let (picked, total) = state.find_spendable_outputs(&alice, 25).unwrap();
        assert!(total >= 25);
        assert_eq!(picked.iter().map(|u| u.amount).sum::<u64>(), total);
        assert!(picked.iter().all(|u| u.owner == alice));

        let (_, all) = state.find_spendable_outputs(&alice, 50).unwrap();
        assert_eq!(all, 50);

        assert_eq!(
            state.find_spendable_outputs(&alice, 51).unwrap_err(),
            ConsensusError::InsufficientFunds { owner: alice, needed: 51, found: 50 }
        );
        assert_eq!(state.balance(&owner()), 0);
    }

    #[test]
    fn test_filter_applicable() {
        let alice = owner();
        let state = UtxoState::new();
        let funding = mint(10, alice);
        state.apply_block(&block_of(vec![funding.clone()])).unwrap();

        let op = OutPoint::new(funding.id, 0);
        let first = spend(&[op], vec![TxOutput::new(10, alice)]);
        let conflicting = spend(&[op], vec![TxOutput::new(9, alice)]);
        let child = spend(&[OutPoint::new(first.id, 0)], vec![TxOutput::new(10, alice)]);

        // child listed before its parent still makes it in on the second pass
        let (accepted, rejected) = state.filter_applicable(vec![child.clone(), first.clone(), conflicting.clone()]);
        let ids: Vec<Hash> = accepted.iter().map(|tx| tx.id).collect();
        assert_eq!(ids, vec![first.id, child.id]);
        assert_eq!(rejected.len(), 1);
        assert_eq!(rejected[0].0.id, conflicting.id);

        // nothing was committed
        assert!(state.get_utxo(&op).is_some());
    }
}
