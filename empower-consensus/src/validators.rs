//! Validator set and leader schedule.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use empower_core::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ConsensusError, Result};

/// A registered validator. `stake` and `reputation` are recorded but take
/// no part in leader selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub address: Address,
    pub stake: u64,
    pub reputation: f64,
}

impl Validator {
    pub fn new(address: Address, stake: u64, reputation: f64) -> Self {
        Self {
            address,
            stake,
            reputation,
        }
    }
}

/// Round-robin leader for `height` over an already sorted address list.
pub fn schedule_leader(sorted: &[Address], height: u64) -> Option<Address> {
    if sorted.is_empty() {
        return None;
    }
    let index = (height % sorted.len() as u64) as usize;
    Some(sorted[index])
}

/// Holds the validator set and tracks the last committed height.
#[derive(Debug)]
pub struct ValidatorRegistry {
    validators: RwLock<HashMap<Address, Validator>>,
    last_committed_height: AtomicI64,
}

impl Default for ValidatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self {
            validators: RwLock::new(HashMap::new()),
            last_committed_height: AtomicI64::new(-1),
        }
    }

    /// Builds a registry from an initial set, rejecting duplicate addresses.
    pub fn with_validators(validators: impl IntoIterator<Item = Validator>) -> Result<Self> {
        let registry = Self::new();
        registry.load_initial_validators(validators)?;
        Ok(registry)
    }

    /// Adds every validator in `validators`. Stops at the first duplicate.
    pub fn load_initial_validators(&self, validators: impl IntoIterator<Item = Validator>) -> Result<()> {
        let mut count = 0usize;
        for validator in validators {
            self.add_validator(validator)?;
            count += 1;
        }
        info!(count, "loaded initial validators");
        Ok(())
    }

    pub fn add_validator(&self, validator: Validator) -> Result<()> {
        let mut validators = self.validators.write();
        if validators.contains_key(&validator.address) {
            return Err(ConsensusError::DuplicateValidator(validator.address));
        }
        info!(address = %validator.address, stake = validator.stake, "validator added");
        validators.insert(validator.address, validator);
        Ok(())
    }

    pub fn get_validator(&self, address: &Address) -> Option<Validator> {
        self.validators.read().get(address).cloned()
    }

    pub fn is_validator(&self, address: &Address) -> bool {
        self.validators.read().contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.validators.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.read().is_empty()
    }

    /// Validator addresses in ascending byte order.
    pub fn sorted_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.validators.read().keys().copied().collect();
        addresses.sort();
        addresses
    }

    /// All validators, sorted by address.
    pub fn validators(&self) -> Vec<Validator> {
        let mut validators: Vec<Validator> = self.validators.read().values().cloned().collect();
        validators.sort_by(|a, b| a.address.cmp(&b.address));
        validators
    }

    /// The only validator allowed to propose `height`.
    pub fn leader_for_height(&self, height: u64) -> Result<Address> {
        schedule_leader(&self.sorted_addresses(), height).ok_or(ConsensusError::NoValidators)
    }

    /// Records a committed height. Heights never move backwards.
    pub fn update_height(&self, height: u64) {
        let height = i64::try_from(height).unwrap_or(i64::MAX);
        self.last_committed_height.fetch_max(height, Ordering::AcqRel);
    }

    /// Last committed height seen, `-1` before any commit.
    pub fn last_committed_height(&self) -> i64 {
        self.last_committed_height.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 32])
    }

    #[test]
    fn test_round_robin_over_sorted_addresses() {
        let registry = ValidatorRegistry::with_validators([
            Validator::new(addr(9), 10, 1.0),
            Validator::new(addr(1), 1_000, 0.1),
            Validator::new(addr(5), 0, 0.0),
        ])
        .unwrap();

        assert_eq!(registry.sorted_addresses(), vec![addr(1), addr(5), addr(9)]);
        assert_eq!(registry.leader_for_height(0).unwrap(), addr(1));
        assert_eq!(registry.leader_for_height(1).unwrap(), addr(5));
        assert_eq!(registry.leader_for_height(2).unwrap(), addr(9));
        assert_eq!(registry.leader_for_height(3).unwrap(), addr(1));
    }

    #[test]
    fn test_empty_registry_has_no_leader() {
        let registry = ValidatorRegistry::new();
        assert_eq!(registry.leader_for_height(0), Err(ConsensusError::NoValidators));
        assert_eq!(schedule_leader(&[], 7), None);
    }

    #[test]
    fn test_duplicate_validator_rejected() {
        let registry = ValidatorRegistry::new();
        registry.add_validator(Validator::new(addr(2), 1, 1.0)).unwrap();
        assert_eq!(
            registry.add_validator(Validator::new(addr(2), 5, 0.5)),
            Err(ConsensusError::DuplicateValidator(addr(2)))
        );
        assert_eq!(registry.get_validator(&addr(2)).unwrap().stake, 1);
        assert!(registry.is_validator(&addr(2)));
        assert!(!registry.is_validator(&addr(3)));
    }

    #[test]
    fn test_height_tracker() {
        let registry = ValidatorRegistry::new();
        assert_eq!(registry.last_committed_height(), -1);
        registry.update_height(4);
        registry.update_height(2);
        assert_eq!(registry.last_committed_height(), 4);
    }
}
