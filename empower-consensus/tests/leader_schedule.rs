use empower_consensus::{schedule_leader, Validator, ValidatorRegistry};
use empower_core::Address;
use proptest::prelude::*;

fn registry_from(addresses: &[Address]) -> ValidatorRegistry {
    ValidatorRegistry::with_validators(addresses.iter().map(|a| Validator::new(*a, 1, 1.0))).unwrap()
}

proptest! {
    #[test]
    fn prop_leader_is_periodic_and_order_independent(
        raw in prop::collection::hash_set(any::<[u8; 32]>(), 1..16),
        height in 0u64..1_000_000,
        k in 0u64..1_000,
    ) {
        let addresses: Vec<Address> = raw.into_iter().map(Address).collect();
        let mut reversed = addresses.clone();
        reversed.reverse();

        let one = registry_from(&addresses);
        let other = registry_from(&reversed);
        let n = addresses.len() as u64;

        let leader = one.leader_for_height(height).unwrap();
        prop_assert_eq!(leader, other.leader_for_height(height).unwrap());
        prop_assert_eq!(leader, one.leader_for_height(height + k * n).unwrap());
        prop_assert_eq!(Some(leader), schedule_leader(&one.sorted_addresses(), height));
    }

    #[test]
    fn prop_stake_and_reputation_ignored(
        raw in prop::collection::hash_set(any::<[u8; 32]>(), 1..8),
        stakes in prop::collection::vec(any::<u64>(), 8),
        height in any::<u64>(),
    ) {
        let addresses: Vec<Address> = raw.into_iter().map(Address).collect();
        let plain = registry_from(&addresses);
        let weighted = ValidatorRegistry::with_validators(
            addresses.iter().zip(&stakes).map(|(a, s)| Validator::new(*a, *s, (*s % 100) as f64)),
        )
        .unwrap();
        prop_assert_eq!(
            plain.leader_for_height(height).unwrap(),
            weighted.leader_for_height(height).unwrap()
        );
    }
}
