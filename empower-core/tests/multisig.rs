use empower_core::{
    Error, Hash, KeyPair, OutPoint, PubKeyHash, SignatureError, SignerInfo, Transaction, TxInput,
    TxOutput,
};
use proptest::prelude::*;

fn multisig_tx(required: u32, keys: &[KeyPair]) -> Transaction {
    Transaction::new_standard(
        vec![TxInput::new(OutPoint::new(Hash::sha256(b"funding"), 0))],
        vec![TxOutput::new(100, PubKeyHash([9; 20]))],
        1,
    )
    .with_multisig(required, keys.iter().map(|k| k.public_key).collect())
}

#[test]
fn two_of_three_needs_two_distinct_signers() {
    let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
    let mut tx = multisig_tx(2, &keys);

    tx.add_signature(&keys[0]).unwrap();
    assert_eq!(
        tx.verify(),
        Err(Error::Signature(SignatureError::InsufficientSignatures { have: 1, need: 2 }))
    );

    tx.add_signature(&keys[2]).unwrap();
    tx.verify().unwrap();
}

#[test]
fn add_signature_rejects_unauthorized_and_duplicate_signers() {
    let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
    let mut tx = multisig_tx(2, &keys);

    tx.add_signature(&keys[1]).unwrap();
    assert!(matches!(
        tx.add_signature(&keys[1]),
        Err(Error::Signature(SignatureError::DuplicateSignature(_)))
    ));
    assert!(matches!(
        tx.add_signature(&KeyPair::generate()),
        Err(Error::Signature(SignatureError::UnauthorizedSigner(_)))
    ));
    assert_eq!(tx.multisig.as_ref().unwrap().signers.len(), 1);
}

#[test]
fn smuggled_duplicate_does_not_reach_threshold() {
    let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
    let mut tx = multisig_tx(2, &keys);
    tx.add_signature(&keys[0]).unwrap();

    let copy = tx.multisig.as_ref().unwrap().signers[0].clone();
    tx.multisig.as_mut().unwrap().signers.push(copy);

    assert!(matches!(
        tx.verify(),
        Err(Error::Signature(SignatureError::DuplicateSignature(_)))
    ));
}

#[test]
fn smuggled_unauthorized_signer_fails_whole_check() {
    let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
    let mut tx = multisig_tx(2, &keys);
    tx.add_signature(&keys[0]).unwrap();
    tx.add_signature(&keys[1]).unwrap();

    let outsider = KeyPair::generate();
    let signature = outsider.sign(tx.id.as_bytes());
    tx.multisig.as_mut().unwrap().signers.push(SignerInfo {
        public_key: outsider.public_key,
        signature,
    });

    assert!(matches!(
        tx.verify(),
        Err(Error::Signature(SignatureError::UnauthorizedSigner(_)))
    ));
}

#[test]
fn one_bad_signature_fails_whole_check() {
    let keys: Vec<KeyPair> = (0..3).map(|_| KeyPair::generate()).collect();
    let mut tx = multisig_tx(2, &keys);
    for key in &keys {
        tx.add_signature(key).unwrap();
    }
    tx.multisig.as_mut().unwrap().signers[2].signature = keys[2].sign(b"something else");

    assert!(matches!(
        tx.verify(),
        Err(Error::Signature(SignatureError::InvalidSignature(_)))
    ));
}

#[test]
fn adding_signature_after_mutation_is_rejected() {
    let keys: Vec<KeyPair> = (0..2).map(|_| KeyPair::generate()).collect();
    let mut tx = multisig_tx(2, &keys);
    tx.add_signature(&keys[0]).unwrap();
    tx.fee += 10;

    assert!(matches!(
        tx.add_signature(&keys[1]),
        Err(Error::Structural(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn verifies_iff_unique_signers_reach_threshold(n in 1usize..5, m_seed in any::<u32>(), k_seed in any::<u32>()) {
        let keys: Vec<KeyPair> = (0..n).map(|_| KeyPair::generate()).collect();
        let m = (m_seed as usize % n) + 1;
        let k = k_seed as usize % (n + 1);

        let mut tx = multisig_tx(m as u32, &keys);
        for key in keys.iter().take(k) {
            tx.add_signature(key).unwrap();
        }
        if k == 0 {
            tx.assign_id().unwrap();
        }

        prop_assert_eq!(tx.verify().is_ok(), k >= m);
    }
}
