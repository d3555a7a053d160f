//! Cryptographic primitives and utilities for EmPower1.

use std::fmt;
use std::str::FromStr;

use ed25519_dalek::{Signature as Ed25519Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::OsRng;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::SignatureError;

/// A 32-byte hash output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Creates a new zero-initialized hash.
    pub fn zero() -> Self {
        Hash([0u8; 32])
    }

    /// Returns true for the all-zero hash, which marks an unset id or a genesis parent.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Creates a hash from a byte slice.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        if bytes.len() == 32 {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(bytes);
            Some(Self(hash))
        } else {
            None
        }
    }

    /// Returns the hash as a byte slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Computes the SHA-256 hash of the given data.
    pub fn sha256(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&result);
        Hash(hash)
    }
}

impl Default for Hash {
    fn default() -> Self {
        Hash::zero()
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Owner identifier carried by transaction outputs: the first 20 bytes of SHA-256(public key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct PubKeyHash(pub [u8; 20]);

impl fmt::Display for PubKeyHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Public key wrapper for ed25519
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Wraps raw key bytes without checking that they form a valid point.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(*bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derives the output owner hash for this key.
    pub fn to_pubkey_hash(&self) -> PubKeyHash {
        let digest = Hash::sha256(&self.0);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest.0[..20]);
        PubKeyHash(out)
    }

    /// Parses the bytes as an ed25519 verifying key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, SignatureError> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| SignatureError::InvalidPublicKey(format!("{}: {}", self, e)))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Validator and proposer identity. It is the validator's ed25519 public key,
/// so a block signature can be checked against the proposer address directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Address(pub [u8; 32]);

impl Address {
    /// The all-zero address, used as the genesis proposer.
    pub fn zero() -> Self {
        Address([0u8; 32])
    }

    /// Returns the raw address bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The public key this address stands for.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0)
    }
}

impl From<PublicKey> for Address {
    fn from(key: PublicKey) -> Self {
        Address(key.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim_start_matches("0x"), &mut bytes)?;
        Ok(Address(bytes))
    }
}

/// A 64-byte ed25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    /// Returns the raw signature bytes.
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl From<Ed25519Signature> for Signature {
    fn from(signature: Ed25519Signature) -> Self {
        Signature(signature.to_bytes())
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(&self.0).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let buf = serde_bytes::ByteBuf::deserialize(deserializer)?;
        let bytes: [u8; 64] = buf
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::invalid_length(buf.len(), &"64 signature bytes"))?;
        Ok(Signature(bytes))
    }
}

/// Key pair for signing and verification
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret_key: [u8; 32],
    /// Public half of the pair.
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new key pair from the operating system RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(&signing_key)
    }

    /// Rebuilds a key pair from a 32-byte secret seed.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Self {
        Self::from_signing_key(&SigningKey::from_bytes(secret))
    }

    fn from_signing_key(signing_key: &SigningKey) -> Self {
        Self {
            secret_key: signing_key.to_bytes(),
            public_key: PublicKey(signing_key.verifying_key().to_bytes()),
        }
    }

    /// The address this key signs blocks for.
    pub fn address(&self) -> Address {
        Address::from(self.public_key)
    }

    /// Signs a message with the key pair's secret key.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing_key = SigningKey::from_bytes(&self.secret_key);
        Signature(signing_key.sign(message).to_bytes())
    }
}

/// Verifies an ed25519 signature over `message`.
pub fn verify_signature(
    pubkey: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), SignatureError> {
    let verifying_key = pubkey.verifying_key()?;
    let ed25519_signature = Ed25519Signature::from_bytes(&signature.0);
    verifying_key
        .verify(message, &ed25519_signature)
        .map_err(|_| SignatureError::InvalidSignature(format!("signer {}", pubkey)))
}
