use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::{verify_signature, Hash, KeyPair, PubKeyHash, PublicKey, Signature};
use crate::error::{Error, Result, SignatureError, StructuralError};

use super::OutPoint;

/// Kind of a transaction. Type-specific fields are carried and hashed but never executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxType {
    /// Plain value transfer that spends existing outputs
    Standard,
    /// Deploys contract code
    ContractDeploy,
    /// Calls a function on a deployed contract
    ContractCall,
    /// Creates a decentralized identifier
    DidCreate,
    /// Updates a decentralized identifier
    DidUpdate,
    /// Protocol-issued payment driven by an AI rule
    StimulusPayment,
    /// Protocol-issued wealth tax collection driven by an AI rule
    WealthTax,
    /// Stakes funds for validator participation
    ValidatorStake,
    /// Governance proposal or vote
    GovernanceVote,
}

impl TxType {
    /// Wire tag of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::Standard => "STANDARD",
            TxType::ContractDeploy => "CONTRACT_DEPLOY",
            TxType::ContractCall => "CONTRACT_CALL",
            TxType::DidCreate => "DID_CREATE",
            TxType::DidUpdate => "DID_UPDATE",
            TxType::StimulusPayment => "STIMULUS_PAYMENT",
            TxType::WealthTax => "WEALTH_TAX",
            TxType::ValidatorStake => "VALIDATOR_STAKE",
            TxType::GovernanceVote => "GOVERNANCE_VOTE",
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transaction input spends an output of a previous transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Id of the transaction holding the output being spent
    pub prev_tx_id: Hash,
    /// Index of that output
    pub vout: u32,
    /// Public key of the spender
    pub public_key: Option<PublicKey>,
    /// Spending script. Not part of the canonical payload.
    pub script_sig: Vec<u8>,
    /// Sequence number
    pub sequence: u32,
}

impl TxInput {
    /// Creates an input spending `outpoint` with no spender key attached.
    pub fn new(outpoint: OutPoint) -> Self {
        Self {
            prev_tx_id: outpoint.tx_id,
            vout: outpoint.vout,
            public_key: None,
            script_sig: Vec::new(),
            sequence: 0,
        }
    }

    /// The output this input spends.
    pub fn outpoint(&self) -> OutPoint {
        OutPoint::new(self.prev_tx_id, self.vout)
    }
}

/// A transaction output assigns value to an owner key hash.
///
/// Field order matters: the derived ordering (value, then owner) is the
/// canonical output order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxOutput {
    /// Amount in the smallest unit
    pub value: u64,
    /// Owner of the output
    pub owner: PubKeyHash,
}

impl TxOutput {
    /// Creates a new output.
    pub fn new(value: u64, owner: PubKeyHash) -> Self {
        Self { value, owner }
    }
}

/// One collected signature of a multisig transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerInfo {
    /// Key that produced the signature
    pub public_key: PublicKey,
    /// Signature over the transaction id
    pub signature: Signature,
}

/// M-of-N signing configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MultiSig {
    /// M: number of unique valid signatures needed
    pub required_signatures: u32,
    /// N: keys allowed to sign
    pub authorized_keys: Vec<PublicKey>,
    /// Signatures collected so far
    pub signers: Vec<SignerInfo>,
}

impl MultiSig {
    /// A multisig is active only with a positive threshold and at least one authorized key.
    pub fn is_configured(&self) -> bool {
        self.required_signatures > 0 && !self.authorized_keys.is_empty()
    }

    fn is_authorized(&self, key: &PublicKey) -> bool {
        self.authorized_keys.contains(key)
    }
}

/// Contract fields for deploy and call transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContractFields {
    /// Code to deploy
    pub code: Vec<u8>,
    /// Contract being called
    pub target_address: Vec<u8>,
    /// Function being called
    pub function_name: String,
    /// Encoded call arguments
    pub arguments: Vec<u8>,
}

/// AI attestation attached to protocol-issued transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AiMetadata {
    /// Identifier of the logic instance used
    pub logic_id: String,
    /// Rule that triggered the transaction
    pub rule_trigger: String,
    /// Proof or attestation bytes
    pub proof: Vec<u8>,
}

/// A ledger transaction.
///
/// The id is the SHA-256 hash of the canonical payload (see
/// [`Transaction::canonical_payload`]). Once the id is assigned and signed,
/// changing any hashed field invalidates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Hash of the canonical payload, zero until assigned
    pub id: Hash,
    /// Unix nanoseconds
    pub timestamp: i64,
    /// Transaction kind
    pub tx_type: TxType,
    /// Outputs spent
    pub inputs: Vec<TxInput>,
    /// Outputs created
    pub outputs: Vec<TxOutput>,
    /// Fee in the smallest unit
    pub fee: u64,
    /// Single signer key
    pub public_key: Option<PublicKey>,
    /// Single signer signature over the id
    pub signature: Option<Signature>,
    /// Contract deploy/call fields
    pub contract: ContractFields,
    /// Multi-signer configuration
    pub multisig: Option<MultiSig>,
    /// AI metadata
    pub ai: AiMetadata,
}

#[derive(Serialize, PartialEq, Eq, PartialOrd, Ord)]
struct CanonicalInput<'a> {
    prev_tx_id: &'a Hash,
    vout: u32,
    public_key: Option<&'a PublicKey>,
    sequence: u32,
}

#[derive(Serialize)]
struct CanonicalPayload<'a> {
    timestamp: i64,
    tx_type: TxType,
    inputs: Vec<CanonicalInput<'a>>,
    outputs: Vec<&'a TxOutput>,
    fee: u64,
    public_key: Option<&'a PublicKey>,
    contract: &'a ContractFields,
    required_signatures: u32,
    authorized_keys: Vec<&'a PublicKey>,
    ai: &'a AiMetadata,
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

impl Transaction {
    /// Creates an unsigned transaction stamped with the current time.
    pub fn new(tx_type: TxType, inputs: Vec<TxInput>, outputs: Vec<TxOutput>, fee: u64) -> Self {
        Self {
            id: Hash::zero(),
            timestamp: now_nanos(),
            tx_type,
            inputs,
            outputs,
            fee,
            public_key: None,
            signature: None,
            contract: ContractFields::default(),
            multisig: None,
            ai: AiMetadata::default(),
        }
    }

    /// Standard value transfer.
    pub fn new_standard(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, fee: u64) -> Self {
        Self::new(TxType::Standard, inputs, outputs, fee)
    }

    /// Contract deployment funded by `inputs`.
    pub fn new_contract_deploy(
        creator: PublicKey,
        code: Vec<u8>,
        fee: u64,
        inputs: Vec<TxInput>,
        change: Vec<TxOutput>,
    ) -> Self {
        let mut tx = Self::new(TxType::ContractDeploy, inputs, change, fee);
        tx.contract.code = code;
        tx.public_key = Some(creator);
        tx
    }

    /// Contract call.
    pub fn new_contract_call(
        caller: PublicKey,
        target_address: Vec<u8>,
        function_name: impl Into<String>,
        arguments: Vec<u8>,
        fee: u64,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
    ) -> Self {
        let mut tx = Self::new(TxType::ContractCall, inputs, outputs, fee);
        tx.contract.target_address = target_address;
        tx.contract.function_name = function_name.into();
        tx.contract.arguments = arguments;
        tx.public_key = Some(caller);
        tx
    }

    /// Protocol stimulus payment. Has no fee and may mint outputs without inputs.
    pub fn new_stimulus(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, ai: AiMetadata) -> Self {
        let mut tx = Self::new(TxType::StimulusPayment, inputs, outputs, 0);
        tx.ai = ai;
        tx
    }

    /// Protocol wealth tax collection.
    pub fn new_wealth_tax(
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        fee: u64,
        ai: AiMetadata,
    ) -> Self {
        let mut tx = Self::new(TxType::WealthTax, inputs, outputs, fee);
        tx.ai = ai;
        tx
    }

    /// Configures the transaction for M-of-N signing.
    pub fn with_multisig(mut self, required_signatures: u32, authorized_keys: Vec<PublicKey>) -> Self {
        self.multisig = Some(MultiSig {
            required_signatures,
            authorized_keys,
            signers: Vec::new(),
        });
        self
    }

    /// Returns true when the transaction must be signed through [`Transaction::add_signature`].
    pub fn is_multisig(&self) -> bool {
        self.multisig.as_ref().map_or(false, MultiSig::is_configured)
    }

    /// Deterministic byte encoding of every hashed field.
    ///
    /// Inputs are sorted by the output they reference, outputs by value then
    /// owner, and authorized keys by their bytes, so construction order does
    /// not affect the result. The id, input scripts and all signatures are
    /// excluded.
    pub fn canonical_payload(&self) -> Result<Vec<u8>> {
        let mut inputs: Vec<CanonicalInput<'_>> = self
            .inputs
            .iter()
            .map(|input| CanonicalInput {
                prev_tx_id: &input.prev_tx_id,
                vout: input.vout,
                public_key: input.public_key.as_ref(),
                sequence: input.sequence,
            })
            .collect();
        inputs.sort();

        let mut outputs: Vec<&TxOutput> = self.outputs.iter().collect();
        outputs.sort();

        let (required_signatures, mut authorized_keys) = match &self.multisig {
            Some(multisig) => (
                multisig.required_signatures,
                multisig.authorized_keys.iter().collect::<Vec<_>>(),
            ),
            None => (0, Vec::new()),
        };
        authorized_keys.sort();

        let payload = CanonicalPayload {
            timestamp: self.timestamp,
            tx_type: self.tx_type,
            inputs,
            outputs,
            fee: self.fee,
            public_key: self.public_key.as_ref(),
            contract: &self.contract,
            required_signatures,
            authorized_keys,
            ai: &self.ai,
        };
        Ok(bincode::serialize(&payload)?)
    }

    /// SHA-256 of the canonical payload.
    pub fn hash(&self) -> Result<Hash> {
        Ok(Hash::sha256(&self.canonical_payload()?))
    }

    /// Assigns the id from the current field state.
    pub fn assign_id(&mut self) -> Result<Hash> {
        self.id = self.hash()?;
        Ok(self.id)
    }

    /// Signs as the single signer. The signer's key becomes part of the hashed payload.
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        if self.is_multisig() {
            return Err(SignatureError::MultiSigConfigured.into());
        }
        self.public_key = Some(keypair.public_key);
        let id = self.assign_id()?;
        self.signature = Some(keypair.sign(id.as_bytes()));
        Ok(())
    }

    /// Adds one authorized signature to a multisig transaction, assigning the id first if needed.
    pub fn add_signature(&mut self, keypair: &KeyPair) -> Result<()> {
        if !self.is_multisig() {
            return Err(SignatureError::MultiSigNotConfigured.into());
        }
        let computed = self.hash()?;
        if self.id.is_zero() {
            self.id = computed;
        } else if self.id != computed {
            return Err(StructuralError::TransactionIdMismatch { id: self.id, computed }.into());
        }
        let id = self.id;

        let multisig = self
            .multisig
            .as_mut()
            .ok_or(Error::Signature(SignatureError::MultiSigNotConfigured))?;
        let signer = keypair.public_key;
        if !multisig.is_authorized(&signer) {
            return Err(SignatureError::UnauthorizedSigner(signer.to_string()).into());
        }
        if multisig.signers.iter().any(|s| s.public_key == signer) {
            return Err(SignatureError::DuplicateSignature(signer.to_string()).into());
        }
        multisig.signers.push(SignerInfo {
            public_key: signer,
            signature: keypair.sign(id.as_bytes()),
        });
        Ok(())
    }

    /// Checks that the id matches the current field state, then checks the signature(s).
    pub fn verify(&self) -> Result<()> {
        self.verify_id()?;
        match &self.multisig {
            Some(multisig) if multisig.is_configured() => Ok(self.verify_multisig(multisig)?),
            _ => Ok(self.verify_single()?),
        }
    }

    /// Checks only that the id is set and equals the hash of the canonical payload.
    pub fn verify_id(&self) -> Result<()> {
        if self.id.is_zero() {
            return Err(StructuralError::MissingTransactionId.into());
        }
        let computed = self.hash()?;
        if computed != self.id {
            return Err(StructuralError::TransactionIdMismatch { id: self.id, computed }.into());
        }
        Ok(())
    }

    fn verify_single(&self) -> std::result::Result<(), SignatureError> {
        let public_key = self
            .public_key
            .as_ref()
            .ok_or_else(|| SignatureError::InvalidPublicKey("no signer key".to_string()))?;
        let signature = self.signature.as_ref().ok_or(SignatureError::MissingSignature)?;
        verify_signature(public_key, self.id.as_bytes(), signature)
    }

    fn verify_multisig(&self, multisig: &MultiSig) -> std::result::Result<(), SignatureError> {
        let need = multisig.required_signatures as usize;
        if multisig.signers.len() < need {
            return Err(SignatureError::InsufficientSignatures {
                have: multisig.signers.len(),
                need,
            });
        }

        let mut verified: HashSet<PublicKey> = HashSet::new();
        for signer in &multisig.signers {
            if !multisig.is_authorized(&signer.public_key) {
                return Err(SignatureError::UnauthorizedSigner(signer.public_key.to_string()));
            }
            if verified.contains(&signer.public_key) {
                return Err(SignatureError::DuplicateSignature(signer.public_key.to_string()));
            }
            verify_signature(&signer.public_key, self.id.as_bytes(), &signer.signature)?;
            verified.insert(signer.public_key);
        }

        if verified.len() < need {
            return Err(SignatureError::InsufficientSignatures {
                have: verified.len(),
                need,
            });
        }
        Ok(())
    }

    /// Wire encoding.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decodes a transaction from its wire encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
