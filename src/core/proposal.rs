//! Transaction proposals submitted by clients.
//!
//! **Transaction id:** computed deterministically from the proposal header (channel,
//! creator, invocation, nonce). Transient data is not part of the id, so it never
//! reaches the ledger, but its digest is covered by the creator's signature.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::contract::Invocation;
use crate::error::{Result, TransferError};
use crate::identity::{ClientIdentity, Signer};
use crate::signature::{hash_message, verify_signature};

/// Errors produced by proposal validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalValidationError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Transaction id mismatch: expected {0}, got {1}")]
    TxIdMismatch(String, String),

    #[error("Signer {0} is not the proposal creator")]
    CreatorMismatch(String),
}

impl From<ProposalValidationError> for TransferError {
    fn from(err: ProposalValidationError) -> Self {
        TransferError::Unauthorized(format!("proposal rejected: {}", err))
    }
}

/// A request to run one contract function on behalf of `creator`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Proposal {
    /// Transaction id (computed from the header)
    pub tx_id: String,

    pub channel: String,

    pub creator: ClientIdentity,

    pub invocation: Invocation,

    /// Distinguishes otherwise identical proposals
    pub nonce: u64,

    /// Off-ledger parameters, delivered to the contract for this invocation only
    #[serde(default)]
    pub transient: BTreeMap<String, Vec<u8>>,
}

#[derive(Serialize)]
struct ProposalHeader<'a> {
    channel: &'a str,
    creator: &'a ClientIdentity,
    invocation: &'a Invocation,
    nonce: u64,
}

#[derive(Serialize)]
struct SigningPayload<'a> {
    tx_id: &'a str,
    transient_digest: String,
}

impl Proposal {
    /// Constructs a proposal and computes its transaction id.
    pub fn new(channel: &str, creator: ClientIdentity, invocation: Invocation, nonce: u64) -> Result<Self> {
        let mut proposal = Self {
            tx_id: String::new(),
            channel: channel.to_string(),
            creator,
            invocation,
            nonce,
            transient: BTreeMap::new(),
        };
        proposal.tx_id = proposal.compute_tx_id()?;
        Ok(proposal)
    }

    pub fn with_transient(mut self, key: &str, value: Vec<u8>) -> Self {
        self.transient.insert(key.to_string(), value);
        self
    }

    /// Adds a JSON-encoded transient parameter.
    pub fn with_transient_json(self, key: &str, value: &impl Serialize) -> Result<Self> {
        let bytes = serde_json::to_vec(value)?;
        Ok(self.with_transient(key, bytes))
    }

    /// Same header -> same id. No randomness or system time.
    pub fn compute_tx_id(&self) -> Result<String> {
        let header = ProposalHeader {
            channel: &self.channel,
            creator: &self.creator,
            invocation: &self.invocation,
            nonce: self.nonce,
        };
        Ok(hex::encode(hash_message(&header)?))
    }

    /// Digest over the transient map in key order, with length-prefixed entries.
    fn transient_digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.transient {
            hasher.update((key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        hex::encode(hasher.finalize())
    }

    fn signing_payload(&self) -> SigningPayload<'_> {
        SigningPayload {
            tx_id: &self.tx_id,
            transient_digest: self.transient_digest(),
        }
    }

    /// Signs the proposal; the signer must be its creator.
    pub fn sign(self, signer: &Signer) -> Result<SignedProposal> {
        if signer.identity() != &self.creator {
            return Err(ProposalValidationError::CreatorMismatch(signer.identity().to_string()).into());
        }
        let signature = signer.sign(&self.signing_payload())?;
        Ok(SignedProposal { proposal: self, signature })
    }
}

/// A proposal with the creator's signature.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignedProposal {
    pub proposal: Proposal,
    /// Compact secp256k1 signature, hex
    pub signature: String,
}

impl SignedProposal {
    /// Checks the transaction id and the creator's signature. No ledger access.
    pub fn validate_basic(&self) -> std::result::Result<(), ProposalValidationError> {
        let expected = self
            .proposal
            .compute_tx_id()
            .map_err(|e| ProposalValidationError::InvalidSignature(e.to_string()))?;
        if expected != self.proposal.tx_id {
            return Err(ProposalValidationError::TxIdMismatch(expected, self.proposal.tx_id.clone()));
        }

        match verify_signature(
            &self.proposal.signing_payload(),
            &self.signature,
            &self.proposal.creator.public_key,
        ) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ProposalValidationError::InvalidSignature(
                "signature does not match creator".to_string(),
            )),
            Err(e) => Err(ProposalValidationError::InvalidSignature(format!(
                "Signature verification error: {}",
                e
            ))),
        }
    }
}
