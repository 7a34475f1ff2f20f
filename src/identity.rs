//! Client identities and the key material that signs their proposals.
//!
//! An identity is the pair of an organization (MSP) id and an opaque subject
//! id. The subject id is what the contract stores as an asset owner and as the
//! buyer in a transfer agreement marker.

use rand::Rng;
use secp256k1::SecretKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Result, TransferError};
use crate::signature::{public_key_hex, sign_message};

/// Identity of the client submitting a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    /// Membership service provider id of the client's organization
    pub msp_id: String,
    /// Opaque subject id, e.g. `x509::CN=user1,OU=client::CN=ca.org1`
    pub id: Vec<u8>,
    /// Hex-encoded compressed secp256k1 public key
    pub public_key: String,
}

impl ClientIdentity {
    /// Subject id as a string, the form stored in `Asset::owner`.
    pub fn id_string(&self) -> Result<String> {
        String::from_utf8(self.id.clone()).map_err(|e| {
            TransferError::Platform(format!("client identity is not valid UTF-8: {}", e))
        })
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.msp_id, String::from_utf8_lossy(&self.id))
    }
}

/// Key pair bound to a client identity.
#[derive(Clone)]
pub struct Signer {
    identity: ClientIdentity,
    secret: SecretKey,
}

impl Signer {
    /// Generates a signer with a fresh random key.
    pub fn generate(msp_id: &str, subject: &str) -> Result<Self> {
        let mut seed = [0u8; 32];
        loop {
            rand::thread_rng().fill(&mut seed);
            if let Ok(secret) = SecretKey::from_slice(&seed) {
                return Ok(Self::with_key(msp_id, subject, secret));
            }
        }
    }

    /// Derives a signer deterministically from a seed phrase.
    pub fn from_seed(msp_id: &str, subject: &str, seed: &str) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(msp_id.as_bytes());
        hasher.update(b":");
        hasher.update(seed.as_bytes());
        let secret = SecretKey::from_slice(&hasher.finalize())?;
        Ok(Self::with_key(msp_id, subject, secret))
    }

    fn with_key(msp_id: &str, subject: &str, secret: SecretKey) -> Self {
        let identity = ClientIdentity {
            msp_id: msp_id.to_string(),
            id: subject.as_bytes().to_vec(),
            public_key: public_key_hex(&secret),
        };
        Self { identity, secret }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Signs any serializable message, returning the compact signature as hex.
    pub fn sign(&self, message: &impl Serialize) -> Result<String> {
        sign_message(&self.secret, message)
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("identity", &self.identity).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::verify_signature;

    #[test]
    fn test_from_seed_is_deterministic() {
        let a = Signer::from_seed("Org1MSP", "user1", "seed").unwrap();
        let b = Signer::from_seed("Org1MSP", "user1", "seed").unwrap();
        assert_eq!(a.identity(), b.identity());

        let other_org = Signer::from_seed("Org2MSP", "user1", "seed").unwrap();
        assert_ne!(a.identity().public_key, other_org.identity().public_key);
    }

    #[test]
    fn test_generated_signer_signs() {
        let signer = Signer::generate("Org1MSP", "user1").unwrap();
        let message = serde_json::json!({"assetID": "id1"});
        let signature = signer.sign(&message).unwrap();
        assert!(verify_signature(&message, &signature, &signer.identity().public_key).unwrap());
    }

    #[test]
    fn test_id_string() {
        let signer = Signer::from_seed("Org1MSP", "x509::CN=user1", "s").unwrap();
        assert_eq!(signer.identity().id_string().unwrap(), "x509::CN=user1");
        assert_eq!(signer.identity().to_string(), "Org1MSP/x509::CN=user1");
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = Signer::from_seed("Org1MSP", "user1", "s").unwrap();
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("Org1MSP"));
        assert!(!rendered.contains("secret"));
    }
}
