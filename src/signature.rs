use secp256k1::{Secp256k1, SecretKey, PublicKey, Message};
use secp256k1::ecdsa::Signature;
use sha2::{Sha256, Digest};
use serde_json;
use crate::error::{TransferError, Result};

const DOMAIN_SEPARATOR: &str = "AssetTransferProposal:";

/// Hashes a message with domain separator
pub fn hash_message<T: serde::Serialize>(message: &T) -> Result<[u8; 32]> {
    let json = serde_json::to_string(message)
        .map_err(|e| TransferError::Platform(format!("Failed to serialize message: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_SEPARATOR.as_bytes());
    hasher.update(json.as_bytes());
    let hash = hasher.finalize();

    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    Ok(result)
}

/// Signs a message and returns the compact signature as hex
pub fn sign_message(private_key: &SecretKey, message: &impl serde::Serialize) -> Result<String> {
    let secp = Secp256k1::new();

    let hash = hash_message(message)?;
    let msg = Message::from_digest_slice(&hash)
        .map_err(|e| TransferError::Platform(format!("Invalid message hash: {}", e)))?;

    // sign_ecdsa already produces low-S signatures
    let signature = secp.sign_ecdsa(&msg, private_key);
    Ok(hex::encode(signature.serialize_compact()))
}

/// Verifies a compact or DER signature against a hex-encoded public key
pub fn verify_signature(
    message: &impl serde::Serialize,
    signature_hex: &str,
    pub_key_hex: &str,
) -> Result<bool> {
    let secp = Secp256k1::new();

    let hash = hash_message(message)?;
    let msg = Message::from_digest_slice(&hash)
        .map_err(|e| TransferError::Platform(format!("Invalid message hash: {}", e)))?;

    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| TransferError::Unauthorized(format!("Invalid signature hex: {}", e)))?;

    let signature = if sig_bytes.len() == 64 {
        Signature::from_compact(&sig_bytes)
            .map_err(|e| TransferError::Unauthorized(format!("Invalid compact signature: {}", e)))?
    } else {
        Signature::from_der(&sig_bytes)
            .map_err(|e| TransferError::Unauthorized(format!("Invalid DER signature: {}", e)))?
    };

    let pub_key_bytes = hex::decode(pub_key_hex)
        .map_err(|e| TransferError::Unauthorized(format!("Invalid public key hex: {}", e)))?;

    let pub_key = PublicKey::from_slice(&pub_key_bytes)
        .map_err(|e| TransferError::Unauthorized(format!("Invalid public key: {}", e)))?;

    Ok(secp.verify_ecdsa(&msg, &signature, &pub_key).is_ok())
}

/// Hex-encoded compressed public key for a secret key
pub fn public_key_hex(private_key: &SecretKey) -> String {
    let secp = Secp256k1::new();
    hex::encode(PublicKey::from_secret_key(&secp, private_key).serialize())
}
