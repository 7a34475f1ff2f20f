//! Commitment hashes over private values.
//!
//! The platform publishes a SHA-256 digest of every private write. Two parties
//! that declare the same value produce the same digest without either seeing the
//! other's plaintext.

use sha2::{Digest, Sha256};

use crate::core::asset::AssetPrivateDetails;
use crate::error::Result;

/// Digest the ledger publishes for a private value.
pub fn commitment_hash(value: &[u8]) -> Vec<u8> {
    Sha256::digest(value).to_vec()
}

/// Commitment an organization will publish when it records this appraisal.
pub fn appraisal_commitment(asset_id: &str, appraised_value: i64) -> Result<Vec<u8>> {
    let details = AssetPrivateDetails {
        id: asset_id.to_string(),
        appraised_value,
    };
    Ok(commitment_hash(&details.to_bytes()?))
}

/// Equality of two externally supplied commitments.
///
/// Runs in time independent of where the inputs differ. Empty commitments never match.
pub fn hashes_equal(h1: &[u8], h2: &[u8]) -> bool {
    if h1.is_empty() || h1.len() != h2.len() {
        return false;
    }
    h1.iter().zip(h2).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_hashes() {
        assert!(hashes_equal(b"datahash", b"datahash"));
    }

    #[test]
    fn test_different_hashes() {
        assert!(!hashes_equal(b"datahash1", b"datahash2"));
        assert!(!hashes_equal(b"datahash", b"datahash1"));
    }

    #[test]
    fn test_empty_never_matches() {
        assert!(!hashes_equal(b"", b""));
        assert!(!hashes_equal(b"", b"x"));
    }

    #[test]
    fn test_same_appraisal_same_commitment() {
        let a = appraisal_commitment("id1", 500).unwrap();
        let b = appraisal_commitment("id1", 500).unwrap();
        let c = appraisal_commitment("id1", 501).unwrap();
        assert_eq!(a.len(), 32);
        assert!(hashes_equal(&a, &b));
        assert!(!hashes_equal(&a, &c));
    }

    #[test]
    fn test_commitment_matches_stored_bytes() {
        let bytes = br#"{"assetID":"id1","appraisedValue":500}"#;
        assert_eq!(commitment_hash(bytes), appraisal_commitment("id1", 500).unwrap());
    }
}
