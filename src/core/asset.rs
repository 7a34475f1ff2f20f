//! Asset records, private appraisals, and the transient inputs that create and move them.
//!
//! Serialized field names and order are part of the ledger format: two organizations that
//! declare the same appraisal must write byte-identical records, because equality of the
//! platform commitment hashes over those bytes is what gates a transfer.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// Publicly visible asset, stored in the shared collection keyed by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    #[serde(rename = "objectType")]
    pub object_type: String,
    #[serde(rename = "assetID")]
    pub id: String,
    pub color: String,
    pub size: i64,
    /// Subject id of the current holder
    pub owner: String,
}

/// Confidential appraisal, stored in one organization's private collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrivateDetails {
    #[serde(rename = "assetID")]
    pub id: String,
    #[serde(rename = "appraisedValue")]
    pub appraised_value: i64,
}

impl AssetPrivateDetails {
    /// Canonical bytes as written to the ledger.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Counterparty recorded by AgreeToTransfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferAgreement {
    #[serde(rename = "assetID")]
    pub id: String,
    #[serde(rename = "buyerID")]
    pub buyer_id: String,
}

/// `asset_properties` transient input of CreateAsset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetProperties {
    #[serde(rename = "objectType")]
    pub object_type: String,
    #[serde(rename = "assetID")]
    pub id: String,
    pub color: String,
    pub size: i64,
    #[serde(rename = "appraisedValue")]
    pub appraised_value: i64,
}

/// `asset_value` transient input of AgreeToTransfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetValue {
    #[serde(rename = "assetID")]
    pub id: String,
    #[serde(rename = "appraisedValue")]
    pub appraised_value: i64,
}

/// `asset_owner` transient input of TransferAsset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetTransferInput {
    #[serde(rename = "assetID")]
    pub id: String,
    #[serde(rename = "buyerMSP")]
    pub buyer_msp: String,
}

/// Transient input naming a single asset (delete, purge, withdraw agreement).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetIdInput {
    #[serde(rename = "assetID")]
    pub id: String,
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.is_empty() {
        return Err(TransferError::InvalidField(format!(
            "{} field must be a non-empty string",
            field
        )));
    }
    Ok(())
}

fn require_positive(value: i64, field: &str) -> Result<()> {
    if value <= 0 {
        return Err(TransferError::InvalidField(format!(
            "{} field must be a positive integer",
            field
        )));
    }
    Ok(())
}

/// Field rules applied to a decoded transient input before any ledger access.
pub trait Validate {
    fn validate(&self) -> Result<()>;
}

impl Validate for AssetProperties {
    fn validate(&self) -> Result<()> {
        require_non_empty(&self.id, "assetID")?;
        require_non_empty(&self.object_type, "objectType")?;
        require_positive(self.appraised_value, "appraisedValue")
    }
}

impl Validate for AssetValue {
    fn validate(&self) -> Result<()> {
        require_non_empty(&self.id, "assetID")?;
        require_positive(self.appraised_value, "appraisedValue")
    }
}

impl Validate for AssetTransferInput {
    fn validate(&self) -> Result<()> {
        require_non_empty(&self.buyer_msp, "buyerMSP")?;
        require_non_empty(&self.id, "assetID")
    }
}

impl Validate for AssetIdInput {
    fn validate(&self) -> Result<()> {
        require_non_empty(&self.id, "assetID")
    }
}

/// Decodes and validates a transient blob.
///
/// `name` is the label used in the missing-input message, which is not always the map key.
pub fn decode_input<T>(blob: Option<&[u8]>, name: &str) -> Result<T>
where
    T: DeserializeOwned + Validate,
{
    let bytes = blob.ok_or_else(|| TransferError::MissingInput(name.to_string()))?;
    let input: T = serde_json::from_slice(bytes)
        .map_err(|e| TransferError::MalformedInput(e.to_string()))?;
    input.validate()?;
    Ok(input)
}
