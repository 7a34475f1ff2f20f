//! The asset transfer contract.
//!
//! # Transfer cycle
//! Per asset id: `Created` → AgreeToTransfer → `AgreementPending` → TransferAsset →
//! `Created` under the new owner. A failed gate leaves the state untouched; the
//! platform discards the writes of any invocation that returns an error.
//!
//! # Commitment check
//! Neither party discloses its appraised value to the other or to the contract.
//! TransferAsset compares the commitment hashes the platform published for the
//! owner's and the buyer's private appraisals and proceeds only when they are equal.
//!
//! # Open authorization gap
//! AgreeToTransfer accepts any caller, including the current owner, and TransferAsset
//! trusts whatever identity the marker holds. `buyerMSP` is only used to locate the
//! buyer's collection and is not checked against the marker's identity.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ContractConfig;
use crate::core::asset::{
    decode_input, Asset, AssetIdInput, AssetPrivateDetails, AssetProperties, AssetTransferInput,
    AssetValue, TransferAgreement,
};
use crate::core::commitment::hashes_equal;
use crate::core::store::{is_composite_key, TransactionContext};
use crate::error::{Result, TransferError};

pub const TRANSIENT_ASSET_PROPERTIES: &str = "asset_properties";
pub const TRANSIENT_ASSET_VALUE: &str = "asset_value";
pub const TRANSIENT_ASSET_OWNER: &str = "asset_owner";
pub const TRANSIENT_ASSET_DELETE: &str = "asset_delete";
pub const TRANSIENT_ASSET_PURGE: &str = "asset_purge";
pub const TRANSIENT_AGREEMENT_DELETE: &str = "agreement_delete";

/// A contract entry point with its positional arguments.
///
/// Submit functions carry no arguments; their parameters arrive as transient data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "function", content = "args")]
pub enum Invocation {
    CreateAsset,
    AgreeToTransfer,
    TransferAsset,
    DeleteAsset,
    PurgeAsset,
    DeleteTransferAgreement,
    ReadAsset { asset_id: String },
    ReadAssetPrivateDetails { collection: String, asset_id: String },
    ReadTransferAgreement { asset_id: String },
    GetAssetByRange { start_key: String, end_key: String },
    QueryAssetByOwner { object_type: String, owner: String },
}

impl Invocation {
    /// Queries never write; their endorsement is not meant to be committed.
    pub fn is_query(&self) -> bool {
        matches!(
            self,
            Invocation::ReadAsset { .. }
                | Invocation::ReadAssetPrivateDetails { .. }
                | Invocation::ReadTransferAgreement { .. }
                | Invocation::GetAssetByRange { .. }
                | Invocation::QueryAssetByOwner { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Invocation::CreateAsset => "CreateAsset",
            Invocation::AgreeToTransfer => "AgreeToTransfer",
            Invocation::TransferAsset => "TransferAsset",
            Invocation::DeleteAsset => "DeleteAsset",
            Invocation::PurgeAsset => "PurgeAsset",
            Invocation::DeleteTransferAgreement => "DeleteTransferAgreement",
            Invocation::ReadAsset { .. } => "ReadAsset",
            Invocation::ReadAssetPrivateDetails { .. } => "ReadAssetPrivateDetails",
            Invocation::ReadTransferAgreement { .. } => "ReadTransferAgreement",
            Invocation::GetAssetByRange { .. } => "GetAssetByRange",
            Invocation::QueryAssetByOwner { .. } => "QueryAssetByOwner",
        }
    }
}

fn encode_query_result<T: Serialize>(result: Option<T>) -> Result<Vec<u8>> {
    match result {
        Some(value) => Ok(serde_json::to_vec(&value)?),
        None => Ok(Vec::new()),
    }
}

/// Confidential asset transfer between organizations.
#[derive(Debug, Clone, Default)]
pub struct AssetTransferContract {
    config: ContractConfig,
}

impl AssetTransferContract {
    pub fn new(config: ContractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// Dispatches an invocation; returns the JSON payload of queries, empty for submits.
    pub fn invoke<C: TransactionContext>(&self, ctx: &mut C, invocation: &Invocation) -> Result<Vec<u8>> {
        match invocation {
            Invocation::CreateAsset => self.create_asset(ctx).map(|_| Vec::new()),
            Invocation::AgreeToTransfer => self.agree_to_transfer(ctx).map(|_| Vec::new()),
            Invocation::TransferAsset => self.transfer_asset(ctx).map(|_| Vec::new()),
            Invocation::DeleteAsset => self.delete_asset(ctx).map(|_| Vec::new()),
            Invocation::PurgeAsset => self.purge_asset(ctx).map(|_| Vec::new()),
            Invocation::DeleteTransferAgreement => {
                self.delete_transfer_agreement(ctx).map(|_| Vec::new())
            }
            Invocation::ReadAsset { asset_id } => encode_query_result(self.read_asset(ctx, asset_id)?),
            Invocation::ReadAssetPrivateDetails { collection, asset_id } => {
                encode_query_result(self.read_asset_private_details(ctx, collection, asset_id)?)
            }
            Invocation::ReadTransferAgreement { asset_id } => {
                encode_query_result(self.read_transfer_agreement(ctx, asset_id)?)
            }
            Invocation::GetAssetByRange { start_key, end_key } => {
                encode_query_result(Some(self.get_asset_by_range(ctx, start_key, end_key)?))
            }
            Invocation::QueryAssetByOwner { object_type, owner } => {
                encode_query_result(Some(self.query_asset_by_owner(ctx, object_type, owner)?))
            }
        }
    }

    /// Registers a new asset owned by the caller and records the caller's appraisal
    /// in its own private collection.
    pub fn create_asset<C: TransactionContext>(&self, ctx: &mut C) -> Result<()> {
        let input: AssetProperties = decode_input(ctx.transient(TRANSIENT_ASSET_PROPERTIES), "asset")?;
        self.verify_client_org_matches_peer_org(ctx)?;
        debug!(asset_id = %input.id, "CreateAsset");

        if ctx.get_shared(&input.id)?.is_some() {
            return Err(TransferError::Conflict(format!("this asset already exists: {}", input.id)));
        }

        let owner = ctx.client_identity().id_string()?;
        let asset = Asset {
            object_type: input.object_type,
            id: input.id.clone(),
            color: input.color,
            size: input.size,
            owner,
        };
        ctx.put_shared(&asset.id, serde_json::to_vec(&asset)?)?;

        let details = AssetPrivateDetails {
            id: input.id.clone(),
            appraised_value: input.appraised_value,
        };
        let collection = self.client_collection(ctx);
        ctx.put_private(&collection, &details.id, details.to_bytes()?)?;

        info!(asset_id = %input.id, collection = %collection, "asset created");
        Ok(())
    }

    /// Records the caller's appraisal and publishes the caller as the counterparty.
    ///
    /// Does not mutate the asset and does not check who the caller is relative to the owner.
    pub fn agree_to_transfer<C: TransactionContext>(&self, ctx: &mut C) -> Result<()> {
        let input: AssetValue = decode_input(ctx.transient(TRANSIENT_ASSET_VALUE), "asset_value")?;
        self.verify_client_org_matches_peer_org(ctx)?;
        debug!(asset_id = %input.id, "AgreeToTransfer");

        if self.read_asset(ctx, &input.id)?.is_none() {
            return Err(TransferError::NotFound(format!("{} does not exist", input.id)));
        }

        let details = AssetPrivateDetails {
            id: input.id.clone(),
            appraised_value: input.appraised_value,
        };
        let collection = self.client_collection(ctx);
        ctx.put_private(&collection, &details.id, details.to_bytes()?)?;

        let key = self.transfer_agreement_key(ctx, &input.id)?;
        let buyer = ctx.client_identity().id.clone();
        ctx.put_shared(&key, buyer)?;

        info!(asset_id = %input.id, buyer = %ctx.client_identity(), "transfer agreement recorded");
        Ok(())
    }

    /// Identity recorded by AgreeToTransfer, if any.
    pub fn read_transfer_agreement<C: TransactionContext>(
        &self,
        ctx: &mut C,
        asset_id: &str,
    ) -> Result<Option<TransferAgreement>> {
        let key = self.transfer_agreement_key(ctx, asset_id)?;
        match ctx.get_shared(&key)? {
            Some(buyer) if !buyer.is_empty() => {
                let buyer_id = String::from_utf8(buyer).map_err(|e| {
                    TransferError::Platform(format!("transfer agreement for {} is not UTF-8: {}", asset_id, e))
                })?;
                Ok(Some(TransferAgreement { id: asset_id.to_string(), buyer_id }))
            }
            _ => Ok(None),
        }
    }

    /// Moves ownership to the agreed buyer once both appraisals commit to the same value.
    pub fn transfer_asset<C: TransactionContext>(&self, ctx: &mut C) -> Result<()> {
        let input: AssetTransferInput = decode_input(ctx.transient(TRANSIENT_ASSET_OWNER), "asset_owner")?;
        self.verify_client_org_matches_peer_org(ctx)?;
        debug!(asset_id = %input.id, buyer_msp = %input.buyer_msp, "TransferAsset");

        let mut asset = self
            .read_asset(ctx, &input.id)?
            .ok_or_else(|| TransferError::NotFound(format!("{} does not exist", input.id)))?;

        let caller = ctx.client_identity().id_string()?;
        if caller != asset.owner {
            warn!(asset_id = %input.id, caller = %ctx.client_identity(), "transfer attempted by non-owner");
            return Err(TransferError::Unauthorized(
                "failed transfer verification: error: submitting client identity does not own asset"
                    .to_string(),
            ));
        }

        let agreement = self.read_transfer_agreement(ctx, &input.id)?.ok_or_else(|| {
            TransferError::NotFound(format!("BuyerID not found in TransferAgreement for {}", input.id))
        })?;

        let owner_collection = self.client_collection(ctx);
        let buyer_collection = self.config.private_collection(&input.buyer_msp);
        self.verify_appraisal_commitments(ctx, &input.id, &owner_collection, &buyer_collection)?;

        asset.owner = agreement.buyer_id;
        ctx.put_shared(&asset.id, serde_json::to_vec(&asset)?)?;
        ctx.delete_private(&owner_collection, &input.id)?;
        ctx.delete_private(&buyer_collection, &input.id)?;
        let key = self.transfer_agreement_key(ctx, &input.id)?;
        ctx.delete_shared(&key)?;

        info!(asset_id = %input.id, buyer_msp = %input.buyer_msp, "asset transferred");
        Ok(())
    }

    /// Removes an asset and the owner's appraisal. Only the owner may delete.
    pub fn delete_asset<C: TransactionContext>(&self, ctx: &mut C) -> Result<()> {
        let input: AssetIdInput = decode_input(ctx.transient(TRANSIENT_ASSET_DELETE), "asset_delete")?;
        self.verify_client_org_matches_peer_org(ctx)?;
        debug!(asset_id = %input.id, "DeleteAsset");

        let asset = self
            .read_asset(ctx, &input.id)?
            .ok_or_else(|| TransferError::NotFound(format!("{} does not exist", input.id)))?;
        self.verify_owner(ctx, &asset)?;

        let owner_collection = self.client_collection(ctx);
        if ctx.get_private(&owner_collection, &input.id)?.is_none() {
            return Err(TransferError::NotFound(format!(
                "failed to read asset from owner's collection: {}",
                input.id
            )));
        }

        ctx.delete_shared(&input.id)?;
        ctx.delete_private(&owner_collection, &input.id)?;

        // a stale marker would otherwise arm a transfer of a re-created asset
        let key = self.transfer_agreement_key(ctx, &input.id)?;
        if ctx.get_shared(&key)?.is_some() {
            ctx.delete_shared(&key)?;
        }

        info!(asset_id = %input.id, "asset deleted");
        Ok(())
    }

    /// Purges the asset and the caller's appraisal, history included.
    ///
    /// A live asset may only be purged by its owner; an already deleted one by anyone
    /// holding residual private data for it.
    pub fn purge_asset<C: TransactionContext>(&self, ctx: &mut C) -> Result<()> {
        let input: AssetIdInput = decode_input(ctx.transient(TRANSIENT_ASSET_PURGE), "asset_purge")?;
        self.verify_client_org_matches_peer_org(ctx)?;
        debug!(asset_id = %input.id, "PurgeAsset");

        if let Some(asset) = self.read_asset(ctx, &input.id)? {
            self.verify_owner(ctx, &asset)?;
        }

        let owner_collection = self.client_collection(ctx);
        ctx.purge_shared(&input.id)?;
        ctx.purge_private(&owner_collection, &input.id)?;

        let key = self.transfer_agreement_key(ctx, &input.id)?;
        if ctx.get_shared(&key)?.is_some() {
            ctx.delete_shared(&key)?;
        }

        info!(asset_id = %input.id, "asset purged");
        Ok(())
    }

    /// Withdraws a pending agreement: deletes the caller's appraisal and the marker.
    pub fn delete_transfer_agreement<C: TransactionContext>(&self, ctx: &mut C) -> Result<()> {
        let input: AssetIdInput =
            decode_input(ctx.transient(TRANSIENT_AGREEMENT_DELETE), "agreement_delete")?;
        self.verify_client_org_matches_peer_org(ctx)?;
        debug!(asset_id = %input.id, "DeleteTransferAgreement");

        if self.read_transfer_agreement(ctx, &input.id)?.is_none() {
            return Err(TransferError::NotFound(format!(
                "asset's transfer_agreement does not exist: {}",
                input.id
            )));
        }

        let collection = self.client_collection(ctx);
        ctx.delete_private(&collection, &input.id)?;
        let key = self.transfer_agreement_key(ctx, &input.id)?;
        ctx.delete_shared(&key)?;

        info!(asset_id = %input.id, "transfer agreement withdrawn");
        Ok(())
    }

    pub fn read_asset<C: TransactionContext>(&self, ctx: &mut C, asset_id: &str) -> Result<Option<Asset>> {
        match ctx.get_shared(asset_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn read_asset_private_details<C: TransactionContext>(
        &self,
        ctx: &mut C,
        collection: &str,
        asset_id: &str,
    ) -> Result<Option<AssetPrivateDetails>> {
        self.verify_client_org_matches_peer_org(ctx)?;
        match ctx.get_private(collection, asset_id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Assets with `start_key <= id < end_key` in id order; transfer markers are skipped.
    pub fn get_asset_by_range<C: TransactionContext>(
        &self,
        ctx: &mut C,
        start_key: &str,
        end_key: &str,
    ) -> Result<Vec<Asset>> {
        let mut assets = Vec::new();
        for (key, bytes) in ctx.shared_range(start_key, end_key)? {
            if is_composite_key(&key) {
                continue;
            }
            assets.push(serde_json::from_slice(&bytes)?);
        }
        Ok(assets)
    }

    pub fn query_asset_by_owner<C: TransactionContext>(
        &self,
        ctx: &mut C,
        object_type: &str,
        owner: &str,
    ) -> Result<Vec<Asset>> {
        let assets = self.get_asset_by_range(ctx, "", "")?;
        Ok(assets
            .into_iter()
            .filter(|a| a.object_type == object_type && a.owner == owner)
            .collect())
    }

    fn client_collection<C: TransactionContext>(&self, ctx: &C) -> String {
        self.config.private_collection(&ctx.client_identity().msp_id)
    }

    fn transfer_agreement_key<C: TransactionContext>(&self, ctx: &C, asset_id: &str) -> Result<String> {
        ctx.create_composite_key(&self.config.transfer_agreement_tag, &[asset_id])
    }

    fn verify_owner<C: TransactionContext>(&self, ctx: &C, asset: &Asset) -> Result<()> {
        if ctx.client_identity().id_string()? != asset.owner {
            return Err(TransferError::Unauthorized(
                "submitting client identity does not own asset".to_string(),
            ));
        }
        Ok(())
    }

    /// A client may only touch private data through a peer of its own organization.
    fn verify_client_org_matches_peer_org<C: TransactionContext>(&self, ctx: &C) -> Result<()> {
        if !self.config.enforce_peer_org {
            return Ok(());
        }
        let client_org = &ctx.client_identity().msp_id;
        match ctx.peer_org() {
            Some(peer_org) if peer_org != client_org => Err(TransferError::Unauthorized(format!(
                "client from org {} is not authorized to read or write private data from an org {} peer",
                client_org, peer_org
            ))),
            _ => Ok(()),
        }
    }

    fn verify_appraisal_commitments<C: TransactionContext>(
        &self,
        ctx: &mut C,
        asset_id: &str,
        owner_collection: &str,
        buyer_collection: &str,
    ) -> Result<()> {
        let owner_hash = ctx.get_private_hash(owner_collection, asset_id)?.ok_or_else(|| {
            TransferError::NotFound(format!(
                "hash of appraised value for {} does not exist in collection {}",
                asset_id, owner_collection
            ))
        })?;
        let buyer_hash = ctx.get_private_hash(buyer_collection, asset_id)?.ok_or_else(|| {
            TransferError::NotFound(format!(
                "hash of appraised value for {} does not exist in collection {}. AgreeToTransfer must be called by the buyer first",
                asset_id, buyer_collection
            ))
        })?;

        if !hashes_equal(&owner_hash, &buyer_hash) {
            warn!(asset_id = %asset_id, "appraisal commitments differ");
            return Err(TransferError::ConsistencyFailure(format!(
                "failed transfer verification: hash for appraised value for owner {} and buyer {} do not match",
                hex::encode(&owner_hash),
                hex::encode(&buyer_hash)
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_serde_shape() {
        let json = serde_json::to_string(&Invocation::ReadAsset { asset_id: "id1".to_string() }).unwrap();
        assert_eq!(json, r#"{"function":"ReadAsset","args":{"asset_id":"id1"}}"#);

        let parsed: Invocation = serde_json::from_str(r#"{"function":"TransferAsset"}"#).unwrap();
        assert_eq!(parsed, Invocation::TransferAsset);
    }

    #[test]
    fn test_query_classification() {
        assert!(!Invocation::CreateAsset.is_query());
        assert!(!Invocation::DeleteTransferAgreement.is_query());
        assert!(Invocation::ReadTransferAgreement { asset_id: "id1".to_string() }.is_query());
        assert_eq!(Invocation::AgreeToTransfer.name(), "AgreeToTransfer");
    }

    #[test]
    fn test_empty_query_result() {
        assert!(encode_query_result::<Asset>(None).unwrap().is_empty());
        assert_eq!(encode_query_result(Some(Vec::<Asset>::new())).unwrap(), b"[]".to_vec());
    }
}
