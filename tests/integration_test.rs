use asset_transfer_core::*;
use std::cell::Cell;

const OWNER: &str = "x509::CN=owner,OU=client::CN=ca.org1.example.com";
const BUYER: &str = "x509::CN=buyer,OU=client::CN=ca.org2.example.com";

struct Network {
    ledger: Ledger,
    owner: Signer,
    buyer: Signer,
    nonce: Cell<u64>,
}

impl Network {
    fn new() -> Self {
        let ledger = Ledger::new(NetworkConfig::default()).unwrap();
        let owner = Signer::from_seed("Org1MSP", OWNER, "owner").unwrap();
        let buyer = Signer::from_seed("Org2MSP", BUYER, "buyer").unwrap();
        ledger.enroll(owner.identity()).unwrap();
        ledger.enroll(buyer.identity()).unwrap();
        Self { ledger, owner, buyer, nonce: Cell::new(0) }
    }

    fn proposal(&self, signer: &Signer, invocation: Invocation, transient: Option<(&str, serde_json::Value)>) -> SignedProposal {
        let nonce = self.nonce.get();
        self.nonce.set(nonce + 1);
        let mut proposal = Proposal::new("mychannel", signer.identity().clone(), invocation, nonce).unwrap();
        if let Some((key, value)) = transient {
            proposal = proposal.with_transient_json(key, &value).unwrap();
        }
        proposal.sign(signer).unwrap()
    }

    fn create(&self, signer: &Signer, id: &str, value: i64) -> Result<CommitReceipt> {
        let p = self.proposal(
            signer,
            Invocation::CreateAsset,
            Some((
                TRANSIENT_ASSET_PROPERTIES,
                serde_json::json!({"objectType": "asset", "assetID": id, "color": "green", "size": 20, "appraisedValue": value}),
            )),
        );
        self.ledger.submit(&p)
    }

    fn agree(&self, signer: &Signer, id: &str, value: i64) -> Result<CommitReceipt> {
        let p = self.proposal(
            signer,
            Invocation::AgreeToTransfer,
            Some((TRANSIENT_ASSET_VALUE, serde_json::json!({"assetID": id, "appraisedValue": value}))),
        );
        self.ledger.submit(&p)
    }

    fn transfer(&self, signer: &Signer, id: &str, buyer_msp: &str) -> Result<CommitReceipt> {
        let p = self.proposal(
            signer,
            Invocation::TransferAsset,
            Some((TRANSIENT_ASSET_OWNER, serde_json::json!({"assetID": id, "buyerMSP": buyer_msp}))),
        );
        self.ledger.submit(&p)
    }

    fn read_asset(&self, signer: &Signer, id: &str) -> Option<Asset> {
        let p = self.proposal(signer, Invocation::ReadAsset { asset_id: id.to_string() }, None);
        let payload = self.ledger.evaluate(&p).unwrap();
        if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&payload).unwrap())
        }
    }

    fn read_agreement(&self, signer: &Signer, id: &str) -> Option<TransferAgreement> {
        let p = self.proposal(signer, Invocation::ReadTransferAgreement { asset_id: id.to_string() }, None);
        let payload = self.ledger.evaluate(&p).unwrap();
        if payload.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&payload).unwrap())
        }
    }
}

#[test]
fn test_full_transfer_lifecycle() {
    let net = Network::new();

    net.create(&net.owner, "asset1", 100).unwrap();
    assert_eq!(net.read_asset(&net.buyer, "asset1").unwrap().owner, OWNER);

    net.agree(&net.buyer, "asset1", 100).unwrap();
    let agreement = net.read_agreement(&net.owner, "asset1").unwrap();
    assert_eq!(agreement.buyer_id, BUYER);

    net.transfer(&net.owner, "asset1", "Org2MSP").unwrap();

    let asset = net.read_asset(&net.buyer, "asset1").unwrap();
    assert_eq!(asset.owner, BUYER);
    assert_eq!(asset.color, "green");
    assert_eq!(asset.size, 20);
    assert!(net.read_agreement(&net.buyer, "asset1").is_none());
    assert!(net.ledger.state_value("Org1MSPPrivateCollection", "asset1").unwrap().is_none());
    assert!(net.ledger.state_value("Org2MSPPrivateCollection", "asset1").unwrap().is_none());

    println!("OK: Full transfer lifecycle test passed");
}

#[test]
fn test_replayed_transfer_fails() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();
    net.transfer(&net.owner, "asset1", "Org2MSP").unwrap();

    // the new owner cannot reuse the consumed agreement
    let err = net.transfer(&net.buyer, "asset1", "Org1MSP").unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    assert_eq!(err.to_string(), "BuyerID not found in TransferAgreement for asset1");

    // the previous owner is no longer the owner
    let err = net.transfer(&net.owner, "asset1", "Org2MSP").unwrap_err();
    assert_eq!(err.kind(), "Unauthorized");

    println!("OK: Replayed transfer test passed");
}

#[test]
fn test_mismatched_appraisal_leaves_state_untouched() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 90).unwrap();
    let height = net.ledger.height().unwrap();
    let before = net.ledger.state_value("assetCollection", "asset1").unwrap();

    let err = net.transfer(&net.owner, "asset1", "Org2MSP").unwrap_err();
    assert_eq!(err.kind(), "ConsistencyFailure");
    assert!(err
        .to_string()
        .starts_with("failed transfer verification: hash for appraised value for owner"));

    assert_eq!(net.ledger.height().unwrap(), height);
    assert_eq!(net.ledger.state_value("assetCollection", "asset1").unwrap(), before);
    assert!(net.read_agreement(&net.owner, "asset1").is_some());

    // the buyer corrects the appraisal and the transfer goes through
    net.agree(&net.buyer, "asset1", 100).unwrap();
    net.transfer(&net.owner, "asset1", "Org2MSP").unwrap();
    assert_eq!(net.read_asset(&net.owner, "asset1").unwrap().owner, BUYER);

    println!("OK: Mismatched appraisal test passed");
}

#[test]
fn test_commitments_match_without_disclosure() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();

    let owner_hash = net.ledger.state_hash("Org1MSPPrivateCollection", "asset1").unwrap().unwrap();
    let buyer_hash = net.ledger.state_hash("Org2MSPPrivateCollection", "asset1").unwrap().unwrap();
    assert!(hashes_equal(&owner_hash, &buyer_hash));
    assert_eq!(owner_hash, appraisal_commitment("asset1", 100).unwrap());

    println!("OK: Commitment hash test passed");
}

#[test]
fn test_private_details_visible_to_members_only() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();

    let own = net.proposal(
        &net.owner,
        Invocation::ReadAssetPrivateDetails {
            collection: "Org1MSPPrivateCollection".to_string(),
            asset_id: "asset1".to_string(),
        },
        None,
    );
    let details: AssetPrivateDetails = serde_json::from_slice(&net.ledger.evaluate(&own).unwrap()).unwrap();
    assert_eq!(details.appraised_value, 100);

    let foreign = net.proposal(
        &net.buyer,
        Invocation::ReadAssetPrivateDetails {
            collection: "Org1MSPPrivateCollection".to_string(),
            asset_id: "asset1".to_string(),
        },
        None,
    );
    let err = net.ledger.evaluate(&foreign).unwrap_err();
    assert_eq!(err.kind(), "PlatformError");

    println!("OK: Private data access control test passed");
}

#[test]
fn test_client_must_use_own_org_peer() {
    let net = Network::new();
    let p = net.proposal(
        &net.owner,
        Invocation::CreateAsset,
        Some((
            TRANSIENT_ASSET_PROPERTIES,
            serde_json::json!({"objectType": "asset", "assetID": "asset1", "appraisedValue": 100}),
        )),
    );
    let err = net.ledger.endorse_on(&p, "Org2MSP").unwrap_err();
    assert_eq!(err.kind(), "Unauthorized");
    assert_eq!(
        err.to_string(),
        "client from org Org1MSP is not authorized to read or write private data from an org Org2MSP peer"
    );

    println!("OK: Peer organization check test passed");
}

#[test]
fn test_concurrent_transfers_one_wins() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();

    let first = net.proposal(
        &net.owner,
        Invocation::TransferAsset,
        Some((TRANSIENT_ASSET_OWNER, serde_json::json!({"assetID": "asset1", "buyerMSP": "Org2MSP"}))),
    );
    let second = net.proposal(
        &net.owner,
        Invocation::TransferAsset,
        Some((TRANSIENT_ASSET_OWNER, serde_json::json!({"assetID": "asset1", "buyerMSP": "Org2MSP"}))),
    );
    let e1 = net.ledger.endorse(&first).unwrap();
    let e2 = net.ledger.endorse(&second).unwrap();

    net.ledger.commit(e1).unwrap();
    let err = net.ledger.commit(e2).unwrap_err();
    assert_eq!(err.kind(), "Conflict");
    assert_eq!(net.read_asset(&net.owner, "asset1").unwrap().owner, BUYER);

    println!("OK: Concurrent transfer conflict test passed");
}

#[test]
fn test_agreement_withdrawn() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();

    let withdraw = net.proposal(
        &net.buyer,
        Invocation::DeleteTransferAgreement,
        Some((TRANSIENT_AGREEMENT_DELETE, serde_json::json!({"assetID": "asset1"}))),
    );
    net.ledger.submit(&withdraw).unwrap();
    assert!(net.read_agreement(&net.owner, "asset1").is_none());
    assert!(net.ledger.state_value("Org2MSPPrivateCollection", "asset1").unwrap().is_none());

    let err = net.transfer(&net.owner, "asset1", "Org2MSP").unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    println!("OK: Agreement withdrawal test passed");
}

#[test]
fn test_delete_and_purge() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();

    let by_buyer = net.proposal(
        &net.buyer,
        Invocation::DeleteAsset,
        Some((TRANSIENT_ASSET_DELETE, serde_json::json!({"assetID": "asset1"}))),
    );
    assert_eq!(net.ledger.submit(&by_buyer).unwrap_err().kind(), "Unauthorized");

    let delete = net.proposal(
        &net.owner,
        Invocation::DeleteAsset,
        Some((TRANSIENT_ASSET_DELETE, serde_json::json!({"assetID": "asset1"}))),
    );
    net.ledger.submit(&delete).unwrap();
    assert!(net.read_asset(&net.buyer, "asset1").is_none());
    assert!(net.read_agreement(&net.buyer, "asset1").is_none());
    assert_eq!(net.ledger.history("assetCollection", "asset1").unwrap().len(), 2);

    // the buyer's residual appraisal can be purged once the asset is gone
    let purge = net.proposal(
        &net.buyer,
        Invocation::PurgeAsset,
        Some((TRANSIENT_ASSET_PURGE, serde_json::json!({"assetID": "asset1"}))),
    );
    net.ledger.submit(&purge).unwrap();
    assert!(net.ledger.state_value("Org2MSPPrivateCollection", "asset1").unwrap().is_none());
    assert!(net.ledger.history("assetCollection", "asset1").unwrap().is_empty());

    // the id can be reused and the stale agreement does not carry over
    net.create(&net.owner, "asset1", 300).unwrap();
    let err = net.transfer(&net.owner, "asset1", "Org2MSP").unwrap_err();
    assert_eq!(err.kind(), "NotFound");

    println!("OK: Delete and purge test passed");
}

#[test]
fn test_purge_drops_pending_agreement() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();

    let purge = net.proposal(
        &net.owner,
        Invocation::PurgeAsset,
        Some((TRANSIENT_ASSET_PURGE, serde_json::json!({"assetID": "asset1"}))),
    );
    net.ledger.submit(&purge).unwrap();
    assert!(net.read_agreement(&net.owner, "asset1").is_none());

    // the buyer's residual appraisal alone must not arm a transfer of a re-created asset
    net.create(&net.owner, "asset1", 100).unwrap();
    let err = net.transfer(&net.owner, "asset1", "Org2MSP").unwrap_err();
    assert_eq!(err.kind(), "NotFound");
    assert_eq!(net.read_asset(&net.owner, "asset1").unwrap().owner, OWNER);

    println!("OK: Purge drops pending agreement test passed");
}

#[test]
fn test_range_and_owner_queries() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();
    net.create(&net.owner, "asset2", 200).unwrap();
    net.create(&net.buyer, "asset3", 300).unwrap();
    net.agree(&net.buyer, "asset1", 100).unwrap();

    let range = net.proposal(
        &net.owner,
        Invocation::GetAssetByRange { start_key: "asset1".to_string(), end_key: "asset3".to_string() },
        None,
    );
    let assets: Vec<Asset> = serde_json::from_slice(&net.ledger.evaluate(&range).unwrap()).unwrap();
    assert_eq!(assets.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["asset1", "asset2"]);

    let by_owner = net.proposal(
        &net.owner,
        Invocation::QueryAssetByOwner { object_type: "asset".to_string(), owner: BUYER.to_string() },
        None,
    );
    let assets: Vec<Asset> = serde_json::from_slice(&net.ledger.evaluate(&by_owner).unwrap()).unwrap();
    assert_eq!(assets.len(), 1);
    assert_eq!(assets[0].id, "asset3");

    println!("OK: Query test passed");
}

#[test]
fn test_phantom_range_read_conflict() {
    let net = Network::new();
    net.create(&net.owner, "asset1", 100).unwrap();

    let range = net.proposal(
        &net.owner,
        Invocation::GetAssetByRange { start_key: String::new(), end_key: String::new() },
        None,
    );
    let endorsement = net.ledger.endorse(&range).unwrap();
    net.create(&net.owner, "asset2", 100).unwrap();

    let err = net.ledger.commit(endorsement).unwrap_err();
    assert_eq!(err.kind(), "Conflict");
    assert!(err.to_string().contains("phantom read"));

    println!("OK: Phantom read test passed");
}

#[test]
fn test_tampered_proposal_rejected() {
    let net = Network::new();
    let mut p = net.proposal(
        &net.owner,
        Invocation::CreateAsset,
        Some((
            TRANSIENT_ASSET_PROPERTIES,
            serde_json::json!({"objectType": "asset", "assetID": "asset1", "appraisedValue": 100}),
        )),
    );
    p.proposal.transient.insert(
        TRANSIENT_ASSET_PROPERTIES.to_string(),
        br#"{"objectType":"asset","assetID":"asset1","appraisedValue":1}"#.to_vec(),
    );
    let err = net.ledger.submit(&p).unwrap_err();
    assert_eq!(err.kind(), "Unauthorized");
    assert_eq!(net.ledger.height().unwrap(), 0);

    println!("OK: Tampered proposal test passed");
}

#[test]
fn test_config_from_file_drives_collections() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("network.toml");
    std::fs::write(
        &path,
        r#"
channel = "trade"
organizations = ["SellerMSP", "BuyerMSP"]

[contract]
private_collection_suffix = "Vault"
"#,
    )
    .unwrap();

    let config = NetworkConfig::from_file(&path).unwrap();
    let ledger = Ledger::new(config).unwrap();
    let seller = Signer::from_seed("SellerMSP", "seller", "s").unwrap();
    ledger.enroll(seller.identity()).unwrap();

    let p = Proposal::new("trade", seller.identity().clone(), Invocation::CreateAsset, 0)
        .unwrap()
        .with_transient_json(
            TRANSIENT_ASSET_PROPERTIES,
            &serde_json::json!({"objectType": "asset", "assetID": "asset1", "appraisedValue": 5}),
        )
        .unwrap()
        .sign(&seller)
        .unwrap();
    ledger.submit(&p).unwrap();
    assert!(ledger.state_value("SellerMSPVault", "asset1").unwrap().is_some());

    println!("OK: Config file test passed");
}
