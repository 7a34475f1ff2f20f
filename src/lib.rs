pub mod config;
pub mod core;
pub mod error;
pub mod identity;
pub mod scenario;
pub mod signature;

pub use config::{CollectionPolicy, ConfigError, ContractConfig, NetworkConfig};
pub use error::{Result, TransferError};
pub use identity::{ClientIdentity, Signer};
pub use scenario::{run_scenario, Scenario, ScenarioStep, StepReport};
pub use signature::{hash_message, public_key_hex, sign_message, verify_signature};

// Core API exports
pub use core::asset::{
    Asset, AssetIdInput, AssetPrivateDetails, AssetProperties, AssetTransferInput, AssetValue,
    TransferAgreement,
};
pub use core::commitment::{appraisal_commitment, commitment_hash, hashes_equal};
pub use core::contract::{
    AssetTransferContract, Invocation, TRANSIENT_AGREEMENT_DELETE, TRANSIENT_ASSET_DELETE,
    TRANSIENT_ASSET_OWNER, TRANSIENT_ASSET_PROPERTIES, TRANSIENT_ASSET_PURGE, TRANSIENT_ASSET_VALUE,
};
pub use core::ledger::{CommitReceipt, Endorsement, HistoryEntry, Ledger, LedgerSnapshot};
pub use core::proposal::{Proposal, SignedProposal};
pub use core::store::{composite_key, PrivateStore, SharedStore, TransactionContext};
