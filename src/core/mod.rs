// Core module: the asset transfer contract and the ledger that hosts it
//
// DETERMINISM GUARANTEES:
// =======================
// 1. Same committed transactions in the same order → same world state
// 2. No randomness or system time in the contract or in commit
// 3. Commitment hashes are SHA-256 over the exact stored bytes
// 4. Range iteration is key ordered (BTreeMap)
//
// INVARIANTS:
// - A failed invocation leaves no writes behind
// - The contract reaches state only through the TransactionContext it is handed
// - Private plaintext never leaves its collection; only its hash is shared

pub mod asset;
pub mod commitment;
pub mod contract;
pub mod ledger;
pub mod proposal;
pub mod store;

pub use asset::{
    Asset, AssetIdInput, AssetPrivateDetails, AssetProperties, AssetTransferInput, AssetValue,
    TransferAgreement,
};
pub use commitment::{appraisal_commitment, commitment_hash, hashes_equal};
pub use contract::{AssetTransferContract, Invocation};
pub use ledger::{
    CommitError, CommitReceipt, Endorsement, HistoryEntry, Ledger, LedgerSnapshot, TxSimulator,
    VersionedValue, WriteOp,
};
pub use proposal::{Proposal, ProposalValidationError, SignedProposal};
pub use store::{composite_key, is_composite_key, PrivateStore, SharedStore, TransactionContext};
