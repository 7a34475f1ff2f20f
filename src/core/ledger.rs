//! In-memory reference ledger: the platform side of the contract, in one process.
//!
//! # Endorse / commit
//! `endorse` runs the contract against an immutable snapshot through a [`TxSimulator`],
//! recording the version of every key read and buffering every write. `commit` re-checks
//! those versions under the write lock (MVCC) and applies the whole write set or nothing.
//! Two endorsements built on the same snapshot that touch the same keys cannot both commit.
//!
//! # Private data
//! Every stored value carries its SHA-256 commitment hash. Plaintext reads of a private
//! collection are limited to its member organizations; the hash is readable by anyone.
//!
//! # Invariants
//! - Snapshots are O(1) (`Arc` clone) and never observe later commits.
//! - Reads inside one simulation do not see that simulation's own writes.
//! - Range iteration is key ordered.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CollectionPolicy, NetworkConfig};
use crate::core::commitment::commitment_hash;
use crate::core::contract::{AssetTransferContract, Invocation};
use crate::core::proposal::SignedProposal;
use crate::core::store::{PrivateStore, SharedStore, TransactionContext};
use crate::error::{Result, TransferError};
use crate::identity::ClientIdentity;

/// Ledger height at which a value was last written.
pub type Version = u64;

/// `(collection, key)`
pub type StateKey = (String, String);

/// A committed value with its published commitment hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: Vec<u8>,
    pub hash: Vec<u8>,
    pub version: Version,
}

/// One committed change to a key; `value` is `None` for deletes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub tx_id: String,
    pub version: Version,
    pub value: Option<Vec<u8>>,
}

/// Buffered mutation in a write set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put(Vec<u8>),
    Delete,
    /// Delete and forget history
    Purge,
}

/// Keys and versions observed by one range query, re-checked at commit for phantoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRead {
    pub collection: String,
    pub start: String,
    pub end: String,
    pub results: Vec<(String, Version)>,
}

/// Simulation result awaiting commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endorsement {
    pub tx_id: String,
    pub creator: ClientIdentity,
    pub invocation: Invocation,
    pub read_set: BTreeMap<StateKey, Option<Version>>,
    pub range_reads: Vec<RangeRead>,
    pub write_set: BTreeMap<StateKey, WriteOp>,
    /// Contract return payload
    pub payload: Vec<u8>,
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    pub tx_id: String,
    pub height: u64,
    pub writes: usize,
}

/// Errors produced by the commit phase.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("duplicate transaction id {0}")]
    DuplicateTransaction(String),

    #[error("MVCC read conflict on {0}/{1}")]
    ReadConflict(String, String),

    #[error("phantom read conflict on range [{1}, {2}) of {0}")]
    PhantomRead(String, String, String),
}

impl From<CommitError> for TransferError {
    fn from(err: CommitError) -> Self {
        TransferError::Conflict(err.to_string())
    }
}

fn poisoned<T>(_: T) -> TransferError {
    TransferError::Platform("ledger lock poisoned".to_string())
}

/// Immutable view of the world state at one height.
#[derive(Debug, Clone)]
pub struct LedgerSnapshot {
    entries: Arc<BTreeMap<StateKey, VersionedValue>>,
    height: u64,
}

impl LedgerSnapshot {
    pub fn get(&self, collection: &str, key: &str) -> Option<&VersionedValue> {
        self.entries.get(&(collection.to_string(), key.to_string()))
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key-ordered entries of `collection` with `start <= key < end` (empty `end` is unbounded).
    pub fn range(&self, collection: &str, start: &str, end: &str) -> Vec<(String, &VersionedValue)> {
        self.entries
            .range((collection.to_string(), start.to_string())..)
            .take_while(|((c, k), _)| c == collection && (end.is_empty() || k.as_str() < end))
            .map(|((_, k), v)| (k.clone(), v))
            .collect()
    }
}

#[derive(Debug, Default)]
struct WorldState {
    entries: Arc<BTreeMap<StateKey, VersionedValue>>,
    history: BTreeMap<StateKey, Vec<HistoryEntry>>,
    committed_tx_ids: HashSet<String>,
    height: u64,
}

/// Single-process ledger hosting the asset transfer contract.
#[derive(Debug)]
pub struct Ledger {
    config: NetworkConfig,
    contract: AssetTransferContract,
    policies: BTreeMap<String, CollectionPolicy>,
    world: RwLock<WorldState>,
    /// MSP id -> enrolled public keys
    enrolled: RwLock<HashMap<String, HashSet<String>>>,
}

impl Ledger {
    pub fn new(config: NetworkConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| TransferError::Platform(e.to_string()))?;
        let policies = config
            .collection_policies()
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Ok(Self {
            contract: AssetTransferContract::new(config.contract.clone()),
            config,
            policies,
            world: RwLock::new(WorldState::default()),
            enrolled: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn contract(&self) -> &AssetTransferContract {
        &self.contract
    }

    /// Registers an identity with its organization's membership service.
    pub fn enroll(&self, identity: &ClientIdentity) -> Result<()> {
        if !self.config.organizations.contains(&identity.msp_id) {
            return Err(TransferError::Platform(format!(
                "unknown organization {}",
                identity.msp_id
            )));
        }
        let mut enrolled = self.enrolled.write().map_err(poisoned)?;
        enrolled
            .entry(identity.msp_id.clone())
            .or_default()
            .insert(identity.public_key.clone());
        debug!(identity = %identity, "identity enrolled");
        Ok(())
    }

    fn is_enrolled(&self, identity: &ClientIdentity) -> Result<bool> {
        let enrolled = self.enrolled.read().map_err(poisoned)?;
        Ok(enrolled
            .get(&identity.msp_id)
            .map(|keys| keys.contains(&identity.public_key))
            .unwrap_or(false))
    }

    /// O(1) snapshot of the committed state.
    pub fn snapshot(&self) -> Result<LedgerSnapshot> {
        let world = self.world.read().map_err(poisoned)?;
        Ok(LedgerSnapshot {
            entries: world.entries.clone(),
            height: world.height,
        })
    }

    pub fn height(&self) -> Result<u64> {
        Ok(self.world.read().map_err(poisoned)?.height)
    }

    /// Committed value of any key, bypassing collection policy. For operators and tests.
    pub fn state_value(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshot()?.get(collection, key).map(|v| v.value.clone()))
    }

    /// Published commitment hash of a key.
    pub fn state_hash(&self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshot()?.get(collection, key).map(|v| v.hash.clone()))
    }

    pub fn history(&self, collection: &str, key: &str) -> Result<Vec<HistoryEntry>> {
        let world = self.world.read().map_err(poisoned)?;
        Ok(world
            .history
            .get(&(collection.to_string(), key.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    /// Simulates on a peer of the creator's own organization.
    pub fn endorse(&self, signed: &SignedProposal) -> Result<Endorsement> {
        let peer_org = signed.proposal.creator.msp_id.clone();
        self.endorse_on(signed, &peer_org)
    }

    /// Simulates the proposal on a peer of `peer_org` without touching committed state.
    pub fn endorse_on(&self, signed: &SignedProposal, peer_org: &str) -> Result<Endorsement> {
        let proposal = &signed.proposal;
        signed.validate_basic()?;
        if proposal.channel != self.config.channel {
            return Err(TransferError::Platform(format!(
                "channel {} is not served by this ledger",
                proposal.channel
            )));
        }
        if !self.is_enrolled(&proposal.creator)? {
            return Err(TransferError::Unauthorized(format!(
                "identity {} is not enrolled in {}",
                proposal.creator, proposal.creator.msp_id
            )));
        }
        if !self.config.organizations.iter().any(|o| o == peer_org) {
            return Err(TransferError::Platform(format!("unknown peer organization {}", peer_org)));
        }

        let snapshot = self.snapshot()?;
        let mut simulator = TxSimulator::new(
            snapshot,
            &self.policies,
            &self.config.contract.asset_collection,
            &proposal.creator,
            &proposal.transient,
            peer_org,
        );

        debug!(tx_id = %proposal.tx_id, function = proposal.invocation.name(), "endorsing");
        let payload = match self.contract.invoke(&mut simulator, &proposal.invocation) {
            Ok(payload) => payload,
            Err(e) => {
                info!(
                    tx_id = %proposal.tx_id,
                    function = proposal.invocation.name(),
                    kind = e.kind(),
                    "endorsement failed: {}",
                    e
                );
                return Err(e);
            }
        };

        let (read_set, range_reads, write_set) = simulator.into_rw_sets();
        Ok(Endorsement {
            tx_id: proposal.tx_id.clone(),
            creator: proposal.creator.clone(),
            invocation: proposal.invocation.clone(),
            read_set,
            range_reads,
            write_set,
            payload,
        })
    }

    /// Validates the endorsement's reads against the current state and applies its writes atomically.
    pub fn commit(&self, endorsement: Endorsement) -> Result<CommitReceipt> {
        let mut guard = self.world.write().map_err(poisoned)?;
        let world = &mut *guard;

        if world.committed_tx_ids.contains(&endorsement.tx_id) {
            return Err(CommitError::DuplicateTransaction(endorsement.tx_id).into());
        }

        for ((collection, key), read_version) in &endorsement.read_set {
            let current = world
                .entries
                .get(&(collection.clone(), key.clone()))
                .map(|v| v.version);
            if current != *read_version {
                warn!(tx_id = %endorsement.tx_id, collection = %collection, "MVCC read conflict");
                return Err(CommitError::ReadConflict(collection.clone(), key.clone()).into());
            }
        }

        for range in &endorsement.range_reads {
            let current: Vec<(String, Version)> = world
                .entries
                .range((range.collection.clone(), range.start.clone())..)
                .take_while(|((c, k), _)| {
                    *c == range.collection && (range.end.is_empty() || *k < range.end)
                })
                .map(|((_, k), v)| (k.clone(), v.version))
                .collect();
            if current != range.results {
                warn!(tx_id = %endorsement.tx_id, collection = %range.collection, "phantom read");
                return Err(CommitError::PhantomRead(
                    range.collection.clone(),
                    range.start.clone(),
                    range.end.clone(),
                )
                .into());
            }
        }

        let height = world.height + 1;
        let writes = endorsement.write_set.len();
        let entries = Arc::make_mut(&mut world.entries);
        for (state_key, op) in endorsement.write_set {
            match op {
                WriteOp::Put(value) => {
                    world.history.entry(state_key.clone()).or_default().push(HistoryEntry {
                        tx_id: endorsement.tx_id.clone(),
                        version: height,
                        value: Some(value.clone()),
                    });
                    let hash = commitment_hash(&value);
                    entries.insert(state_key, VersionedValue { value, hash, version: height });
                }
                WriteOp::Delete => {
                    if entries.remove(&state_key).is_some() {
                        world.history.entry(state_key).or_default().push(HistoryEntry {
                            tx_id: endorsement.tx_id.clone(),
                            version: height,
                            value: None,
                        });
                    }
                }
                WriteOp::Purge => {
                    entries.remove(&state_key);
                    world.history.remove(&state_key);
                }
            }
        }
        world.height = height;
        world.committed_tx_ids.insert(endorsement.tx_id.clone());

        info!(
            tx_id = %endorsement.tx_id,
            function = endorsement.invocation.name(),
            height,
            writes,
            "transaction committed"
        );
        Ok(CommitReceipt { tx_id: endorsement.tx_id, height, writes })
    }

    /// Endorses on the creator's peer and commits.
    pub fn submit(&self, signed: &SignedProposal) -> Result<CommitReceipt> {
        if signed.proposal.invocation.is_query() {
            return Err(TransferError::Platform(format!(
                "{} is a query; evaluate it instead",
                signed.proposal.invocation.name()
            )));
        }
        let endorsement = self.endorse(signed)?;
        self.commit(endorsement)
    }

    /// Runs a proposal without committing and returns its payload.
    pub fn evaluate(&self, signed: &SignedProposal) -> Result<Vec<u8>> {
        Ok(self.endorse(signed)?.payload)
    }
}

/// [`TransactionContext`] over a ledger snapshot that records reads and buffers writes.
pub struct TxSimulator<'a> {
    snapshot: LedgerSnapshot,
    policies: &'a BTreeMap<String, CollectionPolicy>,
    shared_collection: &'a str,
    identity: &'a ClientIdentity,
    transient: &'a BTreeMap<String, Vec<u8>>,
    peer_org: &'a str,
    read_set: BTreeMap<StateKey, Option<Version>>,
    range_reads: Vec<RangeRead>,
    write_set: BTreeMap<StateKey, WriteOp>,
}

impl<'a> TxSimulator<'a> {
    pub fn new(
        snapshot: LedgerSnapshot,
        policies: &'a BTreeMap<String, CollectionPolicy>,
        shared_collection: &'a str,
        identity: &'a ClientIdentity,
        transient: &'a BTreeMap<String, Vec<u8>>,
        peer_org: &'a str,
    ) -> Self {
        Self {
            snapshot,
            policies,
            shared_collection,
            identity,
            transient,
            peer_org,
            read_set: BTreeMap::new(),
            range_reads: Vec::new(),
            write_set: BTreeMap::new(),
        }
    }

    pub fn into_rw_sets(
        self,
    ) -> (BTreeMap<StateKey, Option<Version>>, Vec<RangeRead>, BTreeMap<StateKey, WriteOp>) {
        (self.read_set, self.range_reads, self.write_set)
    }

    fn policy(&self, collection: &str) -> Result<&'a CollectionPolicy> {
        self.policies
            .get(collection)
            .ok_or_else(|| TransferError::Platform(format!("collection {} is not defined", collection)))
    }

    fn check_read(&self, collection: &str) -> Result<()> {
        let policy = self.policy(collection)?;
        if !policy.member_orgs.iter().any(|o| o == self.peer_org) {
            return Err(TransferError::Platform(format!(
                "collection {} is not held by peers of organization {}",
                collection, self.peer_org
            )));
        }
        if policy.member_only_read && !policy.member_orgs.contains(&self.identity.msp_id) {
            return Err(TransferError::Platform(format!(
                "collection {} is not readable by organization {}",
                collection, self.identity.msp_id
            )));
        }
        Ok(())
    }

    fn check_write(&self, collection: &str) -> Result<()> {
        let policy = self.policy(collection)?;
        if policy.member_only_write && !policy.member_orgs.contains(&self.identity.msp_id) {
            return Err(TransferError::Platform(format!(
                "collection {} is not writable by organization {}",
                collection, self.identity.msp_id
            )));
        }
        Ok(())
    }

    fn read(&mut self, collection: &str, key: &str) -> Option<&VersionedValue> {
        let state_key = (collection.to_string(), key.to_string());
        let value = self.snapshot.entries.get(&state_key);
        self.read_set.insert(state_key, value.map(|v| v.version));
        value
    }

    fn write(&mut self, collection: &str, key: &str, op: WriteOp) -> Result<()> {
        self.check_write(collection)?;
        if key.is_empty() {
            return Err(TransferError::Platform("key must not be empty".to_string()));
        }
        self.write_set.insert((collection.to_string(), key.to_string()), op);
        Ok(())
    }
}

impl SharedStore for TxSimulator<'_> {
    fn get_shared(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let collection = self.shared_collection;
        self.check_read(collection)?;
        Ok(self.read(collection, key).map(|v| v.value.clone()))
    }

    fn put_shared(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.write(self.shared_collection, key, WriteOp::Put(value))
    }

    fn delete_shared(&mut self, key: &str) -> Result<()> {
        self.write(self.shared_collection, key, WriteOp::Delete)
    }

    fn purge_shared(&mut self, key: &str) -> Result<()> {
        self.write(self.shared_collection, key, WriteOp::Purge)
    }

    fn shared_range(&mut self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let collection = self.shared_collection;
        self.check_read(collection)?;
        let entries = self.snapshot.range(collection, start, end);
        let results = entries.iter().map(|(k, v)| (k.clone(), v.version)).collect();
        let values = entries.into_iter().map(|(k, v)| (k, v.value.clone())).collect();
        self.range_reads.push(RangeRead {
            collection: collection.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            results,
        });
        Ok(values)
    }
}

impl PrivateStore for TxSimulator<'_> {
    fn get_private(&mut self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_read(collection)?;
        Ok(self.read(collection, key).map(|v| v.value.clone()))
    }

    fn put_private(&mut self, collection: &str, key: &str, value: Vec<u8>) -> Result<()> {
        self.write(collection, key, WriteOp::Put(value))
    }

    fn delete_private(&mut self, collection: &str, key: &str) -> Result<()> {
        self.write(collection, key, WriteOp::Delete)
    }

    fn purge_private(&mut self, collection: &str, key: &str) -> Result<()> {
        self.write(collection, key, WriteOp::Purge)
    }

    fn get_private_hash(&mut self, collection: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.policy(collection)?;
        Ok(self.read(collection, key).map(|v| v.hash.clone()))
    }
}

impl TransactionContext for TxSimulator<'_> {
    fn client_identity(&self) -> &ClientIdentity {
        self.identity
    }

    fn transient(&self, key: &str) -> Option<&[u8]> {
        self.transient.get(key).map(|v| v.as_slice())
    }

    fn peer_org(&self) -> Option<&str> {
        Some(self.peer_org)
    }
}
