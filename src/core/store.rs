//! Ledger capabilities consumed by the contract for the span of one transaction.
//!
//! The shared collection and the organization-private collections are separate
//! capabilities even where a platform backs both with the same primitive.

use crate::error::{Result, TransferError};
use crate::identity::ClientIdentity;

const COMPOSITE_KEY_NAMESPACE: char = '\u{0}';

/// Builds a composite key: `\0` + tag + `\0` + each part followed by `\0`.
///
/// Tags and parts must not contain `\0`, which keeps keys unambiguous and
/// guarantees composite keys never collide with plain asset ids.
pub fn composite_key(tag: &str, parts: &[&str]) -> Result<String> {
    if tag.is_empty() {
        return Err(TransferError::Platform("composite key tag must be non-empty".to_string()));
    }
    let mut key = String::with_capacity(tag.len() + 2 + parts.iter().map(|p| p.len() + 1).sum::<usize>());
    key.push(COMPOSITE_KEY_NAMESPACE);
    for component in std::iter::once(&tag).chain(parts.iter()) {
        if component.contains(COMPOSITE_KEY_NAMESPACE) {
            return Err(TransferError::Platform(format!(
                "composite key component {:?} contains U+0000",
                component
            )));
        }
        key.push_str(component);
        key.push(COMPOSITE_KEY_NAMESPACE);
    }
    Ok(key)
}

/// True for keys produced by [`composite_key`].
pub fn is_composite_key(key: &str) -> bool {
    key.starts_with(COMPOSITE_KEY_NAMESPACE)
}

/// Channel-wide collection readable by every member.
pub trait SharedStore {
    fn get_shared(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put_shared(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    fn delete_shared(&mut self, key: &str) -> Result<()>;

    /// Deletes the value and its history.
    fn purge_shared(&mut self, key: &str) -> Result<()>;

    /// Key-ordered entries with `start <= key < end`; an empty `end` is unbounded.
    fn shared_range(&mut self, start: &str, end: &str) -> Result<Vec<(String, Vec<u8>)>>;

    fn create_composite_key(&self, tag: &str, parts: &[&str]) -> Result<String> {
        composite_key(tag, parts)
    }
}

/// Organization-scoped collections, addressed by collection name.
pub trait PrivateStore {
    fn get_private(&mut self, collection: &str, key: &str) -> Result<Option<Vec<u8>>>;

    fn put_private(&mut self, collection: &str, key: &str, value: Vec<u8>) -> Result<()>;

    fn delete_private(&mut self, collection: &str, key: &str) -> Result<()>;

    fn purge_private(&mut self, collection: &str, key: &str) -> Result<()>;

    /// Platform-published commitment hash of a private value. Readable by any
    /// organization, including non-members of the collection.
    fn get_private_hash(&mut self, collection: &str, key: &str) -> Result<Option<Vec<u8>>>;
}

/// Everything one invocation may observe about its caller and inputs.
///
/// Reads take `&mut self` so that implementations can record read sets.
pub trait TransactionContext: SharedStore + PrivateStore {
    fn client_identity(&self) -> &ClientIdentity;

    /// Off-ledger parameter delivered with this invocation only.
    fn transient(&self, key: &str) -> Option<&[u8]>;

    /// Organization of the peer executing the invocation, when known.
    fn peer_org(&self) -> Option<&str> {
        None
    }
}
