//! Network and contract configuration.
//!
//! Loaded from TOML; every field has a default so a partial file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings that shape how the contract names and guards its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Shared collection holding assets and transfer agreement markers
    pub asset_collection: String,

    /// Suffix appended to an MSP id to name that organization's private collection
    pub private_collection_suffix: String,

    /// Composite key tag for transfer agreement markers
    pub transfer_agreement_tag: String,

    /// Reject clients whose organization differs from the executing peer's
    pub enforce_peer_org: bool,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            asset_collection: "assetCollection".to_string(),
            private_collection_suffix: "PrivateCollection".to_string(),
            transfer_agreement_tag: "transferAgreement".to_string(),
            enforce_peer_org: true,
        }
    }
}

impl ContractConfig {
    /// Private collection name for an organization, e.g. `Org1MSPPrivateCollection`.
    pub fn private_collection(&self, msp_id: &str) -> String {
        format!("{}{}", msp_id, self.private_collection_suffix)
    }
}

/// Access policy of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPolicy {
    pub name: String,
    /// Organizations allowed to read plaintext values
    pub member_orgs: Vec<String>,
    /// Reads by non-members are rejected
    pub member_only_read: bool,
    /// Writes by non-members are rejected
    pub member_only_write: bool,
}

/// Top-level configuration for a network of organizations sharing one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub channel: String,

    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_level: String,

    /// MSP ids of the member organizations
    pub organizations: Vec<String>,

    pub contract: ContractConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            channel: "mychannel".to_string(),
            log_level: "info".to_string(),
            organizations: vec!["Org1MSP".to_string(), "Org2MSP".to_string()],
            contract: ContractConfig::default(),
        }
    }
}

/// Errors produced while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NetworkConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: NetworkConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.organizations.is_empty() {
            return Err(ConfigError::Invalid("at least one organization is required".to_string()));
        }
        let mut seen = self.organizations.clone();
        seen.sort();
        seen.dedup();
        if seen.len() != self.organizations.len() {
            return Err(ConfigError::Invalid("organization ids must be unique".to_string()));
        }
        if self.contract.asset_collection.is_empty() {
            return Err(ConfigError::Invalid("asset_collection must be non-empty".to_string()));
        }
        if self.contract.transfer_agreement_tag.contains('\u{0}') {
            return Err(ConfigError::Invalid(
                "transfer_agreement_tag must not contain U+0000".to_string(),
            ));
        }
        Ok(())
    }

    /// Collection policies: one shared collection readable by every
    /// organization, plus one private collection per organization.
    pub fn collection_policies(&self) -> Vec<CollectionPolicy> {
        let mut policies = vec![CollectionPolicy {
            name: self.contract.asset_collection.clone(),
            member_orgs: self.organizations.clone(),
            member_only_read: true,
            member_only_write: true,
        }];
        for org in &self.organizations {
            policies.push(CollectionPolicy {
                name: self.contract.private_collection(org),
                member_orgs: vec![org.clone()],
                member_only_read: true,
                // the seller clears the buyer's appraisal on transfer
                member_only_write: false,
            });
        }
        policies
    }
}
