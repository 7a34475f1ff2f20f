//! Scripted multi-organization runs against an in-memory [`Ledger`].
//!
//! A scenario file is TOML: an optional `[network]` table (a [`NetworkConfig`]) and
//! a list of `[[step]]` tables. Transient values given as tables are JSON-encoded;
//! string values are passed through as raw bytes, which allows malformed input.
//!
//! ```toml
//! [[step]]
//! org = "Org1MSP"
//! user = "owner"
//! function = "CreateAsset"
//! [step.transient.asset_properties]
//! objectType = "asset"
//! assetID = "asset1"
//! color = "green"
//! size = 20
//! appraisedValue = 100
//! ```

use serde::Deserialize;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use crate::config::{ConfigError, NetworkConfig};
use crate::core::contract::Invocation;
use crate::core::ledger::Ledger;
use crate::core::proposal::Proposal;
use crate::error::{Result, TransferError};
use crate::identity::Signer;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default, rename = "step")]
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioStep {
    /// Label shown in reports; defaults to the function name
    pub name: Option<String>,

    pub org: String,

    /// Subject id of the submitting client
    pub user: String,

    pub function: String,

    /// Named arguments of query functions
    #[serde(default)]
    pub args: toml::Table,

    #[serde(default)]
    pub transient: BTreeMap<String, toml::Value>,

    /// Organization of the executing peer; defaults to `org`
    pub peer: Option<String>,

    /// Expected error kind (see `TransferError::kind`); absent means success
    pub expect_error: Option<String>,

    /// Expected query payload, compared as JSON
    pub expect_output: Option<toml::Value>,
}

impl Scenario {
    pub fn from_file(path: impl AsRef<Path>) -> std::result::Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> std::result::Result<Self, ConfigError> {
        let scenario: Scenario = toml::from_str(contents)?;
        scenario.network.validate()?;
        Ok(scenario)
    }
}

/// Result of one executed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    /// Error kind, or `None` on success
    pub outcome: Option<String>,
    pub message: String,
    pub payload: Vec<u8>,
    pub passed: bool,
}

impl ScenarioStep {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.function)
    }

    fn invocation(&self) -> Result<Invocation> {
        let mut call = serde_json::Map::new();
        call.insert("function".to_string(), serde_json::Value::String(self.function.clone()));
        if !self.args.is_empty() {
            call.insert("args".to_string(), serde_json::to_value(&self.args)?);
        }
        serde_json::from_value(serde_json::Value::Object(call)).map_err(|e| {
            TransferError::Platform(format!("unknown function or arguments {}: {}", self.function, e))
        })
    }

    fn transient_bytes(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut transient = BTreeMap::new();
        for (key, value) in &self.transient {
            let bytes = match value {
                toml::Value::String(raw) => raw.as_bytes().to_vec(),
                other => serde_json::to_vec(other)?,
            };
            transient.insert(key.clone(), bytes);
        }
        Ok(transient)
    }

    fn expected_output(&self) -> Result<Option<serde_json::Value>> {
        self.expect_output
            .as_ref()
            .map(|v| serde_json::to_value(v).map_err(TransferError::from))
            .transpose()
    }
}

/// Executes every step in order on a fresh ledger. Steps never abort the run.
pub fn run_scenario(scenario: &Scenario) -> Result<Vec<StepReport>> {
    let ledger = Ledger::new(scenario.network.clone())?;
    let mut signers: HashMap<(String, String), Signer> = HashMap::new();
    let mut reports = Vec::with_capacity(scenario.steps.len());

    for (index, step) in scenario.steps.iter().enumerate() {
        debug!(step = index, function = %step.function, "running scenario step");
        let result = match signers.entry((step.org.clone(), step.user.clone())) {
            Entry::Occupied(entry) => execute_step(&ledger, entry.get(), step, index as u64),
            Entry::Vacant(entry) => match enroll_signer(&ledger, step) {
                Ok(signer) => execute_step(&ledger, entry.insert(signer), step, index as u64),
                Err(e) => Err(e),
            },
        };
        reports.push(report(step, result)?);
    }
    Ok(reports)
}

fn enroll_signer(ledger: &Ledger, step: &ScenarioStep) -> Result<Signer> {
    let signer = Signer::from_seed(&step.org, &step.user, &format!("{}/{}", step.org, step.user))?;
    ledger.enroll(signer.identity())?;
    Ok(signer)
}

fn execute_step(ledger: &Ledger, signer: &Signer, step: &ScenarioStep, nonce: u64) -> Result<Vec<u8>> {
    let invocation = step.invocation()?;
    let is_query = invocation.is_query();
    let mut proposal = Proposal::new(&ledger.config().channel, signer.identity().clone(), invocation, nonce)?;
    for (key, value) in step.transient_bytes()? {
        proposal = proposal.with_transient(&key, value);
    }
    let signed = proposal.sign(signer)?;

    let peer = step.peer.as_deref().unwrap_or(&step.org);
    let endorsement = ledger.endorse_on(&signed, peer)?;
    if is_query {
        return Ok(endorsement.payload);
    }
    let payload = endorsement.payload.clone();
    ledger.commit(endorsement)?;
    Ok(payload)
}

fn report(step: &ScenarioStep, result: Result<Vec<u8>>) -> Result<StepReport> {
    let (outcome, message, payload) = match result {
        Ok(payload) => (None, "ok".to_string(), payload),
        Err(e) => (Some(e.kind().to_string()), e.to_string(), Vec::new()),
    };

    let mut passed = outcome == step.expect_error;
    if passed {
        if let Some(expected) = step.expected_output()? {
            passed = serde_json::from_slice::<serde_json::Value>(&payload)
                .map(|actual| actual == expected)
                .unwrap_or(false);
        }
    }

    Ok(StepReport {
        name: step.label().to_string(),
        outcome,
        message,
        payload,
        passed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIFECYCLE: &str = r#"
[network]
channel = "mychannel"

[[step]]
org = "Org1MSP"
user = "owner"
function = "CreateAsset"
[step.transient.asset_properties]
objectType = "asset"
assetID = "asset1"
color = "green"
size = 20
appraisedValue = 100

[[step]]
name = "buyer agrees"
org = "Org2MSP"
user = "buyer"
function = "AgreeToTransfer"
[step.transient.asset_value]
assetID = "asset1"
appraisedValue = 100

[[step]]
org = "Org1MSP"
user = "owner"
function = "TransferAsset"
[step.transient.asset_owner]
assetID = "asset1"
buyerMSP = "Org2MSP"

[[step]]
org = "Org2MSP"
user = "buyer"
function = "ReadAsset"
args = { asset_id = "asset1" }
expect_output = { objectType = "asset", assetID = "asset1", color = "green", size = 20, owner = "buyer" }

[[step]]
org = "Org1MSP"
user = "owner"
function = "TransferAsset"
expect_error = "Unauthorized"
[step.transient.asset_owner]
assetID = "asset1"
buyerMSP = "Org2MSP"
"#;

    #[test]
    fn test_lifecycle_scenario_passes() {
        let scenario = Scenario::from_toml_str(LIFECYCLE).unwrap();
        let reports = run_scenario(&scenario).unwrap();
        assert_eq!(reports.len(), 5);
        assert_eq!(reports[1].name, "buyer agrees");
        for r in &reports {
            assert!(r.passed, "step {} failed: {}", r.name, r.message);
        }
        assert_eq!(reports[4].outcome.as_deref(), Some("Unauthorized"));
    }

    #[test]
    fn test_raw_string_transient_is_malformed() {
        let scenario = Scenario::from_toml_str(
            r#"
[[step]]
org = "Org1MSP"
user = "owner"
function = "CreateAsset"
expect_error = "MalformedInput"
transient = { asset_properties = "not json" }
"#,
        )
        .unwrap();
        let reports = run_scenario(&scenario).unwrap();
        assert!(reports[0].passed);
        assert!(reports[0].message.starts_with("failed to unmarshal JSON"));
    }

    #[test]
    fn test_mismatch_is_reported() {
        let scenario = Scenario::from_toml_str(
            r#"
[[step]]
org = "Org1MSP"
user = "owner"
function = "TransferAsset"
"#,
        )
        .unwrap();
        let reports = run_scenario(&scenario).unwrap();
        assert!(!reports[0].passed);
        assert_eq!(reports[0].outcome.as_deref(), Some("MissingInput"));
    }

    #[test]
    fn test_unknown_function_is_platform_error() {
        let scenario = Scenario::from_toml_str(
            r#"
[[step]]
org = "Org1MSP"
user = "owner"
function = "MintAsset"
expect_error = "PlatformError"
"#,
        )
        .unwrap();
        assert!(run_scenario(&scenario).unwrap()[0].passed);
    }

    #[test]
    fn test_wrong_peer_rejected() {
        let scenario = Scenario::from_toml_str(
            r#"
[[step]]
org = "Org1MSP"
user = "owner"
peer = "Org2MSP"
function = "CreateAsset"
expect_error = "Unauthorized"
[step.transient.asset_properties]
objectType = "asset"
assetID = "asset1"
appraisedValue = 100
"#,
        )
        .unwrap();
        let reports = run_scenario(&scenario).unwrap();
        assert!(reports[0].passed, "{}", reports[0].message);
    }

    #[test]
    fn test_unknown_org_fails_only_its_step() {
        let scenario = Scenario::from_toml_str(
            r#"
[[step]]
org = "Org9MSP"
user = "stranger"
function = "ReadAsset"
args = { asset_id = "asset1" }

[[step]]
org = "Org9MSP"
user = "stranger"
function = "ReadAsset"
args = { asset_id = "asset1" }
expect_error = "PlatformError"

[[step]]
org = "Org1MSP"
user = "owner"
function = "ReadAsset"
args = { asset_id = "asset1" }
"#,
        )
        .unwrap();
        let reports = run_scenario(&scenario).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(!reports[0].passed);
        assert_eq!(reports[0].outcome.as_deref(), Some("PlatformError"));
        assert!(reports[0].message.contains("unknown organization Org9MSP"));
        assert!(reports[1].passed);
        assert!(reports[2].passed, "{}", reports[2].message);
    }

    #[test]
    fn test_invalid_network_rejected() {
        let err = Scenario::from_toml_str("[network]\norganizations = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
