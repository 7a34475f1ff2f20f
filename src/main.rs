use anyhow::{bail, Context};
use asset_transfer_core::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-transfer-cli")]
#[command(about = "Asset Transfer CLI - Confidential asset transfers between organizations")]
#[command(version = "1.0.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a create / agree / transfer cycle between the first two organizations
    Demo {
        /// Network configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Execute a scenario file and report each step
    Run {
        /// Scenario file (TOML)
        #[arg(short, long)]
        scenario: PathBuf,
    },

    /// Print the commitment hash an appraisal will publish
    Hash {
        #[arg(long)]
        asset_id: String,

        #[arg(long)]
        appraised_value: i64,
    },
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Demo { config } => handle_demo(config),
        Commands::Run { scenario } => handle_run(scenario),
        Commands::Hash {
            asset_id,
            appraised_value,
        } => handle_hash(asset_id, appraised_value),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<NetworkConfig> {
    match path {
        Some(path) => NetworkConfig::from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(NetworkConfig::default()),
    }
}

fn submit(ledger: &Ledger, signer: &Signer, proposal: Proposal) -> anyhow::Result<()> {
    let function = proposal.invocation.name();
    let receipt = ledger
        .submit(&proposal.sign(signer)?)
        .with_context(|| format!("{} failed", function))?;
    println!("{:<16} committed at height {} ({} writes)", function, receipt.height, receipt.writes);
    Ok(())
}

fn handle_demo(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    init_tracing(&config.log_level);

    if config.organizations.len() < 2 {
        bail!("the demo needs at least two organizations");
    }
    let owner_org = config.organizations[0].clone();
    let buyer_org = config.organizations[1].clone();
    let channel = config.channel.clone();
    let ledger = Ledger::new(config)?;

    let owner = Signer::generate(&owner_org, "owner")?;
    let buyer = Signer::generate(&buyer_org, "buyer")?;
    ledger.enroll(owner.identity())?;
    ledger.enroll(buyer.identity())?;
    info!(owner = %owner.identity(), buyer = %buyer.identity(), "demo identities enrolled");

    let create = Proposal::new(&channel, owner.identity().clone(), Invocation::CreateAsset, 0)?
        .with_transient_json(
            TRANSIENT_ASSET_PROPERTIES,
            &serde_json::json!({
                "objectType": "asset",
                "assetID": "asset1",
                "color": "green",
                "size": 20,
                "appraisedValue": 100
            }),
        )?;
    submit(&ledger, &owner, create)?;

    let agree = Proposal::new(&channel, buyer.identity().clone(), Invocation::AgreeToTransfer, 0)?
        .with_transient_json(
            TRANSIENT_ASSET_VALUE,
            &serde_json::json!({"assetID": "asset1", "appraisedValue": 100}),
        )?;
    submit(&ledger, &buyer, agree)?;

    let transfer = Proposal::new(&channel, owner.identity().clone(), Invocation::TransferAsset, 1)?
        .with_transient_json(
            TRANSIENT_ASSET_OWNER,
            &serde_json::json!({"assetID": "asset1", "buyerMSP": buyer_org}),
        )?;
    submit(&ledger, &owner, transfer)?;

    let read = Proposal::new(
        &channel,
        buyer.identity().clone(),
        Invocation::ReadAsset {
            asset_id: "asset1".to_string(),
        },
        1,
    )?
    .sign(&buyer)?;
    let payload = ledger.evaluate(&read)?;
    println!("ReadAsset        {}", String::from_utf8_lossy(&payload));

    Ok(())
}

fn handle_run(path: PathBuf) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(&path)
        .with_context(|| format!("failed to load scenario {}", path.display()))?;
    init_tracing(&scenario.network.log_level);

    let reports = run_scenario(&scenario)?;
    let failed = reports.iter().filter(|r| !r.passed).count();
    for (index, r) in reports.iter().enumerate() {
        let mark = if r.passed { "✓" } else { "✗" };
        let outcome = r.outcome.as_deref().unwrap_or("ok");
        println!("{} {:>3} {:<28} {:<18} {}", mark, index, r.name, outcome, r.message);
        if !r.payload.is_empty() {
            println!("        {}", String::from_utf8_lossy(&r.payload));
        }
    }
    println!("{} steps, {} failed", reports.len(), failed);

    if failed > 0 {
        process::exit(1);
    }
    Ok(())
}

fn handle_hash(asset_id: String, appraised_value: i64) -> anyhow::Result<()> {
    let hash = appraisal_commitment(&asset_id, appraised_value)?;
    println!("{}", hex::encode(hash));
    Ok(())
}
