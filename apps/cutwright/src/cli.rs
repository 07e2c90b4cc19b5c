//! CLI command implementations.
//!
//! Each command returns what it printed so tests can inspect results
//! without scraping stdout.

use crate::artifacts::{ArtifactError, ArtifactStore};
use crate::config::{self, ConfigError};
use crate::rpc::{RpcChain, RpcClient};
use cutwright_core::{
    Address, CutError, DeployContext, MemoryRegistry, ModuleKind, RedbRegistry, Registry,
    RegistryEntry, RegistryError, RunReport, Selector, SimChain, extract_selectors, names,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Artifacts(#[from] ArtifactError),

    #[error(transparent)]
    Cut(#[from] CutError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Process exit status.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Cut(err) => u8::try_from(err.exit_code()).unwrap_or(1),
            Self::Config(_)
            | Self::Artifacts(_)
            | Self::Registry(_)
            | Self::Json(_)
            | Self::Usage(_) => 1,
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// =============================================================================
// DEPLOY
// =============================================================================

/// Administrative address from configuration or registry, if known.
fn provider_address<R: Registry>(
    ctx: &DeployContext,
    registry: &R,
) -> Result<Option<Address>, CliError> {
    match ctx.configured(names::ADDRESSES_PROVIDER) {
        Some(address) => Ok(Some(address)),
        None => Ok(registry.address(names::ADDRESSES_PROVIDER)?),
    }
}

/// Registry contents at `path`, or nothing if the file does not exist yet.
fn registry_snapshot(path: &Path) -> Result<Vec<(String, RegistryEntry)>, CliError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    Ok(RedbRegistry::open(path)?.entries()?)
}

/// Plan and apply an upgrade on `network`.
///
/// With `dry_run` the plan is executed against a simulated chain seeded from
/// the build artifacts and a copy of the registry; nothing is sent and the
/// registry file is not written.
pub fn cmd_deploy(
    config_path: &Path,
    network: &str,
    dry_run: bool,
    resume: bool,
    json: bool,
) -> Result<RunReport, CliError> {
    let network_config = config::load(config_path, network)?;
    let ctx = network_config.context(resume);
    let artifacts = ArtifactStore::open(&network_config.artifacts)?
        .with_names(network_config.artifact_names.clone());

    info!(network, environment = %ctx.environment, dry_run, resume, "starting deployment");

    let report = if dry_run {
        let snapshot = registry_snapshot(&network_config.registry)?;
        let mut registry = MemoryRegistry::from_entries(snapshot);
        let provider = provider_address(&ctx, &registry)?.unwrap_or(Address::ZERO);
        let mut chain = SimChain::new(provider).with_interfaces(artifacts.interfaces()?);
        cutwright_core::run(&ctx, &mut chain, &mut registry)?
    } else {
        let url = network_config
            .rpc_url
            .clone()
            .ok_or_else(|| CliError::Usage(format!("network `{network}` has no rpc_url")))?;
        let from = network_config
            .deployer
            .ok_or_else(|| CliError::Usage(format!("network `{network}` has no deployer")))?;

        let mut registry = RedbRegistry::open(&network_config.registry)?;
        let provider =
            provider_address(&ctx, &registry)?.ok_or_else(|| CutError::MissingDependency {
                name: names::ADDRESSES_PROVIDER.to_string(),
            })?;
        let mut chain = RpcChain::new(
            RpcClient::new(url),
            from,
            provider,
            artifacts,
            network_config.confirmations,
        );
        cutwright_core::run(&ctx, &mut chain, &mut registry)?
    };

    if json {
        print_json(&report)?;
    } else {
        print_report(&report, dry_run);
    }
    Ok(report)
}

fn print_report(report: &RunReport, dry_run: bool) {
    println!("{}", if dry_run { "Dry run (simulated chain)" } else { "Deployment complete" });
    println!("  Environment: {}", report.environment);
    println!("  Provider:    {}", report.provider);
    println!("  Proxy:       {}", report.proxy);

    println!("  Cuts:");
    for cut in &report.applied {
        println!(
            "    {:<20} {}  +{} ~{} -{}{}",
            cut.module.to_string(),
            cut.facet,
            cut.added,
            cut.replaced,
            cut.removed,
            if cut.initialized { "  (initialized)" } else { "" }
        );
    }
    for module in &report.skipped {
        println!("    {:<20} up to date", module.to_string());
    }

    if !report.dependencies.is_empty() {
        println!("  Dependencies:");
        for (name, resolution) in &report.dependencies {
            println!("    {:<20} {}  ({})", name, resolution.address(), resolution.source());
        }
    }

    if !report.approvals.is_empty() {
        println!("  Approvals:");
        for outcome in &report.approvals {
            println!(
                "    {} -> {}",
                outcome.approval.token_name, outcome.approval.spender_name
            );
        }
    }
}

// =============================================================================
// SELECTORS
// =============================================================================

/// One selector with the signature it was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectorRow {
    pub selector: Selector,
    pub signature: String,
}

/// Selectors of one module artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleSelectors {
    pub module: ModuleKind,
    pub selectors: Vec<SelectorRow>,
}

/// List the selectors every module artifact under `dir` exposes.
///
/// Fails on a selector claimed twice, within one module or across modules.
pub fn cmd_selectors(dir: &Path, json: bool) -> Result<Vec<ModuleSelectors>, CliError> {
    let interfaces = ArtifactStore::open(dir)?.interfaces()?;

    let mut owners: BTreeMap<Selector, ModuleKind> = BTreeMap::new();
    let mut listing = Vec::new();
    for kind in ModuleKind::ALL {
        let Some(interface) = interfaces.get(&kind) else {
            warn!(module = %kind, "no artifact");
            continue;
        };
        let selectors = extract_selectors(kind.artifact_name(), interface)?;
        let signatures = interface
            .function_signatures()
            .map_err(|reason| CutError::Interface {
                module: kind.to_string(),
                reason,
            })?;

        for selector in &selectors {
            if let Some(first) = owners.insert(*selector, kind) {
                return Err(CutError::SelectorCollision {
                    selector: *selector,
                    first: first.to_string(),
                    second: kind.to_string(),
                }
                .into());
            }
        }

        listing.push(ModuleSelectors {
            module: kind,
            selectors: selectors
                .into_iter()
                .zip(signatures)
                .map(|(selector, signature)| SelectorRow { selector, signature })
                .collect(),
        });
    }

    if json {
        print_json(&listing)?;
    } else {
        for module in &listing {
            println!("{} ({} selectors)", module.module, module.selectors.len());
            for row in &module.selectors {
                println!("  {}  {}", row.selector, row.signature);
            }
        }
    }
    Ok(listing)
}

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Serialize)]
struct RegistryRow<'a> {
    name: &'a str,
    #[serde(flatten)]
    entry: &'a RegistryEntry,
}

/// Show every registry record at `path`.
pub fn cmd_registry(path: &Path, json: bool) -> Result<Vec<(String, RegistryEntry)>, CliError> {
    if !path.exists() {
        return Err(CliError::Usage(format!("registry {} does not exist", path.display())));
    }
    let entries = RedbRegistry::open(path)?.entries()?;

    if json {
        let rows: Vec<RegistryRow<'_>> = entries
            .iter()
            .map(|(name, entry)| RegistryRow { name, entry })
            .collect();
        print_json(&rows)?;
    } else if entries.is_empty() {
        println!("Registry is empty");
    } else {
        for (name, entry) in &entries {
            let mut line = format!("{:<24} {}", name, entry.address);
            if !entry.constructor_args.is_empty() {
                let args: Vec<String> =
                    entry.constructor_args.iter().map(ToString::to_string).collect();
                line.push_str(&format!("  args [{}]", args.join(", ")));
            }
            if !entry.selectors.is_empty() {
                line.push_str(&format!("  {} selectors", entry.selectors.len()));
            }
            println!("{line}");
        }
    }
    Ok(entries)
}
