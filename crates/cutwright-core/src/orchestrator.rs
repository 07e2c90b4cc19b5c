//! # Orchestrator
//!
//! One full upgrade run: plan, deploy, cut, wire.
//!
//! ```text
//! context + artifacts ─► resolver + extractor ─► planner ─► deploy
//!                                                              │
//!        registry ◄── wiring ◄── live routing table ◄── sequencer
//! ```
//!
//! The run is strictly sequential. The first fatal error stops it; work
//! already confirmed on chain is kept and recorded in the registry so the
//! next run can resume.

use crate::chain::{ModuleBuilder, RoutingTable};
use crate::context::{DeployContext, Environment};
use crate::error::CutError;
use crate::module::ModuleKind;
use crate::planner;
use crate::primitives::Address;
use crate::registry::Registry;
use crate::resolver::{DependencyResolver, Resolution};
use crate::sequencer::{self, AppliedCut};
use crate::wiring::{self, ApprovalOutcome};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub environment: Environment,
    pub provider: Address,
    pub proxy: Address,
    /// Planned modules in install order.
    pub modules: Vec<ModuleKind>,
    /// How each dependency was resolved.
    pub dependencies: BTreeMap<String, Resolution>,
    pub applied: Vec<AppliedCut>,
    pub skipped: Vec<ModuleKind>,
    pub approvals: Vec<ApprovalOutcome>,
}

/// Execute one upgrade run against `chain`, recording progress in
/// `registry`.
pub fn run<C, R>(
    ctx: &DeployContext,
    chain: &mut C,
    registry: &mut R,
) -> Result<RunReport, CutError>
where
    C: ModuleBuilder + RoutingTable,
    R: Registry,
{
    info!(environment = %ctx.environment, resume = ctx.resume, "starting upgrade run");

    let mut resolver = DependencyResolver::new(ctx);
    let plan = planner::plan(ctx, &mut resolver, registry, chain)?;

    let deployed = sequencer::deploy_modules(ctx, &plan, registry, chain)?;
    let sequence = sequencer::execute(ctx, &deployed, chain, registry)?;

    let wiring = wiring::wire(
        ctx,
        sequence.proxy,
        plan.provider(),
        plan.approvals(),
        chain,
        registry,
    )?;
    if !wiring.failed.is_empty() {
        return Err(CutError::PostWiring {
            failed: wiring.failed,
            succeeded: wiring.succeeded,
            proxy: sequence.proxy,
        });
    }

    info!(
        proxy = %sequence.proxy,
        applied = sequence.applied.len(),
        skipped = sequence.skipped.len(),
        "upgrade run complete"
    );

    Ok(RunReport {
        environment: ctx.environment,
        provider: plan.provider(),
        proxy: sequence.proxy,
        modules: plan.kinds(),
        dependencies: resolver.resolved().clone(),
        applied: sequence.applied,
        skipped: sequence.skipped,
        approvals: wiring.succeeded,
    })
}

// =============================================================================
// TESTS
// =============================================================================
