//! # Cut Sequencer
//!
//! Turns a plan into routing-table mutations.
//!
//! 1. **Deploy**: every planned facet gets an address, either freshly
//!    deployed or (in resume mode) reused from the registry.
//! 2. **Diff**: every facet is compared with the live table before anything
//!    is submitted. Unrouted selectors are added, selectors routed to the
//!    module's previous implementation are replaced, selectors that previous
//!    implementation still owns but the new one dropped are removed, and a
//!    selector routed to any other facet is a collision. A table that cannot
//!    introspect yet (its interface facet goes in last) is read from the
//!    registry instead: each recorded module's selectors count as routed to
//!    its recorded implementation.
//! 3. **Submit**: one cut per facet in install order, each confirmed before
//!    the next. The table's own address is read back before the core cut,
//!    which alone carries `initialize(provider)`, and only when the core has
//!    never been installed.
//!
//! A failed cut aborts the sequence. Confirmed cuts stay installed.

use crate::chain::{ModuleBuilder, RoutingTable};
use crate::context::DeployContext;
use crate::cut::{Cut, CutAction, FacetCut, InitCall};
use crate::error::{CutError, TransportError};
use crate::module::{Facet, ModuleKind, PROXY_KEY};
use crate::planner::{Plan, PlannedFacet};
use crate::primitives::{Address, Selector};
use crate::registry::{Registry, RegistryEntry};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// A planned facet with its implementation address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployedFacet {
    pub planned: PlannedFacet,
    pub address: Address,
    /// Implementation recorded in the registry before this run.
    pub previous: Option<Address>,
    /// True when `address` was reused rather than deployed.
    pub reused: bool,
}

impl DeployedFacet {
    /// The facet's tag.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        self.planned.kind()
    }
}

/// A cut that was confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedCut {
    pub module: ModuleKind,
    pub facet: Address,
    pub added: usize,
    pub replaced: usize,
    pub removed: usize,
    pub initialized: bool,
}

/// Outcome of the whole sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceReport {
    pub proxy: Address,
    pub applied: Vec<AppliedCut>,
    /// Modules whose selectors were already routed as planned.
    pub skipped: Vec<ModuleKind>,
}

// =============================================================================
// DEPLOY
// =============================================================================

/// Give every planned facet an implementation address.
///
/// In resume mode a registry-recorded implementation deployed with the same
/// constructor arguments is reused.
pub fn deploy_modules<R: Registry, B: ModuleBuilder>(
    ctx: &DeployContext,
    plan: &Plan,
    registry: &R,
    builder: &mut B,
) -> Result<Vec<DeployedFacet>, CutError> {
    let mut out = Vec::with_capacity(plan.facets().len());
    for planned in plan.facets() {
        let kind = planned.kind();
        let recorded = registry.get(kind.registry_key())?;
        let previous = recorded.as_ref().map(|e| e.address);
        let args = planned.facet.constructor_args();

        let reusable = recorded
            .filter(|entry| ctx.resume && entry.constructor_args == args)
            .map(|entry| entry.address);

        let (address, reused) = match reusable {
            Some(address) => {
                debug!(module = %kind, %address, "reusing recorded implementation");
                (address, true)
            }
            None => {
                let address = builder
                    .deploy(&planned.facet, &ctx.overrides)
                    .map_err(|e| CutError::transport(format!("deploying {kind}"), e))?;
                info!(module = %kind, %address, "deployed implementation");
                (address, false)
            }
        };

        out.push(DeployedFacet {
            planned: planned.clone(),
            address,
            previous,
            reused,
        });
    }
    Ok(out)
}

// =============================================================================
// DIFF
// =============================================================================

/// Facet changes needed to bring one module up to date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Changes {
    add: Vec<Selector>,
    replace: Vec<Selector>,
    remove: Vec<Selector>,
    /// Some planned selector was already routed before this run.
    was_routed: bool,
}

impl Changes {
    fn into_facet_cuts(self, facet: Address) -> Vec<FacetCut> {
        [
            (facet, CutAction::Add, self.add),
            (facet, CutAction::Replace, self.replace),
            (Address::ZERO, CutAction::Remove, self.remove),
        ]
        .into_iter()
        .filter(|(_, _, selectors)| !selectors.is_empty())
        .map(|(facet, action, selectors)| FacetCut {
            facet,
            action,
            selectors,
        })
        .collect()
    }
}

/// Where the current routes are read from.
enum Routes<'a, T> {
    /// The table answers route queries itself.
    Live(&'a T),
    /// Routes of confirmed cuts, as recorded in the registry.
    Recorded {
        routes: BTreeMap<Selector, Address>,
        owned: BTreeMap<Address, Vec<Selector>>,
    },
}

impl<'a, T: RoutingTable> Routes<'a, T> {
    fn read<R: Registry>(table: &'a T, registry: &R) -> Result<Self, CutError> {
        let live = table
            .can_introspect()
            .map_err(|e| CutError::transport("checking routing table introspection", e))?;
        if live {
            return Ok(Self::Live(table));
        }

        let mut routes = BTreeMap::new();
        let mut owned = BTreeMap::new();
        for kind in ModuleKind::ALL {
            if let Some(entry) = registry.get(kind.registry_key())? {
                for selector in &entry.selectors {
                    routes.insert(*selector, entry.address);
                }
                owned.insert(entry.address, entry.selectors);
            }
        }
        if !routes.is_empty() {
            info!(routes = routes.len(), "table cannot introspect; using recorded routes");
        }
        Ok(Self::Recorded { routes, owned })
    }

    fn facet_address(&self, selector: Selector) -> Result<Option<Address>, TransportError> {
        match self {
            Self::Live(table) => table.facet_address(selector),
            Self::Recorded { routes, .. } => Ok(routes.get(&selector).copied()),
        }
    }

    fn selectors_of(&self, facet: Address) -> Result<Vec<Selector>, TransportError> {
        match self {
            Self::Live(table) => table.selectors_of(facet),
            Self::Recorded { owned, .. } => Ok(owned.get(&facet).cloned().unwrap_or_default()),
        }
    }
}

fn diff<T: RoutingTable>(
    routes: &Routes<'_, T>,
    deployed: &DeployedFacet,
    owners: &BTreeMap<Address, ModuleKind>,
) -> Result<Changes, CutError> {
    let kind = deployed.kind();
    let read_failed =
        |e: TransportError| CutError::transport(format!("reading routes for {kind}"), e);
    let mut changes = Changes::default();

    for selector in &deployed.planned.selectors {
        match routes.facet_address(*selector).map_err(read_failed)? {
            None => changes.add.push(*selector),
            Some(current) if current == deployed.address => changes.was_routed = true,
            Some(current) if Some(current) == deployed.previous => {
                changes.was_routed = true;
                changes.replace.push(*selector);
            }
            Some(current) => {
                let first = owners
                    .get(&current)
                    .map(ToString::to_string)
                    .unwrap_or_else(|| format!("facet {current}"));
                return Err(CutError::SelectorCollision {
                    selector: *selector,
                    first,
                    second: kind.to_string(),
                });
            }
        }
    }

    if let Some(previous) = deployed.previous.filter(|p| *p != deployed.address) {
        let keep: BTreeSet<Selector> = deployed.planned.selectors.iter().copied().collect();
        changes.remove = routes
            .selectors_of(previous)
            .map_err(read_failed)?
            .into_iter()
            .filter(|s| !keep.contains(s))
            .collect();
    }

    Ok(changes)
}

// =============================================================================
// SUBMIT
// =============================================================================

fn read_proxy<T: RoutingTable>(table: &T) -> Result<Address, CutError> {
    let proxy = table
        .proxy_address()
        .map_err(|e| CutError::transport("reading routing table address", e))?;
    debug!(%proxy, "routing table address read back");
    Ok(proxy)
}

/// Diff every deployed facet against the table, then submit the cuts.
pub fn execute<T: RoutingTable, R: Registry>(
    ctx: &DeployContext,
    deployed: &[DeployedFacet],
    table: &mut T,
    registry: &mut R,
) -> Result<SequenceReport, CutError> {
    let mut owners = BTreeMap::new();
    for kind in ModuleKind::ALL {
        if let Some(address) = registry.address(kind.registry_key())? {
            owners.insert(address, kind);
        }
    }

    // All reads and collision checks happen before the first submission.
    let mut steps = Vec::with_capacity(deployed.len());
    {
        let routes = Routes::read(&*table, &*registry)?;
        for facet in deployed {
            steps.push((facet, diff(&routes, facet, &owners)?));
        }
    }

    let proxy_recorded = registry.get(PROXY_KEY)?.is_some();
    let mut proxy = None;
    let mut applied = Vec::new();
    let mut skipped = Vec::new();

    for (facet, changes) in steps {
        let kind = facet.kind();
        let was_routed = changes.was_routed;
        let added = changes.add.len();
        let replaced = changes.replace.len();
        let removed = changes.remove.len();

        let init = match &facet.planned.facet {
            Facet::Core { provider } => {
                let address = read_proxy(table)?;
                proxy = Some(address);
                // A recorded core had its first cut confirmed, and that cut
                // carried the initialization.
                if proxy_recorded || was_routed || facet.previous.is_some() {
                    debug!("core already installed; initialization skipped");
                    None
                } else {
                    Some(InitCall::initialize(address, *provider))
                }
            }
            Facet::Parameters { .. }
            | Facet::Marketplace { .. }
            | Facet::PositionMover { .. }
            | Facet::Staking { .. }
            | Facet::InterfaceShim => None,
        };

        let cut = Cut {
            facets: changes.into_facet_cuts(facet.address),
            init,
        };
        if cut.is_empty() {
            info!(module = %kind, "already up to date");
            skipped.push(kind);
            continue;
        }

        let initialized = cut.init.is_some();
        table
            .cut(&cut, &ctx.overrides)
            .map_err(|source| CutError::CutSubmission {
                module: kind.to_string(),
                source,
            })?;
        let entry =
            RegistryEntry::with_args(facet.address, facet.planned.facet.constructor_args())
                .with_selectors(facet.planned.selectors.clone());
        registry.put(kind.registry_key(), entry)?;
        info!(
            module = %kind,
            facet = %facet.address,
            added,
            replaced,
            removed,
            initialized,
            "cut confirmed"
        );

        applied.push(AppliedCut {
            module: kind,
            facet: facet.address,
            added,
            replaced,
            removed,
            initialized,
        });
    }

    let proxy = match proxy {
        Some(address) => address,
        None => read_proxy(table)?,
    };

    Ok(SequenceReport {
        proxy,
        applied,
        skipped,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Environment;
    use crate::registry::MemoryRegistry;
    use crate::selector::Interface;
    use crate::sim::{SimChain, sample_interfaces};

    const PROVIDER: Address = Address([0xaa; 20]);

    fn planned(facet: Facet, signatures: &[&str]) -> PlannedFacet {
        PlannedFacet::from_interface(facet, &Interface::from_signatures(signatures.iter().copied()))
            .unwrap()
    }

    fn small_plan() -> Plan {
        Plan::new(
            PROVIDER,
            vec![
                planned(Facet::Parameters { provider: PROVIDER }, &["setPausedState(bool)"]),
                planned(
                    Facet::Core { provider: PROVIDER },
                    &["initialize(address)", "supply(address,uint256,address,uint16)"],
                ),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    fn deploy_and_execute(
        ctx: &DeployContext,
        plan: &Plan,
        chain: &mut SimChain,
        registry: &mut MemoryRegistry,
    ) -> Result<SequenceReport, CutError> {
        let deployed = deploy_modules(ctx, plan, registry, chain)?;
        execute(ctx, &deployed, chain, registry)
    }

    #[test]
    fn first_install_adds_everything_and_initializes_once() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();

        let report = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();

        assert_eq!(report.applied.len(), 2);
        let inits: Vec<bool> = report.applied.iter().map(|a| a.initialized).collect();
        assert_eq!(inits, vec![false, true]);
        assert_eq!(chain.initialized_with(), Some(PROVIDER));
        assert_eq!(Some(report.proxy), chain.proxy());
        assert!(registry.get(ModuleKind::Core.registry_key()).unwrap().is_some());
    }

    #[test]
    fn non_core_cuts_target_zero_with_empty_payload() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();
        deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();

        let cuts = chain.cuts();
        assert!(cuts[0].init_target().is_zero());
        assert!(cuts[0].init_payload().is_empty());
        assert_eq!(cuts[1].init_target(), chain.proxy().unwrap());
        assert_ne!(cuts[1].init_target(), PROVIDER);
    }

    #[test]
    fn redeploy_replaces_without_reinitializing() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();
        deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();

        let report = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();
        assert_eq!(report.applied.len(), 2);
        assert!(report.applied.iter().all(|a| !a.initialized));
        assert!(report.applied.iter().all(|a| a.added == 0 && a.replaced > 0));
    }

    #[test]
    fn resume_skips_unchanged_modules() {
        let mut ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();
        deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();
        let cuts_before = chain.cuts().len();

        ctx.resume = true;
        let report = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped, vec![ModuleKind::Parameters, ModuleKind::Core]);
        assert_eq!(chain.cuts().len(), cuts_before);
    }

    #[test]
    fn dropped_selectors_are_removed_on_upgrade() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();
        let wide = Plan::new(
            PROVIDER,
            vec![planned(
                Facet::Parameters { provider: PROVIDER },
                &["setPausedState(bool)", "dropReserve(address)"],
            )],
            Vec::new(),
        )
        .unwrap();
        deploy_and_execute(&ctx, &wide, &mut chain, &mut registry).unwrap();

        let narrow = Plan::new(
            PROVIDER,
            vec![planned(Facet::Parameters { provider: PROVIDER }, &["setPausedState(bool)"])],
            Vec::new(),
        )
        .unwrap();
        let report = deploy_and_execute(&ctx, &narrow, &mut chain, &mut registry).unwrap();

        assert_eq!(report.applied[0].replaced, 1);
        assert_eq!(report.applied[0].removed, 1);
        let dropped = Selector::from_signature("dropReserve(address)");
        assert!(!chain.routes().contains_key(&dropped));
    }

    #[test]
    fn selector_owned_by_foreign_facet_is_a_collision_before_any_cut() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();

        // Someone else installed `supply` behind our back.
        let foreign = chain.deploy(&Facet::InterfaceShim, &ctx.overrides).unwrap();
        let supply = Selector::from_signature("supply(address,uint256,address,uint16)");
        chain
            .cut(
                &Cut {
                    facets: vec![FacetCut {
                        facet: foreign,
                        action: CutAction::Add,
                        selectors: vec![supply],
                    }],
                    init: None,
                },
                &ctx.overrides,
            )
            .unwrap();
        let cuts_before = chain.cuts().len();

        let result = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry);
        assert!(matches!(
            result,
            Err(CutError::SelectorCollision { selector, .. }) if selector == supply
        ));
        assert_eq!(chain.cuts().len(), cuts_before);
    }

    #[test]
    fn recorded_core_is_not_reinitialized_after_renaming_its_selectors() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();
        deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();
        assert!(registry.get(PROXY_KEY).unwrap().is_none());

        let renamed = Plan::new(
            PROVIDER,
            vec![
                planned(Facet::Parameters { provider: PROVIDER }, &["setPausedState(bool)"]),
                planned(Facet::Core { provider: PROVIDER }, &["supplyAll(address)"]),
            ],
            Vec::new(),
        )
        .unwrap();
        let report = deploy_and_execute(&ctx, &renamed, &mut chain, &mut registry).unwrap();

        let core = report.applied.iter().find(|a| a.module == ModuleKind::Core).unwrap();
        assert!(!core.initialized);
        assert_eq!((core.added, core.replaced, core.removed), (1, 0, 2));
        assert_eq!(chain.cuts().iter().filter(|c| c.init.is_some()).count(), 1);
    }

    #[test]
    fn confirmed_cuts_record_their_selectors() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        let mut registry = MemoryRegistry::new();
        deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();

        let core = registry.get(ModuleKind::Core.registry_key()).unwrap().unwrap();
        assert_eq!(
            core.selectors,
            vec![
                Selector::from_signature("initialize(address)"),
                Selector::from_signature("supply(address,uint256,address,uint16)"),
            ]
        );
    }

    #[test]
    fn resume_after_failed_cut_reads_routes_from_registry() {
        let mut ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        chain.gate_introspection();
        chain.fail_cut_at(1);
        let mut registry = MemoryRegistry::new();
        assert!(deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).is_err());
        assert!(!chain.can_introspect().unwrap());

        ctx.resume = true;
        let report = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();

        assert_eq!(report.skipped, vec![ModuleKind::Parameters]);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(report.applied[0].module, ModuleKind::Core);
        assert!(report.applied[0].initialized);
        assert_eq!(chain.initialized_with(), Some(PROVIDER));
    }

    #[test]
    fn rerun_after_failed_cut_replaces_recorded_routes() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        chain.gate_introspection();
        chain.fail_cut_at(1);
        let mut registry = MemoryRegistry::new();
        assert!(deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).is_err());

        let report = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry).unwrap();

        let parameters = &report.applied[0];
        assert_eq!(parameters.module, ModuleKind::Parameters);
        assert_eq!((parameters.added, parameters.replaced), (0, 1));
        assert!(report.applied[1].initialized);
        let paused = Selector::from_signature("setPausedState(bool)");
        assert_eq!(chain.routes().get(&paused), Some(&parameters.facet));
    }

    #[test]
    fn failed_cut_aborts_remaining_sequence() {
        let ctx = DeployContext::new(Environment::LocalTest);
        let mut chain = SimChain::new(PROVIDER).with_interfaces(sample_interfaces());
        chain.fail_cut_at(1);
        let mut registry = MemoryRegistry::new();

        let result = deploy_and_execute(&ctx, &small_plan(), &mut chain, &mut registry);
        assert!(matches!(
            result,
            Err(CutError::CutSubmission { ref module, .. }) if module == "PoolCore"
        ));
        // The first cut stays installed and recorded.
        assert_eq!(chain.cuts().len(), 1);
        assert!(registry.get(ModuleKind::Parameters.registry_key()).unwrap().is_some());
        assert!(registry.get(ModuleKind::Core.registry_key()).unwrap().is_none());
        assert_eq!(chain.initialized_with(), None);
    }
}
