//! # Facet Set Planner
//!
//! Decides which facets take part in this upgrade and with which selectors.
//! The planner never touches the routing table; its only side effects are
//! the stand-in deployments the resolver performs when they are permitted.
//!
//! Inclusion rules:
//! - Parameters, Marketplace, Core and InterfaceShim always;
//! - PositionMover in local-test (stand-ins allowed), or when both lending
//!   addresses resolve from configuration or registry, or when the operator
//!   declared them mockable;
//! - Staking when the feature is on and the build produced the module.
//!
//! Every plan is validated for selector disjointness and ordered by install
//! rank.

use crate::chain::ModuleBuilder;
use crate::context::{DeployContext, names};
use crate::error::CutError;
use crate::module::{Facet, ModuleKind, StandIn};
use crate::primitives::{Address, Selector};
use crate::registry::Registry;
use crate::resolver::{Dependency, DependencyResolver};
use crate::selector::{Interface, extract_selectors};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// A facet and the selectors it will own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedFacet {
    pub facet: Facet,
    pub selectors: Vec<Selector>,
}

impl PlannedFacet {
    /// Pair `facet` with the selectors of `interface`.
    pub fn from_interface(facet: Facet, interface: &Interface) -> Result<Self, CutError> {
        let selectors = extract_selectors(facet.kind().artifact_name(), interface)?;
        Ok(Self { facet, selectors })
    }

    /// The facet's tag.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        self.facet.kind()
    }
}

/// One post-install approval, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Approval {
    pub token_name: String,
    pub token: Address,
    pub spender_name: String,
    pub spender: Address,
}

/// The validated, ordered result of planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    provider: Address,
    facets: Vec<PlannedFacet>,
    approvals: Vec<Approval>,
}

impl Plan {
    /// Validate and order a plan.
    ///
    /// Fails with `SelectorCollision` if two facets share a selector.
    pub fn new(
        provider: Address,
        mut facets: Vec<PlannedFacet>,
        approvals: Vec<Approval>,
    ) -> Result<Self, CutError> {
        facets.sort_by_key(|f| f.kind().install_rank());

        let mut owners: BTreeMap<Selector, ModuleKind> = BTreeMap::new();
        for planned in &facets {
            let kind = planned.kind();
            if facets.iter().filter(|f| f.kind() == kind).count() > 1 {
                return Err(CutError::Interface {
                    module: kind.to_string(),
                    reason: "module planned more than once".into(),
                });
            }
            for selector in &planned.selectors {
                if let Some(owner) = owners.insert(*selector, kind) {
                    return Err(CutError::SelectorCollision {
                        selector: *selector,
                        first: owner.to_string(),
                        second: kind.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            provider,
            facets,
            approvals,
        })
    }

    /// The addresses-provider the facets were planned against.
    #[must_use]
    pub fn provider(&self) -> Address {
        self.provider
    }

    /// Facets in install order.
    #[must_use]
    pub fn facets(&self) -> &[PlannedFacet] {
        &self.facets
    }

    /// Post-install approvals in issue order.
    #[must_use]
    pub fn approvals(&self) -> &[Approval] {
        &self.approvals
    }

    /// Check if `kind` is part of the plan.
    #[must_use]
    pub fn contains(&self, kind: ModuleKind) -> bool {
        self.facets.iter().any(|f| f.kind() == kind)
    }

    /// Kinds in install order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ModuleKind> {
        self.facets.iter().map(PlannedFacet::kind).collect()
    }
}

fn required_facet<B: ModuleBuilder>(builder: &B, facet: Facet) -> Result<PlannedFacet, CutError> {
    let kind = facet.kind();
    let interface = builder
        .interface(kind)?
        .ok_or_else(|| CutError::ArtifactMissing(kind.to_string()))?;
    PlannedFacet::from_interface(facet, &interface)
}

fn lending_pool<R: Registry, B: ModuleBuilder>(
    ctx: &DeployContext,
    resolver: &mut DependencyResolver<'_>,
    registry: &mut R,
    builder: &mut B,
) -> Result<Option<(Address, Address)>, CutError> {
    let loan = Dependency::with_stand_in(names::LENDING_POOL_LOAN, StandIn::LendingPool);
    let pool = Dependency::with_stand_in(names::LENDING_POOL, StandIn::LendingPool);

    let declared = ctx.mockable.contains(&loan.name) || ctx.mockable.contains(&pool.name);
    if ctx.environment.is_local_test() || declared {
        let loan = resolver.resolve(&loan, registry, builder)?;
        let pool = resolver.resolve(&pool, registry, builder)?;
        return Ok(Some((loan.address(), pool.address())));
    }

    match (
        resolver.lookup(&loan.name, registry)?,
        resolver.lookup(&pool.name, registry)?,
    ) {
        (Some(loan), Some(pool)) => Ok(Some((loan.address(), pool.address()))),
        (None, None) => {
            debug!("no lending pool configured; position mover excluded");
            Ok(None)
        }
        (loan, pool) => {
            warn!(
                loan_resolved = loan.is_some(),
                pool_resolved = pool.is_some(),
                "lending pool only partially configured; position mover excluded"
            );
            Ok(None)
        }
    }
}

fn approvals<R: Registry, B: ModuleBuilder>(
    ctx: &DeployContext,
    resolver: &mut DependencyResolver<'_>,
    registry: &mut R,
    builder: &mut B,
) -> Result<Vec<Approval>, CutError> {
    let mut out = Vec::new();
    for rule in &ctx.wiring {
        let Some(token) = resolver.lookup(&rule.token, registry)? else {
            info!(token = %rule.token, "token not deployed; wiring skipped");
            continue;
        };
        for spender_name in &rule.spenders {
            let dependency = Dependency::required(spender_name.as_str());
            let spender = resolver.resolve(&dependency, registry, builder)?;
            out.push(Approval {
                token_name: rule.token.clone(),
                token: token.address(),
                spender_name: spender_name.clone(),
                spender: spender.address(),
            });
        }
    }
    Ok(out)
}

/// Build the plan for this run.
///
/// Every dependency (including wiring spenders) is resolved here, before
/// anything is deployed or cut, so a `MissingDependency` aborts the run
/// with the routing table and registry untouched.
pub fn plan<R: Registry, B: ModuleBuilder>(
    ctx: &DeployContext,
    resolver: &mut DependencyResolver<'_>,
    registry: &mut R,
    builder: &mut B,
) -> Result<Plan, CutError> {
    let provider = resolver
        .resolve(
            &Dependency::required(names::ADDRESSES_PROVIDER),
            registry,
            builder,
        )?
        .address();

    let mut facets = vec![
        required_facet(builder, Facet::Parameters { provider })?,
        required_facet(builder, Facet::Marketplace { provider })?,
    ];

    if let Some((lending_pool_loan, lending_pool)) =
        lending_pool(ctx, resolver, registry, builder)?
    {
        facets.push(required_facet(
            builder,
            Facet::PositionMover {
                provider,
                lending_pool_loan,
                lending_pool,
            },
        )?);
    }

    if ctx.features.staking {
        match builder.interface(ModuleKind::Staking)? {
            Some(interface) => {
                facets.push(PlannedFacet::from_interface(
                    Facet::Staking { provider },
                    &interface,
                )?);
            }
            None => debug!("staking module not built; skipped"),
        }
    }

    facets.push(required_facet(builder, Facet::Core { provider })?);
    facets.push(required_facet(builder, Facet::InterfaceShim)?);

    let approvals = approvals(ctx, resolver, registry, builder)?;
    let plan = Plan::new(provider, facets, approvals)?;

    info!(
        environment = %ctx.environment,
        modules = ?plan.kinds(),
        approvals = plan.approvals().len(),
        "plan ready"
    );
    Ok(plan)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Environment;
    use crate::registry::{MemoryRegistry, RegistryEntry};
    use crate::sim::{SimChain, sample_interfaces};
    use proptest::prelude::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn chain() -> SimChain {
        SimChain::new(addr(0xaa)).with_interfaces(sample_interfaces())
    }

    fn ctx(environment: Environment) -> DeployContext {
        DeployContext::new(environment).with_address(names::ADDRESSES_PROVIDER, addr(0xaa))
    }

    fn run_plan(
        ctx: &DeployContext,
        registry: &mut MemoryRegistry,
        chain: &mut SimChain,
    ) -> Result<Plan, CutError> {
        let mut resolver = DependencyResolver::new(ctx);
        plan(ctx, &mut resolver, registry, chain)
    }

    #[test]
    fn production_without_lending_pool_excludes_position_mover() {
        let ctx = ctx(Environment::Production);
        let plan = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain()).unwrap();

        assert!(!plan.contains(ModuleKind::PositionMover));
        assert_eq!(
            plan.kinds(),
            vec![
                ModuleKind::Parameters,
                ModuleKind::Marketplace,
                ModuleKind::Staking,
                ModuleKind::Core,
                ModuleKind::InterfaceShim,
            ]
        );
    }

    #[test]
    fn local_test_includes_position_mover_with_stand_ins() {
        let ctx = ctx(Environment::LocalTest);
        let mut registry = MemoryRegistry::new();
        let mut chain = chain();
        let plan = run_plan(&ctx, &mut registry, &mut chain).unwrap();

        let mover = plan
            .facets()
            .iter()
            .find(|f| f.kind() == ModuleKind::PositionMover)
            .map(|f| f.facet.clone());
        let stand_in = registry.address(StandIn::LendingPool.registry_key()).unwrap().unwrap();
        assert_eq!(
            mover,
            Some(Facet::PositionMover {
                provider: addr(0xaa),
                lending_pool_loan: stand_in,
                lending_pool: stand_in,
            })
        );
    }

    #[test]
    fn production_with_both_lending_addresses_includes_position_mover() {
        let ctx = ctx(Environment::Production).with_address(names::LENDING_POOL_LOAN, addr(1));
        let mut registry = MemoryRegistry::new();
        registry.put(names::LENDING_POOL, RegistryEntry::new(addr(2))).unwrap();
        let mut chain = chain();

        let plan = run_plan(&ctx, &mut registry, &mut chain).unwrap();
        assert!(plan.contains(ModuleKind::PositionMover));
        assert!(chain.deployments().is_empty());
    }

    #[test]
    fn partial_lending_configuration_excludes_position_mover() {
        let ctx = ctx(Environment::Production).with_address(names::LENDING_POOL_LOAN, addr(1));
        let plan = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain()).unwrap();
        assert!(!plan.contains(ModuleKind::PositionMover));
    }

    #[test]
    fn staking_follows_feature_flag_and_build_output() {
        let mut disabled = ctx(Environment::Production);
        disabled.features.staking = false;
        let plan = run_plan(&disabled, &mut MemoryRegistry::new(), &mut chain()).unwrap();
        assert!(!plan.contains(ModuleKind::Staking));

        let enabled = ctx(Environment::Production);
        let mut unbuilt = chain();
        unbuilt.remove_interface(ModuleKind::Staking);
        let plan = run_plan(&enabled, &mut MemoryRegistry::new(), &mut unbuilt).unwrap();
        assert!(!plan.contains(ModuleKind::Staking));
    }

    #[test]
    fn missing_core_artifact_is_fatal() {
        let ctx = ctx(Environment::Production);
        let mut chain = chain();
        chain.remove_interface(ModuleKind::Core);
        let result = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain);
        assert!(matches!(result, Err(CutError::ArtifactMissing(ref m)) if m == "PoolCore"));
    }

    #[test]
    fn missing_provider_aborts_without_side_effects() {
        let ctx = DeployContext::new(Environment::Production);
        let mut registry = MemoryRegistry::new();
        let mut chain = chain();
        let result = run_plan(&ctx, &mut registry, &mut chain);

        assert!(matches!(
            result,
            Err(CutError::MissingDependency { ref name }) if name == names::ADDRESSES_PROVIDER
        ));
        assert!(registry.is_empty());
        assert!(chain.events().is_empty());
    }

    #[test]
    fn shared_signature_across_modules_is_a_collision() {
        let ctx = ctx(Environment::Production);
        let mut chain = chain();
        chain.set_interface(
            ModuleKind::Marketplace,
            Interface::from_signatures(["cancelOrder(bytes32)", "getReserveData(address)"]),
        );
        let result = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain);
        match result {
            Err(CutError::SelectorCollision { first, second, .. }) => {
                assert_eq!(first, "PoolMarketplace");
                assert_eq!(second, "PoolCore");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn literal_selector_clash_fails_planning() {
        let clash: Selector = "0xdeadbeef".parse().unwrap();
        let facets = vec![
            PlannedFacet {
                facet: Facet::Core { provider: addr(1) },
                selectors: vec![clash],
            },
            PlannedFacet {
                facet: Facet::InterfaceShim,
                selectors: vec![Selector([0, 0, 0, 1]), clash],
            },
        ];
        let result = Plan::new(addr(1), facets, Vec::new());
        assert!(matches!(
            result,
            Err(CutError::SelectorCollision { selector, .. }) if selector == clash
        ));
    }

    #[test]
    fn plan_is_sorted_by_install_rank() {
        let facets = vec![
            PlannedFacet {
                facet: Facet::InterfaceShim,
                selectors: vec![Selector([0, 0, 0, 1])],
            },
            PlannedFacet {
                facet: Facet::Core { provider: addr(1) },
                selectors: vec![Selector([0, 0, 0, 2])],
            },
            PlannedFacet {
                facet: Facet::Parameters { provider: addr(1) },
                selectors: vec![Selector([0, 0, 0, 3])],
            },
        ];
        let plan = Plan::new(addr(1), facets, Vec::new()).unwrap();
        assert_eq!(
            plan.kinds(),
            vec![ModuleKind::Parameters, ModuleKind::Core, ModuleKind::InterfaceShim]
        );
    }

    #[test]
    fn wiring_skipped_when_token_absent() {
        let ctx = ctx(Environment::Production)
            .with_wiring("APE", &["SwapRouter", "CompoundingVault"]);
        let plan = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain()).unwrap();
        assert!(plan.approvals().is_empty());
    }

    #[test]
    fn wiring_spender_is_required_once_token_exists() {
        let ctx = ctx(Environment::Production)
            .with_address("APE", addr(3))
            .with_address("SwapRouter", addr(4))
            .with_wiring("APE", &["SwapRouter", "CompoundingVault"]);
        let result = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain());
        assert!(matches!(
            result,
            Err(CutError::MissingDependency { ref name }) if name == "CompoundingVault"
        ));
    }

    #[test]
    fn wiring_resolves_in_rule_order() {
        let ctx = ctx(Environment::Production)
            .with_address("APE", addr(3))
            .with_address("SwapRouter", addr(4))
            .with_address("CompoundingVault", addr(5))
            .with_wiring("APE", &["SwapRouter", "CompoundingVault"]);
        let plan = run_plan(&ctx, &mut MemoryRegistry::new(), &mut chain()).unwrap();
        let spenders: Vec<Address> = plan.approvals().iter().map(|a| a.spender).collect();
        assert_eq!(spenders, vec![addr(4), addr(5)]);
    }

    proptest! {
        #[test]
        fn any_shared_selector_is_rejected(
            left in proptest::collection::btree_set(any::<[u8; 4]>(), 1..16),
            right in proptest::collection::btree_set(any::<[u8; 4]>(), 1..16),
        ) {
            let facets = vec![
                PlannedFacet {
                    facet: Facet::Marketplace { provider: addr(1) },
                    selectors: left.iter().copied().map(Selector).collect(),
                },
                PlannedFacet {
                    facet: Facet::Core { provider: addr(1) },
                    selectors: right.iter().copied().map(Selector).collect(),
                },
            ];
            let overlapping = left.intersection(&right).next().is_some();
            let result = Plan::new(addr(1), facets, Vec::new());
            prop_assert_eq!(result.is_err(), overlapping);
        }
    }
}
