//! # Dependency Resolver
//!
//! Resolves the external addresses facet constructors need. First match
//! wins:
//!
//! 1. explicit address in the deployment context,
//! 2. registry entry under the dependency's name,
//! 3. a stand-in (local-test, or a dependency declared mockable): reused
//!    from the registry under the stand-in's key, otherwise deployed now.
//!
//! Results are memoized for the lifetime of the resolver (one run), so every
//! reference to a name sees the same address. Stand-ins are memoized by kind:
//! a lending pool and its loan registry served by the same mock share one
//! deployment.

use crate::chain::ModuleBuilder;
use crate::context::{DeployContext, names};
use crate::error::CutError;
use crate::module::StandIn;
use crate::primitives::Address;
use crate::registry::{Registry, RegistryEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A named external address a facet depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    /// Mock that may replace the dependency when stand-ins are permitted.
    pub stand_in: Option<StandIn>,
}

impl Dependency {
    /// A dependency that can never be replaced by a stand-in.
    #[must_use]
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stand_in: None,
        }
    }

    /// A dependency a stand-in may replace.
    #[must_use]
    pub fn with_stand_in(name: impl Into<String>, stand_in: StandIn) -> Self {
        Self {
            name: name.into(),
            stand_in: Some(stand_in),
        }
    }
}

/// How a dependency was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    FromConfig(Address),
    FromRegistry(Address),
    Deployed(Address),
}

impl Resolution {
    /// The resolved address.
    #[must_use]
    pub fn address(self) -> Address {
        match self {
            Self::FromConfig(a) | Self::FromRegistry(a) | Self::Deployed(a) => a,
        }
    }

    /// Short label of the resolution source.
    #[must_use]
    pub fn source(self) -> &'static str {
        match self {
            Self::FromConfig(_) => "config",
            Self::FromRegistry(_) => "registry",
            Self::Deployed(_) => "stand-in",
        }
    }
}

/// Per-run memoizing resolver.
#[derive(Debug)]
pub struct DependencyResolver<'ctx> {
    ctx: &'ctx DeployContext,
    resolved: BTreeMap<String, Resolution>,
    stand_ins: BTreeMap<StandIn, Resolution>,
}

impl<'ctx> DependencyResolver<'ctx> {
    /// Create a resolver for one run.
    #[must_use]
    pub fn new(ctx: &'ctx DeployContext) -> Self {
        Self {
            ctx,
            resolved: BTreeMap::new(),
            stand_ins: BTreeMap::new(),
        }
    }

    /// Everything resolved so far, by name.
    #[must_use]
    pub fn resolved(&self) -> &BTreeMap<String, Resolution> {
        &self.resolved
    }

    /// Resolve `name` from configuration or registry only. Never deploys.
    pub fn lookup<R: Registry>(
        &mut self,
        name: &str,
        registry: &R,
    ) -> Result<Option<Resolution>, CutError> {
        if let Some(hit) = self.resolved.get(name) {
            return Ok(Some(*hit));
        }

        let found = match self.ctx.configured(name) {
            Some(address) => Some(Resolution::FromConfig(address)),
            None => registry.address(name)?.map(Resolution::FromRegistry),
        };

        if let Some(resolution) = found {
            debug!(
                dependency = name,
                source = resolution.source(),
                address = %resolution.address(),
                "resolved"
            );
            self.resolved.insert(name.to_string(), resolution);
        }
        Ok(found)
    }

    /// Resolve `dependency`, deploying a stand-in if permitted and needed.
    pub fn resolve<R: Registry, B: ModuleBuilder>(
        &mut self,
        dependency: &Dependency,
        registry: &mut R,
        builder: &mut B,
    ) -> Result<Resolution, CutError> {
        if let Some(found) = self.lookup(&dependency.name, registry)? {
            return Ok(found);
        }

        let stand_in = dependency
            .stand_in
            .filter(|_| self.ctx.may_stand_in(&dependency.name))
            .ok_or_else(|| CutError::MissingDependency {
                name: dependency.name.clone(),
            })?;

        let resolution = self.stand_in(stand_in, registry, builder)?;
        debug!(
            dependency = %dependency.name,
            %stand_in,
            address = %resolution.address(),
            "resolved via stand-in"
        );
        self.resolved.insert(dependency.name.clone(), resolution);
        Ok(resolution)
    }

    fn stand_in<R: Registry, B: ModuleBuilder>(
        &mut self,
        stand_in: StandIn,
        registry: &mut R,
        builder: &mut B,
    ) -> Result<Resolution, CutError> {
        if let Some(hit) = self.stand_ins.get(&stand_in) {
            return Ok(*hit);
        }

        let resolution = match registry.address(stand_in.registry_key())? {
            Some(address) => Resolution::FromRegistry(address),
            None => {
                let args = match stand_in {
                    StandIn::LendingPool => {
                        let native = Dependency::with_stand_in(
                            names::WRAPPED_NATIVE,
                            StandIn::WrappedNative,
                        );
                        vec![self.resolve(&native, registry, builder)?.address()]
                    }
                    StandIn::WrappedNative => Vec::new(),
                };
                let address = builder
                    .deploy_stand_in(stand_in, &args, &self.ctx.overrides)
                    .map_err(|e| CutError::transport(format!("deploying stand-in {stand_in}"), e))?;
                registry.put(
                    stand_in.registry_key(),
                    RegistryEntry::with_args(address, args),
                )?;
                info!(%stand_in, %address, "deployed stand-in");
                Resolution::Deployed(address)
            }
        };

        self.stand_ins.insert(stand_in, resolution);
        Ok(resolution)
    }
}

// =============================================================================
// TESTS
// =============================================================================
