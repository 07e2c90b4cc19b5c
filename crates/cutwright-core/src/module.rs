//! # Modules
//!
//! The facets a routing table can be assembled from, and the stand-in
//! contracts that may replace external dependencies in local-test runs.
//!
//! `Facet` is a tagged variant per module carrying its resolved dependency
//! bundle, so every consumer matches exhaustively instead of probing
//! nullable fields.

use crate::primitives::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry key under which the routing table's own address is recorded.
pub const PROXY_KEY: &str = "PoolProxy";

// =============================================================================
// MODULE KIND
// =============================================================================

/// The tag of a facet, without its dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Protocol parameters and admin configuration.
    Parameters,
    /// Marketplace order matching.
    Marketplace,
    /// Migrates positions from an external lending pool.
    PositionMover,
    /// Optional staking integration.
    Staking,
    /// Primary facet. Owns proxy-wide setup state.
    Core,
    /// Introspection selectors used by off-chain tooling.
    InterfaceShim,
}

impl ModuleKind {
    /// Every kind, in install order.
    pub const ALL: [ModuleKind; 6] = [
        ModuleKind::Parameters,
        ModuleKind::Marketplace,
        ModuleKind::PositionMover,
        ModuleKind::Staking,
        ModuleKind::Core,
        ModuleKind::InterfaceShim,
    ];

    /// Position in the cut sequence. Lower installs first.
    #[must_use]
    pub fn install_rank(self) -> u8 {
        match self {
            Self::Parameters => 0,
            Self::Marketplace => 1,
            Self::PositionMover => 2,
            Self::Staking => 3,
            Self::Core => 4,
            Self::InterfaceShim => 5,
        }
    }

    /// Registry key of the deployed implementation.
    #[must_use]
    pub fn registry_key(self) -> &'static str {
        match self {
            Self::Parameters => "PoolParametersImpl",
            Self::Marketplace => "PoolMarketplaceImpl",
            Self::PositionMover => "PoolPositionMoverImpl",
            Self::Staking => "PoolStakingImpl",
            Self::Core => "PoolCoreImpl",
            Self::InterfaceShim => "ProxyInterfacesImpl",
        }
    }

    /// Default build artifact name.
    #[must_use]
    pub fn artifact_name(self) -> &'static str {
        match self {
            Self::Parameters => "PoolParameters",
            Self::Marketplace => "PoolMarketplace",
            Self::PositionMover => "PoolPositionMover",
            Self::Staking => "PoolStaking",
            Self::Core => "PoolCore",
            Self::InterfaceShim => "ProxyInterfaces",
        }
    }

    /// Parse the CLI / config spelling (`core`, `position-mover`, ...).
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    /// CLI / config spelling.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Parameters => "parameters",
            Self::Marketplace => "marketplace",
            Self::PositionMover => "position-mover",
            Self::Staking => "staking",
            Self::Core => "core",
            Self::InterfaceShim => "interface-shim",
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.artifact_name())
    }
}

// =============================================================================
// FACET
// =============================================================================

/// A facet selected for installation, with its resolved dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Facet {
    Core {
        provider: Address,
    },
    Parameters {
        provider: Address,
    },
    Marketplace {
        provider: Address,
    },
    PositionMover {
        provider: Address,
        lending_pool_loan: Address,
        lending_pool: Address,
    },
    Staking {
        provider: Address,
    },
    InterfaceShim,
}

impl Facet {
    /// The tag of this facet.
    #[must_use]
    pub fn kind(&self) -> ModuleKind {
        match self {
            Self::Core { .. } => ModuleKind::Core,
            Self::Parameters { .. } => ModuleKind::Parameters,
            Self::Marketplace { .. } => ModuleKind::Marketplace,
            Self::PositionMover { .. } => ModuleKind::PositionMover,
            Self::Staking { .. } => ModuleKind::Staking,
            Self::InterfaceShim => ModuleKind::InterfaceShim,
        }
    }

    /// Constructor arguments, in declaration order.
    #[must_use]
    pub fn constructor_args(&self) -> Vec<Address> {
        match self {
            Self::Core { provider }
            | Self::Parameters { provider }
            | Self::Marketplace { provider }
            | Self::Staking { provider } => vec![*provider],
            Self::PositionMover {
                provider,
                lending_pool_loan,
                lending_pool,
            } => vec![*provider, *lending_pool_loan, *lending_pool],
            Self::InterfaceShim => Vec::new(),
        }
    }
}

// =============================================================================
// STAND-INS
// =============================================================================

/// Mock contracts deployable in place of an external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StandIn {
    /// Serves as both lending pool and lending-pool loan.
    LendingPool,
    /// Wrapped native token the mock lending pool settles in.
    WrappedNative,
}

impl StandIn {
    /// Registry key of the deployed stand-in.
    #[must_use]
    pub fn registry_key(self) -> &'static str {
        match self {
            Self::LendingPool => "MockLendingPool",
            Self::WrappedNative => "MockWrappedNative",
        }
    }

    /// Default build artifact name.
    #[must_use]
    pub fn artifact_name(self) -> &'static str {
        self.registry_key()
    }
}

impl fmt::Display for StandIn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.registry_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_rank_matches_declared_order() {
        let ranks: Vec<u8> = ModuleKind::ALL.iter().map(|k| k.install_rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn labels_round_trip() {
        for kind in ModuleKind::ALL {
            assert_eq!(ModuleKind::from_label(kind.label()), Some(kind));
        }
        assert_eq!(ModuleKind::from_label("bogus"), None);
    }

    #[test]
    fn position_mover_args_keep_constructor_order() {
        let facet = Facet::PositionMover {
            provider: Address([1; 20]),
            lending_pool_loan: Address([2; 20]),
            lending_pool: Address([3; 20]),
        };
        assert_eq!(
            facet.constructor_args(),
            vec![Address([1; 20]), Address([2; 20]), Address([3; 20])]
        );
        assert_eq!(facet.kind(), ModuleKind::PositionMover);
    }
}
