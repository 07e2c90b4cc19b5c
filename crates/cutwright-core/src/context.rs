//! # Deployment Context
//!
//! The immutable per-run settings every component reads: environment,
//! explicit dependency addresses, feature flags, wiring rules and
//! transaction overrides. It is passed by reference into each call rather
//! than read from process-wide state, so planning is reproducible from the
//! context alone.

use crate::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    /// Local development chain. Stand-ins may replace any dependency.
    LocalTest,
    /// Public test network.
    Testnet,
    /// Production network.
    #[default]
    Production,
}

impl Environment {
    /// Check if this is a local test chain.
    #[must_use]
    pub fn is_local_test(self) -> bool {
        self == Self::LocalTest
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalTest => "local-test",
            Self::Testnet => "testnet",
            Self::Production => "production",
        })
    }
}

/// Optional feature switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// Install the staking facet when the build provides it.
    pub staking: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self { staking: true }
    }
}

/// Execution overrides attached to every transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxOverrides {
    pub gas_limit: Option<u64>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// A token the proxy must approve for named downstream spenders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WiringRule {
    /// Dependency name of the token.
    pub token: String,
    /// Dependency names of the spenders, approved in this order.
    pub spenders: Vec<String>,
}

/// Well-known dependency names.
pub mod names {
    /// The addresses-provider administering the routing table.
    pub const ADDRESSES_PROVIDER: &str = "AddressesProvider";
    /// External lending pool the position mover migrates from.
    pub const LENDING_POOL: &str = "LendingPool";
    /// Loan registry of the external lending pool.
    pub const LENDING_POOL_LOAN: &str = "LendingPoolLoan";
    /// Wrapped native token.
    pub const WRAPPED_NATIVE: &str = "WrappedNative";
}

/// Immutable settings for one orchestration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployContext {
    pub environment: Environment,

    /// Explicit dependency addresses by name. Highest resolution priority.
    pub addresses: BTreeMap<String, Address>,

    /// Dependencies that may be replaced by stand-ins outside local-test.
    pub mockable: BTreeSet<String>,

    pub features: Features,

    /// Post-install approvals.
    pub wiring: Vec<WiringRule>,

    pub overrides: TxOverrides,

    /// Reuse registry-recorded module deployments instead of deploying anew.
    pub resume: bool,
}

impl DeployContext {
    /// Create a context for `environment` with defaults elsewhere.
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            ..Self::default()
        }
    }

    /// Set an explicit dependency address.
    #[must_use]
    pub fn with_address(mut self, name: impl Into<String>, address: Address) -> Self {
        self.addresses.insert(name.into(), address);
        self
    }

    /// Add a wiring rule.
    #[must_use]
    pub fn with_wiring(mut self, token: impl Into<String>, spenders: &[&str]) -> Self {
        self.wiring.push(WiringRule {
            token: token.into(),
            spenders: spenders.iter().map(|s| (*s).to_string()).collect(),
        });
        self
    }

    /// Explicitly configured address for `name`.
    #[must_use]
    pub fn configured(&self, name: &str) -> Option<Address> {
        self.addresses.get(name).copied()
    }

    /// Whether `name` may be replaced by a freshly deployed stand-in.
    #[must_use]
    pub fn may_stand_in(&self, name: &str) -> bool {
        self.environment.is_local_test() || self.mockable.contains(name)
    }
}
