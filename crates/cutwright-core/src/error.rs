//! # Errors
//!
//! Every failure the orchestrator can surface. Each fatal kind maps to a
//! distinct process exit status so operators can tell a missing dependency
//! from a reverted cut without reading logs.

use crate::primitives::{Address, Selector};
use crate::wiring::ApprovalOutcome;
use thiserror::Error;

/// Failure reported by a transaction-submission or read collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The transaction was mined but execution reverted.
    #[error("execution reverted: {0}")]
    Reverted(String),

    /// The node refused the transaction before inclusion.
    #[error("transaction rejected: {0}")]
    Rejected(String),

    /// The node could not be reached or never confirmed the transaction.
    #[error("node unavailable: {0}")]
    Unavailable(String),

    /// The node answered with something that could not be decoded.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Failure of the persisted address registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The storage engine failed.
    #[error("registry storage: {0}")]
    Storage(String),

    /// An entry could not be encoded or decoded.
    #[error("registry entry `{name}`: {reason}")]
    Encoding { name: String, reason: String },
}

impl From<redb::Error> for RegistryError {
    fn from(err: redb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Errors from planning and executing an upgrade.
#[derive(Debug, Error)]
pub enum CutError {
    /// A required external address could not be resolved.
    #[error("missing dependency `{name}`: not configured, not registered, no stand-in allowed")]
    MissingDependency { name: String },

    /// Two modules (or one module twice) claim the same selector.
    #[error("selector {selector} claimed by both {first} and {second}")]
    SelectorCollision {
        selector: Selector,
        first: String,
        second: String,
    },

    /// A cut was rejected by the routing table or the transport.
    #[error("cut installing {module} failed")]
    CutSubmission {
        module: String,
        #[source]
        source: TransportError,
    },

    /// One or more post-install approvals failed.
    #[error("{} of {} approvals failed", .failed.len(), .failed.len() + .succeeded.len())]
    PostWiring {
        failed: Vec<ApprovalOutcome>,
        succeeded: Vec<ApprovalOutcome>,
        proxy: Address,
    },

    /// The build collaborator has no artifact for a mandatory module.
    #[error("no build artifact for module {0}")]
    ArtifactMissing(String),

    /// A module interface could not be turned into selectors.
    #[error("interface of {module}: {reason}")]
    Interface { module: String, reason: String },

    /// A non-cut chain call (deployment, read) failed.
    #[error("{context}")]
    Transport {
        context: String,
        #[source]
        source: TransportError,
    },

    /// The registry failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl CutError {
    /// Process exit status for this error.
    ///
    /// 2 missing dependency, 3 selector collision, 4 cut submission,
    /// 5 post-install wiring, 1 everything else.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingDependency { .. } => 2,
            Self::SelectorCollision { .. } => 3,
            Self::CutSubmission { .. } => 4,
            Self::PostWiring { .. } => 5,
            Self::ArtifactMissing(_)
            | Self::Interface { .. }
            | Self::Transport { .. }
            | Self::Registry(_) => 1,
        }
    }

    pub(crate) fn transport(context: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            context: context.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct_for_fatal_kinds() {
        let missing = CutError::MissingDependency {
            name: "AddressesProvider".into(),
        };
        let collision = CutError::SelectorCollision {
            selector: Selector([0xde, 0xad, 0xbe, 0xef]),
            first: "Core".into(),
            second: "Marketplace".into(),
        };
        let cut = CutError::CutSubmission {
            module: "Core".into(),
            source: TransportError::Reverted("boom".into()),
        };
        let wiring = CutError::PostWiring {
            failed: Vec::new(),
            succeeded: Vec::new(),
            proxy: Address::ZERO,
        };

        let codes = [
            missing.exit_code(),
            collision.exit_code(),
            cut.exit_code(),
            wiring.exit_code(),
        ];
        assert_eq!(codes, [2, 3, 4, 5]);
    }

    #[test]
    fn collision_message_names_both_modules() {
        let err = CutError::SelectorCollision {
            selector: Selector([0xde, 0xad, 0xbe, 0xef]),
            first: "Core".into(),
            second: "Marketplace".into(),
        };
        assert_eq!(
            err.to_string(),
            "selector 0xdeadbeef claimed by both Core and Marketplace"
        );
    }
}
