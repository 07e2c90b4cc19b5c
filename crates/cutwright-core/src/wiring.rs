//! # Post-Install Wiring
//!
//! Once every cut is confirmed, grants downstream spenders unlimited
//! allowance over auto-wired tokens. The approvals go through the live proxy,
//! never to the token directly, because the proxy is the holder.
//!
//! Approvals are independent: a failure is recorded and the next approval is
//! still attempted. The proxy address is registered afterwards either way,
//! since the table itself is fully installed at that point.

use crate::chain::RoutingTable;
use crate::context::DeployContext;
use crate::error::CutError;
use crate::module::PROXY_KEY;
use crate::planner::Approval;
use crate::primitives::Address;
use crate::registry::{Registry, RegistryEntry};
use serde::Serialize;
use tracing::{error, info};

/// Result of one approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub approval: Approval,
    /// Failure reason; `None` on success.
    pub error: Option<String>,
}

impl ApprovalOutcome {
    /// Check if the approval went through.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Everything wiring did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WiringReport {
    pub succeeded: Vec<ApprovalOutcome>,
    pub failed: Vec<ApprovalOutcome>,
}

/// Issue every approval through `proxy`, then register the proxy.
///
/// Only a registry failure is returned as an error here; approval failures
/// are reported in the `WiringReport`.
pub fn wire<T: RoutingTable, R: Registry>(
    ctx: &DeployContext,
    proxy: Address,
    provider: Address,
    approvals: &[Approval],
    table: &mut T,
    registry: &mut R,
) -> Result<WiringReport, CutError> {
    let mut report = WiringReport::default();

    for approval in approvals {
        let outcome = match table.approve(proxy, approval.token, approval.spender, &ctx.overrides) {
            Ok(()) => {
                info!(
                    token = %approval.token_name,
                    spender = %approval.spender_name,
                    "approval confirmed"
                );
                ApprovalOutcome {
                    approval: approval.clone(),
                    error: None,
                }
            }
            Err(err) => {
                error!(
                    token = %approval.token_name,
                    spender = %approval.spender_name,
                    error = %err,
                    "approval failed"
                );
                ApprovalOutcome {
                    approval: approval.clone(),
                    error: Some(err.to_string()),
                }
            }
        };
        if outcome.succeeded() {
            report.succeeded.push(outcome);
        } else {
            report.failed.push(outcome);
        }
    }

    registry.put(PROXY_KEY, RegistryEntry::with_args(proxy, vec![provider]))?;
    info!(%proxy, "routing table registered");
    Ok(report)
}
