//! # Chain Collaborators
//!
//! The orchestrator talks to the outside world through two traits. Every
//! method is synchronous and returns only once its effect is durably
//! confirmed (or has definitively failed); retries and timeouts are the
//! implementor's concern.

use crate::context::TxOverrides;
use crate::cut::Cut;
use crate::error::{CutError, TransportError};
use crate::module::{Facet, ModuleKind, StandIn};
use crate::primitives::{Address, Selector};
use crate::selector::Interface;

/// Build/compile collaborator: supplies module interfaces and deploys
/// modules and stand-ins.
pub trait ModuleBuilder {
    /// Interface of `kind`, or `None` when the build did not produce it.
    fn interface(&self, kind: ModuleKind) -> Result<Option<Interface>, CutError>;

    /// Deploy `facet` with its constructor arguments.
    fn deploy(&mut self, facet: &Facet, overrides: &TxOverrides) -> Result<Address, TransportError>;

    /// Deploy a stand-in with the given constructor arguments.
    fn deploy_stand_in(
        &mut self,
        stand_in: StandIn,
        args: &[Address],
        overrides: &TxOverrides,
    ) -> Result<Address, TransportError>;
}

/// The routing table, reached through its administrative entry points.
pub trait RoutingTable {
    /// Apply `cut` atomically.
    fn cut(&mut self, cut: &Cut, overrides: &TxOverrides) -> Result<(), TransportError>;

    /// The table's externally visible (proxy) address.
    fn proxy_address(&self) -> Result<Address, TransportError>;

    /// Whether the table can report its own routes. A table whose interface
    /// facet is not routed yet cannot, and then reports no routes at all.
    fn can_introspect(&self) -> Result<bool, TransportError>;

    /// Facet currently routing `selector`, if any.
    fn facet_address(&self, selector: Selector) -> Result<Option<Address>, TransportError>;

    /// Selectors currently routed to `facet`.
    fn selectors_of(&self, facet: Address) -> Result<Vec<Selector>, TransportError>;

    /// Grant `spender` unlimited allowance over `token`, called through the
    /// proxy.
    fn approve(
        &mut self,
        proxy: Address,
        token: Address,
        spender: Address,
        overrides: &TxOverrides,
    ) -> Result<(), TransportError>;
}
