//! # Simulated Chain
//!
//! A deterministic in-process stand-in for a development node plus the
//! routing table deployed on it. Used by dry runs and by tests.
//!
//! The table enforces its own invariants the way the on-chain contract does:
//!
//! - a cut is validated in full before any route changes (atomicity),
//! - `Add` of a routed selector, `Replace`/`Remove` of an unrouted one, and
//!   routes to addresses without code all revert,
//! - the proxy address exists only once the first cut has been applied,
//! - initialization through the proxy succeeds at most once.
//!
//! Failures can be injected per cut index or per approval spender. Route
//! queries can be gated on the interface facet being routed, as they are on
//! a live table.

use crate::chain::{ModuleBuilder, RoutingTable};
use crate::context::TxOverrides;
use crate::cut::{Cut, CutAction};
use crate::error::{CutError, TransportError};
use crate::module::{Facet, ModuleKind, StandIn};
use crate::primitives::{Address, Selector, keccak256};
use crate::selector::Interface;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

/// Something observable that happened on the simulated chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ChainEvent {
    Deployed { label: String, address: Address },
    ProxyRead { proxy: Address },
    Cut { cut: Cut },
    Approved { token: Address, spender: Address },
}

/// Simulated node + routing table.
#[derive(Debug)]
pub struct SimChain {
    /// Administrative address that accepts cuts.
    provider: Address,
    proxy: Option<Address>,
    nonce: u64,
    interfaces: BTreeMap<ModuleKind, Interface>,
    code: BTreeMap<Address, String>,
    routes: BTreeMap<Selector, Address>,
    initialized_with: Option<Address>,
    allowances: BTreeSet<(Address, Address)>,
    events: RefCell<Vec<ChainEvent>>,
    failing_spenders: BTreeSet<Address>,
    fail_cut_at: Option<usize>,
    cuts_seen: usize,
    gated_introspection: bool,
}

impl SimChain {
    /// Create a chain whose routing table is administered by `provider`.
    #[must_use]
    pub fn new(provider: Address) -> Self {
        let mut code = BTreeMap::new();
        code.insert(provider, "AddressesProvider".to_string());
        Self {
            provider,
            proxy: None,
            nonce: 0,
            interfaces: BTreeMap::new(),
            code,
            routes: BTreeMap::new(),
            initialized_with: None,
            allowances: BTreeSet::new(),
            events: RefCell::new(Vec::new()),
            failing_spenders: BTreeSet::new(),
            fail_cut_at: None,
            cuts_seen: 0,
            gated_introspection: false,
        }
    }

    /// Register the interfaces the build "produced".
    #[must_use]
    pub fn with_interfaces(mut self, interfaces: BTreeMap<ModuleKind, Interface>) -> Self {
        self.interfaces = interfaces;
        self
    }

    /// Register or replace one interface.
    pub fn set_interface(&mut self, kind: ModuleKind, interface: Interface) {
        self.interfaces.insert(kind, interface);
    }

    /// Pretend the build did not produce `kind`.
    pub fn remove_interface(&mut self, kind: ModuleKind) {
        self.interfaces.remove(&kind);
    }

    /// Make the `index`-th submitted cut (0-based) revert.
    pub fn fail_cut_at(&mut self, index: usize) {
        self.fail_cut_at = Some(index);
    }

    /// Answer route queries only once `facetAddress(bytes4)` is routed.
    /// Until then the table reports no routes.
    pub fn gate_introspection(&mut self) {
        self.gated_introspection = true;
    }

    /// Make approvals to `spender` revert.
    pub fn fail_approvals_to(&mut self, spender: Address) {
        self.failing_spenders.insert(spender);
    }

    /// Administrative address.
    #[must_use]
    pub fn provider(&self) -> Address {
        self.provider
    }

    /// Proxy address, once the table has been created.
    #[must_use]
    pub fn proxy(&self) -> Option<Address> {
        self.proxy
    }

    /// Current selector routes.
    #[must_use]
    pub fn routes(&self) -> &BTreeMap<Selector, Address> {
        &self.routes
    }

    /// Provider the proxy was initialized with, if initialized.
    #[must_use]
    pub fn initialized_with(&self) -> Option<Address> {
        self.initialized_with
    }

    /// Check if the proxy granted `spender` an allowance over `token`.
    #[must_use]
    pub fn has_allowance(&self, token: Address, spender: Address) -> bool {
        self.allowances.contains(&(token, spender))
    }

    /// Everything that happened, in order.
    #[must_use]
    pub fn events(&self) -> Vec<ChainEvent> {
        self.events.borrow().clone()
    }

    /// Every cut applied, in order.
    #[must_use]
    pub fn cuts(&self) -> Vec<Cut> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ChainEvent::Cut { cut } => Some(cut.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every deployment, in order, as `(label, address)`.
    #[must_use]
    pub fn deployments(&self) -> Vec<(String, Address)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                ChainEvent::Deployed { label, address } => Some((label.clone(), *address)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: ChainEvent) {
        self.events.borrow_mut().push(event);
    }

    fn create(&mut self, label: &str) -> Address {
        self.nonce = self.nonce.saturating_add(1);
        let seed = format!("{}:{}", self.provider, self.nonce);
        let address = Address::from_word(&keccak256(seed.as_bytes()));
        self.code.insert(address, label.to_string());
        self.record(ChainEvent::Deployed {
            label: label.to_string(),
            address,
        });
        address
    }

    fn proxy_for(provider: Address) -> Address {
        let seed = format!("proxy:{provider}");
        Address::from_word(&keccak256(seed.as_bytes()))
    }

    fn apply(&self, cut: &Cut) -> Result<BTreeMap<Selector, Address>, TransportError> {
        let mut routes = self.routes.clone();
        for change in &cut.facets {
            match change.action {
                CutAction::Add | CutAction::Replace if !self.code.contains_key(&change.facet) => {
                    return Err(TransportError::Reverted(format!(
                        "facet {} has no code",
                        change.facet
                    )));
                }
                CutAction::Remove if !change.facet.is_zero() => {
                    return Err(TransportError::Reverted(
                        "remove facet address must be zero".into(),
                    ));
                }
                _ => {}
            }
            for selector in &change.selectors {
                let current = routes.get(selector).copied();
                match (change.action, current) {
                    (CutAction::Add, None) => {
                        routes.insert(*selector, change.facet);
                    }
                    (CutAction::Add, Some(_)) => {
                        return Err(TransportError::Reverted(format!(
                            "cannot add selector {selector} that already exists"
                        )));
                    }
                    (CutAction::Replace, Some(existing)) if existing != change.facet => {
                        routes.insert(*selector, change.facet);
                    }
                    (CutAction::Replace, _) => {
                        return Err(TransportError::Reverted(format!(
                            "cannot replace selector {selector}"
                        )));
                    }
                    (CutAction::Remove, Some(_)) => {
                        routes.remove(selector);
                    }
                    (CutAction::Remove, None) => {
                        return Err(TransportError::Reverted(format!(
                            "cannot remove selector {selector} that does not exist"
                        )));
                    }
                }
            }
        }
        Ok(routes)
    }
}

impl ModuleBuilder for SimChain {
    fn interface(&self, kind: ModuleKind) -> Result<Option<Interface>, CutError> {
        Ok(self.interfaces.get(&kind).cloned())
    }

    fn deploy(
        &mut self,
        facet: &Facet,
        _overrides: &TxOverrides,
    ) -> Result<Address, TransportError> {
        let kind = facet.kind();
        if !self.interfaces.contains_key(&kind) {
            return Err(TransportError::Rejected(format!("no bytecode for {kind}")));
        }
        Ok(self.create(kind.artifact_name()))
    }

    fn deploy_stand_in(
        &mut self,
        stand_in: StandIn,
        _args: &[Address],
        _overrides: &TxOverrides,
    ) -> Result<Address, TransportError> {
        Ok(self.create(stand_in.artifact_name()))
    }
}

impl RoutingTable for SimChain {
    fn cut(&mut self, cut: &Cut, _overrides: &TxOverrides) -> Result<(), TransportError> {
        let index = self.cuts_seen;
        self.cuts_seen += 1;
        if self.fail_cut_at == Some(index) {
            return Err(TransportError::Reverted(format!("injected failure at cut {index}")));
        }

        let routes = self.apply(cut)?;
        let proxy = self.proxy.unwrap_or_else(|| Self::proxy_for(self.provider));

        let mut initialized_with = self.initialized_with;
        if let Some(init) = &cut.init {
            if init.target != proxy {
                return Err(TransportError::Reverted(format!(
                    "init target {} is not the proxy",
                    init.target
                )));
            }
            let selector = init
                .payload
                .get(..4)
                .and_then(|b| <[u8; 4]>::try_from(b).ok())
                .map(Selector)
                .ok_or_else(|| TransportError::Reverted("empty init payload".into()))?;
            if !routes.contains_key(&selector) {
                return Err(TransportError::Reverted(format!(
                    "init selector {selector} is not routed"
                )));
            }
            if initialized_with.is_some() {
                return Err(TransportError::Reverted("already initialized".into()));
            }
            let word = init
                .payload
                .get(4..36)
                .and_then(|b| <[u8; 32]>::try_from(b).ok())
                .ok_or_else(|| TransportError::Reverted("short init payload".into()))?;
            initialized_with = Some(Address::from_word(&word));
        }

        self.routes = routes;
        self.initialized_with = initialized_with;
        if self.proxy.is_none() {
            self.proxy = Some(proxy);
            self.code.insert(proxy, "Proxy".to_string());
        }
        self.record(ChainEvent::Cut { cut: cut.clone() });
        Ok(())
    }

    fn proxy_address(&self) -> Result<Address, TransportError> {
        let proxy = self
            .proxy
            .ok_or_else(|| TransportError::Reverted("routing table has no proxy yet".into()))?;
        self.record(ChainEvent::ProxyRead { proxy });
        Ok(proxy)
    }

    fn can_introspect(&self) -> Result<bool, TransportError> {
        if !self.gated_introspection {
            return Ok(true);
        }
        let loupe = Selector::from_signature("facetAddress(bytes4)");
        Ok(self.routes.contains_key(&loupe))
    }

    fn facet_address(&self, selector: Selector) -> Result<Option<Address>, TransportError> {
        if !self.can_introspect()? {
            return Ok(None);
        }
        Ok(self.routes.get(&selector).copied())
    }

    fn selectors_of(&self, facet: Address) -> Result<Vec<Selector>, TransportError> {
        if !self.can_introspect()? {
            return Ok(Vec::new());
        }
        Ok(self
            .routes
            .iter()
            .filter(|(_, routed)| **routed == facet)
            .map(|(selector, _)| *selector)
            .collect())
    }

    fn approve(
        &mut self,
        proxy: Address,
        token: Address,
        spender: Address,
        _overrides: &TxOverrides,
    ) -> Result<(), TransportError> {
        if self.proxy != Some(proxy) {
            return Err(TransportError::Reverted(format!("{proxy} is not the proxy")));
        }
        if self.failing_spenders.contains(&spender) {
            return Err(TransportError::Reverted(format!("approve to {spender} failed")));
        }
        self.allowances.insert((token, spender));
        self.record(ChainEvent::Approved { token, spender });
        Ok(())
    }
}

/// Representative interfaces for every module kind.
#[must_use]
pub fn sample_interfaces() -> BTreeMap<ModuleKind, Interface> {
    let mut map = BTreeMap::new();
    map.insert(
        ModuleKind::Parameters,
        Interface::from_signatures([
            "initReserve(address,address,address,address,address,address)",
            "dropReserve(address)",
            "setReserveInterestRateStrategyAddress(address,address)",
            "setConfiguration(address,uint256)",
            "setPausedState(bool)",
        ]),
    );
    map.insert(
        ModuleKind::Marketplace,
        Interface::from_signatures([
            "matchOrders(bytes32,bytes,uint16)",
            "acceptBidWithCredit(bytes32,bytes,uint16)",
            "cancelOrder(bytes32)",
        ]),
    );
    map.insert(
        ModuleKind::PositionMover,
        Interface::from_signatures(["movePositionFromLendingPool(uint256[])"]),
    );
    map.insert(
        ModuleKind::Staking,
        Interface::from_signatures([
            "depositStake(address,uint256)",
            "withdrawStake(address,uint256)",
            "claimStakeRewards(address)",
        ]),
    );
    map.insert(
        ModuleKind::Core,
        Interface::from_signatures([
            "initialize(address)",
            "supply(address,uint256,address,uint16)",
            "withdraw(address,uint256,address)",
            "borrow(address,uint256,uint16,address)",
            "repay(address,uint256,address)",
            "getReserveData(address)",
        ]),
    );
    map.insert(
        ModuleKind::InterfaceShim,
        Interface::from_signatures([
            "facets()",
            "facetFunctionSelectors(address)",
            "facetAddresses()",
            "facetAddress(bytes4)",
            "supportsInterface(bytes4)",
        ]),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cut::{FacetCut, InitCall};

    fn add(facet: Address, selectors: &[Selector]) -> FacetCut {
        FacetCut {
            facet,
            action: CutAction::Add,
            selectors: selectors.to_vec(),
        }
    }

    #[test]
    fn proxy_exists_only_after_first_cut() {
        let mut chain = SimChain::new(Address([0xaa; 20])).with_interfaces(sample_interfaces());
        assert!(chain.proxy_address().is_err());

        let facet = chain
            .deploy(&Facet::InterfaceShim, &TxOverrides::default())
            .unwrap();
        let cut = Cut {
            facets: vec![add(facet, &[Selector([1, 1, 1, 1])])],
            init: None,
        };
        chain.cut(&cut, &TxOverrides::default()).unwrap();

        let proxy = chain.proxy_address().unwrap();
        assert_ne!(proxy, chain.provider());
    }

    #[test]
    fn add_of_routed_selector_reverts_atomically() {
        let mut chain = SimChain::new(Address([0xaa; 20])).with_interfaces(sample_interfaces());
        let a = chain
            .deploy(&Facet::InterfaceShim, &TxOverrides::default())
            .unwrap();
        let b = chain
            .deploy(&Facet::InterfaceShim, &TxOverrides::default())
            .unwrap();
        let shared = Selector([9, 9, 9, 9]);

        let first = Cut {
            facets: vec![add(a, &[shared])],
            init: None,
        };
        chain.cut(&first, &TxOverrides::default()).unwrap();
        let before = chain.routes().clone();

        let clash = Cut {
            facets: vec![add(b, &[Selector([8, 8, 8, 8]), shared])],
            init: None,
        };
        assert!(chain.cut(&clash, &TxOverrides::default()).is_err());
        assert_eq!(chain.routes(), &before);
    }

    #[test]
    fn routes_to_codeless_address_revert() {
        let mut chain = SimChain::new(Address([0xaa; 20]));
        let cut = Cut {
            facets: vec![add(Address([0x11; 20]), &[Selector([1, 2, 3, 4])])],
            init: None,
        };
        assert!(matches!(
            chain.cut(&cut, &TxOverrides::default()),
            Err(TransportError::Reverted(_))
        ));
    }

    #[test]
    fn second_initialization_reverts() {
        let provider = Address([0xaa; 20]);
        let mut chain = SimChain::new(provider).with_interfaces(sample_interfaces());
        let core = chain
            .deploy(&Facet::Core { provider }, &TxOverrides::default())
            .unwrap();
        let init_selector = Selector::from_signature("initialize(address)");
        let proxy = SimChain::proxy_for(provider);

        let first = Cut {
            facets: vec![add(core, &[init_selector])],
            init: Some(InitCall::initialize(proxy, provider)),
        };
        chain.cut(&first, &TxOverrides::default()).unwrap();
        assert_eq!(chain.initialized_with(), Some(provider));

        let again = Cut {
            facets: Vec::new(),
            init: Some(InitCall::initialize(proxy, provider)),
        };
        assert!(chain.cut(&again, &TxOverrides::default()).is_err());
    }

    #[test]
    fn gated_table_hides_routes_until_loupe_is_routed() {
        let mut chain = SimChain::new(Address([0xaa; 20])).with_interfaces(sample_interfaces());
        chain.gate_introspection();
        let facet = chain
            .deploy(&Facet::InterfaceShim, &TxOverrides::default())
            .unwrap();
        let other = Selector([1, 2, 3, 4]);

        let cut = Cut {
            facets: vec![add(facet, &[other])],
            init: None,
        };
        chain.cut(&cut, &TxOverrides::default()).unwrap();
        assert!(!chain.can_introspect().unwrap());
        assert_eq!(chain.facet_address(other).unwrap(), None);
        assert!(chain.selectors_of(facet).unwrap().is_empty());

        let loupe = Selector::from_signature("facetAddress(bytes4)");
        let cut = Cut {
            facets: vec![add(facet, &[loupe])],
            init: None,
        };
        chain.cut(&cut, &TxOverrides::default()).unwrap();
        assert!(chain.can_introspect().unwrap());
        assert_eq!(chain.facet_address(other).unwrap(), Some(facet));
    }

    #[test]
    fn sample_interfaces_cover_every_kind() {
        let interfaces = sample_interfaces();
        for kind in ModuleKind::ALL {
            assert!(interfaces.contains_key(&kind), "missing {kind}");
        }
    }
}
