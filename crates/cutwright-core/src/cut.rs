//! # Cut Operations
//!
//! A cut is an atomic mutation of the routing table: an ordered list of
//! facet changes plus an optional initialization call executed in the same
//! transaction.

use crate::abi::{self, Token};
use crate::primitives::{Address, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a facet change does to its selectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CutAction {
    Add,
    Replace,
    Remove,
}

impl CutAction {
    /// On-chain action code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Add => 0,
            Self::Replace => 1,
            Self::Remove => 2,
        }
    }
}

impl fmt::Display for CutAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Remove => "remove",
        })
    }
}

/// One facet change inside a cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCut {
    /// Implementation address; zero for `Remove`.
    pub facet: Address,
    pub action: CutAction,
    pub selectors: Vec<Selector>,
}

/// Initialization call executed after the facet changes, in the same cut.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitCall {
    pub target: Address,
    pub payload: Vec<u8>,
}

impl InitCall {
    /// `initialize(address)` against the proxy.
    #[must_use]
    pub fn initialize(proxy: Address, provider: Address) -> Self {
        Self {
            target: proxy,
            payload: abi::encode_call("initialize(address)", &[Token::Address(provider)]),
        }
    }
}

/// An atomic routing-table mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cut {
    pub facets: Vec<FacetCut>,
    pub init: Option<InitCall>,
}

impl Cut {
    /// Initialization target, or the zero sentinel when no call is made.
    #[must_use]
    pub fn init_target(&self) -> Address {
        self.init.as_ref().map(|i| i.target).unwrap_or(Address::ZERO)
    }

    /// Initialization payload, empty when no call is made.
    #[must_use]
    pub fn init_payload(&self) -> &[u8] {
        self.init.as_ref().map(|i| i.payload.as_slice()).unwrap_or(&[])
    }

    /// Check if the cut changes nothing and calls nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.facets.iter().all(|f| f.selectors.is_empty()) && self.init.is_none()
    }

    /// ABI arguments of the table's cut entry point:
    /// `((address,uint8,bytes4[])[], address, bytes)`.
    #[must_use]
    pub fn to_tokens(&self) -> Vec<Token> {
        let facets = self
            .facets
            .iter()
            .map(|f| {
                Token::Tuple(vec![
                    Token::Address(f.facet),
                    Token::Uint(u128::from(f.action.code())),
                    Token::Array(f.selectors.iter().copied().map(Token::selector).collect()),
                ])
            })
            .collect();
        vec![
            Token::Array(facets),
            Token::Address(self.init_target()),
            Token::Bytes(self.init_payload().to_vec()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cut_without_init_targets_zero_with_empty_payload() {
        let cut = Cut {
            facets: vec![FacetCut {
                facet: Address([1; 20]),
                action: CutAction::Add,
                selectors: vec![Selector([1, 2, 3, 4])],
            }],
            init: None,
        };
        assert!(cut.init_target().is_zero());
        assert!(cut.init_payload().is_empty());
        assert!(!cut.is_empty());
    }

    #[test]
    fn initialize_payload_targets_proxy() {
        let proxy = Address([7; 20]);
        let provider = Address([8; 20]);
        let init = InitCall::initialize(proxy, provider);
        assert_eq!(init.target, proxy);
        assert_eq!(init.payload.len(), 36);
        assert_eq!(&init.payload[16..], provider.as_bytes());
    }

    #[test]
    fn action_codes() {
        assert_eq!(CutAction::Add.code(), 0);
        assert_eq!(CutAction::Replace.code(), 1);
        assert_eq!(CutAction::Remove.code(), 2);
    }
}
