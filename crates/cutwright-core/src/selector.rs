//! # Selector Extractor
//!
//! Derives the ordered selector set a module exposes from its interface
//! description (the JSON ABI emitted by the build).
//!
//! Extraction is pure: the same interface always yields the same selectors in
//! declaration order. A selector appearing twice in one module is a build
//! defect and is reported as a collision of the module with itself.

use crate::error::CutError;
use crate::primitives::Selector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One parameter of an ABI item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    /// Parameter name (may be empty).
    #[serde(default)]
    pub name: String,

    /// ABI type, e.g. `address`, `uint256[]`, `tuple[2]`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Members of a tuple type.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<Param>,
}

impl Param {
    /// Create a plain (non-tuple) parameter.
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            kind: kind.into(),
            components: Vec::new(),
        }
    }

    /// Canonical type string used in signatures.
    ///
    /// Tuples are spelled out recursively, keeping any array suffix:
    /// `tuple[]` with `(address,uint8)` members becomes `(address,uint8)[]`.
    pub fn canonical_type(&self) -> Result<String, String> {
        match self.kind.strip_prefix("tuple") {
            Some(suffix) => {
                if self.components.is_empty() {
                    return Err(format!("tuple parameter `{}` has no components", self.name));
                }
                let inner = self
                    .components
                    .iter()
                    .map(Param::canonical_type)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({}){}", inner.join(","), suffix))
            }
            None if self.kind.is_empty() => Err(format!("parameter `{}` has no type", self.name)),
            None => Ok(self.kind.clone()),
        }
    }
}

/// One ABI item (function, event, error, constructor, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiItem {
    /// Item type as written in the ABI.
    #[serde(rename = "type")]
    pub kind: String,

    /// Item name. Absent for constructor, fallback and receive.
    #[serde(default)]
    pub name: String,

    /// Input parameters.
    #[serde(default)]
    pub inputs: Vec<Param>,
}

impl AbiItem {
    /// Create a function item.
    #[must_use]
    pub fn function(name: impl Into<String>, inputs: Vec<Param>) -> Self {
        Self {
            kind: "function".to_string(),
            name: name.into(),
            inputs,
        }
    }

    /// Check if this item is a callable function.
    #[must_use]
    pub fn is_function(&self) -> bool {
        self.kind == "function"
    }

    /// Canonical signature, e.g. `transfer(address,uint256)`.
    pub fn signature(&self) -> Result<String, String> {
        let params = self
            .inputs
            .iter()
            .map(Param::canonical_type)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("{}({})", self.name, params.join(",")))
    }
}

/// A module's public interface description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Interface {
    pub items: Vec<AbiItem>,
}

impl Interface {
    /// Build an interface from `name(type,type)` signatures.
    ///
    /// Only flat parameter lists are supported; tuple parameters need the
    /// full ABI form.
    #[must_use]
    pub fn from_signatures<'a>(signatures: impl IntoIterator<Item = &'a str>) -> Self {
        let items = signatures
            .into_iter()
            .map(|sig| {
                let (name, rest) = sig.split_once('(').unwrap_or((sig, ")"));
                let params = rest.trim_end_matches(')');
                let inputs = params
                    .split(',')
                    .filter(|p| !p.is_empty())
                    .map(Param::new)
                    .collect();
                AbiItem::function(name, inputs)
            })
            .collect();
        Self { items }
    }

    /// Canonical signatures of all functions, in declaration order.
    pub fn function_signatures(&self) -> Result<Vec<String>, String> {
        self.items
            .iter()
            .filter(|item| item.is_function())
            .map(AbiItem::signature)
            .collect()
    }
}

/// Extract the ordered, duplicate-free selectors of `module`'s interface.
pub fn extract_selectors(module: &str, interface: &Interface) -> Result<Vec<Selector>, CutError> {
    let signatures = interface
        .function_signatures()
        .map_err(|reason| CutError::Interface {
            module: module.to_string(),
            reason,
        })?;

    let mut seen = BTreeSet::new();
    let mut selectors = Vec::with_capacity(signatures.len());
    for signature in &signatures {
        let selector = Selector::from_signature(signature);
        if !seen.insert(selector) {
            return Err(CutError::SelectorCollision {
                selector,
                first: module.to_string(),
                second: module.to_string(),
            });
        }
        selectors.push(selector);
    }
    Ok(selectors)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_in_declaration_order() {
        let interface = Interface::from_signatures([
            "transfer(address,uint256)",
            "balanceOf(address)",
            "totalSupply()",
        ]);
        let selectors = extract_selectors("Token", &interface).unwrap();
        let rendered: Vec<String> = selectors.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["0xa9059cbb", "0x70a08231", "0x18160ddd"]);
    }

    #[test]
    fn ignores_non_function_items() {
        let json = r#"[
            {"type": "constructor", "inputs": [{"name": "provider", "type": "address"}]},
            {"type": "event", "name": "Transfer", "inputs": []},
            {"type": "function", "name": "totalSupply", "inputs": []},
            {"type": "error", "name": "Unauthorized", "inputs": []},
            {"type": "receive"}
        ]"#;
        let interface: Interface = serde_json::from_str(json).unwrap();
        let selectors = extract_selectors("Token", &interface).unwrap();
        assert_eq!(selectors, vec![Selector::from_signature("totalSupply()")]);
    }

    #[test]
    fn tuple_parameters_are_expanded() {
        let cut = Param {
            name: "cuts".into(),
            kind: "tuple[]".into(),
            components: vec![
                Param::new("address"),
                Param::new("uint8"),
                Param::new("bytes4[]"),
            ],
        };
        let item = AbiItem::function(
            "updatePoolImpl",
            vec![cut, Param::new("address"), Param::new("bytes")],
        );
        assert_eq!(
            item.signature().unwrap(),
            "updatePoolImpl((address,uint8,bytes4[])[],address,bytes)"
        );
    }

    #[test]
    fn nested_tuples_are_expanded() {
        let inner = Param {
            name: "inner".into(),
            kind: "tuple".into(),
            components: vec![Param::new("uint256"), Param::new("bool")],
        };
        let outer = Param {
            name: "outer".into(),
            kind: "tuple[2]".into(),
            components: vec![Param::new("address"), inner],
        };
        assert_eq!(outer.canonical_type().unwrap(), "(address,(uint256,bool))[2]");
    }

    #[test]
    fn tuple_without_components_is_rejected() {
        let item = AbiItem::function(
            "broken",
            vec![Param {
                name: "t".into(),
                kind: "tuple".into(),
                components: Vec::new(),
            }],
        );
        let interface = Interface { items: vec![item] };
        let result = extract_selectors("Broken", &interface);
        assert!(matches!(result, Err(CutError::Interface { .. })));
    }

    #[test]
    fn duplicate_declaration_is_a_collision() {
        let interface = Interface::from_signatures(["pause()", "unpause()", "pause()"]);
        match extract_selectors("Parameters", &interface) {
            Err(CutError::SelectorCollision {
                selector,
                first,
                second,
            }) => {
                assert_eq!(selector, Selector::from_signature("pause()"));
                assert_eq!(first, "Parameters");
                assert_eq!(second, "Parameters");
            }
            other => panic!("expected collision, got {other:?}"),
        }
    }

    #[test]
    fn extraction_is_deterministic() {
        let interface = Interface::from_signatures(["a()", "b(uint256)", "c(address,bytes)"]);
        let first = extract_selectors("M", &interface).unwrap();
        let second = extract_selectors("M", &interface).unwrap();
        assert_eq!(first, second);
    }
}
