//! # JSON-RPC Chain
//!
//! The live collaborator behind [`ModuleBuilder`] and [`RoutingTable`].
//!
//! Transactions are sent with `eth_sendTransaction` from an account the node
//! manages, then confirmed by polling `eth_getTransactionReceipt` within the
//! configured bounds. Reads use `eth_call` against the latest block.
//!
//! ```text
//! RpcChain ──► addresses provider ── updatePoolImpl(cuts, init target, init payload)
//!          │                      └─ getPool()
//!          └─► proxy ─────────────── facetAddress(bytes4)
//!                                 ├─ facetFunctionSelectors(address)
//!                                 └─ unlimitedApproveTo(token, spender)
//! ```
//!
//! Introspection goes through the proxy's interface facet. Until that facet
//! is routed (or before the proxy exists) the table reports no routes and
//! [`RoutingTable::can_introspect`] is false.

use crate::artifacts::{Artifact, ArtifactStore};
use crate::config::Confirmations;
use cutwright_core::abi::{self, Token};
use cutwright_core::{
    Address, Cut, CutError, Facet, Interface, ModuleBuilder, ModuleKind, RoutingTable, Selector,
    StandIn, TransportError, TxOverrides,
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::cell::Cell;
use std::time::Duration;
use tracing::{debug, info};

/// Cut entry point of the addresses provider.
pub const UPDATE_IMPL: &str = "updatePoolImpl((address,uint8,bytes4[])[],address,bytes)";
/// Proxy getter of the addresses provider.
pub const GET_POOL: &str = "getPool()";
pub const FACET_ADDRESS: &str = "facetAddress(bytes4)";
pub const FACET_SELECTORS: &str = "facetFunctionSelectors(address)";
pub const UNLIMITED_APPROVE: &str = "unlimitedApproveTo(address,address)";

// =============================================================================
// CLIENT
// =============================================================================

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Minimal blocking JSON-RPC 2.0 client.
#[derive(Debug)]
pub struct RpcClient {
    url: String,
    http: reqwest::blocking::Client,
    next_id: Cell<u64>,
}

impl RpcClient {
    /// Create a client for the endpoint at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            next_id: Cell::new(1),
        }
    }

    /// Call `method` and decode its result.
    ///
    /// Node errors mentioning a revert map to [`TransportError::Reverted`],
    /// other node errors to [`TransportError::Rejected`].
    pub fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, TransportError> {
        let id = self.next_id.get();
        self.next_id.set(id.saturating_add(1));
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });

        let unavailable = |e: reqwest::Error| TransportError::Unavailable(format!("{method}: {e}"));
        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .map_err(unavailable)?
            .error_for_status()
            .map_err(unavailable)?
            .json()
            .map_err(|e| TransportError::Malformed(format!("{method}: {e}")))?;

        if let Some(err) = response.error {
            return Err(if err.message.to_ascii_lowercase().contains("revert") {
                TransportError::Reverted(err.message)
            } else {
                TransportError::Rejected(format!("{} (code {})", err.message, err.code))
            });
        }
        serde_json::from_value(response.result)
            .map_err(|e| TransportError::Malformed(format!("{method}: {e}")))
    }
}

// =============================================================================
// CHAIN
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
}

impl Receipt {
    fn succeeded(&self) -> bool {
        // Pre-byzantium receipts carry no status.
        self.status.as_deref().is_none_or(|s| s == "0x1")
    }
}

fn hex_data(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

fn quantity(value: impl Into<u128>) -> Value {
    Value::String(format!("{:#x}", value.into()))
}

/// Live chain reached over JSON-RPC.
#[derive(Debug)]
pub struct RpcChain {
    client: RpcClient,
    /// Sending account.
    from: Address,
    /// Addresses provider administering the routing table.
    provider: Address,
    artifacts: ArtifactStore,
    confirmations: Confirmations,
    proxy: Cell<Option<Address>>,
}

impl RpcChain {
    /// Create a chain collaborator.
    pub fn new(
        client: RpcClient,
        from: Address,
        provider: Address,
        artifacts: ArtifactStore,
        confirmations: Confirmations,
    ) -> Self {
        Self {
            client,
            from,
            provider,
            artifacts,
            confirmations,
            proxy: Cell::new(None),
        }
    }

    fn send(
        &self,
        to: Option<Address>,
        data: &[u8],
        overrides: &TxOverrides,
    ) -> Result<Receipt, TransportError> {
        let mut tx = Map::new();
        tx.insert("from".into(), Value::String(self.from.to_string()));
        if let Some(to) = to {
            tx.insert("to".into(), Value::String(to.to_string()));
        }
        tx.insert("data".into(), Value::String(hex_data(data)));
        if let Some(gas) = overrides.gas_limit {
            tx.insert("gas".into(), quantity(gas));
        }
        if let Some(fee) = overrides.max_fee_per_gas {
            tx.insert("maxFeePerGas".into(), quantity(fee));
        }
        if let Some(tip) = overrides.max_priority_fee_per_gas {
            tx.insert("maxPriorityFeePerGas".into(), quantity(tip));
        }

        let hash: String = self.client.request("eth_sendTransaction", json!([tx]))?;
        debug!(%hash, "transaction sent");
        self.confirm(&hash)
    }

    fn confirm(&self, hash: &str) -> Result<Receipt, TransportError> {
        let interval = Duration::from_millis(self.confirmations.poll_interval_ms);
        for _ in 0..self.confirmations.max_polls {
            let receipt: Option<Receipt> = self
                .client
                .request("eth_getTransactionReceipt", json!([hash]))?;
            match receipt {
                Some(receipt) if receipt.succeeded() => return Ok(receipt),
                Some(_) => {
                    return Err(TransportError::Reverted(format!("transaction {hash} reverted")));
                }
                None => std::thread::sleep(interval),
            }
        }
        Err(TransportError::Unavailable(format!(
            "transaction {hash} not confirmed after {} polls",
            self.confirmations.max_polls
        )))
    }

    fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let out: String = self.client.request(
            "eth_call",
            json!([{ "to": to.to_string(), "data": hex_data(data) }, "latest"]),
        )?;
        let digits = out.strip_prefix("0x").unwrap_or(&out);
        hex::decode(digits).map_err(|e| TransportError::Malformed(format!("eth_call result: {e}")))
    }

    /// Proxy address, or `None` while the table has never been cut.
    fn live_proxy(&self) -> Result<Option<Address>, TransportError> {
        if let Some(proxy) = self.proxy.get() {
            return Ok(Some(proxy));
        }
        let data = self.call(self.provider, &abi::encode_call(GET_POOL, &[]))?;
        let proxy = abi::decode_address(&data)?;
        if proxy.is_zero() {
            return Ok(None);
        }
        self.proxy.set(Some(proxy));
        Ok(Some(proxy))
    }

    /// Introspection read through the proxy. A revert means the interface
    /// facet is not routed yet.
    fn introspect(&self, data: &[u8]) -> Result<Option<Vec<u8>>, TransportError> {
        let Some(proxy) = self.live_proxy()? else {
            return Ok(None);
        };
        match self.call(proxy, data) {
            Ok(out) => Ok(Some(out)),
            Err(TransportError::Reverted(reason)) => {
                debug!(%reason, "introspection unavailable");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn deploy_artifact(
        &self,
        name: &str,
        artifact: Option<Artifact>,
        args: &[Address],
        overrides: &TxOverrides,
    ) -> Result<Address, TransportError> {
        let artifact = artifact
            .ok_or_else(|| TransportError::Rejected(format!("no build artifact for {name}")))?;
        let mut code = artifact
            .creation_code(name)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        let tokens: Vec<Token> = args.iter().copied().map(Token::Address).collect();
        code.extend(abi::encode(&tokens));

        let receipt = self.send(None, &code, overrides)?;
        let address = receipt.contract_address.ok_or_else(|| {
            TransportError::Malformed(format!(
                "deployment receipt of {name} has no contract address"
            ))
        })?;
        info!(contract = name, %address, "contract deployed");
        Ok(address)
    }
}

impl ModuleBuilder for RpcChain {
    fn interface(&self, kind: ModuleKind) -> Result<Option<Interface>, CutError> {
        self.artifacts
            .module(kind)
            .map(|artifact| artifact.map(|a| a.abi))
            .map_err(|e| CutError::Interface {
                module: kind.to_string(),
                reason: e.to_string(),
            })
    }

    fn deploy(
        &mut self,
        facet: &Facet,
        overrides: &TxOverrides,
    ) -> Result<Address, TransportError> {
        let kind = facet.kind();
        let artifact = self
            .artifacts
            .module(kind)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        self.deploy_artifact(kind.artifact_name(), artifact, &facet.constructor_args(), overrides)
    }

    fn deploy_stand_in(
        &mut self,
        stand_in: StandIn,
        args: &[Address],
        overrides: &TxOverrides,
    ) -> Result<Address, TransportError> {
        let artifact = self
            .artifacts
            .stand_in(stand_in)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;
        self.deploy_artifact(stand_in.artifact_name(), artifact, args, overrides)
    }
}

impl RoutingTable for RpcChain {
    fn cut(&mut self, cut: &Cut, overrides: &TxOverrides) -> Result<(), TransportError> {
        let data = abi::encode_call(UPDATE_IMPL, &cut.to_tokens());
        self.send(Some(self.provider), &data, overrides)?;
        Ok(())
    }

    fn proxy_address(&self) -> Result<Address, TransportError> {
        self.live_proxy()?
            .ok_or_else(|| TransportError::Reverted("routing table has no proxy yet".into()))
    }

    fn can_introspect(&self) -> Result<bool, TransportError> {
        let loupe = Selector::from_signature(FACET_ADDRESS);
        let data = abi::encode_call(FACET_ADDRESS, &[Token::selector(loupe)]);
        Ok(self.introspect(&data)?.is_some())
    }

    fn facet_address(&self, selector: Selector) -> Result<Option<Address>, TransportError> {
        let data = abi::encode_call(FACET_ADDRESS, &[Token::selector(selector)]);
        match self.introspect(&data)? {
            Some(out) => {
                let facet = abi::decode_address(&out)?;
                Ok((!facet.is_zero()).then_some(facet))
            }
            None => Ok(None),
        }
    }

    fn selectors_of(&self, facet: Address) -> Result<Vec<Selector>, TransportError> {
        let data = abi::encode_call(FACET_SELECTORS, &[Token::Address(facet)]);
        match self.introspect(&data)? {
            Some(out) => abi::decode_selectors(&out),
            None => Ok(Vec::new()),
        }
    }

    fn approve(
        &mut self,
        proxy: Address,
        token: Address,
        spender: Address,
        overrides: &TxOverrides,
    ) -> Result<(), TransportError> {
        let data = abi::encode_call(
            UNLIMITED_APPROVE,
            &[Token::Address(token), Token::Address(spender)],
        );
        self.send(Some(proxy), &data, overrides)?;
        Ok(())
    }
}
