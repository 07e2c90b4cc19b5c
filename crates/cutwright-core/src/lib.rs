//! # Cutwright Core - The Orchestrator
//!
//! Deterministic engine for upgrading a selector-routed proxy (a routing
//! table that forwards each call to the facet registered for its 4-byte
//! selector).
//!
//! ## Pipeline
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │  selector    │   │  dependency  │   │  facet set   │   │     cut      │
//! │  extractor   │──►│  resolver    │──►│  planner     │──►│  sequencer   │
//! └──────────────┘   └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                                                 │
//!                    ┌──────────────┐   ┌──────────────┐          │
//!                    │   registry   │◄──│    wiring    │◄─────────┘
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! ## Collaborators
//!
//! The engine never touches the network. Chains are reached through the
//! [`ModuleBuilder`] and [`RoutingTable`] traits, addresses are persisted
//! through [`Registry`]. [`SimChain`] and [`MemoryRegistry`] implement them
//! in-process; [`RedbRegistry`] persists to disk.

pub mod abi;
pub mod chain;
pub mod context;
pub mod cut;
pub mod error;
pub mod module;
pub mod orchestrator;
pub mod planner;
pub mod primitives;
pub mod registry;
pub mod resolver;
pub mod selector;
pub mod sequencer;
pub mod sim;
pub mod storage;
pub mod wiring;

pub use chain::{ModuleBuilder, RoutingTable};
pub use context::{DeployContext, Environment, Features, TxOverrides, WiringRule, names};
pub use cut::{Cut, CutAction, FacetCut, InitCall};
pub use error::{CutError, RegistryError, TransportError};
pub use module::{Facet, ModuleKind, PROXY_KEY, StandIn};
pub use orchestrator::{RunReport, run};
pub use planner::{Approval, Plan, PlannedFacet};
pub use primitives::{Address, ParseHexError, Selector, keccak256};
pub use registry::{MemoryRegistry, Registry, RegistryEntry};
pub use resolver::{Dependency, DependencyResolver, Resolution};
pub use selector::{AbiItem, Interface, Param, extract_selectors};
pub use sequencer::{AppliedCut, SequenceReport};
pub use sim::SimChain;
pub use storage::RedbRegistry;
pub use wiring::{ApprovalOutcome, WiringReport};
