//! # Cutwright Library
//!
//! This library exposes the Cutwright application modules for testing and
//! integration.
//!
//! The main binary uses these modules through the `main.rs` entry point.

pub mod artifacts;
pub mod cli;
pub mod config;
pub mod rpc;

// Re-export cutwright_core for convenience
pub use cutwright_core;
