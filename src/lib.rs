//! Bento Optimizer
//!
//! Vault discovery and batch transaction building for ERC-4626 vaults,
//! lending markets and liquid staking. Every transaction the adapters build
//! carries a human-readable description rendered next to its calldata.

pub mod chain;
pub mod config;
pub mod error;
pub mod http;
pub mod math;
pub mod optimizer;
pub mod tokens;

#[cfg(test)]
mod testing;

pub use chain::{Chain, ChainReader, RpcReader};
pub use config::Config;
pub use error::{OptimizerError, Result};
pub use optimizer::{DefiProtocol, ProtocolContext, ProtocolManager, ProtocolSettings};
pub use tokens::{Token, TokenService};
