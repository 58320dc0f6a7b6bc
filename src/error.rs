//! Error taxonomy for quoting and transaction building
//!
//! Invalid input and unsupported operations fail fast. `StaleState` is the only
//! error a caller should answer by re-quoting.

use alloy_primitives::Address;
use thiserror::Error;

use crate::math::MathError;

#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Caller supplied something we cannot act on
    #[error("{0}")]
    InvalidInput(String),

    #[error("{input} -> {output} mapping is not supported")]
    UnsupportedPair { input: Address, output: Address },

    #[error("Protocol with id '{0}' not found")]
    ProtocolNotFound(String),

    /// Operation disabled for this protocol, raised before any I/O
    #[error("{operation} not supported for {protocol}")]
    Unsupported {
        operation: &'static str,
        protocol: String,
    },

    /// On-chain state moved between quote and encode
    #[error("{0}")]
    StaleState(String),

    #[error(transparent)]
    Math(#[from] MathError),

    #[error("chain read failed: {0}")]
    Chain(String),

    #[error("metadata request failed: {0}")]
    Http(String),

    #[error("failed to decode {0}")]
    Decode(String),
}

impl OptimizerError {
    /// True when re-quoting may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, OptimizerError::StaleState(_))
    }
}

pub type Result<T> = std::result::Result<T, OptimizerError>;
