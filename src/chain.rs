//! Chains and read-only contract access
//!
//! `ChainReader` is the only way the optimizer touches a node: a plain
//! `eth_call`. Signing and broadcasting live elsewhere.

use alloy_primitives::{address, Address, Bytes};
use alloy_provider::{Provider, RootProvider};
use alloy_rpc_types::TransactionRequest;
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::trace;

use crate::error::{OptimizerError, Result};

// ============================================
// CHAINS
// ============================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub id: u64,
    pub name: &'static str,
    pub native_currency: NativeCurrency,
    /// ERC-20 wrapper of the native currency
    pub wrapped_native: Address,
}

const ETHER: NativeCurrency = NativeCurrency {
    name: "Ether",
    symbol: "ETH",
    decimals: 18,
};

pub const MAINNET: Chain = Chain {
    id: 1,
    name: "Ethereum",
    native_currency: ETHER,
    wrapped_native: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
};

pub const ARBITRUM: Chain = Chain {
    id: 42161,
    name: "Arbitrum One",
    native_currency: ETHER,
    wrapped_native: address!("82aF49447D8a07e3bd95BD0d56f35241523fBab1"),
};

pub const BASE: Chain = Chain {
    id: 8453,
    name: "Base",
    native_currency: ETHER,
    wrapped_native: address!("4200000000000000000000000000000000000006"),
};

pub const SUPPORTED_CHAINS: &[Chain] = &[MAINNET, ARBITRUM, BASE];

pub fn chain_by_id(id: u64) -> Option<Chain> {
    SUPPORTED_CHAINS.iter().find(|c| c.id == id).cloned()
}

// ============================================
// CONTRACT READS
// ============================================

/// Read-only contract access
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `eth_call` against the latest block
    async fn call(&self, chain_id: u64, to: Address, calldata: Bytes) -> Result<Bytes>;
}

/// Encode `call`, run it against `to` and decode the return value
pub async fn read<C>(reader: &dyn ChainReader, chain: &Chain, to: Address, call: C) -> Result<C::Return>
where
    C: SolCall + Send,
{
    let output = reader.call(chain.id, to, call.abi_encode().into()).await?;
    C::abi_decode_returns(&output)
        .map_err(|e| OptimizerError::Decode(format!("{} from {}: {}", C::SIGNATURE, to, e)))
}

/// JSON-RPC backed reader, one HTTP provider per chain id
pub struct RpcReader {
    providers: HashMap<u64, RootProvider>,
}

impl RpcReader {
    pub fn new(chain_id: u64, rpc_url: &str) -> Result<Self> {
        Self {
            providers: HashMap::new(),
        }
        .with_endpoint(chain_id, rpc_url)
    }

    pub fn with_endpoint(mut self, chain_id: u64, rpc_url: &str) -> Result<Self> {
        let url = rpc_url
            .parse::<reqwest::Url>()
            .map_err(|e| OptimizerError::InvalidInput(format!("invalid RPC url {rpc_url}: {e}")))?;
        self.providers.insert(chain_id, RootProvider::new_http(url));
        Ok(self)
    }
}

#[async_trait]
impl ChainReader for RpcReader {
    async fn call(&self, chain_id: u64, to: Address, calldata: Bytes) -> Result<Bytes> {
        let provider = self.providers.get(&chain_id).ok_or_else(|| {
            OptimizerError::InvalidInput(format!("no RPC endpoint configured for chain {chain_id}"))
        })?;

        let tx = TransactionRequest::default().to(to).input(calldata.into());

        trace!("eth_call chain={} to={:?}", chain_id, to);
        provider
            .call(tx)
            .await
            .map_err(|e| OptimizerError::Chain(format!("eth_call to {to} failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup() {
        assert_eq!(chain_by_id(1), Some(MAINNET));
        assert_eq!(chain_by_id(8453).map(|c| c.name), Some("Base"));
        assert_eq!(chain_by_id(56), None);
    }

    #[tokio::test]
    async fn test_rpc_reader_rejects_unknown_chain() {
        let reader = RpcReader::new(1, "http://localhost:8545").unwrap();
        let err = reader
            .call(10, address!("0000000000000000000000000000000000000001"), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::InvalidInput(_)));
    }

    #[test]
    fn test_rpc_reader_rejects_bad_url() {
        assert!(matches!(
            RpcReader::new(1, "not a url"),
            Err(OptimizerError::InvalidInput(_))
        ));
    }
}
