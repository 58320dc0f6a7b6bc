//! Token descriptors and the token-info cache
//!
//! Token metadata is immutable per (chain, address), so lookups are memoized
//! in a bounded cache with a TTL. Expired entries are simply re-read; there is
//! no explicit invalidation. Concurrent misses may both read the chain and the
//! last write wins, which is fine since the values are identical.

use alloy_primitives::utils::format_units as alloy_format_units;
use alloy_primitives::{address, Address, U256};
use alloy_sol_types::sol;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::chain::{read, Chain, ChainReader};
use crate::error::{OptimizerError, Result};

// ============================================
// WELL-KNOWN ADDRESSES
// ============================================

/// Placeholder address for the chain's native currency
pub const NATIVE_TOKEN_ADDRESS: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

pub const WETH: Address = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
pub const USDC: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
pub const USDT: Address = address!("dAC17F958D2ee523a2206206994597C13D831ec7");
pub const WSTETH: Address = address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0");
pub const STETH: Address = address!("ae7ab96520DE3A18E5e111B5EaAb095312D7fE84");

/// Entries kept before the oldest is evicted
pub const TOKEN_CACHE_MAX_ENTRIES: usize = 1000;

/// Token metadata cache lifetime
pub const TOKEN_CACHE_TTL_SECS: u64 = 300; // 5 minutes

sol! {
    #[allow(missing_docs)]
    interface IERC20 {
        function name() external view returns (string memory);
        function symbol() external view returns (string memory);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

// ============================================
// TOKEN
// ============================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub address: Address,
    pub logo_url: Option<String>,
}

impl Token {
    pub fn native(chain: &Chain) -> Self {
        Self {
            name: chain.native_currency.name.to_string(),
            symbol: chain.native_currency.symbol.to_string(),
            decimals: chain.native_currency.decimals,
            address: NATIVE_TOKEN_ADDRESS,
            logo_url: None,
        }
    }

    pub fn is_native(&self) -> bool {
        self.address == NATIVE_TOKEN_ADDRESS
    }

    /// `amount` in whole units, trailing zeros trimmed
    pub fn display_amount(&self, amount: U256) -> String {
        format_units(amount, self.decimals)
    }
}

/// Format a base-unit amount as a decimal string: `1500000` with 6 decimals is `"1.5"`
pub fn format_units(amount: U256, decimals: u8) -> String {
    let formatted = match alloy_format_units(amount, decimals) {
        Ok(s) => s,
        Err(_) => return amount.to_string(),
    };
    match formatted.split_once('.') {
        Some((integer, fraction)) => {
            let fraction = fraction.trim_end_matches('0');
            if fraction.is_empty() {
                integer.to_string()
            } else {
                format!("{integer}.{fraction}")
            }
        }
        None => formatted,
    }
}

/// Lossy conversion for APY/TVL maths
pub fn units_to_f64(amount: U256, decimals: u8) -> f64 {
    format_units(amount, decimals).parse().unwrap_or_default()
}

// ============================================
// TOKEN SERVICE (CACHED LOOKUPS)
// ============================================

#[derive(Debug, Clone)]
struct CachedToken {
    token: Token,
    cached_at: Instant,
}

/// Resolves token metadata from chain, memoized per (chain id, address)
pub struct TokenService {
    reader: Arc<dyn ChainReader>,
    cache: RwLock<HashMap<(u64, Address), CachedToken>>,
    max_entries: usize,
    ttl: Duration,
}

impl TokenService {
    pub fn new(reader: Arc<dyn ChainReader>, max_entries: usize, ttl: Duration) -> Self {
        Self {
            reader,
            cache: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl,
        }
    }

    pub fn with_defaults(reader: Arc<dyn ChainReader>) -> Self {
        Self::new(
            reader,
            TOKEN_CACHE_MAX_ENTRIES,
            Duration::from_secs(TOKEN_CACHE_TTL_SECS),
        )
    }

    pub fn reader(&self) -> &dyn ChainReader {
        self.reader.as_ref()
    }

    /// Name, symbol and decimals of `address` on `chain`
    pub async fn token_info(&self, chain: &Chain, address: Address) -> Result<Token> {
        if address == NATIVE_TOKEN_ADDRESS {
            return Ok(Token::native(chain));
        }

        if let Some(token) = self.cached(chain.id, address) {
            debug!("Token {} ({:?}) from cache", token.symbol, address);
            return Ok(token);
        }

        let reader = self.reader.as_ref();
        let (name, symbol, decimals) = futures::try_join!(
            read(reader, chain, address, IERC20::nameCall {}),
            read(reader, chain, address, IERC20::symbolCall {}),
            read(reader, chain, address, IERC20::decimalsCall {}),
        )
        .map_err(|e| {
            OptimizerError::InvalidInput(format!(
                "Failed to get token info for {address} on chain {}: {e}",
                chain.id
            ))
        })?;

        let token = Token {
            name,
            symbol,
            decimals,
            address,
            logo_url: None,
        };
        self.store(chain.id, token.clone());
        Ok(token)
    }

    fn cached(&self, chain_id: u64, address: Address) -> Option<Token> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        cache
            .get(&(chain_id, address))
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.token.clone())
    }

    fn store(&self, chain_id: u64, token: Token) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let key = (chain_id, token.address);

        if !cache.contains_key(&key) && cache.len() >= self.max_entries {
            let ttl = self.ttl;
            cache.retain(|_, entry| entry.cached_at.elapsed() < ttl);

            if cache.len() >= self.max_entries {
                let oldest = cache
                    .iter()
                    .min_by_key(|(_, entry)| entry.cached_at)
                    .map(|(k, _)| *k);
                if let Some(oldest) = oldest {
                    cache.remove(&oldest);
                }
            }
        }

        cache.insert(
            key,
            CachedToken {
                token,
                cached_at: Instant::now(),
            },
        );
    }

    /// Number of cached entries, expired ones included
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}
