//! Runtime configuration for the optimizer CLI
//!
//! Loaded from environment variables (with `.env` support) or a TOML file.
//! Everything has a default except the user address.

use alloy_primitives::Address;
use eyre::{eyre, Result, WrapErr};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::{chain_by_id, Chain};
use crate::http::DEFAULT_TIMEOUT_SECS;
use crate::optimizer::protocols::{
    ethena::ETHENA_API_URL, etherfi::ETHERFI_API_URL, lido::LIDO_API_URL, morpho::MORPHO_API_URL,
    rocketpool::ROCKETPOOL_API_URL,
};
use crate::optimizer::ProtocolSettings;
use crate::tokens::{TOKEN_CACHE_MAX_ENTRIES, TOKEN_CACHE_TTL_SECS};

const DEFAULT_RPC_URL: &str = "https://eth.llamarpc.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // ========== Network Settings ==========
    /// JSON-RPC endpoint used for `eth_call`
    pub rpc_url: String,

    pub chain_id: u64,

    /// Account transactions are built for. Required by deposit/withdraw.
    pub user_address: Option<Address>,

    // ========== Metadata APIs ==========
    pub morpho_api_url: String,
    pub lido_api_url: String,
    pub ethena_api_url: String,
    pub rocketpool_api_url: String,
    /// Base URL serving ether.fi `/apy` and `/tvl`
    pub etherfi_api_url: String,

    /// Referral passed to Lido `submit`
    pub referral_account: Address,

    pub http_timeout_secs: u64,

    // ========== Token Cache ==========
    pub token_cache_max_entries: usize,
    pub token_cache_ttl_secs: u64,

    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys fall back to defaults; malformed
    /// addresses are an error rather than a silent default.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse_or = |key: &str, default: u64| -> u64 {
            lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        };

        let user_address = lookup("USER_ADDRESS")
            .filter(|v| !v.trim().is_empty())
            .map(|v| parse_address("USER_ADDRESS", &v))
            .transpose()?;
        let referral_account = match lookup("REFERRAL_ACCOUNT") {
            Some(v) if !v.trim().is_empty() => parse_address("REFERRAL_ACCOUNT", &v)?,
            _ => defaults.referral_account,
        };

        Ok(Self {
            rpc_url: lookup("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: parse_or("CHAIN_ID", defaults.chain_id),
            user_address,
            morpho_api_url: lookup("MORPHO_API_URL").unwrap_or(defaults.morpho_api_url),
            lido_api_url: lookup("LIDO_API_URL").unwrap_or(defaults.lido_api_url),
            ethena_api_url: lookup("ETHENA_API_URL").unwrap_or(defaults.ethena_api_url),
            rocketpool_api_url: lookup("ROCKETPOOL_API_URL").unwrap_or(defaults.rocketpool_api_url),
            etherfi_api_url: lookup("ETHERFI_API_URL").unwrap_or(defaults.etherfi_api_url),
            referral_account,
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
            token_cache_max_entries: lookup("TOKEN_CACHE_MAX_ENTRIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.token_cache_max_entries),
            token_cache_ttl_secs: parse_or("TOKEN_CACHE_TTL_SECS", defaults.token_cache_ttl_secs),
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .wrap_err_with(|| format!("invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.trim().is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre!("Invalid RPC_URL - please set a valid JSON-RPC endpoint"));
        }
        if self.chain().is_none() {
            return Err(eyre!("Unsupported CHAIN_ID {}", self.chain_id));
        }
        if self.token_cache_max_entries == 0 {
            return Err(eyre!("TOKEN_CACHE_MAX_ENTRIES must be greater than zero"));
        }
        if self.token_cache_ttl_secs == 0 {
            return Err(eyre!("TOKEN_CACHE_TTL_SECS must be greater than zero"));
        }
        if self.http_timeout_secs == 0 {
            return Err(eyre!("HTTP_TIMEOUT_SECS must be greater than zero"));
        }
        Ok(())
    }

    pub fn chain(&self) -> Option<Chain> {
        chain_by_id(self.chain_id)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn token_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.token_cache_ttl_secs)
    }

    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            morpho_api_url: self.morpho_api_url.clone(),
            lido_api_url: self.lido_api_url.clone(),
            ethena_api_url: self.ethena_api_url.clone(),
            rocketpool_api_url: self.rocketpool_api_url.clone(),
            etherfi_api_url: self.etherfi_api_url.clone(),
            referral_account: self.referral_account,
        }
    }

    pub fn print_summary(&self) {
        let chain_name = self.chain().map(|c| c.name).unwrap_or("unknown");
        let user = self
            .user_address
            .map(|a| a.to_string())
            .unwrap_or_else(|| "✗ Not Set".to_string());

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              BENTO OPTIMIZER - CONFIGURATION               ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain:             {:^40} ║", format!("{} ({})", chain_name, self.chain_id));
        println!("║ User:              {:^40} ║", short(&user));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ METADATA                                                   ║");
        println!("║ • Morpho API:      {:^40} ║", short(&self.morpho_api_url));
        println!("║ • Lido API:        {:^40} ║", short(&self.lido_api_url));
        println!("║ • Ethena API:      {:^40} ║", short(&self.ethena_api_url));
        println!("║ • Rocket Pool API: {:^40} ║", short(&self.rocketpool_api_url));
        println!("║ • ether.fi API:    {:^40} ║", short(&self.etherfi_api_url));
        println!("║ • HTTP Timeout:    {:>38} s ║", self.http_timeout_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ TOKEN CACHE                                                ║");
        println!("║ • Max Entries:     {:^40} ║", self.token_cache_max_entries);
        println!("║ • TTL:             {:>38} s ║", self.token_cache_ttl_secs);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            chain_id: 1,
            user_address: None,
            morpho_api_url: MORPHO_API_URL.to_string(),
            lido_api_url: LIDO_API_URL.to_string(),
            ethena_api_url: ETHENA_API_URL.to_string(),
            rocketpool_api_url: ROCKETPOOL_API_URL.to_string(),
            etherfi_api_url: ETHERFI_API_URL.to_string(),
            referral_account: Address::ZERO,
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            token_cache_max_entries: TOKEN_CACHE_MAX_ENTRIES,
            token_cache_ttl_secs: TOKEN_CACHE_TTL_SECS,
            log_level: "info".to_string(),
        }
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim()).wrap_err_with(|| format!("{key} is not a valid address: {value}"))
}

/// Fit long values into the summary box
fn short(value: &str) -> String {
    if value.chars().count() <= 40 {
        value.to_string()
    } else {
        let head: String = value.chars().take(37).collect();
        format!("{head}...")
    }
}
