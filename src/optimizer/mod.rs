//! Protocol adapters and the registry that dispatches to them
//!
//! Every adapter answers the same five questions for a (chain, token pair):
//! what the position looks like, which vaults accept a token, how much a
//! withdrawal returns, and which ordered transactions deposit or withdraw.
//! Within a returned list, order is execution order: an approval always
//! precedes the call that spends it.

pub mod erc20;
pub mod manager;
pub mod protocols;
pub mod types;
pub mod utils;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::chain::{Chain, ChainReader};
use crate::error::{OptimizerError, Result};
use crate::http::JsonClient;
use crate::tokens::{Token, TokenService};

pub use manager::ProtocolManager;
pub use types::{
    Action, Category, PermitKind, PermitTx, PermitTxBuilder, PositionPair, Protocol, Reward, TxInfo,
    VaultMetadata, Withdraw, WithdrawTxs, LEARN_MORE_DESC,
};
pub use utils::{apr_to_apy, generate_description};

/// Uniform capability surface over lending, staking and yield protocols
#[async_trait]
pub trait DefiProtocol: Send + Sync {
    /// Stable registry key, e.g. `"morphoblue"`
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn site_url(&self) -> &str;

    fn category(&self) -> Category;

    fn is_withdrawal_supported(&self) -> bool;

    fn descriptor(&self) -> Protocol {
        Protocol {
            id: self.id().to_string(),
            name: self.name().to_string(),
            site_url: self.site_url().to_string(),
            is_withdrawal_supported: self.is_withdrawal_supported(),
        }
    }

    /// Metadata of an existing position. Fails when the pair is not one this
    /// protocol maps.
    async fn position_info(&self, chain: &Chain, input_token: Address, output_token: Address) -> Result<VaultMetadata>;

    /// Vaults accepting `input_token`; empty when there are none
    async fn vaults_info(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>>;

    /// Input tokens returned for withdrawing `amount` of `output_token`
    async fn withdrawal_amount(&self, chain: &Chain, input_token: &Token, output_token: &Token, amount: U256) -> Result<U256>;

    async fn withdraw(
        &self,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<WithdrawTxs>;

    async fn deposit(
        &self,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>>;
}

/// Collaborators shared by every adapter
#[derive(Clone)]
pub struct ProtocolContext {
    pub reader: Arc<dyn ChainReader>,
    pub http: Arc<dyn JsonClient>,
    pub tokens: Arc<TokenService>,
}

impl ProtocolContext {
    pub fn new(reader: Arc<dyn ChainReader>, http: Arc<dyn JsonClient>, tokens: Arc<TokenService>) -> Self {
        Self { reader, http, tokens }
    }

    pub fn reader(&self) -> &dyn ChainReader {
        self.reader.as_ref()
    }
}

/// Endpoints and accounts the default adapters are built with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolSettings {
    pub morpho_api_url: String,
    pub lido_api_url: String,
    pub ethena_api_url: String,
    pub rocketpool_api_url: String,
    pub etherfi_api_url: String,
    pub referral_account: Address,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            morpho_api_url: protocols::morpho::MORPHO_API_URL.to_string(),
            lido_api_url: protocols::lido::LIDO_API_URL.to_string(),
            ethena_api_url: protocols::ethena::ETHENA_API_URL.to_string(),
            rocketpool_api_url: protocols::rocketpool::ROCKETPOOL_API_URL.to_string(),
            etherfi_api_url: protocols::etherfi::ETHERFI_API_URL.to_string(),
            referral_account: Address::ZERO,
        }
    }
}

/// Error for pairs outside a protocol's static token mapping
pub(crate) fn unsupported_pair(input: Address, output: Address) -> OptimizerError {
    OptimizerError::UnsupportedPair { input, output }
}
