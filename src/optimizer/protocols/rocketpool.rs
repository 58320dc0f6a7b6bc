//! Rocket Pool liquid staking (ETH -> rETH)
//!
//! Deposits go to the deposit pool with ETH attached; withdrawals burn rETH
//! for its current ETH value.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::chain::{read, Chain, MAINNET};
use crate::error::Result;
use crate::http::json_f64;
use crate::optimizer::types::{Action, Category, TxInfo, VaultMetadata, WithdrawTxs};
use crate::optimizer::utils::{apr_to_apy, generate_description};
use crate::optimizer::{unsupported_pair, DefiProtocol, ProtocolContext};
use crate::tokens::{Token, NATIVE_TOKEN_ADDRESS};

pub const ROCKETPOOL_ID: &str = "rocketpool";
pub const ROCKETPOOL_NAME: &str = "Rocket Pool";
pub const ROCKETPOOL_SITE_URL: &str = "https://rocketpool.net/";
pub const ROCKETPOOL_API_URL: &str = "https://stake.rocketpool.net/api/mainnet/payload";
const STAKE_URL: &str = "https://stake.rocketpool.net/liquid-staking/stake";
const UNSTAKE_URL: &str = "https://stake.rocketpool.net/liquid-staking/unstake";
const DAYS_PER_YEAR: u32 = 365;

pub const RETH: Address = address!("ae78736Cd615f374D3085123A210448E74Fc6393");
pub const ROCKET_DEPOSIT_POOL: Address = address!("DD3f50F8A6CafbE9b31a427582963f465E745AF8");

sol! {
    interface IRocketDepositPool {
        function deposit() external payable;
    }

    interface IRocketTokenRETH {
        function getEthValue(uint256 rethAmount) external view returns (uint256);
        function burn(uint256 rethAmount) external;
    }
}

/// Figures pulled from the staking site's payload
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PoolStats {
    tvl: f64,
    apy: f64,
}

impl PoolStats {
    /// `rethAPR` is in percent; TVL is staked ETH at the quoted ETH price
    fn from_payload(body: &Value) -> Option<Self> {
        let apr = body.get("rethAPR").and_then(json_f64)?;
        let staked = body.get("stats")?.get("ethStakingTotal").and_then(json_f64)?;
        let eth_price = body.get("ethPrice").and_then(json_f64)?;
        Some(Self {
            tvl: staked * eth_price,
            apy: apr_to_apy(apr / 100.0, DAYS_PER_YEAR),
        })
    }
}

pub struct RocketPool {
    ctx: ProtocolContext,
    api_url: String,
}

impl RocketPool {
    pub fn new(ctx: ProtocolContext, api_url: impl Into<String>) -> Self {
        Self {
            ctx,
            api_url: api_url.into(),
        }
    }

    fn staked_token(chain: &Chain, input: Address) -> Option<Address> {
        (chain.id == MAINNET.id && input == NATIVE_TOKEN_ADDRESS).then_some(RETH)
    }

    /// Display figures only: an unreachable or changed payload shows zeros
    async fn stats(&self) -> PoolStats {
        let stats = match self.ctx.http.get_json(&self.api_url).await {
            Ok(body) => PoolStats::from_payload(&body),
            Err(e) => {
                warn!("Rocket Pool stats unavailable: {}", e);
                return PoolStats::default();
            }
        };
        stats.unwrap_or_else(|| {
            warn!("Rocket Pool payload missing rethAPR / ethStakingTotal / ethPrice");
            PoolStats::default()
        })
    }

    async fn metadata(&self, chain: &Chain, input: Address, output: Address, site_url: &str) -> Result<VaultMetadata> {
        let tokens = &self.ctx.tokens;
        let (pair, stats) = futures::join!(
            async { futures::try_join!(tokens.token_info(chain, input), tokens.token_info(chain, output)) },
            self.stats(),
        );
        let (input_token, output_token) = pair?;

        Ok(VaultMetadata {
            protocol: self.descriptor(),
            name: Some(input_token.symbol.clone()),
            category: self.category(),
            site_url: site_url.to_string(),
            input_token,
            output_token,
            tvl: stats.tvl,
            apy: stats.apy,
            rewards: vec![],
        })
    }
}

#[async_trait]
impl DefiProtocol for RocketPool {
    fn id(&self) -> &str {
        ROCKETPOOL_ID
    }

    fn name(&self) -> &str {
        ROCKETPOOL_NAME
    }

    fn site_url(&self) -> &str {
        ROCKETPOOL_SITE_URL
    }

    fn category(&self) -> Category {
        Category::Staked
    }

    fn is_withdrawal_supported(&self) -> bool {
        true
    }

    async fn position_info(&self, chain: &Chain, input_token: Address, output_token: Address) -> Result<VaultMetadata> {
        match Self::staked_token(chain, input_token) {
            Some(mapped) if mapped == output_token => {
                self.metadata(chain, input_token, output_token, UNSTAKE_URL).await
            }
            _ => Err(unsupported_pair(input_token, output_token)),
        }
    }

    async fn vaults_info(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>> {
        let Some(output_token) = Self::staked_token(chain, input_token) else {
            return Ok(vec![]);
        };
        Ok(vec![self.metadata(chain, input_token, output_token, STAKE_URL).await?])
    }

    /// ETH returned for burning `amount` rETH at the current exchange rate
    async fn withdrawal_amount(&self, chain: &Chain, _input_token: &Token, _output_token: &Token, amount: U256) -> Result<U256> {
        read(
            self.ctx.reader(),
            chain,
            RETH,
            IRocketTokenRETH::getEthValueCall { rethAmount: amount },
        )
        .await
    }

    async fn withdraw(
        &self,
        _chain: &Chain,
        _user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<WithdrawTxs> {
        let display_amount = output_token.display_amount(amount);
        Ok(WithdrawTxs::Txs(vec![TxInfo {
            description: generate_description(&Action::Withdraw {
                protocol_name: ROCKETPOOL_NAME,
                display_amount: &display_amount,
                input_symbol: &input_token.symbol,
                output_symbol: &output_token.symbol,
            }),
            display_amount,
            to: RETH,
            value: U256::ZERO,
            data: IRocketTokenRETH::burnCall { rethAmount: amount }.abi_encode().into(),
            function: Some(IRocketTokenRETH::burnCall::SIGNATURE.to_string()),
        }]))
    }

    async fn deposit(
        &self,
        _chain: &Chain,
        _user: Address,
        input_token: &Token,
        _output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>> {
        let display_amount = input_token.display_amount(amount);
        Ok(vec![TxInfo {
            description: generate_description(&Action::Deposit {
                protocol_name: ROCKETPOOL_NAME,
                display_amount: Some(&display_amount),
                input_symbol: &input_token.symbol,
            }),
            display_amount,
            to: ROCKET_DEPOSIT_POOL,
            value: amount,
            data: IRocketDepositPool::depositCall {}.abi_encode().into(),
            function: Some(IRocketDepositPool::depositCall::SIGNATURE.to_string()),
        }])
    }
}
