//! Lido liquid staking (ETH -> stETH). Deposit only.

use alloy_primitives::{Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde_json::Value;

use crate::chain::{Chain, MAINNET};
use crate::error::{OptimizerError, Result};
use crate::http::json_f64;
use crate::optimizer::types::{Action, Category, TxInfo, VaultMetadata, WithdrawTxs};
use crate::optimizer::utils::{apr_to_apy, generate_description};
use crate::optimizer::{unsupported_pair, DefiProtocol, ProtocolContext};
use crate::tokens::{Token, NATIVE_TOKEN_ADDRESS, STETH};

pub const LIDO_ID: &str = "lido";
pub const LIDO_NAME: &str = "LIDO";
pub const LIDO_SITE_URL: &str = "https://lido.fi/";
pub const LIDO_API_URL: &str = "https://eth-api.lido.fi";
const STAKE_URL: &str = "https://stake.lido.fi";
const WITHDRAWAL_REQUEST_URL: &str = "https://stake.lido.fi/withdrawals/request";
const DAYS_PER_YEAR: u32 = 365;

sol! {
    interface ILido {
        function submit(address referral) external payable returns (uint256);
    }
}

pub struct Lido {
    ctx: ProtocolContext,
    api_url: String,
    referral: Address,
}

impl Lido {
    pub fn new(ctx: ProtocolContext, api_url: impl Into<String>, referral: Address) -> Self {
        Self {
            ctx,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            referral,
        }
    }

    fn st_token(chain: &Chain, input: Address) -> Option<Address> {
        (chain.id == MAINNET.id && input == NATIVE_TOKEN_ADDRESS).then_some(STETH)
    }

    fn unsupported_withdrawal(&self) -> OptimizerError {
        OptimizerError::Unsupported {
            operation: "Withdrawal",
            protocol: LIDO_NAME.to_string(),
        }
    }

    async fn get_number(&self, path: &str, pick: impl Fn(&Value) -> Option<&Value>) -> Result<f64> {
        let url = format!("{}{}", self.api_url, path);
        let body = self.ctx.http.get_json(&url).await?;
        pick(&body)
            .and_then(json_f64)
            .ok_or_else(|| OptimizerError::Decode(format!("unexpected response from {url}")))
    }

    /// SMA APR is quoted in percent
    async fn apy(&self) -> Result<f64> {
        let apr = self
            .get_number("/v1/protocol/steth/apr/sma", |v| v.get("data")?.get("smaApr"))
            .await?;
        Ok(apr_to_apy(apr / 100.0, DAYS_PER_YEAR))
    }

    async fn tvl(&self) -> Result<f64> {
        self.get_number("/v1/protocol/steth/stats", |v| v.get("marketCap"))
            .await
    }

    async fn metadata(&self, chain: &Chain, input: Address, output: Address, site_url: &str) -> Result<VaultMetadata> {
        let tokens = &self.ctx.tokens;
        let (input_token, output_token, tvl, apy) = futures::try_join!(
            tokens.token_info(chain, input),
            tokens.token_info(chain, output),
            self.tvl(),
            self.apy(),
        )?;

        Ok(VaultMetadata {
            protocol: self.descriptor(),
            name: Some(input_token.symbol.clone()),
            category: self.category(),
            site_url: site_url.to_string(),
            input_token,
            output_token,
            tvl,
            apy,
            rewards: vec![],
        })
    }
}

#[async_trait]
impl DefiProtocol for Lido {
    fn id(&self) -> &str {
        LIDO_ID
    }

    fn name(&self) -> &str {
        LIDO_NAME
    }

    fn site_url(&self) -> &str {
        LIDO_SITE_URL
    }

    fn category(&self) -> Category {
        Category::Staked
    }

    fn is_withdrawal_supported(&self) -> bool {
        false
    }

    async fn position_info(&self, chain: &Chain, input_token: Address, output_token: Address) -> Result<VaultMetadata> {
        match Self::st_token(chain, input_token) {
            Some(mapped) if mapped == output_token => {
                self.metadata(chain, input_token, output_token, WITHDRAWAL_REQUEST_URL)
                    .await
            }
            _ => Err(unsupported_pair(input_token, output_token)),
        }
    }

    async fn vaults_info(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>> {
        let Some(output_token) = Self::st_token(chain, input_token) else {
            return Ok(vec![]);
        };
        Ok(vec![self.metadata(chain, input_token, output_token, STAKE_URL).await?])
    }

    async fn withdrawal_amount(&self, _chain: &Chain, _input_token: &Token, _output_token: &Token, _amount: U256) -> Result<U256> {
        Err(self.unsupported_withdrawal())
    }

    async fn withdraw(
        &self,
        _chain: &Chain,
        _user: Address,
        _input_token: &Token,
        _output_token: &Token,
        _amount: U256,
    ) -> Result<WithdrawTxs> {
        Err(self.unsupported_withdrawal())
    }

    /// `submit` mints stETH 1:1 for the attached ETH
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
                protocol_name: LIDO_NAME,
                display_amount: Some(&display_amount),
                input_symbol: &input_token.symbol,
            }),
            display_amount,
            to: STETH,
            value: amount,
            data: ILido::submitCall {
                referral: self.referral,
            }
            .abi_encode()
            .into(),
            function: Some(ILido::submitCall::SIGNATURE.to_string()),
        }])
    }
}
