//! Ethena staking (USDe -> sUSDe). Deposit only: sUSDe unstaking goes
//! through a cooldown, so there is no single withdrawal transaction to build.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;

use crate::chain::{read, Chain, MAINNET};
use crate::error::{OptimizerError, Result};
use crate::http::json_f64;
use crate::optimizer::erc20::approve_erc20_tx;
use crate::optimizer::types::{Action, Category, TxInfo, VaultMetadata, WithdrawTxs};
use crate::optimizer::utils::generate_description;
use crate::optimizer::{unsupported_pair, DefiProtocol, ProtocolContext};
use crate::tokens::{units_to_f64, Token, IERC20};

pub const ETHENA_ID: &str = "ethena";
pub const ETHENA_NAME: &str = "Ethena";
pub const ETHENA_SITE_URL: &str = "https://www.ethena.fi";
pub const ETHENA_API_URL: &str = "https://app.ethena.fi/api/yields/protocol-and-staking-yield";
const EARN_URL: &str = "https://app.ethena.fi/earn";

pub const USDE: Address = address!("4c9EDD5852cd905f086C759E8383e09bff1E68B3");
pub const SUSDE: Address = address!("9D39A5DE30e57443BfF2A8307A4256c8797A3497");

sol! {
    interface IStakedUSDe {
        function deposit(uint256 assets, address receiver) external returns (uint256 shares);
    }
}

pub struct Ethena {
    ctx: ProtocolContext,
    api_url: String,
}

impl Ethena {
    pub fn new(ctx: ProtocolContext, api_url: impl Into<String>) -> Self {
        Self {
            ctx,
            api_url: api_url.into(),
        }
    }

    fn staked_token(chain: &Chain, input: Address) -> Option<Address> {
        (chain.id == MAINNET.id && input == USDE).then_some(SUSDE)
    }

    fn unsupported_withdrawal(&self) -> OptimizerError {
        OptimizerError::Unsupported {
            operation: "Withdrawal",
            protocol: ETHENA_NAME.to_string(),
        }
    }

    /// Staking yield is quoted in percent
    async fn apy(&self) -> Result<f64> {
        let body = self.ctx.http.get_json(&self.api_url).await?;
        let value = body
            .get("stakingYield")
            .and_then(|v| v.get("value"))
            .and_then(json_f64)
            .ok_or_else(|| OptimizerError::Decode(format!("unexpected response from {}", self.api_url)))?;
        Ok(value / 100.0)
    }

    /// USDe in circulation, taken at $1
    async fn tvl(&self, chain: &Chain) -> Result<f64> {
        let reader = self.ctx.reader();
        let (decimals, supply) = futures::try_join!(
            read(reader, chain, USDE, IERC20::decimalsCall {}),
            read(reader, chain, USDE, IERC20::totalSupplyCall {}),
        )?;
        Ok(units_to_f64(supply, decimals))
    }

    async fn metadata(&self, chain: &Chain, input: Address, output: Address) -> Result<VaultMetadata> {
        let tokens = &self.ctx.tokens;
        let (input_token, output_token, tvl, apy) = futures::try_join!(
            tokens.token_info(chain, input),
            tokens.token_info(chain, output),
            self.tvl(chain),
            self.apy(),
        )?;

        Ok(VaultMetadata {
            protocol: self.descriptor(),
            name: Some(input_token.symbol.clone()),
            category: self.category(),
            site_url: EARN_URL.to_string(),
            input_token,
            output_token,
            tvl,
            apy,
            rewards: vec![],
        })
    }
}

#[async_trait]
impl DefiProtocol for Ethena {
    fn id(&self) -> &str {
        ETHENA_ID
    }

    fn name(&self) -> &str {
        ETHENA_NAME
    }

    fn site_url(&self) -> &str {
        ETHENA_SITE_URL
    }

    fn category(&self) -> Category {
        Category::Staked
    }

    fn is_withdrawal_supported(&self) -> bool {
        false
    }

    async fn position_info(&self, chain: &Chain, input_token: Address, output_token: Address) -> Result<VaultMetadata> {
        match Self::staked_token(chain, input_token) {
            Some(mapped) if mapped == output_token => self.metadata(chain, input_token, output_token).await,
            _ => Err(unsupported_pair(input_token, output_token)),
        }
    }

    async fn vaults_info(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>> {
        let Some(output_token) = Self::staked_token(chain, input_token) else {
            return Ok(vec![]);
        };
        Ok(vec![self.metadata(chain, input_token, output_token).await?])
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

    /// ERC-4626 `deposit` into sUSDe after approving it to pull USDe
    async fn deposit(
        &self,
        _chain: &Chain,
        user: Address,
        input_token: &Token,
        _output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>> {
        let display_amount = input_token.display_amount(amount);
        let approve = approve_erc20_tx(input_token, SUSDE, ETHENA_NAME, amount);
        let deposit = TxInfo {
            description: generate_description(&Action::Deposit {
                protocol_name: ETHENA_NAME,
                display_amount: Some(&display_amount),
                input_symbol: &input_token.symbol,
            }),
            display_amount,
            to: SUSDE,
            value: U256::ZERO,
            data: IStakedUSDe::depositCall {
                assets: amount,
                receiver: user,
            }
            .abi_encode()
            .into(),
            function: Some(IStakedUSDe::depositCall::SIGNATURE.to_string()),
        };
        Ok(vec![approve, deposit])
    }
}
