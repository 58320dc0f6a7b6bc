//! ether.fi restaking (ETH / stETH -> eETH). Deposit only.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::chain::{Chain, MAINNET};
use crate::error::{OptimizerError, Result};
use crate::http::json_f64;
use crate::optimizer::erc20::approve_erc20_tx;
use crate::optimizer::types::{Action, Category, Reward, TxInfo, VaultMetadata, WithdrawTxs, LEARN_MORE_DESC};
use crate::optimizer::utils::{apr_to_apy, generate_description};
use crate::optimizer::{unsupported_pair, DefiProtocol, ProtocolContext};
use crate::tokens::{Token, NATIVE_TOKEN_ADDRESS, STETH};

pub const ETHERFI_ID: &str = "etherfi";
pub const ETHERFI_NAME: &str = "ether.fi";
pub const ETHERFI_SITE_URL: &str = "https://www.ether.fi/";
/// Served by the app's own backend: `{url}/apy` and `{url}/tvl`
pub const ETHERFI_API_URL: &str = "https://bento-batch-dev.netlify.app/case/api/etherfi";
const APP_URL: &str = "https://app.ether.fi/";
const DAYS_PER_YEAR: u32 = 365;
/// Reported APRs are net of the protocol's 10% cut
const NET_SHARE: f64 = 0.9;

pub const EETH: Address = address!("35fA164735182de50811E8e2E824cFb9B6118ac2");
pub const LIQUIDITY_POOL: Address = address!("308861A430be4cce5502d0A12724771Fc6DaF216");
pub const LIQUIFIER: Address = address!("9FFDF407cDe9a93c47611799DA23924Af3EF764F");

sol! {
    interface ILiquidityPool {
        function deposit() external payable returns (uint256);
    }

    interface ILiquifier {
        function depositWithERC20(address token, uint256 amount, address referral) external returns (uint256);
    }
}

pub struct EtherFi {
    ctx: ProtocolContext,
    api_url: String,
}

impl EtherFi {
    pub fn new(ctx: ProtocolContext, api_url: impl Into<String>) -> Self {
        Self {
            ctx,
            api_url: api_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn staked_token(chain: &Chain, input: Address) -> Option<Address> {
        if chain.id != MAINNET.id {
            return None;
        }
        (input == NATIVE_TOKEN_ADDRESS || input == STETH).then_some(EETH)
    }

    fn unsupported_withdrawal(&self) -> OptimizerError {
        OptimizerError::Unsupported {
            operation: "Withdrawal",
            protocol: ETHERFI_NAME.to_string(),
        }
    }

    fn rewards() -> Vec<Reward> {
        vec![
            Reward {
                name: "Loyalty Point".to_string(),
                desc: Some(LEARN_MORE_DESC.to_string()),
                logo_url: "https://app.ether.fi/images/liquid/loyalty-icon.svg".to_string(),
            },
            Reward {
                name: "LRT2 Point".to_string(),
                desc: Some(LEARN_MORE_DESC.to_string()),
                logo_url: "https://app.ether.fi/images/rewards/lrt2-icon.svg".to_string(),
            },
        ]
    }

    /// Display figure: falls back to 0 when the endpoint is down
    async fn fetch_figure(&self, path: &str, extract: fn(&Value) -> Option<f64>) -> f64 {
        let url = format!("{}/{}", self.api_url, path);
        match self.ctx.http.get_json(&url).await {
            Ok(body) => extract(&body).unwrap_or_else(|| {
                warn!("Unexpected ether.fi response from {}", url);
                0.0
            }),
            Err(e) => {
                warn!("ether.fi {} unavailable: {}", path, e);
                0.0
            }
        }
    }

    async fn apy(&self) -> f64 {
        self.fetch_figure("apy", |body| {
            // latest APR in basis points
            let bps = body.get("latest_aprs")?.as_array()?.last().and_then(json_f64)?;
            Some(apr_to_apy(bps / NET_SHARE / 100.0 / 100.0, DAYS_PER_YEAR))
        })
        .await
    }

    async fn tvl(&self) -> f64 {
        self.fetch_figure("tvl", |body| body.get("tvl").and_then(json_f64)).await
    }

    async fn metadata(&self, chain: &Chain, input: Address, output: Address) -> Result<VaultMetadata> {
        let tokens = &self.ctx.tokens;
        let (pair, apy, tvl) = futures::join!(
            async { futures::try_join!(tokens.token_info(chain, input), tokens.token_info(chain, output)) },
            self.apy(),
            self.tvl(),
        );
        let (input_token, output_token) = pair?;

        Ok(VaultMetadata {
            protocol: self.descriptor(),
            name: Some(input_token.symbol.clone()),
            category: self.category(),
            site_url: APP_URL.to_string(),
            input_token,
            output_token,
            tvl,
            apy,
            rewards: Self::rewards(),
        })
    }
}

#[async_trait]
impl DefiProtocol for EtherFi {
    fn id(&self) -> &str {
        ETHERFI_ID
    }

    fn name(&self) -> &str {
        ETHERFI_NAME
    }

    fn site_url(&self) -> &str {
        ETHERFI_SITE_URL
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

    /// ETH goes straight to the liquidity pool; stETH is approved to and
    /// swapped in by the liquifier
    async fn deposit(
        &self,
        chain: &Chain,
        _user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>> {
        if Self::staked_token(chain, input_token.address) != Some(output_token.address) {
            return Err(unsupported_pair(input_token.address, output_token.address));
        }

        let display_amount = input_token.display_amount(amount);
        let description = generate_description(&Action::Deposit {
            protocol_name: ETHERFI_NAME,
            display_amount: Some(&display_amount),
            input_symbol: &input_token.symbol,
        });

        if input_token.address == NATIVE_TOKEN_ADDRESS {
            return Ok(vec![TxInfo {
                description,
                display_amount,
                to: LIQUIDITY_POOL,
                value: amount,
                data: ILiquidityPool::depositCall {}.abi_encode().into(),
                function: Some(ILiquidityPool::depositCall::SIGNATURE.to_string()),
            }]);
        }

        let approve = approve_erc20_tx(input_token, LIQUIFIER, ETHERFI_NAME, amount);
        let deposit = TxInfo {
            description,
            display_amount,
            to: LIQUIFIER,
            value: U256::ZERO,
            data: ILiquifier::depositWithERC20Call {
                token: input_token.address,
                amount,
                referral: Address::ZERO,
            }
            .abi_encode()
            .into(),
            function: Some(ILiquifier::depositWithERC20Call::SIGNATURE.to_string()),
        };
        Ok(vec![approve, deposit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockChainReader, MockJsonClient};
    use crate::tokens::{TokenService, USDC};
    use serde_json::json;
    use std::sync::Arc;

    const USER: Address = address!("1111111111111111111111111111111111111111");

    fn etherfi(with_api: bool) -> (EtherFi, Arc<MockChainReader>) {
        let reader = Arc::new(MockChainReader::new());
        reader.mock_token(EETH, "ether.fi ETH", "eETH", 18);
        reader.mock_token(STETH, "Liquid staked Ether 2.0", "stETH", 18);

        let http = Arc::new(MockJsonClient::new());
        if with_api {
            http.respond(
                &format!("{ETHERFI_API_URL}/apy"),
                json!({ "latest_aprs": ["310", "324"] }),
            );
            http.respond(&format!("{ETHERFI_API_URL}/tvl"), json!({ "tvl": 6_500_000_000.0 }));
        }

        let tokens = Arc::new(TokenService::with_defaults(reader.clone()));
        let ctx = ProtocolContext::new(reader.clone(), http, tokens);
        (EtherFi::new(ctx, ETHERFI_API_URL), reader)
    }

    fn token(address: Address, symbol: &str) -> Token {
        Token {
            name: symbol.to_string(),
            symbol: symbol.to_string(),
            decimals: 18,
            address,
            logo_url: None,
        }
    }

    fn one_ether() -> U256 {
        U256::from(1_000_000_000_000_000_000u64)
    }

    #[tokio::test]
    async fn test_vaults_info_grosses_up_latest_apr() {
        let (etherfi, _) = etherfi(true);
        let vaults = etherfi.vaults_info(&MAINNET, STETH).await.unwrap();

        assert_eq!(vaults.len(), 1);
        let vault = &vaults[0];
        assert_eq!(vault.output_token.symbol, "eETH");
        assert_eq!(vault.site_url, APP_URL);
        assert_eq!(vault.tvl, 6_500_000_000.0);
        // 324 bps / 0.9 = 3.6% APR compounded daily
        assert!((vault.apy - 0.036654).abs() < 1e-5, "{}", vault.apy);
        let names: Vec<_> = vault.rewards.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Loyalty Point", "LRT2 Point"]);

        assert!(etherfi.vaults_info(&MAINNET, USDC).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_api_shows_zeros() {
        let (etherfi, _) = etherfi(false);
        let position = etherfi.position_info(&MAINNET, NATIVE_TOKEN_ADDRESS, EETH).await.unwrap();
        assert_eq!(position.apy, 0.0);
        assert_eq!(position.tvl, 0.0);
    }

    #[tokio::test]
    async fn test_deposit_eth_to_liquidity_pool() {
        let (etherfi, _) = etherfi(false);
        let txs = etherfi
            .deposit(&MAINNET, USER, &Token::native(&MAINNET), &token(EETH, "eETH"), one_ether())
            .await
            .unwrap();

        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].to, LIQUIDITY_POOL);
        assert_eq!(txs[0].value, one_ether());
        assert_eq!(txs[0].description, "Deposit 1 ETH to ether.fi");
    }

    #[tokio::test]
    async fn test_deposit_steth_through_liquifier() {
        let (etherfi, _) = etherfi(false);
        let txs = etherfi
            .deposit(&MAINNET, USER, &token(STETH, "stETH"), &token(EETH, "eETH"), one_ether())
            .await
            .unwrap();

        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].to, STETH);
        assert_eq!(txs[0].description, "Approve ether.fi to spend 1 stETH");
        assert_eq!(txs[1].to, LIQUIFIER);
        assert_eq!(txs[1].value, U256::ZERO);
        let call = ILiquifier::depositWithERC20Call::abi_decode(&txs[1].data).unwrap();
        assert_eq!(call.token, STETH);
        assert_eq!(call.amount, one_ether());
        assert_eq!(call.referral, Address::ZERO);
    }

    #[tokio::test]
    async fn test_deposit_rejects_other_tokens() {
        let (etherfi, _) = etherfi(false);
        let err = etherfi
            .deposit(&MAINNET, USER, &token(USDC, "USDC"), &token(EETH, "eETH"), one_ether())
            .await
            .unwrap_err();
        assert!(matches!(err, OptimizerError::UnsupportedPair { .. }));
    }

    #[tokio::test]
    async fn test_withdraw_unsupported_before_any_io() {
        let (etherfi, reader) = etherfi(true);
        let err = etherfi
            .withdraw(&MAINNET, USER, &Token::native(&MAINNET), &token(EETH, "eETH"), one_ether())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Withdrawal not supported for ether.fi");
        assert_eq!(reader.call_count(), 0);
        assert!(!etherfi.is_withdrawal_supported());
    }
}
