//! Morpho (MetaMorpho ERC-4626 vaults through the Ethereum bundler)

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use super::morpho_bundler::{
    erc20_transfer_calldata, erc20_transfer_from_calldata, erc4626_deposit_calldata, erc4626_redeem_calldata,
    multicall_calldata, read_vault_totals, repay_quote, wrap_native_calldata, MarketParams, ETHEREUM_BUNDLER_V2,
    MULTICALL_SIGNATURE,
};
use crate::chain::Chain;
use crate::error::{OptimizerError, Result};
use crate::math::Rounding;
use crate::optimizer::erc20::{approve_erc20_tx, approve_erc20_tx_if_needed};
use crate::optimizer::types::{Action, Category, Reward, TxInfo, VaultMetadata, WithdrawTxs, LEARN_MORE_DESC};
use crate::optimizer::utils::generate_description;
use crate::optimizer::{DefiProtocol, ProtocolContext};
use crate::tokens::{Token, NATIVE_TOKEN_ADDRESS};

pub const MORPHO_ID: &str = "morphoblue";
pub const MORPHO_NAME: &str = "Morpho";
pub const MORPHO_SITE_URL: &str = "https://app.morpho.org";
pub const MORPHO_API_URL: &str = "https://blue-api.morpho.org/graphql";
const MORPHO_LOGO_URL: &str = "https://cdn.morpho.org/assets/logos/morpho.svg";

const VAULTS_QUERY: &str = r#"query Vaults($where: VaultFilters, $orderBy: VaultOrderBy){
    vaults(where: $where, orderBy: $orderBy) {
      items {
        name
        address
        asset {
          name
          symbol
          decimals
          address
          logoURI
        }
        state {
          netApy
          totalAssetsUsd
        }
      }
    }
  }"#;

// ============================================
// API RESPONSE
// ============================================

#[derive(Debug, Deserialize)]
struct VaultsResponse {
    data: Option<VaultsData>,
    #[serde(default)]
    errors: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct VaultsData {
    vaults: VaultsPage,
}

#[derive(Debug, Deserialize)]
struct VaultsPage {
    items: Vec<ApiVault>,
}

#[derive(Debug, Deserialize)]
struct ApiVault {
    name: String,
    address: Address,
    asset: ApiAsset,
    state: Option<ApiVaultState>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    name: String,
    symbol: String,
    decimals: u8,
    address: Address,
    #[serde(rename = "logoURI")]
    logo_uri: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiVaultState {
    net_apy: Option<f64>,
    total_assets_usd: Option<f64>,
}

impl From<ApiAsset> for Token {
    fn from(asset: ApiAsset) -> Self {
        Token {
            name: asset.name,
            symbol: asset.symbol,
            decimals: asset.decimals,
            address: asset.address,
            logo_url: asset.logo_uri,
        }
    }
}

// ============================================
// ADAPTER
// ============================================

pub struct Morpho {
    ctx: ProtocolContext,
    api_url: String,
}

impl Morpho {
    pub fn new(ctx: ProtocolContext, api_url: impl Into<String>) -> Self {
        Self {
            ctx,
            api_url: api_url.into(),
        }
    }

    /// Vaults are listed against their ERC-20 asset, so native ETH queries the wrapper
    fn asset_for(chain: &Chain, token: Address) -> Address {
        if token == NATIVE_TOKEN_ADDRESS {
            chain.wrapped_native
        } else {
            token
        }
    }

    async fn fetch_vaults(&self, chain: &Chain, asset: Address, vault: Option<Address>) -> Result<Vec<ApiVault>> {
        let mut filter = json!({
            "chainId_in": [chain.id],
            "assetAddress_in": [asset],
            "whitelisted": true,
        });
        if let Some(vault) = vault {
            filter["address_in"] = json!([vault]);
        }
        let body = json!({
            "query": VAULTS_QUERY,
            "variables": { "where": filter, "orderBy": "TotalAssetsUsd" },
        });

        let response = self
            .ctx
            .http
            .post_json(&self.api_url, &body)
            .await
            .map_err(|e| OptimizerError::Http(format!("Failed to fetch market info: {e}")))?;

        let response: VaultsResponse = serde_json::from_value(response)
            .map_err(|e| OptimizerError::Decode(format!("Morpho vaults response: {e}")))?;

        match response.data {
            Some(data) => Ok(data.vaults.items),
            None => Err(OptimizerError::Http(format!(
                "Failed to fetch market info: {}",
                Value::Array(response.errors)
            ))),
        }
    }

    async fn vault_metadata(&self, chain: &Chain, input_token: Address, vault: ApiVault) -> Result<VaultMetadata> {
        let output_token = self.ctx.tokens.token_info(chain, vault.address).await.map_err(|_| {
            OptimizerError::InvalidInput(format!("Output token not found for vault {}", vault.address))
        })?;

        let input_token = if input_token == NATIVE_TOKEN_ADDRESS {
            Token::native(chain)
        } else {
            vault.asset.into()
        };
        let state = vault.state.unwrap_or_default();

        Ok(VaultMetadata {
            protocol: self.descriptor(),
            name: Some(vault.name),
            category: self.category(),
            site_url: format!("{MORPHO_SITE_URL}/vault?vault={}", output_token.address),
            input_token,
            output_token,
            tvl: state.total_assets_usd.unwrap_or_default(),
            apy: state.net_apy.unwrap_or_default(),
            rewards: vec![Reward {
                name: MORPHO_NAME.to_string(),
                desc: Some(LEARN_MORE_DESC.to_string()),
                logo_url: MORPHO_LOGO_URL.to_string(),
            }],
        })
    }

    fn multicall_tx(&self, calls: Vec<Bytes>, value: U256, description: String, display_amount: String) -> TxInfo {
        TxInfo {
            to: ETHEREUM_BUNDLER_V2,
            value,
            data: multicall_calldata(calls),
            description,
            display_amount,
            function: Some(MULTICALL_SIGNATURE.to_string()),
        }
    }

    /// Repay a Morpho Blue loan on behalf of `user` through the bundler.
    ///
    /// Takes exactly one of `assets` / `shares`. Repaying by shares pulls the
    /// quoted upper bound and sends the unused loan tokens back to `user`.
    pub async fn repay(
        &self,
        chain: &Chain,
        user: Address,
        loan_token: &Token,
        params: MarketParams,
        assets: U256,
        shares: U256,
    ) -> Result<Vec<TxInfo>> {
        if params.loanToken != loan_token.address {
            return Err(OptimizerError::InvalidInput(format!(
                "{} is not the loan token of this market",
                loan_token.symbol
            )));
        }

        let reader = self.ctx.reader();
        let quote = repay_quote(reader, chain, params, assets, shares, user).await?;
        let approve = approve_erc20_tx_if_needed(
            reader,
            chain,
            user,
            loan_token,
            ETHEREUM_BUNDLER_V2,
            MORPHO_NAME,
            quote.max_assets,
        )
        .await?;

        let mut calls = vec![
            erc20_transfer_from_calldata(loan_token.address, quote.max_assets),
            quote.calldata,
        ];
        if assets.is_zero() {
            // bundler transfers min(amount, balance)
            calls.push(erc20_transfer_calldata(loan_token.address, user, quote.max_assets));
        }

        let display_amount = loan_token.display_amount(quote.max_assets);
        let description = generate_description(&Action::Repay {
            protocol_name: MORPHO_NAME,
            display_amount: &display_amount,
            token_symbol: &loan_token.symbol,
        });

        let mut txs: Vec<TxInfo> = approve.into_iter().collect();
        txs.push(self.multicall_tx(calls, U256::ZERO, description, display_amount));
        info!("Morpho repay of up to {} {}: {} tx(s)", quote.max_assets, loan_token.symbol, txs.len());
        Ok(txs)
    }
}

#[async_trait]
impl DefiProtocol for Morpho {
    fn id(&self) -> &str {
        MORPHO_ID
    }

    fn name(&self) -> &str {
        MORPHO_NAME
    }

    fn site_url(&self) -> &str {
        MORPHO_SITE_URL
    }

    fn category(&self) -> Category {
        Category::Lending
    }

    fn is_withdrawal_supported(&self) -> bool {
        true
    }

    async fn position_info(&self, chain: &Chain, input_token: Address, output_token: Address) -> Result<VaultMetadata> {
        let asset = Self::asset_for(chain, input_token);
        let vault = self
            .fetch_vaults(chain, asset, Some(output_token))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OptimizerError::InvalidInput("Vault not found".to_string()))?;
        self.vault_metadata(chain, input_token, vault).await
    }

    async fn vaults_info(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>> {
        let asset = Self::asset_for(chain, input_token);
        let vaults = self.fetch_vaults(chain, asset, None).await?;
        debug!("Morpho API returned {} vaults for {:?}", vaults.len(), asset);

        try_join_all(
            vaults
                .into_iter()
                .map(|vault| self.vault_metadata(chain, input_token, vault)),
        )
        .await
    }

    /// Assets redeemed for `amount` vault shares at current totals
    async fn withdrawal_amount(&self, chain: &Chain, _input_token: &Token, output_token: &Token, amount: U256) -> Result<U256> {
        let totals = read_vault_totals(self.ctx.reader(), chain, output_token.address).await?;
        Ok(totals.convert_to_assets(amount, Rounding::Floor)?)
    }

    /// Redeem `amount` vault shares back to the underlying asset
    async fn withdraw(
        &self,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<WithdrawTxs> {
        let reader = self.ctx.reader();
        let approve = approve_erc20_tx_if_needed(
            reader,
            chain,
            user,
            output_token,
            ETHEREUM_BUNDLER_V2,
            MORPHO_NAME,
            amount,
        )
        .await?;
        let redeem = erc4626_redeem_calldata(reader, chain, output_token.address, amount, user, user).await?;

        let display_amount = output_token.display_amount(amount);
        let description = generate_description(&Action::Withdraw {
            protocol_name: MORPHO_NAME,
            display_amount: &display_amount,
            input_symbol: &input_token.symbol,
            output_symbol: &output_token.symbol,
        });

        let mut txs: Vec<TxInfo> = approve.into_iter().collect();
        txs.push(self.multicall_tx(vec![redeem], U256::ZERO, description, display_amount));
        info!("Morpho withdraw from {:?}: {} tx(s)", output_token.address, txs.len());
        Ok(WithdrawTxs::Txs(txs))
    }

    async fn deposit(
        &self,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>> {
        let reader = self.ctx.reader();
        let deposit = erc4626_deposit_calldata(reader, chain, output_token.address, amount, user).await?;

        let display_amount = input_token.display_amount(amount);
        let description = generate_description(&Action::Deposit {
            protocol_name: MORPHO_NAME,
            display_amount: Some(&display_amount),
            input_symbol: &input_token.symbol,
        });

        if input_token.is_native() {
            let wrap = wrap_native_calldata(amount);
            return Ok(vec![self.multicall_tx(vec![wrap, deposit], amount, description, display_amount)]);
        }

        let approve = approve_erc20_tx(input_token, ETHEREUM_BUNDLER_V2, MORPHO_NAME, amount);
        let transfer = erc20_transfer_from_calldata(input_token.address, amount);
        Ok(vec![
            approve,
            self.multicall_tx(vec![transfer, deposit], U256::ZERO, description, display_amount),
        ])
    }
}
