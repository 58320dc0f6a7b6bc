//! Aave V3 lending pool adapter
//!
//! Parameterised by an [`AaveMarket`] so forks sharing the V3 pool, gateway and
//! data provider interfaces (Spark) reuse the same adapter.

use alloy_primitives::{address, Address, U256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::debug;

use crate::chain::{read, Chain, MAINNET};
use crate::error::{OptimizerError, Result};
use crate::optimizer::erc20::approve_erc20_tx;
use crate::optimizer::types::{Action, Category, TxInfo, VaultMetadata, WithdrawTxs};
use crate::optimizer::utils::{apr_to_apy, generate_description};
use crate::optimizer::{unsupported_pair, DefiProtocol, ProtocolContext};
use crate::tokens::{units_to_f64, Token, NATIVE_TOKEN_ADDRESS};

pub const AAVE_ID: &str = "aave3";
pub const AAVE_NAME: &str = "Aave V3";
pub const AAVE_SITE_URL: &str = "https://app.aave.com";

/// Aave rates are rays (27 decimals)
const RAY_DECIMALS: u8 = 27;
const ORACLE_PRICE_DECIMALS: u8 = 8;
const SECONDS_PER_YEAR: u32 = 31_536_000;

sol! {
    interface IAavePool {
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
    }

    interface IWrappedTokenGateway {
        function depositETH(address pool, address onBehalfOf, uint16 referralCode) external payable;
        function withdrawETH(address pool, uint256 amount, address to) external;
    }

    interface IProtocolDataProvider {
        function getReserveData(address asset) external view returns (
            uint256 unbacked,
            uint256 accruedToTreasuryScaled,
            uint256 totalAToken,
            uint256 totalStableDebt,
            uint256 totalVariableDebt,
            uint256 liquidityRate,
            uint256 variableBorrowRate,
            uint256 stableBorrowRate,
            uint256 averageStableBorrowRate,
            uint256 liquidityIndex,
            uint256 variableBorrowIndex,
            uint40 lastUpdateTimestamp
        );
        function getATokenTotalSupply(address asset) external view returns (uint256);
    }

    interface IAaveOracle {
        function getAssetPrice(address asset) external view returns (uint256);
    }
}

/// Deployment addresses of one pool
#[derive(Debug, Clone, Copy)]
pub struct AaveContracts {
    pub pool: Address,
    pub wrapped_token_gateway: Address,
    pub protocol_data_provider: Address,
    pub oracle: Address,
    pub weth: Address,
}

pub const AAVE_MAINNET: AaveContracts = AaveContracts {
    pool: address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2"),
    wrapped_token_gateway: address!("A434D495249abE33E031Fe71a969B81f3c07950D"),
    protocol_data_provider: address!("41393e5e337606dc3821075Af65AeE84D7688CBD"),
    oracle: address!("54586bE62E3c3580375aE3723C145253060Ca0C2"),
    weth: address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"),
};

/// Underlying -> aToken on mainnet
pub const AAVE_MAINNET_ATOKENS: &[(Address, Address)] = &[
    // ETH -> aEthWETH
    (NATIVE_TOKEN_ADDRESS, address!("4d5F47FA6A74757f35C14fD3a6Ef8E3C9BC514E8")),
    // WETH -> aEthWETH
    (address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"), address!("4d5F47FA6A74757f35C14fD3a6Ef8E3C9BC514E8")),
    // wstETH -> aEthwstETH
    (address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"), address!("0B925eD163218f6662a35e0f0371Ac234f9E9371")),
    // weETH -> aEthweETH
    (address!("Cd5fE23C85820F7B72D0926FC9b05b43E359b7ee"), address!("BdfA7b7893081B35Fb54027489e2Bc7A38275129")),
    // rETH -> aEthrETH
    (address!("ae78736Cd615f374D3085123A210448E74Fc6393"), address!("CC9EE9483f662091a1de4795249E24aC0aC2630f")),
    // cbETH -> aEthcbETH
    (address!("Be9895146f7AF43049ca1c1AE358B0541Ea49704"), address!("977b6fc5dE62598B08C85AC8Cf2b745874E8b78c")),
    // osETH -> aEthosETH
    (address!("f1C9acDc66974dFB6dEcB12aA385b9cD01190E38"), address!("927709711794F3De5DdBF1D176bEE2D55Ba13c21")),
    // USDT -> aEthUSDT
    (address!("dAC17F958D2ee523a2206206994597C13D831ec7"), address!("23878914EFE38d27C4D67Ab83ed1b93A74D4086a")),
    // USDC -> aEthUSDC
    (address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), address!("98C23E9d8f34FEFb1B7BD6a91B7FF122F4e16F5c")),
    // USDe -> aEthUSDe
    (address!("4c9EDD5852cd905f086C759E8383e09bff1E68B3"), address!("4F5923Fc5FD4a93352581b38B7cD26943012DECF")),
    // DAI -> aEthDAI
    (address!("6B175474E89094C44Da98b954EedeAC495271d0F"), address!("018008bfb33d285247A21d44E50697654f754e63")),
    // sDAI -> aEthsDAI
    (address!("83F20F44975D03b1b09e64809B757c47f942BEeA"), address!("4C612E3B15b96Ff9A6faED838F8d07d479a8dD4c")),
    // PYUSD -> aEthPYUSD
    (address!("6c3ea9036406852006290770BEdFcAbA0e23A0e8"), address!("0C0d01AbF3e6aDfcA0989eBbA9d6e85dD58EaB1E")),
    // LUSD -> aEthLUSD
    (address!("5f98805A4E8be255a32880FDeC7F6728C6568bA0"), address!("3Fe6a295459FAe07DF8A0ceCC36F37160FE86AA9")),
    // crvUSD -> aEthcrvUSD
    (address!("f939E0A03FB07F59A73314E73794Be0E57ac1b4E"), address!("b82fa9f31612989525992FCfBB09AB22Eff5c85A")),
    // USDS -> aEthUSDS
    (address!("dC035D45d973E3EC169d2276DDab16f1e407384F"), address!("32a6268f9Ba3642Dda7892aDd74f1D34469A4259")),
];

/// An Aave V3 deployment: identity, contracts and its underlying -> aToken table
#[derive(Debug, Clone, Copy)]
pub struct AaveMarket {
    pub id: &'static str,
    pub name: &'static str,
    pub site_url: &'static str,
    pub chain_id: u64,
    pub contracts: AaveContracts,
    pub a_tokens: &'static [(Address, Address)],
}

pub const AAVE_V3_MAINNET: AaveMarket = AaveMarket {
    id: AAVE_ID,
    name: AAVE_NAME,
    site_url: AAVE_SITE_URL,
    chain_id: MAINNET.id,
    contracts: AAVE_MAINNET,
    a_tokens: AAVE_MAINNET_ATOKENS,
};

pub struct Aave {
    ctx: ProtocolContext,
    market: AaveMarket,
    token_mapping: HashMap<Address, Address>,
}

impl Aave {
    pub fn new(ctx: ProtocolContext) -> Self {
        Self::with_market(ctx, AAVE_V3_MAINNET)
    }

    pub fn with_market(ctx: ProtocolContext, market: AaveMarket) -> Self {
        let token_mapping = market.a_tokens.iter().copied().collect();
        Self {
            ctx,
            market,
            token_mapping,
        }
    }

    fn contracts(&self, chain: &Chain) -> Result<&AaveContracts> {
        if chain.id != self.market.chain_id {
            return Err(OptimizerError::InvalidInput(format!(
                "{} is not deployed on {}",
                self.market.name, chain.name
            )));
        }
        Ok(&self.market.contracts)
    }

    fn a_token(&self, chain: &Chain, underlying: Address) -> Option<Address> {
        if chain.id != self.market.chain_id {
            return None;
        }
        self.token_mapping.get(&underlying).copied()
    }

    /// Reserve key: native ETH is listed as WETH
    fn reserve_asset(contracts: &AaveContracts, token: &Token) -> Address {
        if token.is_native() {
            contracts.weth
        } else {
            token.address
        }
    }

    async fn apy(&self, chain: &Chain, contracts: &AaveContracts, token: &Token) -> Result<f64> {
        let asset = Self::reserve_asset(contracts, token);
        let reserve = read(
            self.ctx.reader(),
            chain,
            contracts.protocol_data_provider,
            IProtocolDataProvider::getReserveDataCall { asset },
        )
        .await?;
        let apr = units_to_f64(reserve.liquidityRate, RAY_DECIMALS);
        Ok(apr_to_apy(apr, SECONDS_PER_YEAR))
    }

    /// USD value of all supplied underlying
    async fn tvl(&self, chain: &Chain, contracts: &AaveContracts, token: &Token) -> Result<f64> {
        let asset = Self::reserve_asset(contracts, token);
        let reader = self.ctx.reader();
        let (supply, price) = futures::try_join!(
            read(
                reader,
                chain,
                contracts.protocol_data_provider,
                IProtocolDataProvider::getATokenTotalSupplyCall { asset },
            ),
            read(reader, chain, contracts.oracle, IAaveOracle::getAssetPriceCall { asset }),
        )?;
        Ok(units_to_f64(supply, token.decimals) * units_to_f64(price, ORACLE_PRICE_DECIMALS))
    }

    async fn metadata(&self, chain: &Chain, input: Address, output: Address) -> Result<VaultMetadata> {
        let contracts = self.contracts(chain)?;
        let tokens = &self.ctx.tokens;
        let (input_token, output_token) =
            futures::try_join!(tokens.token_info(chain, input), tokens.token_info(chain, output))?;
        let (tvl, apy) = futures::try_join!(
            self.tvl(chain, contracts, &input_token),
            self.apy(chain, contracts, &input_token),
        )?;

        Ok(VaultMetadata {
            protocol: self.descriptor(),
            name: Some(input_token.symbol.clone()),
            category: self.category(),
            site_url: self.market.site_url.to_string(),
            input_token,
            output_token,
            tvl,
            apy,
            rewards: vec![],
        })
    }

    fn withdraw_description(&self, input_token: &Token, output_token: &Token, display_amount: &str) -> String {
        generate_description(&Action::Withdraw {
            protocol_name: self.market.name,
            display_amount,
            input_symbol: &input_token.symbol,
            output_symbol: &output_token.symbol,
        })
    }

    fn deposit_description(&self, input_token: &Token, display_amount: &str) -> String {
        generate_description(&Action::Deposit {
            protocol_name: self.market.name,
            display_amount: Some(display_amount),
            input_symbol: &input_token.symbol,
        })
    }
}

#[async_trait]
impl DefiProtocol for Aave {
    fn id(&self) -> &str {
        self.market.id
    }

    fn name(&self) -> &str {
        self.market.name
    }

    fn site_url(&self) -> &str {
        self.market.site_url
    }

    fn category(&self) -> Category {
        Category::Lending
    }

    fn is_withdrawal_supported(&self) -> bool {
        true
    }

    async fn position_info(&self, chain: &Chain, input_token: Address, output_token: Address) -> Result<VaultMetadata> {
        match self.a_token(chain, input_token) {
            Some(mapped) if mapped == output_token => self.metadata(chain, input_token, output_token).await,
            _ => Err(unsupported_pair(input_token, output_token)),
        }
    }

    async fn vaults_info(&self, chain: &Chain, input_token: Address) -> Result<Vec<VaultMetadata>> {
        let Some(output_token) = self.a_token(chain, input_token) else {
            return Ok(vec![]);
        };
        Ok(vec![self.metadata(chain, input_token, output_token).await?])
    }

    /// aTokens redeem 1:1
    async fn withdrawal_amount(&self, _chain: &Chain, _input_token: &Token, _output_token: &Token, amount: U256) -> Result<U256> {
        Ok(amount)
    }

    /// Withdraws the whole position (`type(uint256).max`)
    async fn withdraw(
        &self,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        output_token: &Token,
        amount: U256,
    ) -> Result<WithdrawTxs> {
        let contracts = self.contracts(chain)?;
        let display_amount = output_token.display_amount(amount);
        let description = self.withdraw_description(input_token, output_token, &display_amount);

        if input_token.is_native() {
            // the gateway pulls aWETH from the user before unwrapping
            let approve = approve_erc20_tx(output_token, contracts.wrapped_token_gateway, self.market.name, U256::MAX);
            let withdraw = TxInfo {
                to: contracts.wrapped_token_gateway,
                value: U256::ZERO,
                data: IWrappedTokenGateway::withdrawETHCall {
                    pool: contracts.pool,
                    amount: U256::MAX,
                    to: user,
                }
                .abi_encode()
                .into(),
                description,
                display_amount,
                function: Some(IWrappedTokenGateway::withdrawETHCall::SIGNATURE.to_string()),
            };
            return Ok(WithdrawTxs::Txs(vec![approve, withdraw]));
        }

        let withdraw = TxInfo {
            to: contracts.pool,
            value: U256::ZERO,
            data: IAavePool::withdrawCall {
                asset: input_token.address,
                amount: U256::MAX,
                to: user,
            }
            .abi_encode()
            .into(),
            description,
            display_amount,
            function: Some(IAavePool::withdrawCall::SIGNATURE.to_string()),
        };
        Ok(WithdrawTxs::Txs(vec![withdraw]))
    }

    async fn deposit(
        &self,
        chain: &Chain,
        user: Address,
        input_token: &Token,
        _output_token: &Token,
        amount: U256,
    ) -> Result<Vec<TxInfo>> {
        let contracts = self.contracts(chain)?;
        let display_amount = input_token.display_amount(amount);
        let description = self.deposit_description(input_token, &display_amount);

        if input_token.is_native() {
            debug!("{} native deposit via gateway {:?}", self.market.name, contracts.wrapped_token_gateway);
            return Ok(vec![TxInfo {
                to: contracts.wrapped_token_gateway,
                value: amount,
                data: IWrappedTokenGateway::depositETHCall {
                    pool: contracts.pool,
                    onBehalfOf: user,
                    referralCode: 0,
                }
                .abi_encode()
                .into(),
                description,
                display_amount,
                function: Some(IWrappedTokenGateway::depositETHCall::SIGNATURE.to_string()),
            }]);
        }

        let approve = approve_erc20_tx(input_token, contracts.pool, self.market.name, amount);
        let supply = TxInfo {
            to: contracts.pool,
            value: U256::ZERO,
            data: IAavePool::supplyCall {
                asset: input_token.address,
                amount,
                onBehalfOf: user,
                referralCode: 0,
            }
            .abi_encode()
            .into(),
            description,
            display_amount,
            function: Some(IAavePool::supplyCall::SIGNATURE.to_string()),
        };
        Ok(vec![approve, supply])
    }
}
