//! Spark lending: an Aave V3 fork on mainnet served by the Aave adapter

use alloy_primitives::{address, Address};

use super::aave::{Aave, AaveContracts, AaveMarket};
use crate::chain::MAINNET;
use crate::optimizer::ProtocolContext;
use crate::tokens::{NATIVE_TOKEN_ADDRESS, WETH};

pub const SPARK_ID: &str = "spark";
pub const SPARK_NAME: &str = "Spark";
pub const SPARK_SITE_URL: &str = "https://app.spark.fi/markets";

pub const SPARK_CONTRACTS: AaveContracts = AaveContracts {
    pool: address!("C13e21B648A5Ee794902342038FF3aDAB66BE987"),
    wrapped_token_gateway: address!("BD7D6a9ad7865463DE44B05F04559f65e3B11704"),
    protocol_data_provider: address!("Fc21d6d146E6086B8359705C8b28512a983db0cb"),
    oracle: address!("8105f69D9C41644c6A0803fDA7D03Aa70996cFD9"),
    weth: WETH,
};

/// Underlying -> spToken
const SPARK_SP_TOKENS: &[(Address, Address)] = &[
    // ETH -> spWETH
    (NATIVE_TOKEN_ADDRESS, address!("59cD1C87501baa753d0B5B5Ab5D8416A45cD71DB")),
    // WETH -> spWETH
    (WETH, address!("59cD1C87501baa753d0B5B5Ab5D8416A45cD71DB")),
    // DAI -> spDAI
    (address!("6B175474E89094C44Da98b954EedeAC495271d0F"), address!("4DEDf26112B3Ec8eC46e7E31EA5e123490B05B8B")),
    // sDAI -> spsDAI
    (address!("83F20F44975D03b1b09e64809B757c47f942BEeA"), address!("78f897F0fE2d3B5690EbAe7f19862DEacedF10a7")),
    // USDC -> spUSDC
    (address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), address!("377C3bd93f2a2984E1E7bE6A5C22c525eD4A4815")),
    // wstETH -> spwstETH
    (address!("7f39C581F595B53c5cb19bD0b3f8dA6c935E2Ca0"), address!("12B54025C112Aa61fAce2CDB7118740875A566E9")),
    // rETH -> sprETH
    (address!("ae78736Cd615f374D3085123A210448E74Fc6393"), address!("9985dF20D7e9103ECBCeb16a84956434B6f06ae8")),
    // USDT -> spUSDT
    (address!("dAC17F958D2ee523a2206206994597C13D831ec7"), address!("e7dF13b8e3d6740fe17CBE928C7334243d86c92f")),
];

pub const SPARK_MAINNET: AaveMarket = AaveMarket {
    id: SPARK_ID,
    name: SPARK_NAME,
    site_url: SPARK_SITE_URL,
    chain_id: MAINNET.id,
    contracts: SPARK_CONTRACTS,
    a_tokens: SPARK_SP_TOKENS,
};

impl Aave {
    pub fn spark(ctx: ProtocolContext) -> Self {
        Self::with_market(ctx, SPARK_MAINNET)
    }
}
