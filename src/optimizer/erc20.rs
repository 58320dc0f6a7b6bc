//! ERC-20 approval and balance helpers shared by the adapters

use alloy_primitives::{Address, U256};
use alloy_sol_types::SolCall;
use tracing::debug;

use super::types::{Action, TxInfo};
use super::utils::generate_description;
use crate::chain::{read, Chain, ChainReader};
use crate::error::Result;
use crate::tokens::{Token, IERC20};

/// `approve(spender, amount)` on `token`
pub fn approve_erc20_tx(token: &Token, spender: Address, spender_name: &str, amount: U256) -> TxInfo {
    let display_amount = token.display_amount(amount);
    TxInfo {
        description: generate_description(&Action::Approve {
            spender_name: Some(spender_name),
            display_amount: &display_amount,
            token_symbol: &token.symbol,
        }),
        to: token.address,
        value: U256::ZERO,
        data: IERC20::approveCall { spender, amount }.abi_encode().into(),
        display_amount,
        function: Some(IERC20::approveCall::SIGNATURE.to_string()),
    }
}

/// An approval only when the current allowance is below `amount`
pub async fn approve_erc20_tx_if_needed(
    reader: &dyn ChainReader,
    chain: &Chain,
    owner: Address,
    token: &Token,
    spender: Address,
    spender_name: &str,
    amount: U256,
) -> Result<Option<TxInfo>> {
    let current = allowance(reader, chain, owner, token.address, spender).await?;
    if current >= amount {
        debug!("Allowance {} {} already covers {}", current, token.symbol, amount);
        return Ok(None);
    }
    Ok(Some(approve_erc20_tx(token, spender, spender_name, amount)))
}

pub async fn allowance(
    reader: &dyn ChainReader,
    chain: &Chain,
    owner: Address,
    token: Address,
    spender: Address,
) -> Result<U256> {
    read(reader, chain, token, IERC20::allowanceCall { owner, spender }).await
}

pub async fn balance_of(reader: &dyn ChainReader, chain: &Chain, account: Address, token: Address) -> Result<U256> {
    read(reader, chain, token, IERC20::balanceOfCall { account }).await
}
