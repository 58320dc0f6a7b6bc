//! Shared optimizer data types

use alloy_primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::tokens::Token;

pub const LEARN_MORE_DESC: &str = "Learn more";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Lending,
    Staked,
    Yield,
    Other,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Lending => "lending",
            Category::Staked => "staked",
            Category::Yield => "yield",
            Category::Other => "other",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: String,
    pub name: String,
    pub site_url: String,
    pub is_withdrawal_supported: bool,
}

/// Incentive shown next to a vault, e.g. a protocol points program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reward {
    pub name: String,
    pub desc: Option<String>,
    pub logo_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultMetadata {
    pub protocol: Protocol,
    /// Vault display name, e.g. "Gauntlet USDC Core"
    pub name: Option<String>,
    pub category: Category,
    pub site_url: String,
    pub input_token: Token,
    pub output_token: Token,
    /// USD
    pub tvl: f64,
    /// Fraction, 0.05 is 5%
    pub apy: f64,
    pub rewards: Vec<Reward>,
}

// ============================================
// TRANSACTIONS
// ============================================

/// A transaction ready for signing plus its pre-rendered summary.
///
/// `description` is produced by the same code path that encodes `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    pub description: String,
    pub display_amount: String,
    /// Signature of the encoded function, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
}

/// Builds the final transaction once the user has signed the typed data
pub type PermitTxBuilder = Box<dyn Fn(U256, [u8; 32], [u8; 32]) -> TxInfo + Send + Sync>;

/// Off-chain signature request that replaces an on-chain approval
pub struct PermitTx {
    /// e.g. "Approve Bundler to spend 1 yvUSDC-1 (via permit2)"
    pub description: String,
    /// EIP-712 payload, JSON encoded
    pub typed_data: String,
    build: PermitTxBuilder,
}

impl PermitTx {
    pub fn new(description: String, typed_data: String, build: PermitTxBuilder) -> Self {
        Self {
            description,
            typed_data,
            build,
        }
    }

    /// Transaction carrying the `(v, r, s)` signature
    pub fn tx(&self, v: U256, r: [u8; 32], s: [u8; 32]) -> TxInfo {
        (self.build)(v, r, s)
    }
}

impl fmt::Debug for PermitTx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermitTx")
            .field("description", &self.description)
            .field("typed_data", &self.typed_data)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub enum WithdrawTxs {
    Txs(Vec<TxInfo>),
    Permit(PermitTx),
}

impl WithdrawTxs {
    /// Descriptions in execution order
    pub fn descriptions(&self) -> Vec<&str> {
        match self {
            WithdrawTxs::Txs(txs) => txs.iter().map(|t| t.description.as_str()).collect(),
            WithdrawTxs::Permit(permit) => vec![permit.description.as_str()],
        }
    }
}

/// Position lookup request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPair {
    pub protocol_id: String,
    pub input_token_address: Address,
    pub output_token_address: Address,
}

#[derive(Debug)]
pub struct Withdraw {
    pub txs: WithdrawTxs,
    /// Amount of input token the withdrawal returns
    pub amount: U256,
}

// ============================================
// ACTIONS (DESCRIPTION INPUTS)
// ============================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitKind {
    Permit,
    Permit2,
}

impl fmt::Display for PermitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermitKind::Permit => f.write_str("permit"),
            PermitKind::Permit2 => f.write_str("permit2"),
        }
    }
}

/// What a transaction does, for rendering its description
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action<'a> {
    Withdraw {
        protocol_name: &'a str,
        display_amount: &'a str,
        input_symbol: &'a str,
        output_symbol: &'a str,
    },
    Deposit {
        protocol_name: &'a str,
        display_amount: Option<&'a str>,
        input_symbol: &'a str,
    },
    Approve {
        spender_name: Option<&'a str>,
        display_amount: &'a str,
        token_symbol: &'a str,
    },
    Permit {
        kind: PermitKind,
        spender_name: Option<&'a str>,
        display_amount: &'a str,
        token_symbol: &'a str,
    },
    Repay {
        protocol_name: &'a str,
        display_amount: &'a str,
        token_symbol: &'a str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::utils::generate_description;
    use alloy_primitives::{address, B256};

    const SPENDER: Address = address!("4095F064B8d3c3548A3bebfd0Bbfd04750E30077");

    fn signed_tx(v: U256, r: [u8; 32], s: [u8; 32]) -> TxInfo {
        let mut data = v.to_be_bytes::<32>().to_vec();
        data.extend_from_slice(&r);
        data.extend_from_slice(&s);
        TxInfo {
            to: SPENDER,
            value: U256::ZERO,
            data: data.into(),
            description: "Withdraw 1 yvUSDC-1 to USDC on Yearn".to_string(),
            display_amount: "1".to_string(),
            function: None,
        }
    }

    #[test]
    fn test_permit_tx_builds_with_signature() {
        let description = generate_description(&Action::Permit {
            kind: PermitKind::Permit2,
            spender_name: Some("Bundler"),
            display_amount: "1",
            token_symbol: "yvUSDC-1",
        });
        let permit = PermitTx::new(description, "{\"primaryType\":\"PermitSingle\"}".to_string(), Box::new(signed_tx));

        let r = B256::repeat_byte(0xaa);
        let s = B256::repeat_byte(0xbb);
        let tx = permit.tx(U256::from(27u8), r.0, s.0);

        assert_eq!(tx.to, SPENDER);
        assert_eq!(tx.data.len(), 96);
        assert_eq!(tx.data[31], 27);
        assert_eq!(&tx.data[32..64], r.as_slice());
        assert_eq!(&tx.data[64..], s.as_slice());

        let txs = WithdrawTxs::Permit(permit);
        assert_eq!(
            txs.descriptions(),
            vec!["Approve Bundler to spend 1 yvUSDC-1 (via permit2)"]
        );
        assert!(format!("{txs:?}").contains("PermitSingle"));
    }

    #[test]
    fn test_category_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Category::Staked).unwrap(), "\"staked\"");
        assert_eq!(Category::Lending.to_string(), "lending");
    }
}
