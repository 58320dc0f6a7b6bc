//! On-chain compatible math
//!
//! Responsible for:
//! - Reproducing EVM word semantics off-chain (wraparound, zero-on-zero-divisor)
//! - Full-precision mulDiv with rounding control
//! - Share/asset conversion for Morpho Blue markets and ERC-4626 vaults

pub mod evm;
mod fixed_point;

pub use fixed_point::{
    mul_div, mul_div_down, mul_div_up, mul_div_with_rounding, to_assets_down, to_assets_up,
    to_shares_down, to_shares_up, unsigned_rounds_up, MathError, Rounding, VaultTotals,
    VIRTUAL_ASSETS, VIRTUAL_SHARES,
};
