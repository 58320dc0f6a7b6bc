//! Fixed-point mulDiv and share/asset conversion
//!
//! Two conversion families live here and must not be mixed up:
//! - Morpho Blue markets use constant virtual shares/assets (`to_shares_down`, ...)
//! - ERC-4626 vaults scale supply by `10^decimalsOffset` and add one virtual asset
//!   (`VaultTotals::convert_to_shares`, ...)

use alloy_primitives::{U256, U512};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::evm::{add, div, high_word, mul, mulmod, sub, uint256_wide, widen};

/// Virtual shares of a Morpho Blue market (1e6)
pub const VIRTUAL_SHARES: U256 = U256::from_limbs([1_000_000, 0, 0, 0]);

/// Virtual assets of a Morpho Blue market
pub const VIRTUAL_ASSETS: U256 = U256::from_limbs([1, 0, 0, 0]);

const ONE: U256 = U256::from_limbs([1, 0, 0, 0]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("denominator should be greater than zero.")]
    ZeroDenominator,

    #[error("denominator should be greater than prod1")]
    DenominatorTooSmall,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

/// Rounding direction for divisions with a remainder
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rounding {
    /// Toward negative infinity
    Floor = 0,
    /// Toward positive infinity
    Ceil = 1,
    /// Toward zero
    Trunc = 2,
    /// Away from zero
    Expand = 3,
}

/// True for Ceil and Expand. Relies on the odd discriminants.
pub fn unsigned_rounds_up(rounding: Rounding) -> bool {
    (rounding as u8) % 2 == 1
}

// ============================================
// MULDIV
// ============================================

/// `floor(x * y / denominator)` on the full 512-bit product.
///
/// Fails when the denominator is zero, or when the high word of the product
/// is not below the denominator (the quotient would not fit in 256 bits).
pub fn mul_div(x: U256, y: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::ZeroDenominator);
    }

    let product: U512 = x.widening_mul(y);
    let prod0 = uint256_wide(product);
    let prod1 = high_word(product);

    if prod1.is_zero() {
        return Ok(div(prod0, denominator));
    }

    if prod1 >= denominator {
        return Err(MathError::DenominatorTooSmall);
    }

    Ok(uint256_wide(product / widen(denominator)))
}

/// `x * y / d` on the wrapped product, zero when `d == 0`
pub fn mul_div_down(x: U256, y: U256, d: U256) -> U256 {
    div(mul(x, y), d)
}

/// `(x * y + d - 1) / d` on wrapped words, zero when `d == 0`
pub fn mul_div_up(x: U256, y: U256, d: U256) -> U256 {
    div(add(mul(x, y), sub(d, ONE)), d)
}

/// `mul_div` plus one when rounding up and `x * y` leaves a remainder.
///
/// The remainder is taken on the unreduced product, not on the quotient.
pub fn mul_div_with_rounding(
    x: U256,
    y: U256,
    denominator: U256,
    rounding: Rounding,
) -> Result<U256, MathError> {
    let result = mul_div(x, y, denominator)?;
    if unsigned_rounds_up(rounding) && !mulmod(x, y, denominator).is_zero() {
        return result
            .checked_add(ONE)
            .ok_or(MathError::Overflow("mul_div_with_rounding"));
    }
    Ok(result)
}

// ============================================
// MORPHO BLUE SHARES MATH
// ============================================

/// Value of `assets` quoted in shares, rounding down
pub fn to_shares_down(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_down(
        assets,
        add(total_shares, VIRTUAL_SHARES),
        add(total_assets, VIRTUAL_ASSETS),
    )
}

/// Value of `shares` quoted in assets, rounding down
pub fn to_assets_down(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_down(
        shares,
        add(total_assets, VIRTUAL_ASSETS),
        add(total_shares, VIRTUAL_SHARES),
    )
}

/// Value of `assets` quoted in shares, rounding up
pub fn to_shares_up(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_up(
        assets,
        add(total_shares, VIRTUAL_SHARES),
        add(total_assets, VIRTUAL_ASSETS),
    )
}

/// Value of `shares` quoted in assets, rounding up
pub fn to_assets_up(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    mul_div_up(
        shares,
        add(total_assets, VIRTUAL_ASSETS),
        add(total_shares, VIRTUAL_SHARES),
    )
}

// ============================================
// ERC-4626 VAULT CONVERSION
// ============================================

/// Accounting snapshot of an ERC-4626 vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VaultTotals {
    /// Shares outstanding
    pub total_supply: U256,
    /// Underlying assets held
    pub total_assets: U256,
    /// Extra virtual decimals applied to shares
    pub decimals_offset: u8,
}

impl VaultTotals {
    pub fn new(total_supply: U256, total_assets: U256, decimals_offset: u8) -> Self {
        Self {
            total_supply,
            total_assets,
            decimals_offset,
        }
    }

    /// `total_supply + 10^decimals_offset`
    fn virtual_supply(&self) -> Result<U256, MathError> {
        let scale = U256::from(10u8)
            .checked_pow(U256::from(self.decimals_offset))
            .ok_or(MathError::Overflow("decimals offset"))?;
        self.total_supply
            .checked_add(scale)
            .ok_or(MathError::Overflow("virtual supply"))
    }

    /// `total_assets + 1`
    fn virtual_assets(&self) -> Result<U256, MathError> {
        self.total_assets
            .checked_add(ONE)
            .ok_or(MathError::Overflow("virtual assets"))
    }

    pub fn convert_to_shares(&self, assets: U256, rounding: Rounding) -> Result<U256, MathError> {
        mul_div_with_rounding(assets, self.virtual_supply()?, self.virtual_assets()?, rounding)
    }

    pub fn convert_to_assets(&self, shares: U256, rounding: Rounding) -> Result<U256, MathError> {
        mul_div_with_rounding(shares, self.virtual_assets()?, self.virtual_supply()?, rounding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::evm::UINT256_MAX;

    fn u(x: u64) -> U256 {
        U256::from(x)
    }

    #[test]
    fn test_rounding_parity() {
        assert!(!unsigned_rounds_up(Rounding::Floor));
        assert!(unsigned_rounds_up(Rounding::Ceil));
        assert!(!unsigned_rounds_up(Rounding::Trunc));
        assert!(unsigned_rounds_up(Rounding::Expand));
        assert_eq!(Rounding::Expand as u8, 3);
    }

    #[test]
    fn test_mul_div_rejects_zero_denominator() {
        assert_eq!(mul_div(u(5), u(5), U256::ZERO), Err(MathError::ZeroDenominator));
    }

    #[test]
    fn test_mul_div_floors() {
        assert_eq!(mul_div(u(7), u(3), u(2)), Ok(u(10)));
        assert_eq!(mul_div(u(10), u(10), u(3)), Ok(u(33)));
    }

    #[test]
    fn test_mul_div_full_precision() {
        // MAX * MAX / MAX needs the high word
        assert_eq!(mul_div(UINT256_MAX, UINT256_MAX, UINT256_MAX), Ok(UINT256_MAX));
        // (2^255 * 4) / 8 = 2^254
        let half = u(1) << 255usize;
        assert_eq!(mul_div(half, u(4), u(8)), Ok(u(1) << 254usize));
    }

    #[test]
    fn test_mul_div_overflowing_quotient() {
        // 2^255 * 4 / 2 = 2^256 does not fit
        let half = u(1) << 255usize;
        assert_eq!(mul_div(half, u(4), u(2)), Err(MathError::DenominatorTooSmall));
    }

    #[test]
    fn test_mul_div_down_up() {
        assert_eq!(mul_div_down(u(10), u(10), u(3)), u(33));
        assert_eq!(mul_div_up(u(10), u(10), u(3)), u(34));
        assert_eq!(mul_div_up(u(10), u(3), u(3)), u(10));
        assert_eq!(mul_div_down(u(10), u(10), U256::ZERO), U256::ZERO);
    }

    #[test]
    fn test_mul_div_with_rounding() {
        assert_eq!(mul_div_with_rounding(u(10), u(10), u(3), Rounding::Floor), Ok(u(33)));
        assert_eq!(mul_div_with_rounding(u(10), u(10), u(3), Rounding::Ceil), Ok(u(34)));
        assert_eq!(mul_div_with_rounding(u(10), u(10), u(3), Rounding::Trunc), Ok(u(33)));
        assert_eq!(mul_div_with_rounding(u(10), u(10), u(3), Rounding::Expand), Ok(u(34)));
        // exact division never rounds up
        assert_eq!(mul_div_with_rounding(u(9), u(10), u(3), Rounding::Ceil), Ok(u(30)));
    }

    #[test]
    fn test_mul_div_with_rounding_uses_unreduced_remainder() {
        // x * y overflows 256 bits; the remainder must come from the true product
        let x = UINT256_MAX;
        let y = u(3);
        let d = u(4);
        // 3 * (2^256 - 1) = 3 * 2^256 - 3, which is 1 mod 4
        let floor = mul_div(x, y, d).unwrap();
        assert_eq!(mul_div_with_rounding(x, y, d, Rounding::Ceil), Ok(floor + u(1)));
    }

    #[test]
    fn test_empty_market_bootstrap() {
        // 1e6 assets into an empty market: 1e6 * (0 + 1e6) / (0 + 1)
        let shares = to_shares_down(u(1_000_000), U256::ZERO, U256::ZERO);
        assert_eq!(shares, u(1_000_000_000_000));
        assert_eq!(to_assets_up(shares, U256::ZERO, U256::ZERO), u(1_000_000));
    }

    #[test]
    fn test_shares_round_trip_never_creates_value() {
        let total_assets = u(3);
        let total_shares = u(7);
        for assets in [1u64, 5, 17, 999, 123_456] {
            let shares = to_shares_down(u(assets), total_assets, total_shares);
            let back = to_assets_up(shares, total_assets, total_shares);
            assert!(back + u(1) >= u(assets), "lost more than one unit for {assets}");

            let floor_back = to_assets_down(shares, total_assets, total_shares);
            assert!(floor_back <= u(assets), "created value for {assets}");
        }
    }

    #[test]
    fn test_shares_up_rounds_up() {
        assert_eq!(to_shares_up(u(1), u(2), U256::ZERO), u(333_334));
        assert_eq!(to_shares_down(u(1), u(2), U256::ZERO), u(333_333));
    }

    #[test]
    fn test_vault_conversion_with_offset() {
        let vault = VaultTotals::new(U256::ZERO, U256::ZERO, 6);
        // empty vault: 1 asset -> 1e6 shares
        assert_eq!(vault.convert_to_shares(u(1), Rounding::Floor), Ok(u(1_000_000)));

        let vault = VaultTotals::new(u(2_000), u(999), 0);
        // 10 * 2001 / 1000 = 20.01
        assert_eq!(vault.convert_to_shares(u(10), Rounding::Floor), Ok(u(20)));
        assert_eq!(vault.convert_to_shares(u(10), Rounding::Ceil), Ok(u(21)));
        // 20 * 1000 / 2001 = 9.99
        assert_eq!(vault.convert_to_assets(u(20), Rounding::Floor), Ok(u(9)));
    }
}
