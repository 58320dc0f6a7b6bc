//! EVM word arithmetic
//!
//! Every function takes and returns raw 256-bit words, exactly like the
//! corresponding opcode. Signed opcodes reinterpret their operands as
//! two's-complement `I256` first.
//!
//! Division-like opcodes return zero on a zero divisor instead of failing.
//! This mirrors `DIV`/`SDIV`/`MOD`/`SMOD`/`ADDMOD`/`MULMOD` and must stay that way.

use alloy_primitives::{I256, U256, U512};

pub const UINT256_MAX: U256 = U256::MAX;
pub const INT256_MIN: I256 = I256::MIN;
pub const INT256_MAX: I256 = I256::MAX;

const BYTE_MASK: U256 = U256::from_limbs([0xff, 0, 0, 0]);

#[inline]
fn flag(condition: bool) -> U256 {
    if condition {
        U256::from(1u8)
    } else {
        U256::ZERO
    }
}

// ============================================
// WRAPPING CONVERSIONS
// ============================================

/// Reinterpret a signed value as its unsigned word (mod 2^256)
pub fn uint256(x: I256) -> U256 {
    x.into_raw()
}

/// Reinterpret a word as a signed value in [-2^255, 2^255 - 1]
pub fn int256(x: U256) -> I256 {
    I256::from_raw(x)
}

/// Reduce an unreduced 512-bit product modulo 2^256
pub fn uint256_wide(x: U512) -> U256 {
    U256::from_limbs_slice(&x.as_limbs()[..4])
}

/// Widen a word without changing its value
pub fn widen(x: U256) -> U512 {
    let mut limbs = [0u64; 8];
    limbs[..4].copy_from_slice(x.as_limbs());
    U512::from_limbs(limbs)
}

/// High 256 bits of a 512-bit value
pub fn high_word(x: U512) -> U256 {
    U256::from_limbs_slice(&x.as_limbs()[4..])
}

// ============================================
// ARITHMETIC
// ============================================

pub fn add(a: U256, b: U256) -> U256 {
    a.wrapping_add(b)
}

pub fn sub(a: U256, b: U256) -> U256 {
    a.wrapping_sub(b)
}

pub fn mul(a: U256, b: U256) -> U256 {
    a.wrapping_mul(b)
}

pub fn div(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    a / b
}

/// Signed division, result returned as a raw word. `MIN / -1` wraps to `MIN`.
pub fn sdiv(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    uint256(int256(a).wrapping_div(int256(b)))
}

pub fn modulo(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    a % b
}

/// Signed remainder; the sign follows the dividend
pub fn smod(a: U256, b: U256) -> U256 {
    if b.is_zero() {
        return U256::ZERO;
    }
    uint256(int256(a).wrapping_rem(int256(b)))
}

/// `(a + b) % n` computed without intermediate overflow
pub fn addmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::ZERO;
    }
    a.add_mod(b, n)
}

/// `(a * b) % n` computed on the full 512-bit product
pub fn mulmod(a: U256, b: U256, n: U256) -> U256 {
    if n.is_zero() {
        return U256::ZERO;
    }
    a.mul_mod(b, n)
}

pub fn exp(a: U256, e: U256) -> U256 {
    a.wrapping_pow(e)
}

// ============================================
// COMPARISON
// ============================================

pub fn lt(a: U256, b: U256) -> U256 {
    flag(a < b)
}

pub fn gt(a: U256, b: U256) -> U256 {
    flag(a > b)
}

pub fn slt(a: U256, b: U256) -> U256 {
    flag(int256(a) < int256(b))
}

pub fn sgt(a: U256, b: U256) -> U256 {
    flag(int256(a) > int256(b))
}

pub fn eq(a: U256, b: U256) -> U256 {
    flag(a == b)
}

pub fn iszero(a: U256) -> U256 {
    flag(a.is_zero())
}

// ============================================
// BITWISE
// ============================================

pub fn and(a: U256, b: U256) -> U256 {
    a & b
}

pub fn or(a: U256, b: U256) -> U256 {
    a | b
}

pub fn xor(a: U256, b: U256) -> U256 {
    a ^ b
}

pub fn not(a: U256) -> U256 {
    !a
}

pub fn shl(bits: usize, a: U256) -> U256 {
    if bits > 255 {
        return U256::ZERO;
    }
    a << bits
}

pub fn shr(bits: usize, a: U256) -> U256 {
    if bits > 255 {
        return U256::ZERO;
    }
    a >> bits
}

/// Arithmetic shift right on the signed interpretation of `a`
pub fn sar(bits: usize, a: U256) -> U256 {
    let negative = int256(a).is_negative();
    if bits > 255 {
        return if negative { U256::MAX } else { U256::ZERO };
    }
    if negative {
        // shifting the complement in keeps the sign bits set
        !((!a) >> bits)
    } else {
        a >> bits
    }
}

/// i-th byte of the 32-byte big-endian encoding of `a` (i = 0 is most significant)
pub fn byte(i: usize, a: U256) -> U256 {
    if i >= 32 {
        return U256::ZERO;
    }
    shr(8 * (31 - i), a) & BYTE_MASK
}
