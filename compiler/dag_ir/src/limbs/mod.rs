//! Bit-level helpers on raw constant values.
//!
//! Values are carried in a `u128` with every bit above the value's width
//! zero. These helpers are used to fold constants into limbs during
//! expansion and by the interpreter.

use crate::types::FloatFormat;

/// All-ones mask of the low `width` bits.
#[inline]
pub const fn mask(width: u32) -> u128 {
    if width >= 128 {
        u128::MAX
    } else {
        (1u128 << width) - 1
    }
}

/// Keep only the low `width` bits.
#[inline]
pub const fn truncate(value: u128, width: u32) -> u128 {
    value & mask(width)
}

/// Sign-extend the low `from` bits of `value` to all 128 bits.
#[inline]
pub const fn sign_extend(value: u128, from: u32) -> u128 {
    if from == 0 || from >= 128 {
        return value;
    }
    let shift = 128 - from;
    (((value << shift) as i128) >> shift) as u128
}

/// Sign-extend the low `from` bits of `value` into a `width`-bit value.
#[inline]
pub const fn sign_extend_to(value: u128, from: u32, width: u32) -> u128 {
    truncate(sign_extend(value, from), width)
}

/// Interpret the low `width` bits as a signed integer.
#[inline]
pub const fn as_signed(value: u128, width: u32) -> i128 {
    sign_extend(value, width) as i128
}

/// Split a `width`-bit value into its low and high halves.
#[inline]
pub const fn split(value: u128, width: u32) -> (u128, u128) {
    let half = width / 2;
    let hi = if half >= 128 { 0 } else { value >> half };
    (truncate(value, half), truncate(hi, half))
}

/// Join two `half`-bit limbs, `lo` in the low bits.
#[inline]
pub const fn join(lo: u128, hi: u128, half: u32) -> u128 {
    let hi_bits = if half >= 128 { 0 } else { truncate(hi, half) << half };
    truncate(lo, half) | hi_bits
}

/// Encoding of `2^exp` in an IEEE format, if it is a finite normal value.
///
/// Returns `None` for `PpcF128` and for exponents outside the normal range.
pub fn fp_power_of_two(format: FloatFormat, exp: u32) -> Option<u128> {
    let (exp_bits, bias) = format.ieee_exponent()?;
    let biased = exp.checked_add(bias)?;
    if biased >= (1 << exp_bits) - 1 {
        return None;
    }
    let mantissa_bits = format.bits() - 1 - exp_bits;
    Some(u128::from(biased) << mantissa_bits)
}

/// Sign bit position of a float format's encoding (for `PpcF128`, the
/// sign of the leading double).
pub const fn fp_sign_bit(format: FloatFormat) -> u32 {
    match format {
        FloatFormat::PpcF128 => 63,
        other => other.bits() - 1,
    }
}
