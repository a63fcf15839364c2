//! Float arithmetic on encoded values.
//!
//! `F32` and `F64` use the host's IEEE arithmetic. `PpcF128` is evaluated
//! as an unevaluated sum of two doubles with error-free transformations.
//! `F16` and `F128` have no host arithmetic here; operations on them
//! report `None` so the caller can raise an unsupported-operation error.

use std::cmp::Ordering;

use crate::limbs;
use crate::opcode::Opcode;
use crate::types::FloatFormat;

#[derive(Clone, Copy, Debug)]
struct DoubleDouble {
    hi: f64,
    lo: f64,
}

fn two_sum(a: f64, b: f64) -> (f64, f64) {
    let s = a + b;
    let bb = s - a;
    let e = (a - (s - bb)) + (b - bb);
    (s, e)
}

fn quick_two_sum(a: f64, b: f64) -> DoubleDouble {
    let s = a + b;
    let e = b - (s - a);
    DoubleDouble { hi: s, lo: e }
}

impl DoubleDouble {
    fn from_f64(x: f64) -> Self {
        DoubleDouble { hi: x, lo: 0.0 }
    }

    fn neg(self) -> Self {
        DoubleDouble {
            hi: -self.hi,
            lo: -self.lo,
        }
    }

    fn add(self, rhs: Self) -> Self {
        let (s, e) = two_sum(self.hi, rhs.hi);
        quick_two_sum(s, e + self.lo + rhs.lo)
    }

    fn mul(self, rhs: Self) -> Self {
        let p = self.hi * rhs.hi;
        let e = self.hi.mul_add(rhs.hi, -p) + self.hi * rhs.lo + self.lo * rhs.hi;
        quick_two_sum(p, e)
    }

    fn div(self, rhs: Self) -> Self {
        let q1 = self.hi / rhs.hi;
        let r = self.add(rhs.mul(Self::from_f64(q1)).neg());
        let q2 = r.hi / rhs.hi;
        quick_two_sum(q1, q2)
    }

    fn to_f64(self) -> f64 {
        self.hi + self.lo
    }

    fn to_i128(self) -> i128 {
        let whole = self.hi.trunc();
        (whole as i128).wrapping_add(((self.hi - whole) + self.lo).trunc() as i128)
    }

    fn to_u128(self) -> u128 {
        if self.hi <= 0.0 {
            return 0;
        }
        let whole = self.hi.trunc();
        let rest = ((self.hi - whole) + self.lo).trunc();
        (whole as u128).wrapping_add(rest as i128 as u128)
    }

    fn from_i128(v: i128) -> Self {
        let hi = v as f64;
        let lo = v.wrapping_sub(hi as i128) as f64;
        quick_two_sum(hi, lo)
    }

    fn from_u128(v: u128) -> Self {
        let hi = v as f64;
        let lo = (v.wrapping_sub(hi as u128) as i128) as f64;
        quick_two_sum(hi, lo)
    }

    /// Leading double in the low 64 bits, trailing double in the high 64.
    fn encode(self) -> u128 {
        u128::from(self.hi.to_bits()) | (u128::from(self.lo.to_bits()) << 64)
    }

    fn decode(bits: u128) -> Self {
        DoubleDouble {
            hi: f64::from_bits(bits as u64),
            lo: f64::from_bits((bits >> 64) as u64),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Fp {
    Single(f32),
    Double(f64),
    Pair(DoubleDouble),
}

fn decode(format: FloatFormat, bits: u128) -> Option<Fp> {
    match format {
        FloatFormat::F32 => Some(Fp::Single(f32::from_bits(bits as u32))),
        FloatFormat::F64 => Some(Fp::Double(f64::from_bits(bits as u64))),
        FloatFormat::PpcF128 => Some(Fp::Pair(DoubleDouble::decode(bits))),
        FloatFormat::F16 | FloatFormat::F128 => None,
    }
}

fn encode(fp: Fp) -> u128 {
    match fp {
        Fp::Single(x) => u128::from(x.to_bits()),
        Fp::Double(x) => u128::from(x.to_bits()),
        Fp::Pair(dd) => dd.encode(),
    }
}

/// `a op b` for `FAdd`, `FSub`, `FMul`, `FDiv`.
pub(super) fn binary(op: Opcode, format: FloatFormat, a: u128, b: u128) -> Option<u128> {
    let result = match (decode(format, a)?, decode(format, b)?) {
        (Fp::Single(x), Fp::Single(y)) => Fp::Single(match op {
            Opcode::FAdd => x + y,
            Opcode::FSub => x - y,
            Opcode::FMul => x * y,
            Opcode::FDiv => x / y,
            _ => return None,
        }),
        (Fp::Double(x), Fp::Double(y)) => Fp::Double(match op {
            Opcode::FAdd => x + y,
            Opcode::FSub => x - y,
            Opcode::FMul => x * y,
            Opcode::FDiv => x / y,
            _ => return None,
        }),
        (Fp::Pair(x), Fp::Pair(y)) => Fp::Pair(match op {
            Opcode::FAdd => x.add(y),
            Opcode::FSub => x.add(y.neg()),
            Opcode::FMul => x.mul(y),
            Opcode::FDiv => x.div(y),
            _ => return None,
        }),
        _ => return None,
    };
    Some(encode(result))
}

/// Flip the sign; both doubles of a `PpcF128`.
pub(super) fn negate(format: FloatFormat, a: u128) -> u128 {
    match format {
        FloatFormat::PpcF128 => a ^ (1 << 63) ^ (1 << 127),
        other => a ^ (1 << limbs::fp_sign_bit(other)),
    }
}

/// Ordering of `a` and `b`; the inner `None` means unordered.
pub(super) fn compare(format: FloatFormat, a: u128, b: u128) -> Option<Option<Ordering>> {
    let ord = match (decode(format, a)?, decode(format, b)?) {
        (Fp::Single(x), Fp::Single(y)) => x.partial_cmp(&y),
        (Fp::Double(x), Fp::Double(y)) => x.partial_cmp(&y),
        (Fp::Pair(x), Fp::Pair(y)) => match x.hi.partial_cmp(&y.hi) {
            Some(Ordering::Equal) => x.lo.partial_cmp(&y.lo),
            other => other,
        },
        _ => return None,
    };
    Some(ord)
}

/// Truncating conversion to a `width`-bit integer.
pub(super) fn to_int(format: FloatFormat, a: u128, width: u32, signed: bool) -> Option<u128> {
    let value = match (decode(format, a)?, signed) {
        (Fp::Single(x), true) => x as i128 as u128,
        (Fp::Single(x), false) => x as u128,
        (Fp::Double(x), true) => x as i128 as u128,
        (Fp::Double(x), false) => x as u128,
        (Fp::Pair(dd), true) => dd.to_i128() as u128,
        (Fp::Pair(dd), false) => dd.to_u128(),
    };
    Some(limbs::truncate(value, width))
}

/// Rounding conversion from a `width`-bit integer.
pub(super) fn from_int(width: u32, a: u128, signed: bool, format: FloatFormat) -> Option<u128> {
    let fp = if signed {
        let v = limbs::as_signed(a, width);
        match format {
            FloatFormat::F32 => Fp::Single(v as f32),
            FloatFormat::F64 => Fp::Double(v as f64),
            FloatFormat::PpcF128 => Fp::Pair(DoubleDouble::from_i128(v)),
            FloatFormat::F16 | FloatFormat::F128 => return None,
        }
    } else {
        let v = limbs::truncate(a, width);
        match format {
            FloatFormat::F32 => Fp::Single(v as f32),
            FloatFormat::F64 => Fp::Double(v as f64),
            FloatFormat::PpcF128 => Fp::Pair(DoubleDouble::from_u128(v)),
            FloatFormat::F16 | FloatFormat::F128 => return None,
        }
    };
    Some(encode(fp))
}

/// Conversion between float formats.
pub(super) fn convert(from: FloatFormat, to: FloatFormat, a: u128) -> Option<u128> {
    let wide = match decode(from, a)? {
        Fp::Single(x) => DoubleDouble::from_f64(f64::from(x)),
        Fp::Double(x) => DoubleDouble::from_f64(x),
        Fp::Pair(dd) => dd,
    };
    let fp = match to {
        FloatFormat::F32 => Fp::Single(wide.to_f64() as f32),
        FloatFormat::F64 => Fp::Double(wide.to_f64()),
        FloatFormat::PpcF128 => Fp::Pair(wide),
        FloatFormat::F16 | FloatFormat::F128 => return None,
    };
    Some(encode(fp))
}
