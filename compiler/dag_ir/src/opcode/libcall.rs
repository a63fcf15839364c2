//! Out-of-line software routines.
//!
//! A [`Libcall`] names an operation the target cannot perform natively
//! together with the concrete types it works on. Its default symbol
//! follows the libgcc runtime naming scheme (`__udivdi3`, `__addsf3`,
//! `__fixdfdi`, ...); targets may override symbols through
//! [`TargetLowering::libcall_name`](crate::target::TargetLowering::libcall_name).

use std::fmt;

use smallvec::{smallvec, SmallVec};

use crate::types::{FloatFormat, ValueType};

use super::Opcode;

/// Comparison performed by a soft-float compare routine.
///
/// Each routine returns an `i32` whose relation to zero encodes the
/// outcome; see [`SoftCmp::result_test`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SoftCmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Nonzero when either operand is NaN.
    Unord,
}

impl SoftCmp {
    fn stem(self) -> &'static str {
        match self {
            SoftCmp::Eq => "eq",
            SoftCmp::Ne => "ne",
            SoftCmp::Lt => "lt",
            SoftCmp::Le => "le",
            SoftCmp::Gt => "gt",
            SoftCmp::Ge => "ge",
            SoftCmp::Unord => "unord",
        }
    }

    /// Routine and integer predicate (against zero) implementing a float
    /// comparison predicate.
    pub fn for_cond(cc: super::CondCode) -> Option<(SoftCmp, super::CondCode)> {
        use super::CondCode as C;
        let pair = match cc {
            C::FOeq => (SoftCmp::Eq, C::Eq),
            C::FUne => (SoftCmp::Ne, C::Ne),
            C::FOlt => (SoftCmp::Lt, C::Slt),
            C::FOle => (SoftCmp::Le, C::Sle),
            C::FOgt => (SoftCmp::Gt, C::Sgt),
            C::FOge => (SoftCmp::Ge, C::Sge),
            C::FUno => (SoftCmp::Unord, C::Ne),
            C::FOrd => (SoftCmp::Unord, C::Eq),
            _ => return None,
        };
        Some(pair)
    }
}

/// A software routine together with the types it operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Libcall {
    SDiv(u32),
    UDiv(u32),
    SRem(u32),
    URem(u32),
    Ctlz(u32),
    Cttz(u32),
    Ctpop(u32),
    FAdd(FloatFormat),
    FSub(FloatFormat),
    FMul(FloatFormat),
    FDiv(FloatFormat),
    FCmp(SoftCmp, FloatFormat),
    /// Float to signed integer of the given width.
    FpToSint(FloatFormat, u32),
    FpToUint(FloatFormat, u32),
    /// Signed integer of the given width to float.
    SintToFp(u32, FloatFormat),
    UintToFp(u32, FloatFormat),
    /// Widen from the first format to the second.
    FpExtend(FloatFormat, FloatFormat),
    /// Narrow from the first format to the second.
    FpRound(FloatFormat, FloatFormat),
}

fn int_suffix(width: u32) -> Option<&'static str> {
    match width {
        32 => Some("si"),
        64 => Some("di"),
        128 => Some("ti"),
        _ => None,
    }
}

fn float_suffix(format: FloatFormat) -> &'static str {
    match format {
        FloatFormat::F16 => "hf",
        FloatFormat::F32 => "sf",
        FloatFormat::F64 => "df",
        FloatFormat::F128 | FloatFormat::PpcF128 => "tf",
    }
}

impl Libcall {
    /// Routine implementing an integer opcode at `width`, if one exists.
    pub fn for_int_op(op: Opcode, width: u32) -> Option<Libcall> {
        Some(match op {
            Opcode::SDiv => Libcall::SDiv(width),
            Opcode::UDiv => Libcall::UDiv(width),
            Opcode::SRem => Libcall::SRem(width),
            Opcode::URem => Libcall::URem(width),
            Opcode::Ctlz => Libcall::Ctlz(width),
            Opcode::Cttz => Libcall::Cttz(width),
            Opcode::Ctpop => Libcall::Ctpop(width),
            _ => return None,
        })
    }

    /// Routine implementing a float arithmetic opcode, if one exists.
    pub fn for_float_op(op: Opcode, format: FloatFormat) -> Option<Libcall> {
        Some(match op {
            Opcode::FAdd => Libcall::FAdd(format),
            Opcode::FSub => Libcall::FSub(format),
            Opcode::FMul => Libcall::FMul(format),
            Opcode::FDiv => Libcall::FDiv(format),
            _ => return None,
        })
    }

    /// Routine for a float/int or float/float conversion opcode.
    ///
    /// Returns `None` when the operand and result types do not describe a
    /// conversion of that kind.
    pub fn for_conversion(op: Opcode, from: ValueType, to: ValueType) -> Option<Libcall> {
        match (op, from, to) {
            (Opcode::FpToSint, ValueType::Float(f), ValueType::Int(w)) => {
                Some(Libcall::FpToSint(f, w))
            }
            (Opcode::FpToUint, ValueType::Float(f), ValueType::Int(w)) => {
                Some(Libcall::FpToUint(f, w))
            }
            (Opcode::SintToFp, ValueType::Int(w), ValueType::Float(f)) => {
                Some(Libcall::SintToFp(w, f))
            }
            (Opcode::UintToFp, ValueType::Int(w), ValueType::Float(f)) => {
                Some(Libcall::UintToFp(w, f))
            }
            (Opcode::FpExtend, ValueType::Float(a), ValueType::Float(b)) => {
                Some(Libcall::FpExtend(a, b))
            }
            (Opcode::FpRound, ValueType::Float(a), ValueType::Float(b)) => {
                Some(Libcall::FpRound(a, b))
            }
            _ => None,
        }
    }

    /// Symbol under the libgcc naming scheme, or `None` when the runtime
    /// has no routine for these types.
    pub fn default_name(self) -> Option<String> {
        let name = match self {
            Libcall::SDiv(w) => format!("__div{}3", int_suffix(w)?),
            Libcall::UDiv(w) => format!("__udiv{}3", int_suffix(w)?),
            Libcall::SRem(w) => format!("__mod{}3", int_suffix(w)?),
            Libcall::URem(w) => format!("__umod{}3", int_suffix(w)?),
            Libcall::Ctlz(w) => format!("__clz{}2", int_suffix(w)?),
            Libcall::Cttz(w) => format!("__ctz{}2", int_suffix(w)?),
            Libcall::Ctpop(w) => format!("__popcount{}2", int_suffix(w)?),
            Libcall::FAdd(FloatFormat::PpcF128) => "__gcc_qadd".to_owned(),
            Libcall::FSub(FloatFormat::PpcF128) => "__gcc_qsub".to_owned(),
            Libcall::FMul(FloatFormat::PpcF128) => "__gcc_qmul".to_owned(),
            Libcall::FDiv(FloatFormat::PpcF128) => "__gcc_qdiv".to_owned(),
            Libcall::FAdd(f) => format!("__add{}3", float_suffix(f)),
            Libcall::FSub(f) => format!("__sub{}3", float_suffix(f)),
            Libcall::FMul(f) => format!("__mul{}3", float_suffix(f)),
            Libcall::FDiv(f) => format!("__div{}3", float_suffix(f)),
            Libcall::FCmp(cmp, f) => format!("__{}{}2", cmp.stem(), float_suffix(f)),
            Libcall::FpToSint(f, w) => format!("__fix{}{}", float_suffix(f), int_suffix(w)?),
            Libcall::FpToUint(f, w) => {
                format!("__fixuns{}{}", float_suffix(f), int_suffix(w)?)
            }
            Libcall::SintToFp(w, f) => format!("__float{}{}", int_suffix(w)?, float_suffix(f)),
            Libcall::UintToFp(w, f) => {
                format!("__floatun{}{}", int_suffix(w)?, float_suffix(f))
            }
            Libcall::FpExtend(a, b) => {
                format!("__extend{}{}2", float_suffix(a), float_suffix(b))
            }
            Libcall::FpRound(a, b) => format!("__trunc{}{}2", float_suffix(a), float_suffix(b)),
        };
        Some(name)
    }

    /// Parameter types in call order.
    pub fn params(self) -> SmallVec<[ValueType; 2]> {
        match self {
            Libcall::SDiv(w) | Libcall::UDiv(w) | Libcall::SRem(w) | Libcall::URem(w) => {
                smallvec![ValueType::Int(w), ValueType::Int(w)]
            }
            Libcall::Ctlz(w) | Libcall::Cttz(w) | Libcall::Ctpop(w) => {
                smallvec![ValueType::Int(w)]
            }
            Libcall::FAdd(f)
            | Libcall::FSub(f)
            | Libcall::FMul(f)
            | Libcall::FDiv(f)
            | Libcall::FCmp(_, f) => smallvec![ValueType::Float(f), ValueType::Float(f)],
            Libcall::FpToSint(f, _)
            | Libcall::FpToUint(f, _)
            | Libcall::FpExtend(f, _)
            | Libcall::FpRound(f, _) => smallvec![ValueType::Float(f)],
            Libcall::SintToFp(w, _) | Libcall::UintToFp(w, _) => smallvec![ValueType::Int(w)],
        }
    }

    /// Result type of the routine.
    pub fn result(self) -> ValueType {
        match self {
            Libcall::SDiv(w) | Libcall::UDiv(w) | Libcall::SRem(w) | Libcall::URem(w) => {
                ValueType::Int(w)
            }
            // The count routines return `int` regardless of operand width.
            Libcall::Ctlz(_) | Libcall::Cttz(_) | Libcall::Ctpop(_) | Libcall::FCmp(..) => {
                ValueType::I32
            }
            Libcall::FAdd(f) | Libcall::FSub(f) | Libcall::FMul(f) | Libcall::FDiv(f) => {
                ValueType::Float(f)
            }
            Libcall::FpToSint(_, w) | Libcall::FpToUint(_, w) => ValueType::Int(w),
            Libcall::SintToFp(_, f)
            | Libcall::UintToFp(_, f)
            | Libcall::FpExtend(_, f)
            | Libcall::FpRound(_, f) => ValueType::Float(f),
        }
    }

    /// Whether integer arguments narrower than a register are passed
    /// sign-extended.
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            Libcall::SDiv(_) | Libcall::SRem(_) | Libcall::FpToSint(..) | Libcall::SintToFp(..)
        )
    }
}

impl fmt::Display for Libcall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.default_name() {
            Some(name) => f.write_str(&name),
            None => write!(f, "{self:?}"),
        }
    }
}
