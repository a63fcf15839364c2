//! Value types carried by DAG results and operands.
//!
//! A [`ValueType`] describes the kind and width of one produced value:
//! an integer of any bit width, a float in one of the supported
//! [`FloatFormat`]s, a fixed-length vector of integer or float elements,
//! or one of the non-data kinds (`Chain` ordering tokens, `Flag` carry
//! bits, and the opaque `Other` marker).
//!
//! Value types are plain `Copy` data compared structurally. Whether a type
//! is *legal* is never a property of the type itself; that question belongs
//! to the target description (see [`crate::target`]).

use std::fmt;

// ── Float formats ───────────────────────────────────────────────────

/// Floating-point encodings a value may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FloatFormat {
    /// IEEE binary16.
    F16,
    /// IEEE binary32.
    F32,
    /// IEEE binary64.
    F64,
    /// IEEE binary128.
    F128,
    /// Double-double: two `F64` values whose sum is the represented value.
    ///
    /// The leading (larger magnitude) double occupies the low 64 bits of
    /// the 128-bit encoding, the trailing double the high 64 bits.
    PpcF128,
}

impl FloatFormat {
    /// Total encoding width in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            FloatFormat::F16 => 16,
            FloatFormat::F32 => 32,
            FloatFormat::F64 => 64,
            FloatFormat::F128 | FloatFormat::PpcF128 => 128,
        }
    }

    /// Significand precision in bits, including the implicit leading bit.
    #[inline]
    pub const fn precision(self) -> u32 {
        match self {
            FloatFormat::F16 => 11,
            FloatFormat::F32 => 24,
            FloatFormat::F64 => 53,
            FloatFormat::F128 => 113,
            FloatFormat::PpcF128 => 106,
        }
    }

    /// Exponent field width and bias for the IEEE formats.
    ///
    /// Returns `None` for `PpcF128`, which has no single exponent field.
    #[inline]
    pub const fn ieee_exponent(self) -> Option<(u32, u32)> {
        match self {
            FloatFormat::F16 => Some((5, 15)),
            FloatFormat::F32 => Some((8, 127)),
            FloatFormat::F64 => Some((11, 1023)),
            FloatFormat::F128 => Some((15, 16383)),
            FloatFormat::PpcF128 => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            FloatFormat::F16 => "f16",
            FloatFormat::F32 => "f32",
            FloatFormat::F64 => "f64",
            FloatFormat::F128 => "f128",
            FloatFormat::PpcF128 => "ppcf128",
        }
    }
}

// ── Vector element types ────────────────────────────────────────────

/// Element type of a vector: a scalar integer or float.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElemType {
    Int(u32),
    Float(FloatFormat),
}

impl ElemType {
    /// Width of one element in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        match self {
            ElemType::Int(w) => w,
            ElemType::Float(f) => f.bits(),
        }
    }

    /// The scalar value type of this element.
    #[inline]
    pub const fn value_type(self) -> ValueType {
        match self {
            ElemType::Int(w) => ValueType::Int(w),
            ElemType::Float(f) => ValueType::Float(f),
        }
    }

    /// Element type for a scalar value type, if it is an integer or float.
    #[inline]
    pub const fn from_scalar(vt: ValueType) -> Option<ElemType> {
        match vt {
            ValueType::Int(w) => Some(ElemType::Int(w)),
            ValueType::Float(f) => Some(ElemType::Float(f)),
            _ => None,
        }
    }
}

/// A fixed-length vector shape.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorType {
    pub elem: ElemType,
    pub count: u32,
}

impl VectorType {
    #[inline]
    pub const fn new(elem: ElemType, count: u32) -> Self {
        Self { elem, count }
    }

    /// Total width in bits.
    #[inline]
    pub const fn bits(self) -> u32 {
        self.elem.bits() * self.count
    }

    /// The leading and trailing halves produced by splitting this vector.
    ///
    /// The leading half receives the extra element when `count` is odd.
    pub fn split_halves(self) -> (VectorType, VectorType) {
        let lo = self.count.div_ceil(2);
        let hi = self.count - lo;
        (
            VectorType::new(self.elem, lo),
            VectorType::new(self.elem, hi),
        )
    }
}

// ── Value types ─────────────────────────────────────────────────────

/// Kind and width of a value produced by a DAG node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueType {
    /// Integer of the given bit width.
    Int(u32),
    /// Float in the given format.
    Float(FloatFormat),
    /// Fixed-length vector.
    Vector(VectorType),
    /// Memory ordering token threaded through loads, stores and returns.
    Chain,
    /// Carry/borrow bit produced and consumed by the carry arithmetic nodes.
    Flag,
    /// Opaque marker for values with no data representation.
    Other,
}

impl ValueType {
    pub const I1: Self = ValueType::Int(1);
    pub const I8: Self = ValueType::Int(8);
    pub const I16: Self = ValueType::Int(16);
    pub const I32: Self = ValueType::Int(32);
    pub const I64: Self = ValueType::Int(64);
    pub const I128: Self = ValueType::Int(128);
    pub const F32: Self = ValueType::Float(FloatFormat::F32);
    pub const F64: Self = ValueType::Float(FloatFormat::F64);

    /// Build a vector type from a scalar element type.
    ///
    /// Returns `None` if `elem` is not an integer or float.
    pub const fn vector(elem: ValueType, count: u32) -> Option<ValueType> {
        match ElemType::from_scalar(elem) {
            Some(elem) => Some(ValueType::Vector(VectorType::new(elem, count))),
            None => None,
        }
    }

    /// Width in bits. Non-data kinds are zero bits wide.
    pub const fn bits(self) -> u32 {
        match self {
            ValueType::Int(w) => w,
            ValueType::Float(f) => f.bits(),
            ValueType::Vector(v) => v.bits(),
            ValueType::Chain | ValueType::Flag | ValueType::Other => 0,
        }
    }

    /// Bytes occupied in memory (bit width rounded up to whole bytes).
    #[inline]
    pub const fn store_bytes(self) -> u32 {
        self.bits().div_ceil(8)
    }

    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(self, ValueType::Int(_))
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, ValueType::Float(_))
    }

    #[inline]
    pub const fn is_vector(self) -> bool {
        matches!(self, ValueType::Vector(_))
    }

    /// Whether the type carries data bits (integer, float or vector).
    #[inline]
    pub const fn is_data(self) -> bool {
        matches!(
            self,
            ValueType::Int(_) | ValueType::Float(_) | ValueType::Vector(_)
        )
    }

    /// Vector shape, if this is a vector.
    #[inline]
    pub const fn as_vector(self) -> Option<VectorType> {
        match self {
            ValueType::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Element type of a vector, or the type itself for scalars.
    pub const fn scalar_type(self) -> ValueType {
        match self {
            ValueType::Vector(v) => v.elem.value_type(),
            other => other,
        }
    }

    /// Number of vector elements (1 for scalars).
    pub const fn element_count(self) -> u32 {
        match self {
            ValueType::Vector(v) => v.count,
            _ => 1,
        }
    }

    /// Same element type with a different element count.
    ///
    /// For scalars this builds a vector of `count` scalars.
    pub const fn with_count(self, count: u32) -> Option<ValueType> {
        ValueType::vector(self.scalar_type(), count)
    }

    /// Float format, if this is a scalar float.
    #[inline]
    pub const fn float_format(self) -> Option<FloatFormat> {
        match self {
            ValueType::Float(f) => Some(f),
            _ => None,
        }
    }

    /// Integer type with the same total width.
    pub const fn same_width_int(self) -> ValueType {
        ValueType::Int(self.bits())
    }
}

impl From<VectorType> for ValueType {
    fn from(v: VectorType) -> Self {
        ValueType::Vector(v)
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElemType::Int(w) => write!(f, "i{w}"),
            ElemType::Float(ff) => f.write_str(ff.name()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int(w) => write!(f, "i{w}"),
            ValueType::Float(ff) => f.write_str(ff.name()),
            ValueType::Vector(v) => write!(f, "v{}{}", v.count, v.elem),
            ValueType::Chain => f.write_str("ch"),
            ValueType::Flag => f.write_str("flag"),
            ValueType::Other => f.write_str("other"),
        }
    }
}
