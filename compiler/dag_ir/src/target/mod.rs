//! Target description: which value types and operations a machine supports.
//!
//! [`TargetLowering`] is the seam the type legalizer consults. It answers
//! per-type verdicts (legal, promote to a wider type, expand into smaller
//! pieces), the type each verdict transforms into, native operation
//! availability and routine-call symbols.
//!
//! [`TargetDesc`] is a table-driven implementation configured with a
//! builder, with presets for common 32- and 64-bit machines.
//!
//! # Verdict rules
//!
//! For a type not registered as legal:
//!
//! - integers narrower than the widest legal integer, or of a width that
//!   is not a power of two, are promoted to the next legal (or power of
//!   two) width; wider powers of two expand into two halves;
//! - `PpcF128` expands into a pair of `F64`, every other float expands
//!   into the integer of the same width (software floating point);
//! - vectors expand: a one-element vector into its element, longer
//!   vectors into their leading half.
//!
//! Explicit overrides set with [`TargetDesc::with_verdict`] take
//! precedence over these rules.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::opcode::{Libcall, Opcode};
use crate::types::{ElemType, FloatFormat, ValueType, VectorType};

/// How a target treats a value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeVerdict {
    /// Held and operated on directly.
    Legal,
    /// Represented by a wider type.
    Promote,
    /// Represented by smaller pieces (or, for same-width floats, by an
    /// integer).
    Expand,
    /// Needs target-specific handling the type legalizer cannot provide.
    Custom,
}

/// Queries the type legalizer makes of a target.
pub trait TargetLowering {
    /// Legality verdict for `vt`.
    fn type_verdict(&self, vt: ValueType) -> TypeVerdict;

    /// The type `vt` is rewritten to under its verdict.
    fn transform_to(&self, vt: ValueType) -> ValueType;

    /// Result type of a scalar comparison of `operand` values.
    fn setcc_result_type(&self, operand: ValueType) -> ValueType;

    /// Type of addresses.
    fn pointer_type(&self) -> ValueType;

    /// Whether `op` at type `vt` has a native implementation.
    fn is_operation_legal(&self, op: Opcode, vt: ValueType) -> bool;

    /// Symbol of the routine implementing `call`, if the runtime has one.
    fn libcall_name(&self, call: Libcall) -> Option<String>;
}

/// Table-driven target description.
#[derive(Clone, Debug)]
pub struct TargetDesc {
    legal: FxHashSet<ValueType>,
    overrides: FxHashMap<ValueType, (TypeVerdict, Option<ValueType>)>,
    native_ops: FxHashSet<(Opcode, ValueType)>,
    routine_names: FxHashMap<Libcall, Option<String>>,
    setcc_type: ValueType,
    pointer_bits: u32,
}

impl Default for TargetDesc {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetDesc {
    /// A target whose only legal type is the 32-bit pointer integer.
    pub fn new() -> Self {
        let mut legal = FxHashSet::default();
        legal.insert(ValueType::I32);
        TargetDesc {
            legal,
            overrides: FxHashMap::default(),
            native_ops: FxHashSet::default(),
            routine_names: FxHashMap::default(),
            setcc_type: ValueType::I32,
            pointer_bits: 32,
        }
    }

    /// 32-bit machine: `i8`, `i16`, `i32`, `f32`, `f64` legal, with
    /// carry arithmetic and high multiply on `i32`.
    pub fn ilp32() -> Self {
        Self::new()
            .with_legal_int(8)
            .with_legal_int(16)
            .with_legal_float(FloatFormat::F32)
            .with_legal_float(FloatFormat::F64)
            .with_carry_ops(ValueType::I32)
    }

    /// 64-bit machine: as [`ilp32`](Self::ilp32) plus `i64`, 64-bit
    /// pointers and carry arithmetic on `i64`.
    pub fn lp64() -> Self {
        Self::ilp32()
            .with_legal_int(64)
            .with_pointer_bits(64)
            .with_carry_ops(ValueType::I64)
    }

    #[must_use]
    pub fn with_legal_int(mut self, width: u32) -> Self {
        self.legal.insert(ValueType::Int(width));
        self
    }

    #[must_use]
    pub fn with_legal_float(mut self, format: FloatFormat) -> Self {
        self.legal.insert(ValueType::Float(format));
        self
    }

    #[must_use]
    pub fn with_legal_vector(mut self, vt: VectorType) -> Self {
        self.legal.insert(ValueType::Vector(vt));
        self
    }

    /// Register every integer and float vector `bits` wide with at least
    /// two elements.
    #[must_use]
    pub fn with_simd(mut self, bits: u32) -> Self {
        let elems = [
            ElemType::Int(8),
            ElemType::Int(16),
            ElemType::Int(32),
            ElemType::Int(64),
            ElemType::Float(FloatFormat::F32),
            ElemType::Float(FloatFormat::F64),
        ];
        for elem in elems {
            let count = bits / elem.bits();
            if count >= 2 && count * elem.bits() == bits {
                self.legal
                    .insert(ValueType::Vector(VectorType::new(elem, count)));
            }
        }
        self
    }

    /// Comparison results use `vt`, which is also made legal.
    #[must_use]
    pub fn with_setcc_type(mut self, vt: ValueType) -> Self {
        self.legal.insert(vt);
        self.setcc_type = vt;
        self
    }

    /// Pointers are `bits` wide; that integer is made legal.
    #[must_use]
    pub fn with_pointer_bits(mut self, bits: u32) -> Self {
        self.legal.insert(ValueType::Int(bits));
        self.pointer_bits = bits;
        self
    }

    #[must_use]
    pub fn with_native_op(mut self, op: Opcode, vt: ValueType) -> Self {
        self.native_ops.insert((op, vt));
        self
    }

    /// Native `AddC`/`AddE`/`SubC`/`SubE`/`MulHu` at `vt`.
    #[must_use]
    pub fn with_carry_ops(self, vt: ValueType) -> Self {
        [Opcode::AddC, Opcode::AddE, Opcode::SubC, Opcode::SubE, Opcode::MulHu]
            .into_iter()
            .fold(self, |t, op| t.with_native_op(op, vt))
    }

    /// Force a verdict (and optionally its transform type) for `vt`.
    #[must_use]
    pub fn with_verdict(
        mut self,
        vt: ValueType,
        verdict: TypeVerdict,
        transform: Option<ValueType>,
    ) -> Self {
        self.overrides.insert(vt, (verdict, transform));
        self
    }

    /// Override a routine symbol; `None` removes the routine.
    #[must_use]
    pub fn with_routine_name(mut self, call: Libcall, symbol: Option<&str>) -> Self {
        self.routine_names.insert(call, symbol.map(str::to_owned));
        self
    }

    /// Widest legal scalar integer.
    pub fn max_legal_int(&self) -> u32 {
        self.legal
            .iter()
            .filter_map(|vt| match vt {
                ValueType::Int(w) => Some(*w),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    fn smallest_legal_int_above(&self, width: u32) -> Option<u32> {
        self.legal
            .iter()
            .filter_map(|vt| match vt {
                ValueType::Int(w) if *w > width => Some(*w),
                _ => None,
            })
            .min()
    }

    fn is_legal(&self, vt: ValueType) -> bool {
        matches!(vt, ValueType::Chain | ValueType::Flag) || self.legal.contains(&vt)
    }
}

impl TargetLowering for TargetDesc {
    fn type_verdict(&self, vt: ValueType) -> TypeVerdict {
        if let Some((verdict, _)) = self.overrides.get(&vt) {
            return *verdict;
        }
        if self.is_legal(vt) {
            return TypeVerdict::Legal;
        }
        match vt {
            ValueType::Int(w) => {
                if w < self.max_legal_int() || !w.is_power_of_two() {
                    TypeVerdict::Promote
                } else {
                    TypeVerdict::Expand
                }
            }
            _ => TypeVerdict::Expand,
        }
    }

    fn transform_to(&self, vt: ValueType) -> ValueType {
        if let Some((_, Some(transform))) = self.overrides.get(&vt) {
            return *transform;
        }
        match (self.type_verdict(vt), vt) {
            (TypeVerdict::Promote, ValueType::Int(w)) => ValueType::Int(
                self.smallest_legal_int_above(w)
                    .unwrap_or_else(|| w.next_power_of_two()),
            ),
            (TypeVerdict::Expand, ValueType::Int(w)) => ValueType::Int(w / 2),
            (TypeVerdict::Expand, ValueType::Float(FloatFormat::PpcF128)) => ValueType::F64,
            (TypeVerdict::Expand, ValueType::Float(f)) => ValueType::Int(f.bits()),
            (TypeVerdict::Expand, ValueType::Vector(v)) => {
                if v.count == 1 {
                    v.elem.value_type()
                } else {
                    ValueType::Vector(v.split_halves().0)
                }
            }
            _ => vt,
        }
    }

    fn setcc_result_type(&self, _operand: ValueType) -> ValueType {
        self.setcc_type
    }

    fn pointer_type(&self) -> ValueType {
        ValueType::Int(self.pointer_bits)
    }

    fn is_operation_legal(&self, op: Opcode, vt: ValueType) -> bool {
        self.native_ops.contains(&(op, vt))
    }

    fn libcall_name(&self, call: Libcall) -> Option<String> {
        match self.routine_names.get(&call) {
            Some(symbol) => symbol.clone(),
            None => call.default_name(),
        }
    }
}
