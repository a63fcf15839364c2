//! Type action classifier.
//!
//! Maps a value type to the [`TypeAction`] the legalizer takes for it,
//! from the target's verdict and transform type. The mapping is a pure
//! function of the type and the target, so [`TypeClassifier`] memoizes
//! it for the duration of a pass.
//!
//! # Rules
//!
//! | verdict   | type                    | action            |
//! |-----------|-------------------------|-------------------|
//! | `Legal`   | any                     | `Legal`           |
//! | `Promote` | integer, wider integer  | `PromoteInteger`  |
//! | `Expand`  | integer, half-width     | `ExpandInteger`   |
//! | `Expand`  | float, same-width int   | `PromoteFloat`    |
//! | `Expand`  | float, half-width float | `ExpandFloat`     |
//! | `Expand`  | vector of one element   | `ScalarizeVector` |
//! | `Expand`  | longer vector           | `SplitVector`     |
//!
//! Every other combination, and every `Custom` verdict, is a
//! [`LegalizeError::ClassificationFailure`].

use std::fmt;

use rustc_hash::FxHashMap;

use dag_ir::{TargetLowering, TypeVerdict, ValueType};

use crate::error::LegalizeError;

/// What the legalizer does with values of a type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeAction {
    Legal,
    /// Carry the value in a wider integer; high bits are unspecified.
    PromoteInteger,
    /// Carry the value as a (low, high) pair of half-width integers.
    ExpandInteger,
    /// Carry the float's encoding in the integer of the same width.
    PromoteFloat,
    /// Carry the float as a pair of half-width floats.
    ExpandFloat,
    /// Carry a one-element vector as its element.
    ScalarizeVector,
    /// Carry the vector as its leading and trailing halves.
    SplitVector,
}

impl TypeAction {
    pub const ALL: [TypeAction; 7] = [
        TypeAction::Legal,
        TypeAction::PromoteInteger,
        TypeAction::ExpandInteger,
        TypeAction::PromoteFloat,
        TypeAction::ExpandFloat,
        TypeAction::ScalarizeVector,
        TypeAction::SplitVector,
    ];

    pub const COUNT: usize = Self::ALL.len();

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short kebab-case name, used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            TypeAction::Legal => "legal",
            TypeAction::PromoteInteger => "promote-integer",
            TypeAction::ExpandInteger => "expand-integer",
            TypeAction::PromoteFloat => "promote-float",
            TypeAction::ExpandFloat => "expand-float",
            TypeAction::ScalarizeVector => "scalarize",
            TypeAction::SplitVector => "split",
        }
    }
}

impl fmt::Display for TypeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeAction::Legal => "keep",
            TypeAction::PromoteInteger => "promote",
            TypeAction::ExpandInteger => "expand",
            TypeAction::PromoteFloat => "soften",
            TypeAction::ExpandFloat => "expand float",
            TypeAction::ScalarizeVector => "scalarize",
            TypeAction::SplitVector => "split",
        })
    }
}

/// Per-action tallies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionCounts([usize; TypeAction::COUNT]);

impl ActionCounts {
    #[inline]
    pub fn get(&self, action: TypeAction) -> usize {
        self.0[action.index()]
    }

    #[inline]
    pub(crate) fn record(&mut self, action: TypeAction) {
        self.0[action.index()] += 1;
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

/// Classify `vt` against `target`.
pub fn classify(target: &dyn TargetLowering, vt: ValueType) -> Result<TypeAction, LegalizeError> {
    let verdict = target.type_verdict(vt);
    let failure = || LegalizeError::ClassificationFailure { vt, verdict };
    match verdict {
        TypeVerdict::Legal => Ok(TypeAction::Legal),
        TypeVerdict::Custom => Err(failure()),
        TypeVerdict::Promote => match (vt, target.transform_to(vt)) {
            (ValueType::Int(w), ValueType::Int(to)) if to > w => Ok(TypeAction::PromoteInteger),
            _ => Err(failure()),
        },
        TypeVerdict::Expand => match (vt, target.transform_to(vt)) {
            (ValueType::Int(w), ValueType::Int(half)) if w % 2 == 0 && half * 2 == w => {
                Ok(TypeAction::ExpandInteger)
            }
            (ValueType::Float(f), ValueType::Int(bits)) if bits == f.bits() => {
                Ok(TypeAction::PromoteFloat)
            }
            (ValueType::Float(f), ValueType::Float(half)) if half.bits() * 2 == f.bits() => {
                Ok(TypeAction::ExpandFloat)
            }
            (ValueType::Vector(v), to) if v.count == 1 && to == v.elem.value_type() => {
                Ok(TypeAction::ScalarizeVector)
            }
            (ValueType::Vector(v), ValueType::Vector(to)) if v.count > 1 && to.elem == v.elem => {
                Ok(TypeAction::SplitVector)
            }
            _ => Err(failure()),
        },
    }
}

/// Memoizing classifier bound to one target.
pub struct TypeClassifier<'t> {
    target: &'t dyn TargetLowering,
    cache: FxHashMap<ValueType, TypeAction>,
}

impl<'t> TypeClassifier<'t> {
    pub fn new(target: &'t dyn TargetLowering) -> Self {
        Self {
            target,
            cache: FxHashMap::default(),
        }
    }

    /// Action for `vt`, computed once per type.
    pub fn action(&mut self, vt: ValueType) -> Result<TypeAction, LegalizeError> {
        if let Some(action) = self.cache.get(&vt) {
            return Ok(*action);
        }
        let action = classify(self.target, vt)?;
        self.cache.insert(vt, action);
        Ok(action)
    }

    /// Number of distinct types classified so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
