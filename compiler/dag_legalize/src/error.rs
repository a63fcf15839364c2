//! Fatal legalization errors.
//!
//! Every error aborts the pass. A graph that produced one is left in an
//! unspecified, partially rewritten state and must not be handed on.

use std::fmt;

use dag_ir::{Opcode, TypeVerdict, ValueRef, ValueType};

use crate::classify::TypeAction;

/// Where on a node a handler was looking when it gave up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Position {
    /// A result slot.
    Result(u32),
    /// An operand index.
    Operand(usize),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Result(slot) => write!(f, "result {slot}"),
            Position::Operand(i) => write!(f, "operand {i}"),
        }
    }
}

/// Why the type legalizer could not finish.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LegalizeError {
    /// No rule exists for this opcode in this shape.
    #[error("cannot {action} {position} of {opcode}")]
    UnhandledOperation {
        action: TypeAction,
        opcode: Opcode,
        position: Position,
    },

    /// Bookkeeping is inconsistent: a missing or duplicate table entry, or
    /// a node scheduled out of order.
    #[error("internal invariant violated at {value}: {detail}")]
    InvariantViolation {
        detail: &'static str,
        value: ValueRef,
    },

    /// The target answered a verdict for which no action exists.
    #[error("target verdict {verdict:?} for {vt} has no legalization action")]
    ClassificationFailure { vt: ValueType, verdict: TypeVerdict },
}

impl LegalizeError {
    pub(crate) fn invariant(detail: &'static str, value: ValueRef) -> Self {
        LegalizeError::InvariantViolation { detail, value }
    }
}
