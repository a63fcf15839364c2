//! Opcode-indexed handler tables.
//!
//! Each handler family exposes two exhaustive `match`es from [`Opcode`] to
//! an optional handler, one for results and one for operands. The tables
//! here materialize them into dense arrays once per pass, so dispatch is a
//! single index and a missing rule is a `None` slot rather than a fallthrough.

use dag_ir::{NodeId, Opcode, ValueRef};

use crate::error::LegalizeError;
use crate::legalizer::Legalizer;
use crate::{expand_float, expand_int, promote_float, promote_int, scalarize, split};

/// What a result handler produced for the slot it was asked about.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Lowered<T> {
    /// The legalized form of the slot, to be recorded in its table.
    Parts(T),
    /// A value of the original type that supersedes the slot.
    Replaced(ValueRef),
    /// The handler recorded everything itself.
    Done,
}

/// What an operand handler did with the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum OperandAction {
    /// Operands were rewritten in place; the node must be revisited.
    UpdatedInPlace,
    /// The node's value (result 0) is superseded by this one.
    Replace(ValueRef),
    /// Nothing further to do.
    #[allow(dead_code)]
    Done,
}

pub(crate) type ResultHandler<T> =
    fn(&mut Legalizer<'_>, NodeId, u32) -> Result<Lowered<T>, LegalizeError>;

pub(crate) type OperandHandler =
    fn(&mut Legalizer<'_>, NodeId, usize) -> Result<OperandAction, LegalizeError>;

type One = ValueRef;
type Two = (ValueRef, ValueRef);

/// Result and operand handlers of one family, indexed by opcode.
pub(crate) struct HandlerSet<T> {
    results: [Option<ResultHandler<T>>; Opcode::COUNT],
    operands: [Option<OperandHandler>; Opcode::COUNT],
}

impl<T> HandlerSet<T> {
    fn build(
        results: fn(Opcode) -> Option<ResultHandler<T>>,
        operands: fn(Opcode) -> Option<OperandHandler>,
    ) -> Self {
        Self {
            results: std::array::from_fn(|i| results(Opcode::ALL[i])),
            operands: std::array::from_fn(|i| operands(Opcode::ALL[i])),
        }
    }

    #[inline]
    pub(crate) fn result(&self, op: Opcode) -> Option<ResultHandler<T>> {
        self.results[op.index()]
    }

    #[inline]
    pub(crate) fn operand(&self, op: Opcode) -> Option<OperandHandler> {
        self.operands[op.index()]
    }

    fn coverage(&self) -> (usize, usize) {
        (
            self.results.iter().filter(|h| h.is_some()).count(),
            self.operands.iter().filter(|h| h.is_some()).count(),
        )
    }
}

/// All six handler families.
pub(crate) struct DispatchTables {
    pub(crate) promote_int: HandlerSet<One>,
    pub(crate) expand_int: HandlerSet<Two>,
    pub(crate) promote_float: HandlerSet<One>,
    pub(crate) expand_float: HandlerSet<Two>,
    pub(crate) scalarize: HandlerSet<One>,
    pub(crate) split: HandlerSet<Two>,
}

impl DispatchTables {
    pub(crate) fn new() -> Self {
        let tables = Self {
            promote_int: HandlerSet::build(promote_int::result_handler, promote_int::operand_handler),
            expand_int: HandlerSet::build(expand_int::result_handler, expand_int::operand_handler),
            promote_float: HandlerSet::build(
                promote_float::result_handler,
                promote_float::operand_handler,
            ),
            expand_float: HandlerSet::build(
                expand_float::result_handler,
                expand_float::operand_handler,
            ),
            scalarize: HandlerSet::build(scalarize::result_handler, scalarize::operand_handler),
            split: HandlerSet::build(split::result_handler, split::operand_handler),
        };
        tracing::trace!(
            promote_int = ?tables.promote_int.coverage(),
            expand_int = ?tables.expand_int.coverage(),
            promote_float = ?tables.promote_float.coverage(),
            expand_float = ?tables.expand_float.coverage(),
            scalarize = ?tables.scalarize.coverage(),
            split = ?tables.split.coverage(),
            "built dispatch tables"
        );
        tables
    }
}
