//! Type legalization for operation DAGs.
//!
//! Rewrites a [`Dag`] so that every reachable value carries a type the
//! target supports natively. Each illegal type is given one of six
//! [`TypeAction`]s by the [classifier](classify), and every node that
//! produces or consumes such a value is rewritten by the handler family
//! for that action:
//!
//! - **Integer promotion**: narrow integers ride in a wider legal integer.
//! - **Integer expansion**: wide integers become a `(lo, hi)` pair.
//! - **Soft float**: a float without hardware support is carried as its
//!   encoding and operated on by runtime routines.
//! - **Double-double expansion**: a 128-bit `ppc_fp128` value becomes a
//!   pair of `f64`s.
//! - **Scalarization**: a one-element vector becomes its element.
//! - **Splitting**: longer vectors become leading and trailing halves.
//!
//! # Design
//!
//! The driver walks the graph in dependency order. When a node is visited
//! its illegal results are rewritten first, then its illegal operands.
//! Rewritten values are recorded in per-action redirect tables rather
//! than patched into users straight away, so consumers look up the parts
//! of an operand on demand. A value replaced outright is recorded too, and
//! later lookups follow the replacement chain.
//!
//! Handlers are plain functions selected by an exhaustive match on the
//! opcode, one table per action, built once per pass. A missing rule is a
//! [`LegalizeError::UnhandledOperation`], never a silent pass-through.

pub mod classify;
mod dispatch;
pub mod error;
mod expand_float;
mod expand_int;
mod legalizer;
mod promote_float;
mod promote_int;
mod scalarize;
mod split;
mod tables;

#[cfg(test)]
mod test_helpers;

use dag_ir::{Dag, TargetLowering};

use legalizer::Legalizer;

pub use classify::{classify, ActionCounts, TypeAction, TypeClassifier};
pub use error::{LegalizeError, Position};

/// Pass options.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LegalizeConfig {
    /// Check, after the rewrite, that every reachable node was processed
    /// and that no illegal type survived.
    pub verify: bool,
    /// Remove unreachable nodes before and after the rewrite.
    pub remove_dead_nodes: bool,
}

impl Default for LegalizeConfig {
    fn default() -> Self {
        LegalizeConfig {
            verify: true,
            remove_dead_nodes: true,
        }
    }
}

impl LegalizeConfig {
    #[must_use]
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    #[must_use]
    pub fn with_remove_dead_nodes(mut self, remove: bool) -> Self {
        self.remove_dead_nodes = remove;
        self
    }
}

/// What a pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LegalizeStats {
    /// Nodes taken off the worklist.
    pub visited: usize,
    /// Nodes added to the graph.
    pub created: usize,
    /// Values replaced by another value.
    pub replacements: usize,
    /// Illegal results dispatched, per action.
    pub results: ActionCounts,
    /// Illegal operands dispatched, per action.
    pub operands: ActionCounts,
    /// Nodes removed as unreachable.
    pub dead_removed: usize,
}

impl LegalizeStats {
    /// Whether the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.replacements == 0 && self.results.total() == 0
    }
}

/// Legalize every type in `dag` for `target`, with default options.
///
/// On error the graph is left partially rewritten and must be discarded.
pub fn legalize_types(
    dag: &mut Dag,
    target: &dyn TargetLowering,
) -> Result<LegalizeStats, LegalizeError> {
    legalize_types_with(dag, target, LegalizeConfig::default())
}

/// As [`legalize_types`], with explicit options.
pub fn legalize_types_with(
    dag: &mut Dag,
    target: &dyn TargetLowering,
    config: LegalizeConfig,
) -> Result<LegalizeStats, LegalizeError> {
    Legalizer::new(dag, target, config).run()
}
