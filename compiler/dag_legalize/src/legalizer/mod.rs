//! The type legalization pass: readiness tracking and the worklist loop.
//!
//! # Scheduling
//!
//! Every node carries a [`NodeState`]. A node becomes `Ready` once every
//! operand's producer is `Processed`, so a handler always sees operands
//! whose legalized forms are already recorded. Nodes created by handlers
//! start `New`; they are analysed (pending count computed, operands
//! remapped through the replacement map) as soon as they are recorded in
//! a table or become the target of a replacement.
//!
//! A visit inspects results before operands:
//!
//! 1. every illegal result slot not yet recorded is dispatched to the
//!    result handler of its action; if any ran, the node is finished;
//! 2. otherwise the first illegal operand is dispatched to the operand
//!    handler of its action. A handler that rewrites the node in place
//!    sends it back through analysis, so later operands are handled on a
//!    later visit;
//! 3. a node with nothing illegal is finished directly.
//!
//! Finishing a node marks it `Processed` and decrements its users.

mod common;

use smallvec::SmallVec;

use dag_ir::{Dag, NodeId, Opcode, TargetLowering, ValueRef, ValueType};

use crate::classify::{TypeAction, TypeClassifier};
use crate::dispatch::{DispatchTables, Lowered, OperandAction};
use crate::error::{LegalizeError, Position};
use crate::tables::{Pair, RedirectTables, Single};
use crate::{LegalizeConfig, LegalizeStats};

pub(crate) use common::{call_results, splice_operand};

/// Scheduling state of one node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeState {
    /// Waiting on this many operand slots whose producers are not yet
    /// processed.
    Unprocessed(u32),
    /// On the worklist.
    Ready,
    /// Created during the pass and not yet analysed.
    New,
    Processed,
}

/// Pass context: the graph, the target and all per-pass bookkeeping.
pub(crate) struct Legalizer<'a> {
    pub(crate) dag: &'a mut Dag,
    pub(crate) target: &'a dyn TargetLowering,
    classifier: TypeClassifier<'a>,
    config: LegalizeConfig,
    dispatch: DispatchTables,
    tables: RedirectTables,
    states: Vec<NodeState>,
    worklist: Vec<NodeId>,
    /// Dispatch in progress, for error reports.
    current: Option<(TypeAction, Opcode, Position)>,
    stats: LegalizeStats,
}

impl<'a> Legalizer<'a> {
    pub(crate) fn new(
        dag: &'a mut Dag,
        target: &'a dyn TargetLowering,
        config: LegalizeConfig,
    ) -> Self {
        Self {
            dag,
            target,
            classifier: TypeClassifier::new(target),
            config,
            dispatch: DispatchTables::new(),
            tables: RedirectTables::new(),
            states: Vec::new(),
            worklist: Vec::new(),
            current: None,
            stats: LegalizeStats::default(),
        }
    }

    /// Run the pass to completion.
    pub(crate) fn run(mut self) -> Result<LegalizeStats, LegalizeError> {
        let start_bound = self.dag.id_bound();
        tracing::debug!(nodes = self.dag.live_count(), "type legalization start");

        if self.config.remove_dead_nodes {
            self.stats.dead_removed += self.dag.remove_dead_nodes();
        }
        self.seed();

        while let Some(n) = self.worklist.pop() {
            self.visit(n)?;
        }

        self.stats.created = self.dag.id_bound() - start_bound;
        if self.config.remove_dead_nodes {
            self.stats.dead_removed += self.dag.remove_dead_nodes();
        }
        if self.config.verify {
            self.verify()?;
        }

        tracing::debug!(
            visited = self.stats.visited,
            created = self.stats.created,
            replacements = self.stats.replacements,
            promoted_int = self.tables.single_len(Single::PromotedInt),
            expanded_int = self.tables.pair_len(Pair::ExpandedInt),
            promoted_float = self.tables.single_len(Single::PromotedFloat),
            expanded_float = self.tables.pair_len(Pair::ExpandedFloat),
            scalarized = self.tables.single_len(Single::Scalarized),
            split = self.tables.pair_len(Pair::Split),
            replaced = self.tables.replaced_len(),
            live = self.dag.live_count(),
            "type legalization done"
        );
        Ok(self.stats)
    }

    // ── Readiness ───────────────────────────────────────────────────

    fn state(&self, id: NodeId) -> NodeState {
        self.states
            .get(id.index())
            .copied()
            .unwrap_or(NodeState::New)
    }

    fn set_state(&mut self, id: NodeId, state: NodeState) {
        if self.states.len() <= id.index() {
            self.states.resize(id.index() + 1, NodeState::New);
        }
        self.states[id.index()] = state;
    }

    /// Leaves start ready; everything else waits on its operands.
    fn seed(&mut self) {
        self.states = vec![NodeState::New; self.dag.id_bound()];
        let ids: Vec<NodeId> = self.dag.node_ids().collect();
        for id in ids {
            let pending = self.dag[id].operands.len() as u32;
            if pending == 0 {
                self.set_state(id, NodeState::Ready);
                self.worklist.push(id);
            } else {
                self.set_state(id, NodeState::Unprocessed(pending));
            }
        }
    }

    fn mark_processed(&mut self, n: NodeId) -> Result<(), LegalizeError> {
        self.set_state(n, NodeState::Processed);
        let users: SmallVec<[NodeId; 8]> = self.dag.uses(n).iter().map(|u| u.user).collect();
        for user in users {
            match self.state(user) {
                NodeState::New => {}
                NodeState::Unprocessed(1) => {
                    self.set_state(user, NodeState::Ready);
                    self.worklist.push(user);
                }
                NodeState::Unprocessed(k) if k > 1 => {
                    self.set_state(user, NodeState::Unprocessed(k - 1));
                }
                _ => {
                    return Err(LegalizeError::invariant(
                        "user was scheduled before its operand was processed",
                        user.value(0),
                    ))
                }
            }
        }
        Ok(())
    }

    /// Compute the pending count of a `New` node, analysing `New` operands
    /// first and redirecting operands that were replaced.
    fn analyze_new_node(&mut self, n: NodeId) -> Result<(), LegalizeError> {
        if self.state(n) != NodeState::New {
            return Ok(());
        }
        let operands = self.dag[n].operands.clone();
        let mut remapped = operands.clone();
        let mut changed = false;
        let mut pending = 0u32;
        for (i, op) in operands.iter().enumerate() {
            self.analyze_new_node(op.node)?;
            let current = self.tables.remap(*op);
            if current != *op {
                self.analyze_new_node(current.node)?;
                remapped[i] = current;
                changed = true;
            }
            if self.state(current.node) != NodeState::Processed {
                pending += 1;
            }
        }
        if changed {
            self.dag.set_operands(n, &remapped);
        }
        if pending == 0 {
            self.set_state(n, NodeState::Ready);
            self.worklist.push(n);
        } else {
            self.set_state(n, NodeState::Unprocessed(pending));
        }
        Ok(())
    }

    /// Analyse the node of `v` and return what `v` now stands for.
    fn analyze_new_value(&mut self, v: ValueRef) -> Result<ValueRef, LegalizeError> {
        self.analyze_new_node(v.node)?;
        Ok(self.tables.remap(v))
    }

    // ── Main loop ───────────────────────────────────────────────────

    fn visit(&mut self, n: NodeId) -> Result<(), LegalizeError> {
        if self.state(n) != NodeState::Ready {
            return Err(LegalizeError::invariant(
                "node left the worklist without being ready",
                n.value(0),
            ));
        }
        self.stats.visited += 1;
        tracing::trace!(node = %self.dag.display(n), "visit");

        if self.legalize_results(n)? {
            return self.mark_processed(n);
        }
        if self.legalize_operands(n)? {
            self.mark_processed(n)?;
        }
        Ok(())
    }

    /// Returns whether any result handler ran.
    fn legalize_results(&mut self, n: NodeId) -> Result<bool, LegalizeError> {
        let opcode = self.dag[n].opcode;
        let count = self.dag[n].results.len() as u32;
        let mut handled = false;
        for slot in 0..count {
            let v = n.value(slot);
            let action = self.value_action(v)?;
            if action == TypeAction::Legal || self.tables.contains(v) {
                continue;
            }
            self.stats.results.record(action);
            self.current = Some((action, opcode, Position::Result(slot)));
            tracing::trace!(value = %v, %opcode, action = action.name(), "legalize result");
            self.dispatch_result(n, slot, action)?;
            handled = true;
        }
        self.current = None;
        Ok(handled)
    }

    fn dispatch_result(
        &mut self,
        n: NodeId,
        slot: u32,
        action: TypeAction,
    ) -> Result<(), LegalizeError> {
        let opcode = self.dag[n].opcode;
        let v = n.value(slot);
        let d = &self.dispatch;
        match action {
            TypeAction::Legal => Ok(()),
            TypeAction::PromoteInteger => {
                let h = d.promote_int.result(opcode).ok_or_else(|| self.unhandled())?;
                let out = h(self, n, slot)?;
                self.finish_single(Single::PromotedInt, v, out)
            }
            TypeAction::PromoteFloat => {
                let h = d.promote_float.result(opcode).ok_or_else(|| self.unhandled())?;
                let out = h(self, n, slot)?;
                self.finish_single(Single::PromotedFloat, v, out)
            }
            TypeAction::ScalarizeVector => {
                let h = d.scalarize.result(opcode).ok_or_else(|| self.unhandled())?;
                let out = h(self, n, slot)?;
                self.finish_single(Single::Scalarized, v, out)
            }
            TypeAction::ExpandInteger => {
                let h = d.expand_int.result(opcode).ok_or_else(|| self.unhandled())?;
                let out = h(self, n, slot)?;
                self.finish_pair(Pair::ExpandedInt, v, out)
            }
            TypeAction::ExpandFloat => {
                let h = d.expand_float.result(opcode).ok_or_else(|| self.unhandled())?;
                let out = h(self, n, slot)?;
                self.finish_pair(Pair::ExpandedFloat, v, out)
            }
            TypeAction::SplitVector => {
                let h = d.split.result(opcode).ok_or_else(|| self.unhandled())?;
                let out = h(self, n, slot)?;
                self.finish_pair(Pair::Split, v, out)
            }
        }
    }

    fn finish_single(
        &mut self,
        table: Single,
        v: ValueRef,
        out: Lowered<ValueRef>,
    ) -> Result<(), LegalizeError> {
        match out {
            Lowered::Parts(p) => self.set_single(table, v, p),
            Lowered::Replaced(to) => self.replace_value_with(v, to),
            Lowered::Done => Ok(()),
        }
    }

    fn finish_pair(
        &mut self,
        table: Pair,
        v: ValueRef,
        out: Lowered<(ValueRef, ValueRef)>,
    ) -> Result<(), LegalizeError> {
        match out {
            Lowered::Parts(parts) => self.set_pair(table, v, parts),
            Lowered::Replaced(to) => self.replace_value_with(v, to),
            Lowered::Done => Ok(()),
        }
    }

    /// Returns whether the node is finished.
    fn legalize_operands(&mut self, n: NodeId) -> Result<bool, LegalizeError> {
        let opcode = self.dag[n].opcode;
        let count = self.dag[n].operands.len();
        for i in 0..count {
            let v = self.dag.operand(n, i);
            let action = self.value_action(v)?;
            if action == TypeAction::Legal {
                continue;
            }
            self.stats.operands.record(action);
            self.current = Some((action, opcode, Position::Operand(i)));
            tracing::trace!(node = %n, operand = i, %opcode, action = action.name(), "legalize operand");

            let d = &self.dispatch;
            let handler = match action {
                TypeAction::Legal => None,
                TypeAction::PromoteInteger => d.promote_int.operand(opcode),
                TypeAction::ExpandInteger => d.expand_int.operand(opcode),
                TypeAction::PromoteFloat => d.promote_float.operand(opcode),
                TypeAction::ExpandFloat => d.expand_float.operand(opcode),
                TypeAction::ScalarizeVector => d.scalarize.operand(opcode),
                TypeAction::SplitVector => d.split.operand(opcode),
            };
            let handler = handler.ok_or_else(|| self.unhandled())?;
            let outcome = handler(self, n, i)?;
            self.current = None;
            return match outcome {
                OperandAction::UpdatedInPlace => {
                    self.set_state(n, NodeState::New);
                    self.analyze_new_node(n)?;
                    Ok(false)
                }
                OperandAction::Replace(to) => {
                    self.replace_node_value(n, to)?;
                    Ok(true)
                }
                OperandAction::Done => Ok(true),
            };
        }
        Ok(true)
    }

    fn verify(&mut self) -> Result<(), LegalizeError> {
        for id in self.dag.topological_order() {
            if self.state(id) != NodeState::Processed {
                return Err(LegalizeError::invariant(
                    "reachable node was never processed",
                    id.value(0),
                ));
            }
            let results = self.dag[id].results.len() as u32;
            for slot in 0..results {
                if self.value_action(id.value(slot))? != TypeAction::Legal {
                    return Err(LegalizeError::invariant(
                        "illegal result survived legalization",
                        id.value(slot),
                    ));
                }
            }
            let operands = self.dag[id].operands.clone();
            for op in operands {
                if self.value_action(op)? != TypeAction::Legal {
                    return Err(LegalizeError::invariant(
                        "illegal operand survived legalization",
                        op,
                    ));
                }
            }
        }
        Ok(())
    }

    // ── Table access for handlers ───────────────────────────────────

    pub(crate) fn set_single(
        &mut self,
        table: Single,
        v: ValueRef,
        to: ValueRef,
    ) -> Result<(), LegalizeError> {
        let to = self.analyze_new_value(to)?;
        if self.tables.set_single(table, v, to) {
            Ok(())
        } else {
            Err(LegalizeError::invariant("value legalized twice", v))
        }
    }

    pub(crate) fn set_pair(
        &mut self,
        table: Pair,
        v: ValueRef,
        (lo, hi): (ValueRef, ValueRef),
    ) -> Result<(), LegalizeError> {
        let lo = self.analyze_new_value(lo)?;
        let hi = self.analyze_new_value(hi)?;
        if self.tables.set_pair(table, v, (lo, hi)) {
            Ok(())
        } else {
            Err(LegalizeError::invariant("value legalized twice", v))
        }
    }

    fn single(&mut self, table: Single, v: ValueRef) -> Result<ValueRef, LegalizeError> {
        self.tables
            .get_single(table, v)
            .ok_or_else(|| LegalizeError::invariant("no legalized form recorded", v))
    }

    fn pair(&mut self, table: Pair, v: ValueRef) -> Result<(ValueRef, ValueRef), LegalizeError> {
        self.tables
            .get_pair(table, v)
            .ok_or_else(|| LegalizeError::invariant("no legalized parts recorded", v))
    }

    pub(crate) fn promoted_int(&mut self, v: ValueRef) -> Result<ValueRef, LegalizeError> {
        self.single(Single::PromotedInt, v)
    }

    pub(crate) fn promoted_float(&mut self, v: ValueRef) -> Result<ValueRef, LegalizeError> {
        self.single(Single::PromotedFloat, v)
    }

    pub(crate) fn scalarized(&mut self, v: ValueRef) -> Result<ValueRef, LegalizeError> {
        self.single(Single::Scalarized, v)
    }

    /// `(lo, hi)` limbs, low-order first.
    pub(crate) fn expanded_int(
        &mut self,
        v: ValueRef,
    ) -> Result<(ValueRef, ValueRef), LegalizeError> {
        self.pair(Pair::ExpandedInt, v)
    }

    /// `(lo, hi)` where `hi` is the leading double.
    pub(crate) fn expanded_float(
        &mut self,
        v: ValueRef,
    ) -> Result<(ValueRef, ValueRef), LegalizeError> {
        self.pair(Pair::ExpandedFloat, v)
    }

    /// `(lo, hi)` halves, leading elements first.
    pub(crate) fn split_parts(
        &mut self,
        v: ValueRef,
    ) -> Result<(ValueRef, ValueRef), LegalizeError> {
        self.pair(Pair::Split, v)
    }

    // ── Replacement ─────────────────────────────────────────────────

    /// Redirect every use of `from` to `to` and remember the redirection.
    pub(crate) fn replace_value_with(
        &mut self,
        from: ValueRef,
        to: ValueRef,
    ) -> Result<(), LegalizeError> {
        let to = self.analyze_new_value(to)?;
        if !self.tables.record_replacement(from, to) {
            return Err(LegalizeError::invariant("replacement would form a cycle", from));
        }
        let users = self.dag.replace_all_uses_of_value_with(from, to);
        for user in users {
            if matches!(self.state(user), NodeState::Ready | NodeState::Processed) {
                return Err(LegalizeError::invariant(
                    "replaced value was already consumed",
                    from,
                ));
            }
            self.set_state(user, NodeState::New);
            self.analyze_new_node(user)?;
        }
        self.stats.replacements += 1;
        Ok(())
    }

    /// Redirect each result of `from` to the same slot of `to`.
    pub(crate) fn replace_node_with(&mut self, from: NodeId, to: NodeId) -> Result<(), LegalizeError> {
        let count = self.dag[from].results.len() as u32;
        for slot in 0..count {
            self.replace_value_with(from.value(slot), to.value(slot))?;
        }
        Ok(())
    }

    fn replace_node_value(&mut self, n: NodeId, to: ValueRef) -> Result<(), LegalizeError> {
        if self.dag[n].results.len() == 1 {
            self.replace_value_with(n.value(0), to)
        } else {
            self.replace_node_with(n, to.node)
        }
    }

    // ── Queries for handlers ────────────────────────────────────────

    pub(crate) fn action(&mut self, vt: ValueType) -> Result<TypeAction, LegalizeError> {
        self.classifier.action(vt)
    }

    pub(crate) fn value_action(&mut self, v: ValueRef) -> Result<TypeAction, LegalizeError> {
        let vt = self.dag.value_type(v);
        self.action(vt)
    }

    /// Type `vt` is rewritten to.
    #[inline]
    pub(crate) fn transform(&self, vt: ValueType) -> ValueType {
        self.target.transform_to(vt)
    }

    #[inline]
    pub(crate) fn value_type(&self, v: ValueRef) -> ValueType {
        self.dag.value_type(v)
    }

    #[inline]
    pub(crate) fn operand(&self, n: NodeId, i: usize) -> ValueRef {
        self.dag.operand(n, i)
    }

    #[inline]
    pub(crate) fn result_type(&self, n: NodeId, slot: u32) -> ValueType {
        self.dag[n].result_type(slot)
    }

    #[inline]
    pub(crate) fn setcc_type(&self, operand: ValueType) -> ValueType {
        self.target.setcc_result_type(operand)
    }

    /// Bits of `v` if it is an integer constant.
    pub(crate) fn constant_value(&self, v: ValueRef) -> Option<u128> {
        let node = &self.dag[v.node];
        match node.opcode {
            Opcode::Constant => node.payload.bits(),
            _ => None,
        }
    }

    /// Pointer-typed constant, used for shift amounts and indices.
    pub(crate) fn index_constant(&mut self, value: u64) -> ValueRef {
        let vt = self.target.pointer_type();
        self.dag.constant(vt, u128::from(value))
    }

    /// Error for the dispatch in progress having no rule.
    pub(crate) fn unhandled(&self) -> LegalizeError {
        match self.current {
            Some((action, opcode, position)) => LegalizeError::UnhandledOperation {
                action,
                opcode,
                position,
            },
            None => LegalizeError::invariant(
                "handler ran outside a dispatch",
                self.dag.entry_chain(),
            ),
        }
    }
}

#[cfg(test)]
mod tests;
