//! Lowering helpers shared by every handler family: routine calls, stack
//! round trips, element addressing and the generic call/return rules.

use smallvec::SmallVec;

use dag_ir::{CondCode, Libcall, MemInfo, NodeId, Opcode, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandAction};
use crate::error::LegalizeError;
use crate::tables::{Pair, Single};

use super::Legalizer;

/// Alignment of spill slots: the natural alignment of the value, capped
/// at 16 bytes.
fn spill_align(bytes: u32) -> u32 {
    bytes.max(1).next_power_of_two().min(16)
}

impl Legalizer<'_> {
    /// Call `call` with `args` and return its single result of type
    /// `result`. Fails when the target has no symbol for the routine.
    pub(crate) fn make_libcall(
        &mut self,
        call: Libcall,
        args: &[ValueRef],
        result: ValueType,
    ) -> Result<ValueRef, LegalizeError> {
        let Some(symbol) = self.target.libcall_name(call) else {
            tracing::debug!(routine = ?call, "target has no routine");
            return Err(self.unhandled());
        };
        tracing::trace!(%symbol, args = args.len(), "routine call");
        Ok(self.dag.call(call, symbol, args, &[result]).value(0))
    }

    /// Store `v` to a fresh stack object big enough for `v` and for a
    /// later read of `reload`. Returns `(chain, address)`.
    pub(crate) fn spill(&mut self, v: ValueRef, reload: ValueType) -> (ValueRef, ValueRef) {
        let vt = self.value_type(v);
        let bytes = vt.store_bytes().max(reload.store_bytes());
        let align = spill_align(bytes);
        let slot = self.dag.create_stack_object(bytes, align);
        let ptr = self.dag.frame_index(self.target.pointer_type(), slot);
        let entry = self.dag.entry_chain();
        let chain = self
            .dag
            .store(entry, v, ptr, MemInfo::new(vt).with_align(align));
        (chain, ptr)
    }

    /// Reinterpret `v` as `dest` through memory.
    pub(crate) fn stack_round_trip(&mut self, v: ValueRef, dest: ValueType) -> ValueRef {
        let (chain, ptr) = self.spill(v, dest);
        self.dag.load(dest, chain, ptr, MemInfo::new(dest)).value(0)
    }

    /// Address of element `idx` of a `vec_vt` vector stored at `base`.
    ///
    /// The index is clamped into range first so a runtime index can never
    /// address outside the slot.
    pub(crate) fn vector_element_pointer(
        &mut self,
        base: ValueRef,
        vec_vt: ValueType,
        idx: ValueRef,
    ) -> Result<ValueRef, LegalizeError> {
        let elem_bits = vec_vt.scalar_type().bits();
        if elem_bits % 8 != 0 {
            return Err(self.unhandled());
        }
        let count = u128::from(vec_vt.element_count());
        let idx_vt = self.value_type(idx);
        let clamped = if count.is_power_of_two() {
            let mask = self.dag.constant(idx_vt, count - 1);
            self.dag.binary(Opcode::And, idx_vt, idx, mask)
        } else {
            let limit = self.dag.constant(idx_vt, count);
            let last = self.dag.constant(idx_vt, count - 1);
            let cc_vt = self.setcc_type(idx_vt);
            let in_range = self.dag.setcc(cc_vt, idx, limit, CondCode::Ult);
            self.dag.select(idx_vt, in_range, idx, last)
        };
        let ptr_vt = self.target.pointer_type();
        let offset = self.dag.zext_or_trunc(clamped, ptr_vt);
        let scale = self.dag.constant(ptr_vt, u128::from(elem_bits / 8));
        let offset = self.dag.binary(Opcode::Mul, ptr_vt, offset, scale);
        Ok(self.dag.binary(Opcode::Add, ptr_vt, base, offset))
    }

    /// The legal values standing for `v`, in bit order (lowest first).
    pub(crate) fn legalized_parts(
        &mut self,
        v: ValueRef,
    ) -> Result<SmallVec<[ValueRef; 2]>, LegalizeError> {
        let parts = match self.value_action(v)? {
            TypeAction::Legal => SmallVec::from_slice(&[v]),
            TypeAction::PromoteInteger => SmallVec::from_slice(&[self.promoted_int(v)?]),
            TypeAction::PromoteFloat => SmallVec::from_slice(&[self.promoted_float(v)?]),
            TypeAction::ScalarizeVector => SmallVec::from_slice(&[self.scalarized(v)?]),
            TypeAction::ExpandInteger => {
                let (lo, hi) = self.expanded_int(v)?;
                SmallVec::from_slice(&[lo, hi])
            }
            // The leading double occupies the low half of the encoding.
            TypeAction::ExpandFloat => {
                let (lo, hi) = self.expanded_float(v)?;
                SmallVec::from_slice(&[hi, lo])
            }
            TypeAction::SplitVector => {
                let (lo, hi) = self.split_parts(v)?;
                SmallVec::from_slice(&[lo, hi])
            }
        };
        Ok(parts)
    }

    /// Types of [`legalized_parts`](Self::legalized_parts) for a value of
    /// type `vt`.
    pub(crate) fn part_types(
        &mut self,
        vt: ValueType,
    ) -> Result<SmallVec<[ValueType; 2]>, LegalizeError> {
        let types = match self.action(vt)? {
            TypeAction::Legal => SmallVec::from_slice(&[vt]),
            TypeAction::PromoteInteger | TypeAction::PromoteFloat => {
                SmallVec::from_slice(&[self.transform(vt)])
            }
            TypeAction::ScalarizeVector => SmallVec::from_slice(&[vt.scalar_type()]),
            TypeAction::ExpandInteger | TypeAction::ExpandFloat => {
                let half = self.transform(vt);
                SmallVec::from_slice(&[half, half])
            }
            TypeAction::SplitVector => {
                let Some(v) = vt.as_vector() else {
                    return Err(self.unhandled());
                };
                let (lo, hi) = v.split_halves();
                SmallVec::from_slice(&[lo.into(), hi.into()])
            }
        };
        Ok(types)
    }
}

// ── Calls and returns ───────────────────────────────────────────────

/// Re-issue a call with every result replaced by its legal parts.
///
/// All result slots are handled in one go, whichever slot triggered the
/// dispatch.
pub(crate) fn call_results<T>(
    lz: &mut Legalizer<'_>,
    n: NodeId,
    _slot: u32,
) -> Result<Lowered<T>, LegalizeError> {
    let node = lz.dag[n].clone();
    let mut results: SmallVec<[ValueType; 4]> = SmallVec::new();
    let mut layout: SmallVec<[(TypeAction, u32); 2]> = SmallVec::new();
    for vt in &node.results {
        let action = lz.action(*vt)?;
        layout.push((action, results.len() as u32));
        results.extend(lz.part_types(*vt)?);
    }
    let call = lz
        .dag
        .create_node(Opcode::Call, &node.operands, &results, node.payload.clone());

    for (slot, (action, first)) in layout.into_iter().enumerate() {
        let from = n.value(slot as u32);
        let part = |k: u32| call.value(first + k);
        match action {
            TypeAction::Legal => lz.replace_value_with(from, part(0))?,
            TypeAction::PromoteInteger => lz.set_single(Single::PromotedInt, from, part(0))?,
            TypeAction::PromoteFloat => lz.set_single(Single::PromotedFloat, from, part(0))?,
            TypeAction::ScalarizeVector => lz.set_single(Single::Scalarized, from, part(0))?,
            TypeAction::ExpandInteger => {
                lz.set_pair(Pair::ExpandedInt, from, (part(0), part(1)))?;
            }
            TypeAction::ExpandFloat => {
                lz.set_pair(Pair::ExpandedFloat, from, (part(1), part(0)))?;
            }
            TypeAction::SplitVector => lz.set_pair(Pair::Split, from, (part(0), part(1)))?,
        }
    }
    Ok(Lowered::Done)
}

/// Replace operand `i` by its legal parts, in place. Used by returns and
/// calls, whose consumers reassemble values from consecutive operands.
pub(crate) fn splice_operand(
    lz: &mut Legalizer<'_>,
    n: NodeId,
    i: usize,
) -> Result<OperandAction, LegalizeError> {
    let v = lz.operand(n, i);
    let parts = lz.legalized_parts(v)?;
    let old = &lz.dag[n].operands;
    let mut operands: SmallVec<[ValueRef; 8]> = SmallVec::with_capacity(old.len() + 1);
    operands.extend_from_slice(&old[..i]);
    operands.extend_from_slice(&parts);
    operands.extend_from_slice(&old[i + 1..]);
    lz.dag.set_operands(n, &operands);
    Ok(OperandAction::UpdatedInPlace)
}
