//! Node construction helpers.
//!
//! Thin wrappers over [`Dag::create_node`] that fill in result types and
//! payloads for each opcode, plus a few width-adjusting conveniences.

use std::cmp::Ordering;

use smallvec::SmallVec;

use crate::limbs;
use crate::opcode::{CondCode, Libcall, MemInfo, Opcode};
use crate::types::ValueType;

use super::{Dag, NodeId, Payload, Routine, ValueRef};

impl Dag {
    // ── Leaves ──────────────────────────────────────────────────────

    /// Integer constant; bits above the width are discarded.
    pub fn constant(&mut self, vt: ValueType, value: u128) -> ValueRef {
        let bits = limbs::truncate(value, vt.bits());
        self.create_node(Opcode::Constant, &[], &[vt], Payload::Bits(bits))
            .value(0)
    }

    /// Float constant from its encoding.
    pub fn constant_fp(&mut self, vt: ValueType, encoding: u128) -> ValueRef {
        let bits = limbs::truncate(encoding, vt.bits());
        self.create_node(Opcode::ConstantFp, &[], &[vt], Payload::Bits(bits))
            .value(0)
    }

    pub fn undef(&mut self, vt: ValueType) -> ValueRef {
        self.create_node(Opcode::Undef, &[], &[vt], Payload::None)
            .value(0)
    }

    /// Bits `[offset, offset + width)` of argument `index`.
    pub fn argument(&mut self, vt: ValueType, index: u32, offset: u32) -> ValueRef {
        self.create_node(
            Opcode::Argument,
            &[],
            &[vt],
            Payload::Argument { index, offset },
        )
        .value(0)
    }

    /// Address of stack object `slot`.
    pub fn frame_index(&mut self, ptr_vt: ValueType, slot: u32) -> ValueRef {
        self.create_node(Opcode::FrameIndex, &[], &[ptr_vt], Payload::Frame(slot))
            .value(0)
    }

    // ── Arithmetic ──────────────────────────────────────────────────

    pub fn unary(&mut self, op: Opcode, vt: ValueType, a: ValueRef) -> ValueRef {
        self.create_node(op, &[a], &[vt], Payload::None).value(0)
    }

    pub fn binary(&mut self, op: Opcode, vt: ValueType, a: ValueRef, b: ValueRef) -> ValueRef {
        self.create_node(op, &[a, b], &[vt], Payload::None).value(0)
    }

    /// Carry-producing arithmetic: results are `(value, Flag)`.
    pub fn carry_op(
        &mut self,
        op: Opcode,
        vt: ValueType,
        a: ValueRef,
        b: ValueRef,
        carry_in: Option<ValueRef>,
    ) -> NodeId {
        let operands: SmallVec<[ValueRef; 3]> = match carry_in {
            Some(c) => SmallVec::from_slice(&[a, b, c]),
            None => SmallVec::from_slice(&[a, b]),
        };
        self.create_node(op, &operands, &[vt, ValueType::Flag], Payload::None)
    }

    pub fn setcc(&mut self, vt: ValueType, a: ValueRef, b: ValueRef, cc: CondCode) -> ValueRef {
        self.create_node(Opcode::SetCc, &[a, b], &[vt], Payload::Cond(cc))
            .value(0)
    }

    pub fn select(
        &mut self,
        vt: ValueType,
        cond: ValueRef,
        if_true: ValueRef,
        if_false: ValueRef,
    ) -> ValueRef {
        self.create_node(Opcode::Select, &[cond, if_true, if_false], &[vt], Payload::None)
            .value(0)
    }

    pub fn sign_extend_inreg(&mut self, vt: ValueType, a: ValueRef, from: ValueType) -> ValueRef {
        self.create_node(Opcode::SignExtendInReg, &[a], &[vt], Payload::InRegType(from))
            .value(0)
    }

    /// Clear every bit of `a` above the width of `from`.
    pub fn zero_extend_inreg(&mut self, a: ValueRef, from: ValueType) -> ValueRef {
        let vt = self.value_type(a);
        let mask = self.constant(vt, limbs::mask(from.bits()));
        self.binary(Opcode::And, vt, a, mask)
    }

    // ── Width adjustment ────────────────────────────────────────────

    fn ext_or_trunc(&mut self, ext: Opcode, a: ValueRef, vt: ValueType) -> ValueRef {
        let from = self.value_type(a);
        match from.bits().cmp(&vt.bits()) {
            Ordering::Less => self.unary(ext, vt, a),
            Ordering::Greater => self.unary(Opcode::Truncate, vt, a),
            Ordering::Equal if from == vt => a,
            Ordering::Equal => self.unary(Opcode::BitCast, vt, a),
        }
    }

    /// Zero-extend or truncate `a` to `vt`; returns `a` when already `vt`.
    pub fn zext_or_trunc(&mut self, a: ValueRef, vt: ValueType) -> ValueRef {
        self.ext_or_trunc(Opcode::ZeroExtend, a, vt)
    }

    pub fn sext_or_trunc(&mut self, a: ValueRef, vt: ValueType) -> ValueRef {
        self.ext_or_trunc(Opcode::SignExtend, a, vt)
    }

    pub fn any_ext_or_trunc(&mut self, a: ValueRef, vt: ValueType) -> ValueRef {
        self.ext_or_trunc(Opcode::AnyExtend, a, vt)
    }

    /// Reinterpret `a` as `vt`, or return it unchanged if already `vt`.
    pub fn bitcast(&mut self, vt: ValueType, a: ValueRef) -> ValueRef {
        if self.value_type(a) == vt {
            a
        } else {
            self.unary(Opcode::BitCast, vt, a)
        }
    }

    /// `ptr + offset` in the pointer's own type.
    pub fn ptr_add(&mut self, ptr: ValueRef, offset: u64) -> ValueRef {
        if offset == 0 {
            return ptr;
        }
        let vt = self.value_type(ptr);
        let off = self.constant(vt, u128::from(offset));
        self.binary(Opcode::Add, vt, ptr, off)
    }

    // ── Pairs ───────────────────────────────────────────────────────

    pub fn build_pair(&mut self, vt: ValueType, lo: ValueRef, hi: ValueRef) -> ValueRef {
        self.create_node(Opcode::BuildPair, &[lo, hi], &[vt], Payload::None)
            .value(0)
    }

    /// Half `part` (0 = low, 1 = high) of `a`.
    pub fn extract_element(&mut self, vt: ValueType, a: ValueRef, part: u32) -> ValueRef {
        self.create_node(Opcode::ExtractElement, &[a], &[vt], Payload::Part(part))
            .value(0)
    }

    // ── Memory and control ──────────────────────────────────────────

    /// Load: result slot 0 is the value, slot 1 the output chain.
    pub fn load(&mut self, vt: ValueType, chain: ValueRef, ptr: ValueRef, mem: MemInfo) -> NodeId {
        self.create_node(
            Opcode::Load,
            &[chain, ptr],
            &[vt, ValueType::Chain],
            Payload::Mem(mem),
        )
    }

    /// Store `value` (truncated to `mem.mem_vt`); returns the output chain.
    pub fn store(
        &mut self,
        chain: ValueRef,
        value: ValueRef,
        ptr: ValueRef,
        mem: MemInfo,
    ) -> ValueRef {
        self.create_node(
            Opcode::Store,
            &[chain, value, ptr],
            &[ValueType::Chain],
            Payload::Mem(mem),
        )
        .value(0)
    }

    /// Join chains; a single chain is returned unchanged.
    pub fn token_factor(&mut self, chains: &[ValueRef]) -> ValueRef {
        if let [only] = chains {
            return *only;
        }
        self.create_node(Opcode::TokenFactor, chains, &[ValueType::Chain], Payload::None)
            .value(0)
    }

    pub fn brcond(&mut self, chain: ValueRef, cond: ValueRef, block: u32) -> ValueRef {
        self.create_node(
            Opcode::BrCond,
            &[chain, cond],
            &[ValueType::Chain],
            Payload::Block(block),
        )
        .value(0)
    }

    /// Return `values`; their types become the declared signature.
    pub fn ret(&mut self, chain: ValueRef, values: &[ValueRef]) -> NodeId {
        let signature = values.iter().map(|v| self.value_type(*v)).collect();
        let mut operands: SmallVec<[ValueRef; 4]> = SmallVec::with_capacity(values.len() + 1);
        operands.push(chain);
        operands.extend_from_slice(values);
        self.create_node(Opcode::Ret, &operands, &[], Payload::Signature(signature))
    }

    /// Call of a software routine.
    pub fn call(
        &mut self,
        libcall: Libcall,
        symbol: String,
        args: &[ValueRef],
        results: &[ValueType],
    ) -> NodeId {
        self.create_node(
            Opcode::Call,
            args,
            results,
            Payload::Routine(Routine { libcall, symbol }),
        )
    }

    // ── Vectors ─────────────────────────────────────────────────────

    pub fn build_vector(&mut self, vt: ValueType, elems: &[ValueRef]) -> ValueRef {
        self.create_node(Opcode::BuildVector, elems, &[vt], Payload::None)
            .value(0)
    }

    pub fn concat_vectors(&mut self, vt: ValueType, parts: &[ValueRef]) -> ValueRef {
        if let [only] = parts {
            return *only;
        }
        self.create_node(Opcode::ConcatVectors, parts, &[vt], Payload::None)
            .value(0)
    }

    pub fn extract_vector_elt(&mut self, vt: ValueType, vec: ValueRef, idx: ValueRef) -> ValueRef {
        self.create_node(Opcode::ExtractVectorElt, &[vec, idx], &[vt], Payload::None)
            .value(0)
    }

    pub fn insert_vector_elt(
        &mut self,
        vt: ValueType,
        vec: ValueRef,
        elt: ValueRef,
        idx: ValueRef,
    ) -> ValueRef {
        self.create_node(
            Opcode::InsertVectorElt,
            &[vec, elt, idx],
            &[vt],
            Payload::None,
        )
        .value(0)
    }

    /// Subvector of type `vt` starting at element `first`; returns `vec`
    /// itself when it already is that subvector.
    pub fn extract_subvector(&mut self, vt: ValueType, vec: ValueRef, first: u32) -> ValueRef {
        if first == 0 && self.value_type(vec) == vt {
            return vec;
        }
        self.create_node(Opcode::ExtractSubvector, &[vec], &[vt], Payload::Part(first))
            .value(0)
    }

    pub fn shuffle(
        &mut self,
        vt: ValueType,
        a: ValueRef,
        b: ValueRef,
        mask: Vec<Option<u32>>,
    ) -> ValueRef {
        self.create_node(Opcode::VectorShuffle, &[a, b], &[vt], Payload::Mask(mask))
            .value(0)
    }

    pub fn reduce_add(&mut self, vt: ValueType, vec: ValueRef) -> ValueRef {
        self.unary(Opcode::VecReduceAdd, vt, vec)
    }
}
