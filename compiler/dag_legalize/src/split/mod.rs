//! Vector splitting: carry a too-wide vector as its leading and trailing
//! halves.
//!
//! # Design
//!
//! The leading half takes the extra element of an odd count, matching
//! [`VectorType::split_halves`](dag_ir::VectorType::split_halves). Halves
//! that are still illegal are split again when their own nodes are
//! visited, so a `2^k`-element vector reaches the legal width after `k`
//! levels without this module recursing.
//!
//! Elementwise operations run once per half. Operations that move lanes
//! (shuffles, concatenation, insertion, extraction, reduction) route each
//! lane to the half that holds it; a runtime index compares against the
//! midpoint and reads both halves.

use smallvec::SmallVec;

use dag_ir::{CondCode, MemInfo, NodeId, Opcode, Payload, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandAction, OperandHandler, ResultHandler};
use crate::error::LegalizeError;
use crate::legalizer::{call_results, splice_operand, Legalizer};

type Halves = (ValueRef, ValueRef);
type Split = Result<Lowered<Halves>, LegalizeError>;
type Outcome = Result<OperandAction, LegalizeError>;

/// `(piece, lane within piece)` for one lane of a possibly split vector.
type Lane = (ValueRef, u32);

pub(crate) fn result_handler(op: Opcode) -> Option<ResultHandler<Halves>> {
    let handler: ResultHandler<Halves> = match op {
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::MulHu
        | Opcode::SDiv
        | Opcode::UDiv
        | Opcode::SRem
        | Opcode::URem
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Sra
        | Opcode::Srl
        | Opcode::Neg
        | Opcode::Ctlz
        | Opcode::Cttz
        | Opcode::Ctpop
        | Opcode::Bswap
        | Opcode::SignExtend
        | Opcode::ZeroExtend
        | Opcode::AnyExtend
        | Opcode::Truncate
        | Opcode::SignExtendInReg
        | Opcode::FpToSint
        | Opcode::FpToUint
        | Opcode::SintToFp
        | Opcode::UintToFp
        | Opcode::FpExtend
        | Opcode::FpRound
        | Opcode::FAdd
        | Opcode::FSub
        | Opcode::FMul
        | Opcode::FDiv
        | Opcode::FNeg
        | Opcode::SetCc
        | Opcode::Select => elementwise,
        Opcode::Undef => undef,
        Opcode::Argument => argument,
        Opcode::Load => load,
        Opcode::BuildVector => build_vector,
        Opcode::ConcatVectors => concat_vectors,
        Opcode::InsertVectorElt => insert_vector_elt,
        Opcode::VectorShuffle => shuffle,
        Opcode::ExtractSubvector => extract_subvector,
        Opcode::BitCast => bitcast,
        Opcode::Call => call_results,
        Opcode::EntryToken
        | Opcode::Constant
        | Opcode::ConstantFp
        | Opcode::FrameIndex
        | Opcode::AddC
        | Opcode::SubC
        | Opcode::AddE
        | Opcode::SubE
        | Opcode::BuildPair
        | Opcode::ExtractElement
        | Opcode::Store
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::Ret
        | Opcode::ExtractVectorElt
        | Opcode::VecReduceAdd => return None,
    };
    Some(handler)
}

pub(crate) fn operand_handler(op: Opcode) -> Option<OperandHandler> {
    let handler: OperandHandler = match op {
        Opcode::Store => store_operand,
        Opcode::ExtractVectorElt => extract_vector_elt_operand,
        Opcode::ExtractSubvector => extract_subvector_operand,
        Opcode::BitCast => bitcast_operand,
        Opcode::VectorShuffle => shuffle_operand,
        Opcode::ConcatVectors => concat_vectors_operand,
        Opcode::VecReduceAdd => reduce_add_operand,
        Opcode::Ret | Opcode::Call => splice_operand,
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::MulHu
        | Opcode::SDiv
        | Opcode::UDiv
        | Opcode::SRem
        | Opcode::URem
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Shl
        | Opcode::Sra
        | Opcode::Srl
        | Opcode::Neg
        | Opcode::Ctlz
        | Opcode::Cttz
        | Opcode::Ctpop
        | Opcode::Bswap
        | Opcode::SignExtend
        | Opcode::ZeroExtend
        | Opcode::AnyExtend
        | Opcode::Truncate
        | Opcode::SignExtendInReg
        | Opcode::FpToSint
        | Opcode::FpToUint
        | Opcode::SintToFp
        | Opcode::UintToFp
        | Opcode::FpExtend
        | Opcode::FpRound
        | Opcode::FAdd
        | Opcode::FSub
        | Opcode::FMul
        | Opcode::FDiv
        | Opcode::FNeg
        | Opcode::SetCc
        | Opcode::Select => elementwise_operand,
        Opcode::EntryToken
        | Opcode::Constant
        | Opcode::ConstantFp
        | Opcode::Undef
        | Opcode::Argument
        | Opcode::FrameIndex
        | Opcode::AddC
        | Opcode::SubC
        | Opcode::AddE
        | Opcode::SubE
        | Opcode::BuildPair
        | Opcode::ExtractElement
        | Opcode::Load
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::BuildVector
        | Opcode::InsertVectorElt => return None,
    };
    Some(handler)
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Leading and trailing half types of vector type `vt`.
fn halves(lz: &Legalizer<'_>, vt: ValueType) -> Result<(ValueType, ValueType), LegalizeError> {
    let Some(v) = vt.as_vector() else {
        return Err(lz.unhandled());
    };
    let (lo, hi) = v.split_halves();
    Ok((lo.into(), hi.into()))
}

/// Operand `i` divided to match a split result. A split operand uses its
/// recorded halves, another vector is cut with subvector extraction and a
/// scalar (shift amount, select condition) feeds both halves.
fn split_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Result<Halves, LegalizeError> {
    let v = lz.operand(n, i);
    let vt = lz.value_type(v);
    if !vt.is_vector() {
        return Ok((v, v));
    }
    if lz.value_action(v)? == TypeAction::SplitVector {
        return lz.split_parts(v);
    }
    let (lo_t, hi_t) = halves(lz, vt)?;
    let lo = lz.dag.extract_subvector(lo_t, v, 0);
    let hi = lz.dag.extract_subvector(hi_t, v, lo_t.element_count());
    Ok((lo, hi))
}

/// The pieces `v` is carried in, with their lane counts.
fn pieces(lz: &mut Legalizer<'_>, v: ValueRef) -> Result<SmallVec<[Lane; 2]>, LegalizeError> {
    if lz.value_action(v)? == TypeAction::SplitVector {
        let (lo, hi) = lz.split_parts(v)?;
        let lo_n = lz.value_type(lo).element_count();
        let hi_n = lz.value_type(hi).element_count();
        return Ok(SmallVec::from_slice(&[(lo, lo_n), (hi, hi_n)]));
    }
    let count = lz.value_type(v).element_count();
    Ok(SmallVec::from_slice(&[(v, count)]))
}

/// Which piece holds `lane`, and where within it.
fn locate(pieces: &[Lane], lane: u32) -> Option<Lane> {
    let mut lane = lane;
    for &(piece, count) in pieces {
        if lane < count {
            return Some((piece, lane));
        }
        lane -= count;
    }
    None
}

/// Every lane of `v`, in order.
fn all_lanes(lz: &mut Legalizer<'_>, v: ValueRef) -> Result<Vec<Lane>, LegalizeError> {
    let mut lanes = Vec::new();
    for (piece, count) in pieces(lz, v)? {
        lanes.extend((0..count).map(|l| (piece, l)));
    }
    Ok(lanes)
}

fn read_lane(lz: &mut Legalizer<'_>, lane: Option<Lane>, elem: ValueType) -> ValueRef {
    match lane {
        Some((piece, l)) => {
            let idx = lz.index_constant(u64::from(l));
            lz.dag.extract_vector_elt(elem, piece, idx)
        }
        None => lz.dag.undef(elem),
    }
}

/// A `vt` vector whose lanes are `lanes`. Lanes drawn from at most two
/// pieces of one type become a single shuffle of those pieces, anything
/// else is assembled element by element.
fn gather_lanes(lz: &mut Legalizer<'_>, vt: ValueType, lanes: &[Option<Lane>]) -> ValueRef {
    let mut sources: SmallVec<[ValueRef; 2]> = SmallVec::new();
    for (piece, _) in lanes.iter().flatten() {
        if !sources.contains(piece) {
            sources.push(*piece);
        }
    }
    let Some(&first) = sources.first() else {
        return lz.dag.undef(vt);
    };
    let first_t = lz.value_type(first);
    let shuffleable =
        sources.len() <= 2 && sources.iter().all(|s| lz.value_type(*s) == first_t);
    if shuffleable {
        let second = sources.get(1).copied().unwrap_or(first);
        let width = first_t.element_count();
        let mask = lanes
            .iter()
            .map(|lane| lane.map(|(piece, l)| if piece == first { l } else { width + l }))
            .collect();
        return lz.dag.shuffle(vt, first, second, mask);
    }
    let elem = vt.scalar_type();
    let elems: SmallVec<[ValueRef; 8]> =
        lanes.iter().map(|lane| read_lane(lz, *lane, elem)).collect();
    lz.dag.build_vector(vt, &elems)
}

/// Lanes selected by a shuffle mask over `a ++ b`.
fn shuffle_lanes(lz: &mut Legalizer<'_>, n: NodeId) -> Result<Vec<Option<Lane>>, LegalizeError> {
    let Some(mask) = lz.dag[n].payload.mask().map(<[_]>::to_vec) else {
        return Err(lz.unhandled());
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    let width = lz.value_type(a).element_count();
    let (a_pieces, b_pieces) = (pieces(lz, a)?, pieces(lz, b)?);
    Ok(mask
        .into_iter()
        .map(|lane| match lane {
            Some(l) if l < width => locate(&a_pieces, l),
            Some(l) => locate(&b_pieces, l - width),
            None => None,
        })
        .collect())
}

/// Byte offset of the trailing half of a `mem_vt` access.
fn trailing_offset(lz: &Legalizer<'_>, lo_mem: ValueType) -> Result<u32, LegalizeError> {
    if lo_mem.bits() % 8 != 0 {
        return Err(lz.unhandled());
    }
    Ok(lo_mem.store_bytes())
}

/// Divide per-lane values of a `lo_t`-led split, rejecting a list that
/// does not cover the whole vector.
fn divide<'a, T>(
    lz: &Legalizer<'_>,
    items: &'a [T],
    lo_t: ValueType,
    hi_t: ValueType,
) -> Result<(&'a [T], &'a [T]), LegalizeError> {
    let lo_n = lo_t.element_count() as usize;
    if items.len() != lo_n + hi_t.element_count() as usize {
        return Err(lz.unhandled());
    }
    Ok(items.split_at(lo_n))
}

fn half_payload(payload: Payload, count: u32) -> Payload {
    match payload {
        Payload::InRegType(from) => {
            Payload::InRegType(from.with_count(count).unwrap_or(from))
        }
        other => other,
    }
}

// ── Results ─────────────────────────────────────────────────────────

fn elementwise(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    Ok(Lowered::Parts(split_node(lz, n, lo_t, hi_t)?))
}

/// The node recomputed once per half, at the half result types.
fn split_node(
    lz: &mut Legalizer<'_>,
    n: NodeId,
    lo_t: ValueType,
    hi_t: ValueType,
) -> Result<Halves, LegalizeError> {
    let (op, count) = (lz.dag[n].opcode, lz.dag[n].operands.len());
    let mut lo_ops: SmallVec<[ValueRef; 3]> = SmallVec::with_capacity(count);
    let mut hi_ops: SmallVec<[ValueRef; 3]> = SmallVec::with_capacity(count);
    for i in 0..count {
        let (lo, hi) = split_operand(lz, n, i)?;
        lo_ops.push(lo);
        hi_ops.push(hi);
    }
    let payload = lz.dag[n].payload.clone();
    let lo_payload = half_payload(payload.clone(), lo_t.element_count());
    let hi_payload = half_payload(payload, hi_t.element_count());
    let lo = lz.dag.create_node(op, &lo_ops, &[lo_t], lo_payload).value(0);
    let hi = lz.dag.create_node(op, &hi_ops, &[hi_t], hi_payload).value(0);
    Ok((lo, hi))
}

fn undef(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let lo = lz.dag.undef(lo_t);
    let hi = lz.dag.undef(hi_t);
    Ok(Lowered::Parts((lo, hi)))
}

fn argument(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let Payload::Argument { index, offset } = lz.dag[n].payload else {
        return Err(lz.unhandled());
    };
    let lo = lz.dag.argument(lo_t, index, offset);
    let hi = lz.dag.argument(hi_t, index, offset + lo_t.bits());
    Ok(Lowered::Parts((lo, hi)))
}

/// Extending loads split the in-memory type alongside the value type.
fn load(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (lo_mem, hi_mem) = halves(lz, mem.mem_vt)?;
    let step = trailing_offset(lz, lo_mem)?;
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 1));
    let lo = lz.dag.load(lo_t, chain, ptr, mem.at_offset(lo_mem, 0));
    let hi_ptr = lz.dag.ptr_add(ptr, u64::from(step));
    let hi = lz.dag.load(hi_t, chain, hi_ptr, mem.at_offset(hi_mem, step));
    let chain = lz.dag.token_factor(&[lo.value(1), hi.value(1)]);
    lz.replace_value_with(n.value(1), chain)?;
    Ok(Lowered::Parts((lo.value(0), hi.value(0))))
}

fn build_vector(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let elems = lz.dag[n].operands.clone();
    let (lo_elems, hi_elems) = divide(lz, &elems, lo_t, hi_t)?;
    let lo = lz.dag.build_vector(lo_t, lo_elems);
    let hi = lz.dag.build_vector(hi_t, hi_elems);
    Ok(Lowered::Parts((lo, hi)))
}

/// An even number of pieces divides between the halves; otherwise a
/// piece straddles the midpoint and the halves are built lane by lane.
fn concat_vectors(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let parts = lz.dag[n].operands.clone();
    if parts.len() % 2 == 0 {
        let (lo_parts, hi_parts) = parts.split_at(parts.len() / 2);
        let lo = lz.dag.concat_vectors(lo_t, lo_parts);
        let hi = lz.dag.concat_vectors(hi_t, hi_parts);
        return Ok(Lowered::Parts((lo, hi)));
    }
    let mut lanes: Vec<Option<Lane>> = Vec::new();
    for part in parts {
        lanes.extend(all_lanes(lz, part)?.into_iter().map(Some));
    }
    let (lo_lanes, hi_lanes) = divide(lz, &lanes, lo_t, hi_t)?;
    let lo = gather_lanes(lz, lo_t, lo_lanes);
    let hi = gather_lanes(lz, hi_t, hi_lanes);
    Ok(Lowered::Parts((lo, hi)))
}

/// A runtime index is offered to both halves, rebased for the trailing
/// one; the half that does not hold it sees an out-of-range index and
/// stays unchanged.
fn insert_vector_elt(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let vt = lz.result_type(n, slot);
    let (lo_t, hi_t) = halves(lz, vt)?;
    let (lo, hi) = split_operand(lz, n, 0)?;
    let (elt, idx) = (lz.operand(n, 1), lz.operand(n, 2));
    let lo_n = lo_t.element_count();
    let ivt = lz.value_type(idx);
    let parts = match lz.constant_value(idx) {
        Some(k) if k < u128::from(lo_n) => (lz.dag.insert_vector_elt(lo_t, lo, elt, idx), hi),
        Some(k) if k < u128::from(vt.element_count()) => {
            let rebased = lz.dag.constant(ivt, k - u128::from(lo_n));
            (lo, lz.dag.insert_vector_elt(hi_t, hi, elt, rebased))
        }
        Some(_) => (lo, hi),
        None => {
            let mid = lz.dag.constant(ivt, u128::from(lo_n));
            let rebased = lz.dag.binary(Opcode::Sub, ivt, idx, mid);
            (
                lz.dag.insert_vector_elt(lo_t, lo, elt, idx),
                lz.dag.insert_vector_elt(hi_t, hi, elt, rebased),
            )
        }
    };
    Ok(Lowered::Parts(parts))
}

fn shuffle(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let lanes = shuffle_lanes(lz, n)?;
    let (lo_lanes, hi_lanes) = divide(lz, &lanes, lo_t, hi_t)?;
    let lo = gather_lanes(lz, lo_t, lo_lanes);
    let hi = gather_lanes(lz, hi_t, hi_lanes);
    Ok(Lowered::Parts((lo, hi)))
}

fn extract_subvector(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let (lo_t, hi_t) = halves(lz, lz.result_type(n, slot))?;
    let Some(first) = lz.dag[n].payload.part() else {
        return Err(lz.unhandled());
    };
    let src = lz.operand(n, 0);
    let lo = lz.dag.extract_subvector(lo_t, src, first);
    let hi = lz.dag.extract_subvector(hi_t, src, first + lo_t.element_count());
    Ok(Lowered::Parts((lo, hi)))
}

/// Two source parts of matching widths reinterpret one to one; otherwise
/// the value goes through memory.
fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Split {
    let vt = lz.result_type(n, slot);
    let (lo_t, hi_t) = halves(lz, vt)?;
    let x = lz.operand(n, 0);
    let parts = lz.legalized_parts(x)?;
    if let [pl, ph] = parts.as_slice() {
        let (pl, ph) = (*pl, *ph);
        if lz.value_type(pl).bits() == lo_t.bits() && lz.value_type(ph).bits() == hi_t.bits() {
            let lo = lz.dag.bitcast(lo_t, pl);
            let hi = lz.dag.bitcast(hi_t, ph);
            return Ok(Lowered::Parts((lo, hi)));
        }
    }
    let step = trailing_offset(lz, lo_t)?;
    let (chain, ptr) = lz.spill(x, vt);
    let lo = lz.dag.load(lo_t, chain, ptr, MemInfo::new(lo_t)).value(0);
    let hi_ptr = lz.dag.ptr_add(ptr, u64::from(step));
    let hi = lz.dag.load(hi_t, chain, hi_ptr, MemInfo::new(hi_t)).value(0);
    Ok(Lowered::Parts((lo, hi)))
}

// ── Operands ────────────────────────────────────────────────────────

/// Truncating stores split the in-memory type alongside the value.
fn store_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (lo_mem, hi_mem) = halves(lz, mem.mem_vt)?;
    let step = trailing_offset(lz, lo_mem)?;
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 2));
    let (lo, hi) = split_operand(lz, n, 1)?;
    let first = lz.dag.store(chain, lo, ptr, mem.at_offset(lo_mem, 0));
    let hi_ptr = lz.dag.ptr_add(ptr, u64::from(step));
    let second = lz.dag.store(chain, hi, hi_ptr, mem.at_offset(hi_mem, step));
    Ok(OperandAction::Replace(lz.dag.token_factor(&[first, second])))
}

/// Indices past the end read as undefined, as they do on the whole
/// vector.
fn extract_vector_elt_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 0 {
        return Err(lz.unhandled());
    }
    let vt = lz.result_type(n, 0);
    let src = lz.operand(n, 0);
    let total = lz.value_type(src).element_count();
    let (lo, hi) = split_operand(lz, n, 0)?;
    let lo_n = lz.value_type(lo).element_count();
    let idx = lz.operand(n, 1);
    let ivt = lz.value_type(idx);
    let value = match lz.constant_value(idx) {
        Some(k) if k < u128::from(lo_n) => lz.dag.extract_vector_elt(vt, lo, idx),
        Some(k) if k < u128::from(total) => {
            let rebased = lz.dag.constant(ivt, k - u128::from(lo_n));
            lz.dag.extract_vector_elt(vt, hi, rebased)
        }
        Some(_) => lz.dag.undef(vt),
        None => {
            let mid = lz.dag.constant(ivt, u128::from(lo_n));
            let cc_vt = lz.setcc_type(ivt);
            let in_lo = lz.dag.setcc(cc_vt, idx, mid, CondCode::Ult);
            let rebased = lz.dag.binary(Opcode::Sub, ivt, idx, mid);
            let from_lo = lz.dag.extract_vector_elt(vt, lo, idx);
            let from_hi = lz.dag.extract_vector_elt(vt, hi, rebased);
            lz.dag.select(vt, in_lo, from_lo, from_hi)
        }
    };
    Ok(OperandAction::Replace(value))
}

fn extract_subvector_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let Some(first) = lz.dag[n].payload.part() else {
        return Err(lz.unhandled());
    };
    let (lo, hi) = split_operand(lz, n, 0)?;
    let lo_n = lz.value_type(lo).element_count();
    let count = vt.element_count();
    let value = if first + count <= lo_n {
        lz.dag.extract_subvector(vt, lo, first)
    } else if first >= lo_n {
        lz.dag.extract_subvector(vt, hi, first - lo_n)
    } else {
        let src = lz.operand(n, 0);
        let lanes = all_lanes(lz, src)?;
        let picked: Vec<Option<Lane>> = (first..first + count)
            .map(|l| lanes.get(l as usize).copied())
            .collect();
        gather_lanes(lz, vt, &picked)
    };
    Ok(OperandAction::Replace(value))
}

/// An integer as wide as both halves is their pair; anything else goes
/// through memory.
fn bitcast_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, 0);
    let (lo, hi) = split_operand(lz, n, 0)?;
    let (lo_bits, hi_bits) = (lz.value_type(lo).bits(), lz.value_type(hi).bits());
    if vt.is_integer() && lo_bits == hi_bits {
        let lo = lz.dag.bitcast(ValueType::Int(lo_bits), lo);
        let hi = lz.dag.bitcast(ValueType::Int(hi_bits), hi);
        return Ok(OperandAction::Replace(lz.dag.build_pair(vt, lo, hi)));
    }
    Ok(OperandAction::Replace(lz.stack_round_trip(x, vt)))
}

/// A legal result computed from a split operand: each half is computed
/// on its own and the results are joined.
fn elementwise_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let (lo_t, hi_t) = halves(lz, vt)?;
    let (lo, hi) = split_node(lz, n, lo_t, hi_t)?;
    Ok(OperandAction::Replace(lz.dag.concat_vectors(vt, &[lo, hi])))
}

fn shuffle_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let lanes = shuffle_lanes(lz, n)?;
    Ok(OperandAction::Replace(gather_lanes(lz, vt, &lanes)))
}

fn concat_vectors_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let parts = lz.dag[n].operands.clone();
    let mut lanes: Vec<Option<Lane>> = Vec::new();
    for part in parts {
        lanes.extend(all_lanes(lz, part)?.into_iter().map(Some));
    }
    Ok(OperandAction::Replace(gather_lanes(lz, vt, &lanes)))
}

/// Halves of one type are added lanewise first when the sum cannot
/// overflow into bits the result keeps; otherwise each half is reduced
/// on its own.
fn reduce_add_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let (lo, hi) = split_operand(lz, n, 0)?;
    let half_t = lz.value_type(lo);
    let value = if vt.bits() <= half_t.scalar_type().bits() && lz.value_type(hi) == half_t {
        let sum = lz.dag.binary(Opcode::Add, half_t, lo, hi);
        lz.dag.reduce_add(vt, sum)
    } else {
        let lo = lz.dag.reduce_add(vt, lo);
        let hi = lz.dag.reduce_add(vt, hi);
        lz.dag.binary(Opcode::Add, vt, lo, hi)
    };
    Ok(OperandAction::Replace(value))
}

#[cfg(test)]
mod tests;
