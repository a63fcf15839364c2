//! Scalarization: a one-element vector is carried as its element.
//!
//! Elementwise operations become the scalar operation on the elements.
//! Cross-lane operations degenerate: a shuffle or subvector extraction
//! picks one lane of its source, an insertion either replaces the element
//! or leaves it alone.

use smallvec::SmallVec;

use dag_ir::{CondCode, NodeId, Opcode, Payload, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandAction, OperandHandler, ResultHandler};
use crate::error::LegalizeError;
use crate::legalizer::{call_results, splice_operand, Legalizer};

type Scalarized = Result<Lowered<ValueRef>, LegalizeError>;
type Outcome = Result<OperandAction, LegalizeError>;

pub(crate) fn result_handler(op: Opcode) -> Option<ResultHandler<ValueRef>> {
    let handler: ResultHandler<ValueRef> = match op {
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
        Opcode::BuildVector => build_vector,
        Opcode::InsertVectorElt => insert_vector_elt,
        Opcode::VectorShuffle => shuffle,
        Opcode::ConcatVectors => concat_vectors,
        Opcode::ExtractSubvector => extract_subvector,
        Opcode::Load => load,
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
        Opcode::ExtractVectorElt => extract_vector_elt_operand,
        Opcode::Store => store_operand,
        Opcode::BitCast => bitcast_operand,
        Opcode::ConcatVectors => concat_vectors_operand,
        Opcode::VectorShuffle => shuffle_operand,
        Opcode::VecReduceAdd => reduce_add_operand,
        Opcode::Ret | Opcode::Call => splice_operand,
        Opcode::EntryToken
        | Opcode::Constant
        | Opcode::ConstantFp
        | Opcode::Undef
        | Opcode::Argument
        | Opcode::FrameIndex
        | Opcode::Add
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
        | Opcode::AddC
        | Opcode::SubC
        | Opcode::AddE
        | Opcode::SubE
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
        | Opcode::Select
        | Opcode::BuildPair
        | Opcode::ExtractElement
        | Opcode::Load
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::BuildVector
        | Opcode::InsertVectorElt
        | Opcode::ExtractSubvector => return None,
    };
    Some(handler)
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Operand `i` as a scalar: the element of a one-element vector, or the
/// operand itself when it is not a vector (a broadcast shift amount or a
/// select condition).
fn scalar_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Result<ValueRef, LegalizeError> {
    let v = lz.operand(n, i);
    let vt = lz.value_type(v);
    if !vt.is_vector() {
        return Ok(v);
    }
    if lz.value_action(v)? == TypeAction::ScalarizeVector {
        return lz.scalarized(v);
    }
    let zero = lz.index_constant(0);
    Ok(lz.dag.extract_vector_elt(vt.scalar_type(), v, zero))
}

/// Lane `lane` of vector `src` as a value of type `elem`. Lanes past the
/// end read as undefined.
fn lane_of(
    lz: &mut Legalizer<'_>,
    src: ValueRef,
    lane: u32,
    elem: ValueType,
) -> Result<ValueRef, LegalizeError> {
    let count = lz.value_type(src).element_count();
    if lane >= count {
        return Ok(lz.dag.undef(elem));
    }
    if lz.value_action(src)? == TypeAction::ScalarizeVector {
        return lz.scalarized(src);
    }
    let idx = lz.index_constant(u64::from(lane));
    Ok(lz.dag.extract_vector_elt(elem, src, idx))
}

/// A vector element operand narrowed to the element type.
fn fit_element(lz: &mut Legalizer<'_>, x: ValueRef, elem: ValueType) -> ValueRef {
    let vt = lz.value_type(x);
    if vt != elem && vt.is_integer() && elem.is_integer() {
        lz.dag.any_ext_or_trunc(x, elem)
    } else {
        x
    }
}

/// An element read out at `vt`; wider results see the element
/// zero-extended.
fn widen_element(lz: &mut Legalizer<'_>, s: ValueRef, vt: ValueType) -> ValueRef {
    let st = lz.value_type(s);
    if st != vt && st.is_integer() && vt.is_integer() {
        lz.dag.zext_or_trunc(s, vt)
    } else {
        s
    }
}

fn elem_type(lz: &Legalizer<'_>, n: NodeId, slot: u32) -> ValueType {
    lz.result_type(n, slot).scalar_type()
}

// ── Results ─────────────────────────────────────────────────────────

fn elementwise(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let (op, count) = (lz.dag[n].opcode, lz.dag[n].operands.len());
    let mut ops: SmallVec<[ValueRef; 3]> = SmallVec::with_capacity(count);
    for i in 0..count {
        ops.push(scalar_operand(lz, n, i)?);
    }
    let payload = match lz.dag[n].payload.clone() {
        Payload::InRegType(from) => Payload::InRegType(from.scalar_type()),
        other => other,
    };
    Ok(Lowered::Parts(lz.dag.create_node(op, &ops, &[elem], payload).value(0)))
}

fn undef(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    Ok(Lowered::Parts(lz.dag.undef(elem)))
}

fn argument(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let Payload::Argument { index, offset } = lz.dag[n].payload else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Parts(lz.dag.argument(elem, index, offset)))
}

fn build_vector(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let x = lz.operand(n, 0);
    Ok(Lowered::Parts(fit_element(lz, x, elem)))
}

/// Index zero replaces the element; any other index is out of range and
/// leaves the vector unchanged.
fn insert_vector_elt(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let s = scalar_operand(lz, n, 0)?;
    let (elt, idx) = (lz.operand(n, 1), lz.operand(n, 2));
    let elt = fit_element(lz, elt, elem);
    let value = match lz.constant_value(idx) {
        Some(0) => elt,
        Some(_) => s,
        None => {
            let ivt = lz.value_type(idx);
            let zero = lz.dag.constant(ivt, 0);
            let cc_vt = lz.setcc_type(ivt);
            let first = lz.dag.setcc(cc_vt, idx, zero, CondCode::Eq);
            lz.dag.select(elem, first, elt, s)
        }
    };
    Ok(Lowered::Parts(value))
}

fn shuffle(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let Some(lane) = lz.dag[n].payload.mask().and_then(|m| m.first().copied()) else {
        return Err(lz.unhandled());
    };
    let Some(lane) = lane else {
        return Ok(Lowered::Parts(lz.dag.undef(elem)));
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    let first_count = lz.value_type(a).element_count();
    let value = if lane < first_count {
        lane_of(lz, a, lane, elem)?
    } else {
        lane_of(lz, b, lane - first_count, elem)?
    };
    Ok(Lowered::Parts(value))
}

fn concat_vectors(lz: &mut Legalizer<'_>, n: NodeId, _slot: u32) -> Scalarized {
    Ok(Lowered::Parts(scalar_operand(lz, n, 0)?))
}

fn extract_subvector(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let Some(first) = lz.dag[n].payload.part() else {
        return Err(lz.unhandled());
    };
    let src = lz.operand(n, 0);
    Ok(Lowered::Parts(lane_of(lz, src, first, elem)?))
}

/// The memory access keeps its address, alignment and flags; only the
/// accessed type loses its vector wrapper.
fn load(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 1));
    let mem = mem.with_mem_vt(mem.mem_vt.scalar_type());
    let ld = lz.dag.load(elem, chain, ptr, mem);
    lz.replace_value_with(n.value(1), ld.value(1))?;
    Ok(Lowered::Parts(ld.value(0)))
}

fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Scalarized {
    let elem = elem_type(lz, n, slot);
    let x = scalar_operand_or_whole(lz, n)?;
    Ok(Lowered::Parts(lz.dag.bitcast(elem, x)))
}

/// The bitcast source as a scalar when it is a one-element vector,
/// otherwise unchanged.
fn scalar_operand_or_whole(lz: &mut Legalizer<'_>, n: NodeId) -> Result<ValueRef, LegalizeError> {
    let x = lz.operand(n, 0);
    if lz.value_type(x).element_count() == 1 {
        scalar_operand(lz, n, 0)
    } else {
        Ok(x)
    }
}

// ── Operands ────────────────────────────────────────────────────────

fn extract_vector_elt_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 0 {
        return Err(lz.unhandled());
    }
    let vt = lz.result_type(n, 0);
    let idx = lz.operand(n, 1);
    if matches!(lz.constant_value(idx), Some(k) if k != 0) {
        return Ok(OperandAction::Replace(lz.dag.undef(vt)));
    }
    let s = scalar_operand(lz, n, 0)?;
    Ok(OperandAction::Replace(widen_element(lz, s, vt)))
}

fn store_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 2));
    let s = scalar_operand(lz, n, 1)?;
    let mem = mem.with_mem_vt(mem.mem_vt.scalar_type());
    Ok(OperandAction::Replace(lz.dag.store(chain, s, ptr, mem)))
}

fn bitcast_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let s = scalar_operand(lz, n, 0)?;
    Ok(OperandAction::Replace(lz.dag.bitcast(vt, s)))
}

fn concat_vectors_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let count = lz.dag[n].operands.len();
    let mut elems: SmallVec<[ValueRef; 8]> = SmallVec::with_capacity(count);
    for i in 0..count {
        elems.push(scalar_operand(lz, n, i)?);
    }
    Ok(OperandAction::Replace(lz.dag.build_vector(vt, &elems)))
}

/// A legal shuffle of one-element sources is a vector of picked lanes.
fn shuffle_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let elem = vt.scalar_type();
    let Some(mask) = lz.dag[n].payload.mask().map(<[_]>::to_vec) else {
        return Err(lz.unhandled());
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    let first_count = lz.value_type(a).element_count();
    let mut elems: SmallVec<[ValueRef; 8]> = SmallVec::with_capacity(mask.len());
    for lane in mask {
        let e = match lane {
            Some(l) if l < first_count => lane_of(lz, a, l, elem)?,
            Some(l) => lane_of(lz, b, l - first_count, elem)?,
            None => lz.dag.undef(elem),
        };
        elems.push(e);
    }
    Ok(OperandAction::Replace(lz.dag.build_vector(vt, &elems)))
}

fn reduce_add_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let s = scalar_operand(lz, n, 0)?;
    Ok(OperandAction::Replace(widen_element(lz, s, vt)))
}
