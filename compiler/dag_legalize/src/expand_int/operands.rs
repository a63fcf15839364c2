//! Consumers of expanded integers whose own results are legal.

use dag_ir::{limbs, CondCode, ElemType, Libcall, NodeId, Opcode, ValueRef, ValueType};

use crate::dispatch::{OperandAction, OperandHandler};
use crate::error::LegalizeError;
use crate::legalizer::{splice_operand, Legalizer};

use super::operand_limbs;
use super::shifts::saturate;

type Outcome = Result<OperandAction, LegalizeError>;

pub(super) fn handler(op: Opcode) -> Option<OperandHandler> {
    let handler: OperandHandler = match op {
        Opcode::Truncate => truncate,
        Opcode::SetCc => setcc,
        Opcode::Store => store,
        Opcode::BitCast => bitcast,
        Opcode::SintToFp | Opcode::UintToFp => int_to_fp,
        Opcode::Shl | Opcode::Sra | Opcode::Srl => shift_amount,
        Opcode::ExtractElement => extract_element,
        Opcode::BuildVector => build_vector,
        Opcode::InsertVectorElt => insert_vector_elt,
        Opcode::ExtractVectorElt => extract_index,
        Opcode::Select | Opcode::BrCond => condition,
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
        | Opcode::SignExtendInReg
        | Opcode::FpToSint
        | Opcode::FpToUint
        | Opcode::FpExtend
        | Opcode::FpRound
        | Opcode::FAdd
        | Opcode::FSub
        | Opcode::FMul
        | Opcode::FDiv
        | Opcode::FNeg
        | Opcode::BuildPair
        | Opcode::Load
        | Opcode::TokenFactor
        | Opcode::VectorShuffle
        | Opcode::ConcatVectors
        | Opcode::ExtractSubvector
        | Opcode::VecReduceAdd => return None,
    };
    Some(handler)
}

fn update(lz: &mut Legalizer<'_>, n: NodeId, i: usize, value: ValueRef) -> Outcome {
    lz.dag.set_operand(n, i, value);
    Ok(OperandAction::UpdatedInPlace)
}

/// A legal truncation result fits in the low limb.
fn truncate(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let (lo, _) = operand_limbs(lz, n, i)?;
    if vt.bits() > lz.value_type(lo).bits() {
        return Err(lz.unhandled());
    }
    Ok(OperandAction::Replace(lz.dag.any_ext_or_trunc(lo, vt)))
}

/// Equality combines both limb compares. Ordered predicates compare the
/// high limbs, falling back to an unsigned compare of the low limbs when
/// the high limbs are equal.
fn setcc(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let Some(cc) = lz.dag[n].payload.cond() else {
        return Err(lz.unhandled());
    };
    let rt = lz.result_type(n, 0);
    let (al, ah) = operand_limbs(lz, n, 0)?;
    let (bl, bh) = operand_limbs(lz, n, 1)?;

    let value = match cc {
        CondCode::Eq | CondCode::Ne => {
            let lo = lz.dag.setcc(rt, al, bl, cc);
            let hi = lz.dag.setcc(rt, ah, bh, cc);
            let join = if cc == CondCode::Eq {
                Opcode::And
            } else {
                Opcode::Or
            };
            lz.dag.binary(join, rt, lo, hi)
        }
        _ => {
            let h = lz.value_type(ah);
            let cc_vt = lz.setcc_type(h);
            let tie = lz.dag.setcc(cc_vt, ah, bh, CondCode::Eq);
            let low = lz.dag.setcc(rt, al, bl, cc.to_unsigned());
            let high = lz.dag.setcc(rt, ah, bh, cc);
            lz.dag.select(rt, tie, low, high)
        }
    };
    tracing::trace!(node = %n, ?cc, "expanded comparison");
    Ok(OperandAction::Replace(value))
}

/// Two limb stores joined by a token factor. A truncating store whose
/// memory type fits in the low limb needs only that one.
fn store(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 2));
    let (lo, hi) = operand_limbs(lz, n, 1)?;
    let h = lz.value_type(lo);
    let hb = h.bits();
    if hb % 8 != 0 {
        return Err(lz.unhandled());
    }
    let mb = mem.mem_vt.bits();
    if mb <= hb {
        let out = lz.dag.store(chain, lo, ptr, mem);
        return Ok(OperandAction::Replace(out));
    }

    let step = h.store_bytes();
    let lo_out = lz.dag.store(chain, lo, ptr, mem.at_offset(h, 0));
    let hi_ptr = lz.dag.ptr_add(ptr, u64::from(step));
    let hi_mem = mem.at_offset(ValueType::Int(mb - hb), step);
    let hi_out = lz.dag.store(chain, hi, hi_ptr, hi_mem);
    Ok(OperandAction::Replace(lz.dag.token_factor(&[lo_out, hi_out])))
}

/// A vector of two limb-sized integers is built directly; anything else
/// is reinterpreted through memory.
fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, i);
    let (lo, hi) = lz.expanded_int(x)?;
    let hb = lz.value_type(lo).bits();
    if let Some(v) = vt.as_vector() {
        if v.count == 2 && v.elem == ElemType::Int(hb) {
            return Ok(OperandAction::Replace(lz.dag.build_vector(vt, &[lo, hi])));
        }
    }
    Ok(OperandAction::Replace(lz.stack_round_trip(x, vt)))
}

/// `hi * 2^h + lo` in the float type when both limbs convert exactly,
/// otherwise a conversion routine.
fn int_to_fp(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, i);
    let (lo, hi) = lz.expanded_int(x)?;
    let h = lz.value_type(lo);

    let exact = vt
        .float_format()
        .filter(|f| f.precision() >= h.bits())
        .and_then(|f| limbs::fp_power_of_two(f, h.bits()));
    if let Some(scale) = exact {
        let hi_f = lz.dag.unary(op, vt, hi);
        let lo_f = lz.dag.unary(Opcode::UintToFp, vt, lo);
        let scale = lz.dag.constant_fp(vt, scale);
        let hi_f = lz.dag.binary(Opcode::FMul, vt, hi_f, scale);
        return Ok(OperandAction::Replace(lz.dag.binary(Opcode::FAdd, vt, hi_f, lo_f)));
    }

    let from = lz.value_type(x);
    let Some(call) = Libcall::for_conversion(op, from, vt) else {
        return Err(lz.unhandled());
    };
    Ok(OperandAction::Replace(lz.make_libcall(call, &[x], vt)?))
}

/// Any amount with a nonzero high limb shifts everything out.
fn shift_amount(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let (lo, hi) = operand_limbs(lz, n, i)?;
    let amount = saturate(lz, lo, hi);
    update(lz, n, i, amount)
}

fn extract_element(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let Some(part) = lz.dag[n].payload.part() else {
        return Err(lz.unhandled());
    };
    let (lo, hi) = operand_limbs(lz, n, i)?;
    Ok(OperandAction::Replace(if part == 0 { lo } else { hi }))
}

/// Elements that need two limbs each are built as a vector of twice as
/// many limbs and reinterpreted.
fn build_vector(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let elems = lz.dag[n].operands.clone();
    let mut parts: Vec<ValueRef> = Vec::with_capacity(elems.len() * 2);
    for elem in elems {
        let (lo, hi) = lz.expanded_int(elem)?;
        parts.extend([lo, hi]);
    }
    let h = parts
        .first()
        .map_or(ValueType::Other, |p| lz.value_type(*p));
    let Some(wide) = ValueType::vector(h, parts.len() as u32) else {
        return Err(lz.unhandled());
    };
    let built = lz.dag.build_vector(wide, &parts);
    Ok(OperandAction::Replace(lz.dag.bitcast(vt, built)))
}

/// An expanded element is inserted as two limbs into the vector viewed
/// with twice as many elements. An expanded index saturates. A runtime
/// index is doubled in its own type, which can wrap, so the result keeps
/// the original vector unless the index is below the element count.
fn insert_vector_elt(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    match i {
        1 => {}
        2 => return extract_index(lz, n, i),
        _ => return Err(lz.unhandled()),
    }
    let vt = lz.result_type(n, 0);
    let (vec, idx) = (lz.operand(n, 0), lz.operand(n, 2));
    let (lo, hi) = operand_limbs(lz, n, 1)?;
    let h = lz.value_type(lo);
    let Some(wide) = ValueType::vector(h, vt.element_count() * 2) else {
        return Err(lz.unhandled());
    };

    let idx_vt = lz.value_type(idx);
    let (lo_idx, hi_idx, in_range) = match lz.constant_value(idx) {
        Some(k) => {
            let k = k.saturating_mul(2);
            let lo_idx = lz.dag.constant(idx_vt, k);
            let hi_idx = lz.dag.constant(idx_vt, k.saturating_add(1));
            (lo_idx, hi_idx, None)
        }
        None => {
            let one = lz.dag.constant(idx_vt, 1);
            let lo_idx = lz.dag.binary(Opcode::Shl, idx_vt, idx, one);
            let hi_idx = lz.dag.binary(Opcode::Add, idx_vt, lo_idx, one);
            let count = lz.dag.constant(idx_vt, u128::from(vt.element_count()));
            let cc_vt = lz.setcc_type(idx_vt);
            let in_range = lz.dag.setcc(cc_vt, idx, count, CondCode::Ult);
            (lo_idx, hi_idx, Some(in_range))
        }
    };
    let wide_vec = lz.dag.bitcast(wide, vec);
    let with_lo = lz.dag.insert_vector_elt(wide, wide_vec, lo, lo_idx);
    let with_hi = lz.dag.insert_vector_elt(wide, with_lo, hi, hi_idx);
    let inserted = lz.dag.bitcast(vt, with_hi);
    let value = match in_range {
        Some(cond) => lz.dag.select(vt, cond, inserted, vec),
        None => inserted,
    };
    Ok(OperandAction::Replace(value))
}

/// An index with a nonzero high limb is out of range whatever its low
/// limb says.
fn extract_index(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i == 0 {
        return Err(lz.unhandled());
    }
    let (lo, hi) = operand_limbs(lz, n, i)?;
    let idx = saturate(lz, lo, hi);
    update(lz, n, i, idx)
}

/// Only bit 0 of a condition is read, and it lives in the low limb.
fn condition(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let expected = match lz.dag[n].opcode {
        Opcode::Select => 0,
        _ => 1,
    };
    if i != expected {
        return Err(lz.unhandled());
    }
    let (lo, _) = operand_limbs(lz, n, i)?;
    update(lz, n, i, lo)
}
