//! Consumers of promoted integers whose own results are legal.

use dag_ir::{NodeId, Opcode, ValueRef};

use crate::dispatch::{OperandAction, OperandHandler};
use crate::error::LegalizeError;
use crate::legalizer::{splice_operand, Legalizer};

use super::{anyext_to, sext_promoted, zext_promoted, zext_to};

type Outcome = Result<OperandAction, LegalizeError>;

pub(super) fn handler(op: Opcode) -> Option<OperandHandler> {
    let handler: OperandHandler = match op {
        Opcode::SignExtend | Opcode::ZeroExtend | Opcode::AnyExtend => extend,
        Opcode::Truncate => truncate,
        Opcode::SetCc => setcc,
        Opcode::Select | Opcode::BrCond => condition,
        Opcode::Store => store,
        Opcode::BuildVector => build_vector,
        Opcode::InsertVectorElt => insert_vector_elt,
        Opcode::ExtractVectorElt => vector_index,
        Opcode::SintToFp | Opcode::UintToFp => int_to_fp,
        Opcode::Shl | Opcode::Sra | Opcode::Srl => shift_amount,
        Opcode::BuildPair => build_pair,
        Opcode::BitCast => bitcast,
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
        | Opcode::ExtractElement
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

fn extend(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, i);
    let value = match lz.dag[n].opcode {
        Opcode::SignExtend => {
            let s = sext_promoted(lz, x)?;
            lz.dag.sext_or_trunc(s, vt)
        }
        Opcode::ZeroExtend => zext_to(lz, x, vt)?,
        _ => anyext_to(lz, x, vt)?,
    };
    Ok(OperandAction::Replace(value))
}

fn truncate(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, i);
    Ok(OperandAction::Replace(anyext_to(lz, x, vt)?))
}

/// Both sides are extended the way the predicate reads them: signed
/// predicates by sign, equality and unsigned ones by zeros.
fn setcc(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let Some(cc) = lz.dag[n].payload.cond() else {
        return Err(lz.unhandled());
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    let (a, b) = if cc.is_signed() {
        (sext_promoted(lz, a)?, sext_promoted(lz, b)?)
    } else {
        (zext_promoted(lz, a)?, zext_promoted(lz, b)?)
    };
    lz.dag.set_operands(n, &[a, b]);
    Ok(OperandAction::UpdatedInPlace)
}

/// Only bit 0 of a condition is read, so the promoted value serves as is.
fn condition(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let expected = match lz.dag[n].opcode {
        Opcode::Select => 0,
        _ => 1,
    };
    if i != expected {
        return Err(lz.unhandled());
    }
    let p = lz.promoted_int(lz.operand(n, i))?;
    update(lz, n, i, p)
}

/// The memory type already records the truncation.
fn store(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let p = lz.promoted_int(lz.operand(n, i))?;
    update(lz, n, i, p)
}

/// Elements are truncated to the element type when the vector is built.
fn build_vector(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let mut elems = lz.dag[n].operands.clone();
    for elem in &mut elems {
        *elem = lz.promoted_int(*elem)?;
    }
    lz.dag.set_operands(n, &elems);
    Ok(OperandAction::UpdatedInPlace)
}

fn insert_vector_elt(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let x = lz.operand(n, i);
    let value = match i {
        1 => lz.promoted_int(x)?,
        2 => zext_promoted(lz, x)?,
        _ => return Err(lz.unhandled()),
    };
    update(lz, n, i, value)
}

/// Indices and shift amounts are read as unsigned numbers.
fn vector_index(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let x = lz.operand(n, i);
    let idx = zext_promoted(lz, x)?;
    update(lz, n, i, idx)
}

fn shift_amount(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    vector_index(lz, n, i)
}

fn int_to_fp(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let x = lz.operand(n, i);
    let value = match lz.dag[n].opcode {
        Opcode::SintToFp => sext_promoted(lz, x)?,
        _ => zext_promoted(lz, x)?,
    };
    update(lz, n, i, value)
}

fn build_pair(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let (lo, hi) = (lz.operand(n, 0), lz.operand(n, 1));
    let half = lz.value_type(lo).bits();
    let lo = zext_to(lz, lo, vt)?;
    let hi = anyext_to(lz, hi, vt)?;
    let up = lz.index_constant(u64::from(half));
    let hi = lz.dag.binary(Opcode::Shl, vt, hi, up);
    Ok(OperandAction::Replace(lz.dag.binary(Opcode::Or, vt, lo, hi)))
}

/// Reinterpretation goes through memory: the promoted value is stored
/// whole and its low bytes are read back.
fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let p = lz.promoted_int(lz.operand(n, i))?;
    Ok(OperandAction::Replace(lz.stack_round_trip(p, vt)))
}
