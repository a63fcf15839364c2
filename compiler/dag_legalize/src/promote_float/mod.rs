//! Float promotion ("softening"): carry a float's encoding in the integer
//! of the same width.
//!
//! # Design
//!
//! Only the bits move between nodes; nothing here interprets them except
//! through routine calls. Constants, loads, stores and reinterpretation
//! are free. Arithmetic, comparisons and conversions become calls into
//! the soft-float runtime, whose arguments and results are the integer
//! encodings.
//!
//! The carrier integer need not be legal itself. An `f64` on a 32-bit
//! machine becomes an `i64`, which the integer expansion then splits like
//! any other. Routine calls take their operands in legalized parts, so
//! the call sites here never look at how the carrier is represented.

use dag_ir::{
    limbs, FloatFormat, Libcall, NodeId, Opcode, Payload, SoftCmp, ValueRef, ValueType,
};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandAction, OperandHandler, ResultHandler};
use crate::error::LegalizeError;
use crate::legalizer::{call_results, splice_operand, Legalizer};

type Softened = Result<Lowered<ValueRef>, LegalizeError>;
type Outcome = Result<OperandAction, LegalizeError>;

pub(crate) fn result_handler(op: Opcode) -> Option<ResultHandler<ValueRef>> {
    let handler: ResultHandler<ValueRef> = match op {
        Opcode::ConstantFp => constant,
        Opcode::Undef => undef,
        Opcode::Argument => argument,
        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => arith,
        Opcode::FNeg => neg,
        Opcode::Load => load,
        Opcode::BitCast => bitcast,
        Opcode::SintToFp | Opcode::UintToFp => int_to_fp,
        Opcode::FpExtend | Opcode::FpRound => convert,
        Opcode::Select => select,
        Opcode::Call => call_results,
        Opcode::EntryToken
        | Opcode::Constant
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
        | Opcode::SetCc
        | Opcode::BuildPair
        | Opcode::ExtractElement
        | Opcode::Store
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::Ret
        | Opcode::BuildVector
        | Opcode::ExtractVectorElt
        | Opcode::InsertVectorElt
        | Opcode::VectorShuffle
        | Opcode::ConcatVectors
        | Opcode::ExtractSubvector
        | Opcode::VecReduceAdd => return None,
    };
    Some(handler)
}

pub(crate) fn operand_handler(op: Opcode) -> Option<OperandHandler> {
    let handler: OperandHandler = match op {
        Opcode::BitCast => bitcast_operand,
        Opcode::Store => store_operand,
        Opcode::SetCc => setcc_operand,
        Opcode::FpToSint | Opcode::FpToUint => fp_to_int_operand,
        Opcode::FpExtend | Opcode::FpRound => convert_operand,
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
        | Opcode::SintToFp
        | Opcode::UintToFp
        | Opcode::FAdd
        | Opcode::FSub
        | Opcode::FMul
        | Opcode::FDiv
        | Opcode::FNeg
        | Opcode::Select
        | Opcode::BuildPair
        | Opcode::ExtractElement
        | Opcode::Load
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::BuildVector
        | Opcode::ExtractVectorElt
        | Opcode::InsertVectorElt
        | Opcode::VectorShuffle
        | Opcode::ConcatVectors
        | Opcode::ExtractSubvector
        | Opcode::VecReduceAdd => return None,
    };
    Some(handler)
}

// ── Helpers ─────────────────────────────────────────────────────────

/// `(float type, carrier integer)` of result `slot`.
fn types(lz: &Legalizer<'_>, n: NodeId, slot: u32) -> (ValueType, ValueType) {
    let vt = lz.result_type(n, slot);
    (vt, lz.transform(vt))
}

fn float_format(lz: &Legalizer<'_>, vt: ValueType) -> Result<FloatFormat, LegalizeError> {
    vt.float_format().ok_or_else(|| lz.unhandled())
}

/// Width of the integer a conversion routine works on: the runtime only
/// has `int`, `long long` and `__int128` flavours.
fn routine_int_width(bits: u32) -> u32 {
    bits.next_power_of_two().max(32)
}

// ── Results ─────────────────────────────────────────────────────────

/// The encoding is already an integer; no call is needed.
fn constant(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (_, nvt) = types(lz, n, slot);
    let Some(bits) = lz.dag[n].payload.bits() else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Parts(lz.dag.constant(nvt, bits)))
}

fn undef(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (_, nvt) = types(lz, n, slot);
    Ok(Lowered::Parts(lz.dag.undef(nvt)))
}

fn argument(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (_, nvt) = types(lz, n, slot);
    let Payload::Argument { index, offset } = lz.dag[n].payload else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Parts(lz.dag.argument(nvt, index, offset)))
}

fn arith(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (vt, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let format = float_format(lz, vt)?;
    let Some(call) = Libcall::for_float_op(op, format) else {
        return Err(lz.unhandled());
    };
    let a = lz.promoted_float(lz.operand(n, 0))?;
    let b = lz.promoted_float(lz.operand(n, 1))?;
    Ok(Lowered::Parts(lz.make_libcall(call, &[a, b], nvt)?))
}

/// Negation flips the sign bit of the encoding.
fn neg(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (vt, nvt) = types(lz, n, slot);
    let format = float_format(lz, vt)?;
    let x = lz.promoted_float(lz.operand(n, 0))?;
    let sign = lz.dag.constant(nvt, 1 << limbs::fp_sign_bit(format));
    Ok(Lowered::Parts(lz.dag.binary(Opcode::Xor, nvt, x, sign)))
}

fn load(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (_, nvt) = types(lz, n, slot);
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 1));
    let ld = lz.dag.load(nvt, chain, ptr, mem.with_mem_vt(nvt));
    lz.replace_value_with(n.value(1), ld.value(1))?;
    Ok(Lowered::Parts(ld.value(0)))
}

/// Same-width sources hand over their bits directly; anything else goes
/// through memory.
fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (_, nvt) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    let bits = match lz.value_action(x)? {
        TypeAction::Legal => lz.dag.bitcast(nvt, x),
        TypeAction::PromoteInteger => {
            let p = lz.promoted_int(x)?;
            lz.dag.any_ext_or_trunc(p, nvt)
        }
        TypeAction::PromoteFloat => {
            let p = lz.promoted_float(x)?;
            lz.dag.bitcast(nvt, p)
        }
        TypeAction::ExpandInteger => {
            let (lo, hi) = lz.expanded_int(x)?;
            lz.dag.build_pair(nvt, lo, hi)
        }
        TypeAction::ScalarizeVector => {
            let s = lz.scalarized(x)?;
            if lz.value_type(s).bits() == nvt.bits() {
                lz.dag.bitcast(nvt, s)
            } else {
                lz.stack_round_trip(x, nvt)
            }
        }
        TypeAction::ExpandFloat | TypeAction::SplitVector => lz.stack_round_trip(x, nvt),
    };
    Ok(Lowered::Parts(bits))
}

/// The source is widened to a width the runtime has a routine for.
fn int_to_fp(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (vt, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let from = lz.value_type(x);
    let width = routine_int_width(from.bits());
    let wide = ValueType::Int(width);
    let x = if from == wide {
        x
    } else {
        let ext = match op {
            Opcode::SintToFp => Opcode::SignExtend,
            _ => Opcode::ZeroExtend,
        };
        lz.dag.unary(ext, wide, x)
    };
    let Some(call) = Libcall::for_conversion(op, wide, vt) else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Parts(lz.make_libcall(call, &[x], nvt)?))
}

fn convert(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (vt, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let Some(call) = Libcall::for_conversion(op, lz.value_type(x), vt) else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Parts(lz.make_libcall(call, &[x], nvt)?))
}

fn select(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Softened {
    let (_, nvt) = types(lz, n, slot);
    let cond = lz.operand(n, 0);
    let a = lz.promoted_float(lz.operand(n, 1))?;
    let b = lz.promoted_float(lz.operand(n, 2))?;
    Ok(Lowered::Parts(lz.dag.select(nvt, cond, a, b)))
}

// ── Operands ────────────────────────────────────────────────────────

fn bitcast_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, i);
    let p = lz.promoted_float(x)?;
    if lz.value_type(p).bits() != vt.bits() {
        return Ok(OperandAction::Replace(lz.stack_round_trip(x, vt)));
    }
    Ok(OperandAction::Replace(lz.dag.bitcast(vt, p)))
}

/// The stored bytes are the encoding, so the store only changes type.
fn store_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 2));
    let p = lz.promoted_float(lz.operand(n, 1))?;
    let nvt = lz.value_type(p);
    let mem = if mem.mem_vt.is_float() {
        mem.with_mem_vt(nvt)
    } else {
        mem
    };
    Ok(OperandAction::Replace(lz.dag.store(chain, p, ptr, mem)))
}

/// A comparison routine returns an `int` whose relation to zero decides
/// the predicate.
fn setcc_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let Some(cc) = lz.dag[n].payload.cond() else {
        return Err(lz.unhandled());
    };
    let Some((cmp, test)) = SoftCmp::for_cond(cc) else {
        return Err(lz.unhandled());
    };
    let rt = lz.result_type(n, 0);
    let vt = lz.value_type(lz.operand(n, 0));
    let format = float_format(lz, vt)?;
    let a = lz.promoted_float(lz.operand(n, 0))?;
    let b = lz.promoted_float(lz.operand(n, 1))?;
    let call = Libcall::FCmp(cmp, format);
    let r = lz.make_libcall(call, &[a, b], call.result())?;
    let zero = lz.dag.constant(call.result(), 0);
    tracing::trace!(node = %n, ?cc, routine = %call, "soft comparison");
    Ok(OperandAction::Replace(lz.dag.setcc(rt, r, zero, test)))
}

/// Conversion to an integer narrower than any routine goes through the
/// smallest routine width and truncates.
fn fp_to_int_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, i);
    let wide = ValueType::Int(routine_int_width(vt.bits()));
    let Some(call) = Libcall::for_conversion(op, lz.value_type(x), wide) else {
        return Err(lz.unhandled());
    };
    let p = lz.promoted_float(x)?;
    let r = lz.make_libcall(call, &[p], wide)?;
    Ok(OperandAction::Replace(lz.dag.any_ext_or_trunc(r, vt)))
}

fn convert_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, i);
    let Some(call) = Libcall::for_conversion(op, lz.value_type(x), vt) else {
        return Err(lz.unhandled());
    };
    let p = lz.promoted_float(x)?;
    Ok(OperandAction::Replace(lz.make_libcall(call, &[p], vt)?))
}

#[cfg(test)]
mod tests;
