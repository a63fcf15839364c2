//! Float expansion: carry a double-double (`ppc_fp128`) as its two
//! doubles.
//!
//! # Design
//!
//! The pair is recorded as `(lo, hi)` where `hi` is the leading double,
//! the one whose bits occupy the low half of the 128-bit encoding and the
//! first eight bytes in memory. `lo` is the trailing correction. Unlike an
//! expanded integer the parts are not independent halves of the value:
//! only sign flips, selection and memory traffic work part by part.
//! Arithmetic and integer conversions go to the runtime, which takes and
//! returns the pair as two doubles, leading double first.

use dag_ir::{limbs, CondCode, Libcall, MemInfo, NodeId, Opcode, Payload, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandAction, OperandHandler, ResultHandler};
use crate::error::LegalizeError;
use crate::legalizer::{call_results, splice_operand, Legalizer};

type Parts = (ValueRef, ValueRef);
type Expanded = Result<Lowered<Parts>, LegalizeError>;
type Outcome = Result<OperandAction, LegalizeError>;

pub(crate) fn result_handler(op: Opcode) -> Option<ResultHandler<Parts>> {
    let handler: ResultHandler<Parts> = match op {
        Opcode::ConstantFp => constant,
        Opcode::Undef => undef,
        Opcode::Argument => argument,
        Opcode::FAdd | Opcode::FSub | Opcode::FMul | Opcode::FDiv => arith,
        Opcode::FNeg => neg,
        Opcode::Load => load,
        Opcode::BitCast => bitcast,
        Opcode::FpExtend => extend,
        Opcode::SintToFp | Opcode::UintToFp => int_to_fp,
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
        | Opcode::FpRound
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
        Opcode::Store => store_operand,
        Opcode::BitCast => bitcast_operand,
        Opcode::FpRound => round_operand,
        Opcode::FpToSint | Opcode::FpToUint => fp_to_int_operand,
        Opcode::SetCc => setcc_operand,
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
        | Opcode::FpExtend
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

/// `(original type, part type)` of result `slot`.
fn types(lz: &Legalizer<'_>, n: NodeId, slot: u32) -> (ValueType, ValueType) {
    let vt = lz.result_type(n, slot);
    (vt, lz.transform(vt))
}

fn operand_parts(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Result<Parts, LegalizeError> {
    lz.expanded_float(lz.operand(n, i))
}

/// Integer width the conversion routines are instantiated at.
fn routine_int_width(bits: u32) -> u32 {
    bits.next_power_of_two().max(32)
}

/// Read the leading and trailing doubles of `vt` laid out at `ptr`.
fn load_parts(
    lz: &mut Legalizer<'_>,
    chain: ValueRef,
    ptr: ValueRef,
    mem: MemInfo,
    part: ValueType,
) -> (Parts, ValueRef) {
    let step = part.store_bytes();
    let hi = lz.dag.load(part, chain, ptr, mem.at_offset(part, 0));
    let lo_ptr = lz.dag.ptr_add(ptr, u64::from(step));
    let lo = lz.dag.load(part, chain, lo_ptr, mem.at_offset(part, step));
    let chain = lz.dag.token_factor(&[hi.value(1), lo.value(1)]);
    ((lo.value(0), hi.value(0)), chain)
}

// ── Results ─────────────────────────────────────────────────────────

/// The leading double is the low half of the encoding.
fn constant(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, part) = types(lz, n, slot);
    let Some(bits) = lz.dag[n].payload.bits() else {
        return Err(lz.unhandled());
    };
    let (lead, trail) = limbs::split(bits, vt.bits());
    let hi = lz.dag.constant_fp(part, lead);
    let lo = lz.dag.constant_fp(part, trail);
    Ok(Lowered::Parts((lo, hi)))
}

fn undef(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, part) = types(lz, n, slot);
    let lo = lz.dag.undef(part);
    let hi = lz.dag.undef(part);
    Ok(Lowered::Parts((lo, hi)))
}

fn argument(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, part) = types(lz, n, slot);
    let Payload::Argument { index, offset } = lz.dag[n].payload else {
        return Err(lz.unhandled());
    };
    let hi = lz.dag.argument(part, index, offset);
    let lo = lz.dag.argument(part, index, offset + part.bits());
    Ok(Lowered::Parts((lo, hi)))
}

/// Double-double arithmetic has no short inline sequence worth emitting.
fn arith(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, _) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let format = vt.float_format().ok_or_else(|| lz.unhandled())?;
    let Some(call) = Libcall::for_float_op(op, format) else {
        return Err(lz.unhandled());
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    Ok(Lowered::Replaced(lz.make_libcall(call, &[a, b], vt)?))
}

fn neg(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, part) = types(lz, n, slot);
    let (lo, hi) = operand_parts(lz, n, 0)?;
    let lo = lz.dag.unary(Opcode::FNeg, part, lo);
    let hi = lz.dag.unary(Opcode::FNeg, part, hi);
    Ok(Lowered::Parts((lo, hi)))
}

fn load(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, part) = types(lz, n, slot);
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 1));
    let (parts, chain) = load_parts(lz, chain, ptr, mem, part);
    lz.replace_value_with(n.value(1), chain)?;
    Ok(Lowered::Parts(parts))
}

/// An expanded integer's low limb holds the leading double's bits.
fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, part) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    if lz.value_action(x)? == TypeAction::ExpandInteger {
        let (il, ih) = lz.expanded_int(x)?;
        if lz.value_type(il).bits() == part.bits() {
            let hi = lz.dag.bitcast(part, il);
            let lo = lz.dag.bitcast(part, ih);
            return Ok(Lowered::Parts((lo, hi)));
        }
    }
    let (chain, ptr) = lz.spill(x, vt);
    let (parts, _) = load_parts(lz, chain, ptr, MemInfo::new(vt), part);
    Ok(Lowered::Parts(parts))
}

/// Widening is exact: the value becomes the leading double and the
/// correction is zero.
fn extend(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, part) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    let hi = if lz.value_type(x) == part {
        x
    } else {
        lz.dag.unary(Opcode::FpExtend, part, x)
    };
    let lo = lz.dag.constant_fp(part, 0);
    Ok(Lowered::Parts((lo, hi)))
}

fn int_to_fp(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, _) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let from = lz.value_type(x);
    let wide = ValueType::Int(routine_int_width(from.bits()));
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
    Ok(Lowered::Replaced(lz.make_libcall(call, &[x], vt)?))
}

fn select(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, part) = types(lz, n, slot);
    let cond = lz.operand(n, 0);
    let (al, ah) = operand_parts(lz, n, 1)?;
    let (bl, bh) = operand_parts(lz, n, 2)?;
    let lo = lz.dag.select(part, cond, al, bl);
    let hi = lz.dag.select(part, cond, ah, bh);
    Ok(Lowered::Parts((lo, hi)))
}

// ── Operands ────────────────────────────────────────────────────────

/// The leading double is stored first.
fn store_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    if i != 1 {
        return Err(lz.unhandled());
    }
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 2));
    let (lo, hi) = operand_parts(lz, n, 1)?;
    let part = lz.value_type(hi);
    let step = part.store_bytes();
    let first = lz.dag.store(chain, hi, ptr, mem.at_offset(part, 0));
    let lo_ptr = lz.dag.ptr_add(ptr, u64::from(step));
    let second = lz.dag.store(chain, lo, lo_ptr, mem.at_offset(part, step));
    Ok(OperandAction::Replace(lz.dag.token_factor(&[first, second])))
}

fn bitcast_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, i);
    let (lo, hi) = lz.expanded_float(x)?;
    let part = lz.value_type(hi);
    if vt.is_integer() && vt.bits() == 2 * part.bits() {
        let half = part.same_width_int();
        let lead = lz.dag.bitcast(half, hi);
        let trail = lz.dag.bitcast(half, lo);
        return Ok(OperandAction::Replace(lz.dag.build_pair(vt, lead, trail)));
    }
    Ok(OperandAction::Replace(lz.stack_round_trip(x, vt)))
}

/// Rounding to a double adds the parts; narrower formats go to the
/// runtime.
fn round_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let x = lz.operand(n, i);
    let (lo, hi) = lz.expanded_float(x)?;
    if vt == lz.value_type(hi) {
        return Ok(OperandAction::Replace(lz.dag.binary(Opcode::FAdd, vt, hi, lo)));
    }
    let Some(call) = Libcall::for_conversion(Opcode::FpRound, lz.value_type(x), vt) else {
        return Err(lz.unhandled());
    };
    Ok(OperandAction::Replace(lz.make_libcall(call, &[x], vt)?))
}

fn fp_to_int_operand(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Outcome {
    let vt = lz.result_type(n, 0);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, i);
    let wide = ValueType::Int(routine_int_width(vt.bits()));
    let Some(call) = Libcall::for_conversion(op, lz.value_type(x), wide) else {
        return Err(lz.unhandled());
    };
    let r = lz.make_libcall(call, &[x], wide)?;
    Ok(OperandAction::Replace(lz.dag.any_ext_or_trunc(r, vt)))
}

/// Leading doubles decide unless they are equal, in which case the
/// trailing doubles do. Equality needs both pairs to match.
fn setcc_operand(lz: &mut Legalizer<'_>, n: NodeId, _i: usize) -> Outcome {
    let Some(cc) = lz.dag[n].payload.cond() else {
        return Err(lz.unhandled());
    };
    let rt = lz.result_type(n, 0);
    let (al, ah) = operand_parts(lz, n, 0)?;
    let (bl, bh) = operand_parts(lz, n, 1)?;
    let value = match cc {
        CondCode::FOeq | CondCode::FUne => {
            let lead = lz.dag.setcc(rt, ah, bh, cc);
            let trail = lz.dag.setcc(rt, al, bl, cc);
            let join = if cc == CondCode::FOeq {
                Opcode::And
            } else {
                Opcode::Or
            };
            lz.dag.binary(join, rt, lead, trail)
        }
        _ => {
            let part = lz.value_type(ah);
            let cc_vt = lz.setcc_type(part);
            let tie = lz.dag.setcc(cc_vt, ah, bh, CondCode::FOeq);
            let trail = lz.dag.setcc(rt, al, bl, cc);
            let lead = lz.dag.setcc(rt, ah, bh, cc);
            lz.dag.select(rt, tie, trail, lead)
        }
    };
    Ok(OperandAction::Replace(value))
}
