//! Integer promotion: carry a value in a wider legal integer.
//!
//! A promoted value agrees with the original in its low `w` bits; the
//! bits above are unspecified. Operations whose result depends on those
//! bits (division, right shifts, comparisons, bit counts) first extend
//! their inputs in register with [`sext_promoted`] or [`zext_promoted`].

mod operands;

use dag_ir::{limbs, LoadExt, NodeId, Opcode, Payload, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandHandler, ResultHandler};
use crate::error::LegalizeError;
use crate::legalizer::{call_results, Legalizer};

type Promoted = Result<Lowered<ValueRef>, LegalizeError>;

pub(crate) fn result_handler(op: Opcode) -> Option<ResultHandler<ValueRef>> {
    let handler: ResultHandler<ValueRef> = match op {
        Opcode::Constant => constant,
        Opcode::Undef => undef,
        Opcode::Argument => argument,
        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::And | Opcode::Or | Opcode::Xor => {
            binary
        }
        Opcode::MulHu => mul_high,
        Opcode::SDiv | Opcode::SRem => signed_binary,
        Opcode::UDiv | Opcode::URem => unsigned_binary,
        Opcode::Shl | Opcode::Sra | Opcode::Srl => shift,
        Opcode::Neg => neg,
        Opcode::Ctlz => ctlz,
        Opcode::Cttz => cttz,
        Opcode::Ctpop => ctpop,
        Opcode::Bswap => bswap,
        Opcode::SignExtend | Opcode::ZeroExtend | Opcode::AnyExtend => extend,
        Opcode::Truncate => truncate,
        Opcode::SignExtendInReg => sign_extend_inreg,
        Opcode::FpToSint | Opcode::FpToUint => fp_to_int,
        Opcode::Load => load,
        Opcode::Select => select,
        Opcode::SetCc => setcc,
        Opcode::BitCast => bitcast,
        Opcode::BuildPair => build_pair,
        Opcode::ExtractElement => extract_element,
        Opcode::ExtractVectorElt => extract_vector_elt,
        Opcode::VecReduceAdd => reduce_add,
        Opcode::Call => call_results,
        Opcode::EntryToken
        | Opcode::ConstantFp
        | Opcode::FrameIndex
        | Opcode::AddC
        | Opcode::SubC
        | Opcode::AddE
        | Opcode::SubE
        | Opcode::SintToFp
        | Opcode::UintToFp
        | Opcode::FpExtend
        | Opcode::FpRound
        | Opcode::FAdd
        | Opcode::FSub
        | Opcode::FMul
        | Opcode::FDiv
        | Opcode::FNeg
        | Opcode::Store
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::Ret
        | Opcode::BuildVector
        | Opcode::InsertVectorElt
        | Opcode::VectorShuffle
        | Opcode::ConcatVectors
        | Opcode::ExtractSubvector => return None,
    };
    Some(handler)
}

pub(crate) fn operand_handler(op: Opcode) -> Option<OperandHandler> {
    operands::handler(op)
}

// ── Extension helpers ───────────────────────────────────────────────

/// Promoted form of `v` with the bits above its width cleared.
pub(crate) fn zext_promoted(lz: &mut Legalizer<'_>, v: ValueRef) -> Result<ValueRef, LegalizeError> {
    let p = lz.promoted_int(v)?;
    let vt = lz.value_type(v);
    Ok(lz.dag.zero_extend_inreg(p, vt))
}

/// Promoted form of `v` with its sign bit copied upward.
pub(crate) fn sext_promoted(lz: &mut Legalizer<'_>, v: ValueRef) -> Result<ValueRef, LegalizeError> {
    let p = lz.promoted_int(v)?;
    let (vt, nvt) = (lz.value_type(v), lz.value_type(p));
    Ok(lz.dag.sign_extend_inreg(nvt, p, vt))
}

/// `v` widened or narrowed to `vt`; new high bits are zero.
pub(crate) fn zext_to(
    lz: &mut Legalizer<'_>,
    v: ValueRef,
    vt: ValueType,
) -> Result<ValueRef, LegalizeError> {
    match lz.value_action(v)? {
        TypeAction::Legal => Ok(lz.dag.zext_or_trunc(v, vt)),
        TypeAction::PromoteInteger => {
            let z = zext_promoted(lz, v)?;
            Ok(lz.dag.zext_or_trunc(z, vt))
        }
        _ => Err(lz.unhandled()),
    }
}

/// `v` widened or narrowed to `vt`; new high bits are unspecified.
pub(crate) fn anyext_to(
    lz: &mut Legalizer<'_>,
    v: ValueRef,
    vt: ValueType,
) -> Result<ValueRef, LegalizeError> {
    match lz.value_action(v)? {
        TypeAction::Legal => Ok(lz.dag.any_ext_or_trunc(v, vt)),
        TypeAction::PromoteInteger => {
            let p = lz.promoted_int(v)?;
            Ok(lz.dag.any_ext_or_trunc(p, vt))
        }
        _ => Err(lz.unhandled()),
    }
}

/// `(original type, promoted type)` of result `slot`.
fn types(lz: &Legalizer<'_>, n: NodeId, slot: u32) -> (ValueType, ValueType) {
    let vt = lz.result_type(n, slot);
    (vt, lz.transform(vt))
}

// ── Leaves ──────────────────────────────────────────────────────────

fn constant(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let Some(bits) = lz.dag[n].payload.bits() else {
        return Err(lz.unhandled());
    };
    // Booleans widen with zeros, everything else keeps its sign.
    let value = if vt == ValueType::I1 {
        bits
    } else {
        limbs::sign_extend_to(bits, vt.bits(), nvt.bits())
    };
    Ok(Lowered::Parts(lz.dag.constant(nvt, value)))
}

fn undef(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    Ok(Lowered::Parts(lz.dag.undef(nvt)))
}

fn argument(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let Payload::Argument { index, offset } = lz.dag[n].payload else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Parts(lz.dag.argument(nvt, index, offset)))
}

// ── Arithmetic ──────────────────────────────────────────────────────

fn binary(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let a = lz.promoted_int(lz.operand(n, 0))?;
    let b = lz.promoted_int(lz.operand(n, 1))?;
    Ok(Lowered::Parts(lz.dag.binary(op, nvt, a, b)))
}

fn signed_binary(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let a = lz.operand(n, 0);
    let a = sext_promoted(lz, a)?;
    let b = lz.operand(n, 1);
    let b = sext_promoted(lz, b)?;
    Ok(Lowered::Parts(lz.dag.binary(op, nvt, a, b)))
}

fn unsigned_binary(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let a = lz.operand(n, 0);
    let a = zext_promoted(lz, a)?;
    let b = lz.operand(n, 1);
    let b = zext_promoted(lz, b)?;
    Ok(Lowered::Parts(lz.dag.binary(op, nvt, a, b)))
}

/// The high half of a `w`-bit product from the `2w`-bit product of the
/// zero-extended inputs. When `2w` does not fit the promoted type the
/// bits above it come from a high multiply at that type.
fn mul_high(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let (w, wide) = (vt.bits(), nvt.bits());
    let a = lz.operand(n, 0);
    let a = zext_promoted(lz, a)?;
    let b = lz.operand(n, 1);
    let b = zext_promoted(lz, b)?;
    let product = lz.dag.binary(Opcode::Mul, nvt, a, b);
    let shift = lz.index_constant(u64::from(w));
    let low = lz.dag.binary(Opcode::Srl, nvt, product, shift);
    if 2 * w <= wide {
        return Ok(Lowered::Parts(low));
    }
    let high = lz.dag.binary(Opcode::MulHu, nvt, a, b);
    let up = lz.index_constant(u64::from(wide - w));
    let high = lz.dag.binary(Opcode::Shl, nvt, high, up);
    Ok(Lowered::Parts(lz.dag.binary(Opcode::Or, nvt, low, high)))
}

/// Shifts keep their amount. Bits shifted in from above the original
/// width must match what the original would have seen, so right shifts
/// extend their input first.
fn shift(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let value = match op {
        Opcode::Sra => sext_promoted(lz, x)?,
        Opcode::Srl => zext_promoted(lz, x)?,
        _ => lz.promoted_int(x)?,
    };
    let amount = lz.operand(n, 1);
    let amount = match lz.value_action(amount)? {
        TypeAction::PromoteInteger => zext_promoted(lz, amount)?,
        _ => amount,
    };
    Ok(Lowered::Parts(lz.dag.binary(op, nvt, value, amount)))
}

fn neg(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let a = lz.promoted_int(lz.operand(n, 0))?;
    Ok(Lowered::Parts(lz.dag.unary(Opcode::Neg, nvt, a)))
}

// ── Bit counts ──────────────────────────────────────────────────────

fn ctlz(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    let x = zext_promoted(lz, x)?;
    let count = lz.dag.unary(Opcode::Ctlz, nvt, x);
    let extra = lz.dag.constant(nvt, u128::from(nvt.bits() - vt.bits()));
    Ok(Lowered::Parts(lz.dag.binary(Opcode::Sub, nvt, count, extra)))
}

/// A set bit just above the original width caps the count at `w`.
fn cttz(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let x = lz.promoted_int(lz.operand(n, 0))?;
    let stop = lz.dag.constant(nvt, 1u128 << vt.bits());
    let x = lz.dag.binary(Opcode::Or, nvt, x, stop);
    Ok(Lowered::Parts(lz.dag.unary(Opcode::Cttz, nvt, x)))
}

fn ctpop(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    let x = zext_promoted(lz, x)?;
    Ok(Lowered::Parts(lz.dag.unary(Opcode::Ctpop, nvt, x)))
}

fn bswap(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    if vt.bits() % 8 != 0 || nvt.bits() % 8 != 0 {
        return Err(lz.unhandled());
    }
    let x = lz.promoted_int(lz.operand(n, 0))?;
    let swapped = lz.dag.unary(Opcode::Bswap, nvt, x);
    let down = lz.index_constant(u64::from(nvt.bits() - vt.bits()));
    Ok(Lowered::Parts(lz.dag.binary(Opcode::Srl, nvt, swapped, down)))
}

// ── Conversions ─────────────────────────────────────────────────────

fn extend(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let promoted = match (op, lz.value_action(x)?) {
        (Opcode::SignExtend, TypeAction::Legal) => lz.dag.sext_or_trunc(x, nvt),
        (Opcode::SignExtend, TypeAction::PromoteInteger) => {
            let s = sext_promoted(lz, x)?;
            lz.dag.sext_or_trunc(s, nvt)
        }
        (Opcode::ZeroExtend, _) => zext_to(lz, x, nvt)?,
        (_, _) => anyext_to(lz, x, nvt)?,
    };
    Ok(Lowered::Parts(promoted))
}

fn truncate(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    let promoted = match lz.value_action(x)? {
        TypeAction::ExpandInteger => {
            let (lo, _) = lz.expanded_int(x)?;
            if vt.bits() > lz.value_type(lo).bits() {
                return Err(lz.unhandled());
            }
            lz.dag.any_ext_or_trunc(lo, nvt)
        }
        _ => anyext_to(lz, x, nvt)?,
    };
    Ok(Lowered::Parts(promoted))
}

fn sign_extend_inreg(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let Some(from) = lz.dag[n].payload.in_reg_type() else {
        return Err(lz.unhandled());
    };
    let x = lz.promoted_int(lz.operand(n, 0))?;
    Ok(Lowered::Parts(lz.dag.sign_extend_inreg(nvt, x, from)))
}

/// Convert straight to the wider integer; every in-range result of the
/// narrow conversion is representable there.
fn fp_to_int(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    Ok(Lowered::Parts(lz.dag.unary(op, nvt, x)))
}

fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    match lz.value_action(x)? {
        TypeAction::PromoteFloat => {
            let bits = lz.promoted_float(x)?;
            Ok(Lowered::Parts(lz.dag.any_ext_or_trunc(bits, nvt)))
        }
        TypeAction::ScalarizeVector => {
            let s = lz.scalarized(x)?;
            if lz.value_type(s).is_integer() {
                Ok(Lowered::Parts(lz.dag.any_ext_or_trunc(s, nvt)))
            } else {
                Ok(Lowered::Replaced(lz.stack_round_trip(x, vt)))
            }
        }
        _ => Ok(Lowered::Replaced(lz.stack_round_trip(x, vt))),
    }
}

// ── Memory, select and compare ──────────────────────────────────────

/// Plain loads become any-extending loads of the promoted type.
fn load(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let mem = match mem.ext {
        LoadExt::None => mem.with_ext(LoadExt::Any),
        _ => mem,
    };
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 1));
    let ld = lz.dag.load(nvt, chain, ptr, mem);
    lz.replace_value_with(n.value(1), ld.value(1))?;
    Ok(Lowered::Parts(ld.value(0)))
}

fn select(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let cond = lz.operand(n, 0);
    let a = lz.promoted_int(lz.operand(n, 1))?;
    let b = lz.promoted_int(lz.operand(n, 2))?;
    Ok(Lowered::Parts(lz.dag.select(nvt, cond, a, b)))
}

/// The comparison itself is unchanged; only its result widens.
fn setcc(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let Some(cc) = lz.dag[n].payload.cond() else {
        return Err(lz.unhandled());
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    Ok(Lowered::Parts(lz.dag.setcc(nvt, a, b, cc)))
}

// ── Pairs and vectors ───────────────────────────────────────────────

fn build_pair(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let (lo, hi) = (lz.operand(n, 0), lz.operand(n, 1));
    let half = lz.value_type(lo).bits();
    let lo = zext_to(lz, lo, nvt)?;
    let hi = anyext_to(lz, hi, nvt)?;
    let up = lz.index_constant(u64::from(half));
    let hi = lz.dag.binary(Opcode::Shl, nvt, hi, up);
    Ok(Lowered::Parts(lz.dag.binary(Opcode::Or, nvt, lo, hi)))
}

fn extract_element(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (vt, nvt) = types(lz, n, slot);
    let Some(part) = lz.dag[n].payload.part() else {
        return Err(lz.unhandled());
    };
    let x = lz.operand(n, 0);
    let src = match lz.value_action(x)? {
        TypeAction::Legal => x,
        TypeAction::PromoteInteger => lz.promoted_int(x)?,
        TypeAction::ExpandInteger => {
            let (lo, hi) = lz.expanded_int(x)?;
            let half = if part == 0 { lo } else { hi };
            return Ok(Lowered::Parts(lz.dag.any_ext_or_trunc(half, nvt)));
        }
        _ => return Err(lz.unhandled()),
    };
    let src = if part == 0 {
        src
    } else {
        let src_vt = lz.value_type(src);
        let down = lz.index_constant(u64::from(vt.bits()));
        lz.dag.binary(Opcode::Srl, src_vt, src, down)
    };
    Ok(Lowered::Parts(lz.dag.any_ext_or_trunc(src, nvt)))
}

fn extract_vector_elt(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let (vec, idx) = (lz.operand(n, 0), lz.operand(n, 1));
    Ok(Lowered::Parts(lz.dag.extract_vector_elt(nvt, vec, idx)))
}

fn reduce_add(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Promoted {
    let (_, nvt) = types(lz, n, slot);
    let vec = lz.operand(n, 0);
    Ok(Lowered::Parts(lz.dag.reduce_add(nvt, vec)))
}

#[cfg(test)]
mod tests;
