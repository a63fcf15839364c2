//! Integer expansion: carry a value as a `(lo, hi)` pair of half-width
//! limbs, low-order first.
//!
//! # Design
//!
//! Handlers build the limbs out of ordinary nodes at the half type. When
//! the half type is itself illegal (an `i256` on a 32-bit target) those
//! nodes are legalized in turn, so every rule only ever reasons about one
//! level of splitting.
//!
//! Arithmetic with carries lives in [`arith`], shifts in [`shifts`], and
//! consumers of expanded values whose own results are legal in
//! [`operands`].

mod arith;
mod operands;
mod shifts;

use dag_ir::{limbs, LoadExt, MemInfo, NodeId, Opcode, Payload, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::{Lowered, OperandHandler, ResultHandler};
use crate::error::LegalizeError;
use crate::legalizer::{call_results, Legalizer};

type Limbs = (ValueRef, ValueRef);
type Expanded = Result<Lowered<Limbs>, LegalizeError>;

pub(crate) fn result_handler(op: Opcode) -> Option<ResultHandler<Limbs>> {
    let handler: ResultHandler<Limbs> = match op {
        Opcode::Constant => constant,
        Opcode::Undef => undef,
        Opcode::Argument => argument,
        Opcode::And | Opcode::Or | Opcode::Xor => logic,
        Opcode::Add | Opcode::Sub => arith::add_sub,
        Opcode::AddC | Opcode::SubC | Opcode::AddE | Opcode::SubE => arith::carry_arith,
        Opcode::Mul => arith::mul,
        Opcode::Neg => arith::neg,
        Opcode::SDiv | Opcode::UDiv | Opcode::SRem | Opcode::URem => arith::divide,
        Opcode::Ctlz | Opcode::Cttz | Opcode::Ctpop => arith::bit_count,
        Opcode::FpToSint | Opcode::FpToUint => arith::fp_to_int,
        Opcode::Shl | Opcode::Sra | Opcode::Srl => shifts::shift,
        Opcode::Bswap => bswap,
        Opcode::SignExtend | Opcode::ZeroExtend | Opcode::AnyExtend => extend,
        Opcode::Truncate => truncate,
        Opcode::SignExtendInReg => sign_extend_inreg,
        Opcode::BitCast => bitcast,
        Opcode::Load => load,
        Opcode::Select => select,
        Opcode::BuildPair => build_pair,
        Opcode::ExtractElement => extract_element,
        Opcode::ExtractVectorElt => extract_vector_elt,
        Opcode::Call => call_results,
        Opcode::EntryToken
        | Opcode::ConstantFp
        | Opcode::FrameIndex
        | Opcode::MulHu
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
        | Opcode::Store
        | Opcode::TokenFactor
        | Opcode::BrCond
        | Opcode::Ret
        | Opcode::BuildVector
        | Opcode::InsertVectorElt
        | Opcode::VectorShuffle
        | Opcode::ConcatVectors
        | Opcode::ExtractSubvector
        | Opcode::VecReduceAdd => return None,
    };
    Some(handler)
}

pub(crate) fn operand_handler(op: Opcode) -> Option<OperandHandler> {
    operands::handler(op)
}

// ── Helpers ─────────────────────────────────────────────────────────

/// `(original type, half type)` of result `slot`.
fn types(lz: &Legalizer<'_>, n: NodeId, slot: u32) -> (ValueType, ValueType) {
    let vt = lz.result_type(n, slot);
    (vt, lz.transform(vt))
}

/// Limbs of operand `i`.
fn operand_limbs(lz: &mut Legalizer<'_>, n: NodeId, i: usize) -> Result<Limbs, LegalizeError> {
    lz.expanded_int(lz.operand(n, i))
}

/// Copies of the sign bit of `v` across its whole width.
fn sign_fill(lz: &mut Legalizer<'_>, v: ValueRef) -> ValueRef {
    let vt = lz.value_type(v);
    let top = lz.index_constant(u64::from(vt.bits() - 1));
    lz.dag.binary(Opcode::Sra, vt, v, top)
}

/// High limb produced by extending a value whose low limb is `lo`.
fn extension_high(lz: &mut Legalizer<'_>, ext: Opcode, lo: ValueRef, h: ValueType) -> ValueRef {
    match ext {
        Opcode::SignExtend => sign_fill(lz, lo),
        Opcode::ZeroExtend => lz.dag.constant(h, 0),
        _ => lz.dag.undef(h),
    }
}

// ── Leaves ──────────────────────────────────────────────────────────

fn constant(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, h) = types(lz, n, slot);
    let Some(bits) = lz.dag[n].payload.bits() else {
        return Err(lz.unhandled());
    };
    let (lo, hi) = limbs::split(bits, vt.bits());
    let lo = lz.dag.constant(h, lo);
    let hi = lz.dag.constant(h, hi);
    Ok(Lowered::Parts((lo, hi)))
}

fn undef(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let lo = lz.dag.undef(h);
    let hi = lz.dag.undef(h);
    Ok(Lowered::Parts((lo, hi)))
}

/// The high limb sits `h` bits further into the argument.
fn argument(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let Payload::Argument { index, offset } = lz.dag[n].payload else {
        return Err(lz.unhandled());
    };
    let lo = lz.dag.argument(h, index, offset);
    let hi = lz.dag.argument(h, index, offset + h.bits());
    Ok(Lowered::Parts((lo, hi)))
}

// ── Bitwise ─────────────────────────────────────────────────────────

fn logic(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let (al, ah) = operand_limbs(lz, n, 0)?;
    let (bl, bh) = operand_limbs(lz, n, 1)?;
    let lo = lz.dag.binary(op, h, al, bl);
    let hi = lz.dag.binary(op, h, ah, bh);
    Ok(Lowered::Parts((lo, hi)))
}

/// Swapping the bytes of the whole value swaps the limbs too.
fn bswap(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    if h.bits() % 8 != 0 {
        return Err(lz.unhandled());
    }
    let (xl, xh) = operand_limbs(lz, n, 0)?;
    let lo = lz.dag.unary(Opcode::Bswap, h, xh);
    let hi = lz.dag.unary(Opcode::Bswap, h, xl);
    Ok(Lowered::Parts((lo, hi)))
}

// ── Conversions ─────────────────────────────────────────────────────

/// Sources no wider than a limb become the low limb; the high limb is
/// sign copies, zeros or unspecified. Wider sources are cut at the limb
/// boundary, shifting right in the extension's own sense.
fn extend(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let src = lz.value_type(x);
    let hb = h.bits();

    if src.bits() <= hb {
        let lo = if src.bits() == hb {
            x
        } else {
            lz.dag.unary(op, h, x)
        };
        let hi = extension_high(lz, op, lo, h);
        return Ok(Lowered::Parts((lo, hi)));
    }

    let lo = lz.dag.unary(Opcode::Truncate, h, x);
    let down = lz.index_constant(u64::from(hb));
    let shift = match op {
        Opcode::SignExtend => Opcode::Sra,
        _ => Opcode::Srl,
    };
    let top = lz.dag.binary(shift, src, x, down);
    let hi = lz.dag.unary(Opcode::Truncate, h, top);
    Ok(Lowered::Parts((lo, hi)))
}

fn truncate(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, h) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    if lz.value_action(x)? == TypeAction::ExpandInteger {
        // An expanded source is at least twice as wide, so its low limb
        // already covers the result.
        let (xl, _) = lz.expanded_int(x)?;
        return Ok(Lowered::Replaced(lz.dag.any_ext_or_trunc(xl, vt)));
    }
    let src = lz.value_type(x);
    let lo = lz.dag.unary(Opcode::Truncate, h, x);
    let down = lz.index_constant(u64::from(h.bits()));
    let top = lz.dag.binary(Opcode::Srl, src, x, down);
    let hi = lz.dag.unary(Opcode::Truncate, h, top);
    Ok(Lowered::Parts((lo, hi)))
}

fn sign_extend_inreg(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let Some(from) = lz.dag[n].payload.in_reg_type() else {
        return Err(lz.unhandled());
    };
    let (xl, xh) = operand_limbs(lz, n, 0)?;
    let (fb, hb) = (from.bits(), h.bits());
    if fb <= hb {
        let lo = if fb == hb {
            xl
        } else {
            lz.dag.sign_extend_inreg(h, xl, from)
        };
        let hi = sign_fill(lz, lo);
        Ok(Lowered::Parts((lo, hi)))
    } else {
        let hi = lz.dag.sign_extend_inreg(h, xh, ValueType::Int(fb - hb));
        Ok(Lowered::Parts((xl, hi)))
    }
}

fn bitcast(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, h) = types(lz, n, slot);
    let x = lz.operand(n, 0);
    match lz.value_action(x)? {
        // The leading double is the low half of the encoding.
        TypeAction::ExpandFloat => {
            let (fl, fh) = lz.expanded_float(x)?;
            let lo = lz.dag.bitcast(h, fh);
            let hi = lz.dag.bitcast(h, fl);
            Ok(Lowered::Parts((lo, hi)))
        }
        TypeAction::PromoteFloat => Ok(Lowered::Replaced(lz.promoted_float(x)?)),
        TypeAction::ScalarizeVector => {
            let s = lz.scalarized(x)?;
            Ok(Lowered::Replaced(lz.dag.bitcast(vt, s)))
        }
        TypeAction::SplitVector => {
            let (sl, sh) = lz.split_parts(x)?;
            if lz.value_type(sl).bits() != h.bits() || lz.value_type(sh).bits() != h.bits() {
                return Ok(Lowered::Parts(stack_limbs(lz, x, vt, h)));
            }
            let lo = lz.dag.bitcast(h, sl);
            let hi = lz.dag.bitcast(h, sh);
            Ok(Lowered::Parts((lo, hi)))
        }
        _ => Ok(Lowered::Parts(stack_limbs(lz, x, vt, h))),
    }
}

/// Store `x` to the stack and read it back as two limbs.
fn stack_limbs(lz: &mut Legalizer<'_>, x: ValueRef, vt: ValueType, h: ValueType) -> Limbs {
    let (chain, ptr) = lz.spill(x, vt);
    let lo = lz.dag.load(h, chain, ptr, MemInfo::new(h)).value(0);
    let hi_ptr = lz.dag.ptr_add(ptr, u64::from(h.store_bytes()));
    let hi = lz.dag.load(h, chain, hi_ptr, MemInfo::new(h)).value(0);
    (lo, hi)
}

// ── Memory and select ───────────────────────────────────────────────

/// Plain loads become two limb loads joined by a token factor. An
/// extending load reads only the bytes it covers: a memory type no wider
/// than a limb needs one load, a wider one splits at the limb boundary.
fn load(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let Some(mem) = lz.dag[n].payload.mem() else {
        return Err(lz.unhandled());
    };
    let hb = h.bits();
    if hb % 8 != 0 {
        return Err(lz.unhandled());
    }
    let (chain, ptr) = (lz.operand(n, 0), lz.operand(n, 1));
    let mb = mem.mem_vt.bits();

    let (lo, hi, out_chain) = if mem.ext != LoadExt::None && mb <= hb {
        let ext = if mb == hb { LoadExt::None } else { mem.ext };
        let ld = lz.dag.load(h, chain, ptr, mem.with_ext(ext));
        let lo = ld.value(0);
        let hi = match mem.ext {
            LoadExt::Sign => sign_fill(lz, lo),
            LoadExt::Zero => lz.dag.constant(h, 0),
            _ => lz.dag.undef(h),
        };
        (lo, hi, ld.value(1))
    } else {
        let step = h.store_bytes();
        let lo_ld = lz.dag.load(h, chain, ptr, mem.at_offset(h, 0).with_ext(LoadExt::None));
        let hi_vt = if mem.ext == LoadExt::None {
            h
        } else {
            ValueType::Int(mb - hb)
        };
        let hi_ext = if hi_vt == h { LoadExt::None } else { mem.ext };
        let hi_ptr = lz.dag.ptr_add(ptr, u64::from(step));
        let hi_ld = lz
            .dag
            .load(h, chain, hi_ptr, mem.at_offset(hi_vt, step).with_ext(hi_ext));
        let joined = lz.dag.token_factor(&[lo_ld.value(1), hi_ld.value(1)]);
        (lo_ld.value(0), hi_ld.value(0), joined)
    };
    lz.replace_value_with(n.value(1), out_chain)?;
    tracing::trace!(node = %n, bits = mb, "expanded load");
    Ok(Lowered::Parts((lo, hi)))
}

fn select(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let cond = lz.operand(n, 0);
    let (al, ah) = operand_limbs(lz, n, 1)?;
    let (bl, bh) = operand_limbs(lz, n, 2)?;
    let lo = lz.dag.select(h, cond, al, bl);
    let hi = lz.dag.select(h, cond, ah, bh);
    Ok(Lowered::Parts((lo, hi)))
}

// ── Pairs and vectors ───────────────────────────────────────────────

fn build_pair(lz: &mut Legalizer<'_>, n: NodeId, _slot: u32) -> Expanded {
    Ok(Lowered::Parts((lz.operand(n, 0), lz.operand(n, 1))))
}

fn extract_element(lz: &mut Legalizer<'_>, n: NodeId, _slot: u32) -> Expanded {
    let Some(part) = lz.dag[n].payload.part() else {
        return Err(lz.unhandled());
    };
    let (lo, hi) = operand_limbs(lz, n, 0)?;
    Ok(Lowered::Replaced(if part == 0 { lo } else { hi }))
}

/// Elements too wide for a register are read back from a stack copy of
/// the vector.
fn extract_vector_elt(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, _) = types(lz, n, slot);
    let (vec, idx) = (lz.operand(n, 0), lz.operand(n, 1));
    let vec_vt = lz.value_type(vec);
    let (chain, base) = lz.spill(vec, vec_vt);
    let ptr = lz.vector_element_pointer(base, vec_vt, idx)?;
    let ld = lz.dag.load(vt, chain, ptr, MemInfo::new(vt));
    Ok(Lowered::Replaced(ld.value(0)))
}

#[cfg(test)]
mod tests;
