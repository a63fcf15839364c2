//! Shifts of expanded integers.
//!
//! A constant amount picks one closed form by comparing it with the limb
//! width. A runtime amount computes both the "less than a limb" and the
//! "at least a limb" forms and selects between them. Both rely on shifts
//! by the full width or more producing zero (or sign copies for `Sra`).

use dag_ir::{CondCode, NodeId, Opcode, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::dispatch::Lowered;
use crate::error::LegalizeError;
use crate::legalizer::Legalizer;
use crate::promote_int::zext_promoted;

use super::{operand_limbs, sign_fill, types, Expanded, Limbs};

pub(super) fn shift(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = operand_limbs(lz, n, 0)?;
    let amount = lz.operand(n, 1);
    let limbs = match lz.constant_value(amount) {
        Some(k) => {
            let k = u64::try_from(k).unwrap_or(u64::MAX);
            constant_shift(lz, op, h, x, k)
        }
        None => {
            let amount = usable_amount(lz, amount)?;
            runtime_shift(lz, op, h, x, amount)
        }
    };
    Ok(Lowered::Parts(limbs))
}

/// Shift amount as a legal value with the same effect.
fn usable_amount(lz: &mut Legalizer<'_>, amount: ValueRef) -> Result<ValueRef, LegalizeError> {
    match lz.value_action(amount)? {
        TypeAction::Legal => Ok(amount),
        TypeAction::PromoteInteger => zext_promoted(lz, amount),
        TypeAction::ExpandInteger => {
            let (lo, hi) = lz.expanded_int(amount)?;
            Ok(saturate(lz, lo, hi))
        }
        _ => Err(lz.unhandled()),
    }
}

/// `lo` when `hi` is zero, otherwise all ones. Used where a two-limb
/// amount or index only matters up to "too large".
pub(super) fn saturate(lz: &mut Legalizer<'_>, lo: ValueRef, hi: ValueRef) -> ValueRef {
    let vt = lz.value_type(lo);
    let zero = lz.dag.constant(vt, 0);
    let ones = lz.dag.constant(vt, u128::MAX);
    let cc_vt = lz.setcc_type(vt);
    let big = lz.dag.setcc(cc_vt, hi, zero, CondCode::Ne);
    lz.dag.select(vt, big, ones, lo)
}

fn by(lz: &mut Legalizer<'_>, op: Opcode, h: ValueType, x: ValueRef, k: u64) -> ValueRef {
    let amount = lz.index_constant(k);
    lz.dag.binary(op, h, x, amount)
}

fn constant_shift(lz: &mut Legalizer<'_>, op: Opcode, h: ValueType, x: Limbs, k: u64) -> Limbs {
    let (xl, xh) = x;
    let hb = u64::from(h.bits());
    let w = 2 * hb;
    match op {
        Opcode::Shl => {
            if k == 0 {
                return x;
            }
            let zero = lz.dag.constant(h, 0);
            if k >= w {
                (zero, zero)
            } else if k > hb {
                (zero, by(lz, Opcode::Shl, h, xl, k - hb))
            } else if k == hb {
                (zero, xl)
            } else {
                let lo = by(lz, Opcode::Shl, h, xl, k);
                let hi = by(lz, Opcode::Shl, h, xh, k);
                let carried = by(lz, Opcode::Srl, h, xl, hb - k);
                (lo, lz.dag.binary(Opcode::Or, h, hi, carried))
            }
        }
        Opcode::Srl => {
            if k == 0 {
                return x;
            }
            let zero = lz.dag.constant(h, 0);
            if k >= w {
                (zero, zero)
            } else if k > hb {
                (by(lz, Opcode::Srl, h, xh, k - hb), zero)
            } else if k == hb {
                (xh, zero)
            } else {
                let lo = by(lz, Opcode::Srl, h, xl, k);
                let carried = by(lz, Opcode::Shl, h, xh, hb - k);
                let lo = lz.dag.binary(Opcode::Or, h, lo, carried);
                (lo, by(lz, Opcode::Srl, h, xh, k))
            }
        }
        _ => {
            if k == 0 {
                return x;
            }
            let sign = sign_fill(lz, xh);
            if k >= w {
                (sign, sign)
            } else if k > hb {
                (by(lz, Opcode::Sra, h, xh, k - hb), sign)
            } else if k == hb {
                (xh, sign)
            } else {
                let lo = by(lz, Opcode::Srl, h, xl, k);
                let carried = by(lz, Opcode::Shl, h, xh, hb - k);
                let lo = lz.dag.binary(Opcode::Or, h, lo, carried);
                (lo, by(lz, Opcode::Sra, h, xh, k))
            }
        }
    }
}

fn runtime_shift(
    lz: &mut Legalizer<'_>,
    op: Opcode,
    h: ValueType,
    x: Limbs,
    amount: ValueRef,
) -> Limbs {
    let (xl, xh) = x;
    let at = lz.value_type(amount);
    let half = lz.dag.constant(at, u128::from(h.bits()));
    let cc_vt = lz.setcc_type(at);
    let is_big = lz.dag.setcc(cc_vt, amount, half, CondCode::Uge);
    let beyond = lz.dag.binary(Opcode::Sub, at, amount, half);
    // `h - amount`; an amount of zero makes this a full-width shift, which
    // yields zero.
    let back = lz.dag.binary(Opcode::Sub, at, half, amount);

    let ((small_lo, small_hi), (big_lo, big_hi)) = match op {
        Opcode::Shl => {
            let lo = lz.dag.binary(Opcode::Shl, h, xl, amount);
            let hi = lz.dag.binary(Opcode::Shl, h, xh, amount);
            let carried = lz.dag.binary(Opcode::Srl, h, xl, back);
            let hi = lz.dag.binary(Opcode::Or, h, hi, carried);
            let big_hi = lz.dag.binary(Opcode::Shl, h, xl, beyond);
            let zero = lz.dag.constant(h, 0);
            ((lo, hi), (zero, big_hi))
        }
        Opcode::Srl => {
            let lo = lz.dag.binary(Opcode::Srl, h, xl, amount);
            let carried = lz.dag.binary(Opcode::Shl, h, xh, back);
            let lo = lz.dag.binary(Opcode::Or, h, lo, carried);
            let hi = lz.dag.binary(Opcode::Srl, h, xh, amount);
            let big_lo = lz.dag.binary(Opcode::Srl, h, xh, beyond);
            let zero = lz.dag.constant(h, 0);
            ((lo, hi), (big_lo, zero))
        }
        _ => {
            let lo = lz.dag.binary(Opcode::Srl, h, xl, amount);
            let carried = lz.dag.binary(Opcode::Shl, h, xh, back);
            let lo = lz.dag.binary(Opcode::Or, h, lo, carried);
            let hi = lz.dag.binary(Opcode::Sra, h, xh, amount);
            let big_lo = lz.dag.binary(Opcode::Sra, h, xh, beyond);
            let sign = sign_fill(lz, xh);
            ((lo, hi), (big_lo, sign))
        }
    };
    let lo = lz.dag.select(h, is_big, big_lo, small_lo);
    let hi = lz.dag.select(h, is_big, big_hi, small_hi);
    (lo, hi)
}
