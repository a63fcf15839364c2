//! Limb arithmetic: carry chains, the schoolbook product and the
//! operations that fall back to runtime routines.

use dag_ir::{limbs, CondCode, Libcall, NodeId, Opcode, ValueRef, ValueType};

use crate::dispatch::Lowered;
use crate::legalizer::Legalizer;

use super::{operand_limbs, types, Expanded, Limbs};

/// Native carry nodes for `first` (no carry in) and `next` (carry in)
/// at `h`.
fn has_carry_ops(lz: &Legalizer<'_>, first: Opcode, next: Opcode, h: ValueType) -> bool {
    lz.target.is_operation_legal(first, h) && lz.target.is_operation_legal(next, h)
}

fn carry_opcodes(add: bool) -> (Opcode, Opcode) {
    if add {
        (Opcode::AddC, Opcode::AddE)
    } else {
        (Opcode::SubC, Opcode::SubE)
    }
}

/// `a ± b (± carry_in)` on one limb, recovering the carry (or borrow) out
/// with unsigned compares. Carries are `h`-typed zero or one.
fn limb_with_carry(
    lz: &mut Legalizer<'_>,
    add: bool,
    h: ValueType,
    a: ValueRef,
    b: ValueRef,
    carry_in: Option<ValueRef>,
) -> (ValueRef, ValueRef) {
    let cc_vt = lz.setcc_type(h);
    let (value, carry) = if add {
        let sum = lz.dag.binary(Opcode::Add, h, a, b);
        let wrapped = lz.dag.setcc(cc_vt, sum, a, CondCode::Ult);
        match carry_in {
            None => (sum, wrapped),
            Some(c) => {
                let total = lz.dag.binary(Opcode::Add, h, sum, c);
                let again = lz.dag.setcc(cc_vt, total, sum, CondCode::Ult);
                (total, lz.dag.binary(Opcode::Or, cc_vt, wrapped, again))
            }
        }
    } else {
        let diff = lz.dag.binary(Opcode::Sub, h, a, b);
        let wrapped = lz.dag.setcc(cc_vt, a, b, CondCode::Ult);
        match carry_in {
            None => (diff, wrapped),
            Some(c) => {
                let total = lz.dag.binary(Opcode::Sub, h, diff, c);
                let again = lz.dag.setcc(cc_vt, diff, c, CondCode::Ult);
                (total, lz.dag.binary(Opcode::Or, cc_vt, wrapped, again))
            }
        }
    };
    (value, lz.dag.zext_or_trunc(carry, h))
}

/// `a + b` or `a - b` on limb pairs.
fn add_sub_limbs(lz: &mut Legalizer<'_>, add: bool, h: ValueType, a: Limbs, b: Limbs) -> Limbs {
    let ((al, ah), (bl, bh)) = (a, b);
    let (first, next) = carry_opcodes(add);
    if has_carry_ops(lz, first, next, h) {
        let lo = lz.dag.carry_op(first, h, al, bl, None);
        let hi = lz.dag.carry_op(next, h, ah, bh, Some(lo.value(1)));
        return (lo.value(0), hi.value(0));
    }
    let (lo, carry) = limb_with_carry(lz, add, h, al, bl, None);
    let op = if add { Opcode::Add } else { Opcode::Sub };
    let hi = lz.dag.binary(op, h, ah, bh);
    let hi = lz.dag.binary(op, h, hi, carry);
    (lo, hi)
}

pub(super) fn add_sub(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let add = lz.dag[n].opcode == Opcode::Add;
    let a = operand_limbs(lz, n, 0)?;
    let b = operand_limbs(lz, n, 1)?;
    Ok(Lowered::Parts(add_sub_limbs(lz, add, h, a, b)))
}

pub(super) fn neg(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let x = operand_limbs(lz, n, 0)?;
    let zero = lz.dag.constant(h, 0);
    Ok(Lowered::Parts(add_sub_limbs(lz, false, h, (zero, zero), x)))
}

/// Carry nodes at an illegal width thread their flag through both limbs;
/// the flag result is taken from the high limb.
pub(super) fn carry_arith(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let add = matches!(op, Opcode::AddC | Opcode::AddE);
    let carry_in = matches!(op, Opcode::AddE | Opcode::SubE).then(|| lz.operand(n, 2));
    let (al, ah) = operand_limbs(lz, n, 0)?;
    let (bl, bh) = operand_limbs(lz, n, 1)?;
    let (first, next) = carry_opcodes(add);

    let (lo, hi, flag) = if has_carry_ops(lz, first, next, h) {
        let lo = match carry_in {
            Some(c) => lz.dag.carry_op(next, h, al, bl, Some(c)),
            None => lz.dag.carry_op(first, h, al, bl, None),
        };
        let hi = lz.dag.carry_op(next, h, ah, bh, Some(lo.value(1)));
        (lo.value(0), hi.value(0), hi.value(1))
    } else {
        let carry_in = carry_in.map(|c| {
            let one = lz.dag.constant(h, 1);
            let zero = lz.dag.constant(h, 0);
            lz.dag.select(h, c, one, zero)
        });
        let (lo, carry) = limb_with_carry(lz, add, h, al, bl, carry_in);
        let (hi, carry) = limb_with_carry(lz, add, h, ah, bh, Some(carry));
        let zero = lz.dag.constant(h, 0);
        let flag = lz.dag.setcc(ValueType::Flag, carry, zero, CondCode::Ne);
        (lo, hi, flag)
    };
    lz.replace_value_with(n.value(1), flag)?;
    Ok(Lowered::Parts((lo, hi)))
}

// ── Multiplication ──────────────────────────────────────────────────

/// The full `2h`-bit product of two limbs from four products of
/// quarter-width pieces.
fn wide_product(lz: &mut Legalizer<'_>, h: ValueType, a: ValueRef, b: ValueRef) -> Limbs {
    let q = h.bits() / 2;
    let mask = lz.dag.constant(h, limbs::mask(q));
    let shift = lz.index_constant(u64::from(q));
    let d = &mut *lz.dag;

    let a0 = d.binary(Opcode::And, h, a, mask);
    let a1 = d.binary(Opcode::Srl, h, a, shift);
    let b0 = d.binary(Opcode::And, h, b, mask);
    let b1 = d.binary(Opcode::Srl, h, b, shift);

    let t = d.binary(Opcode::Mul, h, a0, b0);
    let t_hi = d.binary(Opcode::Srl, h, t, shift);
    let u = d.binary(Opcode::Mul, h, a1, b0);
    let u = d.binary(Opcode::Add, h, u, t_hi);
    let u_lo = d.binary(Opcode::And, h, u, mask);
    let v = d.binary(Opcode::Mul, h, a0, b1);
    let v = d.binary(Opcode::Add, h, v, u_lo);

    let t_lo = d.binary(Opcode::And, h, t, mask);
    let v_up = d.binary(Opcode::Shl, h, v, shift);
    let lo = d.binary(Opcode::Or, h, v_up, t_lo);

    let u_hi = d.binary(Opcode::Srl, h, u, shift);
    let v_hi = d.binary(Opcode::Srl, h, v, shift);
    let hi = d.binary(Opcode::Mul, h, a1, b1);
    let hi = d.binary(Opcode::Add, h, hi, u_hi);
    let hi = d.binary(Opcode::Add, h, hi, v_hi);
    (lo, hi)
}

/// `lo*lo` at full width plus both cross products in the high limb; the
/// `hi*hi` term lies entirely above the result.
pub(super) fn mul(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (_, h) = types(lz, n, slot);
    let (al, ah) = operand_limbs(lz, n, 0)?;
    let (bl, bh) = operand_limbs(lz, n, 1)?;

    let (lo, hi) = if lz.target.is_operation_legal(Opcode::MulHu, h) {
        let lo = lz.dag.binary(Opcode::Mul, h, al, bl);
        let hi = lz.dag.binary(Opcode::MulHu, h, al, bl);
        (lo, hi)
    } else {
        wide_product(lz, h, al, bl)
    };
    let d = &mut *lz.dag;
    let cross_a = d.binary(Opcode::Mul, h, al, bh);
    let cross_b = d.binary(Opcode::Mul, h, ah, bl);
    let hi = d.binary(Opcode::Add, h, hi, cross_a);
    let hi = d.binary(Opcode::Add, h, hi, cross_b);
    Ok(Lowered::Parts((lo, hi)))
}

// ── Routine calls ───────────────────────────────────────────────────

pub(super) fn divide(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, _) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let Some(call) = Libcall::for_int_op(op, vt.bits()) else {
        return Err(lz.unhandled());
    };
    let (a, b) = (lz.operand(n, 0), lz.operand(n, 1));
    Ok(Lowered::Replaced(lz.make_libcall(call, &[a, b], vt)?))
}

/// The count routines return `int`; the count is widened back afterwards.
pub(super) fn bit_count(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, _) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let Some(call) = Libcall::for_int_op(op, vt.bits()) else {
        return Err(lz.unhandled());
    };
    let x = lz.operand(n, 0);
    let count = lz.make_libcall(call, &[x], call.result())?;
    Ok(Lowered::Replaced(lz.dag.zext_or_trunc(count, vt)))
}

pub(super) fn fp_to_int(lz: &mut Legalizer<'_>, n: NodeId, slot: u32) -> Expanded {
    let (vt, _) = types(lz, n, slot);
    let op = lz.dag[n].opcode;
    let x = lz.operand(n, 0);
    let Some(call) = Libcall::for_conversion(op, lz.value_type(x), vt) else {
        return Err(lz.unhandled());
    };
    Ok(Lowered::Replaced(lz.make_libcall(call, &[x], vt)?))
}
