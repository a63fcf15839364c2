use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use dag_ir::{
    CondCode, Dag, ElemType, FloatFormat, LoadExt, MemInfo, Opcode, TargetDesc, ValueRef,
    ValueType, VectorType,
};

use crate::classify::TypeAction;
use crate::test_helpers::{
    arg, check_equivalent, check_equivalent_in, count_ops, count_typed, ret, ret_after, vint,
};

const I8: ValueType = ValueType::I8;
const I16: ValueType = ValueType::I16;
const I32: ValueType = ValueType::I32;

const BYTES: &[u128] = &[0, 1, 0x7f, 0x80, 0xfe, 0xff];

fn binary_dag(op: Opcode, vt: ValueType) -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(vt, 0, 0);
    let b = dag.argument(vt, 1, 0);
    let r = dag.binary(op, vt, a, b);
    ret(&mut dag, &[r]);
    dag
}

fn unary_dag(vt: ValueType, build: impl FnOnce(&mut Dag, ValueRef) -> ValueRef) -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(vt, 0, 0);
    let r = build(&mut dag, a);
    ret(&mut dag, &[r]);
    dag
}

/// Every pair drawn from `values` at width `w`.
fn check_all_pairs(dag: &Dag, w: u32, target: &TargetDesc, values: &[u128]) -> Dag {
    let mut legal = dag.clone();
    for &a in values {
        for &b in values {
            legal = check_equivalent(dag, target, &[arg(a, w), arg(b, w)]);
        }
    }
    legal
}

fn check_values(dag: &Dag, w: u32, target: &TargetDesc, values: &[u128]) -> Dag {
    let mut legal = dag.clone();
    for &v in values {
        legal = check_equivalent(dag, target, &[arg(v, w)]);
    }
    legal
}

// ── Arithmetic ──────────────────────────────────────────────────────

#[test]
fn arithmetic_runs_at_the_wider_type() {
    for op in [Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::And, Opcode::Or, Opcode::Xor] {
        let dag = binary_dag(op, I8);
        let legal = check_all_pairs(&dag, 8, &TargetDesc::new(), BYTES);
        assert_eq!(count_typed(&legal, op, I32), 1, "{op}");
    }
}

#[test]
fn division_extends_its_inputs() {
    let divisors = [1, 3, 0x7f, 0x80, 0xff];
    for op in [Opcode::SDiv, Opcode::SRem, Opcode::UDiv, Opcode::URem] {
        let dag = binary_dag(op, I8);
        for &a in BYTES {
            for &b in &divisors {
                check_equivalent(&dag, &TargetDesc::new(), &[arg(a, 8), arg(b, 8)]);
            }
        }
    }
}

#[test]
fn negation_and_constants() {
    let dag = unary_dag(I8, |d, a| {
        let minus_three = d.constant(I8, 0xfd);
        let sum = d.binary(Opcode::Add, I8, a, minus_three);
        d.unary(Opcode::Neg, I8, sum)
    });
    check_values(&dag, 8, &TargetDesc::new(), BYTES);
}

#[test]
fn high_multiply_within_and_beyond_the_wide_type() {
    let dag = binary_dag(Opcode::MulHu, I16);
    check_all_pairs(&dag, 16, &TargetDesc::new(), &[0, 3, 0x8000, 0xffff]);
    let i24 = ValueType::Int(24);
    let dag = binary_dag(Opcode::MulHu, i24);
    let legal = check_all_pairs(&dag, 24, &TargetDesc::new(), &[0, 5, 0x80_0000, 0xff_ffff]);
    assert_eq!(count_typed(&legal, Opcode::MulHu, I32), 1);
}

// ── Shifts ──────────────────────────────────────────────────────────

#[test]
fn shifts_extend_what_they_shift_in() {
    for op in [Opcode::Shl, Opcode::Srl, Opcode::Sra] {
        let mut dag = Dag::new();
        let a = dag.argument(I8, 0, 0);
        let k = dag.argument(I32, 1, 0);
        let r = dag.binary(op, I8, a, k);
        ret(&mut dag, &[r]);
        for &v in BYTES {
            for amount in [0, 3, 7, 8, 9, 40] {
                check_equivalent(&dag, &TargetDesc::new(), &[arg(v, 8), arg(amount, 32)]);
            }
        }
    }
}

#[test]
fn promoted_amounts_are_zero_extended() {
    for op in [Opcode::Shl, Opcode::Srl, Opcode::Sra] {
        let mut dag = Dag::new();
        let a = dag.argument(I32, 0, 0);
        let k = dag.argument(I8, 1, 0);
        let r = dag.binary(op, I32, a, k);
        ret(&mut dag, &[r]);
        for amount in [1, 31, 32, 200] {
            check_equivalent(&dag, &TargetDesc::new(), &[arg(0x8765_4321, 32), arg(amount, 8)]);
        }
    }
}

// ── Bit manipulation ────────────────────────────────────────────────

#[test]
fn bit_counts_ignore_the_extra_bits() {
    for op in [Opcode::Ctlz, Opcode::Cttz, Opcode::Ctpop] {
        let dag = unary_dag(I8, |d, a| d.unary(op, I8, a));
        check_values(&dag, 8, &TargetDesc::new(), BYTES);
        let i24 = ValueType::Int(24);
        let dag = unary_dag(i24, |d, a| d.unary(op, i24, a));
        check_values(&dag, 24, &TargetDesc::new(), &[0, 1, 0x80_0000, 0x00_1000]);
    }
}

#[test]
fn byte_swap_shifts_down() {
    let dag = unary_dag(I16, |d, a| d.unary(Opcode::Bswap, I16, a));
    check_values(&dag, 16, &TargetDesc::new(), &[0x1234, 0xff00, 0x00ff]);
}

#[test]
fn sign_extend_in_register() {
    let dag = unary_dag(I16, |d, a| d.sign_extend_inreg(I16, a, I8));
    check_values(&dag, 16, &TargetDesc::new(), &[0x0080, 0x127f, 0xff01]);
}

// ── Conversions ─────────────────────────────────────────────────────

#[test]
fn extensions_between_promoted_and_legal_types() {
    let target = TargetDesc::new();
    for op in [Opcode::SignExtend, Opcode::ZeroExtend] {
        let dag = unary_dag(I8, |d, a| d.unary(op, I16, a));
        check_values(&dag, 8, &target, BYTES);
        let dag = unary_dag(I8, |d, a| d.unary(op, I32, a));
        check_values(&dag, 8, &target, BYTES);
        let dag = unary_dag(I8, |d, a| d.unary(op, ValueType::I64, a));
        check_values(&dag, 8, &target, BYTES);
    }
}

#[test]
fn truncation_from_every_source_kind() {
    let target = TargetDesc::new();
    let dag = unary_dag(I32, |d, a| d.unary(Opcode::Truncate, I8, a));
    check_values(&dag, 32, &target, &[0x1234_5680, 0xffff_ffff]);
    let dag = unary_dag(I16, |d, a| d.unary(Opcode::Truncate, I8, a));
    check_values(&dag, 16, &target, &[0x1280, 0x00ff]);
    let dag = unary_dag(ValueType::I64, |d, a| d.unary(Opcode::Truncate, I8, a));
    check_values(&dag, 64, &target, &[0x1_0000_0081]);
}

#[test]
fn odd_widths_promote_then_expand() {
    let i48 = ValueType::Int(48);
    let dag = binary_dag(Opcode::Add, i48);
    let values = [0, 1, 0xffff_ffff, 0xffff_ffff_ffff];
    let legal = check_all_pairs(&dag, 48, &TargetDesc::new(), &values);
    // Without carry nodes the high limb adds the compare-derived carry.
    assert_eq!(count_ops(&legal, Opcode::Add), 3);
    assert_eq!(count_ops(&legal, Opcode::AddC), 0);
}

#[test]
fn float_conversions_use_the_wider_integer() {
    let target = TargetDesc::new().with_legal_float(FloatFormat::F64);
    for op in [Opcode::SintToFp, Opcode::UintToFp] {
        let dag = unary_dag(I8, |d, a| d.unary(op, ValueType::F64, a));
        check_values(&dag, 8, &target, BYTES);
    }
    let dag = unary_dag(ValueType::F64, |d, a| d.unary(Opcode::FpToSint, I8, a));
    for x in [-5.0f64, 100.75, 0.0] {
        check_equivalent(&dag, &target, &[arg(u128::from(x.to_bits()), 64)]);
    }
}

// ── Compare and select ──────────────────────────────────────────────

#[test]
fn comparisons_extend_by_signedness() {
    for cc in [CondCode::Eq, CondCode::Ult, CondCode::Sgt, CondCode::Sle] {
        let mut dag = Dag::new();
        let a = dag.argument(I8, 0, 0);
        let b = dag.argument(I8, 1, 0);
        let r = dag.setcc(I32, a, b, cc);
        ret(&mut dag, &[r]);
        check_all_pairs(&dag, 8, &TargetDesc::new(), BYTES);
    }
}

#[test]
fn boolean_results_and_conditions() {
    let mut dag = Dag::new();
    let a = dag.argument(I32, 0, 0);
    let b = dag.argument(I32, 1, 0);
    let lt = dag.setcc(ValueType::I1, a, b, CondCode::Slt);
    let yes = dag.constant(I8, 0x81);
    let no = dag.constant(I8, 0x7e);
    let picked = dag.select(I8, lt, yes, no);
    let entry = dag.entry_chain();
    let br = dag.brcond(entry, lt, 1);
    ret_after(&mut dag, br, &[lt, picked]);
    let values = [0, 5, 0x8000_0000];
    let legal = check_all_pairs(&dag, 32, &TargetDesc::new(), &values);
    assert_eq!(count_typed(&legal, Opcode::SetCc, I32), 1);
}

#[test]
fn select_of_promoted_values() {
    let mut dag = Dag::new();
    let c = dag.argument(I32, 0, 0);
    let a = dag.argument(I8, 1, 0);
    let b = dag.argument(I8, 2, 0);
    let r = dag.select(I8, c, a, b);
    ret(&mut dag, &[r]);
    for cond in [0, 1] {
        check_equivalent(&dag, &TargetDesc::new(), &[arg(cond, 32), arg(0x81, 8), arg(0x7e, 8)]);
    }
}

// ── Memory ──────────────────────────────────────────────────────────

#[test]
fn loads_widen_with_the_right_extension() {
    let memory: BTreeMap<u64, u8> = [(0x10, 0x85), (0x11, 0x92)].into_iter().collect();
    let cases = [
        (I8, MemInfo::new(I8)),
        (I16, MemInfo::new(I8).with_ext(LoadExt::Sign)),
        (I16, MemInfo::new(I8).with_ext(LoadExt::Zero)),
        (I16, MemInfo::new(I16)),
    ];
    for (vt, mem) in cases {
        let mut dag = Dag::new();
        let entry = dag.entry_chain();
        let ptr = dag.constant(I32, 0x10);
        let ld = dag.load(vt, entry, ptr, mem);
        ret_after(&mut dag, ld.value(1), &[ld.value(0)]);
        let (legal, stats) = check_equivalent_in(&dag, &TargetDesc::new(), &[], &memory);
        assert_eq!(stats.results.get(TypeAction::PromoteInteger), 1);
        assert_eq!(count_typed(&legal, Opcode::Load, I32), 1);
    }
}

#[test]
fn stores_keep_their_memory_type() {
    for mem_vt in [I8, I16] {
        let mut dag = Dag::new();
        let entry = dag.entry_chain();
        let v = dag.argument(I16, 0, 0);
        let ptr = dag.constant(I32, 0x20);
        let chain = dag.store(entry, v, ptr, MemInfo::new(mem_vt));
        ret_after(&mut dag, chain, &[]);
        check_values(&dag, 16, &TargetDesc::new(), &[0xabcd]);
    }
}

// ── Pairs, reinterpretation and vectors ─────────────────────────────

#[test]
fn pairs_join_and_split_promoted_halves() {
    let mut dag = Dag::new();
    let lo = dag.argument(I16, 0, 0);
    let hi = dag.argument(I16, 1, 0);
    let pair = dag.build_pair(I32, lo, hi);
    let byte = dag.unary(Opcode::Truncate, I8, lo);
    let small = dag.build_pair(I16, byte, byte);
    let top = dag.extract_element(I16, pair, 1);
    let low_byte = dag.extract_element(I8, small, 1);
    ret(&mut dag, &[pair, top, low_byte]);
    check_equivalent(&dag, &TargetDesc::new(), &[arg(0x8001, 16), arg(0x7ffe, 16)]);
}

#[test]
fn bitcasts_through_memory() {
    let v2i8 = vint(8, 2);
    let target = TargetDesc::new().with_legal_vector(VectorType::new(ElemType::Int(8), 2));
    let dag = unary_dag(I16, |d, a| d.bitcast(v2i8, a));
    check_values(&dag, 16, &target, &[0x1234]);
    let dag = unary_dag(v2i8, |d, a| d.bitcast(I16, a));
    check_values(&dag, 16, &target, &[0xbeef]);
}

#[test]
fn vectors_of_promoted_elements() {
    let v4i8 = vint(8, 4);
    let target = TargetDesc::new().with_legal_vector(VectorType::new(ElemType::Int(8), 4));

    let mut dag = Dag::new();
    let a = dag.argument(I8, 0, 0);
    let b = dag.argument(I8, 1, 0);
    let vec = dag.build_vector(v4i8, &[a, b, a, b]);
    let idx = dag.argument(I32, 2, 0);
    let inserted = dag.insert_vector_elt(v4i8, vec, b, idx);
    let elt = dag.extract_vector_elt(I8, inserted, idx);
    let sum = dag.reduce_add(I8, inserted);
    ret(&mut dag, &[inserted, elt, sum]);

    for i in [0, 3] {
        let legal = check_equivalent(&dag, &target, &[arg(0x90, 8), arg(0x81, 8), arg(i, 32)]);
        assert_eq!(count_typed(&legal, Opcode::VecReduceAdd, I32), 1);
    }
}

#[allow(
    clippy::disallowed_types,
    reason = "proptest macros internally use Arc"
)]
mod proptest_promotion {
    use dag_ir::{CondCode, Dag, Opcode, TargetDesc, ValueType};
    use proptest::prelude::*;

    use super::binary_dag;
    use crate::test_helpers::{arg, check_equivalent, ret};

    proptest! {
        #[test]
        fn high_bits_never_leak(a in any::<u8>(), b in 1u8..) {
            for op in [Opcode::UDiv, Opcode::SRem, Opcode::Srl, Opcode::Sra, Opcode::Mul] {
                let dag = binary_dag(op, ValueType::I8);
                check_equivalent(&dag, &TargetDesc::new(), &[arg(u128::from(a), 8), arg(u128::from(b), 8)]);
            }
        }

        #[test]
        fn comparisons_agree(a in any::<u16>(), b in any::<u16>()) {
            for cc in [CondCode::Slt, CondCode::Uge, CondCode::Ne] {
                let mut dag = Dag::new();
                let x = dag.argument(ValueType::I16, 0, 0);
                let y = dag.argument(ValueType::I16, 1, 0);
                let r = dag.setcc(ValueType::I32, x, y, cc);
                ret(&mut dag, &[r]);
                check_equivalent(&dag, &TargetDesc::new(), &[arg(u128::from(a), 16), arg(u128::from(b), 16)]);
            }
        }
    }
}
