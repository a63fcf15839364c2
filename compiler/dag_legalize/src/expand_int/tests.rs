use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use dag_ir::{CondCode, Dag, LoadExt, MemInfo, Opcode, TargetDesc, ValueType};

use crate::classify::TypeAction;
use crate::test_helpers::{
    arg, check_equivalent, check_equivalent_in, count_ops, count_typed, ret, ret_after, vint,
};

const I64: ValueType = ValueType::I64;

const PAIRS: &[(u128, u128)] = &[
    (0, 0),
    (1, 0xffff_ffff_ffff_ffff),
    (0xffff_ffff, 1),
    (0x1_0000_0000, 0xffff_ffff),
    (0x8000_0000_0000_0000, 0x8000_0000_0000_0000),
    (0x1234_5678_9abc_def0, 0x0fed_cba9_8765_4321),
    (0xffff_fffe_0000_0005, 0xffff_fffe_0000_0007),
];

fn binary_dag(op: Opcode, vt: ValueType) -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(vt, 0, 0);
    let b = dag.argument(vt, 1, 0);
    let r = dag.binary(op, vt, a, b);
    ret(&mut dag, &[r]);
    dag
}

/// Check `op` at `vt` on every pair; returns the last legalized graph.
fn check_pairs(dag: &Dag, vt: ValueType, target: &TargetDesc, pairs: &[(u128, u128)]) -> Dag {
    let w = vt.bits();
    let mut legal = dag.clone();
    for &(a, b) in pairs {
        legal = check_equivalent(dag, target, &[arg(a, w), arg(b, w)]);
    }
    legal
}

fn unary_dag(vt: ValueType, build: impl FnOnce(&mut Dag, dag_ir::ValueRef) -> dag_ir::ValueRef) -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(vt, 0, 0);
    let r = build(&mut dag, a);
    ret(&mut dag, &[r]);
    dag
}

fn check_values(dag: &Dag, width: u32, target: &TargetDesc, values: &[u128]) -> Dag {
    let mut legal = dag.clone();
    for &v in values {
        legal = check_equivalent(dag, target, &[arg(v, width)]);
    }
    legal
}

const VALUES: &[u128] = &[
    0,
    1,
    0xffff_ffff,
    0x8000_0000_0000_0001,
    0x0123_4567_89ab_cdef,
    0xffff_ffff_ffff_ffff,
];

// ── Add and subtract ────────────────────────────────────────────────

#[test]
fn add_uses_native_carry_chain() {
    let dag = binary_dag(Opcode::Add, I64);
    let legal = check_pairs(&dag, I64, &TargetDesc::ilp32(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::AddC), 1);
    assert_eq!(count_ops(&legal, Opcode::AddE), 1);
}

#[test]
fn add_without_carry_ops_compares() {
    let dag = binary_dag(Opcode::Add, I64);
    let legal = check_pairs(&dag, I64, &TargetDesc::new(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::AddC), 0);
    assert!(count_ops(&legal, Opcode::SetCc) >= 1);
}

#[test]
fn sub_borrows_in_both_modes() {
    let dag = binary_dag(Opcode::Sub, I64);
    let legal = check_pairs(&dag, I64, &TargetDesc::ilp32(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::SubC), 1);
    assert_eq!(count_ops(&legal, Opcode::SubE), 1);
    let legal = check_pairs(&dag, I64, &TargetDesc::new(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::SubE), 0);
}

#[test]
fn add_across_two_levels() {
    let dag = binary_dag(Opcode::Add, ValueType::I128);
    let pairs = [
        (u128::MAX, 1),
        (0xffff_ffff_ffff_ffff, 1),
        (0x0123_4567_89ab_cdef_0123_4567_89ab_cdef, 0xfedc_ba98_7654_3210_fedc_ba98_7654_3210),
    ];
    let legal = check_pairs(&dag, ValueType::I128, &TargetDesc::ilp32(), &pairs);
    assert_eq!(count_typed(&legal, Opcode::Add, ValueType::I64), 0);
    assert!(count_typed(&legal, Opcode::AddE, ValueType::I32) >= 1);

    // With carries at the half width the chain stays two nodes long.
    let legal = check_pairs(&dag, ValueType::I128, &TargetDesc::lp64(), &pairs);
    assert_eq!(count_typed(&legal, Opcode::AddC, I64), 1);
    assert_eq!(count_typed(&legal, Opcode::AddE, I64), 1);
}

#[test]
fn neg_subtracts_from_zero() {
    let dag = unary_dag(I64, |d, a| d.unary(Opcode::Neg, I64, a));
    check_values(&dag, 64, &TargetDesc::new(), VALUES);
}

#[test]
fn logic_works_limbwise() {
    for op in [Opcode::And, Opcode::Or, Opcode::Xor] {
        let dag = binary_dag(op, I64);
        let legal = check_pairs(&dag, I64, &TargetDesc::new(), PAIRS);
        assert_eq!(count_typed(&legal, op, ValueType::I32), 2);
    }
}

#[test]
fn constants_split_into_limbs() {
    let dag = unary_dag(I64, |d, a| {
        let c = d.constant(I64, 0x1_0000_0001);
        d.binary(Opcode::Add, I64, a, c)
    });
    check_values(&dag, 64, &TargetDesc::new(), VALUES);
}

// ── Carry nodes ─────────────────────────────────────────────────────

fn carry_dag() -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(I64, 0, 0);
    let b = dag.argument(I64, 1, 0);
    let first = dag.carry_op(Opcode::AddC, I64, a, b, None);
    let second = dag.carry_op(Opcode::AddE, I64, a, b, Some(first.value(1)));
    let one = dag.constant(ValueType::I32, 1);
    let zero = dag.constant(ValueType::I32, 0);
    let carried = dag.select(ValueType::I32, second.value(1), one, zero);
    ret(&mut dag, &[first.value(0), second.value(0), carried]);
    dag
}

#[test]
fn carry_nodes_thread_their_flag() {
    let dag = carry_dag();
    let legal = check_pairs(&dag, I64, &TargetDesc::ilp32(), PAIRS);
    assert_eq!(count_typed(&legal, Opcode::AddC, ValueType::I32), 1);
    assert_eq!(count_typed(&legal, Opcode::AddE, ValueType::I32), 3);
}

#[test]
fn carry_nodes_without_native_support() {
    let dag = carry_dag();
    let legal = check_pairs(&dag, I64, &TargetDesc::new(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::AddE), 0);
}

// ── Multiply ────────────────────────────────────────────────────────

#[test]
fn mul_uses_high_multiply() {
    let dag = binary_dag(Opcode::Mul, I64);
    let legal = check_pairs(&dag, I64, &TargetDesc::ilp32(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::MulHu), 1);
}

#[test]
fn mul_builds_wide_product() {
    let dag = binary_dag(Opcode::Mul, I64);
    let legal = check_pairs(&dag, I64, &TargetDesc::new(), PAIRS);
    assert_eq!(count_ops(&legal, Opcode::MulHu), 0);
}

// ── Shifts ──────────────────────────────────────────────────────────

const SHIFTS: [Opcode; 3] = [Opcode::Shl, Opcode::Srl, Opcode::Sra];

#[test]
fn constant_shifts_pick_closed_forms() {
    for op in SHIFTS {
        for k in [0u128, 1, 31, 32, 33, 63, 64, 100] {
            let dag = unary_dag(I64, |d, a| {
                let amount = d.constant(ValueType::I32, k);
                d.binary(op, I64, a, amount)
            });
            let legal = check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
            assert_eq!(count_ops(&legal, Opcode::Select), 0, "{op} by {k}");
        }
    }
}

#[test]
fn runtime_shifts_select_between_forms() {
    for op in SHIFTS {
        let mut dag = Dag::new();
        let a = dag.argument(I64, 0, 0);
        let amount = dag.argument(ValueType::I32, 1, 0);
        let r = dag.binary(op, I64, a, amount);
        ret(&mut dag, &[r]);
        for k in [0u128, 1, 31, 32, 33, 63, 64, 90] {
            for &v in VALUES {
                check_equivalent(&dag, &TargetDesc::ilp32(), &[arg(v, 64), arg(k, 32)]);
            }
        }
    }
}

#[test]
fn expanded_shift_amounts_saturate() {
    for op in SHIFTS {
        let dag = binary_dag(op, I64);
        let amounts = [5u128, 40, (1 << 32) | 3];
        for k in amounts {
            check_equivalent(
                &dag,
                &TargetDesc::ilp32(),
                &[arg(0x8123_4567_89ab_cdef, 64), arg(k, 64)],
            );
        }
    }
}

#[test]
fn promoted_shift_amounts_are_zero_extended() {
    let mut dag = Dag::new();
    let a = dag.argument(I64, 0, 0);
    let amount = dag.argument(ValueType::I8, 1, 0);
    let r = dag.binary(Opcode::Shl, I64, a, amount);
    ret(&mut dag, &[r]);
    for k in [3u128, 40, 200] {
        check_equivalent(&dag, &TargetDesc::new(), &[arg(0xdead_beef, 64), arg(k, 8)]);
    }
}

// ── Comparisons ─────────────────────────────────────────────────────

#[test]
fn comparisons_combine_limb_compares() {
    let codes = [
        CondCode::Eq,
        CondCode::Ne,
        CondCode::Ult,
        CondCode::Ule,
        CondCode::Ugt,
        CondCode::Uge,
        CondCode::Slt,
        CondCode::Sle,
        CondCode::Sgt,
        CondCode::Sge,
    ];
    for cc in codes {
        let mut dag = Dag::new();
        let a = dag.argument(I64, 0, 0);
        let b = dag.argument(I64, 1, 0);
        let r = dag.setcc(ValueType::I32, a, b, cc);
        ret(&mut dag, &[r]);
        let legal = check_pairs(&dag, I64, &TargetDesc::ilp32(), PAIRS);
        let selects = count_ops(&legal, Opcode::Select);
        assert_eq!(selects, usize::from(!cc.is_equality()), "{cc:?}");
    }
}

// ── Conversions ─────────────────────────────────────────────────────

#[test]
fn extensions_fill_the_high_limb() {
    for op in [Opcode::SignExtend, Opcode::ZeroExtend] {
        let dag = unary_dag(ValueType::I32, |d, a| d.unary(op, I64, a));
        check_values(&dag, 32, &TargetDesc::ilp32(), &[0, 5, 0x8000_0000, 0xffff_ffff]);
        let dag = unary_dag(ValueType::I16, |d, a| d.unary(op, I64, a));
        check_values(&dag, 16, &TargetDesc::ilp32(), &[0, 0x7fff, 0x8000, 0xffff]);
    }
}

#[test]
fn sign_extension_to_four_limbs() {
    let dag = unary_dag(I64, |d, a| d.unary(Opcode::SignExtend, ValueType::I128, a));
    check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
}

#[test]
fn truncation_reads_the_low_limb() {
    for vt in [ValueType::I32, ValueType::I16] {
        let dag = unary_dag(I64, |d, a| d.unary(Opcode::Truncate, vt, a));
        check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
    }
    let dag = unary_dag(ValueType::I128, |d, a| d.unary(Opcode::Truncate, I64, a));
    check_values(
        &dag,
        128,
        &TargetDesc::ilp32(),
        &[u128::MAX, 0x1111_2222_3333_4444_5555_6666_7777_8888],
    );
}

#[test]
fn sign_extend_in_register_within_and_across_limbs() {
    for from in [ValueType::I16, ValueType::Int(48)] {
        let dag = unary_dag(I64, |d, a| d.sign_extend_inreg(I64, a, from));
        check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
    }
}

#[test]
fn byte_swap_swaps_limbs() {
    let dag = unary_dag(I64, |d, a| d.unary(Opcode::Bswap, I64, a));
    check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
}

#[test]
fn build_pair_and_extract_element() {
    let mut dag = Dag::new();
    let lo = dag.argument(ValueType::I32, 0, 0);
    let hi = dag.argument(ValueType::I32, 1, 0);
    let pair = dag.build_pair(I64, lo, hi);
    let one = dag.constant(I64, 1);
    let sum = dag.binary(Opcode::Add, I64, pair, one);
    let top = dag.extract_element(ValueType::I32, sum, 1);
    ret(&mut dag, &[sum, top]);
    check_equivalent(&dag, &TargetDesc::new(), &[arg(0xffff_ffff, 32), arg(7, 32)]);
}

// ── Routines ────────────────────────────────────────────────────────

#[test]
fn division_calls_routines() {
    let pairs = [
        (100, 7),
        (0xffff_ffff_ffff_ff9c, 7),
        (0x8000_0000_0000_0000, 0xffff_ffff_ffff_ffff),
        (0x1234_5678_9abc_def0, 0x1_0000_0000),
    ];
    for op in [Opcode::SDiv, Opcode::UDiv, Opcode::SRem, Opcode::URem] {
        let dag = binary_dag(op, I64);
        let legal = check_pairs(&dag, I64, &TargetDesc::new(), &pairs);
        assert_eq!(count_ops(&legal, Opcode::Call), 1);
    }
}

#[test]
fn bit_counts_call_routines() {
    for op in [Opcode::Ctlz, Opcode::Cttz, Opcode::Ctpop] {
        let dag = unary_dag(I64, |d, a| d.unary(op, I64, a));
        let legal = check_values(&dag, 64, &TargetDesc::ilp32(), &[1, 0x1_0000_0000, u128::from(u64::MAX)]);
        assert_eq!(count_ops(&legal, Opcode::Call), 1);
    }
}

#[test]
fn float_to_wide_integer_calls_routine() {
    let dag = unary_dag(ValueType::F64, |d, a| d.unary(Opcode::FpToSint, I64, a));
    let inputs = [-12345.75f64, 3.0e15, 0.5];
    for x in inputs {
        let legal = check_equivalent(&dag, &TargetDesc::ilp32(), &[arg(u128::from(x.to_bits()), 64)]);
        assert_eq!(count_ops(&legal, Opcode::Call), 1);
    }
}

#[test]
fn wide_integer_to_double_is_exact_inline() {
    for op in [Opcode::SintToFp, Opcode::UintToFp] {
        let dag = unary_dag(I64, |d, a| d.unary(op, ValueType::F64, a));
        let legal = check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
        assert_eq!(count_ops(&legal, Opcode::Call), 0);
        assert_eq!(count_ops(&legal, Opcode::FAdd), 1);
    }
}

#[test]
fn wide_integer_to_single_calls_routine() {
    let dag = unary_dag(I64, |d, a| d.unary(Opcode::SintToFp, ValueType::F32, a));
    let legal = check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
    assert_eq!(count_ops(&legal, Opcode::Call), 1);
}

// ── Memory ──────────────────────────────────────────────────────────

fn memory_with(addr: u64, bytes: &[u8]) -> BTreeMap<u64, u8> {
    bytes
        .iter()
        .enumerate()
        .map(|(i, b)| (addr + i as u64, *b))
        .collect()
}

fn load_dag(mem: MemInfo) -> Dag {
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let ptr = dag.constant(ValueType::I32, 0x100);
    let ld = dag.load(I64, entry, ptr, mem);
    ret_after(&mut dag, ld.value(1), &[ld.value(0)]);
    dag
}

#[test]
fn loads_split_at_the_limb_boundary() {
    let memory = memory_with(0x100, &[0x01, 0x02, 0x03, 0x04, 0x85, 0x86, 0x87, 0x88]);
    let cases = [
        MemInfo::new(I64),
        MemInfo::new(ValueType::I16).with_ext(LoadExt::Sign),
        MemInfo::new(ValueType::I32).with_ext(LoadExt::Zero),
        MemInfo::new(ValueType::Int(48)).with_ext(LoadExt::Sign),
        MemInfo::new(ValueType::Int(48)).with_ext(LoadExt::Zero),
    ];
    for mem in cases {
        let dag = load_dag(mem);
        let (legal, stats) = check_equivalent_in(&dag, &TargetDesc::ilp32(), &[], &memory);
        assert!(stats.results.get(TypeAction::ExpandInteger) >= 1);
        assert!(count_typed(&legal, Opcode::Load, ValueType::I32) >= 1);
    }
}

fn store_dag(mem_vt: ValueType) -> Dag {
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let v = dag.argument(I64, 0, 0);
    let ptr = dag.constant(ValueType::I32, 0x200);
    let chain = dag.store(entry, v, ptr, MemInfo::new(mem_vt));
    ret_after(&mut dag, chain, &[]);
    dag
}

#[test]
fn stores_write_each_limb() {
    for (mem_vt, stores) in [(I64, 2), (ValueType::I16, 1), (ValueType::Int(48), 2)] {
        let dag = store_dag(mem_vt);
        let legal = check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
        assert_eq!(count_ops(&legal, Opcode::Store), stores, "{mem_vt}");
    }
}

#[test]
fn select_picks_limbwise() {
    let mut dag = Dag::new();
    let c = dag.argument(ValueType::I32, 0, 0);
    let a = dag.argument(I64, 1, 0);
    let b = dag.argument(I64, 2, 0);
    let r = dag.select(I64, c, a, b);
    ret(&mut dag, &[r]);
    for cond in [0, 1] {
        check_equivalent(
            &dag,
            &TargetDesc::ilp32(),
            &[arg(cond, 32), arg(0x1111_2222_3333_4444, 64), arg(0x5555_6666_7777_8888, 64)],
        );
    }
}

// ── Reinterpretation and vectors ────────────────────────────────────

#[test]
fn bitcast_to_limb_vector_builds_it() {
    let target = TargetDesc::ilp32().with_simd(64);
    let dag = unary_dag(I64, |d, a| d.bitcast(vint(32, 2), a));
    let legal = check_values(&dag, 64, &target, VALUES);
    assert_eq!(count_ops(&legal, Opcode::BuildVector), 1);
}

#[test]
fn bitcast_through_memory() {
    let dag = unary_dag(ValueType::F64, |d, a| d.bitcast(I64, a));
    check_values(&dag, 64, &TargetDesc::ilp32(), &[u128::from(1.5f64.to_bits())]);
    let dag = unary_dag(I64, |d, a| d.bitcast(ValueType::F64, a));
    check_values(&dag, 64, &TargetDesc::ilp32(), VALUES);
}

#[test]
fn wide_elements_move_through_limb_vectors() {
    let target = TargetDesc::ilp32().with_simd(128);
    let v2i64 = vint(64, 2);

    let mut dag = Dag::new();
    let a = dag.argument(I64, 0, 0);
    let b = dag.argument(I64, 1, 0);
    let built = dag.build_vector(v2i64, &[a, b]);
    let one = dag.constant(ValueType::I32, 1);
    let inserted = dag.insert_vector_elt(v2i64, built, a, one);
    ret(&mut dag, &[built, inserted]);
    let legal = check_pairs(&dag, I64, &target, PAIRS);
    assert_eq!(count_typed(&legal, Opcode::BuildVector, vint(32, 4)), 1);

    let mut dag = Dag::new();
    let v = dag.argument(v2i64, 0, 0);
    let idx = dag.argument(ValueType::I32, 1, 0);
    let elt = dag.extract_vector_elt(I64, v, idx);
    ret(&mut dag, &[elt]);
    for i in [0, 1] {
        check_equivalent(
            &dag,
            &target,
            &[arg(0x0123_4567_89ab_cdef_fedc_ba98_7654_3210, 128), arg(i, 32)],
        );
    }
}

#[test]
fn runtime_insert_index_out_of_range_keeps_the_vector() {
    let target = TargetDesc::ilp32().with_simd(128);
    let v2i64 = vint(64, 2);

    let mut dag = Dag::new();
    let a = dag.argument(I64, 0, 0);
    let b = dag.argument(I64, 1, 0);
    let idx = dag.argument(ValueType::I32, 2, 0);
    let built = dag.build_vector(v2i64, &[a, b]);
    let inserted = dag.insert_vector_elt(v2i64, built, b, idx);
    ret(&mut dag, &[inserted]);

    // The doubled index wraps to 0 or 1 for the top-bit cases.
    for i in [0, 1, 2, 0x8000_0000, 0x8000_0001, 0xffff_ffff] {
        let args = [arg(0x1111, 64), arg(0x2222, 64), arg(i, 32)];
        let legal = check_equivalent(&dag, &target, &args);
        assert_eq!(count_typed(&legal, Opcode::Select, v2i64), 1);
    }
}

#[test]
fn branch_condition_uses_low_limb() {
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let c = dag.argument(I64, 0, 0);
    let br = dag.brcond(entry, c, 3);
    ret_after(&mut dag, br, &[]);
    for v in [0, 1, 0x1_0000_0000] {
        check_equivalent(&dag, &TargetDesc::ilp32(), &[arg(v, 64)]);
    }
}

#[allow(
    clippy::disallowed_types,
    reason = "proptest macros internally use Arc"
)]
mod proptest_limbs {
    use dag_ir::{Opcode, TargetDesc, ValueType};
    use proptest::prelude::*;

    use super::binary_dag;
    use crate::test_helpers::{arg, check_equivalent};

    proptest! {
        #[test]
        fn add_sub_mul_match_wide_arithmetic(a in any::<u64>(), b in any::<u64>()) {
            for op in [Opcode::Add, Opcode::Sub, Opcode::Mul] {
                let dag = binary_dag(op, ValueType::I64);
                for target in [TargetDesc::new(), TargetDesc::ilp32()] {
                    check_equivalent(&dag, &target, &[arg(u128::from(a), 64), arg(u128::from(b), 64)]);
                }
            }
        }

        #[test]
        fn shifts_match_for_any_amount(a in any::<u64>(), k in 0u128..80) {
            for op in [Opcode::Shl, Opcode::Srl, Opcode::Sra] {
                let mut dag = dag_ir::Dag::new();
                let x = dag.argument(ValueType::I64, 0, 0);
                let amount = dag.argument(ValueType::I32, 1, 0);
                let r = dag.binary(op, ValueType::I64, x, amount);
                crate::test_helpers::ret(&mut dag, &[r]);
                check_equivalent(&dag, &TargetDesc::ilp32(), &[arg(u128::from(a), 64), arg(k, 32)]);
            }
        }
    }
}
