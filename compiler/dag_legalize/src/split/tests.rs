use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use dag_ir::{
    interp::Bits, CondCode, Dag, ElemType, LoadExt, MemInfo, Opcode, TargetDesc, ValueRef,
    ValueType, VectorType,
};

use crate::classify::TypeAction;
use crate::test_helpers::{
    arg, check_equivalent, check_equivalent_in, count_ops, count_typed, ret, ret_after, vint,
};

fn simd() -> TargetDesc {
    TargetDesc::ilp32().with_simd(128)
}

/// Eight distinct 32-bit lanes packed into one argument.
fn lanes8(seed: u32) -> Bits {
    let mut bits = Bits::new();
    for i in 0..8u32 {
        let lane = seed.wrapping_mul(0x9e37_79b9).wrapping_add(i.wrapping_mul(0x0101_0101));
        bits.push(u128::from(lane), 32);
    }
    bits
}

fn binary_dag(op: Opcode, vt: ValueType) -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(vt, 0, 0);
    let b = dag.argument(vt, 1, 0);
    let r = dag.binary(op, vt, a, b);
    ret(&mut dag, &[r]);
    dag
}

// ── Elementwise ─────────────────────────────────────────────────────

#[test]
fn wide_add_splits_into_two_legal_halves() {
    let dag = binary_dag(Opcode::Add, vint(32, 8));
    let (legal, stats) =
        check_equivalent_in(&dag, &simd(), &[lanes8(1), lanes8(2)], &BTreeMap::new());
    assert_eq!(count_typed(&legal, Opcode::Add, vint(32, 4)), 2);
    assert_eq!(count_ops(&legal, Opcode::Add), 2);
    assert_eq!(stats.results.get(TypeAction::SplitVector), 3);
}

#[test]
fn splitting_reaches_the_legal_width_level_by_level() {
    let mut bits = lanes8(3);
    bits.append(&lanes8(4));
    let dag = binary_dag(Opcode::Xor, vint(32, 16));
    let legal = check_equivalent(&dag, &simd(), &[bits.clone(), bits]);
    assert_eq!(count_typed(&legal, Opcode::Xor, vint(32, 4)), 4);

    // With no legal vectors every lane ends up scalar.
    let dag = binary_dag(Opcode::Mul, vint(32, 8));
    let (legal, stats) =
        check_equivalent_in(&dag, &TargetDesc::new(), &[lanes8(5), lanes8(6)], &BTreeMap::new());
    assert_eq!(count_typed(&legal, Opcode::Mul, ValueType::I32), 8);
    assert!(stats.results.get(TypeAction::ScalarizeVector) >= 8);
}

#[test]
fn odd_counts_give_the_extra_lane_to_the_leading_half() {
    let dag = binary_dag(Opcode::Sub, vint(32, 3));
    let args = [arg(0x3_0000_0002_0000_0001, 96), arg(0x1_0000_0001_0000_0001, 96)];
    let legal = check_equivalent(&dag, &TargetDesc::new(), &args);
    assert_eq!(count_typed(&legal, Opcode::Sub, ValueType::I32), 3);
}

#[test]
fn conversions_and_shifts_split_their_operands() {
    let mut dag = Dag::new();
    let a = dag.argument(vint(16, 8), 0, 0);
    let amount = dag.argument(ValueType::I32, 1, 0);
    let wide = dag.unary(Opcode::SignExtend, vint(32, 8), a);
    let r = dag.binary(Opcode::Shl, vint(32, 8), wide, amount);
    ret(&mut dag, &[r]);
    for shift in [0, 3, 17] {
        let args = [arg(0x8000_7fff_0001_ffff_1234_8765_4321_0000, 128), arg(shift, 32)];
        let legal = check_equivalent(&dag, &simd(), &args);
        assert_eq!(count_typed(&legal, Opcode::Shl, vint(32, 4)), 2);
    }
}

#[test]
fn lane_select_splits_the_condition() {
    let mut dag = Dag::new();
    let a = dag.argument(vint(32, 8), 0, 0);
    let b = dag.argument(vint(32, 8), 1, 0);
    let c = dag.setcc(vint(32, 8), a, b, CondCode::Slt);
    let r = dag.select(vint(32, 8), c, a, b);
    ret(&mut dag, &[r]);
    let legal = check_equivalent(&dag, &simd(), &[lanes8(7), lanes8(8)]);
    assert_eq!(count_typed(&legal, Opcode::Select, vint(32, 4)), 2);
    assert_eq!(count_typed(&legal, Opcode::SetCc, vint(32, 4)), 2);
}

// ── Memory ──────────────────────────────────────────────────────────

#[test]
fn loads_and_stores_split_at_the_midpoint() {
    let memory: BTreeMap<u64, u8> = (0..32u8).map(|i| (0x100 + u64::from(i), i * 7)).collect();
    let v8i32 = vint(32, 8);
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let src = dag.constant(ValueType::I32, 0x100);
    let dst = dag.constant(ValueType::I32, 0x200);
    let ld = dag.load(v8i32, entry, src, MemInfo::new(v8i32).with_align(16));
    let x = dag.argument(v8i32, 0, 0);
    let sum = dag.binary(Opcode::Add, v8i32, ld.value(0), x);
    let chain = dag.store(ld.value(1), sum, dst, MemInfo::new(v8i32).with_align(16));
    ret_after(&mut dag, chain, &[]);

    let (legal, _) = check_equivalent_in(&dag, &simd(), &[lanes8(9)], &memory);
    assert_eq!(count_typed(&legal, Opcode::Load, vint(32, 4)), 2);
    assert_eq!(count_ops(&legal, Opcode::Store), 2);
}

#[test]
fn extending_loads_split_the_memory_type() {
    let memory: BTreeMap<u64, u8> =
        [0x80u8, 0x7f, 0x01, 0xff, 0x00, 0x10, 0xf0, 0x55]
            .into_iter()
            .enumerate()
            .map(|(i, b)| (0x40 + i as u64, b))
            .collect();
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let src = dag.constant(ValueType::I32, 0x40);
    let mem = MemInfo::new(vint(8, 8)).with_ext(LoadExt::Sign);
    let ld = dag.load(vint(32, 8), entry, src, mem);
    ret_after(&mut dag, ld.value(1), &[ld.value(0)]);
    let (legal, _) = check_equivalent_in(&dag, &simd(), &[], &memory);
    assert_eq!(count_typed(&legal, Opcode::Load, vint(32, 4)), 2);
}

// ── Lanes ───────────────────────────────────────────────────────────

#[test]
fn element_access_routes_to_the_holding_half() {
    let v8i32 = vint(32, 8);
    let mut dag = Dag::new();
    let elems: Vec<ValueRef> = (0..8).map(|i| dag.argument(ValueType::I32, i, 0)).collect();
    let idx = dag.argument(ValueType::I32, 8, 0);
    let y = dag.argument(ValueType::I32, 9, 0);
    let v = dag.build_vector(v8i32, &elems);
    let w = dag.insert_vector_elt(v8i32, v, y, idx);
    let five = dag.constant(ValueType::I32, 5);
    let fixed = dag.extract_vector_elt(ValueType::I32, w, five);
    let moving = dag.extract_vector_elt(ValueType::I32, w, idx);
    ret(&mut dag, &[fixed, moving]);

    for i in [0, 3, 4, 5, 7, 9] {
        let mut args: Vec<Bits> = (0..8).map(|k| arg(100 + k, 32)).collect();
        args.push(arg(i, 32));
        args.push(arg(0xabcd, 32));
        let legal = check_equivalent(&dag, &simd(), &args);
        assert_eq!(count_typed(&legal, Opcode::BuildVector, vint(32, 4)), 2);
    }
}

#[test]
fn shuffles_draw_from_the_pieces_they_need() {
    let v8i32 = vint(32, 8);
    let mut dag = Dag::new();
    let a = dag.argument(v8i32, 0, 0);
    let b = dag.argument(v8i32, 1, 0);
    let reversed = dag.shuffle(v8i32, a, b, (0..8).rev().map(Some).collect());
    ret(&mut dag, &[reversed]);
    let legal = check_equivalent(&dag, &simd(), &[lanes8(10), lanes8(11)]);
    assert_eq!(count_typed(&legal, Opcode::VectorShuffle, vint(32, 4)), 2);

    let mut dag = Dag::new();
    let a = dag.argument(v8i32, 0, 0);
    let b = dag.argument(v8i32, 1, 0);
    let mask = vec![Some(0), Some(4), Some(8), Some(12), None, Some(1), Some(15), Some(20)];
    let mixed = dag.shuffle(v8i32, a, b, mask);
    ret(&mut dag, &[mixed]);
    check_equivalent(&dag, &simd(), &[lanes8(12), lanes8(13)]);
}

#[test]
fn concatenation_and_subvectors_follow_the_halves() {
    let v2i32 = VectorType::new(ElemType::Int(32), 2);
    let v4i32 = vint(32, 4);

    let mut dag = Dag::new();
    let a = dag.argument(v4i32, 0, 0);
    let b = dag.argument(v4i32, 1, 0);
    let both = dag.concat_vectors(vint(32, 8), &[a, b]);
    let r = dag.binary(Opcode::Add, vint(32, 8), both, both);
    ret(&mut dag, &[r]);
    let legal = check_equivalent(&dag, &simd(), &[arg(0x1111, 128), arg(0x2222 << 96, 128)]);
    assert_eq!(count_ops(&legal, Opcode::ConcatVectors), 0);

    let target = TargetDesc::ilp32().with_legal_vector(v2i32);
    let mut dag = Dag::new();
    let parts: Vec<ValueRef> =
        (0..3).map(|i| dag.argument(ValueType::Vector(v2i32), i, 0)).collect();
    let six = dag.concat_vectors(vint(32, 6), &parts);
    ret(&mut dag, &[six]);
    let args: Vec<Bits> = (0..3).map(|i| arg(0x0000_0002_0000_0001 * (i + 1), 64)).collect();
    check_equivalent(&dag, &target, &args);

    let mut dag = Dag::new();
    let wide = dag.argument(vint(32, 8), 0, 0);
    let upper = dag.extract_subvector(v4i32, wide, 4);
    let middle = dag.extract_subvector(v4i32, wide, 2);
    ret(&mut dag, &[upper, middle]);
    let legal = check_equivalent(&dag, &simd(), &[lanes8(14)]);
    assert_eq!(count_ops(&legal, Opcode::ExtractSubvector), 0);
}

// ── Reinterpretation and reduction ──────────────────────────────────

#[test]
fn bitcasts_between_split_vectors_stay_in_registers() {
    let target = TargetDesc::lp64().with_simd(128);
    let mut dag = Dag::new();
    let a = dag.argument(vint(32, 8), 0, 0);
    let q = dag.bitcast(vint(64, 4), a);
    let r = dag.binary(Opcode::Add, vint(64, 4), q, q);
    ret(&mut dag, &[r]);
    let legal = check_equivalent(&dag, &target, &[lanes8(15)]);
    assert_eq!(count_ops(&legal, Opcode::Store), 0);
    assert_eq!(count_typed(&legal, Opcode::Add, vint(64, 2)), 2);

    let mut dag = Dag::new();
    let a = dag.argument(vint(32, 2), 0, 0);
    let f = dag.bitcast(ValueType::F64, a);
    let g = dag.unary(Opcode::FNeg, ValueType::F64, f);
    ret(&mut dag, &[g]);
    check_equivalent(&dag, &TargetDesc::ilp32(), &[arg(0x3ff0_0000_0000_0000, 64)]);

    let mut dag = Dag::new();
    let a = dag.argument(vint(32, 4), 0, 0);
    let wide = dag.bitcast(ValueType::I128, a);
    let r = dag.binary(Opcode::Add, ValueType::I128, wide, wide);
    ret(&mut dag, &[r]);
    check_equivalent(&dag, &TargetDesc::lp64(), &[arg(u128::MAX - 5, 128)]);
}

#[test]
fn reductions_combine_the_halves() {
    let mut dag = Dag::new();
    let a = dag.argument(vint(32, 8), 0, 0);
    let narrow = dag.reduce_add(ValueType::I32, a);
    ret(&mut dag, &[narrow]);
    let legal = check_equivalent(&dag, &simd(), &[lanes8(16)]);
    assert_eq!(count_ops(&legal, Opcode::VecReduceAdd), 1);
    assert_eq!(count_typed(&legal, Opcode::Add, vint(32, 4)), 1);

    let target = TargetDesc::lp64().with_simd(128);
    let mut dag = Dag::new();
    let a = dag.argument(vint(32, 8), 0, 0);
    let wide = dag.reduce_add(ValueType::I64, a);
    ret(&mut dag, &[wide]);
    let legal = check_equivalent(&dag, &target, &[lanes8(17)]);
    assert_eq!(count_ops(&legal, Opcode::VecReduceAdd), 2);
    assert_eq!(count_typed(&legal, Opcode::Add, ValueType::I64), 1);
}
