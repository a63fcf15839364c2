use std::collections::BTreeMap;

use pretty_assertions::assert_eq;

use dag_ir::{CondCode, Dag, FloatFormat, MemInfo, Opcode, TargetDesc, ValueRef, ValueType};

use crate::classify::TypeAction;
use crate::test_helpers::{
    arg, check_equivalent, check_equivalent_in, count_ops, find_ops, ret, ret_after,
};

const F32: ValueType = ValueType::F32;
const F64: ValueType = ValueType::F64;

fn bits32(x: f32) -> u128 {
    u128::from(x.to_bits())
}

fn bits64(x: f64) -> u128 {
    u128::from(x.to_bits())
}

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

/// Symbols of every reachable routine call, in graph order.
fn routines(dag: &Dag) -> Vec<String> {
    find_ops(dag, Opcode::Call)
        .into_iter()
        .filter_map(|id| dag[id].payload.routine().map(|r| r.symbol.clone()))
        .collect()
}

const SAMPLES: &[f32] = &[1.5, -2.25, 1.0e30, 3.0];

// ── Arithmetic ──────────────────────────────────────────────────────

#[test]
fn arithmetic_calls_the_runtime() {
    let cases = [
        (Opcode::FAdd, "__addsf3"),
        (Opcode::FSub, "__subsf3"),
        (Opcode::FMul, "__mulsf3"),
        (Opcode::FDiv, "__divsf3"),
    ];
    for (op, symbol) in cases {
        let dag = binary_dag(op, F32);
        for &a in SAMPLES {
            for &b in SAMPLES {
                let legal =
                    check_equivalent(&dag, &TargetDesc::new(), &[arg(bits32(a), 32), arg(bits32(b), 32)]);
                assert_eq!(routines(&legal), vec![symbol.to_owned()]);
            }
        }
    }
}

#[test]
fn constants_and_negation_need_no_calls() {
    let mut dag = Dag::new();
    let x = dag.argument(F32, 0, 0);
    let c = dag.argument(ValueType::I32, 1, 0);
    let neg = dag.unary(Opcode::FNeg, F32, x);
    let two = dag.constant_fp(F32, bits32(2.0));
    let r = dag.select(F32, c, neg, two);
    ret(&mut dag, &[r]);
    for (v, cond) in [(0.5f32, 1), (-7.0, 1), (3.0, 0)] {
        let legal = check_equivalent(&dag, &TargetDesc::new(), &[arg(bits32(v), 32), arg(cond, 32)]);
        assert_eq!(count_ops(&legal, Opcode::Call), 0);
        assert_eq!(count_ops(&legal, Opcode::Xor), 1);
    }
}

#[test]
fn doubles_on_a_narrow_machine_are_carried_in_limbs() {
    let dag = binary_dag(Opcode::FMul, F64);
    let args = [arg(bits64(1.25), 64), arg(bits64(-3.5e100), 64)];
    let (legal, stats) = check_equivalent_in(&dag, &TargetDesc::new(), &args, &BTreeMap::new());
    assert!(stats.results.get(TypeAction::PromoteFloat) >= 1);
    assert!(stats.results.get(TypeAction::ExpandInteger) >= 1);

    let calls = find_ops(&legal, Opcode::Call);
    assert_eq!(calls.len(), 1);
    let call = &legal[calls[0]];
    assert_eq!(call.operands.len(), 4);
    assert_eq!(call.results.as_slice(), &[ValueType::I32, ValueType::I32]);
    assert_eq!(routines(&legal), vec!["__muldf3".to_owned()]);
}

// ── Comparisons ─────────────────────────────────────────────────────

#[test]
fn comparisons_test_the_routine_result() {
    let predicates = [
        CondCode::FOeq,
        CondCode::FUne,
        CondCode::FOlt,
        CondCode::FOle,
        CondCode::FOgt,
        CondCode::FOge,
        CondCode::FUno,
        CondCode::FOrd,
    ];
    let pairs = [(1.0f32, 2.0f32), (2.0, 1.0), (1.0, 1.0), (f32::NAN, 1.0)];
    for cc in predicates {
        let mut dag = Dag::new();
        let a = dag.argument(F32, 0, 0);
        let b = dag.argument(F32, 1, 0);
        let r = dag.setcc(ValueType::I32, a, b, cc);
        ret(&mut dag, &[r]);
        for (x, y) in pairs {
            let legal =
                check_equivalent(&dag, &TargetDesc::new(), &[arg(bits32(x), 32), arg(bits32(y), 32)]);
            assert_eq!(count_ops(&legal, Opcode::Call), 1, "{cc:?}");
        }
    }
}

// ── Conversions ─────────────────────────────────────────────────────

#[test]
fn integers_widen_to_a_routine_width() {
    for (op, symbol) in [(Opcode::SintToFp, "__floatsisf"), (Opcode::UintToFp, "__floatunsisf")] {
        let dag = unary_dag(ValueType::I8, |d, a| d.unary(op, F32, a));
        for v in [0x80, 0x7f, 0x01] {
            let legal = check_equivalent(&dag, &TargetDesc::new(), &[arg(v, 8)]);
            assert_eq!(routines(&legal), vec![symbol.to_owned()]);
        }
    }
    let dag = unary_dag(ValueType::I64, |d, a| d.unary(Opcode::SintToFp, F32, a));
    let legal = check_equivalent(&dag, &TargetDesc::new(), &[arg(0xffff_ffff_0000_0000, 64)]);
    assert_eq!(routines(&legal), vec!["__floatdisf".to_owned()]);
}

#[test]
fn float_to_integer_truncates_the_routine_result() {
    let target = TargetDesc::new().with_legal_int(16);
    let dag = unary_dag(F32, |d, a| d.unary(Opcode::FpToSint, ValueType::I16, a));
    for x in [-5.5f32, 300.75, 0.0] {
        let legal = check_equivalent(&dag, &target, &[arg(bits32(x), 32)]);
        assert_eq!(routines(&legal), vec!["__fixsfsi".to_owned()]);
    }

    let dag = unary_dag(F32, |d, a| d.unary(Opcode::FpToUint, ValueType::I64, a));
    let legal = check_equivalent(&dag, &TargetDesc::new(), &[arg(bits32(3.0e9), 32)]);
    assert_eq!(routines(&legal), vec!["__fixunssfdi".to_owned()]);
}

#[test]
fn format_conversions_call_the_runtime() {
    let target = TargetDesc::new().with_legal_float(FloatFormat::F64);
    let dag = unary_dag(F32, |d, a| d.unary(Opcode::FpExtend, F64, a));
    let legal = check_equivalent(&dag, &target, &[arg(bits32(1.1), 32)]);
    assert_eq!(routines(&legal), vec!["__extendsfdf2".to_owned()]);

    let dag = unary_dag(F64, |d, a| d.unary(Opcode::FpRound, F32, a));
    let legal = check_equivalent(&dag, &target, &[arg(bits64(1.1), 64)]);
    assert_eq!(routines(&legal), vec!["__truncdfsf2".to_owned()]);
}

// ── Memory and reinterpretation ─────────────────────────────────────

#[test]
fn loads_and_stores_move_the_encoding() {
    let memory: BTreeMap<u64, u8> = bits32(6.5)
        .to_le_bytes()
        .into_iter()
        .take(4)
        .enumerate()
        .map(|(i, b)| (0x40 + i as u64, b))
        .collect();
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let src = dag.constant(ValueType::I32, 0x40);
    let dst = dag.constant(ValueType::I32, 0x80);
    let ld = dag.load(F32, entry, src, MemInfo::new(F32));
    let x = dag.argument(F32, 0, 0);
    let sum = dag.binary(Opcode::FAdd, F32, ld.value(0), x);
    let chain = dag.store(ld.value(1), sum, dst, MemInfo::new(F32));
    ret_after(&mut dag, chain, &[sum]);

    let (legal, _) =
        check_equivalent_in(&dag, &TargetDesc::new(), &[arg(bits32(0.25), 32)], &memory);
    assert_eq!(count_ops(&legal, Opcode::Load), 1);
    assert_eq!(count_ops(&legal, Opcode::Store), 1);
}

#[test]
fn bitcasts_reuse_the_bits() {
    let dag = unary_dag(ValueType::I32, |d, a| {
        let f = d.bitcast(F32, a);
        let g = d.binary(Opcode::FAdd, F32, f, f);
        d.bitcast(ValueType::I32, g)
    });
    let legal = check_equivalent(&dag, &TargetDesc::new(), &[arg(bits32(1.75), 32)]);
    assert_eq!(count_ops(&legal, Opcode::BitCast), 0);

    let dag = unary_dag(ValueType::I64, |d, a| {
        let f = d.bitcast(F64, a);
        let g = d.unary(Opcode::FNeg, F64, f);
        d.bitcast(ValueType::I64, g)
    });
    check_equivalent(&dag, &TargetDesc::new(), &[arg(bits64(-0.125), 64)]);
}

#[test]
fn select_between_soft_values() {
    let mut dag = Dag::new();
    let c = dag.argument(ValueType::I32, 0, 0);
    let a = dag.argument(F64, 1, 0);
    let b = dag.argument(F64, 2, 0);
    let r = dag.select(F64, c, a, b);
    ret(&mut dag, &[r]);
    for cond in [0, 1] {
        check_equivalent(
            &dag,
            &TargetDesc::new(),
            &[arg(cond, 32), arg(bits64(2.5), 64), arg(bits64(-9.0), 64)],
        );
    }
}

#[test]
fn missing_routine_is_unhandled() {
    use dag_ir::Libcall;

    use crate::error::{LegalizeError, Position};
    use crate::legalize_types;

    let target = TargetDesc::new().with_routine_name(Libcall::FAdd(FloatFormat::F32), None);
    let mut dag = binary_dag(Opcode::FAdd, F32);
    assert_eq!(
        legalize_types(&mut dag, &target),
        Err(LegalizeError::UnhandledOperation {
            action: TypeAction::PromoteFloat,
            opcode: Opcode::FAdd,
            position: Position::Result(0),
        })
    );
}
