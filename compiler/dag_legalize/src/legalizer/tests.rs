use pretty_assertions::assert_eq;

use dag_ir::{
    Dag, FloatFormat, Libcall, MemInfo, Opcode, Payload, TargetDesc, TypeVerdict, ValueType,
};

use crate::classify::TypeAction;
use crate::error::{LegalizeError, Position};
use crate::legalizer::Legalizer;
use crate::tables::{Pair, Single};
use crate::test_helpers::{arg, check_equivalent_in, init_tracing, legalize, ret, ret_after};
use crate::{legalize_types, legalize_types_with, LegalizeConfig};

const I32: ValueType = ValueType::I32;
const I64: ValueType = ValueType::I64;

fn listing(dag: &Dag) -> Vec<String> {
    dag.topological_order()
        .into_iter()
        .map(|id| dag.display(id).to_string())
        .collect()
}

/// `ret (a + b)` over two `vt` arguments.
fn add_dag(vt: ValueType) -> Dag {
    let mut dag = Dag::new();
    let a = dag.argument(vt, 0, 0);
    let b = dag.argument(vt, 1, 0);
    let s = dag.binary(Opcode::Add, vt, a, b);
    ret(&mut dag, &[s]);
    dag
}

// ── No-op runs ──────────────────────────────────────────────────────

#[test]
fn legal_graph_is_left_alone() {
    let mut dag = Dag::new();
    let entry = dag.entry_chain();
    let p = dag.argument(I32, 0, 0);
    let x = dag.argument(ValueType::I16, 1, 0);
    let ld = dag.load(I32, entry, p, MemInfo::new(I32));
    let w = dag.unary(Opcode::SignExtend, I32, x);
    let s = dag.binary(Opcode::Add, I32, ld.value(0), w);
    let chain = dag.store(ld.value(1), s, p, MemInfo::new(I32));
    ret_after(&mut dag, chain, &[s]);

    let before = listing(&dag);
    let bound = dag.id_bound();
    let stats = legalize(&mut dag, &TargetDesc::ilp32());

    assert!(stats.is_noop());
    assert_eq!(stats.created, 0);
    assert_eq!(stats.replacements, 0);
    assert_eq!(stats.operands.total(), 0);
    assert_eq!(stats.dead_removed, 0);
    assert_eq!(dag.id_bound(), bound);
    assert_eq!(listing(&dag), before);
}

#[test]
fn second_run_changes_nothing() {
    let mut dag = add_dag(I64);
    let first = legalize(&mut dag, &TargetDesc::new());
    assert!(!first.is_noop());

    let before = listing(&dag);
    let second = legalize(&mut dag, &TargetDesc::new());
    assert!(second.is_noop());
    assert_eq!(second.dead_removed, 0);
    assert_eq!(listing(&dag), before);
}

// ── Statistics ──────────────────────────────────────────────────────

#[test]
fn stats_count_dispatches_per_action() {
    let dag = add_dag(I64);
    let (_, stats) = check_equivalent_in(
        &dag,
        &TargetDesc::new(),
        &[arg(0xffff_ffff, 64), arg(1, 64)],
        &Default::default(),
    );
    // Two arguments and the sum; then the returned value.
    assert_eq!(stats.results.get(TypeAction::ExpandInteger), 3);
    assert_eq!(stats.results.total(), 3);
    assert_eq!(stats.operands.get(TypeAction::ExpandInteger), 1);
    assert!(stats.created > 0);
    assert!(stats.visited >= 5);
}

#[test]
fn dead_nodes_are_dropped_before_the_walk() {
    fn build() -> Dag {
        let mut dag = add_dag(I64);
        let c = dag.argument(I64, 2, 0);
        let d = dag.argument(I64, 3, 0);
        let _unused = dag.binary(Opcode::Xor, I64, c, d);
        dag
    }

    let mut dag = build();
    let stats = legalize(&mut dag, &TargetDesc::new());
    assert_eq!(stats.results.get(TypeAction::ExpandInteger), 3);
    assert!(stats.dead_removed >= 3);

    init_tracing();
    let mut dag = build();
    let config = LegalizeConfig::default().with_remove_dead_nodes(false);
    let stats = legalize_types_with(&mut dag, &TargetDesc::new(), config)
        .expect("legalization should succeed");
    assert_eq!(stats.results.get(TypeAction::ExpandInteger), 6);
    assert_eq!(stats.dead_removed, 0);
}

#[test]
fn replaced_values_are_counted() {
    let ppc = ValueType::Float(FloatFormat::PpcF128);
    let mut dag = Dag::new();
    let a = dag.argument(ppc, 0, 0);
    let b = dag.argument(ppc, 1, 0);
    let s = dag.binary(Opcode::FAdd, ppc, a, b);
    ret(&mut dag, &[s]);

    let stats = legalize(&mut dag, &TargetDesc::ilp32());
    assert!(stats.replacements >= 1);
    assert!(stats.results.get(TypeAction::ExpandFloat) >= 3);
}

#[test]
fn verification_can_be_skipped() {
    init_tracing();
    let mut dag = add_dag(I64);
    let config = LegalizeConfig::default().with_verify(false);
    let stats = legalize_types_with(&mut dag, &TargetDesc::ilp32(), config)
        .expect("legalization should succeed");
    assert!(stats.results.total() >= 3);
}

// ── Failures ────────────────────────────────────────────────────────

#[test]
fn missing_routine_is_an_unhandled_operation() {
    let target = TargetDesc::new().with_routine_name(Libcall::UDiv(64), None);
    let mut dag = Dag::new();
    let a = dag.argument(I64, 0, 0);
    let b = dag.argument(I64, 1, 0);
    let q = dag.binary(Opcode::UDiv, I64, a, b);
    ret(&mut dag, &[q]);

    init_tracing();
    let err = legalize_types(&mut dag, &target).expect_err("no routine for udiv");
    assert_eq!(
        err,
        LegalizeError::UnhandledOperation {
            action: TypeAction::ExpandInteger,
            opcode: Opcode::UDiv,
            position: Position::Result(0),
        }
    );
    assert_eq!(err.to_string(), "cannot expand result 0 of udiv");
}

#[test]
fn custom_verdict_aborts_the_pass() {
    let target = TargetDesc::new().with_verdict(I64, TypeVerdict::Custom, None);
    let mut dag = add_dag(I64);

    init_tracing();
    let err = legalize_types(&mut dag, &target).expect_err("custom verdict");
    assert_eq!(
        err,
        LegalizeError::ClassificationFailure {
            vt: I64,
            verdict: TypeVerdict::Custom,
        }
    );
}

#[test]
fn node_without_its_payload_is_unhandled() {
    init_tracing();
    let mut dag = Dag::new();
    let v = dag.argument(I64, 0, 0);
    let half = dag
        .create_node(Opcode::ExtractElement, &[v], &[I32], Payload::None)
        .value(0);
    ret(&mut dag, &[half]);
    let err = legalize_types(&mut dag, &TargetDesc::new()).expect_err("no part index");
    assert_eq!(
        err,
        LegalizeError::UnhandledOperation {
            action: TypeAction::ExpandInteger,
            opcode: Opcode::ExtractElement,
            position: Position::Operand(0),
        }
    );

    let mut dag = Dag::new();
    let k = dag
        .create_node(Opcode::Constant, &[], &[I64], Payload::None)
        .value(0);
    ret(&mut dag, &[k]);
    let err = legalize_types(&mut dag, &TargetDesc::new()).expect_err("no constant bits");
    assert_eq!(
        err,
        LegalizeError::UnhandledOperation {
            action: TypeAction::ExpandInteger,
            opcode: Opcode::Constant,
            position: Position::Result(0),
        }
    );
}

#[test]
fn recording_a_value_twice_is_an_invariant_violation() {
    let target = TargetDesc::new();
    let mut dag = Dag::new();
    let v = dag.argument(ValueType::I16, 0, 0);
    let w = dag.argument(I64, 1, 0);
    let mut lz = Legalizer::new(&mut dag, &target, LegalizeConfig::default());

    let first = lz.dag.constant(I32, 1);
    let second = lz.dag.constant(I32, 2);
    lz.set_single(Single::PromotedInt, v, first)
        .expect("first record succeeds");
    assert_eq!(
        lz.set_single(Single::PromotedInt, v, second),
        Err(LegalizeError::InvariantViolation {
            detail: "value legalized twice",
            value: v,
        })
    );
    assert_eq!(lz.promoted_int(v), Ok(first));

    lz.set_pair(Pair::ExpandedInt, w, (first, second))
        .expect("first record succeeds");
    let err = lz
        .set_pair(Pair::ExpandedInt, w, (second, first))
        .expect_err("second record");
    assert!(err.to_string().ends_with("value legalized twice"));
}

#[test]
fn missing_record_is_an_invariant_violation() {
    let target = TargetDesc::new();
    let mut dag = Dag::new();
    let v = dag.argument(ValueType::I16, 0, 0);
    let w = dag.argument(I64, 1, 0);
    let mut lz = Legalizer::new(&mut dag, &target, LegalizeConfig::default());

    assert_eq!(
        lz.promoted_int(v),
        Err(LegalizeError::InvariantViolation {
            detail: "no legalized form recorded",
            value: v,
        })
    );
    assert_eq!(
        lz.expanded_int(w),
        Err(LegalizeError::InvariantViolation {
            detail: "no legalized parts recorded",
            value: w,
        })
    );
    assert!(lz.unhandled().to_string().contains("outside a dispatch"));
}

#[test]
fn config_defaults_verify_and_clean_up() {
    let config = LegalizeConfig::default();
    assert!(config.verify);
    assert!(config.remove_dead_nodes);

    let quiet = config.with_verify(false).with_remove_dead_nodes(false);
    assert_eq!(
        quiet,
        LegalizeConfig {
            verify: false,
            remove_dead_nodes: false,
        }
    );
}
