//! Shared test utilities for the legalization passes.
//!
//! Graph builders and the `check_equivalent` harness used across the
//! handler family tests and the scenario tests. Only compiled in test
//! builds.

use std::collections::BTreeMap;
use std::sync::Once;

use dag_ir::interp::{evaluate, Bits, Outcome};
use dag_ir::{Dag, ElemType, NodeId, Opcode, TargetDesc, ValueRef, ValueType, VectorType};

use crate::classify::{TypeAction, TypeClassifier};
use crate::{legalize_types, LegalizeStats};

static TRACING_INIT: Once = Once::new();

/// Install a subscriber once per test binary, only when `RUST_LOG` is set.
pub(crate) fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_test_writer())
                .with(filter)
                .init();
        }
    });
}

/// Shorthand for an argument bit string.
pub(crate) fn arg(value: u128, width: u32) -> Bits {
    Bits::from_u128(value, width)
}

/// Vector type of `count` elements.
pub(crate) fn vec_of(elem: ElemType, count: u32) -> ValueType {
    ValueType::Vector(VectorType::new(elem, count))
}

/// `count` x `iN`.
pub(crate) fn vint(bits: u32, count: u32) -> ValueType {
    vec_of(ElemType::Int(bits), count)
}

/// Finish a graph with `ret values` from the entry chain.
pub(crate) fn ret(dag: &mut Dag, values: &[ValueRef]) -> NodeId {
    let chain = dag.entry_chain();
    ret_after(dag, chain, values)
}

/// Finish a graph with `ret values` after `chain`.
pub(crate) fn ret_after(dag: &mut Dag, chain: ValueRef, values: &[ValueRef]) -> NodeId {
    let r = dag.ret(chain, values);
    dag.set_root(r);
    r
}

fn run(dag: &Dag, args: &[Bits], memory: &BTreeMap<u64, u8>) -> Outcome {
    evaluate(dag, args, memory).expect("evaluation should succeed")
}

/// Legalize a copy of `dag` for `target` and assert that both graphs
/// behave identically on `args`. Returns the legalized graph.
pub(crate) fn check_equivalent(dag: &Dag, target: &TargetDesc, args: &[Bits]) -> Dag {
    check_equivalent_in(dag, target, args, &BTreeMap::new()).0
}

/// As [`check_equivalent`], starting from `memory`, also returning the
/// pass statistics.
pub(crate) fn check_equivalent_in(
    dag: &Dag,
    target: &TargetDesc,
    args: &[Bits],
    memory: &BTreeMap<u64, u8>,
) -> (Dag, LegalizeStats) {
    init_tracing();
    let expected = run(dag, args, memory);
    let mut legal = dag.clone();
    let stats = legalize_types(&mut legal, target).expect("legalization should succeed");
    assert_all_legal(&legal, target);
    let actual = run(&legal, args, memory);
    pretty_assertions::assert_eq!(actual, expected);
    (legal, stats)
}

/// Every reachable value in `dag` has a legal type.
pub(crate) fn assert_all_legal(dag: &Dag, target: &TargetDesc) {
    let mut classifier = TypeClassifier::new(target);
    for id in dag.topological_order() {
        let node = &dag[id];
        for vt in &node.results {
            assert_eq!(
                classifier.action(*vt),
                Ok(TypeAction::Legal),
                "{} has an illegal result",
                dag.display(id)
            );
        }
        for op in &node.operands {
            let vt = dag.value_type(*op);
            assert_eq!(
                classifier.action(vt),
                Ok(TypeAction::Legal),
                "{} has an illegal operand",
                dag.display(id)
            );
        }
    }
}

/// Reachable nodes with opcode `op`.
pub(crate) fn count_ops(dag: &Dag, op: Opcode) -> usize {
    dag.topological_order()
        .into_iter()
        .filter(|id| dag[*id].opcode == op)
        .count()
}

/// Reachable nodes with opcode `op` and first result type `vt`.
pub(crate) fn count_typed(dag: &Dag, op: Opcode, vt: ValueType) -> usize {
    dag.topological_order()
        .into_iter()
        .filter(|id| dag[*id].opcode == op && dag[*id].results.first() == Some(&vt))
        .count()
}

/// Reachable nodes with opcode `op`.
pub(crate) fn find_ops(dag: &Dag, op: Opcode) -> Vec<NodeId> {
    dag.topological_order()
        .into_iter()
        .filter(|id| dag[*id].opcode == op)
        .collect()
}

/// Legalize in place, panicking on failure.
pub(crate) fn legalize(dag: &mut Dag, target: &TargetDesc) -> LegalizeStats {
    init_tracing();
    legalize_types(dag, target).expect("legalization should succeed")
}
