//! Operation DAG and target model for type legalization.
//!
//! This crate provides:
//!
//! - **Value types** ([`ValueType`], [`FloatFormat`], [`VectorType`]): the
//!   kinds and widths of values flowing along DAG edges.
//!
//! - **Opcodes and payloads** ([`Opcode`], [`CondCode`], [`MemInfo`],
//!   [`Libcall`]): the operation vocabulary, with the software routine
//!   catalogue used when a target has no native implementation.
//!
//! - **The DAG** ([`Dag`], [`NodeId`], [`ValueRef`]): an arena of nodes with
//!   maintained use lists, construction helpers and use replacement.
//!
//! - **Target description** ([`TargetLowering`], [`TargetDesc`]): which
//!   types and operations a machine supports.
//!
//! - **Reference interpreter** ([`interp::evaluate`]): executes a DAG and
//!   reports its observable behaviour, so transformations can be checked
//!   for equivalence.
//!
//! # Design
//!
//! Nodes are addressed by [`NodeId`] into an append-only arena; deleting a
//! node leaves a hole so ids stay stable across a pass. Every value is a
//! `(node, result slot)` pair. Use lists are stored per producing node
//! and updated by every mutation, so "who reads this value" is always a
//! direct lookup.

pub mod dag;
pub mod interp;
pub mod limbs;
pub mod opcode;
pub mod target;
pub mod types;

pub use dag::{Dag, Node, NodeDisplay, NodeId, Payload, Routine, StackObject, Use, ValueRef};
pub use opcode::{CondCode, Libcall, LoadExt, MemFlags, MemInfo, Opcode, SoftCmp};
pub use target::{TargetDesc, TargetLowering, TypeVerdict};
pub use types::{ElemType, FloatFormat, ValueType, VectorType};
