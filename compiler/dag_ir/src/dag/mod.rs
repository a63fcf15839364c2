//! Operation DAG: an arena of nodes connected by value references.
//!
//! # Design
//!
//! Nodes live in an arena indexed by [`NodeId`]. A produced value is named
//! by a [`ValueRef`] (node, result slot). Every node keeps a use list with
//! one entry per operand slot that references it, so rewriting all uses of
//! a value only touches the consumers that actually read it.
//!
//! Ids are never reused: a deleted node leaves a hole, which keeps any id a
//! client still holds from silently aliasing a newer node. There is no
//! structural uniquing; two identical operations are two nodes.
//!
//! The DAG has a distinguished entry token (the start of the memory chain)
//! and a root node. Everything not reachable from the root (or the entry)
//! is dead and is reclaimed by [`Dag::remove_dead_nodes`].

mod build;
mod display;

use std::ops::Index;

use smallvec::SmallVec;

use crate::opcode::{CondCode, Libcall, MemInfo, Opcode};
use crate::types::ValueType;

pub use display::NodeDisplay;

// ── ID newtypes ─────────────────────────────────────────────────────

/// Index of a node in the DAG arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(transparent)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Reference to result `slot` of this node.
    #[inline]
    pub fn value(self, slot: u32) -> ValueRef {
        ValueRef { node: self, slot }
    }
}

/// One produced value: result `slot` of `node`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValueRef {
    pub node: NodeId,
    pub slot: u32,
}

impl ValueRef {
    #[inline]
    pub fn new(node: NodeId, slot: u32) -> Self {
        Self { node, slot }
    }
}

// ── Nodes ───────────────────────────────────────────────────────────

/// Call target of an [`Opcode::Call`] node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Routine {
    pub libcall: Libcall,
    pub symbol: String,
}

/// Per-node attributes refining the opcode.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum Payload {
    #[default]
    None,
    /// Constant bits, zero above the value's width.
    Bits(u128),
    /// Function argument `index`, starting `offset` bits into it.
    Argument { index: u32, offset: u32 },
    /// Stack object index.
    Frame(u32),
    Cond(CondCode),
    /// Source type of a `SignExtendInReg`.
    InRegType(ValueType),
    /// Half of an `ExtractElement`, or first element of an `ExtractSubvector`.
    Part(u32),
    Mem(MemInfo),
    /// Shuffle mask; `None` lanes are undefined.
    Mask(Vec<Option<u32>>),
    Routine(Routine),
    /// Declared return types of a `Ret`.
    Signature(SmallVec<[ValueType; 2]>),
    /// Branch target block.
    Block(u32),
}

impl Payload {
    pub fn bits(&self) -> Option<u128> {
        match *self {
            Payload::Bits(b) => Some(b),
            _ => None,
        }
    }

    pub fn cond(&self) -> Option<CondCode> {
        match *self {
            Payload::Cond(cc) => Some(cc),
            _ => None,
        }
    }

    pub fn mem(&self) -> Option<MemInfo> {
        match *self {
            Payload::Mem(m) => Some(m),
            _ => None,
        }
    }

    pub fn part(&self) -> Option<u32> {
        match *self {
            Payload::Part(p) => Some(p),
            _ => None,
        }
    }

    pub fn in_reg_type(&self) -> Option<ValueType> {
        match *self {
            Payload::InRegType(vt) => Some(vt),
            _ => None,
        }
    }

    pub fn mask(&self) -> Option<&[Option<u32>]> {
        match self {
            Payload::Mask(m) => Some(m),
            _ => None,
        }
    }

    pub fn routine(&self) -> Option<&Routine> {
        match self {
            Payload::Routine(r) => Some(r),
            _ => None,
        }
    }
}

/// An operation in the DAG.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub opcode: Opcode,
    pub operands: SmallVec<[ValueRef; 4]>,
    /// One type per result slot.
    pub results: SmallVec<[ValueType; 2]>,
    pub payload: Payload,
}

impl Node {
    /// Type of result `slot`.
    ///
    /// # Panics
    ///
    /// Panics if the node has no such result.
    #[inline]
    pub fn result_type(&self, slot: u32) -> ValueType {
        self.results[slot as usize]
    }

    #[inline]
    pub fn operand(&self, i: usize) -> ValueRef {
        self.operands[i]
    }
}

/// A consumer of a node: operand slot `operand` of node `user`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: NodeId,
    pub operand: u32,
}

/// A stack object created for spills and bit reinterpretation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackObject {
    pub size: u32,
    pub align: u32,
}

#[derive(Clone, Debug)]
struct NodeEntry {
    node: Node,
    uses: Vec<Use>,
}

// ── DAG ─────────────────────────────────────────────────────────────

/// Arena-backed operation DAG.
#[derive(Clone, Debug)]
pub struct Dag {
    nodes: Vec<Option<NodeEntry>>,
    entry: NodeId,
    root: NodeId,
    stack: Vec<StackObject>,
}

impl Default for Dag {
    fn default() -> Self {
        Self::new()
    }
}

impl Dag {
    /// Create a DAG holding only the entry token, which is also the root.
    pub fn new() -> Self {
        let mut dag = Dag {
            nodes: Vec::new(),
            entry: NodeId::new(0),
            root: NodeId::new(0),
            stack: Vec::new(),
        };
        let entry = dag.create_node(Opcode::EntryToken, &[], &[ValueType::Chain], Payload::None);
        dag.entry = entry;
        dag.root = entry;
        dag
    }

    #[inline]
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    /// The chain value produced by the entry token.
    #[inline]
    pub fn entry_chain(&self) -> ValueRef {
        self.entry.value(0)
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        debug_assert!(self.contains(root), "root {root:?} is not a live node");
        self.root = root;
    }

    /// One past the largest id ever allocated.
    #[inline]
    pub fn id_bound(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.index()), Some(Some(_)))
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())?.as_ref().map(|e| &e.node)
    }

    /// Ids of all live nodes in allocation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_some())
            .map(|(i, _)| NodeId::new(i as u32))
    }

    fn entry_ref(&self, id: NodeId) -> &NodeEntry {
        match self.nodes.get(id.index()) {
            Some(Some(e)) => e,
            _ => panic!("node {id:?} is not live"),
        }
    }

    fn entry_mut(&mut self, id: NodeId) -> &mut NodeEntry {
        match self.nodes.get_mut(id.index()) {
            Some(Some(e)) => e,
            _ => panic!("node {id:?} is not live"),
        }
    }

    /// Use list of a node: one entry per operand slot that reads any of
    /// its results.
    pub fn uses(&self, id: NodeId) -> &[Use] {
        &self.entry_ref(id).uses
    }

    /// Distinct users of a node, in first-use order.
    pub fn users(&self, id: NodeId) -> SmallVec<[NodeId; 4]> {
        let mut users: SmallVec<[NodeId; 4]> = SmallVec::new();
        for u in self.uses(id) {
            if !users.contains(&u.user) {
                users.push(u.user);
            }
        }
        users
    }

    /// Type of a produced value.
    #[inline]
    pub fn value_type(&self, v: ValueRef) -> ValueType {
        self[v.node].result_type(v.slot)
    }

    /// Operand `i` of node `id`.
    #[inline]
    pub fn operand(&self, id: NodeId, i: usize) -> ValueRef {
        self[id].operands[i]
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// Append a node and register it as a user of each operand.
    pub fn create_node(
        &mut self,
        opcode: Opcode,
        operands: &[ValueRef],
        results: &[ValueType],
        payload: Payload,
    ) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u32);
        for (i, op) in operands.iter().enumerate() {
            self.entry_mut(op.node).uses.push(Use {
                user: id,
                operand: i as u32,
            });
        }
        self.nodes.push(Some(NodeEntry {
            node: Node {
                opcode,
                operands: operands.iter().copied().collect(),
                results: results.iter().copied().collect(),
                payload,
            },
            uses: Vec::new(),
        }));
        id
    }

    fn remove_use(&mut self, producer: NodeId, user: NodeId, operand: u32) {
        let uses = &mut self.entry_mut(producer).uses;
        if let Some(pos) = uses
            .iter()
            .position(|u| u.user == user && u.operand == operand)
        {
            uses.swap_remove(pos);
        }
    }

    /// Replace the operand list of a node in place, keeping use lists in
    /// sync. The operand count may change.
    pub fn set_operands(&mut self, id: NodeId, operands: &[ValueRef]) {
        let old = std::mem::take(&mut self.entry_mut(id).node.operands);
        for (i, op) in old.iter().enumerate() {
            self.remove_use(op.node, id, i as u32);
        }
        for (i, op) in operands.iter().enumerate() {
            self.entry_mut(op.node).uses.push(Use {
                user: id,
                operand: i as u32,
            });
        }
        self.entry_mut(id).node.operands = operands.iter().copied().collect();
    }

    /// Replace a single operand in place.
    pub fn set_operand(&mut self, id: NodeId, i: usize, value: ValueRef) {
        let old = self[id].operands[i];
        if old == value {
            return;
        }
        self.remove_use(old.node, id, i as u32);
        self.entry_mut(value.node).uses.push(Use {
            user: id,
            operand: i as u32,
        });
        self.entry_mut(id).node.operands[i] = value;
    }

    /// Rewrite every operand that reads `from` to read `to` instead.
    ///
    /// Returns the distinct users that were rewritten. When `from` is the
    /// only result of the root node, the root moves to `to`'s node. The
    /// root names a whole node, so replacing one result of a multi-result
    /// root leaves the root where it is; use
    /// [`replace_all_uses_of_node_with`](Self::replace_all_uses_of_node_with)
    /// to move it.
    pub fn replace_all_uses_of_value_with(
        &mut self,
        from: ValueRef,
        to: ValueRef,
    ) -> SmallVec<[NodeId; 4]> {
        let mut users: SmallVec<[NodeId; 4]> = SmallVec::new();
        if from == to {
            return users;
        }
        let rewired: Vec<Use> = self
            .uses(from.node)
            .iter()
            .filter(|u| self[u.user].operands[u.operand as usize] == from)
            .copied()
            .collect();
        for u in rewired {
            self.remove_use(from.node, u.user, u.operand);
            self.entry_mut(to.node).uses.push(u);
            self.entry_mut(u.user).node.operands[u.operand as usize] = to;
            if !users.contains(&u.user) {
                users.push(u.user);
            }
        }
        if self.root == from.node && self[from.node].results.len() == 1 {
            self.root = to.node;
        }
        users
    }

    /// Rewrite every use of each result of `from` to the same slot of `to`.
    ///
    /// Returns the distinct users that were rewritten. The root follows.
    pub fn replace_all_uses_of_node_with(&mut self, from: NodeId, to: NodeId) -> Vec<NodeId> {
        let mut users = Vec::new();
        let slots = self[from].results.len() as u32;
        for slot in 0..slots {
            for user in self.replace_all_uses_of_value_with(from.value(slot), to.value(slot)) {
                if !users.contains(&user) {
                    users.push(user);
                }
            }
        }
        if self.root == from {
            self.root = to;
        }
        users
    }

    /// Nodes reachable from the root in post-order: every node appears
    /// after all of its operands.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: Vec<(NodeId, usize)> = vec![(self.root, 0)];
        visited[self.root.index()] = true;
        while let Some((id, next)) = stack.pop() {
            let operands = &self[id].operands;
            if let Some(op) = operands.get(next) {
                stack.push((id, next + 1));
                if !visited[op.node.index()] {
                    visited[op.node.index()] = true;
                    stack.push((op.node, 0));
                }
            } else {
                order.push(id);
            }
        }
        order
    }

    /// Delete every node not reachable from the root or the entry token.
    ///
    /// Returns the number of nodes removed.
    pub fn remove_dead_nodes(&mut self) -> usize {
        let mut live = vec![false; self.nodes.len()];
        for id in self.topological_order() {
            live[id.index()] = true;
        }
        live[self.entry.index()] = true;

        let mut removed = 0;
        for (i, is_live) in live.iter().enumerate() {
            if *is_live || self.nodes[i].is_none() {
                continue;
            }
            let id = NodeId::new(i as u32);
            let operands = self[id].operands.clone();
            for (slot, op) in operands.iter().enumerate() {
                if self.contains(op.node) {
                    self.remove_use(op.node, id, slot as u32);
                }
            }
            self.nodes[i] = None;
            removed += 1;
        }
        tracing::debug!(removed, live = self.live_count(), "removed dead nodes");
        removed
    }

    /// Reserve a stack object and return its index.
    pub fn create_stack_object(&mut self, size: u32, align: u32) -> u32 {
        let index = self.stack.len() as u32;
        self.stack.push(StackObject {
            size,
            align: align.max(1),
        });
        index
    }

    pub fn stack_objects(&self) -> &[StackObject] {
        &self.stack
    }

    /// Adapter printing one node as `t7: i32 = add t3, t5`.
    pub fn display(&self, id: NodeId) -> NodeDisplay<'_> {
        NodeDisplay { dag: self, id }
    }
}

impl Index<NodeId> for Dag {
    type Output = Node;

    #[inline]
    fn index(&self, id: NodeId) -> &Node {
        &self.entry_ref(id).node
    }
}
