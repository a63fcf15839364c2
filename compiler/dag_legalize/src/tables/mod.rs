//! Redirection tables.
//!
//! Each legalized value is recorded once, in the table of its action:
//! a single replacement for promoted and scalarized values, a pair for
//! expanded and split ones. A separate `replaced` map records values that
//! were superseded wholesale.
//!
//! # Design
//!
//! A table entry may name a value that is itself replaced later in the
//! pass. Instead of rewriting every entry when that happens, lookups chase
//! the `replaced` map to its end and write the final value back into the
//! chain and into the entry (path compression). Chains therefore stay
//! short and a lookup never returns a superseded value.

use rustc_hash::FxHashMap;

use dag_ir::ValueRef;

/// Tables holding one replacement value per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Single {
    PromotedInt,
    PromotedFloat,
    Scalarized,
}

/// Tables holding a (low, high) pair per key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Pair {
    ExpandedInt,
    ExpandedFloat,
    Split,
}

impl Single {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }
}

impl Pair {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
pub(crate) struct RedirectTables {
    singles: [FxHashMap<ValueRef, ValueRef>; Single::COUNT],
    pairs: [FxHashMap<ValueRef, (ValueRef, ValueRef)>; Pair::COUNT],
    replaced: FxHashMap<ValueRef, ValueRef>,
}

impl RedirectTables {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Final value `v` was replaced by, or `v` itself.
    pub(crate) fn remap(&mut self, v: ValueRef) -> ValueRef {
        let mut last = v;
        while let Some(next) = self.replaced.get(&last) {
            last = *next;
        }
        // Point every link of the chain straight at the end.
        let mut cur = v;
        while cur != last {
            let next = self.replaced.insert(cur, last);
            match next {
                Some(n) => cur = n,
                None => break,
            }
        }
        last
    }

    pub(crate) fn get_single(&mut self, table: Single, v: ValueRef) -> Option<ValueRef> {
        let key = self.remap(v);
        let entry = *self.singles[table.index()].get(&key)?;
        let current = self.remap(entry);
        if current != entry {
            self.singles[table.index()].insert(key, current);
        }
        Some(current)
    }

    pub(crate) fn get_pair(&mut self, table: Pair, v: ValueRef) -> Option<(ValueRef, ValueRef)> {
        let key = self.remap(v);
        let (lo, hi) = *self.pairs[table.index()].get(&key)?;
        let current = (self.remap(lo), self.remap(hi));
        if current != (lo, hi) {
            self.pairs[table.index()].insert(key, current);
        }
        Some(current)
    }

    /// Record `v -> to`. Returns `false`, leaving the table untouched, if
    /// `v` already has an entry.
    pub(crate) fn set_single(&mut self, table: Single, v: ValueRef, to: ValueRef) -> bool {
        let map = &mut self.singles[table.index()];
        if map.contains_key(&v) {
            return false;
        }
        map.insert(v, to);
        true
    }

    pub(crate) fn set_pair(&mut self, table: Pair, v: ValueRef, parts: (ValueRef, ValueRef)) -> bool {
        let map = &mut self.pairs[table.index()];
        if map.contains_key(&v) {
            return false;
        }
        map.insert(v, parts);
        true
    }

    /// Record that `from` is superseded by `to`. Returns `false` if that
    /// would close a cycle.
    pub(crate) fn record_replacement(&mut self, from: ValueRef, to: ValueRef) -> bool {
        if from == to || self.remap(to) == from {
            return false;
        }
        self.replaced.insert(from, to);
        true
    }

    /// Whether `v` has an entry in any table.
    pub(crate) fn contains(&self, v: ValueRef) -> bool {
        self.replaced.contains_key(&v)
            || self.singles.iter().any(|m| m.contains_key(&v))
            || self.pairs.iter().any(|m| m.contains_key(&v))
    }

    pub(crate) fn single_len(&self, table: Single) -> usize {
        self.singles[table.index()].len()
    }

    pub(crate) fn pair_len(&self, table: Pair) -> usize {
        self.pairs[table.index()].len()
    }

    pub(crate) fn replaced_len(&self) -> usize {
        self.replaced.len()
    }

    /// Entries across all tables.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.replaced.len()
            + self.singles.iter().map(FxHashMap::len).sum::<usize>()
            + self.pairs.iter().map(FxHashMap::len).sum::<usize>()
    }
}
