//! Set of primary keys already returned
//!
//! Starts as a vector scanned linearly, which is cheapest for the common
//! small case, and switches to an ordered set once it has been accessed
//! more than the configured number of times.

use std::collections::BTreeSet;

use crate::index::IndexKey;

#[derive(Debug, Clone)]
enum Repr {
    Small(Vec<IndexKey>),
    Large(BTreeSet<IndexKey>),
}

#[derive(Debug, Clone)]
pub struct DupSet {
    repr: Repr,
    accesses: usize,
    upgrade_after: usize,
}

impl DupSet {
    pub fn new(upgrade_after: usize) -> Self {
        Self {
            repr: Repr::Small(Vec::new()),
            accesses: 0,
            upgrade_after,
        }
    }

    fn touch(&mut self) {
        self.accesses += 1;
        if self.accesses <= self.upgrade_after {
            return;
        }
        if let Repr::Small(keys) = &mut self.repr {
            let set: BTreeSet<IndexKey> = std::mem::take(keys).into_iter().collect();
            self.repr = Repr::Large(set);
        }
    }

    pub fn contains(&mut self, pk: &IndexKey) -> bool {
        self.touch();
        match &self.repr {
            Repr::Small(keys) => keys.contains(pk),
            Repr::Large(set) => set.contains(pk),
        }
    }

    /// Adds a key; returns true if it was not present
    pub fn insert(&mut self, pk: &IndexKey) -> bool {
        self.touch();
        match &mut self.repr {
            Repr::Small(keys) => {
                if keys.contains(pk) {
                    false
                } else {
                    keys.push(pk.clone());
                    true
                }
            }
            Repr::Large(set) => set.insert(pk.clone()),
        }
    }

    /// Records the key; returns true if it had been seen before
    pub fn getsetdup(&mut self, pk: &IndexKey) -> bool {
        !self.insert(pk)
    }

    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Small(keys) => keys.len(),
            Repr::Large(set) => set.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_upgraded(&self) -> bool {
        matches!(self.repr, Repr::Large(_))
    }
}
