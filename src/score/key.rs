use std::borrow::Borrow;
use std::fmt;

use smallvec::SmallVec;

use crate::types::VarId;

/// Cache identity for "variable given parent set".
///
/// Parents are stored as a bitset with trailing zero words trimmed, so two
/// keys built from the same parents in any order (with or without
/// duplicates) compare and hash equal.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ParentSetKey {
    var: VarId,
    bits: SmallVec<[u64; 2]>,
}

impl ParentSetKey {
    /// Builds the canonical key for `var` given `parents`.
    pub fn new<I>(var: VarId, parents: I) -> Self
    where
        I: IntoIterator,
        I::Item: Borrow<VarId>,
    {
        let mut bits: SmallVec<[u64; 2]> = SmallVec::new();
        for parent in parents {
            let index = parent.borrow().index();
            let word = index / 64;
            if bits.len() <= word {
                bits.resize(word + 1, 0);
            }
            bits[word] |= 1u64 << (index % 64);
        }
        while bits.last() == Some(&0) {
            bits.pop();
        }
        Self { var, bits }
    }

    /// The scored variable.
    pub fn var(&self) -> VarId {
        self.var
    }

    /// Number of distinct parents.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True for the empty parent set.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Whether `parent` is in the set.
    pub fn contains(&self, parent: VarId) -> bool {
        let index = parent.index();
        self.bits
            .get(index / 64)
            .is_some_and(|w| w & (1u64 << (index % 64)) != 0)
    }

    /// Parents in ascending index order.
    pub fn parents(&self) -> impl Iterator<Item = VarId> + '_ {
        self.bits.iter().enumerate().flat_map(|(word, &bits)| {
            (0..64)
                .filter(move |bit| bits & (1u64 << bit) != 0)
                .map(move |bit| VarId::from_index(word * 64 + bit))
        })
    }
}

impl fmt::Debug for ParentSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentSetKey")
            .field("var", &self.var)
            .field("parents", &self.parents().collect::<Vec<_>>())
            .finish()
    }
}
