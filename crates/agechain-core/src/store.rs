//! # Solution Store
//!
//! Append-only record of every solution a chain produced, addressable by
//! `(repetition, role)` and iterable in solve order.
//!
//! Entries are never replaced or removed. A stored solution's
//! `continued_from` names the entry whose terminal state it started from,
//! so the continuation lineage of the chain can be read back directly.

use crate::ChainError;
use crate::solution::Solution;
use crate::types::{RoleLabel, SolutionKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A solution together with its address and lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSolution {
    /// Where this solution lives in the chain.
    pub key: SolutionKey,
    /// The entry this solve continued from; `None` for the first solve.
    pub continued_from: Option<SolutionKey>,
    /// The solution itself.
    pub solution: Solution,
}

/// Append-only solution store.
#[derive(Debug, Clone, Default)]
pub struct SolutionStore {
    entries: Vec<StoredSolution>,
    index: BTreeMap<SolutionKey, usize>,
}

impl SolutionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. A key may only be stored once.
    pub fn push(&mut self, entry: StoredSolution) -> Result<(), ChainError> {
        if self.index.contains_key(&entry.key) {
            return Err(ChainError::InvalidChain(format!(
                "{} is already stored",
                entry.key
            )));
        }
        if let Some(prior) = &entry.continued_from
            && !self.index.contains_key(prior)
        {
            return Err(ChainError::InvalidChain(format!(
                "{} continues from {} which is not stored",
                entry.key, prior
            )));
        }
        self.index.insert(entry.key.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    /// Look up an entry by address.
    #[must_use]
    pub fn get(&self, repetition: usize, role: &RoleLabel) -> Option<&StoredSolution> {
        let key = SolutionKey {
            repetition,
            role: role.clone(),
        };
        self.index.get(&key).and_then(|&i| self.entries.get(i))
    }

    /// The most recently stored entry.
    #[must_use]
    pub fn last(&self) -> Option<&StoredSolution> {
        self.entries.last()
    }

    /// Iterate over entries in solve order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredSolution> {
        self.entries.iter()
    }

    /// Entries of one role, in repetition order.
    pub fn for_role<'a>(
        &'a self,
        role: &'a RoleLabel,
    ) -> impl Iterator<Item = &'a StoredSolution> + use<'a> {
        self.entries.iter().filter(move |e| &e.key.role == role)
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the store, returning its entries in solve order.
    #[must_use]
    pub fn into_entries(self) -> Vec<StoredSolution> {
        self.entries
    }
}

// =============================================================================
// TESTS
// =============================================================================
