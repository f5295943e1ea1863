//! Matrix construction over one transaction snapshot.
//!
//! Both builders share a single [`Index`] of product ids so that a column of the
//! interaction matrix and a row of the co-occurrence matrix always refer to the
//! same product.

mod cooccurrence;
mod interaction;

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

pub use cooccurrence::{CooccurrenceMatrix, ProductPair};
pub use interaction::{InteractionMatrix, InteractionMode};

use crate::domain::product::{ProductCatalog, ProductId};
use crate::domain::transaction::Transaction;

/// Sorted, deduplicated id set with O(1) position lookup.
#[derive(Clone, Debug)]
pub struct Index<K> {
    keys: Vec<K>,
    positions: HashMap<K, usize>,
}

impl<K: Ord + Hash + Clone> Index<K> {
    pub fn from_keys(keys: impl IntoIterator<Item = K>) -> Self {
        let keys: Vec<K> = keys.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
        let positions = keys.iter().enumerate().map(|(position, key)| (key.clone(), position)).collect();
        Self { keys, positions }
    }

    pub fn position(&self, key: &K) -> Option<usize> {
        self.positions.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.positions.contains_key(key)
    }

    pub fn key(&self, position: usize) -> Option<&K> {
        self.keys.get(position)
    }

    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

pub type ProductIndex = Index<ProductId>;

/// Products seen in the transactions plus every catalog entry, ascending.
pub fn product_index(transactions: &[Transaction], catalog: &ProductCatalog) -> ProductIndex {
    Index::from_keys(
        transactions
            .iter()
            .map(|transaction| transaction.product_id.clone())
            .chain(catalog.product_ids().cloned()),
    )
}

/// Sorts by score descending with ascending key on ties, then truncates.
pub(crate) fn top_n_by_score<K: Ord>(mut scored: Vec<(K, f64)>, top_n: usize) -> Vec<(K, f64)> {
    scored.sort_by(|left, right| right.1.total_cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
    scored.truncate(top_n);
    scored
}
