//! Descriptive statistics for one transaction snapshot.
//!
//! Single-item baskets count toward per-product popularity here even though the
//! co-occurrence matrix ignores them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::product::{ProductCatalog, ProductId};
use crate::domain::transaction::{group_baskets, Transaction, TransactionId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotStats {
    pub total_transactions: usize,
    pub unique_customers: usize,
    pub unique_products: usize,
    pub basket_count: usize,
    pub single_item_baskets: usize,
    pub average_basket_size: f64,
    pub first_purchase: Option<DateTime<Utc>>,
    pub last_purchase: Option<DateTime<Utc>>,
    /// Most purchased products by row count
    pub top_products: Vec<ProductCount>,
    /// Most purchased catalog categories by row count; uncategorized rows are skipped
    pub top_categories: Vec<CategoryCount>,
}

/// Entries kept in each `top_*` list of [`SnapshotStats`].
pub const TOP_SUMMARY_LEN: usize = 5;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCount {
    pub product_id: ProductId,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub rows: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductStats {
    pub product_id: ProductId,
    pub name: Option<String>,
    pub category: Option<String>,
    pub total_transactions: usize,
    pub total_quantity: u64,
    pub unique_customers: usize,
    pub basket_count: usize,
    pub first_purchase: Option<DateTime<Utc>>,
    pub last_purchase: Option<DateTime<Utc>>,
}

impl SnapshotStats {
    pub fn compute(transactions: &[Transaction], catalog: &ProductCatalog) -> Self {
        let baskets = group_baskets(transactions);
        let customers: BTreeSet<&CustomerId> =
            transactions.iter().map(|transaction| &transaction.customer_id).collect();
        let products: BTreeSet<&ProductId> =
            transactions.iter().map(|transaction| &transaction.product_id).collect();
        let items: usize = baskets.values().map(BTreeSet::len).sum();

        Self {
            total_transactions: transactions.len(),
            unique_customers: customers.len(),
            unique_products: products.len(),
            basket_count: baskets.len(),
            single_item_baskets: baskets.values().filter(|basket| basket.len() == 1).count(),
            average_basket_size: if baskets.is_empty() {
                0.0
            } else {
                items as f64 / baskets.len() as f64
            },
            first_purchase: transactions.iter().map(|transaction| transaction.timestamp).min(),
            last_purchase: transactions.iter().map(|transaction| transaction.timestamp).max(),
            top_products: most_frequent(transactions.iter().map(|transaction| &transaction.product_id))
                .into_iter()
                .map(|(product_id, rows)| ProductCount { product_id: product_id.clone(), rows })
                .collect(),
            top_categories: most_frequent(
                transactions.iter().filter_map(|transaction| catalog.category_of(&transaction.product_id)),
            )
            .into_iter()
            .map(|(category, rows)| CategoryCount { category: category.to_owned(), rows })
            .collect(),
        }
    }
}

/// Occurrence counts, highest first with ascending key on ties, cut to [`TOP_SUMMARY_LEN`].
fn most_frequent<K: Ord>(keys: impl Iterator<Item = K>) -> Vec<(K, usize)> {
    let mut counts: BTreeMap<K, usize> = BTreeMap::new();
    for key in keys {
        *counts.entry(key).or_default() += 1;
    }
    let mut ranked: Vec<(K, usize)> = counts.into_iter().collect();
    ranked.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
    ranked.truncate(TOP_SUMMARY_LEN);
    ranked
}

#[derive(Default)]
struct ProductAccumulator<'a> {
    rows: usize,
    quantity: u64,
    customers: BTreeSet<&'a CustomerId>,
    baskets: BTreeSet<&'a TransactionId>,
    first: Option<DateTime<Utc>>,
    last: Option<DateTime<Utc>>,
}

impl ProductStats {
    /// Per-product popularity, most purchased first (ties by product id).
    /// Catalog products without sales are omitted.
    pub fn compute(transactions: &[Transaction], catalog: &ProductCatalog) -> Vec<Self> {
        let mut accumulators: BTreeMap<&ProductId, ProductAccumulator<'_>> = BTreeMap::new();

        for transaction in transactions {
            let entry = accumulators.entry(&transaction.product_id).or_default();
            entry.rows += 1;
            entry.quantity += u64::from(transaction.quantity);
            entry.customers.insert(&transaction.customer_id);
            entry.baskets.insert(&transaction.transaction_id);
            entry.first = Some(entry.first.map_or(transaction.timestamp, |at| at.min(transaction.timestamp)));
            entry.last = Some(entry.last.map_or(transaction.timestamp, |at| at.max(transaction.timestamp)));
        }

        let mut stats: Vec<Self> = accumulators
            .into_iter()
            .map(|(product_id, accumulator)| {
                let entry = catalog.get(product_id);
                Self {
                    product_id: product_id.clone(),
                    name: entry.map(|entry| entry.name.clone()),
                    category: entry.map(|entry| entry.category.clone()),
                    total_transactions: accumulator.rows,
                    total_quantity: accumulator.quantity,
                    unique_customers: accumulator.customers.len(),
                    basket_count: accumulator.baskets.len(),
                    first_purchase: accumulator.first,
                    last_purchase: accumulator.last,
                }
            })
            .collect();

        stats.sort_by(|left, right| {
            right
                .total_transactions
                .cmp(&left.total_transactions)
                .then_with(|| left.product_id.cmp(&right.product_id))
        });
        stats
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomerStats {
    pub customer_id: CustomerId,
    pub total_transactions: usize,
    pub unique_products: usize,
    pub basket_count: usize,
    /// Distinct calendar days (UTC) with at least one purchase
    pub shopping_days: usize,
    /// Rows per basket
    pub average_basket_size: f64,
    pub first_purchase: DateTime<Utc>,
    pub last_purchase: DateTime<Utc>,
}

struct CustomerAccumulator<'a> {
    rows: usize,
    products: BTreeSet<&'a ProductId>,
    baskets: BTreeSet<&'a TransactionId>,
    days: BTreeSet<NaiveDate>,
    first: DateTime<Utc>,
    last: DateTime<Utc>,
}

impl CustomerStats {
    /// Per-customer activity, most active first (ties by customer id).
    pub fn compute(transactions: &[Transaction]) -> Vec<Self> {
        let mut accumulators: BTreeMap<&CustomerId, CustomerAccumulator<'_>> = BTreeMap::new();

        for transaction in transactions {
            let at = transaction.timestamp;
            let entry = accumulators.entry(&transaction.customer_id).or_insert_with(|| {
                CustomerAccumulator {
                    rows: 0,
                    products: BTreeSet::new(),
                    baskets: BTreeSet::new(),
                    days: BTreeSet::new(),
                    first: at,
                    last: at,
                }
            });
            entry.rows += 1;
            entry.products.insert(&transaction.product_id);
            entry.baskets.insert(&transaction.transaction_id);
            entry.days.insert(at.date_naive());
            entry.first = entry.first.min(at);
            entry.last = entry.last.max(at);
        }

        let mut stats: Vec<Self> = accumulators
            .into_iter()
            .map(|(customer_id, accumulator)| Self {
                customer_id: customer_id.clone(),
                total_transactions: accumulator.rows,
                unique_products: accumulator.products.len(),
                basket_count: accumulator.baskets.len(),
                shopping_days: accumulator.days.len(),
                average_basket_size: accumulator.rows as f64 / accumulator.baskets.len() as f64,
                first_purchase: accumulator.first,
                last_purchase: accumulator.last,
            })
            .collect();

        stats.sort_by(|left, right| {
            right
                .total_transactions
                .cmp(&left.total_transactions)
                .then_with(|| left.customer_id.cmp(&right.customer_id))
        });
        stats
    }
}

/// One customer's rows in purchase order (ties by transaction id).
pub fn purchase_history<'a>(
    transactions: &'a [Transaction],
    customer_id: &CustomerId,
) -> Vec<&'a Transaction> {
    let mut history: Vec<&Transaction> =
        transactions.iter().filter(|transaction| &transaction.customer_id == customer_id).collect();
    history.sort_by(|left, right| {
        left.timestamp
            .cmp(&right.timestamp)
            .then_with(|| left.transaction_id.cmp(&right.transaction_id))
    });
    history
}
