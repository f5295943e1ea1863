use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::customer::CustomerId;
use super::product::ProductId;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// One purchased line. Rows sharing a `transaction_id` form a basket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

impl Transaction {
    pub fn new(
        transaction_id: impl Into<String>,
        customer_id: impl Into<String>,
        product_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id: TransactionId(transaction_id.into()),
            customer_id: CustomerId(customer_id.into()),
            product_id: ProductId(product_id.into()),
            timestamp,
            quantity: default_quantity(),
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

/// Distinct products per transaction id, ordered by transaction id.
pub fn group_baskets(transactions: &[Transaction]) -> BTreeMap<&TransactionId, BTreeSet<&ProductId>> {
    let mut baskets: BTreeMap<&TransactionId, BTreeSet<&ProductId>> = BTreeMap::new();
    for transaction in transactions {
        baskets.entry(&transaction.transaction_id).or_default().insert(&transaction.product_id);
    }
    baskets
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{group_baskets, Transaction};

    #[test]
    fn quantity_defaults_to_one_when_absent() {
        let parsed: Transaction = serde_json::from_str(
            r#"{"transaction_id":"t1","customer_id":"c1","product_id":"P1","timestamp":"2024-03-01T09:30:00Z"}"#,
        )
        .expect("transaction should parse");

        assert_eq!(parsed.quantity, 1);
    }

    #[test]
    fn repeated_lines_collapse_into_one_basket_member() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();
        let transactions = vec![
            Transaction::new("t1", "c1", "P1", at),
            Transaction::new("t1", "c1", "P1", at).with_quantity(3),
            Transaction::new("t1", "c1", "P2", at),
            Transaction::new("t2", "c2", "P3", at),
        ];

        let baskets = group_baskets(&transactions);
        let sizes: Vec<usize> = baskets.values().map(|basket| basket.len()).collect();
        assert_eq!(sizes, vec![2, 1]);
    }
}
