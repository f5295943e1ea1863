use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{product_index, Index, ProductIndex};
use crate::domain::customer::CustomerId;
use crate::domain::product::{ProductCatalog, ProductId};
use crate::domain::transaction::Transaction;
use crate::errors::{EngineError, EngineResult};

/// How a customer/product cell accumulates over the history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    /// 1.0 if the customer ever bought the product.
    #[default]
    Binary,
    /// Total purchased quantity.
    Frequency,
}

/// Customer x product affinity matrix with its fixed row/column indices.
#[derive(Clone, Debug)]
pub struct InteractionMatrix {
    customers: Arc<Index<CustomerId>>,
    products: Arc<ProductIndex>,
    values: Array2<f64>,
    mode: InteractionMode,
}

impl InteractionMatrix {
    pub fn build(
        transactions: &[Transaction],
        catalog: &ProductCatalog,
        mode: InteractionMode,
    ) -> EngineResult<Self> {
        Self::build_with_products(transactions, Arc::new(product_index(transactions, catalog)), mode)
    }

    /// Builds against a product index shared with other engines of the same snapshot.
    pub fn build_with_products(
        transactions: &[Transaction],
        products: Arc<ProductIndex>,
        mode: InteractionMode,
    ) -> EngineResult<Self> {
        if transactions.is_empty() {
            return Err(EngineError::EmptyDataset);
        }

        let customers =
            Arc::new(Index::from_keys(transactions.iter().map(|row| row.customer_id.clone())));
        let mut values = Array2::<f64>::zeros((customers.len(), products.len()));

        for transaction in transactions {
            let row = customers
                .position(&transaction.customer_id)
                .ok_or_else(|| EngineError::unknown_customer(transaction.customer_id.as_str()))?;
            let column = products
                .position(&transaction.product_id)
                .ok_or_else(|| EngineError::unknown_product(transaction.product_id.as_str()))?;

            match mode {
                InteractionMode::Binary => values[[row, column]] = 1.0,
                InteractionMode::Frequency => values[[row, column]] += f64::from(transaction.quantity),
            }
        }

        Ok(Self { customers, products, values, mode })
    }

    pub fn customers(&self) -> &Arc<Index<CustomerId>> {
        &self.customers
    }

    pub fn products(&self) -> &Arc<ProductIndex> {
        &self.products
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn customer_position(&self, customer_id: &CustomerId) -> EngineResult<usize> {
        self.customers
            .position(customer_id)
            .ok_or_else(|| EngineError::unknown_customer(customer_id.as_str()))
    }

    pub fn product_position(&self, product_id: &ProductId) -> EngineResult<usize> {
        self.products.position(product_id).ok_or_else(|| EngineError::unknown_product(product_id.as_str()))
    }

    pub fn customer_row(&self, customer_id: &CustomerId) -> EngineResult<ArrayView1<'_, f64>> {
        Ok(self.values.row(self.customer_position(customer_id)?))
    }

    pub fn product_column(&self, product_id: &ProductId) -> EngineResult<ArrayView1<'_, f64>> {
        Ok(self.values.column(self.product_position(product_id)?))
    }

    pub fn value(&self, customer_id: &CustomerId, product_id: &ProductId) -> EngineResult<f64> {
        Ok(self.values[[self.customer_position(customer_id)?, self.product_position(product_id)?]])
    }

    /// Products the customer has a nonzero recorded interaction with.
    pub fn interacted_products(&self, customer_id: &CustomerId) -> EngineResult<Vec<&ProductId>> {
        let row = self.customer_row(customer_id)?;
        Ok(row
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0.0)
            .filter_map(|(position, _)| self.products.key(position))
            .collect())
    }
}
