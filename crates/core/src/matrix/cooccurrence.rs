use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{product_index, ProductIndex};
use crate::domain::product::{ProductCatalog, ProductId};
use crate::domain::transaction::{group_baskets, Transaction};
use crate::errors::{EngineError, EngineResult};

/// Symmetric product x product count of baskets containing both products.
/// The diagonal is kept at zero and never read as a similarity.
#[derive(Clone, Debug)]
pub struct CooccurrenceMatrix {
    products: Arc<ProductIndex>,
    counts: Array2<u32>,
    basket_count: usize,
}

/// Unordered product pair with `first < second`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPair {
    pub first: ProductId,
    pub second: ProductId,
    pub count: u32,
    pub first_category: Option<String>,
    pub second_category: Option<String>,
}

impl CooccurrenceMatrix {
    pub fn build(transactions: &[Transaction], catalog: &ProductCatalog) -> EngineResult<Self> {
        Self::build_with_products(transactions, Arc::new(product_index(transactions, catalog)))
    }

    pub fn build_with_products(
        transactions: &[Transaction],
        products: Arc<ProductIndex>,
    ) -> EngineResult<Self> {
        if transactions.is_empty() {
            return Err(EngineError::EmptyDataset);
        }

        let baskets = group_baskets(transactions);
        let mut counts = Array2::<u32>::zeros((products.len(), products.len()));

        for basket in baskets.values().filter(|basket| basket.len() > 1) {
            let positions = basket
                .iter()
                .map(|product_id| {
                    products
                        .position(product_id)
                        .ok_or_else(|| EngineError::unknown_product(product_id.as_str()))
                })
                .collect::<EngineResult<Vec<_>>>()?;

            for (offset, &left) in positions.iter().enumerate() {
                for &right in &positions[offset + 1..] {
                    counts[[left, right]] += 1;
                    counts[[right, left]] += 1;
                }
            }
        }

        Ok(Self { products, counts, basket_count: baskets.len() })
    }

    pub fn products(&self) -> &Arc<ProductIndex> {
        &self.products
    }

    pub fn counts(&self) -> ArrayView2<'_, u32> {
        self.counts.view()
    }

    pub fn basket_count(&self) -> usize {
        self.basket_count
    }

    pub fn product_position(&self, product_id: &ProductId) -> EngineResult<usize> {
        self.products.position(product_id).ok_or_else(|| EngineError::unknown_product(product_id.as_str()))
    }

    pub fn row(&self, product_id: &ProductId) -> EngineResult<ArrayView1<'_, u32>> {
        Ok(self.counts.row(self.product_position(product_id)?))
    }

    /// Baskets containing both products; zero for a product with itself.
    pub fn count(&self, left: &ProductId, right: &ProductId) -> EngineResult<u32> {
        let left = self.product_position(left)?;
        let right = self.product_position(right)?;
        if left == right {
            return Ok(0);
        }
        Ok(self.counts[[left, right]])
    }

    /// Products bought together with `product_id`, by count desc then id asc.
    pub fn co_purchased(
        &self,
        product_id: &ProductId,
        top_n: usize,
    ) -> EngineResult<Vec<(ProductId, u32)>> {
        let position = self.product_position(product_id)?;

        let mut partners: Vec<(ProductId, u32)> = self
            .counts
            .row(position)
            .iter()
            .enumerate()
            .filter(|(other, count)| *other != position && **count > 0)
            .filter_map(|(other, count)| self.products.key(other).map(|id| (id.clone(), *count)))
            .collect();

        partners.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
        partners.truncate(top_n);
        Ok(partners)
    }

    /// Every pair bought together at least `min_count` times.
    pub fn frequently_bought_together(
        &self,
        min_count: u32,
        catalog: &ProductCatalog,
    ) -> Vec<ProductPair> {
        let min_count = min_count.max(1);
        let mut pairs = Vec::new();

        for ((left, right), count) in self.counts.indexed_iter() {
            if left >= right || *count < min_count {
                continue;
            }
            let (Some(first), Some(second)) = (self.products.key(left), self.products.key(right))
            else {
                continue;
            };
            pairs.push(ProductPair {
                first: first.clone(),
                second: second.clone(),
                count: *count,
                first_category: catalog.category_of(first).map(str::to_owned),
                second_category: catalog.category_of(second).map(str::to_owned),
            });
        }

        pairs.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.first.cmp(&b.first))
                .then_with(|| a.second.cmp(&b.second))
        });
        pairs
    }
}
