//! Product-to-product cosine similarity over a configurable feature source.

use std::sync::Arc;

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::errors::{EngineError, EngineResult};
use crate::matrix::{top_n_by_score, CooccurrenceMatrix, InteractionMatrix, ProductIndex};

/// Which vector represents a product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSource {
    /// The product's column in the interaction matrix (one entry per customer).
    #[default]
    Interaction,
    /// The product's row in the co-occurrence matrix.
    Cooccurrence,
}

/// `(a . b) / (|a| |b|)`, or 0 when either vector has zero norm.
pub fn cosine_similarity(left: ArrayView1<'_, f64>, right: ArrayView1<'_, f64>) -> f64 {
    let left_norm = left.dot(&left).sqrt();
    let right_norm = right.dot(&right).sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    (left.dot(&right) / (left_norm * right_norm)).clamp(-1.0, 1.0)
}

#[derive(Clone, Debug)]
pub struct ContentSimilarity {
    products: Arc<ProductIndex>,
    similarities: Array2<f64>,
    source: FeatureSource,
}

impl ContentSimilarity {
    pub fn build(
        source: FeatureSource,
        interactions: &InteractionMatrix,
        cooccurrence: &CooccurrenceMatrix,
    ) -> Self {
        match source {
            FeatureSource::Interaction => Self::from_interactions(interactions),
            FeatureSource::Cooccurrence => Self::from_cooccurrence(cooccurrence),
        }
    }

    pub fn from_interactions(matrix: &InteractionMatrix) -> Self {
        let vectors = matrix.values().t().to_owned();
        Self::from_vectors(Arc::clone(matrix.products()), vectors.view(), FeatureSource::Interaction)
    }

    pub fn from_cooccurrence(matrix: &CooccurrenceMatrix) -> Self {
        let vectors = matrix.counts().mapv(f64::from);
        Self::from_vectors(Arc::clone(matrix.products()), vectors.view(), FeatureSource::Cooccurrence)
    }

    /// One row of `vectors` per product in `products` order.
    fn from_vectors(
        products: Arc<ProductIndex>,
        vectors: ArrayView2<'_, f64>,
        source: FeatureSource,
    ) -> Self {
        let count = vectors.nrows();
        let mut similarities = Array2::<f64>::zeros((count, count));

        for left in 0..count {
            let left_vector = vectors.row(left);
            if left_vector.iter().any(|value| *value != 0.0) {
                similarities[[left, left]] = 1.0;
            }
            for right in left + 1..count {
                let similarity = cosine_similarity(left_vector, vectors.row(right));
                similarities[[left, right]] = similarity;
                similarities[[right, left]] = similarity;
            }
        }

        tracing::debug!(
            event_name = "engine.similarity.built",
            products = count,
            source = ?source,
            "content similarity matrix built"
        );

        Self { products, similarities, source }
    }

    pub fn source(&self) -> FeatureSource {
        self.source
    }

    pub fn products(&self) -> &Arc<ProductIndex> {
        &self.products
    }

    pub fn similarities(&self) -> ArrayView2<'_, f64> {
        self.similarities.view()
    }

    pub fn product_position(&self, product_id: &ProductId) -> EngineResult<usize> {
        self.products.position(product_id).ok_or_else(|| EngineError::unknown_product(product_id.as_str()))
    }

    pub fn similarity(&self, left: &ProductId, right: &ProductId) -> EngineResult<f64> {
        Ok(self.similarities[[self.product_position(left)?, self.product_position(right)?]])
    }

    /// Most similar products, excluding the query itself and anything with similarity <= 0.
    pub fn similar_to(
        &self,
        product_id: &ProductId,
        top_n: usize,
    ) -> EngineResult<Vec<(ProductId, f64)>> {
        let position = self.product_position(product_id)?;

        let scored = self
            .similarities
            .row(position)
            .iter()
            .enumerate()
            .filter(|(other, similarity)| *other != position && **similarity > 0.0)
            .filter_map(|(other, similarity)| {
                self.products.key(other).map(|id| (id.clone(), *similarity))
            })
            .collect();

        Ok(top_n_by_score(scored, top_n))
    }
}
