//! Collaborative filtering over a truncated SVD of the interaction matrix.
//!
//! Missing cells are read as "no observed interaction" (0), never as dislike.
//! Unknown customers are an error here; falling back to non-personalized
//! recommendations is left to the caller.

mod factorization;

use std::sync::Arc;

use ndarray::Array1;

pub use factorization::{effective_rank, factorize, truncated_svd, LatentFactorModel};

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;
use crate::errors::{EngineError, EngineResult};
use crate::matrix::{top_n_by_score, InteractionMatrix};
use crate::similarity::cosine_similarity;

#[derive(Clone, Debug)]
pub struct CollaborativeFilter {
    interactions: Arc<InteractionMatrix>,
    model: LatentFactorModel,
    requested_rank: usize,
}

impl CollaborativeFilter {
    /// Factorizes at `rank`, clamped to `min(customers, products) - 1`.
    pub fn fit(interactions: Arc<InteractionMatrix>, rank: usize) -> EngineResult<Self> {
        if rank == 0 {
            return Err(EngineError::InvalidConfiguration(
                "engine.rank must be greater than zero".to_owned(),
            ));
        }
        Ok(Self::fit_validated(interactions, rank))
    }

    pub(crate) fn fit_validated(interactions: Arc<InteractionMatrix>, rank: usize) -> Self {
        let (customers, products) = interactions.values().dim();
        let effective = effective_rank(rank, customers, products);
        if effective != rank {
            tracing::warn!(
                event_name = "engine.collaborative.rank_clamped",
                requested_rank = rank,
                effective_rank = effective,
                customers,
                products,
                "requested rank exceeds the matrix bound and was clamped"
            );
        }

        let model = factorize(&interactions, rank);
        tracing::debug!(
            event_name = "engine.collaborative.factorized",
            rank = model.rank(),
            iterations = model.iterations(),
            "latent factor model computed"
        );

        Self { interactions, model, requested_rank: rank }
    }

    pub fn model(&self) -> &LatentFactorModel {
        &self.model
    }

    pub fn interactions(&self) -> &Arc<InteractionMatrix> {
        &self.interactions
    }

    pub fn requested_rank(&self) -> usize {
        self.requested_rank
    }

    /// Approximate affinity `A_hat[customer, product]`.
    pub fn predict(&self, customer_id: &CustomerId, product_id: &ProductId) -> EngineResult<f64> {
        let customer = self.interactions.customer_position(customer_id)?;
        let product = self.interactions.product_position(product_id)?;
        Ok(self.model.predict(customer, product))
    }

    /// Full predicted row for one customer, in product index order.
    pub fn predicted_affinities(&self, customer_id: &CustomerId) -> EngineResult<Array1<f64>> {
        let customer = self.interactions.customer_position(customer_id)?;
        Ok(self.model.predict_row(customer))
    }

    /// Products ranked by predicted affinity, skipping anything the customer already has.
    pub fn recommend_for_customer(
        &self,
        customer_id: &CustomerId,
        top_n: usize,
    ) -> EngineResult<Vec<(ProductId, f64)>> {
        let customer = self.interactions.customer_position(customer_id)?;
        let values = self.interactions.values();
        let recorded = values.row(customer);
        let predicted = self.model.predict_row(customer);

        let scored = predicted
            .iter()
            .enumerate()
            .filter(|(product, _)| recorded[*product] == 0.0)
            .filter_map(|(product, score)| {
                self.interactions.products().key(product).map(|id| (id.clone(), *score))
            })
            .collect();

        Ok(top_n_by_score(scored, top_n))
    }

    /// Other customers by cosine similarity of their recorded interaction rows.
    pub fn similar_customers(
        &self,
        customer_id: &CustomerId,
        top_n: usize,
    ) -> EngineResult<Vec<(CustomerId, f64)>> {
        let customer = self.interactions.customer_position(customer_id)?;
        let values = self.interactions.values();
        let target = values.row(customer);

        let scored = values
            .rows()
            .into_iter()
            .enumerate()
            .filter(|(other, _)| *other != customer)
            .map(|(other, row)| (other, cosine_similarity(target, row)))
            .filter(|(_, similarity)| *similarity > 0.0)
            .filter_map(|(other, similarity)| {
                self.interactions.customers().key(other).map(|id| (id.clone(), similarity))
            })
            .collect();

        Ok(top_n_by_score(scored, top_n))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::CollaborativeFilter;
    use crate::domain::customer::CustomerId;
    use crate::domain::product::{ProductCatalog, ProductId};
    use crate::domain::transaction::Transaction;
    use crate::errors::EngineError;
    use crate::matrix::{InteractionMatrix, InteractionMode};

    fn interactions() -> Arc<InteractionMatrix> {
        let at = Utc::now();
        let rows = [
            ("t1", "c1", "P1"),
            ("t1", "c1", "P2"),
            ("t2", "c2", "P1"),
            ("t2", "c2", "P2"),
            ("t2", "c2", "P3"),
            ("t3", "c3", "P3"),
            ("t3", "c3", "P4"),
            ("t4", "c4", "P1"),
            ("t4", "c4", "P3"),
            ("t4", "c4", "P4"),
        ];
        let transactions: Vec<Transaction> = rows
            .iter()
            .map(|(transaction, customer, product)| {
                Transaction::new(*transaction, *customer, *product, at)
            })
            .collect();
        Arc::new(
            InteractionMatrix::build(&transactions, &ProductCatalog::default(), InteractionMode::Binary)
                .expect("interactions build"),
        )
    }

    #[test]
    fn zero_rank_is_invalid_configuration() {
        let error = CollaborativeFilter::fit(interactions(), 0).expect_err("rank 0 is rejected");

        assert!(matches!(error, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn oversized_rank_is_clamped() {
        let filter = CollaborativeFilter::fit(interactions(), 40).expect("fits");

        assert_eq!(filter.model().rank(), 3);
        assert_eq!(filter.requested_rank(), 40);
    }

    #[test]
    fn unknown_customer_is_rejected() {
        let filter = CollaborativeFilter::fit(interactions(), 2).expect("fits");

        let error = filter.recommend_for_customer(&"unknown".into(), 5).expect_err("cold start");
        assert_eq!(error, EngineError::unknown_customer("unknown"));
        assert!(filter.predict(&"unknown".into(), &"P1".into()).is_err());
    }

    #[test]
    fn recommendations_skip_owned_products() {
        let filter = CollaborativeFilter::fit(interactions(), 2).expect("fits");

        let recommended = filter.recommend_for_customer(&"c1".into(), 5).expect("known customer");
        let ids: Vec<&str> = recommended.iter().map(|(id, _)| id.as_str()).collect();

        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"P1"));
        assert!(!ids.contains(&"P2"));
        for pair in recommended.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn predict_agrees_with_predicted_row() {
        let filter = CollaborativeFilter::fit(interactions(), 2).expect("fits");
        let customer = CustomerId::from("c2");

        let row = filter.predicted_affinities(&customer).expect("known customer");
        let single = filter.predict(&customer, &ProductId::from("P3")).expect("known pair");
        assert!((row[2] - single).abs() < 1e-12);
    }

    #[test]
    fn similar_customers_excludes_self() {
        let filter = CollaborativeFilter::fit(interactions(), 2).expect("fits");

        let similar = filter.similar_customers(&"c1".into(), 10).expect("known customer");

        assert_eq!(similar[0].0, CustomerId::from("c2"));
        assert!(similar.iter().all(|(id, _)| id != &CustomerId::from("c1")));
        assert!(similar.iter().all(|(id, _)| id != &CustomerId::from("c3")));
    }
}
