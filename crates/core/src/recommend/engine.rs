//! One immutable recommendation snapshot.
//!
//! Everything is derived from the transactions and catalog supplied to
//! [`RecommendationEngine::build`]. New data means building a new engine; an
//! existing one is never mutated, so concurrent readers are unaffected.

use std::sync::{Arc, OnceLock};

use super::basket::BasketAggregator;
use super::scoring::{HybridScorer, ScoringWeights};
use super::types::{BasketRequest, HybridQuery};
use crate::collaborative::CollaborativeFilter;
use crate::config::EngineConfig;
use crate::domain::customer::CustomerId;
use crate::domain::product::{ProductCatalog, ProductId};
use crate::domain::recommendation::Recommendation;
use crate::domain::transaction::Transaction;
use crate::errors::{EngineError, EngineResult};
use crate::matrix::{product_index, CooccurrenceMatrix, InteractionMatrix, ProductPair};
use crate::similarity::ContentSimilarity;
use crate::stats::{purchase_history, CustomerStats, ProductStats, SnapshotStats};

#[derive(Debug)]
pub struct RecommendationEngine {
    config: EngineConfig,
    weights: ScoringWeights,
    catalog: ProductCatalog,
    transactions: Vec<Transaction>,
    interactions: Arc<InteractionMatrix>,
    cooccurrence: CooccurrenceMatrix,
    content: ContentSimilarity,
    collaborative: OnceLock<CollaborativeFilter>,
}

impl RecommendationEngine {
    pub fn build(
        transactions: Vec<Transaction>,
        catalog: ProductCatalog,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;
        if transactions.is_empty() {
            return Err(EngineError::EmptyDataset);
        }

        let products = Arc::new(product_index(&transactions, &catalog));
        let interactions = Arc::new(InteractionMatrix::build_with_products(
            &transactions,
            Arc::clone(&products),
            config.interaction_mode,
        )?);
        let cooccurrence = CooccurrenceMatrix::build_with_products(&transactions, products)?;
        let content = ContentSimilarity::build(config.feature_source, &interactions, &cooccurrence);

        tracing::info!(
            event_name = "engine.snapshot.built",
            transactions = transactions.len(),
            customers = interactions.customers().len(),
            products = interactions.products().len(),
            baskets = cooccurrence.basket_count(),
            feature_source = ?config.feature_source,
            interaction_mode = ?interactions.mode(),
            "recommendation snapshot built"
        );

        Ok(Self {
            weights: config.effective_weights(),
            config,
            catalog,
            transactions,
            interactions,
            cooccurrence,
            content,
            collaborative: OnceLock::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn interactions(&self) -> &Arc<InteractionMatrix> {
        &self.interactions
    }

    pub fn cooccurrence(&self) -> &CooccurrenceMatrix {
        &self.cooccurrence
    }

    pub fn content(&self) -> &ContentSimilarity {
        &self.content
    }

    /// Factorized on first use, then shared by every later query.
    pub fn collaborative(&self) -> &CollaborativeFilter {
        self.collaborative.get_or_init(|| {
            CollaborativeFilter::fit_validated(Arc::clone(&self.interactions), self.config.rank)
        })
    }

    pub fn scorer(&self) -> EngineResult<HybridScorer<'_>> {
        let scorer = HybridScorer::new(
            &self.catalog,
            &self.interactions,
            &self.cooccurrence,
            &self.content,
            self.weights,
        )?;
        if self.weights.collaborative > 0.0 {
            Ok(scorer.with_collaborative(self.collaborative()))
        } else {
            Ok(scorer)
        }
    }

    pub fn co_purchased(
        &self,
        product_id: &ProductId,
        top_n: usize,
    ) -> EngineResult<Vec<(ProductId, u32)>> {
        self.cooccurrence.co_purchased(product_id, top_n)
    }

    pub fn frequently_bought_together(&self, min_count: u32) -> Vec<ProductPair> {
        self.cooccurrence.frequently_bought_together(min_count, &self.catalog)
    }

    pub fn similar_to(
        &self,
        product_id: &ProductId,
        top_n: usize,
    ) -> EngineResult<Vec<(ProductId, f64)>> {
        self.content.similar_to(product_id, top_n)
    }

    pub fn predict(&self, customer_id: &CustomerId, product_id: &ProductId) -> EngineResult<f64> {
        self.collaborative().predict(customer_id, product_id)
    }

    pub fn recommend_for_customer(
        &self,
        customer_id: &CustomerId,
        top_n: usize,
    ) -> EngineResult<Vec<(ProductId, f64)>> {
        self.collaborative().recommend_for_customer(customer_id, top_n)
    }

    pub fn similar_customers(
        &self,
        customer_id: &CustomerId,
        top_n: usize,
    ) -> EngineResult<Vec<(CustomerId, f64)>> {
        self.collaborative().similar_customers(customer_id, top_n)
    }

    /// Hybrid recommendations; the configured category filter applies when the
    /// query does not name one.
    pub fn recommend(&self, query: &HybridQuery) -> EngineResult<Vec<Recommendation>> {
        let mut query = query.clone();
        if query.category.is_none() {
            query.category = self.config.category_filter.clone();
        }

        let results = self.scorer()?.score(&query)?;
        tracing::debug!(
            event_name = "engine.scorer.query_completed",
            seed_product = query.seed_product.as_ref().map(ProductId::as_str),
            customer_id = query.customer_id.as_ref().map(CustomerId::as_str),
            results = results.len(),
            "hybrid query scored"
        );
        Ok(results)
    }

    pub fn recommend_for_basket(&self, request: &BasketRequest) -> EngineResult<Vec<Recommendation>> {
        let mut request = request.clone();
        if request.category.is_none() {
            request.category = self.config.category_filter.clone();
        }
        BasketAggregator::new(self.scorer()?, self.config.aggregation).recommend(&request)
    }

    pub fn explain(&self, seed: &ProductId, recommended: &ProductId) -> EngineResult<Vec<String>> {
        self.scorer()?.explain(seed, recommended)
    }

    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats::compute(&self.transactions, &self.catalog)
    }

    pub fn product_stats(&self) -> Vec<ProductStats> {
        ProductStats::compute(&self.transactions, &self.catalog)
    }

    pub fn customer_stats(&self) -> Vec<CustomerStats> {
        CustomerStats::compute(&self.transactions)
    }

    /// Every row the customer bought, oldest first.
    pub fn purchase_history(&self, customer_id: &CustomerId) -> EngineResult<Vec<&Transaction>> {
        self.interactions.customer_position(customer_id)?;
        Ok(purchase_history(&self.transactions, customer_id))
    }

    /// Frobenius norm of the residual of the configured-rank model.
    pub fn reconstruction_error(&self) -> f64 {
        self.collaborative().model().reconstruction_error(&self.interactions)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::RecommendationEngine;
    use crate::config::EngineConfig;
    use crate::domain::customer::CustomerId;
    use crate::domain::product::{CatalogEntry, ProductCatalog, ProductId};
    use crate::domain::transaction::Transaction;
    use crate::errors::EngineError;
    use crate::recommend::{BasketRequest, HybridQuery, Strategy};

    fn transactions() -> Vec<Transaction> {
        let at = Utc::now();
        [
            ("t1", "c1", "P1"),
            ("t1", "c1", "P2"),
            ("t2", "c2", "P1"),
            ("t2", "c2", "P3"),
            ("t3", "c3", "P2"),
            ("t3", "c3", "P3"),
            ("t4", "c1", "P4"),
        ]
        .iter()
        .map(|(transaction, customer, product)| Transaction::new(*transaction, *customer, *product, at))
        .collect()
    }

    fn catalog() -> ProductCatalog {
        ProductCatalog::new([
            CatalogEntry::new("P1", "Oat Milk", "Dairy & Eggs"),
            CatalogEntry::new("P2", "Granola", "Groceries & Pantry"),
            CatalogEntry::new("P3", "Yogurt", "Dairy & Eggs"),
            CatalogEntry::new("P5", "Sparkling Water", "Beverages"),
        ])
    }

    fn engine(config: EngineConfig) -> RecommendationEngine {
        RecommendationEngine::build(transactions(), catalog(), config).expect("engine builds")
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let error = RecommendationEngine::build(Vec::new(), catalog(), EngineConfig::default())
            .expect_err("no transactions");

        assert_eq!(error, EngineError::EmptyDataset);
    }

    #[test]
    fn invalid_configuration_is_rejected_before_building() {
        let config = EngineConfig { rank: 0, ..EngineConfig::default() };

        let error = RecommendationEngine::build(transactions(), catalog(), config)
            .expect_err("rank 0 is invalid");
        assert!(matches!(error, EngineError::InvalidConfiguration(_)));
    }

    #[test]
    fn catalog_only_products_are_valid_ids() {
        let engine = engine(EngineConfig::default());

        assert!(engine.similar_to(&"P5".into(), 3).expect("catalog product").is_empty());
        assert!(engine.co_purchased(&"P5".into(), 3).expect("catalog product").is_empty());
        // P4 is sold but not in the catalog.
        assert!(engine.co_purchased(&"P4".into(), 3).is_ok());
    }

    #[test]
    fn collaborative_model_is_built_once() {
        let engine = engine(EngineConfig::default());

        let first = engine.collaborative() as *const _;
        let second = engine.collaborative() as *const _;
        assert_eq!(first, second);
        assert_eq!(engine.collaborative().model().rank(), 2);
    }

    #[test]
    fn configured_category_filter_applies_to_queries() {
        let config = EngineConfig {
            category_filter: Some("Dairy & Eggs".to_string()),
            ..EngineConfig::default()
        };
        let engine = engine(config);

        let results = engine.recommend(&HybridQuery::for_product("P2")).expect("known seed");
        assert!(!results.is_empty());
        assert!(results
            .iter()
            .all(|item| engine.catalog().category_of(&item.product_id) == Some("Dairy & Eggs")));
    }

    #[test]
    fn basket_recommendations_exclude_the_basket() {
        let engine = engine(EngineConfig::default());

        let results =
            engine.recommend_for_basket(&BasketRequest::new(["P1", "P2"])).expect("known basket");

        assert!(results
            .iter()
            .all(|item| item.product_id != ProductId::from("P1") && item.product_id != ProductId::from("P2")));
    }

    #[test]
    fn similarity_strategy_never_fits_the_collaborative_model() {
        let engine =
            engine(EngineConfig { strategy: Strategy::Similarity, ..EngineConfig::default() });

        let results = engine.recommend(&HybridQuery::for_product("P1")).expect("known seed");

        assert!(!results.is_empty());
        assert!(engine.collaborative.get().is_none());
    }

    #[test]
    fn stats_cover_the_snapshot() {
        let engine = engine(EngineConfig::default());

        let stats = engine.stats();
        assert_eq!(stats.total_transactions, 7);
        assert_eq!(stats.basket_count, 4);
        assert_eq!(stats.single_item_baskets, 1);

        assert_eq!(stats.top_products[0].rows, 2);
        assert_eq!(stats.top_categories[0].category, "Dairy & Eggs");
        assert_eq!(stats.top_categories[0].rows, 4);

        let products = engine.product_stats();
        assert_eq!(products.len(), 4);
        assert!(engine.reconstruction_error() >= 0.0);
    }

    #[test]
    fn customer_profiles_and_history() {
        let engine = engine(EngineConfig::default());

        let customers = engine.customer_stats();
        assert_eq!(customers.len(), 3);
        assert_eq!(customers[0].customer_id, CustomerId::from("c1"));
        assert_eq!(customers[0].basket_count, 2);

        let history = engine.purchase_history(&CustomerId::from("c1")).expect("known customer");
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|row| row.customer_id == CustomerId::from("c1")));

        let error = engine.purchase_history(&CustomerId::from("ghost")).expect_err("unknown customer");
        assert_eq!(error, EngineError::unknown_customer("ghost"));
    }
}
