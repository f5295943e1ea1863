use std::path::Path;

use freshcart_core::{
    ApplicationError, BasketRequest, CustomerId, CustomerStats, HybridQuery, ProductId,
    ProductStats, RecommendationEngine, SnapshotStats, Transaction,
};
use serde::Serialize;

use super::{CommandResult, RuntimeOptions};

#[derive(Debug, Serialize)]
struct ScoredProduct {
    product_id: ProductId,
    score: f64,
}

#[derive(Debug, Serialize)]
struct CountedProduct {
    product_id: ProductId,
    count: u32,
}

#[derive(Debug, Serialize)]
struct ScoredCustomer {
    customer_id: CustomerId,
    similarity: f64,
}

#[derive(Debug, Serialize)]
struct StatsReport {
    snapshot: SnapshotStats,
    top_products: Vec<ProductStats>,
}

#[derive(Debug, Serialize)]
struct CustomerReport {
    profile: Option<CustomerStats>,
    purchase_history: Vec<Transaction>,
    recommendations: Vec<ScoredProduct>,
    similar_customers: Vec<ScoredCustomer>,
}

/// Builds the engine, runs `query`, and wraps either outcome in a payload.
fn execute<T, F>(command: &str, options: &RuntimeOptions, snapshot: &Path, query: F) -> CommandResult
where
    T: Serialize,
    F: FnOnce(&RecommendationEngine) -> Result<(String, T), ApplicationError>,
{
    let outcome = options.build_engine(snapshot).and_then(|engine| query(&engine));
    match outcome {
        Ok((message, data)) => CommandResult::success_with_data(command, message, data),
        Err(error) => {
            tracing::warn!(
                event_name = "cli.command.failed",
                command,
                error_class = error.error_class(),
                "{error}"
            );
            CommandResult::from_error(command, &error)
        }
    }
}

fn top_n_or_default(engine: &RecommendationEngine, top_n: Option<usize>) -> usize {
    top_n.unwrap_or(engine.config().top_n)
}

pub fn stats(options: &RuntimeOptions, snapshot: &Path, top_products: usize) -> CommandResult {
    execute("stats", options, snapshot, |engine| {
        let totals = engine.stats();
        let mut products = engine.product_stats();
        products.truncate(top_products);
        let message = format!(
            "{} transactions across {} baskets",
            totals.total_transactions, totals.basket_count
        );
        Ok((message, StatsReport { snapshot: totals, top_products: products }))
    })
}

pub fn similar(
    options: &RuntimeOptions,
    snapshot: &Path,
    product: &str,
    top_n: Option<usize>,
) -> CommandResult {
    execute("similar", options, snapshot, |engine| {
        let product = ProductId::from(product);
        let similar = engine.similar_to(&product, top_n_or_default(engine, top_n))?;
        let message = format!("{} products similar to {product}", similar.len());
        let data: Vec<ScoredProduct> = similar
            .into_iter()
            .map(|(product_id, score)| ScoredProduct { product_id, score })
            .collect();
        Ok((message, data))
    })
}

pub fn co_purchased(
    options: &RuntimeOptions,
    snapshot: &Path,
    product: &str,
    top_n: Option<usize>,
) -> CommandResult {
    execute("co-purchased", options, snapshot, |engine| {
        let product = ProductId::from(product);
        let partners = engine.co_purchased(&product, top_n_or_default(engine, top_n))?;
        let message = format!("{} products bought with {product}", partners.len());
        let data: Vec<CountedProduct> = partners
            .into_iter()
            .map(|(product_id, count)| CountedProduct { product_id, count })
            .collect();
        Ok((message, data))
    })
}

pub fn pairs(options: &RuntimeOptions, snapshot: &Path, min_count: u32) -> CommandResult {
    execute("pairs", options, snapshot, |engine| {
        let pairs = engine.frequently_bought_together(min_count);
        Ok((format!("{} pairs bought together at least {min_count} times", pairs.len()), pairs))
    })
}

pub fn customer(
    options: &RuntimeOptions,
    snapshot: &Path,
    customer: &str,
    top_n: Option<usize>,
) -> CommandResult {
    execute("customer", options, snapshot, |engine| {
        let customer = CustomerId::from(customer);
        let top_n = top_n_or_default(engine, top_n);
        let purchase_history: Vec<Transaction> =
            engine.purchase_history(&customer)?.into_iter().cloned().collect();
        let profile =
            engine.customer_stats().into_iter().find(|stats| stats.customer_id == customer);
        let recommendations = engine
            .recommend_for_customer(&customer, top_n)?
            .into_iter()
            .map(|(product_id, score)| ScoredProduct { product_id, score })
            .collect::<Vec<_>>();
        let similar_customers = engine
            .similar_customers(&customer, top_n)?
            .into_iter()
            .map(|(customer_id, similarity)| ScoredCustomer { customer_id, similarity })
            .collect();
        let message = format!("{} collaborative recommendations for {customer}", recommendations.len());
        Ok((
            message,
            CustomerReport { profile, purchase_history, recommendations, similar_customers },
        ))
    })
}

pub fn recommend(
    options: &RuntimeOptions,
    snapshot: &Path,
    product: Option<&str>,
    customer: Option<&str>,
    exclude_owned: bool,
    top_n: Option<usize>,
) -> CommandResult {
    execute("recommend", options, snapshot, |engine| {
        let mut query = match (product, customer) {
            (product, Some(customer)) => match product {
                Some(product) => HybridQuery::for_customer(customer).with_seed_product(product),
                None => HybridQuery::for_customer(customer),
            },
            (Some(product), None) => HybridQuery::for_product(product),
            (None, None) => {
                return Err(ApplicationError::Engine(
                    freshcart_core::EngineError::InvalidConfiguration(
                        "recommend needs --product, --customer, or both".to_string(),
                    ),
                ));
            }
        };
        if exclude_owned {
            query = query.excluding_owned();
        }
        query = query.with_top_n(top_n_or_default(engine, top_n));

        let results = engine.recommend(&query)?;
        Ok((format!("{} hybrid recommendations ({})", results.len(), engine.config().strategy), results))
    })
}

pub fn basket(
    options: &RuntimeOptions,
    snapshot: &Path,
    products: &[String],
    customer: Option<&str>,
    top_n: Option<usize>,
) -> CommandResult {
    execute("basket", options, snapshot, |engine| {
        let mut request = BasketRequest::new(products.iter().map(String::as_str))
            .with_top_n(top_n_or_default(engine, top_n));
        if let Some(customer) = customer {
            request = request.with_customer(customer);
        }

        let results = engine.recommend_for_basket(&request)?;
        let message = format!(
            "{} recommendations for a basket of {} ({} aggregation)",
            results.len(),
            products.len(),
            engine.config().aggregation
        );
        Ok((message, results))
    })
}

pub fn explain(
    options: &RuntimeOptions,
    snapshot: &Path,
    product: &str,
    recommended: &str,
) -> CommandResult {
    execute("explain", options, snapshot, |engine| {
        let reasons = engine.explain(&ProductId::from(product), &ProductId::from(recommended))?;
        Ok((format!("why {recommended} follows {product}"), reasons))
    })
}
