//! Basket completion: runs the hybrid scorer once per seed and merges the results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::scoring::HybridScorer;
use super::types::{BasketRequest, HybridQuery};
use crate::domain::product::ProductId;
use crate::domain::recommendation::{rank_order, Recommendation, SignalBreakdown};
use crate::errors::{EngineError, EngineResult};

/// How per-seed scores for the same candidate are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationMode {
    #[default]
    Sum,
    Max,
}

impl AggregationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Max => "max",
        }
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BasketAggregator<'a> {
    scorer: HybridScorer<'a>,
    mode: AggregationMode,
}

impl<'a> BasketAggregator<'a> {
    pub fn new(scorer: HybridScorer<'a>, mode: AggregationMode) -> Self {
        Self { scorer, mode }
    }

    pub fn mode(&self) -> AggregationMode {
        self.mode
    }

    pub fn recommend(&self, request: &BasketRequest) -> EngineResult<Vec<Recommendation>> {
        if request.products.is_empty() {
            return Err(EngineError::EmptyBasket);
        }
        for product_id in &request.products {
            self.scorer.product_position(product_id)?;
        }

        let mut seen = BTreeSet::new();
        let seeds: Vec<&ProductId> =
            request.products.iter().filter(|product_id| seen.insert(*product_id)).collect();

        let mut merged: BTreeMap<ProductId, (f64, SignalBreakdown)> = BTreeMap::new();
        for seed in &seeds {
            let mut query = HybridQuery::for_product((*seed).clone())
                .excluding(request.products.iter().cloned());
            query.customer_id = request.customer_id.clone();
            query.category = request.category.clone();

            for item in self.scorer.rank_all(&query)? {
                self.merge(&mut merged, item);
            }
        }

        let mut ranked: Vec<Recommendation> = merged
            .into_iter()
            .filter(|(product_id, _)| !seen.contains(product_id))
            .map(|(product_id, (score, contributing_signals))| Recommendation {
                product_id,
                score,
                contributing_signals,
            })
            .collect();
        ranked.sort_by(rank_order);
        ranked.truncate(request.top_n);

        tracing::debug!(
            event_name = "engine.basket.aggregated",
            seeds = seeds.len(),
            mode = %self.mode,
            results = ranked.len(),
            "basket recommendations aggregated"
        );

        Ok(ranked)
    }

    fn merge(&self, merged: &mut BTreeMap<ProductId, (f64, SignalBreakdown)>, item: Recommendation) {
        let Recommendation { product_id, score, contributing_signals } = item;
        match merged.get_mut(&product_id) {
            None => {
                merged.insert(product_id, (score, contributing_signals));
            }
            Some((total, signals)) => match self.mode {
                AggregationMode::Sum => {
                    *total += score;
                    signals.add(&contributing_signals);
                }
                AggregationMode::Max => {
                    if score > *total {
                        *total = score;
                        *signals = contributing_signals;
                    }
                }
            },
        }
    }
}
