//! Hybrid scoring: blends co-occurrence, content similarity and collaborative
//! affinity into one ranked list.
//!
//! Each signal is clamped at zero and max-normalized over the candidate set of
//! the query before weighting, so a signal with no data for a candidate simply
//! contributes nothing.

use std::collections::BTreeSet;
use std::fmt;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::types::HybridQuery;
use super::EXPLANATION_SIMILARITY_THRESHOLD;
use crate::collaborative::CollaborativeFilter;
use crate::domain::customer::CustomerId;
use crate::domain::product::{ProductCatalog, ProductId};
use crate::domain::recommendation::{rank_order, Recommendation, SignalBreakdown};
use crate::errors::{EngineError, EngineResult};
use crate::matrix::{CooccurrenceMatrix, InteractionMatrix};
use crate::similarity::ContentSimilarity;

/// Weights for the three blended signals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Weight for basket co-occurrence (hybrid default: 0.40)
    pub cooccurrence: f64,
    /// Weight for content similarity (hybrid default: 0.30)
    pub content: f64,
    /// Weight for collaborative affinity (hybrid default: 0.30)
    pub collaborative: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        super::DEFAULT_WEIGHTS
    }
}

impl ScoringWeights {
    pub fn new(cooccurrence: f64, content: f64, collaborative: f64) -> Self {
        Self { cooccurrence, content, collaborative }
    }

    /// Every weight must be finite and non-negative, and at least one positive.
    pub fn validate(&self) -> EngineResult<()> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::InvalidConfiguration(format!(
                    "engine.weights.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.named().iter().all(|(_, value)| *value == 0.0) {
            return Err(EngineError::InvalidConfiguration(
                "engine.weights must not all be zero".to_owned(),
            ));
        }
        Ok(())
    }

    fn named(&self) -> [(&'static str, f64); 3] {
        [
            ("cooccurrence", self.cooccurrence),
            ("content", self.content),
            ("collaborative", self.collaborative),
        ]
    }

    fn apply(&self, normalized: SignalBreakdown) -> SignalBreakdown {
        SignalBreakdown {
            cooccurrence: normalized.cooccurrence * self.cooccurrence,
            content: normalized.content * self.content,
            collaborative: normalized.collaborative * self.collaborative,
        }
    }
}

/// Named weight presets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    #[default]
    Hybrid,
    Similarity,
    Cooccurrence,
    Collaborative,
}

impl Strategy {
    pub fn weights(&self) -> ScoringWeights {
        match self {
            Self::Hybrid => super::DEFAULT_WEIGHTS,
            Self::Similarity => ScoringWeights::new(0.0, 1.0, 0.0),
            Self::Cooccurrence => ScoringWeights::new(1.0, 0.0, 0.0),
            Self::Collaborative => ScoringWeights::new(0.0, 0.0, 1.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Similarity => "similarity",
            Self::Cooccurrence => "cooccurrence",
            Self::Collaborative => "collaborative",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores candidates for one snapshot. Borrowing only; cheap to construct per query.
#[derive(Debug, Clone, Copy)]
pub struct HybridScorer<'a> {
    catalog: &'a ProductCatalog,
    interactions: &'a InteractionMatrix,
    cooccurrence: &'a CooccurrenceMatrix,
    content: &'a ContentSimilarity,
    collaborative: Option<&'a CollaborativeFilter>,
    weights: ScoringWeights,
}

impl<'a> HybridScorer<'a> {
    pub fn new(
        catalog: &'a ProductCatalog,
        interactions: &'a InteractionMatrix,
        cooccurrence: &'a CooccurrenceMatrix,
        content: &'a ContentSimilarity,
        weights: ScoringWeights,
    ) -> EngineResult<Self> {
        weights.validate()?;
        Ok(Self { catalog, interactions, cooccurrence, content, collaborative: None, weights })
    }

    /// Without a filter the collaborative signal is always zero.
    pub fn with_collaborative(mut self, filter: &'a CollaborativeFilter) -> Self {
        self.collaborative = Some(filter);
        self
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    pub fn product_position(&self, product_id: &ProductId) -> EngineResult<usize> {
        self.interactions.product_position(product_id)
    }

    /// Ranked recommendations truncated to `query.top_n`.
    pub fn score(&self, query: &HybridQuery) -> EngineResult<Vec<Recommendation>> {
        let mut ranked = self.rank_all(query)?;
        ranked.truncate(query.top_n);
        Ok(ranked)
    }

    /// Every candidate with a positive blended score, fully ordered.
    pub fn rank_all(&self, query: &HybridQuery) -> EngineResult<Vec<Recommendation>> {
        if query.seed_product.is_none() && query.customer_id.is_none() {
            return Err(EngineError::InvalidConfiguration(
                "a query needs a seed product or a customer".to_owned(),
            ));
        }

        let seed = query
            .seed_product
            .as_ref()
            .map(|product_id| self.product_position(product_id))
            .transpose()?;

        let customer = match &query.customer_id {
            Some(customer_id) => match self.interactions.customer_position(customer_id) {
                Ok(_) => Some(customer_id),
                Err(error) if seed.is_none() => return Err(error),
                Err(_) => {
                    tracing::debug!(
                        event_name = "engine.scorer.customer_signal_skipped",
                        customer_id = %customer_id,
                        "unknown customer contributes no collaborative signal"
                    );
                    None
                }
            },
            None => None,
        };

        let candidates = self.candidates(query, seed, customer)?;
        let affinities = match (customer, self.collaborative) {
            (Some(customer_id), Some(filter)) if self.weights.collaborative > 0.0 => {
                Some(filter.predicted_affinities(customer_id)?)
            }
            _ => None,
        };

        let raw: Vec<SignalBreakdown> = candidates
            .iter()
            .map(|&candidate| self.raw_signals(seed, affinities.as_ref(), candidate))
            .collect();
        let peak = raw.iter().fold(SignalBreakdown::default(), |peak, signals| SignalBreakdown {
            cooccurrence: peak.cooccurrence.max(signals.cooccurrence),
            content: peak.content.max(signals.content),
            collaborative: peak.collaborative.max(signals.collaborative),
        });

        let mut ranked: Vec<Recommendation> = candidates
            .iter()
            .zip(raw)
            .filter_map(|(&candidate, signals)| {
                let contributing_signals = self.weights.apply(SignalBreakdown {
                    cooccurrence: normalize(signals.cooccurrence, peak.cooccurrence),
                    content: normalize(signals.content, peak.content),
                    collaborative: normalize(signals.collaborative, peak.collaborative),
                });
                let score = contributing_signals.total();
                if score <= 0.0 {
                    return None;
                }
                self.interactions.products().key(candidate).map(|product_id| Recommendation {
                    product_id: product_id.clone(),
                    score,
                    contributing_signals,
                })
            })
            .collect();

        ranked.sort_by(rank_order);
        Ok(ranked)
    }

    fn candidates(
        &self,
        query: &HybridQuery,
        seed: Option<usize>,
        customer: Option<&CustomerId>,
    ) -> EngineResult<Vec<usize>> {
        let owned: BTreeSet<&ProductId> = match customer {
            Some(customer_id) if query.exclude_owned => {
                self.interactions.interacted_products(customer_id)?.into_iter().collect()
            }
            _ => BTreeSet::new(),
        };
        let in_category: Option<BTreeSet<&ProductId>> =
            query.category.as_deref().map(|category| self.catalog.in_category(category).collect());

        Ok(self
            .interactions
            .products()
            .keys()
            .iter()
            .enumerate()
            .filter(|(position, _)| Some(*position) != seed)
            .filter(|(_, product_id)| {
                !owned.contains(product_id) && !query.exclude.contains(*product_id)
            })
            .filter(|(_, product_id)| {
                in_category.as_ref().map_or(true, |allowed| allowed.contains(product_id))
            })
            .map(|(position, _)| position)
            .collect())
    }

    fn raw_signals(
        &self,
        seed: Option<usize>,
        affinities: Option<&Array1<f64>>,
        candidate: usize,
    ) -> SignalBreakdown {
        let (cooccurrence, content) = match seed {
            Some(seed) => (
                f64::from(self.cooccurrence.counts()[[seed, candidate]]),
                self.content.similarities()[[seed, candidate]],
            ),
            None => (0.0, 0.0),
        };
        SignalBreakdown {
            cooccurrence: cooccurrence.max(0.0),
            content: content.max(0.0),
            collaborative: affinities.map_or(0.0, |row| row[candidate].max(0.0)),
        }
    }

    /// Human-readable reasons `recommended` relates to `seed`.
    pub fn explain(&self, seed: &ProductId, recommended: &ProductId) -> EngineResult<Vec<String>> {
        let count = self.cooccurrence.count(seed, recommended)?;
        let similarity = self.content.similarity(seed, recommended)?;

        let mut reasons = Vec::new();
        if count > 0 {
            reasons.push(format!("Frequently bought together ({count} times)"));
        }
        if similarity > EXPLANATION_SIMILARITY_THRESHOLD {
            reasons.push(format!("Similar purchase patterns (similarity: {similarity:.2})"));
        }
        if let (Some(left), Some(right)) =
            (self.catalog.category_of(seed), self.catalog.category_of(recommended))
        {
            if left == right {
                reasons.push(format!("Same category: {left}"));
            }
        }
        if reasons.is_empty() {
            reasons.push("Based on general purchase history".to_owned());
        }
        Ok(reasons)
    }
}

fn normalize(value: f64, peak: f64) -> f64 {
    if peak > 0.0 {
        value / peak
    } else {
        0.0
    }
}
