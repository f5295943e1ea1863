//! Hybrid recommendations over one engine snapshot.
//!
//! The scorer blends three signals for a single context; the basket aggregator
//! drives it across several seeds; [`RecommendationEngine`] owns the matrices
//! they read.

mod basket;
mod engine;
mod scoring;
mod types;

pub use basket::{AggregationMode, BasketAggregator};
pub use engine::RecommendationEngine;
pub use scoring::{HybridScorer, ScoringWeights, Strategy};
pub use types::*;

/// Hybrid preset weights
pub const DEFAULT_WEIGHTS: ScoringWeights =
    ScoringWeights { cooccurrence: 0.40, content: 0.30, collaborative: 0.30 };

/// Maximum recommendations to return
pub const DEFAULT_TOP_N: usize = 5;

/// Similarity above which an explanation cites shared purchase patterns
pub const EXPLANATION_SIMILARITY_THRESHOLD: f64 = 0.3;
