use serde::{Deserialize, Serialize};

use super::product::ProductId;

/// Weighted contribution of each signal to a blended score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBreakdown {
    pub cooccurrence: f64,
    pub content: f64,
    pub collaborative: f64,
}

impl SignalBreakdown {
    pub fn total(&self) -> f64 {
        self.cooccurrence + self.content + self.collaborative
    }

    pub fn add(&mut self, other: &SignalBreakdown) {
        self.cooccurrence += other.cooccurrence;
        self.content += other.content;
        self.collaborative += other.collaborative;
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub product_id: ProductId,
    pub score: f64,
    pub contributing_signals: SignalBreakdown,
}

/// Orders by score descending, then product id ascending.
pub fn rank_order(left: &Recommendation, right: &Recommendation) -> std::cmp::Ordering {
    right.score.total_cmp(&left.score).then_with(|| left.product_id.cmp(&right.product_id))
}
