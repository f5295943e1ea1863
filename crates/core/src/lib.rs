pub mod collaborative;
pub mod config;
pub mod domain;
pub mod errors;
pub mod matrix;
pub mod recommend;
pub mod similarity;
pub mod stats;

pub use collaborative::{CollaborativeFilter, LatentFactorModel};
pub use config::{AppConfig, ConfigError, ConfigOverrides, EngineConfig, LoadOptions, LogFormat};
pub use domain::customer::CustomerId;
pub use domain::product::{CatalogEntry, ProductCatalog, ProductId};
pub use domain::recommendation::{Recommendation, SignalBreakdown};
pub use domain::transaction::{Transaction, TransactionId};
pub use errors::{ApplicationError, EngineError, EngineResult};
pub use matrix::{CooccurrenceMatrix, InteractionMatrix, InteractionMode, ProductPair};
pub use recommend::{
    AggregationMode, BasketAggregator, BasketRequest, HybridQuery, HybridScorer,
    RecommendationEngine, ScoringWeights, Strategy,
};
pub use similarity::{ContentSimilarity, FeatureSource};
pub use stats::{CategoryCount, CustomerStats, ProductCount, ProductStats, SnapshotStats};
