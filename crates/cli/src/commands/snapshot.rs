//! Snapshot files: an already-clean JSON document of transactions plus catalog.

use std::fs;
use std::path::Path;

use anyhow::Context;
use freshcart_core::{
    ApplicationError, CatalogEntry, EngineConfig, ProductCatalog, RecommendationEngine, Transaction,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Snapshot {
    pub transactions: Vec<Transaction>,
    #[serde(default)]
    pub catalog: Vec<CatalogEntry>,
}

impl Snapshot {
    pub fn into_engine(self, config: EngineConfig) -> Result<RecommendationEngine, ApplicationError> {
        let catalog = ProductCatalog::new(self.catalog);
        Ok(RecommendationEngine::build(self.transactions, catalog, config)?)
    }
}

pub fn load(path: &Path) -> Result<Snapshot, ApplicationError> {
    read(path).map_err(|error| ApplicationError::Dataset(format!("{error:#}")))
}

fn read(path: &Path) -> anyhow::Result<Snapshot> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read snapshot `{}`", path.display()))?;
    let snapshot = serde_json::from_str::<Snapshot>(&raw)
        .with_context(|| format!("could not parse snapshot `{}`", path.display()))?;

    tracing::debug!(
        event_name = "cli.snapshot.loaded",
        path = %path.display(),
        transactions = snapshot.transactions.len(),
        catalog_entries = snapshot.catalog.len(),
        "snapshot file loaded"
    );
    Ok(snapshot)
}
