use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProductId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ProductId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub name: String,
    pub category: String,
}

impl CatalogEntry {
    pub fn new(
        product_id: impl Into<ProductId>,
        name: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self { product_id: product_id.into(), name: name.into(), category: category.into() }
    }
}

/// Product metadata for one snapshot. Category drives filtering only, never scoring.
#[derive(Clone, Debug, Default)]
pub struct ProductCatalog {
    entries: BTreeMap<ProductId, CatalogEntry>,
}

impl ProductCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries.into_iter().map(|entry| (entry.product_id.clone(), entry)).collect(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<&CatalogEntry> {
        self.entries.get(product_id)
    }

    pub fn category_of(&self, product_id: &ProductId) -> Option<&str> {
        self.get(product_id).map(|entry| entry.category.as_str())
    }

    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a ProductId> {
        self.entries
            .values()
            .filter(move |entry| entry.category == category)
            .map(|entry| &entry.product_id)
    }

    pub fn product_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
