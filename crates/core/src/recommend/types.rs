//! Query types for the hybrid scorer and basket aggregator

use std::collections::BTreeSet;

use crate::domain::customer::CustomerId;
use crate::domain::product::ProductId;

/// Context for one hybrid scoring query: a seed product, a customer, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridQuery {
    /// Product the recommendations should relate to
    pub seed_product: Option<ProductId>,
    /// Customer whose latent preferences feed the collaborative signal
    pub customer_id: Option<CustomerId>,
    /// Products never returned
    pub exclude: BTreeSet<ProductId>,
    /// Also exclude everything the customer already bought
    pub exclude_owned: bool,
    /// Restrict candidates to one catalog category
    pub category: Option<String>,
    /// Maximum results to return
    pub top_n: usize,
}

impl HybridQuery {
    /// Query anchored on a single product
    pub fn for_product(product_id: impl Into<ProductId>) -> Self {
        Self { seed_product: Some(product_id.into()), ..Self::empty() }
    }

    /// Query anchored on a customer
    pub fn for_customer(customer_id: impl Into<CustomerId>) -> Self {
        Self { customer_id: Some(customer_id.into()), ..Self::empty() }
    }

    fn empty() -> Self {
        Self {
            seed_product: None,
            customer_id: None,
            exclude: BTreeSet::new(),
            exclude_owned: false,
            category: None,
            top_n: super::DEFAULT_TOP_N,
        }
    }

    /// Add a customer to a product query
    pub fn with_customer(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    /// Add a seed product to a customer query
    pub fn with_seed_product(mut self, product_id: impl Into<ProductId>) -> Self {
        self.seed_product = Some(product_id.into());
        self
    }

    pub fn excluding<I, P>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProductId>,
    {
        self.exclude.extend(products.into_iter().map(Into::into));
        self
    }

    pub fn excluding_owned(mut self) -> Self {
        self.exclude_owned = true;
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}

/// Request for recommendations completing a partially built basket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketRequest {
    /// Products already in the basket, in the order they were added
    pub products: Vec<ProductId>,
    /// Optional shopper for the collaborative signal
    pub customer_id: Option<CustomerId>,
    /// Restrict candidates to one category before scoring
    pub category: Option<String>,
    /// Maximum results to return
    pub top_n: usize,
}

impl BasketRequest {
    pub fn new<I, P>(products: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProductId>,
    {
        Self {
            products: products.into_iter().map(Into::into).collect(),
            customer_id: None,
            category: None,
            top_n: super::DEFAULT_TOP_N,
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<CustomerId>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}
