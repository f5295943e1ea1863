use thiserror::Error;

use crate::config::ConfigError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no transactions to build matrices from")]
    EmptyDataset,
    #[error("unknown product `{product_id}`")]
    UnknownProduct { product_id: String },
    #[error("unknown customer `{customer_id}`")]
    UnknownCustomer { customer_id: String },
    #[error("basket must contain at least one product")]
    EmptyBasket,
    #[error("invalid engine configuration: {0}")]
    InvalidConfiguration(String),
}

impl EngineError {
    pub fn unknown_product(product_id: impl Into<String>) -> Self {
        Self::UnknownProduct { product_id: product_id.into() }
    }

    pub fn unknown_customer(customer_id: impl Into<String>) -> Self {
        Self::UnknownCustomer { customer_id: customer_id.into() }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::EmptyDataset => "empty_dataset",
            Self::UnknownProduct { .. } => "unknown_product",
            Self::UnknownCustomer { .. } => "unknown_customer",
            Self::EmptyBasket => "empty_basket",
            Self::InvalidConfiguration(_) => "invalid_configuration",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("dataset failure: {0}")]
    Dataset(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Engine(error) => error.error_class(),
            Self::Configuration(_) => "config_validation",
            Self::Dataset(_) => "dataset",
        }
    }

    /// Process exit code used by operator tooling.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Configuration(_) => 2,
            Self::Dataset(_) => 3,
            Self::Engine(EngineError::InvalidConfiguration(_)) => 2,
            Self::Engine(_) => 4,
        }
    }
}
