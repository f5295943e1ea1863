use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::EngineError;
use crate::matrix::InteractionMode;
use crate::recommend::{AggregationMode, ScoringWeights, Strategy, DEFAULT_TOP_N};
use crate::similarity::FeatureSource;

/// Components kept by the collaborative filter unless configured otherwise.
pub const DEFAULT_RANK: usize = 15;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

/// Every tunable input of one engine snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EngineConfig {
    pub feature_source: FeatureSource,
    pub interaction_mode: InteractionMode,
    pub rank: usize,
    pub strategy: Strategy,
    /// Overrides the strategy preset when present.
    pub weights: Option<ScoringWeights>,
    pub aggregation: AggregationMode,
    pub category_filter: Option<String>,
    pub top_n: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub feature_source: Option<FeatureSource>,
    pub interaction_mode: Option<InteractionMode>,
    pub rank: Option<usize>,
    pub strategy: Option<Strategy>,
    pub weights: Option<ScoringWeights>,
    pub aggregation: Option<AggregationMode>,
    pub category_filter: Option<String>,
    pub top_n: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feature_source: FeatureSource::default(),
            interaction_mode: InteractionMode::default(),
            rank: DEFAULT_RANK,
            strategy: Strategy::default(),
            weights: None,
            aggregation: AggregationMode::default(),
            category_filter: None,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl EngineConfig {
    pub fn effective_weights(&self) -> ScoringWeights {
        self.weights.unwrap_or_else(|| self.strategy.weights())
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.rank == 0 {
            return Err(EngineError::InvalidConfiguration(
                "engine.rank must be greater than zero".to_string(),
            ));
        }
        if self.top_n == 0 {
            return Err(EngineError::InvalidConfiguration(
                "engine.top_n must be greater than zero".to_string(),
            ));
        }
        if let Some(category) = &self.category_filter {
            if category.trim().is_empty() {
                return Err(EngineError::InvalidConfiguration(
                    "engine.category_filter must not be blank".to_string(),
                ));
            }
        }
        self.effective_weights().validate()
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for FeatureSource {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "interaction" => Ok(Self::Interaction),
            "cooccurrence" | "co_occurrence" => Ok(Self::Cooccurrence),
            other => Err(ConfigError::Validation(format!(
                "unsupported feature source `{other}` (expected interaction|cooccurrence)"
            ))),
        }
    }
}

impl std::str::FromStr for InteractionMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "binary" => Ok(Self::Binary),
            "frequency" => Ok(Self::Frequency),
            other => Err(ConfigError::Validation(format!(
                "unsupported interaction mode `{other}` (expected binary|frequency)"
            ))),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "similarity" => Ok(Self::Similarity),
            "cooccurrence" | "co_occurrence" => Ok(Self::Cooccurrence),
            "collaborative" => Ok(Self::Collaborative),
            other => Err(ConfigError::Validation(format!(
                "unsupported strategy `{other}` (expected hybrid|similarity|cooccurrence|collaborative)"
            ))),
        }
    }
}

impl std::str::FromStr for AggregationMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "max" => Ok(Self::Max),
            other => Err(ConfigError::Validation(format!(
                "unsupported aggregation mode `{other}` (expected sum|max)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("freshcart.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(feature_source) = engine.feature_source {
                self.engine.feature_source = feature_source;
            }
            if let Some(interaction_mode) = engine.interaction_mode {
                self.engine.interaction_mode = interaction_mode;
            }
            if let Some(rank) = engine.rank {
                self.engine.rank = rank;
            }
            if let Some(strategy) = engine.strategy {
                self.engine.strategy = strategy;
            }
            if let Some(weights) = engine.weights {
                let base = self.engine.effective_weights();
                self.engine.weights = Some(ScoringWeights {
                    cooccurrence: weights.cooccurrence.unwrap_or(base.cooccurrence),
                    content: weights.content.unwrap_or(base.content),
                    collaborative: weights.collaborative.unwrap_or(base.collaborative),
                });
            }
            if let Some(aggregation) = engine.aggregation {
                self.engine.aggregation = aggregation;
            }
            if let Some(category_filter) = engine.category_filter {
                self.engine.category_filter = Some(category_filter);
            }
            if let Some(top_n) = engine.top_n {
                self.engine.top_n = top_n;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FRESHCART_ENGINE_FEATURE_SOURCE") {
            self.engine.feature_source = value.parse()?;
        }
        if let Some(value) = read_env("FRESHCART_ENGINE_INTERACTION_MODE") {
            self.engine.interaction_mode = value.parse()?;
        }
        if let Some(value) = read_env("FRESHCART_ENGINE_RANK") {
            self.engine.rank = parse_usize("FRESHCART_ENGINE_RANK", &value)?;
        }
        if let Some(value) = read_env("FRESHCART_ENGINE_STRATEGY") {
            self.select_strategy(value.parse()?);
        }

        let weight_vars = [
            "FRESHCART_ENGINE_WEIGHTS_COOCCURRENCE",
            "FRESHCART_ENGINE_WEIGHTS_CONTENT",
            "FRESHCART_ENGINE_WEIGHTS_COLLABORATIVE",
        ];
        let [cooccurrence, content, collaborative] = weight_vars
            .map(|key| read_env(key).map(|value| parse_f64(key, &value)).transpose());
        let (cooccurrence, content, collaborative) = (cooccurrence?, content?, collaborative?);
        if cooccurrence.is_some() || content.is_some() || collaborative.is_some() {
            let base = self.engine.effective_weights();
            self.engine.weights = Some(ScoringWeights {
                cooccurrence: cooccurrence.unwrap_or(base.cooccurrence),
                content: content.unwrap_or(base.content),
                collaborative: collaborative.unwrap_or(base.collaborative),
            });
        }

        if let Some(value) = read_env("FRESHCART_ENGINE_AGGREGATION") {
            self.engine.aggregation = value.parse()?;
        }
        if let Some(value) = read_env("FRESHCART_ENGINE_CATEGORY_FILTER") {
            self.engine.category_filter = Some(value);
        }
        if let Some(value) = read_env("FRESHCART_ENGINE_TOP_N") {
            self.engine.top_n = parse_usize("FRESHCART_ENGINE_TOP_N", &value)?;
        }

        let log_level =
            read_env("FRESHCART_LOGGING_LEVEL").or_else(|| read_env("FRESHCART_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("FRESHCART_LOGGING_FORMAT").or_else(|| read_env("FRESHCART_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(feature_source) = overrides.feature_source {
            self.engine.feature_source = feature_source;
        }
        if let Some(interaction_mode) = overrides.interaction_mode {
            self.engine.interaction_mode = interaction_mode;
        }
        if let Some(rank) = overrides.rank {
            self.engine.rank = rank;
        }
        if let Some(strategy) = overrides.strategy {
            self.select_strategy(strategy);
        }
        if let Some(weights) = overrides.weights {
            self.engine.weights = Some(weights);
        }
        if let Some(aggregation) = overrides.aggregation {
            self.engine.aggregation = aggregation;
        }
        if let Some(category_filter) = overrides.category_filter {
            self.engine.category_filter = Some(category_filter);
        }
        if let Some(top_n) = overrides.top_n {
            self.engine.top_n = top_n;
        }
    }

    /// A strategy chosen at a later layer discards weights from earlier layers.
    fn select_strategy(&mut self, strategy: Strategy) {
        self.engine.strategy = strategy;
        self.engine.weights = None;
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate().map_err(|error| match error {
            EngineError::InvalidConfiguration(message) => ConfigError::Validation(message),
            other => ConfigError::Validation(other.to_string()),
        })?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("freshcart.toml"), PathBuf::from("config/freshcart.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.trim().parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EnginePatch {
    feature_source: Option<FeatureSource>,
    interaction_mode: Option<InteractionMode>,
    rank: Option<usize>,
    strategy: Option<Strategy>,
    weights: Option<WeightsPatch>,
    aggregation: Option<AggregationMode>,
    category_filter: Option<String>,
    top_n: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeightsPatch {
    cooccurrence: Option<f64>,
    content: Option<f64>,
    collaborative: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
