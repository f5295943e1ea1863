use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use freshcart_core::config::AppConfig;
use serde::Serialize;
use toml::Value;

use super::{CommandResult, RuntimeOptions};

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the layer each value came from.
pub fn run(options: &RuntimeOptions) -> CommandResult {
    let config = match options.load_config() {
        Ok(config) => config,
        Err(error) => return CommandResult::from_error("config", &error),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let attribution = Attribution {
        flags: flag_keys(options),
        doc: load_config_file_doc(config_file_path.as_deref()),
        path: config_file_path,
    };

    let weights = config.engine.effective_weights();
    let entries = vec![
        ConfigEntry {
            key: "engine.feature_source",
            value: format!("{:?}", config.engine.feature_source).to_ascii_lowercase(),
            source: attribution.source("engine.feature_source", &["FRESHCART_ENGINE_FEATURE_SOURCE"]),
        },
        ConfigEntry {
            key: "engine.interaction_mode",
            value: format!("{:?}", config.engine.interaction_mode).to_ascii_lowercase(),
            source: attribution.source("engine.interaction_mode", &["FRESHCART_ENGINE_INTERACTION_MODE"]),
        },
        ConfigEntry {
            key: "engine.rank",
            value: config.engine.rank.to_string(),
            source: attribution.source("engine.rank", &["FRESHCART_ENGINE_RANK"]),
        },
        ConfigEntry {
            key: "engine.strategy",
            value: config.engine.strategy.to_string(),
            source: attribution.source("engine.strategy", &["FRESHCART_ENGINE_STRATEGY"]),
        },
        ConfigEntry {
            key: "engine.weights.cooccurrence",
            value: weights.cooccurrence.to_string(),
            source: attribution.weight_source(&config, "cooccurrence"),
        },
        ConfigEntry {
            key: "engine.weights.content",
            value: weights.content.to_string(),
            source: attribution.weight_source(&config, "content"),
        },
        ConfigEntry {
            key: "engine.weights.collaborative",
            value: weights.collaborative.to_string(),
            source: attribution.weight_source(&config, "collaborative"),
        },
        ConfigEntry {
            key: "engine.aggregation",
            value: config.engine.aggregation.to_string(),
            source: attribution.source("engine.aggregation", &["FRESHCART_ENGINE_AGGREGATION"]),
        },
        ConfigEntry {
            key: "engine.category_filter",
            value: config.engine.category_filter.clone().unwrap_or_else(|| "<unset>".to_string()),
            source: attribution.source("engine.category_filter", &["FRESHCART_ENGINE_CATEGORY_FILTER"]),
        },
        ConfigEntry {
            key: "engine.top_n",
            value: config.engine.top_n.to_string(),
            source: attribution.source("engine.top_n", &["FRESHCART_ENGINE_TOP_N"]),
        },
        ConfigEntry {
            key: "logging.level",
            value: config.logging.level.clone(),
            source: attribution.source("logging.level", &["FRESHCART_LOGGING_LEVEL", "FRESHCART_LOG_LEVEL"]),
        },
        ConfigEntry {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            source: attribution.source("logging.format", &["FRESHCART_LOGGING_FORMAT", "FRESHCART_LOG_FORMAT"]),
        },
    ];

    CommandResult::success_with_data(
        "config",
        "effective config (source precedence: flag > env > file > default)",
        entries,
    )
}

struct Attribution {
    flags: Vec<&'static str>,
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl Attribution {
    fn source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if self.flags.iter().any(|flag| *flag == key_path) {
            return "flag".to_string();
        }
        field_source(key_path, env_keys, self.doc.as_ref(), self.path.as_deref())
    }

    /// Weights without an explicit override come from the strategy preset.
    fn weight_source(&self, config: &AppConfig, weight: &str) -> String {
        if config.engine.weights.is_none() {
            return format!("preset ({})", config.engine.strategy);
        }
        let key_path = format!("engine.weights.{weight}");
        let env_key = format!("FRESHCART_ENGINE_WEIGHTS_{}", weight.to_ascii_uppercase());
        self.source(&key_path, &[env_key.as_str()])
    }
}

fn flag_keys(options: &RuntimeOptions) -> Vec<&'static str> {
    let overrides = &options.overrides;
    let mut keys = Vec::new();
    let mut mark = |set: bool, key: &'static str| {
        if set {
            keys.push(key);
        }
    };
    mark(overrides.feature_source.is_some(), "engine.feature_source");
    mark(overrides.interaction_mode.is_some(), "engine.interaction_mode");
    mark(overrides.rank.is_some(), "engine.rank");
    mark(overrides.strategy.is_some(), "engine.strategy");
    mark(overrides.weights.is_some(), "engine.weights.cooccurrence");
    mark(overrides.weights.is_some(), "engine.weights.content");
    mark(overrides.weights.is_some(), "engine.weights.collaborative");
    mark(overrides.aggregation.is_some(), "engine.aggregation");
    mark(overrides.category_filter.is_some(), "engine.category_filter");
    mark(overrides.top_n.is_some(), "engine.top_n");
    mark(overrides.log_level.is_some(), "logging.level");
    mark(overrides.log_format.is_some(), "logging.format");
    keys
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    let root = PathBuf::from("freshcart.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/freshcart.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}
