pub mod config;
pub mod query;
pub mod snapshot;

use std::path::{Path, PathBuf};

use freshcart_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use freshcart_core::{ApplicationError, RecommendationEngine};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::success_with_data(command, message, Value::Null)
    }

    pub fn success_with_data(command: &str, message: impl Into<String>, data: impl Serialize) -> Self {
        let data = match serde_json::to_value(data) {
            Ok(Value::Null) => None,
            Ok(value) => Some(value),
            Err(error) => {
                return Self::failure(command, "serialization", error.to_string(), 1);
            }
        };
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    pub fn from_error(command: &str, error: &ApplicationError) -> Self {
        Self::failure(command, error.error_class(), error.to_string(), error.exit_code())
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Inputs shared by every command that queries a snapshot.
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    pub config_path: Option<PathBuf>,
    pub overrides: ConfigOverrides,
}

impl RuntimeOptions {
    pub fn load_config(&self) -> Result<AppConfig, ApplicationError> {
        let options = LoadOptions {
            config_path: self.config_path.clone(),
            require_file: self.config_path.is_some(),
            overrides: self.overrides.clone(),
        };
        Ok(AppConfig::load(options)?)
    }

    /// Loads configuration and the snapshot file, then builds one engine.
    pub fn build_engine(&self, snapshot_path: &Path) -> Result<RecommendationEngine, ApplicationError> {
        let config = self.load_config()?;
        let snapshot = snapshot::load(snapshot_path)?;
        snapshot.into_engine(config.engine)
    }
}
