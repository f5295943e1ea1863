pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use freshcart_core::config::{AppConfig, ConfigOverrides, LoggingConfig, LogFormat};
use freshcart_core::{
    AggregationMode, ApplicationError, FeatureSource, InteractionMode, ScoringWeights, Strategy,
};
use tracing_subscriber::EnvFilter;

use commands::{CommandResult, RuntimeOptions};

#[derive(Debug, Parser)]
#[command(
    name = "freshcart",
    about = "FreshCart recommendation engine CLI",
    long_about = "Build one recommendation snapshot from a JSON transaction file and run a single query against it.",
    after_help = "Examples:\n  freshcart similar --snapshot data.json --product P1\n  freshcart basket --snapshot data.json --product P1 --product P2 --top-n 3\n  freshcart --strategy cooccurrence recommend --snapshot data.json --product P1"
)]
pub struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Command,
}

/// Flags layered over file and environment configuration.
#[derive(Debug, Args)]
struct EngineArgs {
    #[arg(long, global = true, help = "Explicit config file (must exist)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_parser = parse_value::<Strategy>)]
    strategy: Option<Strategy>,
    #[arg(
        long,
        global = true,
        num_args = 3,
        value_names = ["COOC", "CONTENT", "CF"],
        help = "Explicit weights, overriding the strategy preset"
    )]
    weights: Option<Vec<f64>>,
    #[arg(long, global = true, help = "Latent factors kept by the collaborative filter")]
    rank: Option<usize>,
    #[arg(long, global = true, value_parser = parse_value::<FeatureSource>)]
    feature_source: Option<FeatureSource>,
    #[arg(long, global = true, value_parser = parse_value::<InteractionMode>)]
    interaction_mode: Option<InteractionMode>,
    #[arg(long, global = true, value_parser = parse_value::<AggregationMode>)]
    aggregation: Option<AggregationMode>,
    #[arg(long, global = true, help = "Restrict candidates to one catalog category")]
    category: Option<String>,
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[arg(long, global = true, value_parser = parse_value::<LogFormat>)]
    log_format: Option<LogFormat>,
}

#[derive(Debug, Args)]
struct SnapshotArg {
    #[arg(long, help = "JSON file with `transactions` and `catalog` arrays")]
    snapshot: PathBuf,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Summarize the snapshot and its most purchased products")]
    Stats {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long, default_value_t = 10)]
        top_products: usize,
    },
    #[command(about = "Products most similar to one product")]
    Similar {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long)]
        product: String,
        #[arg(long)]
        top_n: Option<usize>,
    },
    #[command(name = "co-purchased", about = "Products most often in the same basket")]
    CoPurchased {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long)]
        product: String,
        #[arg(long)]
        top_n: Option<usize>,
    },
    #[command(about = "Every product pair bought together at least --min-count times")]
    Pairs {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long, default_value_t = 2)]
        min_count: u32,
    },
    #[command(about = "Collaborative recommendations and look-alike customers")]
    Customer {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long)]
        customer: String,
        #[arg(long)]
        top_n: Option<usize>,
    },
    #[command(about = "Hybrid recommendations for a product, a customer, or both")]
    Recommend {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long)]
        product: Option<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long, help = "Skip products the customer already bought")]
        exclude_owned: bool,
        #[arg(long)]
        top_n: Option<usize>,
    },
    #[command(about = "Recommendations completing a basket")]
    Basket {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long = "product", required = true)]
        products: Vec<String>,
        #[arg(long)]
        customer: Option<String>,
        #[arg(long)]
        top_n: Option<usize>,
    },
    #[command(about = "Reasons one product is recommended after another")]
    Explain {
        #[command(flatten)]
        input: SnapshotArg,
        #[arg(long)]
        product: String,
        #[arg(long)]
        recommended: String,
    },
}

fn parse_value<T>(raw: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|error| error.to_string())
}

impl EngineArgs {
    fn into_options(self) -> RuntimeOptions {
        let weights = self.weights.and_then(|values| match values.as_slice() {
            [cooccurrence, content, collaborative] => {
                Some(ScoringWeights::new(*cooccurrence, *content, *collaborative))
            }
            _ => None,
        });
        RuntimeOptions {
            config_path: self.config,
            overrides: ConfigOverrides {
                log_level: self.log_level,
                log_format: self.log_format,
                feature_source: self.feature_source,
                interaction_mode: self.interaction_mode,
                rank: self.rank,
                strategy: self.strategy,
                weights,
                aggregation: self.aggregation,
                category_filter: self.category,
                top_n: None,
            },
        }
    }
}

/// Installs a stderr subscriber so stdout carries only the JSON payload.
///
/// `RUST_LOG` directives win over `logging.level` when they parse.
pub fn init_logging(logging: &LoggingConfig) {
    let directives = std::env::var("RUST_LOG").ok();
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(logging_filter(logging, directives.as_deref()))
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Pretty => builder.pretty().init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn logging_filter(logging: &LoggingConfig, directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(logging.level.as_str()))
}

/// Logging settings for startup. A config that fails to load still gets a
/// subscriber; the command itself reports the failure.
fn startup_logging(options: &RuntimeOptions) -> (LoggingConfig, Option<ApplicationError>) {
    match options.load_config() {
        Ok(config) => (config.logging, None),
        Err(error) => (AppConfig::default().logging, Some(error)),
    }
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = cli.engine.into_options();

    let (logging, load_error) = startup_logging(&options);
    init_logging(&logging);
    if let Some(error) = load_error {
        tracing::debug!(
            event_name = "cli.logging.defaults_used",
            error_class = error.error_class(),
            "config did not load, logging with defaults: {error}"
        );
    }

    let result = dispatch(cli.command, &options);

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

fn dispatch(command: Command, options: &RuntimeOptions) -> CommandResult {
    use commands::{config, query};

    match command {
        Command::Config => config::run(options),
        Command::Stats { input, top_products } => {
            query::stats(options, &input.snapshot, top_products)
        }
        Command::Similar { input, product, top_n } => {
            query::similar(options, &input.snapshot, &product, top_n)
        }
        Command::CoPurchased { input, product, top_n } => {
            query::co_purchased(options, &input.snapshot, &product, top_n)
        }
        Command::Pairs { input, min_count } => query::pairs(options, &input.snapshot, min_count),
        Command::Customer { input, customer, top_n } => {
            query::customer(options, &input.snapshot, &customer, top_n)
        }
        Command::Recommend { input, product, customer, exclude_owned, top_n } => query::recommend(
            options,
            &input.snapshot,
            product.as_deref(),
            customer.as_deref(),
            exclude_owned,
            top_n,
        ),
        Command::Basket { input, products, customer, top_n } => {
            query::basket(options, &input.snapshot, &products, customer.as_deref(), top_n)
        }
        Command::Explain { input, product, recommended } => {
            query::explain(options, &input.snapshot, &product, &recommended)
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};
    use freshcart_core::config::{LogFormat, LoggingConfig};
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::{EnvFilter, Layer, Registry};

    use super::{logging_filter, startup_logging, Cli, Command};
    use crate::commands::RuntimeOptions;

    fn max_level(filter: &EnvFilter) -> Option<LevelFilter> {
        <EnvFilter as Layer<Registry>>::max_level_hint(filter)
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_engine_flags_parse_after_the_subcommand() {
        let cli = Cli::try_parse_from([
            "freshcart",
            "basket",
            "--snapshot",
            "data.json",
            "--product",
            "P1",
            "--product",
            "P2",
            "--strategy",
            "co-occurrence",
            "--weights",
            "0.5",
            "0.5",
            "0",
        ])
        .expect("arguments parse");

        let options = cli.engine.into_options();
        assert_eq!(options.overrides.strategy, Some(freshcart_core::Strategy::Cooccurrence));
        assert_eq!(
            options.overrides.weights,
            Some(freshcart_core::ScoringWeights::new(0.5, 0.5, 0.0))
        );
        match cli.command {
            Command::Basket { products, .. } => assert_eq!(products, vec!["P1", "P2"]),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_strategy_is_rejected_by_the_parser() {
        let result = Cli::try_parse_from(["freshcart", "--strategy", "popularity", "config"]);

        assert!(result.is_err());
    }

    #[test]
    fn configured_level_applies_without_rust_log() {
        let logging = LoggingConfig { level: "warn".to_string(), format: LogFormat::Compact };

        let filter = logging_filter(&logging, None);

        assert_eq!(max_level(&filter), Some(LevelFilter::WARN));
    }

    #[test]
    fn rust_log_directives_override_the_configured_level() {
        let logging = LoggingConfig { level: "warn".to_string(), format: LogFormat::Compact };

        let filter = logging_filter(&logging, Some("freshcart_core=debug"));
        assert_eq!(max_level(&filter), Some(LevelFilter::DEBUG));

        let unparseable = logging_filter(&logging, Some("freshcart_core=loud"));
        assert_eq!(max_level(&unparseable), Some(LevelFilter::WARN));
    }

    #[test]
    fn unloadable_config_falls_back_to_default_logging_and_keeps_the_error() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let options = RuntimeOptions {
            config_path: Some(dir.path().join("missing.toml")),
            ..RuntimeOptions::default()
        };

        let (logging, error) = startup_logging(&options);

        assert_eq!(logging, freshcart_core::AppConfig::default().logging);
        let error = error.expect("missing config file is reported");
        assert_eq!(error.error_class(), "config_validation");
    }
}
