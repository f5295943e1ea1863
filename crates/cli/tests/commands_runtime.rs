use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use freshcart_cli::commands::{config, query, RuntimeOptions};
use freshcart_core::Strategy;
use serde_json::{json, Value};
use tempfile::TempDir;

#[test]
fn similar_returns_neighbours_without_the_query_product() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::similar(&RuntimeOptions::default(), &snapshot, "P1", Some(3));
        assert_eq!(result.exit_code, 0, "expected successful similarity query");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "similar");
        assert_eq!(payload["status"], "ok");
        let items = payload["data"].as_array().expect("data should be an array");
        assert!(!items.is_empty());
        assert!(items.len() <= 3);
        assert!(items.iter().all(|item| item["product_id"] != "P1"));
    });
}

#[test]
fn co_purchased_ranks_the_most_frequent_partner_first() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::co_purchased(&RuntimeOptions::default(), &snapshot, "P1", None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "co-purchased");
        assert_eq!(payload["data"][0]["product_id"], "P2");
        assert_eq!(payload["data"][0]["count"], 2);
    });
}

#[test]
fn pairs_respects_the_minimum_count() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::pairs(&RuntimeOptions::default(), &snapshot, 2);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let pairs = payload["data"].as_array().expect("data should be an array");
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0]["count"], 2);
        assert_eq!(pairs[0]["first_category"], "dairy");
        assert_eq!(pairs[0]["second_category"], "bakery");
    });
}

#[test]
fn stats_reports_snapshot_totals() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::stats(&RuntimeOptions::default(), &snapshot, 2);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["snapshot"]["total_transactions"], 9);
        assert_eq!(payload["data"]["snapshot"]["basket_count"], 4);
        assert_eq!(payload["data"]["snapshot"]["unique_customers"], 3);
        let top = payload["data"]["top_products"].as_array().expect("top products");
        assert_eq!(top.len(), 2);
        assert_eq!(top[0]["product_id"], "P1");
        assert_eq!(payload["data"]["snapshot"]["top_products"][0]["rows"], 3);
        assert_eq!(payload["data"]["snapshot"]["top_categories"][0]["category"], "dairy");
        assert_eq!(payload["data"]["snapshot"]["top_categories"][0]["rows"], 5);
    });
}

#[test]
fn customer_returns_recommendations_and_look_alikes() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::customer(&RuntimeOptions::default(), &snapshot, "C1", Some(5));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "customer");
        let customers =
            payload["data"]["similar_customers"].as_array().expect("similar customers");
        assert!(customers.iter().all(|entry| entry["customer_id"] != "C1"));

        let profile = &payload["data"]["profile"];
        assert_eq!(profile["total_transactions"], 5);
        assert_eq!(profile["basket_count"], 2);
        assert_eq!(profile["shopping_days"], 2);
        let history = payload["data"]["purchase_history"].as_array().expect("history");
        assert_eq!(history.len(), 5);
        assert_eq!(history[0]["transaction_id"], "T1");
        assert_eq!(history[4]["transaction_id"], "T3");
    });
}

#[test]
fn recommend_for_unknown_customer_is_an_engine_failure() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result =
            query::recommend(&RuntimeOptions::default(), &snapshot, None, Some("C404"), false, None);
        assert_eq!(result.exit_code, 4);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "recommend");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "unknown_customer");
    });
}

#[test]
fn recommend_for_unknown_product_is_an_engine_failure() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result =
            query::recommend(&RuntimeOptions::default(), &snapshot, Some("P404"), None, false, None);
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "unknown_product");
    });
}

#[test]
fn recommend_without_context_is_rejected() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::recommend(&RuntimeOptions::default(), &snapshot, None, None, false, None);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_configuration");
    });
}

#[test]
fn recommend_with_product_and_customer_reports_signal_breakdown() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result =
            query::recommend(&RuntimeOptions::default(), &snapshot, Some("P1"), Some("C1"), true, Some(3));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let items = payload["data"].as_array().expect("data should be an array");
        for item in items {
            assert_ne!(item["product_id"], "P1");
            assert_ne!(item["product_id"], "P2", "owned products are excluded");
            assert_ne!(item["product_id"], "P4", "owned products are excluded");
            assert!(item["contributing_signals"].is_object());
        }
    });
}

#[test]
fn basket_never_recommends_products_already_in_the_basket() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());
        let basket = vec!["P1".to_string(), "P2".to_string()];

        let result = query::basket(&RuntimeOptions::default(), &snapshot, &basket, None, Some(5));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "basket");
        let items = payload["data"].as_array().expect("data should be an array");
        assert!(!items.is_empty());
        assert!(items.iter().all(|item| item["product_id"] != "P1" && item["product_id"] != "P2"));
    });
}

#[test]
fn empty_basket_is_an_engine_failure() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::basket(&RuntimeOptions::default(), &snapshot, &[], None, None);
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "empty_basket");
    });
}

#[test]
fn explain_lists_reasons_for_a_pair() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::explain(&RuntimeOptions::default(), &snapshot, "P1", "P2");
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let reasons = payload["data"].as_array().expect("reasons");
        assert_eq!(reasons[0], "Frequently bought together (2 times)");
    });
}

#[test]
fn missing_snapshot_file_is_a_dataset_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("absent.json");

        let result = query::similar(&RuntimeOptions::default(), &missing, "P1", None);
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "dataset");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("could not read snapshot"));
    });
}

#[test]
fn malformed_snapshot_is_a_dataset_failure() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"transactions": [{"transaction_id": "T1"}]}"#).expect("write");

        let result = query::stats(&RuntimeOptions::default(), &path, 5);
        assert_eq!(result.exit_code, 3);
        assert_eq!(parse_payload(&result.output)["error_class"], "dataset");
    });
}

#[test]
fn snapshot_without_transactions_is_rejected() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&json!({ "transactions": [] }));

        let result = query::stats(&RuntimeOptions::default(), &snapshot, 5);
        assert_eq!(result.exit_code, 4);
        assert_eq!(parse_payload(&result.output)["error_class"], "empty_dataset");
    });
}

#[test]
fn invalid_env_rank_is_a_config_failure() {
    with_env(&[("FRESHCART_ENGINE_RANK", "0")], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::similar(&RuntimeOptions::default(), &snapshot, "P1", None);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn explicit_config_file_must_exist() {
    with_env(&[], || {
        let dir = TempDir::new().expect("tempdir");
        let options = RuntimeOptions {
            config_path: Some(dir.path().join("missing.toml")),
            ..RuntimeOptions::default()
        };

        let result = config::run(&options);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "config_validation");
    });
}

#[test]
fn config_attributes_each_value_to_its_layer() {
    with_env(&[("FRESHCART_ENGINE_STRATEGY", "similarity")], || {
        let dir = TempDir::new().expect("tempdir");
        let config_path = dir.path().join("freshcart.toml");
        fs::write(&config_path, "[engine]\ntop_n = 2\naggregation = \"max\"\n").expect("write");

        let mut options = RuntimeOptions { config_path: Some(config_path), ..RuntimeOptions::default() };
        options.overrides.rank = Some(4);

        let result = config::run(&options);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let entries = payload["data"].as_array().expect("entries");
        let entry = |key: &str| {
            entries
                .iter()
                .find(|entry| entry["key"] == key)
                .cloned()
                .unwrap_or_else(|| panic!("missing entry {key}"))
        };

        assert_eq!(entry("engine.rank")["value"], "4");
        assert_eq!(entry("engine.rank")["source"], "flag");
        assert_eq!(entry("engine.strategy")["value"], "similarity");
        assert_eq!(entry("engine.strategy")["source"], "env (FRESHCART_ENGINE_STRATEGY)");
        assert_eq!(entry("engine.weights.content")["value"], "1");
        assert_eq!(entry("engine.weights.content")["source"], "preset (similarity)");
        assert_eq!(entry("engine.top_n")["value"], "2");
        assert!(entry("engine.top_n")["source"]
            .as_str()
            .unwrap_or_default()
            .starts_with("file ("));
        assert_eq!(entry("engine.aggregation")["value"], "max");
        assert_eq!(entry("logging.level")["source"], "default");
    });
}

#[test]
fn configured_top_n_applies_when_the_query_omits_it() {
    with_env(&[("FRESHCART_ENGINE_TOP_N", "1")], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());

        let result = query::co_purchased(&RuntimeOptions::default(), &snapshot, "P1", None);
        assert_eq!(result.exit_code, 0);
        assert_eq!(parse_payload(&result.output)["data"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn strategy_override_changes_hybrid_weights() {
    with_env(&[], || {
        let (_dir, snapshot) = write_snapshot(&grocery_snapshot());
        let mut options = RuntimeOptions::default();
        options.overrides.strategy = Some(Strategy::Cooccurrence);

        let result = query::recommend(&options, &snapshot, Some("P1"), None, false, Some(5));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert!(payload["message"].as_str().unwrap_or_default().contains("cooccurrence"));
        let items = payload["data"].as_array().expect("data should be an array");
        assert_eq!(items[0]["product_id"], "P2");
        assert_eq!(items[0]["score"], 1.0);
        for item in items {
            assert_eq!(item["contributing_signals"]["content"], 0.0);
            assert_eq!(item["contributing_signals"]["collaborative"], 0.0);
        }
    });
}

fn grocery_snapshot() -> Value {
    let line = |transaction: &str, customer: &str, product: &str, day: u32| {
        json!({
            "transaction_id": transaction,
            "customer_id": customer,
            "product_id": product,
            "timestamp": format!("2024-03-{day:02}T10:00:00Z"),
        })
    };
    json!({
        "transactions": [
            line("T1", "C1", "P1", 1),
            line("T1", "C1", "P2", 1),
            line("T2", "C2", "P1", 2),
            line("T2", "C2", "P3", 2),
            line("T3", "C1", "P1", 3),
            line("T3", "C1", "P2", 3),
            line("T3", "C1", "P4", 3),
            line("T4", "C3", "P3", 4),
            line("T4", "C3", "P4", 4),
        ],
        "catalog": [
            { "product_id": "P1", "name": "Whole Milk", "category": "dairy" },
            { "product_id": "P2", "name": "Sourdough", "category": "bakery" },
            { "product_id": "P3", "name": "Cheddar", "category": "dairy" },
            { "product_id": "P4", "name": "Bananas", "category": "produce" },
        ],
    })
}

fn write_snapshot(document: &Value) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("tempdir");
    let path = dir.path().join("snapshot.json");
    write_json(&path, document);
    (dir, path)
}

fn write_json(path: &Path, document: &Value) {
    let raw = serde_json::to_string_pretty(document).expect("snapshot serializes");
    fs::write(path, raw).expect("snapshot written");
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "FRESHCART_ENGINE_FEATURE_SOURCE",
        "FRESHCART_ENGINE_INTERACTION_MODE",
        "FRESHCART_ENGINE_RANK",
        "FRESHCART_ENGINE_STRATEGY",
        "FRESHCART_ENGINE_WEIGHTS_COOCCURRENCE",
        "FRESHCART_ENGINE_WEIGHTS_CONTENT",
        "FRESHCART_ENGINE_WEIGHTS_COLLABORATIVE",
        "FRESHCART_ENGINE_AGGREGATION",
        "FRESHCART_ENGINE_CATEGORY_FILTER",
        "FRESHCART_ENGINE_TOP_N",
        "FRESHCART_LOGGING_LEVEL",
        "FRESHCART_LOGGING_FORMAT",
        "FRESHCART_LOG_LEVEL",
        "FRESHCART_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
