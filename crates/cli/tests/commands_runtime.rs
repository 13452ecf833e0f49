use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use storefront_cli::commands::{config, doctor, migrate, seed};

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("STOREFRONT_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied pending migrations");
    });
}

#[test]
fn config_validate_reports_ok_with_default_settings() {
    with_env(&[], || {
        let result = config::validate();
        assert_eq!(result.exit_code, 0, "expected defaults to validate");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config validate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn config_validate_rejects_a_malformed_port() {
    with_env(&[("STOREFRONT_SERVER_PORT", "spinning-rust")], || {
        let result = config::validate();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "config validate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn config_show_attributes_sources_for_overridden_and_default_fields() {
    with_env(&[("STOREFRONT_DATABASE_URL", "sqlite::memory:")], || {
        let output = config::show();

        assert!(output.starts_with("effective config (source precedence: env > file > default):"));
        assert!(
            output.contains("- database.url = sqlite::memory: (source: env (STOREFRONT_DATABASE_URL))"),
            "database.url should be attributed to the environment:\n{output}"
        );
        assert!(
            output.contains("- server.port = 8080 (source: default)"),
            "untouched fields should read as defaults:\n{output}"
        );
        assert!(output.contains("- pricing.tax_rate = 0.10 (source: default)"));
    });
}

#[test]
fn seed_loads_the_demo_dataset_with_a_deterministic_summary() {
    with_env(&[("STOREFRONT_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "expected seed success on an empty database");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");

        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.starts_with("demo dataset loaded: 9 products and 2 accounts:"));
        assert!(message.contains("  - prod-demo-laptop: ELEC-1001 (Aurora 14 Laptop)"));
        assert!(message.contains("  - prod-demo-headphones: ELEC-1002 (Drift Wireless Headphones)"));
        assert!(message.contains("  - prod-demo-poster: HOME-4003 (Retired Print)"));
    });
}

#[test]
fn seed_guard_refuses_a_populated_database_without_force() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let db_path = dir.path().join("storefront-seed.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());

    with_env(&[("STOREFRONT_DATABASE_URL", url.as_str())], || {
        let first = seed::run(false);
        assert_eq!(first.exit_code, 0, "expected first seed run to load fixtures");

        let second = seed::run(false);
        assert_eq!(second.exit_code, 6, "expected the guard to refuse a populated database");
        let payload = parse_payload(&second.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "seed_guard");
        let message = payload["message"].as_str().unwrap_or("");
        assert!(message.contains("pass --force"), "guard message should name the opt-out");

        let forced = seed::run(true);
        assert_eq!(forced.exit_code, 0, "expected --force to bypass the guard");
        let forced_payload = parse_payload(&forced.output);
        assert_eq!(forced_payload["status"], "ok");
    });
}

#[test]
fn doctor_tracks_migration_state_on_a_file_database() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let db_path = dir.path().join("storefront-doctor.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());

    with_env(&[("STOREFRONT_DATABASE_URL", url.as_str())], || {
        let before = doctor::run(false);
        assert!(before.starts_with("doctor: one or more readiness checks failed"));
        assert!(before.contains("- [ok] database_connectivity:"));
        assert!(before.contains("- [fail] migrations_current: pending migrations: 1"));

        let migrate_result = migrate::run();
        assert_eq!(migrate_result.exit_code, 0, "expected migrate to succeed");

        let after = doctor::run(true);
        let report: Value =
            serde_json::from_str(&after).expect("doctor --json should emit valid JSON");
        assert_eq!(report["overall_status"], "pass");

        let names: Vec<&str> = report["checks"]
            .as_array()
            .expect("checks should be an array")
            .iter()
            .filter_map(|check| check["name"].as_str())
            .collect();
        assert_eq!(
            names,
            ["config_validation", "database_connectivity", "migrations_current", "write_round_trip"]
        );
    });
}

#[test]
fn doctor_skips_database_checks_when_config_is_invalid() {
    with_env(&[("STOREFRONT_SERVER_PORT", "spinning-rust")], || {
        let output = doctor::run(false);
        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation:"));
        assert!(output.contains("- [skip] database_connectivity: skipped because configuration did not load"));
        assert!(output.contains("- [skip] migrations_current:"));
        assert!(output.contains("- [skip] write_round_trip:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STOREFRONT_DATABASE_URL",
        "STOREFRONT_DATABASE_MAX_CONNECTIONS",
        "STOREFRONT_DATABASE_TIMEOUT_SECS",
        "STOREFRONT_SERVER_BIND_ADDRESS",
        "STOREFRONT_SERVER_PORT",
        "STOREFRONT_AUTH_TOKEN_TTL_HOURS",
        "STOREFRONT_PRICING_TAX_RATE",
        "STOREFRONT_PRICING_FREE_SHIPPING_THRESHOLD",
        "STOREFRONT_PRICING_FLAT_SHIPPING_FEE",
        "STOREFRONT_LOGGING_LEVEL",
        "STOREFRONT_LOGGING_FORMAT",
        "STOREFRONT_LOG_LEVEL",
        "STOREFRONT_LOG_FORMAT",
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
