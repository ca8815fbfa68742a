#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Manifest policy tests for the SCUM admin client.
//!
//! These tests verify that Cargo.toml keeps the agreed lint levels and feature
//! layout. If any test fails, the manifest has drifted from project policy.

use std::path::PathBuf;

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Parses the project's Cargo.toml.
fn manifest() -> toml::Table {
    let path = project_root().join("Cargo.toml");
    let contents = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()));
    toml::from_str(&contents).expect("Cargo.toml is valid TOML")
}

fn string_list(value: &toml::Value) -> Vec<&str> {
    value
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v.as_str().expect("string"))
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: panic_policy
// ─────────────────────────────────────────────────────────────────────────────

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_has_all_panic_free_lints() {
        let manifest = manifest();
        let clippy = manifest["lints"]["clippy"]
            .as_table()
            .expect("Cargo.toml is missing a [lints.clippy] section");

        for lint in REQUIRED_DENY_LINTS {
            assert_eq!(
                clippy.get(*lint).and_then(toml::Value::as_str),
                Some("deny"),
                "Cargo.toml must set `{lint} = \"deny\"` in [lints.clippy] to keep \
                 library code panic-free."
            );
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_layout
// ─────────────────────────────────────────────────────────────────────────────

mod feature_layout {
    use super::*;

    #[test]
    fn http_transport_is_on_by_default() {
        let manifest = manifest();
        let default = string_list(&manifest["features"]["default"]);
        assert!(
            default.contains(&"transport-http"),
            "the default feature set must include `transport-http`"
        );
    }

    #[test]
    fn reqwest_is_only_pulled_in_by_the_http_feature() {
        let manifest = manifest();
        assert_eq!(
            manifest["dependencies"]["reqwest"]["optional"].as_bool(),
            Some(true),
            "reqwest must stay optional so the core builds without an HTTP stack"
        );
        let http = string_list(&manifest["features"]["transport-http"]);
        assert!(http.contains(&"dep:reqwest"));
    }

    #[test]
    fn cli_binary_requires_cli_feature() {
        let manifest = manifest();
        let bins = manifest["bin"].as_array().expect("[[bin]] entries");
        let cli = bins
            .iter()
            .find(|b| b["name"].as_str() == Some("scum-admin"))
            .expect("scum-admin binary is declared");
        assert_eq!(string_list(&cli["required-features"]), vec!["cli"]);

        let features = string_list(&manifest["features"]["cli"]);
        for required in ["transport-http", "dep:clap", "dep:tracing-subscriber"] {
            assert!(
                features.contains(&required),
                "the `cli` feature must enable `{required}`"
            );
        }
    }

    #[test]
    fn paused_time_tests_have_tokio_test_util() {
        let manifest = manifest();
        let features = string_list(&manifest["dev-dependencies"]["tokio"]["features"]);
        assert!(
            features.contains(&"test-util"),
            "dev-dependency tokio needs `test-util` for `start_paused` tests"
        );
    }

    #[test]
    fn log_subscriber_is_only_a_cli_dependency() {
        let manifest = manifest();
        assert!(
            manifest["dev-dependencies"].get("tracing-subscriber").is_none(),
            "no test installs a subscriber; keep `tracing-subscriber` behind `cli`"
        );
        assert_eq!(
            manifest["dependencies"]["tracing-subscriber"]["optional"].as_bool(),
            Some(true)
        );
    }
}
