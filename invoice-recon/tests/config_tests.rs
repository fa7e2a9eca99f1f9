// Configuration Integration Tests
//
// Environment-dependent tests run under #[serial] since they mutate
// GOOGLE_AI_API_KEY and INVOICE_RECON_CONFIG.

use invoice_common::config::write_toml_config;
use invoice_recon::config::{resolve_model_api_key, API_KEY_ENV_VAR, CONFIG_ENV_VAR};
use invoice_recon::extractors::ModelConfig;
use invoice_recon::fusion::TieBreak;
use invoice_recon::AppConfig;
use serial_test::serial;
use std::env;

fn model_with_key(key: Option<&str>) -> ModelConfig {
    ModelConfig {
        api_key: key.map(str::to_string),
        ..ModelConfig::default()
    }
}

// ================================================================================================
// API key resolution
// ================================================================================================

#[test]
#[serial]
fn test_api_key_env_overrides_toml() {
    env::set_var(API_KEY_ENV_VAR, "env-key");
    let key = resolve_model_api_key(&model_with_key(Some("toml-key")));
    env::remove_var(API_KEY_ENV_VAR);

    assert_eq!(key, Some("env-key".to_string()));
}

#[test]
#[serial]
fn test_api_key_from_toml_when_env_unset() {
    env::remove_var(API_KEY_ENV_VAR);
    let key = resolve_model_api_key(&model_with_key(Some("toml-key")));
    assert_eq!(key, Some("toml-key".to_string()));
}

#[test]
#[serial]
fn test_blank_env_key_ignored() {
    env::set_var(API_KEY_ENV_VAR, "   ");
    let key = resolve_model_api_key(&model_with_key(Some("toml-key")));
    env::remove_var(API_KEY_ENV_VAR);

    assert_eq!(key, Some("toml-key".to_string()));
}

#[test]
#[serial]
fn test_no_key_anywhere() {
    env::remove_var(API_KEY_ENV_VAR);
    assert_eq!(resolve_model_api_key(&model_with_key(None)), None);
    assert_eq!(resolve_model_api_key(&model_with_key(Some(""))), None);
}

// ================================================================================================
// Config file resolution
// ================================================================================================

#[test]
#[serial]
fn test_load_from_env_var_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("invoice-recon.toml");
    std::fs::write(
        &path,
        r#"
[reconcile]
tie_break = "pattern"

[pipeline]
batch_concurrency = 2
"#,
    )
    .unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = AppConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);

    let config = config.unwrap();
    assert_eq!(config.reconcile.tie_break, TieBreak::Pattern);
    assert_eq!(config.pipeline.batch_concurrency, 2);
    assert_eq!(config.pipeline.document_timeout_secs, 300);
}

#[test]
#[serial]
fn test_cli_path_overrides_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let cli_path = dir.path().join("cli.toml");
    std::fs::write(&cli_path, "[anomaly]\nconflict_severity = 0.5\n").unwrap();

    env::set_var(CONFIG_ENV_VAR, dir.path().join("missing.toml"));
    let config = AppConfig::load(Some(&cli_path));
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.unwrap().anomaly.conflict_severity, 0.5);
}

#[test]
#[serial]
fn test_missing_env_config_file_is_error() {
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/invoice-recon.toml");
    let result = AppConfig::load(None);
    env::remove_var(CONFIG_ENV_VAR);

    assert!(result.is_err());
}

#[test]
fn test_written_default_config_loads_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    write_toml_config(&AppConfig::default(), &path).unwrap();
    let loaded = AppConfig::load(Some(&path)).unwrap();

    assert_eq!(loaded, AppConfig::default());
    assert!(loaded.validate().is_empty());
}

#[test]
fn test_invalid_values_reported_by_validate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[reconcile]
fields = ["vendor", "purchase_order"]
high_agreement_threshold = 1.5

[pipeline]
batch_concurrency = 0
"#,
    )
    .unwrap();

    let issues = AppConfig::load(Some(&path)).unwrap().validate();
    assert_eq!(issues.len(), 3, "{:?}", issues);
}
