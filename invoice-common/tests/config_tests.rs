//! Integration tests for config file resolution and loading
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate INVOICE_COMMON_TEST_CONFIG are marked with #[serial]
//! to ensure they run sequentially, not in parallel.

use invoice_common::config::{
    load_toml_config, write_toml_config, ConfigFileResolver, ConfigSource, LoggingConfig,
    ResolvedConfigPath,
};
use invoice_common::Error;
use serde::{Deserialize, Serialize};
use serial_test::serial;
use std::env;
use std::path::PathBuf;

const ENV_VAR: &str = "INVOICE_COMMON_TEST_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SampleConfig {
    timeout_secs: u64,
    logging: LoggingConfig,
}

impl Default for SampleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            logging: LoggingConfig::default(),
        }
    }
}

#[test]
#[serial]
fn test_env_var_used_when_no_cli_argument() {
    env::set_var(ENV_VAR, "/tmp/invoice-env-config.toml");

    let resolver = ConfigFileResolver::new("invoice-common-test", ENV_VAR);
    let resolved = resolver.resolve(None).unwrap();

    assert_eq!(resolved.source, ConfigSource::Environment);
    assert_eq!(resolved.path, PathBuf::from("/tmp/invoice-env-config.toml"));

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_cli_argument_overrides_env_var() {
    env::set_var(ENV_VAR, "/tmp/from-env.toml");

    let resolver = ConfigFileResolver::new("invoice-common-test", ENV_VAR);
    let cli = PathBuf::from("/tmp/from-cli.toml");
    let resolved = resolver.resolve(Some(&cli)).unwrap();

    assert_eq!(resolved.source, ConfigSource::CommandLine);
    assert_eq!(resolved.path, cli);

    env::remove_var(ENV_VAR);
}

#[test]
#[serial]
fn test_blank_env_var_is_ignored() {
    env::set_var(ENV_VAR, "   ");

    let resolver = ConfigFileResolver::new("invoice-common-test-no-such-app", ENV_VAR);
    let resolved = resolver.resolve(None);

    // No platform file exists for this made-up app name
    assert!(resolved.is_none());

    env::remove_var(ENV_VAR);
}

#[test]
fn test_missing_resolution_yields_defaults() {
    let config: SampleConfig = load_toml_config(None).unwrap();
    assert_eq!(config, SampleConfig::default());
}

#[test]
fn test_explicit_missing_file_is_error() {
    let resolved = ResolvedConfigPath {
        path: PathBuf::from("/nonexistent/invoice/config.toml"),
        source: ConfigSource::CommandLine,
    };
    let result: Result<SampleConfig, Error> = load_toml_config(Some(&resolved));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_partial_file_keeps_defaults_for_missing_keys() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

    let resolved = ResolvedConfigPath {
        path,
        source: ConfigSource::CommandLine,
    };
    let config: SampleConfig = load_toml_config(Some(&resolved)).unwrap();

    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.timeout_secs, 300);
}

#[test]
fn test_write_then_load_preserves_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let config = SampleConfig {
        timeout_secs: 120,
        logging: LoggingConfig {
            level: "warn".to_string(),
            file: Some(PathBuf::from("/var/log/invoice.log")),
        },
    };
    write_toml_config(&config, &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("toml.tmp").exists());

    let resolved = ResolvedConfigPath {
        path,
        source: ConfigSource::CommandLine,
    };
    let loaded: SampleConfig = load_toml_config(Some(&resolved)).unwrap();
    assert_eq!(loaded, config);
}
