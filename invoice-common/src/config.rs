//! Configuration file resolution, loading and write-back
//!
//! Config file resolution priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. OS-dependent config directory (`<config dir>/<app>/config.toml`)
//! 4. Built-in defaults (no file at all)
//!
//! A path named explicitly by the command line or the environment must exist.
//! A missing platform default file is not an error: callers fall back to
//! built-in defaults with a warning.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where a config file path came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine,
    Environment,
    PlatformDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine => write!(f, "command line"),
            ConfigSource::Environment => write!(f, "environment"),
            ConfigSource::PlatformDefault => write!(f, "platform default"),
        }
    }
}

/// A resolved config file location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfigPath {
    pub path: PathBuf,
    pub source: ConfigSource,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Resolves the config file for one application
pub struct ConfigFileResolver {
    app_name: String,
    env_var: String,
}

impl ConfigFileResolver {
    /// Create resolver for `app_name`, consulting `env_var` for an override path
    pub fn new(app_name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            env_var: env_var.into(),
        }
    }

    /// Platform config file path (`~/.config/<app>/config.toml` on Linux)
    pub fn platform_default(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(&self.app_name).join("config.toml"))
    }

    /// Resolve the config file path by priority
    ///
    /// Returns `None` when nothing was requested and no platform file exists.
    pub fn resolve(&self, cli_arg: Option<&Path>) -> Option<ResolvedConfigPath> {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return Some(ResolvedConfigPath {
                path: path.to_path_buf(),
                source: ConfigSource::CommandLine,
            });
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var) {
            if !path.trim().is_empty() {
                return Some(ResolvedConfigPath {
                    path: PathBuf::from(path),
                    source: ConfigSource::Environment,
                });
            }
        }

        // Priority 3: OS-dependent config directory
        self.platform_default()
            .filter(|p| p.exists())
            .map(|path| ResolvedConfigPath {
                path,
                source: ConfigSource::PlatformDefault,
            })
    }
}

/// Load a TOML config, falling back to `T::default()` when no file was resolved
pub fn load_toml_config<T>(resolved: Option<&ResolvedConfigPath>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(resolved) = resolved else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !resolved.path.exists() {
        return Err(Error::Config(format!(
            "Config file from {} not found: {}",
            resolved.source,
            resolved.path.display()
        )));
    }

    let content = std::fs::read_to_string(&resolved.path)?;
    let config = parse_toml_config(&content).map_err(|e| match e {
        Error::Config(msg) => Error::Config(format!("{}: {}", resolved.path.display(), msg)),
        other => other,
    })?;

    info!(
        path = %resolved.path.display(),
        source = %resolved.source,
        "Loaded config file"
    );
    Ok(config)
}

/// Parse TOML text into a config structure
pub fn parse_toml_config<T: DeserializeOwned>(content: &str) -> Result<T> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write config as TOML
///
/// Writes to a sibling temporary file first, then renames over the target.
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), "Config written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_config_default_level() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert!(logging.file.is_none());
    }

    #[test]
    fn test_logging_config_partial_toml() {
        let logging: LoggingConfig = parse_toml_config("file = \"/tmp/x.log\"").unwrap();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.file, Some(PathBuf::from("/tmp/x.log")));
    }

    #[test]
    fn test_parse_invalid_toml_is_config_error() {
        let result: Result<LoggingConfig> = parse_toml_config("level = [");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_cli_argument_wins() {
        let resolver = ConfigFileResolver::new("invoice-test", "INVOICE_COMMON_UNIT_UNSET");
        let resolved = resolver.resolve(Some(Path::new("/tmp/cli.toml"))).unwrap();
        assert_eq!(resolved.source, ConfigSource::CommandLine);
        assert_eq!(resolved.path, PathBuf::from("/tmp/cli.toml"));
    }
}
