use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project directory holding the bridge configuration.
pub const CONFIG_DIR: &str = ".test-bridge";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid discovery_timeout_secs: {0}. Must be at least 1")]
    InvalidDiscoveryTimeout(u64),

    #[error("Invalid run_start_timeout_secs: {0}. Must be at least 1")]
    InvalidRunStartTimeout(u64),

    #[error("Invalid event_channel_capacity: {0}. Must be at least 1")]
    InvalidChannelCapacity(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for the project in the current directory
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .test-bridge/config.yaml (project config)
    /// 3. .test-bridge/local.yaml (local overrides, optional)
    /// 4. Environment variables (TEST_BRIDGE_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`ConfigLoader::load`] for a project rooted at `root`
    pub fn load_from_dir(root: &Path) -> Result<Config> {
        let dir = root.join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("TEST_BRIDGE_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.discovery_timeout_secs == 0 {
            return Err(ConfigError::InvalidDiscoveryTimeout(
                config.discovery_timeout_secs,
            ));
        }

        if config.run_start_timeout_secs == 0 {
            return Err(ConfigError::InvalidRunStartTimeout(
                config.run_start_timeout_secs,
            ));
        }

        if config.event_channel_capacity == 0 {
            return Err(ConfigError::InvalidChannelCapacity(
                config.event_channel_capacity,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        Ok(())
    }

    /// Record the permanent switch to native testing in the project config
    ///
    /// Other keys of an existing config file are kept.
    pub fn persist_use_native(root: &Path, enabled: bool) -> Result<PathBuf> {
        let dir = root.join(CONFIG_DIR);
        let path = dir.join("config.yaml");

        let mut document = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_yaml::from_str::<serde_yaml::Value>(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            serde_yaml::Value::Mapping(serde_yaml::Mapping::new())
        };

        let serde_yaml::Value::Mapping(map) = &mut document else {
            anyhow::bail!("{} is not a YAML mapping", path.display());
        };
        map.insert(
            serde_yaml::Value::from("use_native_testing"),
            serde_yaml::Value::from(enabled),
        );

        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let yaml = serde_yaml::to_string(&document).context("Failed to serialize config")?;
        std::fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.discovery_timeout_secs, 30);
        assert_eq!(config.run_start_timeout_secs, 30);
        assert_eq!(config.initial_load_delay_ms, 0);
        assert_eq!(config.event_channel_capacity, 256);
        assert!(!config.use_native_testing);
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
discovery_timeout_secs: 5
initial_load_delay_ms: 250
logging:
  level: debug
  format: json
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.discovery_timeout_secs, 5);
        assert_eq!(config.initial_load_delay_ms, 250);
        assert_eq!(config.run_start_timeout_secs, 30);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "json");
        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_timeouts() {
        let config = Config {
            discovery_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidDiscoveryTimeout(0))
        ));

        let config = Config {
            run_start_timeout_secs: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRunStartTimeout(0))
        ));
    }

    #[test]
    fn test_validate_zero_capacity() {
        let config = Config {
            event_channel_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidChannelCapacity(0))
        ));
    }

    #[test]
    fn test_validate_invalid_logging() {
        let mut config = Config::default();
        config.logging.level = "loud".to_string();
        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "loud"),
            other => panic!("Expected InvalidLogLevel, got {other:?}"),
        }

        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogRotation(_))
        ));
    }

    #[test]
    fn test_hierarchical_merging() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("config.yaml"),
            "discovery_timeout_secs: 10\nlogging:\n  level: info\n  format: json\n",
        )
        .unwrap();
        std::fs::write(dir.join("local.yaml"), "logging:\n  level: debug\n").unwrap();

        let config = temp_env::with_vars_unset(
            ["TEST_BRIDGE_LOGGING__LEVEL", "TEST_BRIDGE_DISCOVERY_TIMEOUT_SECS"],
            || ConfigLoader::load_from_dir(root.path()),
        )
        .unwrap();

        assert_eq!(config.discovery_timeout_secs, 10);
        assert_eq!(config.logging.level, "debug", "local.yaml should win");
        assert_eq!(config.logging.format, "json", "base value should persist");
    }

    #[test]
    fn test_env_override() {
        let root = TempDir::new().unwrap();

        let config = temp_env::with_vars(
            [
                ("TEST_BRIDGE_DISCOVERY_TIMEOUT_SECS", Some("3")),
                ("TEST_BRIDGE_LOGGING__LEVEL", Some("warn")),
            ],
            || ConfigLoader::load_from_dir(root.path()),
        )
        .unwrap();

        assert_eq!(config.discovery_timeout_secs, 3);
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_invalid_file_rejected() {
        let root = TempDir::new().unwrap();
        let path = root.path().join("bad.yaml");
        std::fs::write(&path, "event_channel_capacity: 0\n").unwrap();

        assert!(ConfigLoader::load_from_file(&path).is_err());
    }

    #[test]
    fn test_persist_use_native_keeps_other_keys() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join(CONFIG_DIR);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("config.yaml"), "discovery_timeout_secs: 12\n").unwrap();

        let path = ConfigLoader::persist_use_native(root.path(), true).unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert!(config.use_native_testing);
        assert_eq!(config.discovery_timeout_secs, 12);
    }

    #[test]
    fn test_persist_use_native_creates_file() {
        let root = TempDir::new().unwrap();

        let path = ConfigLoader::persist_use_native(root.path(), true).unwrap();

        assert!(path.exists());
        assert!(ConfigLoader::load_from_file(&path).unwrap().use_native_testing);
    }
}
