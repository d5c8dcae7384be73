use serde::{Deserialize, Serialize};

/// Main configuration structure for the test bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Seconds after which a discovery pass that never finished stops
    /// showing the busy indicator
    #[serde(default = "default_discovery_timeout_secs")]
    pub discovery_timeout_secs: u64,

    /// Delay before the first load after a converter is created
    #[serde(default)]
    pub initial_load_delay_ms: u64,

    /// Seconds to wait for a `started` event once the legacy run call returned
    #[serde(default = "default_run_start_timeout_secs")]
    pub run_start_timeout_secs: u64,

    /// Capacity of the per-adapter event channels
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Whether the user switched permanently to native testing
    #[serde(default)]
    pub use_native_testing: bool,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_discovery_timeout_secs() -> u64 {
    30
}

const fn default_run_start_timeout_secs() -> u64 {
    30
}

const fn default_event_channel_capacity() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: default_discovery_timeout_secs(),
            initial_load_delay_ms: 0,
            run_start_timeout_secs: default_run_start_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            use_native_testing: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn discovery_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.discovery_timeout_secs)
    }

    pub fn run_start_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.run_start_timeout_secs)
    }

    pub fn initial_load_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.initial_load_delay_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_log_rotation(),
        }
    }
}
