//! Configuration structs with defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Upper bound on `reconnect.backoff_multiplier`.
pub const MAX_BACKOFF_MULTIPLIER: f64 = 10.0;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Gateway connection settings.
    pub connection: ConnectionConfig,
    /// Liveness probing.
    pub heartbeat: HeartbeatConfig,
    /// Automatic reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Outbound send throttling.
    pub rate_limit: RateLimitConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Gateway connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Gateway host, used when the session does not name one.
    pub host: String,
    /// Gateway port.
    pub port: u16,
    /// Connect with `wss://`.
    pub use_ssl: bool,
    /// Preferred language sent on connect.
    pub lang: String,
    /// Mark the user online on connect.
    pub create_status: bool,
    /// Handshake deadline in milliseconds.
    pub connect_timeout_ms: u64,
    /// Default request deadline in milliseconds.
    pub send_timeout_ms: u64,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Time between probes in milliseconds.
    pub interval_ms: u64,
    /// How long a probe may wait for its answer, in milliseconds.
    pub timeout_ms: u64,
    /// Failed probes in a row before the connection is dropped.
    pub max_consecutive_failures: u32,
}

/// Reconnect backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first attempt in milliseconds.
    pub initial_delay_ms: u64,
    /// Growth factor applied after each failed attempt.
    pub backoff_multiplier: f64,
    /// Upper bound on the delay in milliseconds.
    pub max_delay_ms: u64,
    /// Random spread applied to each delay, as a fraction (0.25 = ±25%).
    pub jitter: f64,
    /// Give up after this many attempts. `None` retries forever.
    pub max_attempts: Option<u32>,
}

/// Send rate limit.
///
/// Up to `capacity` sends may go out back to back; the bucket then refills
/// one token every `refill_interval_ms / capacity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket size.
    pub capacity: u32,
    /// Time to refill an empty bucket, in milliseconds.
    pub refill_interval_ms: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter override (e.g., "debug", "info,mezon_realtime=trace").
    pub log_level: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "gw.mezon.ai".to_string(),
            port: 443,
            use_ssl: true,
            lang: "en".to_string(),
            create_status: true,
            connect_timeout_ms: 30_000,
            send_timeout_ms: 10_000,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            timeout_ms: 10_000,
            max_consecutive_failures: 1,
        }
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: 0.25,
            max_attempts: None,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5,
            refill_interval_ms: 1_000,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Per-user config directory, e.g. `~/.config/mezon` on Linux.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join("mezon"))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let config = Self::read(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join(CONFIG_FILE);
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Re-read the file: returns `Some(new_config)` if it changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = Self::read(&config_dir.join(CONFIG_FILE))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field,
                reason: reason.to_string(),
            }
        }

        if self.connection.host.trim().is_empty() {
            return Err(invalid("connection.host", "must not be empty"));
        }
        if self.connection.port == 0 {
            return Err(invalid("connection.port", "must be non-zero"));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(invalid("connection.connect_timeout_ms", "must be positive"));
        }
        if self.connection.send_timeout_ms == 0 {
            return Err(invalid("connection.send_timeout_ms", "must be positive"));
        }
        if self.heartbeat.interval_ms == 0 || self.heartbeat.timeout_ms == 0 {
            return Err(invalid("heartbeat", "interval and timeout must be positive"));
        }
        if self.heartbeat.max_consecutive_failures == 0 {
            return Err(invalid("heartbeat.max_consecutive_failures", "must be at least 1"));
        }
        if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&self.reconnect.backoff_multiplier) {
            return Err(invalid(
                "reconnect.backoff_multiplier",
                "must be in [1.0, 10.0]",
            ));
        }
        if self.reconnect.max_delay_ms < self.reconnect.initial_delay_ms {
            return Err(invalid(
                "reconnect.max_delay_ms",
                "must not be below initial_delay_ms",
            ));
        }
        if !(0.0..1.0).contains(&self.reconnect.jitter) {
            return Err(invalid("reconnect.jitter", "must be in [0.0, 1.0)"));
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.refill_interval_ms == 0 {
            return Err(invalid("rate_limit", "capacity and refill interval must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("host: \"gw.mezon.ai\""));
        assert!(ron_str.contains("port: 443"));
        assert!(ron_str.contains("max_attempts: None"));
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.reconnect.max_attempts = Some(8);
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(connection: (host: \"localhost\", port: 7350, use_ssl: false))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.connection.host, "localhost");
        assert_eq!(config.connection.lang, "en");
        assert_eq!(config.heartbeat, HeartbeatConfig::default());
        assert_eq!(config.rate_limit, RateLimitConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.connection.host = "10.0.0.1".to_string();
        config.connection.use_ssl = false;
        config.rate_limit.capacity = 20;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.heartbeat.interval_ms = 5_000;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().heartbeat.interval_ms, 5_000);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_out_of_range_values_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "(rate_limit: (capacity: 0))").unwrap();
        let result = Config::load_or_create(dir.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "rate_limit",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_checks_backoff() {
        let mut config = Config::default();
        config.reconnect.jitter = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.reconnect.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_backoff_multiplier() {
        for multiplier in [0.5, f64::INFINITY, f64::NAN, 1e300, MAX_BACKOFF_MULTIPLIER + 0.1] {
            let mut config = Config::default();
            config.reconnect.backoff_multiplier = multiplier;
            assert!(
                matches!(
                    config.validate(),
                    Err(ConfigError::InvalidValue {
                        field: "reconnect.backoff_multiplier",
                        ..
                    })
                ),
                "{multiplier} accepted"
            );
        }

        let mut config = Config::default();
        config.reconnect.backoff_multiplier = MAX_BACKOFF_MULTIPLIER;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_huge_multiplier_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "(reconnect: (backoff_multiplier: 1e300))",
        )
        .unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::InvalidValue {
                field: "reconnect.backoff_multiplier",
                ..
            })
        ));
    }

    #[test]
    fn test_ron_comments_accepted() {
        let ron_str = "// This is a comment\n(\n  // Another comment\n)";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config, Config::default());
    }
}
