//! Settings for the `latchkey` binary, loaded from a TOML file.
//!
//! ```toml
//! [device]
//! id = "esp-device-1"
//!
//! [mqtt]
//! host = "broker.local"
//!
//! [reader]
//! secret = "FFFFFFFFFFFF"
//! ```
//!
//! Only `device.id` is required.

use std::path::{Path, PathBuf};
use std::time::Duration;

use latchkey_controller::ControllerConfig;
use latchkey_core::constants::{
    DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_MQTT_PORT,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECONNECT_DELAY_MS, DEFAULT_SECTOR_BLOCK,
    DEFAULT_SERVICE_INTERVAL_MS,
};
use latchkey_core::{DeviceId, Error, Result, SectorKey};
use latchkey_hardware::ActuatorTiming;
use latchkey_network::{MqttConfig, SupervisorConfig};
use latchkey_storage::DatabaseConfig;
use serde::Deserialize;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub device: DeviceConfig,
    #[serde(default)]
    pub mqtt: MqttSettings,
    #[serde(default)]
    pub reader: ReaderSettings,
    #[serde(default)]
    pub actuator: ActuatorTiming,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    /// Identifier used for topics and as the MQTT client id.
    pub id: DeviceId,
}

/// Broker connection.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttSettings {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_service_interval")]
    pub service_interval_ms: u64,
}

/// Credential reader.
#[derive(Debug, Clone, Deserialize)]
pub struct ReaderSettings {
    /// Data block holding the access key.
    #[serde(default = "default_sector_block")]
    pub sector_block: u8,
    /// Mifare key A as 12 hex characters.
    #[serde(default = "default_secret")]
    pub secret: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

/// Credential store persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    /// SQLite database file.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format ("pretty" or "json").
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_mqtt_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mqtt_port() -> u16 {
    DEFAULT_MQTT_PORT
}

fn default_keep_alive() -> u16 {
    DEFAULT_KEEP_ALIVE_SECS
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_MS
}

fn default_service_interval() -> u64 {
    DEFAULT_SERVICE_INTERVAL_MS
}

fn default_sector_block() -> u8 {
    DEFAULT_SECTOR_BLOCK
}

fn default_secret() -> String {
    "FFFFFFFFFFFF".to_string()
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Sqlite
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("latchkey.db")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_ms: default_connect_timeout(),
            reconnect_delay_ms: default_reconnect_delay(),
            service_interval_ms: default_service_interval(),
        }
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            sector_block: default_sector_block(),
            secret: default_secret(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Settings {
    /// Load settings from a TOML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    /// Parse and validate settings from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Valid levels: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["pretty", "json"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log format '{}'. Valid formats: {:?}",
                self.logging.format, valid_formats
            )));
        }

        if self.mqtt.host.trim().is_empty() {
            return Err(Error::Config("mqtt.host must not be empty".to_string()));
        }

        if self.mqtt.port == 0 {
            return Err(Error::Config("mqtt.port must not be 0".to_string()));
        }

        // Sector trailers hold keys, not data
        if self.reader.sector_block % 4 == 3 {
            return Err(Error::Config(format!(
                "reader.sector_block {} is a sector trailer",
                self.reader.sector_block
            )));
        }

        self.sector_key()?;

        if self.mqtt.service_interval_ms == 0 || self.reader.poll_interval_ms == 0 {
            return Err(Error::Config(
                "service_interval_ms and poll_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// The deployment secret.
    pub fn sector_key(&self) -> Result<SectorKey> {
        self.reader.secret.parse()
    }

    pub fn controller_config(&self) -> Result<ControllerConfig> {
        Ok(ControllerConfig {
            sector_block: self.reader.sector_block,
            secret: self.sector_key()?,
            poll_interval: Duration::from_millis(self.reader.poll_interval_ms),
        })
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        MqttConfig {
            host: self.mqtt.host.clone(),
            port: self.mqtt.port,
            keep_alive: Duration::from_secs(u64::from(self.mqtt.keep_alive_secs)),
            connect_timeout: Duration::from_millis(self.mqtt.connect_timeout_ms),
        }
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            reconnect_delay: Duration::from_millis(self.mqtt.reconnect_delay_ms),
            service_interval: Duration::from_millis(self.mqtt.service_interval_ms),
            ..Default::default()
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.storage.path.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let settings = Settings::from_toml("[device]\nid = \"esp-device-1\"\n").unwrap();

        assert_eq!(settings.device.id.as_str(), "esp-device-1");
        assert_eq!(settings.mqtt.port, 1883);
        assert_eq!(settings.mqtt.keep_alive_secs, 60);
        assert_eq!(settings.reader.sector_block, 4);
        assert_eq!(settings.sector_key().unwrap(), SectorKey::default());
        assert_eq!(settings.actuator, ActuatorTiming::default());
        assert_eq!(settings.storage.backend, StorageBackend::Sqlite);
        assert_eq!(settings.logging.level, "info");

        let supervisor = settings.supervisor_config();
        assert_eq!(supervisor.reconnect_delay, Duration::from_secs(5));
        assert_eq!(supervisor.service_interval, Duration::from_millis(10));
    }

    #[test]
    fn test_full_config() {
        let content = r#"
            [device]
            id = "front-door"

            [mqtt]
            host = "broker.local"
            port = 8883
            reconnect_delay_ms = 2000

            [reader]
            sector_block = 8
            secret = "a0a1a2a3a4a5"
            poll_interval_ms = 100

            [actuator]
            deny_pulse_ms = 500

            [storage]
            backend = "memory"

            [logging]
            level = "debug"
            format = "json"
        "#;
        let settings = Settings::from_toml(content).unwrap();

        assert_eq!(settings.mqtt_config().address(), "broker.local:8883");
        assert_eq!(settings.actuator.deny_pulse_ms, 500);
        assert_eq!(settings.actuator.unlock_pulse_count, 3);
        assert_eq!(settings.storage.backend, StorageBackend::Memory);

        let controller = settings.controller_config().unwrap();
        assert_eq!(controller.sector_block, 8);
        assert_eq!(
            controller.secret,
            SectorKey::new([0xA0, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5])
        );
        assert_eq!(controller.poll_interval, Duration::from_millis(100));
    }

    #[rstest]
    #[case::missing_device("[mqtt]\nport = 1883\n")]
    #[case::bad_device_id("[device]\nid = \"a/b\"\n")]
    #[case::bad_level("[device]\nid = \"d\"\n[logging]\nlevel = \"loud\"\n")]
    #[case::bad_format("[device]\nid = \"d\"\n[logging]\nformat = \"xml\"\n")]
    #[case::short_secret("[device]\nid = \"d\"\n[reader]\nsecret = \"FFFF\"\n")]
    #[case::trailer_block("[device]\nid = \"d\"\n[reader]\nsector_block = 7\n")]
    #[case::bad_backend("[device]\nid = \"d\"\n[storage]\nbackend = \"redis\"\n")]
    #[case::zero_port("[device]\nid = \"d\"\n[mqtt]\nport = 0\n")]
    fn test_invalid_config(#[case] content: &str) {
        assert!(Settings::from_toml(content).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[device]\nid = \"lab-door\"").unwrap();

        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.device.id.as_str(), "lab-door");
    }

    #[test]
    fn test_load_missing_file() {
        let error = Settings::load("/nonexistent/latchkey.toml").unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn test_controller_config_redacts_secret() {
        let settings = Settings::from_toml("[device]\nid = \"d\"\n").unwrap();
        let controller = settings.controller_config().unwrap();
        assert!(format!("{controller:?}").contains("SectorKey(..)"));
    }
}
