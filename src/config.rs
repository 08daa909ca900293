//! # Configuration Management
//!
//! Server, account and logging settings for the relay.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Environment variables via `from_env()`
//! - Direct instantiation with defaults
//!
//! The binary layers command-line flags over whichever source it loaded.

use crate::error::{ProtocolError, Result};
use crate::protocol::handshake::Credentials;
use crate::utils::crypto::{KeyMaterial, KEY_MATERIAL_LEN};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default NewCAMD listen port
pub const DEFAULT_PORT: u16 = 15050;

/// Default 14-byte DES key, hex encoded
pub const DEFAULT_DES_KEY: &str = "0102030405060708091011121314";

/// Main relay configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct CamdConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl CamdConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `NEWCAMD_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("NEWCAMD_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(username) = std::env::var("NEWCAMD_USERNAME") {
            config.account.username = username;
        }

        if let Ok(password) = std::env::var("NEWCAMD_PASSWORD") {
            config.account.password = password;
        }

        if let Ok(key) = std::env::var("NEWCAMD_DES_KEY") {
            config.account.des_key = key;
        }

        if let Ok(max) = std::env::var("NEWCAMD_MAX_CONNECTIONS") {
            config.server.max_connections = max.parse::<usize>().map_err(|e| {
                ProtocolError::ConfigError(format!("Invalid NEWCAMD_MAX_CONNECTIONS '{max}': {e}"))
            })?;
        }

        Ok(config)
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.account.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:15050")
    pub address: String,

    /// Maximum number of concurrent sessions
    pub max_connections: usize,

    /// How long shutdown waits for open sessions to finish
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: 1000,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:15050')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// The single account clients log in with
#[derive(Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub username: String,

    pub password: String,

    /// 14-byte DES key as 28 hex characters
    pub des_key: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            username: String::from("user"),
            password: String::from("pass"),
            des_key: String::from(DEFAULT_DES_KEY),
        }
    }
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl AccountConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.username.is_empty() {
            errors.push("Username cannot be empty".to_string());
        }

        if let Err(e) = self.key_material() {
            errors.push(e.to_string());
        }

        errors
    }

    /// Decode `des_key` into key material.
    ///
    /// # Errors
    /// `ConfigError` if the key is not hex or not exactly 14 bytes
    pub fn key_material(&self) -> Result<KeyMaterial> {
        let bytes = hex::decode(self.des_key.trim())
            .map_err(|e| ProtocolError::ConfigError(format!("DES key is not valid hex: {e}")))?;

        let key: [u8; KEY_MATERIAL_LEN] = bytes.as_slice().try_into().map_err(|_| {
            ProtocolError::ConfigError(format!(
                "DES key must be {KEY_MATERIAL_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;

        Ok(KeyMaterial::new(key))
    }

    /// Credentials sessions authenticate against
    pub fn credentials(&self) -> Result<Credentials> {
        Ok(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
            key: self.key_material()?,
        })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level; `RUST_LOG` takes precedence when set
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
