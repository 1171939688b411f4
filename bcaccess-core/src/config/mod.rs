//! Configuration management for bcaccess
//!
//! Configuration comes from defaults, an optional TOML file and environment
//! overrides, in that order, and is validated before use.

use crate::access::{AccessOptions, DevBootstrap};
use crate::core_identity::keystore::KdfParams;
use crate::core_identity::validation::{validate_host, MIN_PASSWORD_LENGTH};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Host used for key export and import unless configured otherwise
pub const DEFAULT_BC_HOST: &str = "bc.aletheiaware.com";

/// Directory under `$HOME` holding client data
pub const DEFAULT_ROOT_NAME: &str = "bc";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub client: ClientConfig,
    pub access: AccessConfig,
    pub ledger: LedgerConfig,
    pub keystore: KeystoreConfig,
    pub logging: LoggingConfig,
    pub bootstrap: BootstrapConfig,
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Root directory for keys, cache and the local ledger
    pub root_dir: PathBuf,

    /// Peer addresses
    pub peers: Vec<String>,

    /// Host for key export and import
    pub bc_host: String,
}

/// Access flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub min_password_length: usize,

    /// Upper bound on waiting for the human; unset waits indefinitely
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub node_timeout: Option<Duration>,

    /// Delete a new local key when its alias registration is rejected
    pub rollback_on_registration_failure: bool,
}

/// Local ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger directory; defaults to `<root_dir>/ledger`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    /// Leading zero bits required by alias registration
    pub difficulty_bits: u32,
}

/// Key store encryption cost
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeystoreConfig {
    pub memory_kib: u32,
    pub iterations: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,
}

/// Development bootstrap
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    /// Pre-fill the access dialog from `ALIAS`/`PASSWORD`. Never enable in production.
    pub allow_env_credentials: bool,
}

/// `$HOME/bc`, or `./bc` when no home directory is known
pub fn default_root_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_ROOT_NAME)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            peers: vec![],
            bc_host: DEFAULT_BC_HOST.to_string(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            min_password_length: MIN_PASSWORD_LENGTH,
            node_timeout: None,
            rollback_on_registration_failure: false,
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: None,
            difficulty_bits: 16,
        }
    }
}

impl Default for KeystoreConfig {
    fn default() -> Self {
        let kdf = KdfParams::default();
        Self {
            memory_kib: kdf.memory_kib,
            iterations: kdf.iterations,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ConfigError::InvalidValue(format!("Invalid {}: {}", key, e)))
}

/// Durations use the same human-readable form as the config file ("5m", "1h 30m")
fn parse_duration(key: &str, value: &str) -> Result<Duration, ConfigError> {
    use serde::de::value::{Error as ValueError, StrDeserializer};
    use serde::de::IntoDeserializer;

    let deserializer: StrDeserializer<'_, ValueError> = value.trim().into_deserializer();
    humantime_serde::deserialize(deserializer)
        .map_err(|e: ValueError| ConfigError::InvalidValue(format!("Invalid {}: {}", key, e)))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: BCACCESS_<SECTION>_<KEY>
    /// Example: BCACCESS_CLIENT_ROOT_DIR=/var/lib/bc
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `BCACCESS_*` overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Client config
        if let Some(root) = lookup("BCACCESS_CLIENT_ROOT_DIR") {
            self.client.root_dir = PathBuf::from(root);
        }
        if let Some(peers) = lookup("BCACCESS_CLIENT_PEERS") {
            self.client.peers = peers
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
        }
        if let Some(host) = lookup("BCACCESS_CLIENT_BC_HOST") {
            self.client.bc_host = host;
        }

        // Access config
        if let Some(min) = lookup("BCACCESS_ACCESS_MIN_PASSWORD_LENGTH") {
            self.access.min_password_length = parse("min password length", &min)?;
        }
        if let Some(timeout) = lookup("BCACCESS_ACCESS_NODE_TIMEOUT") {
            self.access.node_timeout = Some(parse_duration("node timeout", &timeout)?);
        }
        if let Some(rollback) = lookup("BCACCESS_ACCESS_ROLLBACK_ON_REGISTRATION_FAILURE") {
            self.access.rollback_on_registration_failure = parse("rollback flag", &rollback)?;
        }

        // Ledger config
        if let Some(dir) = lookup("BCACCESS_LEDGER_DIR") {
            self.ledger.dir = Some(PathBuf::from(dir));
        }
        if let Some(bits) = lookup("BCACCESS_LEDGER_DIFFICULTY_BITS") {
            self.ledger.difficulty_bits = parse("difficulty bits", &bits)?;
        }

        // Keystore config
        if let Some(memory) = lookup("BCACCESS_KEYSTORE_MEMORY_KIB") {
            self.keystore.memory_kib = parse("keystore memory", &memory)?;
        }
        if let Some(iterations) = lookup("BCACCESS_KEYSTORE_ITERATIONS") {
            self.keystore.iterations = parse("keystore iterations", &iterations)?;
        }

        // Logging config
        if let Some(level) = lookup("BCACCESS_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("BCACCESS_LOG_JSON") {
            self.logging.json_format = parse("JSON flag", &json)?;
        }

        // Bootstrap config
        if let Some(allow) = lookup("BCACCESS_BOOTSTRAP_ALLOW_ENV_CREDENTIALS") {
            self.bootstrap.allow_env_credentials = parse("bootstrap flag", &allow)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "root_dir must not be empty".to_string(),
            ));
        }

        validate_host(&self.client.bc_host).map_err(|e| {
            ConfigError::ValidationFailed(format!("Invalid bc_host: {}", e))
        })?;

        if self.access.min_password_length == 0 {
            return Err(ConfigError::ValidationFailed(
                "min_password_length must be greater than 0".to_string(),
            ));
        }

        if self.access.node_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::ValidationFailed(
                "node_timeout must be greater than 0".to_string(),
            ));
        }

        if self.ledger.difficulty_bits > 32 {
            return Err(ConfigError::ValidationFailed(
                "difficulty_bits must be at most 32".to_string(),
            ));
        }

        self.kdf()
            .validate()
            .map_err(|e| ConfigError::ValidationFailed(format!("Invalid keystore cost: {}", e)))?;

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }

    pub fn kdf(&self) -> KdfParams {
        KdfParams {
            memory_kib: self.keystore.memory_kib,
            iterations: self.keystore.iterations,
        }
    }

    pub fn ledger_dir(&self, root: &Path) -> PathBuf {
        self.ledger
            .dir
            .clone()
            .unwrap_or_else(|| root.join("ledger"))
    }

    /// Orchestrator options; reads the environment only if the bootstrap allows it
    pub fn access_options(&self) -> AccessOptions {
        AccessOptions {
            node_timeout: self.access.node_timeout,
            default_host: self.client.bc_host.clone(),
            bootstrap: DevBootstrap::load(self.bootstrap.allow_env_credentials),
        }
    }
}
