//! Server configuration module.
//!
//! Handles loading, validating, and merging the server's `config.toml`. The
//! file is optional and sparse: stock defaults are the base layer and any
//! keys in the file override them. Command-line flags override both.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [server]
//! bind = "0.0.0.0"          # Address to listen on
//! port = 12345              # TCP port
//!
//! [workers]
//! count = 4                 # Concurrent sessions (omit for auto = CPU cores)
//!
//! [protocol]
//! fragment_size = 4096      # Largest payload fragment written
//! max_field_len = 1024      # Largest accepted instruction field
//!
//! [output]
//! format = "jpeg"           # "jpeg" or "png"
//! quality = 90              # JPEG quality (1-100)
//! max_pixels = 50000000     # Largest transform output, in pixels
//!
//! [logging]
//! level = "info"            # tracing filter; RUST_LOG takes precedence
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{DEFAULT_MAX_PIXELS, EncodeParams, OutputFormat, Quality};
use crate::protocol::{DEFAULT_FRAGMENT_SIZE, DEFAULT_MAX_FIELD_LEN, Limits};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Server configuration loaded from `config.toml`.
///
/// All fields have defaults matching the reference deployment. Unknown keys
/// are rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listening address and port.
    pub server: ListenConfig,
    /// Worker pool sizing.
    pub workers: WorkersConfig,
    /// Wire framing limits.
    pub protocol: ProtocolConfig,
    /// Response encoding.
    pub output: OutputConfig,
    /// Log filter.
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "server.bind must be an IP address, got {:?}",
                self.server.bind
            )));
        }
        if self.workers.count == Some(0) {
            return Err(ConfigError::Validation(
                "workers.count must be at least 1".into(),
            ));
        }
        if self.protocol.fragment_size == 0 {
            return Err(ConfigError::Validation(
                "protocol.fragment_size must be non-zero".into(),
            ));
        }
        if self.protocol.max_field_len > u32::MAX as usize {
            return Err(ConfigError::Validation(
                "protocol.max_field_len must fit in 32 bits".into(),
            ));
        }
        if !(1..=100).contains(&self.output.quality) {
            return Err(ConfigError::Validation(
                "output.quality must be 1-100".into(),
            ));
        }
        if self.output.max_pixels == 0 {
            return Err(ConfigError::Validation(
                "output.max_pixels must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// `bind:port` string for the listener.
    pub fn listen_address(&self) -> String {
        match self.server.bind.parse::<IpAddr>() {
            Ok(IpAddr::V6(ip)) => format!("[{ip}]:{}", self.server.port),
            _ => format!("{}:{}", self.server.bind, self.server.port),
        }
    }

    pub fn limits(&self) -> Limits {
        Limits {
            fragment_size: self.protocol.fragment_size,
            max_field_len: self.protocol.max_field_len,
        }
    }

    pub fn encode_params(&self) -> EncodeParams {
        EncodeParams {
            format: self.output.format,
            quality: Quality::new(self.output.quality),
        }
    }
}

/// Listening socket settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 12345,
        }
    }
}

/// Worker pool settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkersConfig {
    /// Maximum number of sessions processed at once.
    /// When absent, defaults to the number of CPU cores.
    pub count: Option<usize>,
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolve the session worker count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use exactly `n`
///
/// Session workers spend much of their time blocked on sockets, so a count
/// above the core count is honoured.
pub fn effective_workers(config: &WorkersConfig) -> usize {
    config.count.unwrap_or_else(available_cores).max(1)
}

/// Size of the pixel-processing thread pool: the worker count, clamped to
/// the number of cores.
pub fn pixel_threads(config: &WorkersConfig) -> usize {
    effective_workers(config).min(available_cores())
}

/// Wire framing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Largest payload fragment written, in bytes.
    pub fragment_size: usize,
    /// Largest accepted length of the operation or parameter field.
    pub max_field_len: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}

/// Response encoding settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// JPEG quality (1 = worst, 100 = best). Ignored for PNG.
    pub quality: u32,
    /// Largest image a transform may produce, in pixels. Larger requests
    /// fail before any output buffer is allocated.
    pub max_pixels: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            quality: Quality::default().value(),
            max_pixels: DEFAULT_MAX_PIXELS,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, e.g. `"info"` or `"imgrelay=debug"`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(ServerConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ServerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ServerConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the server config.
///
/// With no path, returns the validated stock defaults. With a path, the file
/// must exist; its values are merged over the defaults.
pub fn load_config(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            Some(toml::from_str::<toml::Value>(&content)?)
        }
        None => None,
    };
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imgrelay Configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Listening socket
# ---------------------------------------------------------------------------
[server]
# Address to listen on. Use "127.0.0.1" to accept local clients only.
bind = "0.0.0.0"

# TCP port.
port = 12345

# ---------------------------------------------------------------------------
# Worker pool
# ---------------------------------------------------------------------------
[workers]
# Maximum number of sessions processed at the same time. Further connections
# wait in a FIFO queue. Omit to use the number of CPU cores. A configured
# value is used as given, even above the core count.
# count = 4

# ---------------------------------------------------------------------------
# Wire protocol
# ---------------------------------------------------------------------------
[protocol]
# Largest payload fragment written back to clients, in bytes.
fragment_size = 4096

# Largest operation or parameter accepted in an instruction, in bytes.
# Longer fields end the session before anything is allocated.
max_field_len = 1024

# ---------------------------------------------------------------------------
# Response encoding
# ---------------------------------------------------------------------------
[output]
# "jpeg" or "png".
format = "jpeg"

# JPEG quality (1 = worst, 100 = best). Ignored for PNG.
quality = 90

# Largest image a transform may produce, in pixels. A resize past this limit
# fails the session instead of allocating the output.
max_pixels = 50000000

# ---------------------------------------------------------------------------
# Logging
# ---------------------------------------------------------------------------
[logging]
# Default log filter. The RUST_LOG environment variable overrides it.
level = "info"
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_matches_reference_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.server.port, 12345);
        assert_eq!(config.workers.count, None);
        assert_eq!(config.protocol.fragment_size, 4096);
        assert_eq!(config.protocol.max_field_len, 1024);
        assert_eq!(config.output.format, OutputFormat::Jpeg);
        assert_eq!(config.output.quality, 90);
        assert_eq!(config.output.max_pixels, 50_000_000);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn parse_partial_config() {
        let config: ServerConfig = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.protocol.fragment_size, 4096);
    }

    #[test]
    fn listen_address_formats() {
        let mut config = ServerConfig::default();
        assert_eq!(config.listen_address(), "0.0.0.0:12345");
        config.server.bind = "::1".into();
        config.server.port = 80;
        assert_eq!(config.listen_address(), "[::1]:80");
    }

    #[test]
    fn limits_and_encoding_follow_config() {
        let mut config = ServerConfig::default();
        config.protocol.fragment_size = 512;
        config.output.format = OutputFormat::Png;
        config.output.quality = 75;
        assert_eq!(config.limits().fragment_size, 512);
        assert_eq!(config.limits().max_field_len, 1024);
        let encode = config.encode_params();
        assert_eq!(encode.format, OutputFormat::Png);
        assert_eq!(encode.quality.value(), 75);
    }

    // =========================================================================
    // effective_workers
    // =========================================================================

    #[test]
    fn effective_workers_auto() {
        let cores = available_cores();
        assert_eq!(effective_workers(&WorkersConfig { count: None }), cores);
    }

    #[test]
    fn effective_workers_honours_count_above_cores() {
        let config = WorkersConfig {
            count: Some(available_cores() + 100),
        };
        assert_eq!(effective_workers(&config), available_cores() + 100);
    }

    #[test]
    fn effective_workers_user_constrains_down() {
        assert_eq!(effective_workers(&WorkersConfig { count: Some(1) }), 1);
    }

    #[test]
    fn pixel_threads_clamped_to_cores() {
        let cores = available_cores();
        let config = WorkersConfig {
            count: Some(cores + 100),
        };
        assert_eq!(pixel_threads(&config), cores);
        assert_eq!(pixel_threads(&WorkersConfig { count: Some(1) }), 1);
    }

    // =========================================================================
    // merge_toml
    // =========================================================================

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str("a = 1\nb = 2").unwrap();
        let overlay: toml::Value = toml::from_str("b = 3").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["a"].as_integer(), Some(1));
        assert_eq!(merged["b"].as_integer(), Some(3));
    }

    #[test]
    fn merge_toml_table_merge() {
        let base = stock_defaults_value().unwrap();
        let overlay: toml::Value = toml::from_str("[server]\nport = 1").unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged["server"]["port"].as_integer(), Some(1));
        assert_eq!(merged["server"]["bind"].as_str(), Some("0.0.0.0"));
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("[server]\nprot = 1\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str("[tls]\ncert = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn validate_zero_workers() {
        let mut config = ServerConfig::default();
        config.workers.count = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_zero_fragment_size() {
        let mut config = ServerConfig::default();
        config.protocol.fragment_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_quality_out_of_range() {
        let mut config = ServerConfig::default();
        config.output.quality = 0;
        assert!(config.validate().is_err());
        config.output.quality = 101;
        assert!(config.validate().is_err());
        config.output.quality = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_zero_max_pixels() {
        let mut config = ServerConfig::default();
        config.output.max_pixels = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn validate_bad_bind_address() {
        let mut config = ServerConfig::default();
        config.server.bind = "localhost".into();
        assert!(config.validate().is_err());
    }

    // =========================================================================
    // Loading
    // =========================================================================

    #[test]
    fn load_config_without_file_is_default() {
        assert_eq!(load_config(None).unwrap(), ServerConfig::default());
    }

    #[test]
    fn load_config_merges_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgrelay.toml");
        fs::write(
            &path,
            "[workers]\ncount = 2\n\n[output]\nformat = \"png\"\nmax_pixels = 1000\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.workers.count, Some(2));
        assert_eq!(config.output.format, OutputFormat::Png);
        assert_eq!(config.output.max_pixels, 1000);
        assert_eq!(config.output.quality, 90);
        assert_eq!(config.server.port, 12345);
    }

    #[test]
    fn load_config_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgrelay.toml");
        fs::write(&path, "[protocol]\nfragment_size = 0\n").unwrap();
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn load_config_rejects_unknown_keys() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("imgrelay.toml");
        fs::write(&path, "[output]\nformt = \"png\"\n").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_missing_file_errors() {
        let result = load_config(Some(Path::new("/nonexistent/imgrelay.toml")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    // =========================================================================
    // Stock config
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: ServerConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let value = stock_defaults_value().unwrap();
        let table = value.as_table().unwrap();
        for section in ["server", "workers", "protocol", "output", "logging"] {
            assert!(table.contains_key(section), "missing {section}");
        }
    }
}
