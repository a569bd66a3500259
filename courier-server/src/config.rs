//! Configuration system for the Courier server.
//!
//! Supports layered configuration with the following priority (highest
//! first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/courier-server/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;
use std::time::Duration;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerConfigFile {
    server: ServerFileSection,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileSection {
    bind_addr: Option<String>,
    max_body_size: Option<usize>,
    max_image_size: Option<usize>,
    send_timeout_ms: Option<u64>,
    upload_timeout_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the Courier server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Courier message delivery server")]
pub struct ServerCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "COURIER_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/courier-server/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum inline text body size in bytes.
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Maximum accepted image upload size in bytes.
    #[arg(long)]
    pub max_image_size: Option<usize>,

    /// Per-frame socket write timeout in milliseconds.
    #[arg(long)]
    pub send_timeout_ms: Option<u64>,

    /// Object-storage upload timeout in milliseconds.
    #[arg(long)]
    pub upload_timeout_ms: Option<u64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "COURIER_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Maximum allowed inline text body size in bytes.
    pub max_body_size: usize,
    /// Maximum accepted image upload size in bytes.
    pub max_image_size: usize,
    /// Per-frame socket write timeout.
    pub send_timeout: Duration,
    /// Object-storage upload timeout.
    pub upload_timeout: Duration,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            max_body_size: 64 * 1024,
            max_image_size: 10 * 1024 * 1024,
            send_timeout: Duration::from_millis(5000),
            upload_timeout: Duration::from_millis(30_000),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Without `--config` the default path is tried and a missing
    /// file is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &ServerCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &ServerCliArgs, file: &ServerConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_body_size: cli
                .max_body_size
                .or(file.server.max_body_size)
                .unwrap_or(defaults.max_body_size),
            max_image_size: cli
                .max_image_size
                .or(file.server.max_image_size)
                .unwrap_or(defaults.max_image_size),
            send_timeout: cli
                .send_timeout_ms
                .or(file.server.send_timeout_ms)
                .map_or(defaults.send_timeout, Duration::from_millis),
            upload_timeout: cli
                .upload_timeout_ms
                .or(file.server.upload_timeout_ms)
                .map_or(defaults.upload_timeout, Duration::from_millis),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<ServerConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ServerConfigFile::default());
        };
        config_dir.join("courier-server").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ServerConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
