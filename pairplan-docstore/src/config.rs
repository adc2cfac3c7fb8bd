//! Configuration for the document store server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairplan-docstore/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use crate::engine::DEFAULT_MAX_BATCH_WRITES;
use crate::server::DEFAULT_MAX_FRAME_SIZE;

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

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DocstoreConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_frame_size: Option<usize>,
    max_batch_writes: Option<usize>,
    log_level: Option<String>,
}

/// CLI arguments for the document store server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "PairPlan document store server")]
pub struct DocstoreCliArgs {
    /// Address to bind to.
    #[arg(short, long, env = "PAIRPLAN_DOCSTORE_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/pairplan-docstore/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum inbound frame size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Maximum number of writes per commit.
    #[arg(long)]
    pub max_batch_writes: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, env = "PAIRPLAN_DOCSTORE_LOG")]
    pub log_level: Option<String>,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct DocstoreConfig {
    /// Address to bind to (e.g. `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Maximum inbound frame size in bytes.
    pub max_frame_size: usize,
    /// Maximum number of writes per commit.
    pub max_batch_writes: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for DocstoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
            log_level: "info".to_string(),
        }
    }
}

impl DocstoreConfig {
    /// Loads configuration by merging CLI args, env vars and a TOML file.
    ///
    /// An explicit `--config` that does not exist is an error; a missing
    /// default file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &DocstoreCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    fn resolve(cli: &DocstoreCliArgs, file: &DocstoreConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_frame_size: cli
                .max_frame_size
                .or(file.server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            max_batch_writes: cli
                .max_batch_writes
                .or(file.server.max_batch_writes)
                .unwrap_or(defaults.max_batch_writes),
            log_level: cli
                .log_level
                .clone()
                .or_else(|| file.server.log_level.clone())
                .unwrap_or(defaults.log_level),
        }
    }
}

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<DocstoreConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(DocstoreConfigFile::default());
    };
    let path = config_dir.join("pairplan-docstore").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DocstoreConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = DocstoreConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:9100");
        assert_eq!(config.max_frame_size, 256 * 1024);
        assert_eq!(config.max_batch_writes, 500);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn file_values_fill_unset_cli() {
        let file: DocstoreConfigFile = toml::from_str(
            r#"
[server]
bind_addr = "127.0.0.1:7000"
max_batch_writes = 50
log_level = "debug"
"#,
        )
        .unwrap();
        let config = DocstoreConfig::resolve(&DocstoreCliArgs::default(), &file);

        assert_eq!(config.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.max_batch_writes, 50);
        assert_eq!(config.max_frame_size, 256 * 1024);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn cli_overrides_file() {
        let file: DocstoreConfigFile = toml::from_str(
            r#"
[server]
bind_addr = "127.0.0.1:7000"
max_frame_size = 1024
"#,
        )
        .unwrap();
        let cli = DocstoreCliArgs {
            bind: Some("0.0.0.0:3000".to_string()),
            log_level: Some("warn".to_string()),
            ..Default::default()
        };
        let config = DocstoreConfig::resolve(&cli, &file);

        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn empty_file_gives_defaults() {
        let file: DocstoreConfigFile = toml::from_str("").unwrap();
        let config = DocstoreConfig::resolve(&DocstoreCliArgs::default(), &file);
        assert_eq!(config.bind_addr, "0.0.0.0:9100");
    }

    #[test]
    fn explicit_missing_config_file_returns_error() {
        let result = load_config_file(Some(std::path::Path::new("/nonexistent/config.toml")));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
