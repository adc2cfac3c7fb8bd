//! Configuration for the `PairPlan` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairplan/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use pairplan_docstore::engine::DEFAULT_MAX_BATCH_WRITES;
use pairplan_proto::session::SessionMode;
use pairplan_proto::task::{ClockTime, TaskType};

use crate::notify::DEFAULT_SNOOZE_MINUTES;
use crate::recent::DEFAULT_RECENT_LIMIT;
use crate::registry::{DEFAULT_CODE_ATTEMPTS, DEFAULT_TRANSACTION_ATTEMPTS, RegistryOptions};
use crate::session::SessionOptions;
use crate::tasks::StatusAction;

/// Errors that can occur when loading configuration.
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

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    session: SessionFileConfig,
    notify: NotifyFileConfig,
}

/// `[store]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    transaction_attempts: Option<u32>,
    max_batch_writes: Option<usize>,
}

/// `[session]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    recent_limit: Option<usize>,
    code_attempts: Option<u32>,
    state_dir: Option<PathBuf>,
}

/// `[notify]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NotifyFileConfig {
    snooze_minutes: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Document store WebSocket URL.
    pub store_url: String,
    /// Timeout for establishing the store connection.
    pub connect_timeout: Duration,
    /// Timeout for a single store request.
    pub request_timeout: Duration,
    /// Optimistic attempts per membership transaction.
    pub transaction_attempts: u32,
    /// Largest commit the store accepts.
    pub max_batch_writes: usize,
    /// Number of recent session codes kept.
    pub recent_limit: usize,
    /// Fresh codes tried when creating a session.
    pub code_attempts: u32,
    /// Directory for the local identity and recent-session cache.
    pub state_dir: PathBuf,
    /// Delay before a snoozed task reminds again.
    pub snooze: Duration,
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pairplan")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            store_url: "ws://127.0.0.1:9100/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            transaction_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
            max_batch_writes: DEFAULT_MAX_BATCH_WRITES,
            recent_limit: DEFAULT_RECENT_LIMIT,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
            state_dir: default_state_dir(),
            snooze: Duration::from_secs(DEFAULT_SNOOZE_MINUTES * 60),
        }
    }
}

impl ClientConfig {
    /// Loads configuration by merging CLI args, env vars and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read,
    /// or if any config file present cannot be parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            store_url: cli
                .store_url
                .clone()
                .or_else(|| file.store.url.clone())
                .unwrap_or(defaults.store_url),
            connect_timeout: file
                .store
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .store
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            transaction_attempts: file
                .store
                .transaction_attempts
                .unwrap_or(defaults.transaction_attempts),
            max_batch_writes: file
                .store
                .max_batch_writes
                .unwrap_or(defaults.max_batch_writes),
            recent_limit: file
                .session
                .recent_limit
                .unwrap_or(defaults.recent_limit),
            code_attempts: file
                .session
                .code_attempts
                .unwrap_or(defaults.code_attempts),
            state_dir: cli
                .state_dir
                .clone()
                .or_else(|| file.session.state_dir.clone())
                .unwrap_or(defaults.state_dir),
            snooze: file
                .notify
                .snooze_minutes
                .map_or(defaults.snooze, |m| Duration::from_secs(m * 60)),
        }
    }

    /// View-model tunables derived from this configuration.
    #[must_use]
    pub const fn session_options(&self) -> SessionOptions {
        SessionOptions {
            registry: RegistryOptions {
                transaction_attempts: self.transaction_attempts,
                code_attempts: self.code_attempts,
                batch_limit: self.max_batch_writes,
            },
            snooze: self.snooze,
        }
    }
}

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Shared weekly planner")]
pub struct CliArgs {
    /// WebSocket URL of the document store.
    #[arg(long, env = "PAIRPLAN_STORE_URL")]
    pub store_url: Option<String>,

    /// Path to config file (default: `~/.config/pairplan/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the local identity and recent sessions.
    #[arg(long, env = "PAIRPLAN_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRPLAN_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/pairplan.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// What to do.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create a session and join it.
    Create {
        /// Session mode.
        #[arg(long, value_enum, default_value_t = ModeArg::Shared)]
        mode: ModeArg,
    },
    /// Join a session by code.
    Join {
        /// Session code.
        code: String,
    },
    /// Leave a session.
    Leave {
        /// Session code.
        code: String,
    },
    /// List sessions you created.
    Sessions,
    /// List recently used session codes.
    Recent,
    /// Delete a session you created, with all its tasks.
    Delete {
        /// Session code.
        code: String,
    },
    /// Print a session's tasks.
    Tasks {
        /// Session code.
        code: String,
    },
    /// Add a task.
    Add {
        /// Session code.
        code: String,
        /// Task title.
        #[arg(long)]
        title: String,
        /// Day of week, Monday = 1.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=7))]
        weekday: u8,
        /// Start time (HH:MM).
        #[arg(long)]
        time: Option<ClockTime>,
        /// End time (HH:MM).
        #[arg(long)]
        end: Option<ClockTime>,
        /// Category.
        #[arg(long = "type", value_enum, default_value_t = TypeArg::Other)]
        task_type: TypeArg,
    },
    /// Change a task's status.
    Status {
        /// Session code.
        code: String,
        /// Task id.
        task_id: String,
        /// Action to apply.
        #[arg(value_enum)]
        action: ActionArg,
    },
    /// Print every task list update until interrupted.
    Watch {
        /// Session code.
        code: String,
    },
    /// Print the free time slots of a day.
    Free {
        /// Session code.
        code: String,
        /// Day of week, Monday = 1.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=7))]
        weekday: u8,
    },
}

/// `--mode` values.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    /// Everyone may act on every task.
    Shared,
    /// Two participants, each acting on their own tasks.
    Individual,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Shared => Self::Shared,
            ModeArg::Individual => Self::Individual,
        }
    }
}

/// `--type` values.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeArg {
    /// Work.
    Work,
    /// Personal.
    Personal,
    /// Shopping.
    Shopping,
    /// Health.
    Health,
    /// Education.
    Education,
    /// Other.
    Other,
}

impl From<TypeArg> for TaskType {
    fn from(t: TypeArg) -> Self {
        match t {
            TypeArg::Work => Self::Work,
            TypeArg::Personal => Self::Personal,
            TypeArg::Shopping => Self::Shopping,
            TypeArg::Health => Self::Health,
            TypeArg::Education => Self::Education,
            TypeArg::Other => Self::Other,
        }
    }
}

/// Status actions accepted on the command line.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionArg {
    /// Postpone.
    Snooze,
    /// Cancel.
    Cancel,
    /// Mark done.
    Done,
    /// Back to normal.
    Reopen,
}

impl From<ActionArg> for StatusAction {
    fn from(action: ActionArg) -> Self {
        match action {
            ActionArg::Snooze => Self::Snooze,
            ActionArg::Cancel => Self::Cancel,
            ActionArg::Done => Self::Complete,
            ActionArg::Reopen => Self::Reopen,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("pairplan").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
