//! Configuration system for the `StudyRoom` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/studyroom/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use studyroom_proto::task::MAX_TASK_TEXT_LENGTH;

use crate::board::{BoardSettings, MergePolicy, SortOrder};
use crate::poll::{DEFAULT_POLL_INTERVAL, Poller};
use crate::store::http::{AuthScheme, HttpStoreConfig};

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

    /// A duration setting that must be positive was zero.
    #[error("{key} must be greater than zero")]
    ZeroDuration {
        /// Config key, e.g. `poll.task_interval_ms`.
        key: &'static str,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    api: ApiFileConfig,
    poll: PollFileConfig,
    board: BoardFileConfig,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    url: Option<String>,
    token: Option<String>,
    auth_scheme: Option<AuthScheme>,
    request_timeout_ms: Option<u64>,
}

/// `[poll]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct PollFileConfig {
    session_interval_ms: Option<u64>,
    task_interval_ms: Option<u64>,
}

/// `[board]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    sort_order: Option<SortOrder>,
    error_display_ms: Option<u64>,
    merge_policy: Option<MergePolicy>,
    max_task_text_len: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- API --
    /// Base URL of the task store API.
    pub api_url: String,
    /// Auth token sent with every request.
    pub token: Option<String>,
    /// Scheme word of the auth header.
    pub auth_scheme: AuthScheme,
    /// Per-request timeout.
    pub request_timeout: Duration,

    // -- Poll --
    /// Interval of the session record poll.
    pub session_poll_interval: Duration,
    /// Interval of the task list poll.
    pub task_poll_interval: Duration,

    // -- Board --
    /// Column sort order.
    pub sort_order: SortOrder,
    /// How long destructive-action errors stay visible.
    pub error_display: Duration,
    /// Reconciliation policy for polled task lists.
    pub merge_policy: MergePolicy,
    /// Maximum task text length in characters.
    pub max_task_text_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8000/api".to_string(),
            token: None,
            auth_scheme: AuthScheme::Token,
            request_timeout: Duration::from_secs(10),
            session_poll_interval: DEFAULT_POLL_INTERVAL,
            task_poll_interval: DEFAULT_POLL_INTERVAL,
            sort_order: SortOrder::NewestFirst,
            error_display: Duration::from_secs(1),
            merge_policy: MergePolicy::PreserveInFlight,
            max_task_text_len: MAX_TASK_TEXT_LENGTH,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path
    /// (`~/.config/studyroom/config.toml`) is tried and silently ignored
    /// if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or sets a poll interval or request timeout to zero.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` so it can be
    /// tested without CLI parsing.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            api_url: cli
                .api_url
                .clone()
                .or_else(|| file.api.url.clone())
                .unwrap_or(defaults.api_url),
            token: cli.token.clone().or_else(|| file.api.token.clone()),
            auth_scheme: cli
                .auth_scheme
                .or(file.api.auth_scheme)
                .unwrap_or(defaults.auth_scheme),
            request_timeout: positive_millis(
                "api.request_timeout_ms",
                file.api.request_timeout_ms,
                defaults.request_timeout,
            )?,
            session_poll_interval: positive_millis(
                "poll.session_interval_ms",
                file.poll.session_interval_ms,
                defaults.session_poll_interval,
            )?,
            task_poll_interval: positive_millis(
                "poll.task_interval_ms",
                file.poll.task_interval_ms,
                defaults.task_poll_interval,
            )?,
            sort_order: cli
                .sort_order
                .or(file.board.sort_order)
                .unwrap_or(defaults.sort_order),
            error_display: file
                .board
                .error_display_ms
                .map_or(defaults.error_display, Duration::from_millis),
            merge_policy: file
                .board
                .merge_policy
                .unwrap_or(defaults.merge_policy),
            max_task_text_len: file
                .board
                .max_task_text_len
                .unwrap_or(defaults.max_task_text_len),
        })
    }

    /// Connection settings for [`HttpTaskStore`](crate::store::http::HttpTaskStore).
    #[must_use]
    pub fn http_store(&self) -> HttpStoreConfig {
        HttpStoreConfig {
            base_url: self.api_url.clone(),
            token: self.token.clone(),
            auth_scheme: self.auth_scheme,
            request_timeout: self.request_timeout,
        }
    }

    /// Board tunables derived from this configuration.
    #[must_use]
    pub fn board_settings(&self) -> BoardSettings {
        BoardSettings {
            sort_order: self.sort_order,
            error_display: self.error_display,
            merge_policy: self.merge_policy,
            max_task_text_len: self.max_task_text_len,
            task_poll_interval: self.task_poll_interval,
        }
    }

    /// A poller running at the configured intervals.
    #[must_use]
    pub const fn poller(&self) -> Poller {
        Poller::new(self.session_poll_interval, self.task_poll_interval)
    }
}

/// Global CLI arguments parsed by clap.
#[derive(clap::Args, Debug, Default)]
pub struct CliArgs {
    /// Base URL of the task store API.
    #[arg(long, global = true, env = "STUDYROOM_API_URL")]
    pub api_url: Option<String>,

    /// Auth token for the task store.
    #[arg(long, global = true, env = "STUDYROOM_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Auth header scheme (token or bearer).
    #[arg(long, global = true, env = "STUDYROOM_AUTH_SCHEME")]
    pub auth_scheme: Option<AuthScheme>,

    /// Task sort order (newest or oldest).
    #[arg(long, global = true)]
    pub sort_order: Option<SortOrder>,

    /// Path to config file (default: `~/.config/studyroom/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "STUDYROOM_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/studyroom.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
/// Milliseconds from the file, or `default` when unset. Zero is rejected.
fn positive_millis(
    key: &'static str,
    millis: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match millis {
        Some(0) => Err(ConfigError::ZeroDuration { key }),
        Some(ms) => Ok(Duration::from_millis(ms)),
        None => Ok(default),
    }
}

fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("studyroom").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
