//! Configuration for the development task store.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/studyroom-devstore/config.toml`)
//! 4. Compiled defaults
//!
//! Accounts come only from the file; without a `[[users]]` table two demo
//! accounts are seeded.

use std::path::PathBuf;

use studyroom_proto::{User, UserId};

use crate::store::{Account, DEFAULT_MAX_PARTICIPANTS};

/// Errors that can occur when loading devstore configuration.
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

    /// Two accounts share an id or a token.
    #[error("duplicate account {0} in config file")]
    DuplicateAccount(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DevStoreConfigFile {
    server: ServerFileConfig,
    users: Vec<UserFileConfig>,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_participants: Option<usize>,
}

/// One `[[users]]` entry.
#[derive(Debug, serde::Deserialize)]
struct UserFileConfig {
    id: u64,
    username: String,
    #[serde(default)]
    email: String,
    token: String,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the development task store.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "StudyRoom development task store")]
pub struct DevStoreCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "DEVSTORE_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/studyroom-devstore/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum participants per session.
    #[arg(long)]
    pub max_participants: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "DEVSTORE_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved devstore configuration.
#[derive(Debug, Clone)]
pub struct DevStoreConfig {
    /// Address to bind the server to (e.g., `127.0.0.1:8000`).
    pub bind_addr: String,
    /// Seats per session.
    pub max_participants: usize,
    /// Known accounts and their tokens.
    pub accounts: Vec<Account>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for DevStoreConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            max_participants: DEFAULT_MAX_PARTICIPANTS,
            accounts: demo_accounts(),
            log_level: "info".to_string(),
        }
    }
}

/// Accounts used when the config file names none.
#[must_use]
pub fn demo_accounts() -> Vec<Account> {
    vec![
        Account::new(User::new(UserId(1), "ana"), "ana-token"),
        Account::new(User::new(UserId(2), "ben"), "ben-token"),
    ]
}

impl DevStoreConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or lists the same account twice.
    pub fn load(cli: &DevStoreCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, file)
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &DevStoreCliArgs, file: DevStoreConfigFile) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let accounts = if file.users.is_empty() {
            defaults.accounts
        } else {
            accounts_from_file(file.users)?
        };

        Ok(Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_participants: cli
                .max_participants
                .or(file.server.max_participants)
                .unwrap_or(defaults.max_participants),
            accounts,
            log_level: cli.log_level.clone(),
        })
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn accounts_from_file(users: Vec<UserFileConfig>) -> Result<Vec<Account>, ConfigError> {
    let mut accounts: Vec<Account> = Vec::with_capacity(users.len());
    for entry in users {
        if accounts
            .iter()
            .any(|a| a.user.id.get() == entry.id || a.token == entry.token)
        {
            return Err(ConfigError::DuplicateAccount(entry.username));
        }
        let mut user = User::new(UserId(entry.id), entry.username);
        user.email = entry.email;
        accounts.push(Account::new(user, entry.token));
    }
    Ok(accounts)
}

fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<DevStoreConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(DevStoreConfigFile::default());
        };
        config_dir.join("studyroom-devstore").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DevStoreConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
