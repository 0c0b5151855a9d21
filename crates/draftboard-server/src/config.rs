// Server configuration (config/server.toml plus environment overrides).

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use draftboard_core::notify::DEFAULT_MAILBOX_CAPACITY;
use serde::Deserialize;
use thiserror::Error;

const CONFIG_FILE: &str = "server.toml";
const DB_FILE_NAME: &str = "draft-board.db";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// server.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file. When omitted the platform data directory is used.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    /// Undelivered events a viewer may have queued before new ones are
    /// dropped for it.
    pub mailbox_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl Config {
    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Where the database lives: the configured path, or `draft-board.db`
    /// in the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database.path {
            return Ok(PathBuf::from(path));
        }
        let dirs = ProjectDirs::from("", "", "draft-board").ok_or_else(|| {
            ConfigError::ValidationError {
                field: "database.path".into(),
                message: "no path configured and no home directory to default to".into(),
            }
        })?;
        Ok(dirs.data_dir().join(DB_FILE_NAME))
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/server.toml` relative to `base_dir`, applying
/// overrides from `env`.
///
/// This does not copy defaults; prefer `load_config()`.
pub(crate) fn load_config_from<F>(base_dir: &Path, env: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = std::fs::read_to_string(&path).map_err(|_| ConfigError::FileNotFound {
        path: path.clone(),
    })?;
    let mut config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    apply_env_overrides(&mut config, env)?;
    validate(&config)?;
    Ok(config)
}

/// `DB_PATH` replaces `database.path`; `PORT` replaces `server.port`.
fn apply_env_overrides<F>(config: &mut Config, env: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(path) = env("DB_PATH") {
        config.database.path = Some(path);
    }
    if let Some(port) = env("PORT") {
        config.server.port = port.parse().map_err(|_| ConfigError::ValidationError {
            field: "PORT".into(),
            message: format!("not a valid port number: {port}"),
        })?;
    }
    Ok(())
}

/// Copy `defaults/server.toml` to `config/server.toml` unless the latter
/// already exists. Returns the path written, if any.
pub fn ensure_config_file(base_dir: &Path) -> Result<Option<PathBuf>, ConfigError> {
    let target = base_dir.join("config").join(CONFIG_FILE);
    if target.exists() {
        return Ok(None);
    }

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    if !source.exists() {
        return Err(ConfigError::DefaultsCopyError {
            message: format!(
                "neither {} nor {} exists",
                target.display(),
                source.display()
            ),
        });
    }

    let copy = || -> std::io::Result<()> {
        std::fs::create_dir_all(base_dir.join("config"))?;
        std::fs::copy(&source, &target)?;
        Ok(())
    };
    copy().map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {}: {e}", source.display()),
    })?;
    Ok(Some(target))
}

/// Load config relative to the current working directory, copying defaults
/// first and honouring `DB_PATH` / `PORT` from the process environment.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_file(&cwd)?;
    load_config_from(&cwd, |key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.bind_address.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "server.bind_address".into(),
            message: "must not be empty".into(),
        });
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config
        .database
        .path
        .as_deref()
        .is_some_and(|p| p.trim().is_empty())
    {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty when set".into(),
        });
    }

    if config.notifications.mailbox_capacity == 0 {
        return Err(ConfigError::ValidationError {
            field: "notifications.mailbox_capacity".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
