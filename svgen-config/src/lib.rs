use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_API_KEY_ENV_VAR: &str = "ANTHROPIC_API_KEY";
pub const FALLBACK_API_KEY_ENV_VAR: &str = "CLAUDE_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

const CONFIG_DIR_NAME: &str = ".svgen";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine configuration directory")]
    ConfigDirUnavailable,
    #[error("failed to read or write configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to deserialize configuration: {0}")]
    Deserialize(#[from] toml::de::Error),
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error(
        "API key not found; set {env_var} or run `svgen set-api-key <KEY>` to store one in the config file"
    )]
    MissingApiKey { env_var: String },
    #[error("API key from {origin} contains whitespace or control characters")]
    InvalidApiKey { origin: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub anthropic_api: ApiSettings,
}

/// Connection settings for the Anthropic Messages API.
///
/// `api_key` is only consulted when neither `api_key_env_var` nor
/// [`FALLBACK_API_KEY_ENV_VAR`] holds a non-blank value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub api_key_env_var: String,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_key_env_var: DEFAULT_API_KEY_ENV_VAR.to_string(),
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Config {
    /// Resolve the API credential from the process environment, falling back
    /// to the key stored in the configuration file.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        self.resolve_api_key_with(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::resolve_api_key`] with an injectable variable lookup.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let settings = &self.anthropic_api;
        let env_var = settings.api_key_env_var.trim();

        let mut candidates = Vec::new();
        if !env_var.is_empty() {
            candidates.push((env_var.to_string(), lookup(env_var)));
        }
        if env_var != FALLBACK_API_KEY_ENV_VAR {
            candidates.push((
                FALLBACK_API_KEY_ENV_VAR.to_string(),
                lookup(FALLBACK_API_KEY_ENV_VAR),
            ));
        }
        candidates.push((
            "the configuration file".to_string(),
            Some(settings.api_key.clone()),
        ));

        for (origin, value) in candidates {
            let Some(value) = value else { continue };
            let key = value.trim();
            if key.is_empty() {
                continue;
            }
            if key.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
                return Err(ConfigError::InvalidApiKey { origin });
            }
            return Ok(key.to_string());
        }

        let env_var = if env_var.is_empty() {
            DEFAULT_API_KEY_ENV_VAR
        } else {
            env_var
        };
        Err(ConfigError::MissingApiKey {
            env_var: env_var.to_string(),
        })
    }
}

/// Loads the svgen configuration from disk, creating a default file if absent.
pub fn load_or_init() -> Result<LoadOutcome, ConfigError> {
    let path = config_file_path()?;
    load_or_init_at(path)
}

/// Loads the configuration stored at `path`, creating a default file if absent.
pub fn load_or_init_at(path: PathBuf) -> Result<LoadOutcome, ConfigError> {
    if path.exists() {
        let contents = fs::read_to_string(&path)?;
        let config = toml::from_str(&contents)?;
        Ok(LoadOutcome {
            config,
            path,
            created: false,
        })
    } else {
        let config = Config::default();
        save(&config, &path)?;
        Ok(LoadOutcome {
            config,
            path,
            created: true,
        })
    }
}

/// Read the svgen configuration if the file exists, without creating it.
pub fn load_existing() -> Result<Option<Config>, ConfigError> {
    let path = config_file_path()?;
    load_existing_at(&path)
}

/// Read the configuration stored at `path`; `Ok(None)` when there is no file.
pub fn load_existing_at(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&contents)?))
}

/// Persist the given svgen configuration to disk at the provided path.
pub fn save(config: &Config, path: &Path) -> Result<(), ConfigError> {
    ensure_parent_exists(path)?;
    let serialized = toml::to_string_pretty(config)?;
    fs::write(path, serialized)?;
    Ok(())
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub config: Config,
    pub path: PathBuf,
    pub created: bool,
}

fn ensure_parent_exists(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn config_file_path() -> Result<PathBuf, ConfigError> {
    let base_dirs = BaseDirs::new().ok_or(ConfigError::ConfigDirUnavailable)?;
    Ok(base_dirs
        .home_dir()
        .join(CONFIG_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}
