use std::{
    fs,
    path::{Path, PathBuf},
};

use color_eyre::Result;
use dirs::config_dir;
use serde::{Deserialize, Serialize};

/// Key the upload bearer token is read from when not configured otherwise.
pub const DEFAULT_TOKEN_KEY: &str = "auth_token";

/// User-level configuration loaded from `~/.config/coffer/config.toml` (platform-specific).
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct Config {
    /// Override for data directory (encrypted store).
    pub data_dir: Option<PathBuf>,
    /// Store namespace; selects `<data_dir>/<namespace>.json`.
    pub namespace: Option<String>,
    /// Upload settings (optional).
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct UploadConfig {
    pub endpoint: Option<String>,
    /// Store key holding the bearer token.
    pub token_key: Option<String>,
}

impl Config {
    pub fn upload_endpoint(&self) -> Option<&str> {
        self.upload.as_ref().and_then(|u| u.endpoint.as_deref())
    }

    pub fn token_key(&self) -> &str {
        self.upload
            .as_ref()
            .and_then(|u| u.token_key.as_deref())
            .unwrap_or(DEFAULT_TOKEN_KEY)
    }
}

/// Load config from the default path; if missing, return defaults.
pub fn load() -> Result<Config> {
    let path = default_path()?;
    load_from_path(path)
}

/// Load config from a given path; if missing or empty, return defaults.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    let cfg: Config = toml::from_str(&contents)?;
    Ok(cfg)
}

/// Resolve the default config path (platform aware).
pub fn default_path() -> Result<PathBuf> {
    let base = config_dir().ok_or_else(|| color_eyre::eyre::eyre!("no config dir available"))?;
    Ok(base.join("coffer").join("config.toml"))
}

/// Write the given config to the default path unless a file is already there.
pub fn write_default_if_missing(config: &Config) -> Result<PathBuf> {
    write_to_path_if_missing(config, &default_path()?)
}

/// Write `config` to `path`, creating parent directories as needed.
/// An existing file is left untouched to avoid clobbering user edits.
pub fn write_to_path_if_missing(config: &Config, path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)?;
    fs::write(path, body)?;
    Ok(path.to_path_buf())
}
