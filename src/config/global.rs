//! Loading, saving and defaults of `config.json`.

use crate::constants::{API_KEY_ENV, API_URL_ENV, CONFIG_PATH_ENV};
use crate::core::AskError;
use crate::upgrade::config::UpgradeConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Chat-completion endpoint used when none is configured.
pub const DEFAULT_API_URL: &str =
    "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions";

/// Model alias used when none is requested.
pub const DEFAULT_MODEL_ALIAS: &str = "default";

/// Role used when none is requested.
pub const DEFAULT_ROLE: &str = "default";

/// A model entry: the name sent to the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name as the endpoint knows it
    pub name: String,
}

/// Contents of `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Chat-completion endpoint URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Bearer token for the endpoint
    #[serde(default)]
    pub api_key: String,

    /// Model aliases, e.g. `"default" -> qwen-plus`
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelConfig>,

    /// Named system prompts
    #[serde(default = "default_roles")]
    pub roles: BTreeMap<String, String>,

    /// Self-update settings
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_models() -> BTreeMap<String, ModelConfig> {
    [
        ("default", "qwen-plus"),
        ("turbo", "qwen-turbo"),
        ("max", "qwen-max"),
    ]
    .into_iter()
    .map(|(alias, name)| {
        (
            alias.to_string(),
            ModelConfig {
                name: name.to_string(),
            },
        )
    })
    .collect()
}

fn default_roles() -> BTreeMap<String, String> {
    BTreeMap::from([
        (DEFAULT_ROLE.to_string(), "You are a helpful assistant.".to_string()),
        (
            "shell".to_string(),
            "You are a command-line expert. Answer with concise, correct shell commands and brief explanations."
                .to_string(),
        ),
    ])
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            models: default_models(),
            roles: default_roles(),
            upgrade: UpgradeConfig::default(),
        }
    }
}

impl Config {
    /// Default location: `~/.config/ask/config.json`.
    ///
    /// # Errors
    ///
    /// Fails when the home directory cannot be determined.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?;
        Ok(home.join(".config").join("ask").join("config.json"))
    }

    /// Config path to use: `explicit`, then `ASK_CONFIG`, then the default.
    ///
    /// # Errors
    ///
    /// See [`Config::default_path`].
    pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => Self::default_path(),
        }
    }

    /// Load the config at `path` (defaults if absent) and apply env overrides.
    ///
    /// # Errors
    ///
    /// Fails when the file exists but cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from(path).await?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse the file at `path` without env overrides.
    ///
    /// # Errors
    ///
    /// Read failures carry the path; parse failures are
    /// [`AskError::ConfigParseError`].
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content).map_err(|e| {
            AskError::ConfigParseError {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Replace `api_url`/`api_key` with `ASK_API_URL`/`ASK_API_KEY` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env(API_URL_ENV) {
            debug!("Using API URL from {}", API_URL_ENV);
            self.api_url = url;
        }
        if let Some(key) = non_empty_env(API_KEY_ENV) {
            debug!("Using API key from {}", API_KEY_ENV);
            self.api_key = key;
        }
    }

    /// Write the config to `path`, creating parent directories.
    ///
    /// The file holds an API key, so it is made owner-only (0600) on Unix.
    ///
    /// # Errors
    ///
    /// Fails on any I/O error.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("Failed to set secure permissions on {}", path.display()))?;
        }

        Ok(())
    }

    /// Write the default config to `path`, refusing to overwrite.
    ///
    /// # Errors
    ///
    /// [`AskError::ConfigAlreadyExists`] when `path` exists, or any I/O error.
    pub async fn init_at(path: &Path) -> Result<Self> {
        if path.exists() {
            return Err(AskError::ConfigAlreadyExists {
                path: path.display().to_string(),
            }
            .into());
        }
        let config = Self::default();
        config.save_to(path).await?;
        Ok(config)
    }

    /// Model name for `alias`, or the `default` alias when `None`.
    ///
    /// An alias that is not configured is an error, unless it is given
    /// explicitly and looks like a model name already (contains `-`).
    ///
    /// # Errors
    ///
    /// [`AskError::UnknownModel`].
    pub fn model_name(&self, alias: Option<&str>) -> Result<String, AskError> {
        let alias = alias.unwrap_or(DEFAULT_MODEL_ALIAS);
        if let Some(model) = self.models.get(alias) {
            return Ok(model.name.clone());
        }
        if alias.contains('-') {
            return Ok(alias.to_string());
        }
        Err(AskError::UnknownModel {
            name: alias.to_string(),
        })
    }

    /// System prompt for `role`, falling back to the default role.
    pub fn role_prompt(&self, role: Option<&str>) -> Option<&str> {
        role.and_then(|r| self.roles.get(r))
            .or_else(|| self.roles.get(DEFAULT_ROLE))
            .map(String::as_str)
    }

    /// Copy suitable for display, with the API key masked.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.api_key = mask_secret(&self.api_key);
        copy
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[n - 4..].iter().collect();
            format!("{head}…{tail}")
        }
    }
}
