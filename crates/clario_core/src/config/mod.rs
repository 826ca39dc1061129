use crate::calendar::resolve_offset;
use crate::error::AppError;
use crate::mentor::{DEFAULT_HISTORY_LIMIT, DEFAULT_TIMEOUT, MentorSettings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::UtcOffset;

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "CLARIO_CONFIG_PATH";

pub const DEFAULT_MODEL_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL_NAME: &str = "gemini-1.5-flash";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default)]
    pub history_limit: Option<usize>,
    #[serde(default)]
    pub utc_offset: Option<String>,
    #[serde(default)]
    pub model: ModelConfig,
}

/// Model endpoint settings with defaults filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSettings {
    pub endpoint: String,
    pub name: String,
    pub api_key_env: String,
}

impl Config {
    pub fn model_settings(&self) -> ModelSettings {
        ModelSettings {
            endpoint: non_blank(self.model.endpoint.as_deref())
                .unwrap_or(DEFAULT_MODEL_ENDPOINT)
                .to_string(),
            name: non_blank(self.model.name.as_deref())
                .unwrap_or(DEFAULT_MODEL_NAME)
                .to_string(),
            api_key_env: non_blank(self.model.api_key_env.as_deref())
                .unwrap_or(DEFAULT_API_KEY_ENV)
                .to_string(),
        }
    }

    pub fn mentor_settings(&self) -> MentorSettings {
        MentorSettings {
            history_limit: self
                .history_limit
                .unwrap_or(DEFAULT_HISTORY_LIMIT)
                .min(DEFAULT_HISTORY_LIMIT),
            timeout: self
                .model
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
        }
    }

    pub fn offset(&self) -> Result<UtcOffset, AppError> {
        resolve_offset(self.utc_offset.as_deref())
    }

    fn validate(&self) -> Result<(), AppError> {
        if let Some(limit) = self.history_limit
            && !(1..=DEFAULT_HISTORY_LIMIT).contains(&limit)
        {
            return Err(AppError::invalid_data(format!(
                "history_limit must be between 1 and {DEFAULT_HISTORY_LIMIT}"
            )));
        }
        if self.model.timeout_secs == Some(0) {
            return Err(AppError::invalid_data("model.timeout_secs must be at least 1"));
        }
        if let Some(raw) = self.utc_offset.as_deref() {
            resolve_offset(Some(raw))
                .map_err(|err| AppError::invalid_data(err.message().to_string()))?;
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

/// Values supplied on the command line, applied over the file config.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub database_path: Option<String>,
    pub history_limit: Option<usize>,
    pub utc_offset: Option<String>,
    pub model_endpoint: Option<String>,
    pub model_name: Option<String>,
    pub model_api_key_env: Option<String>,
    pub model_timeout_secs: Option<u64>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata).join("clario").join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("clario")
            .join(CONFIG_FILE_NAME))
    }
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    let config: Config = serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })?;
    config
        .validate()
        .map_err(|err| AppError::invalid_data(format!("{}: {}", path.display(), err.message())))?;
    Ok(config)
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Result<Config, AppError> {
    let mut merged = base.clone();

    if let Some(path) = overrides.database_path.as_ref() {
        merged.database_path = Some(path.clone());
    }
    if let Some(limit) = overrides.history_limit {
        merged.history_limit = Some(limit);
    }
    if let Some(offset) = overrides.utc_offset.as_ref() {
        merged.utc_offset = Some(offset.clone());
    }
    if let Some(endpoint) = overrides.model_endpoint.as_ref() {
        merged.model.endpoint = Some(endpoint.clone());
    }
    if let Some(name) = overrides.model_name.as_ref() {
        merged.model.name = Some(name.clone());
    }
    if let Some(api_key_env) = overrides.model_api_key_env.as_ref() {
        merged.model.api_key_env = Some(api_key_env.clone());
    }
    if let Some(timeout) = overrides.model_timeout_secs {
        merged.model.timeout_secs = Some(timeout);
    }

    merged
        .validate()
        .map_err(|err| AppError::invalid_input(err.message().to_string()))?;
    Ok(merged)
}
