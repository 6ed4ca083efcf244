use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::transformer::TransformOptions;

const CONFIG_FILE_NAME: &str = "config.toml";
const PROJECT_CONFIG_FILE_NAME: &str = ".agent-chunks";

/// Status of config file loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLoadStatus {
    /// Config loaded successfully from existing file
    Loaded,
    /// Created default config file (first run)
    Created,
    /// Error occurred during loading, using defaults.
    Error(String),
}

/// Transform behavior
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    /// Add the result message uuid to the aggregate metadata chunk.
    pub emit_sdk_message_uuid: bool,
    /// Verbose raw-message logging for local model backends.
    pub is_using_ollama: bool,
}

impl From<&TransformConfig> for TransformOptions {
    fn from(config: &TransformConfig) -> Self {
        TransformOptions {
            emit_sdk_message_uuid: config.emit_sdk_message_uuid,
            is_using_ollama: config.is_using_ollama,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn transform_options(&self) -> TransformOptions {
        TransformOptions::from(&self.transform)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialTransformConfig {
    pub emit_sdk_message_uuid: Option<bool>,
    pub is_using_ollama: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialLoggingConfig {
    pub level: Option<String>,
}

/// Project-specific configuration where every field is optional.
/// Parsed from `.agent-chunks` files. Fields that are `None` inherit from the
/// global config.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PartialConfig {
    pub transform: PartialTransformConfig,
    pub logging: PartialLoggingConfig,
}

/// Merge a global config with a project-level partial config.
/// Project values override global values where present.
pub fn merge_config(global: &Config, project: &PartialConfig) -> Config {
    Config {
        transform: TransformConfig {
            emit_sdk_message_uuid: project
                .transform
                .emit_sdk_message_uuid
                .unwrap_or(global.transform.emit_sdk_message_uuid),
            is_using_ollama: project
                .transform
                .is_using_ollama
                .unwrap_or(global.transform.is_using_ollama),
        },
        logging: LoggingConfig {
            level: project
                .logging
                .level
                .clone()
                .unwrap_or_else(|| global.logging.level.clone()),
        },
    }
}

/// Loaded configuration with metadata
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub config_path: PathBuf,
    pub project_config_path: Option<PathBuf>,
    pub status: ConfigLoadStatus,
}

fn get_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "agent-chunks", "agent-chunks")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the full path to the global config file
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Get the project config path (`.agent-chunks` in the current working
/// directory), if the file exists.
pub fn get_project_config_path() -> Option<PathBuf> {
    let path = env::current_dir().ok()?.join(PROJECT_CONFIG_FILE_NAME);
    if path.exists() { Some(path) } else { None }
}

fn load_project_config(path: &Path) -> Result<PartialConfig, String> {
    let contents = fs::read_to_string(path).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_read_failed");
        format!("Failed to read {}: {}", PROJECT_CONFIG_FILE_NAME, e)
    })?;

    toml::from_str::<PartialConfig>(&contents).map_err(|e| {
        warn!(path = ?path, error = %e, "project_config_parse_failed");
        format!("Invalid {}: {}", PROJECT_CONFIG_FILE_NAME, e)
    })
}

/// Load configuration from file, project override, environment and defaults.
///
/// `explicit_path` replaces the platform config path. Never fails: problems
/// are reported through [`ConfigLoadStatus`] and defaults are used.
pub fn load_config(explicit_path: Option<&Path>) -> LoadedConfig {
    let config_path = match explicit_path.map(Path::to_path_buf).or_else(get_config_path) {
        Some(path) => path,
        None => {
            warn!("config_dir_unavailable");
            return LoadedConfig {
                config: apply_env_overrides(Config::default()),
                config_path: PathBuf::from(CONFIG_FILE_NAME),
                project_config_path: None,
                status: ConfigLoadStatus::Error(
                    "Could not determine config directory".to_string(),
                ),
            };
        }
    };

    debug!(path = ?config_path, "config_path");

    let (mut config, status) = load_or_create_config(&config_path);

    let project_config_path = get_project_config_path();
    if let Some(ref project_path) = project_config_path {
        match load_project_config(project_path) {
            Ok(partial) => {
                config = merge_config(&config, &partial);
                info!(path = ?project_path, "project_config_loaded");
            }
            Err(e) => {
                warn!(path = ?project_path, error = %e, "project_config_error");
            }
        }
    }

    LoadedConfig {
        config: apply_env_overrides(config),
        config_path,
        project_config_path,
        status,
    }
}

/// Load config from file, or create default if not exists
fn load_or_create_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    match fs::read_to_string(config_path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(config) => {
                info!(path = ?config_path, "config_loaded");
                (config, ConfigLoadStatus::Loaded)
            }
            Err(e) => {
                warn!(path = ?config_path, error = %e, "config_malformed");
                (
                    Config::default(),
                    ConfigLoadStatus::Error(format!("Malformed TOML: {}", e)),
                )
            }
        },
        Err(e) if e.kind() == io::ErrorKind::NotFound => create_default_config(config_path),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(path = ?config_path, "config_permission_denied");
            (
                Config::default(),
                ConfigLoadStatus::Error("Permission denied reading config".to_string()),
            )
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_read_failed");
            (
                Config::default(),
                ConfigLoadStatus::Error(format!("Read error: {}", e)),
            )
        }
    }
}

fn create_default_config(config_path: &Path) -> (Config, ConfigLoadStatus) {
    let config = Config::default();

    if let Some(parent) = config_path.parent()
        && let Err(e) = fs::create_dir_all(parent)
    {
        warn!(dir = ?parent, error = %e, "config_dir_create_failed");
        return (
            config,
            ConfigLoadStatus::Error(format!("Could not create config directory: {}", e)),
        );
    }

    let toml_content = match toml::to_string_pretty(&config) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "config_serialize_failed");
            return (
                config,
                ConfigLoadStatus::Error(format!("Serialization error: {}", e)),
            );
        }
    };

    match fs::write(config_path, &toml_content) {
        Ok(()) => {
            info!(path = ?config_path, "config_created");
            (config, ConfigLoadStatus::Created)
        }
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            warn!(path = ?config_path, "config_create_permission_denied");
            (
                config,
                ConfigLoadStatus::Error("Permission denied creating config".to_string()),
            )
        }
        Err(e) => {
            warn!(path = ?config_path, error = %e, "config_write_failed");
            (
                config,
                ConfigLoadStatus::Error(format!("Write error: {}", e)),
            )
        }
    }
}

fn apply_env_overrides(config: Config) -> Config {
    apply_overrides_from(config, |key| env::var(key).ok())
}

/// Applies `AGENT_CHUNKS_*` overrides read through `lookup`.
fn apply_overrides_from(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(level) = lookup("AGENT_CHUNKS_LOG") {
        debug!("Overriding logging.level from AGENT_CHUNKS_LOG");
        config.logging.level = level;
    }

    if let Some(value) = lookup("AGENT_CHUNKS_EMIT_UUID") {
        debug!("Overriding transform.emit_sdk_message_uuid from AGENT_CHUNKS_EMIT_UUID");
        config.transform.emit_sdk_message_uuid = parse_flag(&value);
    }

    if let Some(value) = lookup("AGENT_CHUNKS_OLLAMA") {
        debug!("Overriding transform.is_using_ollama from AGENT_CHUNKS_OLLAMA");
        config.transform.is_using_ollama = parse_flag(&value);
    }

    config
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}
