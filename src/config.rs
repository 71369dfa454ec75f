use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub mongo_uri: String,
    pub database_name: String,
    /// Interface whose IPv4 address identifies this host across runs.
    pub interface: String,
    #[serde(default = "default_host_type")]
    pub host_type: String,
    #[serde(default = "default_disk_mount")]
    pub disk_mount: String,
    #[serde(default = "default_temp_disk_device")]
    pub temp_disk_device: String,
    #[serde(default = "default_disk_temp_command")]
    pub disk_temp_command: String,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default)]
    pub update_check: UpdateCheckConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpdateCheckConfig {
    #[serde(default = "default_update_url")]
    pub url: String,
    #[serde(default = "default_update_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for UpdateCheckConfig {
    fn default() -> Self {
        Self {
            url: default_update_url(),
            timeout_ms: default_update_timeout_ms(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("config validation error: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mongo_uri.trim().is_empty() {
            return Err(ConfigError::Validation(
                "mongo_uri must not be empty".to_string(),
            ));
        }
        if !self.mongo_uri.starts_with("mongodb://")
            && !self.mongo_uri.starts_with("mongodb+srv://")
        {
            return Err(ConfigError::Validation(
                "mongo_uri must start with mongodb:// or mongodb+srv://".to_string(),
            ));
        }
        if self.database_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database_name must not be empty".to_string(),
            ));
        }
        if self.interface.trim().is_empty() {
            return Err(ConfigError::Validation(
                "interface must not be empty".to_string(),
            ));
        }
        if self.disk_mount.trim().is_empty() {
            return Err(ConfigError::Validation(
                "disk_mount must not be empty".to_string(),
            ));
        }
        if self.disk_temp_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "disk_temp_command must not be empty".to_string(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "command_timeout_ms must be > 0".to_string(),
            ));
        }
        if self.update_check.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "update_check.url must not be empty".to_string(),
            ));
        }
        if self.update_check.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "update_check.timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn default_host_type() -> String {
    "Server_one".to_string()
}

fn default_disk_mount() -> String {
    "/".to_string()
}

fn default_temp_disk_device() -> String {
    "sda".to_string()
}

fn default_disk_temp_command() -> String {
    "disktemp.sh".to_string()
}

const fn default_command_timeout_ms() -> u64 {
    5000
}

fn default_update_url() -> String {
    "https://changelogs.ubuntu.com/meta-release".to_string()
}

const fn default_update_timeout_ms() -> u64 {
    10_000
}
