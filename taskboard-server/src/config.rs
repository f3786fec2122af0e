/// Configuration for the taskboard server.
/// Reads server.json from ~/.config/taskboard/server.json (or platform equivalent).
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use taskboard_core::reconcile::ListDropPolicy;

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "TASKBOARD_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Snapshot file; `<data_dir>/taskboard/store.json` when unset.
    #[serde(default)]
    pub data_file: Option<String>,
    /// Keep everything in memory and never write a snapshot.
    #[serde(default)]
    pub in_memory: bool,
    /// Placement advertised to clients for cards dropped onto a list.
    #[serde(default)]
    pub drop_policy: ListDropPolicy,
}

fn default_port() -> u16 {
    5000
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            data_file: None,
            in_memory: false,
            drop_policy: ListDropPolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn data_path(&self) -> PathBuf {
        match &self.data_file {
            Some(file) => PathBuf::from(file),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("taskboard")
                .join("store.json"),
        }
    }
}

/// Config path: `$TASKBOARD_CONFIG`, else ~/.config/taskboard/server.json
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskboard")
        .join("server.json")
}

/// Load config from path. Returns defaults if the file is missing or malformed.
pub fn load_config(path: &Path) -> ServerConfig {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!(target: "taskboard.config", "Failed to parse config {}: {}", path.display(), e);
            ServerConfig::default()
        }),
        Err(_) => {
            log::info!(target: "taskboard.config", "No config at {}, using defaults", path.display());
            ServerConfig::default()
        }
    }
}
