//! Config file location and loading.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Default config file name within the config directory.
const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default SQLite file name within the config directory.
const DB_FILE_NAME: &str = "chatrelay.db";

/// Resolve the ChatRelay state directory.
/// Priority: `CHATRELAY_HOME` env > `~/.chatrelay/` > `./.chatrelay`
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CHATRELAY_HOME") {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".chatrelay"))
        .unwrap_or_else(|| PathBuf::from(".chatrelay"))
}

/// Resolve the config file path.
/// Priority: explicit path > `CHATRELAY_CONFIG` env > `<config dir>/config.yaml`
pub fn config_file_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("CHATRELAY_CONFIG") {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    config_dir().join(CONFIG_FILE_NAME)
}

/// Default database location when `storage.db_path` is unset.
pub fn default_db_path() -> PathBuf {
    config_dir().join(DB_FILE_NAME)
}

/// Read the YAML config into a JSON value tree for further processing.
///
/// A missing file yields an empty object, so every section takes its defaults.
pub async fn load_raw_config(path: &Path) -> Result<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "Config file does not exist; using defaults");
        return Ok(Value::Object(Default::default()));
    }

    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let value: Value = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse config YAML at: {}", path.display()))?;

    info!(path = %path.display(), "Loaded config");
    // An empty file parses to null.
    Ok(match value {
        Value::Null => Value::Object(Default::default()),
        other => other,
    })
}
