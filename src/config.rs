use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::diagnostics::DEFAULT_CAPACITY;

/// One event a script file answers, registered right after the file loads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntryConfig {
    /// Path relative to the data directory.
    pub file: String,
    #[serde(default)]
    pub events: Vec<String>,
}

/// A named script host and the files it loads, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    #[serde(default)]
    pub scripts: Vec<ScriptEntryConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "BridgeConfig::default_data_dir")]
    pub data_dir: PathBuf,
    /// Bootstrap unit run in every host before its scripts, relative to `data_dir`.
    #[serde(default = "BridgeConfig::default_bootstrap")]
    pub bootstrap: String,
    #[serde(default = "BridgeConfig::default_log_filter")]
    pub log_filter: String,
    #[serde(default = "BridgeConfig::default_diagnostic_capacity")]
    pub diagnostic_capacity: usize,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            data_dir: Self::default_data_dir(),
            bootstrap: Self::default_bootstrap(),
            log_filter: Self::default_log_filter(),
            diagnostic_capacity: Self::default_diagnostic_capacity(),
            interfaces: Vec::new(),
        }
    }
}

impl BridgeConfig {
    fn default_data_dir() -> PathBuf {
        PathBuf::from("data")
    }

    fn default_bootstrap() -> String {
        "global.rhai".to_string()
    }

    fn default_log_filter() -> String {
        "info".to_string()
    }

    const fn default_diagnostic_capacity() -> usize {
        DEFAULT_CAPACITY
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(target: "bridge", "Config load error: {err:?}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn bootstrap_path(&self) -> PathBuf {
        self.data_dir.join(&self.bootstrap)
    }

    pub fn script_path(&self, entry: &ScriptEntryConfig) -> PathBuf {
        self.data_dir.join(&entry.file)
    }
}
