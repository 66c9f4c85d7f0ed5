use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{APP_DIR_NAME, DEFAULT_PRINT_COMMAND};
use crate::error::{Result, StoreError};
use crate::models::PeerId;

/// Store configuration, loadable from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Root holding one directory per conversation
    pub conversation_path: PathBuf,

    /// Scratch space for printed paper messages
    pub tmp_path: PathBuf,

    /// Where saved paper messages are written
    pub downloads_path: PathBuf,

    /// Our own delivery destination, used as the source of outbound messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_destination: Option<PeerId>,

    /// Retry failed direct sends through the propagation relay
    #[serde(default = "default_true")]
    pub try_propagation_on_fail: bool,

    /// Peers whose announces are dropped
    #[serde(default)]
    pub ignored_peers: Vec<PeerId>,

    #[serde(default = "default_print_command")]
    pub print_command: String,
}

fn default_true() -> bool {
    true
}

fn default_print_command() -> String {
    DEFAULT_PRINT_COMMAND.to_string()
}

impl StoreConfig {
    /// Lay out all storage paths under `data_dir`.
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            conversation_path: data_dir.join("storage").join("conversations"),
            tmp_path: data_dir.join("storage").join("tmp"),
            downloads_path: dirs::download_dir().unwrap_or_else(|| data_dir.join("downloads")),
            local_destination: None,
            try_propagation_on_fail: true,
            ignored_peers: Vec::new(),
            print_command: default_print_command(),
        }
    }

    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            StoreError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Create every directory the store writes into.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.conversation_path, &self.tmp_path, &self.downloads_path] {
            std::fs::create_dir_all(dir).map_err(|e| StoreError::fs(dir, e))?;
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .unwrap_or_else(|| PathBuf::from(format!("{}_data", APP_DIR_NAME)));
        Self::new(data_dir)
    }
}
