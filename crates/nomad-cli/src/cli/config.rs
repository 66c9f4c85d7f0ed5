use std::path::Path;

use anyhow::{Context, Result};
use nomad_core::StoreConfig;

/// Build the store configuration from command line options.
///
/// A `--config` file is read first (falling back to the platform data
/// directory). A `--root` directory then relocates the conversation and temp
/// paths while keeping the rest of the file's settings.
pub fn resolve_config(config_path: Option<&Path>, root: Option<&Path>) -> Result<StoreConfig> {
    let mut config = match config_path {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => StoreConfig::default(),
    };

    if let Some(root) = root {
        let rooted = StoreConfig::new(root);
        config.conversation_path = rooted.conversation_path;
        config.tmp_path = rooted.tmp_path;
    }

    Ok(config)
}
