use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IoResultExt, Result};

fn default_block_size() -> usize {
    1024 * 1024
}

/// store configuration, kept in config.toml next to the blocks
///
/// the engine takes this as an explicit value everywhere; there is no
/// process-wide configuration state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// identity of the backed-up host; the hostname when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    /// target size of one stored block, in bytes
    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

impl Config {
    /// load config from file
    pub fn load(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path).with_path(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).with_path(path)?;
        Ok(())
    }

    /// host id to use: the configured one, else the hostname
    pub fn effective_host_id(&self) -> String {
        if let Some(host_id) = &self.host_id {
            return host_id.clone();
        }
        nix::unistd::gethostname()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "localhost".to_string())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host_id: None,
            block_size: default_block_size(),
        }
    }
}
