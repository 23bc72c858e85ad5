use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Store backend selection
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store shared by the handles of one process
    #[default]
    Memory,
    /// sled database on local disk
    Sled,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Only read when `backend = "sled"`
    #[serde(default)]
    pub sled: SledConfig,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend == StoreBackend::Sled {
            self.sled.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SledConfig {
    /// Database directory
    #[serde(default = "default_sled_path")]
    pub path: PathBuf,

    /// Page cache size in bytes
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Background flush interval in milliseconds (0 disables it)
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: u64,
}

impl Default for SledConfig {
    fn default() -> Self {
        Self {
            path: default_sled_path(),
            cache_capacity: default_cache_capacity(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl SledConfig {
    fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "store.sled.path cannot be empty".to_string(),
            )));
        }
        if self.cache_capacity == 0 {
            return Err(Error::Config(ConfigError::Message(
                "store.sled.cache_capacity must be greater than 0".to_string(),
            )));
        }
        Ok(())
    }
}

fn default_sled_path() -> PathBuf {
    PathBuf::from("./db/statebus")
}
fn default_cache_capacity() -> u64 {
    64 * 1024 * 1024
}
fn default_flush_every_ms() -> u64 {
    500
}
