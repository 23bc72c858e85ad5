//! Configuration for the store connection, channels and select loop.
//!
//! Sources are merged in order, later ones winning:
//! 1. Defaults from code
//! 2. File named by the `CONFIG_PATH` environment variable
//! 3. Environment variables with the `STATEBUS__` prefix
//!
//! Loading never validates; call [`StateBusConfig::validate`] once all
//! overrides are applied.

mod retry;
mod select;
mod store;
mod table;
pub use retry::*;
pub use select::*;
pub use store::*;
pub use table::*;


use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

const ENV_PREFIX: &str = "STATEBUS";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct StateBusConfig {
    /// Which store backend to open and how
    #[serde(default)]
    pub store: StoreConfig,
    /// Naming and draining parameters shared by every channel
    #[serde(default)]
    pub table: TableConfig,
    /// Select loop behaviour
    #[serde(default)]
    pub select: SelectConfig,
    /// Retry policies for transient store conditions
    #[serde(default)]
    pub retry: RetryPolicies,
}

impl StateBusConfig {
    /// Loads defaults, then `CONFIG_PATH`, then `STATEBUS__*` variables.
    ///
    /// ```ignore
    /// std::env::set_var("STATEBUS__TABLE__SEPARATOR", "|");
    /// let cfg = StateBusConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Layers another file (and the environment again) on top of `self`.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    pub fn validate(self) -> Result<Self> {
        self.store.validate()?;
        self.table.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}
