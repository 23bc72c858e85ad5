use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_POP_BATCH_SIZE;
use crate::constants::DEFAULT_TABLE_NAME_SEPARATOR;
use crate::constants::MAX_POP_BATCH_SIZE;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TableConfig {
    /// Placed between table name and key in store keys
    #[serde(default = "default_separator")]
    pub separator: String,

    /// Keys (or queued messages) taken per atomic step by `pops()`
    #[serde(default = "default_pop_batch_size")]
    pub pop_batch_size: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            pop_batch_size: default_pop_batch_size(),
        }
    }
}

impl TableConfig {
    pub fn validate(&self) -> Result<()> {
        if self.separator.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "table.separator cannot be empty".to_string(),
            )));
        }
        if self.pop_batch_size == 0 || self.pop_batch_size > MAX_POP_BATCH_SIZE {
            return Err(Error::Config(ConfigError::Message(format!(
                "table.pop_batch_size must be within 1..={MAX_POP_BATCH_SIZE}, got {}",
                self.pop_batch_size
            ))));
        }
        Ok(())
    }
}

fn default_separator() -> String {
    DEFAULT_TABLE_NAME_SEPARATOR.to_string()
}
fn default_pop_batch_size() -> usize {
    DEFAULT_POP_BATCH_SIZE
}
