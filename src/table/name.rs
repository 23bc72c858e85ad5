use crate::constants::CHANNEL_SUFFIX;
use crate::constants::KEY_SET_SUFFIX;
use crate::constants::KEY_VALUE_OP_QUEUE_SUFFIX;
use crate::constants::STATE_TABLE_PREFIX;

/// Derives every store-side name used for one logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName {
    name: String,
    separator: String,
}

impl TableName {
    pub fn new(
        name: impl Into<String>,
        separator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            separator: separator.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// `TABLE<sep>`
    pub fn prefix(&self) -> String {
        format!("{}{}", self.name, self.separator)
    }

    /// `TABLE<sep>key`
    pub fn key(
        &self,
        key: &str,
    ) -> String {
        format!("{}{}{}", self.name, self.separator, key)
    }

    /// `_TABLE<sep>key`, where the compacting producer stages a write
    pub fn staging_key(
        &self,
        key: &str,
    ) -> String {
        format!("{STATE_TABLE_PREFIX}{}", self.key(key))
    }

    pub fn key_set(&self) -> String {
        format!("{}{KEY_SET_SUFFIX}", self.name)
    }

    pub fn channel(&self) -> String {
        format!("{}{CHANNEL_SUFFIX}", self.name)
    }

    pub fn queue(&self) -> String {
        format!("{}{KEY_VALUE_OP_QUEUE_SUFFIX}", self.name)
    }

    /// Recovers `key` from `TABLE<sep>key`.
    pub fn strip<'a>(
        &self,
        full_key: &'a str,
    ) -> Option<&'a str> {
        full_key
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix(self.separator.as_str()))
    }
}
