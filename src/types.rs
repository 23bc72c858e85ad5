use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEL_COMMAND;
use crate::constants::SET_COMMAND;
use crate::ProtocolError;

/// Ordered `(field, value)` pairs of one entry, in caller write order.
pub type FieldValues = Vec<(String, String)>;

/// What a change event does to its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyOperation {
    /// Upsert the entry with the carried field set
    Set,
    /// Remove the whole entry
    Del,
}

impl KeyOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyOperation::Set => SET_COMMAND,
            KeyOperation::Del => DEL_COMMAND,
        }
    }
}

impl fmt::Display for KeyOperation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyOperation {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(SET_COMMAND) {
            Ok(KeyOperation::Set)
        } else if s.eq_ignore_ascii_case(DEL_COMMAND) {
            Ok(KeyOperation::Del)
        } else {
            Err(ProtocolError::InvalidOperation(s.to_string()))
        }
    }
}

/// One change event: `(key, operation, fields)`; fields are empty for `Del`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyOpFieldValues {
    pub key: String,
    pub operation: KeyOperation,
    pub field_values: FieldValues,
}

impl KeyOpFieldValues {
    pub fn set(
        key: impl Into<String>,
        field_values: FieldValues,
    ) -> Self {
        Self {
            key: key.into(),
            operation: KeyOperation::Set,
            field_values,
        }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            operation: KeyOperation::Del,
            field_values: Vec::new(),
        }
    }

    /// Value of `field`, if the event carries it.
    pub fn field(
        &self,
        field: &str,
    ) -> Option<&str> {
        self.field_values
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value.as_str())
    }
}

/// Message delivered by the one-shot notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub operation: String,
    pub data: String,
    pub field_values: FieldValues,
}

/// Flattens the batches returned by several consumers' `pops()` into one
/// sequence, keeping batch order and the order inside each batch.
pub fn flatten_pops<I>(batches: I) -> Vec<KeyOpFieldValues>
where
    I: IntoIterator<Item = Vec<KeyOpFieldValues>>,
{
    batches.into_iter().flatten().collect()
}

/// Collapses repeated field names: the first position is kept and the last
/// value wins.
pub(crate) fn normalize_field_values(field_values: FieldValues) -> FieldValues {
    let mut out: FieldValues = Vec::with_capacity(field_values.len());
    for (name, value) in field_values {
        merge_field(&mut out, name, value);
    }
    out
}

/// Hash-set semantics for one field: update in place or append.
pub(crate) fn merge_field(
    row: &mut FieldValues,
    name: String,
    value: String,
) {
    match row.iter_mut().find(|(n, _)| *n == name) {
        Some(slot) => slot.1 = value,
        None => row.push((name, value)),
    }
}
