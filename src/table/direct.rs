use tracing::trace;

use super::TableName;
use crate::codec::decode_row;
use crate::codec::encode_row;
use crate::types::merge_field;
use crate::types::normalize_field_values;
use crate::DbConnector;
use crate::FieldValues;
use crate::Result;
use crate::StoreTxn;

/// Synchronous access to one logical table; the ground truth the channels
/// layer on. No delivery guarantees of its own.
#[derive(Debug, Clone)]
pub struct Table {
    db: DbConnector,
    name: TableName,
}

impl Table {
    pub fn new(
        db: &DbConnector,
        table_name: &str,
    ) -> Self {
        Self::with_separator(db, table_name, db.separator())
    }

    pub fn with_separator(
        db: &DbConnector,
        table_name: &str,
        separator: &str,
    ) -> Self {
        Self {
            db: db.clone(),
            name: TableName::new(table_name, separator),
        }
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    /// Upserts fields into the row: existing names are updated in place,
    /// new names appended.
    pub fn set(
        &self,
        key: &str,
        field_values: &[(String, String)],
    ) -> Result<()> {
        let full_key = self.name.key(key);
        let fields = normalize_field_values(field_values.to_vec());
        self.db.atomically("HSET", &mut |txn| {
            merge_row(txn, &full_key, fields.iter().cloned())
        })?;
        trace!(table = self.name.name(), key, "Row set");
        Ok(())
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Result<Option<FieldValues>> {
        match self.db.get(&self.name.key(key))? {
            Some(raw) => Ok(Some(decode_row(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn exists(
        &self,
        key: &str,
    ) -> Result<bool> {
        self.db.exists(&self.name.key(key))
    }

    pub fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        let full_key = self.name.key(key);
        self.db.atomically("DEL", &mut |txn| txn.take(&full_key).map(|_| ()))
    }

    /// Keys of this table, without the table prefix.
    pub fn get_keys(&self) -> Result<Vec<String>> {
        let prefix = self.name.prefix();
        Ok(self
            .db
            .keys_with_prefix(&prefix)?
            .into_iter()
            .filter_map(|full| full.strip_prefix(prefix.as_str()).map(str::to_string))
            .collect())
    }

    pub fn hget(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .get(key)?
            .and_then(|row| row.into_iter().find(|(name, _)| name == field).map(|(_, value)| value)))
    }

    pub fn hset(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<()> {
        self.set(key, &[(field.to_string(), value.to_string())])
    }

    /// Removes one field; the row disappears with its last field.
    pub fn hdel(
        &self,
        key: &str,
        field: &str,
    ) -> Result<()> {
        let full_key = self.name.key(key);
        self.db.atomically("HDEL", &mut |txn| {
            let Some(raw) = txn.get(&full_key)? else {
                return Ok(());
            };
            let mut row = decode_row(&raw)?;
            let before = row.len();
            row.retain(|(name, _)| name != field);
            if row.len() == before {
                return Ok(());
            }
            if row.is_empty() {
                txn.take(&full_key)?;
                Ok(())
            } else {
                txn.put(&full_key, encode_row(&row)?)
            }
        })
    }
}

/// Hash-set of `fields` into the row at `full_key` inside a transaction.
pub(crate) fn merge_row(
    txn: &mut dyn StoreTxn,
    full_key: &str,
    fields: impl IntoIterator<Item = (String, String)>,
) -> Result<()> {
    let mut row = match txn.get(full_key)? {
        Some(raw) => decode_row(&raw)?,
        None => Vec::new(),
    };
    for (name, value) in fields {
        merge_field(&mut row, name, value);
    }
    txn.put(full_key, encode_row(&row)?)
}
