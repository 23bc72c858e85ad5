use std::collections::BTreeMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;

use crate::codec::decode_row;
use crate::codec::encode_row;
use crate::codec::WAKEUP_PAYLOAD;
use crate::types::normalize_field_values;
use crate::DbConnector;
use crate::Error;
use crate::FieldValues;
use crate::KeyOpFieldValues;
use crate::KeyOperation;
use crate::Result;
use crate::StoreTxn;
use crate::TableName;

#[derive(Debug, Default)]
struct ProducerState {
    buffered: bool,
    pending: Vec<KeyOpFieldValues>,
    /// Desired final content of the table while a temp view is open
    temp_view: Option<BTreeMap<String, FieldValues>>,
}

/// Producer side of the compacting channel.
///
/// Each write replaces the key's staging row (or removes it for `del`) and
/// marks the key pending, in one store transaction. A consumer sees one
/// event per pending key carrying only the latest write.
#[derive(Debug)]
pub struct ProducerStateTable {
    db: DbConnector,
    name: TableName,
    state: Mutex<ProducerState>,
}

impl ProducerStateTable {
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
            state: Mutex::new(ProducerState::default()),
        }
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    pub fn set(
        &self,
        key: &str,
        field_values: &[(String, String)],
    ) -> Result<()> {
        self.submit(vec![KeyOpFieldValues::set(
            key,
            normalize_field_values(field_values.to_vec()),
        )])
    }

    pub fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        self.submit(vec![KeyOpFieldValues::del(key)])
    }

    pub fn set_batch(
        &self,
        entries: &[(String, FieldValues)],
    ) -> Result<()> {
        self.submit(
            entries
                .iter()
                .map(|(key, fv)| KeyOpFieldValues::set(key.clone(), normalize_field_values(fv.clone())))
                .collect(),
        )
    }

    pub fn del_batch(
        &self,
        keys: &[String],
    ) -> Result<()> {
        self.submit(keys.iter().map(KeyOpFieldValues::del).collect())
    }

    /// Buffered writes wait for [`flush`](Self::flush). Turning buffering
    /// off does not flush.
    pub fn set_buffered(
        &self,
        buffered: bool,
    ) {
        self.state.lock().buffered = buffered;
    }

    /// Commits every buffered write in one transaction.
    pub fn flush(&self) -> Result<()> {
        let pending = std::mem::take(&mut self.state.lock().pending);
        if pending.is_empty() {
            return Ok(());
        }
        let count = pending.len();
        self.commit("FLUSH", &pending)?;
        debug!(table = self.name.name(), count, "Buffered writes flushed");
        Ok(())
    }

    /// Keys currently pending for consumers.
    pub fn count(&self) -> Result<usize> {
        self.db.index_len(&self.name.key_set())
    }

    /// Drops every pending key and its staging row.
    pub fn clear(&self) -> Result<()> {
        let key_set = self.name.key_set();
        let mut dropped = 0;
        self.db.atomically("CLEAR", &mut |txn| {
            dropped = 0;
            while let Some(key) = txn.index_pop(&key_set)? {
                txn.take(&self.name.staging_key(&key))?;
                dropped += 1;
            }
            Ok(())
        })?;
        debug!(table = self.name.name(), dropped, "Pending keys cleared");
        Ok(())
    }

    /// Starts collecting writes into a view of the complete desired table.
    /// Opening a view while one is open discards the earlier one.
    pub fn create_temp_view(&self) {
        let mut state = self.state.lock();
        if state.temp_view.replace(BTreeMap::new()).is_some() {
            debug!(table = self.name.name(), "Previous temp view discarded");
        }
    }

    /// Replaces the table content with the view using the fewest changes:
    /// keys missing from the view are deleted, keys whose fields differ are
    /// set, identical keys are left alone.
    pub fn apply_temp_view(&self) -> Result<()> {
        let view = self
            .state
            .lock()
            .temp_view
            .take()
            .ok_or_else(|| Error::InvalidState(format!("{}: no temp view to apply", self.name.name())))?;

        let prefix = self.name.prefix();
        let mut ops = Vec::new();
        for full_key in self.db.keys_with_prefix(&prefix)? {
            let Some(key) = self.name.strip(&full_key) else {
                continue;
            };
            if !view.contains_key(key) {
                ops.push(KeyOpFieldValues::del(key));
            }
        }
        let deletes = ops.len();
        for (key, fv) in view {
            let current = match self.db.get(&self.name.key(&key))? {
                Some(raw) => decode_row(&raw).ok(),
                None => None,
            };
            if current.as_ref() != Some(&fv) {
                ops.push(KeyOpFieldValues::set(key, fv));
            }
        }

        debug!(
            table = self.name.name(),
            deletes,
            sets = ops.len() - deletes,
            "Applying temp view"
        );
        self.commit("APPLY_VIEW", &ops)
    }

    fn submit(
        &self,
        ops: Vec<KeyOpFieldValues>,
    ) -> Result<()> {
        {
            let mut state = self.state.lock();
            if let Some(view) = state.temp_view.as_mut() {
                for op in ops {
                    match op.operation {
                        KeyOperation::Set => {
                            view.insert(op.key, op.field_values);
                        }
                        KeyOperation::Del => {
                            view.remove(&op.key);
                        }
                    }
                }
                return Ok(());
            }
            if state.buffered {
                state.pending.extend(ops);
                return Ok(());
            }
        }
        self.commit("STATE_WRITE", &ops)
    }

    fn commit(
        &self,
        script: &str,
        ops: &[KeyOpFieldValues],
    ) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let staged = ops
            .iter()
            .map(|op| -> Result<(&str, Option<Vec<u8>>)> {
                match op.operation {
                    KeyOperation::Set => Ok((op.key.as_str(), Some(encode_row(&op.field_values)?))),
                    KeyOperation::Del => Ok((op.key.as_str(), None)),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        let key_set = self.name.key_set();
        let channel = self.name.channel();
        let mut newly_pending = 0;
        self.db.atomically(script, &mut |txn| {
            newly_pending = 0;
            for (key, row) in &staged {
                if stage(txn, &self.name, &key_set, key, row.clone())? {
                    newly_pending += 1;
                }
            }
            if newly_pending > 0 {
                txn.publish(&channel, Bytes::from_static(WAKEUP_PAYLOAD));
            }
            Ok(())
        })?;

        trace!(table = self.name.name(), writes = ops.len(), newly_pending, "Compacted writes committed");
        Ok(())
    }
}

/// Replaces or removes the staging row and marks the key pending. Returns
/// whether the key was not pending before.
fn stage(
    txn: &mut dyn StoreTxn,
    name: &TableName,
    key_set: &str,
    key: &str,
    row: Option<Vec<u8>>,
) -> Result<bool> {
    let staging_key = name.staging_key(key);
    match row {
        Some(raw) => txn.put(&staging_key, raw)?,
        None => {
            txn.take(&staging_key)?;
        }
    }
    txn.index_add(key_set, key)
}
