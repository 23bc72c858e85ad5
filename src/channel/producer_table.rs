use bytes::Bytes;
use tracing::trace;

use crate::codec::encode_message;
use crate::codec::WAKEUP_PAYLOAD;
use crate::types::normalize_field_values;
use crate::DbConnector;
use crate::FieldValues;
use crate::KeyOpFieldValues;
use crate::Result;
use crate::TableName;

/// Producer side of the ordered channel: every write becomes one queued
/// message, nothing is compacted.
#[derive(Debug, Clone)]
pub struct ProducerTable {
    db: DbConnector,
    name: TableName,
}

impl ProducerTable {
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

    pub fn set(
        &self,
        key: &str,
        field_values: &[(String, String)],
    ) -> Result<()> {
        self.enqueue(&[KeyOpFieldValues::set(
            key,
            normalize_field_values(field_values.to_vec()),
        )])
    }

    pub fn del(
        &self,
        key: &str,
    ) -> Result<()> {
        self.enqueue(&[KeyOpFieldValues::del(key)])
    }

    pub fn set_batch(
        &self,
        entries: &[(String, FieldValues)],
    ) -> Result<()> {
        let events: Vec<KeyOpFieldValues> = entries
            .iter()
            .map(|(key, fv)| KeyOpFieldValues::set(key.clone(), normalize_field_values(fv.clone())))
            .collect();
        self.enqueue(&events)
    }

    /// One `Del` message per key, in order.
    pub fn del_batch(
        &self,
        keys: &[String],
    ) -> Result<()> {
        let events: Vec<KeyOpFieldValues> = keys.iter().map(KeyOpFieldValues::del).collect();
        self.enqueue(&events)
    }

    /// Messages still waiting for a consumer.
    pub fn queued(&self) -> Result<usize> {
        self.db.queue_len(&self.name.queue())
    }

    fn enqueue(
        &self,
        events: &[KeyOpFieldValues],
    ) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        let messages = events.iter().map(encode_message).collect::<Result<Vec<_>>>()?;
        let queue = self.name.queue();
        let channel = self.name.channel();

        self.db.atomically("QUEUE_WRITE", &mut |txn| {
            for message in &messages {
                txn.queue_push(&queue, message.clone())?;
                txn.publish(&channel, Bytes::from_static(WAKEUP_PAYLOAD));
            }
            Ok(())
        })?;
        trace!(table = self.name.name(), messages = messages.len(), "Messages queued");
        Ok(())
    }
}
