use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::error;
use tracing::trace;
use tracing::warn;

use super::requeue_front;
use crate::codec::decode_message;
use crate::codec::encode_row;
use crate::select::drain_notifications;
use crate::table::merge_row;
use crate::DbConnector;
use crate::KeyOpFieldValues;
use crate::KeyOperation;
use crate::ProtocolError;
use crate::Result;
use crate::Selectable;
use crate::StoreEvent;
use crate::StoreTxn;
use crate::Subscription;
use crate::TableName;
use crate::Topic;

/// Consumer side of the ordered channel. Every queued message is delivered
/// exactly as written and applied to the table row on the way out.
#[derive(Debug)]
pub struct ConsumerTable {
    db: DbConnector,
    name: TableName,
    subscription: Subscription,
    buffer: Mutex<VecDeque<KeyOpFieldValues>>,
    pop_batch_size: usize,
    priority: i32,
}

impl ConsumerTable {
    pub fn new(
        db: &DbConnector,
        table_name: &str,
    ) -> Result<Self> {
        Self::with_separator(db, table_name, db.separator())
    }

    pub fn with_separator(
        db: &DbConnector,
        table_name: &str,
        separator: &str,
    ) -> Result<Self> {
        let name = TableName::new(table_name, separator);
        let subscription = db.subscribe(Topic::Channel(name.channel()))?;
        Ok(Self {
            db: db.clone(),
            name,
            subscription,
            buffer: Mutex::new(VecDeque::new()),
            pop_batch_size: db.pop_batch_size(),
            priority: 0,
        })
    }

    pub fn with_priority(
        mut self,
        priority: i32,
    ) -> Self {
        self.priority = priority;
        self
    }

    pub fn name(&self) -> &TableName {
        &self.name
    }

    /// Exactly one queued message, or `None` when the queue is empty.
    pub fn pop(&self) -> Result<Option<KeyOpFieldValues>> {
        if let Some(event) = self.buffer.lock().pop_front() {
            return Ok(Some(event));
        }
        let mut chunk = self.pop_chunk(1)?;
        Ok(chunk.pop_front())
    }

    /// Every message queued right now, in write order.
    pub fn pops(&self) -> Result<Vec<KeyOpFieldValues>> {
        let mut out: Vec<KeyOpFieldValues> = self.buffer.lock().drain(..).collect();
        loop {
            let chunk = match self.pop_chunk(self.pop_batch_size) {
                Ok(chunk) => chunk,
                Err(e) => {
                    requeue_front(&self.buffer, out);
                    return Err(e);
                }
            };
            let full = !chunk.is_empty() && chunk.len() == self.pop_batch_size;
            out.extend(chunk);
            if !full {
                break;
            }
        }
        Ok(out)
    }

    fn pop_chunk(
        &self,
        limit: usize,
    ) -> Result<VecDeque<KeyOpFieldValues>> {
        let queue = self.name.queue();
        let mut popped = VecDeque::new();
        let mut poisoned: Vec<String> = Vec::new();

        self.db.atomically("QUEUE_POP", &mut |txn| {
            popped.clear();
            poisoned.clear();
            for _ in 0..limit {
                let Some(raw) = txn.queue_pop(&queue)? else {
                    break;
                };
                match decode_message(&raw) {
                    Ok(event) => {
                        apply_to_table(txn, &self.name, &event)?;
                        popped.push_back(event);
                    }
                    Err(e) => poisoned.push(e.to_string()),
                }
            }
            Ok(())
        })?;

        trace!(table = self.name.name(), popped = popped.len(), "Queued messages popped");
        if poisoned.is_empty() {
            return Ok(popped);
        }

        for reason in &poisoned {
            error!(table = self.name.name(), "Dropped undecodable queued message: {}", reason);
        }
        self.buffer.lock().extend(popped);
        Err(ProtocolError::Malformed {
            origin: queue,
            detail: poisoned.swap_remove(0),
        }
        .into())
    }
}

/// Mirrors one message into the table row: `Set` merges fields, `Del`
/// removes the row.
fn apply_to_table(
    txn: &mut dyn StoreTxn,
    name: &TableName,
    event: &KeyOpFieldValues,
) -> Result<()> {
    let table_key = name.key(&event.key);
    match event.operation {
        KeyOperation::Del => {
            txn.take(&table_key)?;
            Ok(())
        }
        KeyOperation::Set => {
            let fields = event.field_values.iter().cloned();
            if merge_row(txn, &table_key, fields).is_err() {
                warn!(key = %table_key, "Table row unreadable, overwriting");
                txn.put(&table_key, encode_row(&event.field_values)?)?;
            }
            Ok(())
        }
    }
}

impl Selectable for ConsumerTable {
    fn notifications(&self) -> &Receiver<StoreEvent> {
        self.subscription.receiver()
    }

    fn read_data(&self) -> Result<()> {
        drain_notifications(self.subscription.receiver(), self.name.name(), |_| {})?;
        Ok(())
    }

    fn has_data(&self) -> Result<bool> {
        if !self.buffer.lock().is_empty() {
            return Ok(true);
        }
        Ok(self.db.queue_len(&self.name.queue())? > 0)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
