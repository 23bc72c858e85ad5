use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::error;
use tracing::trace;

use super::requeue_front;
use crate::codec::decode_row;
use crate::select::drain_notifications;
use crate::DbConnector;
use crate::KeyOpFieldValues;
use crate::ProtocolError;
use crate::Result;
use crate::Selectable;
use crate::StoreEvent;
use crate::Subscription;
use crate::TableName;
use crate::Topic;

/// Consumer side of the compacting channel.
///
/// Popping a key atomically removes its pending marker and staging row and
/// mirrors the change into the table row, so the table always reflects
/// what this consumer has been handed.
#[derive(Debug)]
pub struct ConsumerStateTable {
    db: DbConnector,
    name: TableName,
    subscription: Subscription,
    buffer: Mutex<VecDeque<KeyOpFieldValues>>,
    pop_batch_size: usize,
    priority: i32,
}

impl ConsumerStateTable {
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

    /// Oldest pending change, or `None` when nothing is pending.
    pub fn pop(&self) -> Result<Option<KeyOpFieldValues>> {
        if let Some(event) = self.buffer.lock().pop_front() {
            return Ok(Some(event));
        }
        let mut chunk = self.pop_chunk(self.pop_batch_size)?;
        let first = chunk.pop_front();
        self.buffer.lock().extend(chunk);
        Ok(first)
    }

    /// Every change pending right now, oldest first.
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

    /// Takes up to `limit` pending keys in one transaction.
    ///
    /// A staging row that cannot be decoded is still consumed. The good
    /// events of the chunk are kept in the buffer and the failure reported.
    fn pop_chunk(
        &self,
        limit: usize,
    ) -> Result<VecDeque<KeyOpFieldValues>> {
        let key_set = self.name.key_set();
        let mut popped = VecDeque::new();
        let mut poisoned: Vec<(String, String)> = Vec::new();

        self.db.atomically("STATE_POP", &mut |txn| {
            popped.clear();
            poisoned.clear();
            for _ in 0..limit {
                let Some(key) = txn.index_pop(&key_set)? else {
                    break;
                };
                let table_key = self.name.key(&key);
                match txn.take(&self.name.staging_key(&key))? {
                    None => {
                        txn.take(&table_key)?;
                        popped.push_back(KeyOpFieldValues::del(key));
                    }
                    Some(raw) => match decode_row(&raw) {
                        Ok(field_values) => {
                            txn.put(&table_key, raw)?;
                            popped.push_back(KeyOpFieldValues::set(key, field_values));
                        }
                        Err(e) => poisoned.push((key, e.to_string())),
                    },
                }
            }
            Ok(())
        })?;

        trace!(table = self.name.name(), popped = popped.len(), "Pending keys popped");
        if poisoned.is_empty() {
            return Ok(popped);
        }

        for (key, reason) in &poisoned {
            error!(table = self.name.name(), %key, "Dropped undecodable staged row: {}", reason);
        }
        self.buffer.lock().extend(popped);
        let (key, reason) = poisoned.swap_remove(0);
        Err(ProtocolError::Malformed {
            origin: self.name.staging_key(&key),
            detail: reason,
        }
        .into())
    }
}

impl Selectable for ConsumerStateTable {
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
        Ok(self.db.index_len(&self.name.key_set())? > 0)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
