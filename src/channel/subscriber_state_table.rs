use std::collections::VecDeque;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::codec::decode_row;
use crate::select::drain_notifications;
use crate::store::KeyspaceOp;
use crate::DbConnector;
use crate::KeyOpFieldValues;
use crate::Result;
use crate::Selectable;
use crate::StoreEvent;
use crate::Subscription;
use crate::TableName;
use crate::Topic;

/// Change events derived from keyspace notifications on the table rows.
///
/// Anyone writing rows through a [`Table`](crate::Table) is observed; no
/// producer cooperation is needed. Notifications are not compacted, so two
/// events for one key may carry identical fields.
#[derive(Debug)]
pub struct SubscriberStateTable {
    db: DbConnector,
    name: TableName,
    subscription: Subscription,
    /// Notifications drained but not yet turned into events
    unread: Mutex<VecDeque<StoreEvent>>,
    buffer: Mutex<VecDeque<KeyOpFieldValues>>,
    priority: i32,
}

impl SubscriberStateTable {
    pub fn new(
        db: &DbConnector,
        table_name: &str,
    ) -> Result<Self> {
        Self::with_separator(db, table_name, db.separator())
    }

    /// Subscribes first and then buffers every existing row as a `Set`, so
    /// a write racing construction is seen at least once.
    pub fn with_separator(
        db: &DbConnector,
        table_name: &str,
        separator: &str,
    ) -> Result<Self> {
        let name = TableName::new(table_name, separator);
        let subscription = db.subscribe(Topic::Keyspace(name.prefix()))?;

        let mut initial = VecDeque::new();
        for full_key in db.keys_with_prefix(&name.prefix())? {
            let Some(key) = name.strip(&full_key) else {
                continue;
            };
            let Some(raw) = db.get(&full_key)? else {
                continue;
            };
            match decode_row(&raw) {
                Ok(field_values) => initial.push_back(KeyOpFieldValues::set(key, field_values)),
                Err(e) => error!(key = %full_key, "Skipping undecodable row in initial dump: {}", e),
            }
        }
        debug!(table = name.name(), rows = initial.len(), "Initial table dump buffered");

        Ok(Self {
            db: db.clone(),
            name,
            subscription,
            unread: Mutex::new(VecDeque::new()),
            buffer: Mutex::new(initial),
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

    pub fn pop(&self) -> Result<Option<KeyOpFieldValues>> {
        self.read_data()?;
        Ok(self.buffer.lock().pop_front())
    }

    pub fn pops(&self) -> Result<Vec<KeyOpFieldValues>> {
        self.read_data()?;
        Ok(self.buffer.lock().drain(..).collect())
    }

    /// Turns one keyspace notification into a change event, if it yields one.
    pub(crate) fn translate(
        &self,
        event: &StoreEvent,
    ) -> Result<Option<KeyOpFieldValues>> {
        let StoreEvent::Keyspace { key: full_key, op } = event else {
            trace!(table = self.name.name(), "Ignoring non keyspace event");
            return Ok(None);
        };
        let Some(key) = self.name.strip(full_key) else {
            warn!(table = self.name.name(), key = %full_key, "Keyspace event outside table prefix");
            return Ok(None);
        };

        match op {
            KeyspaceOp::Del => Ok(Some(KeyOpFieldValues::del(key))),
            KeyspaceOp::Hset => {
                let Some(raw) = self.db.get(full_key)? else {
                    info!(key = %full_key, "Row gone before it could be read, skipping");
                    return Ok(None);
                };
                match decode_row(&raw) {
                    Ok(field_values) => Ok(Some(KeyOpFieldValues::set(key, field_values))),
                    Err(e) => {
                        error!(key = %full_key, "Skipping undecodable row: {}", e);
                        Ok(None)
                    }
                }
            }
        }
    }
}

impl Selectable for SubscriberStateTable {
    fn notifications(&self) -> &Receiver<StoreEvent> {
        self.subscription.receiver()
    }

    /// Translates queued notifications in arrival order. A notification
    /// whose row cannot be read stays queued, together with everything
    /// after it, and is retried first on the next call.
    fn read_data(&self) -> Result<()> {
        let mut unread = self.unread.lock();
        let drained = drain_notifications(self.subscription.receiver(), self.name.name(), |event| {
            unread.push_back(event)
        });

        while let Some(event) = unread.front() {
            match self.translate(event) {
                Ok(Some(change)) => self.buffer.lock().push_back(change),
                Ok(None) => {}
                Err(e) => {
                    debug!(
                        table = self.name.name(),
                        unread = unread.len(),
                        "Keyspace events kept for retry"
                    );
                    return Err(e);
                }
            }
            unread.pop_front();
        }
        drained.map(|_| ())
    }

    fn has_data(&self) -> Result<bool> {
        Ok(!self.buffer.lock().is_empty())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
