use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::KeyValueStore;
use super::KeyspaceOp;
use super::PubSubHub;
use super::StoreTxn;
use super::Subscription;
use super::Topic;
use super::TxnBody;
use crate::constants::LOADING_REASON;
use crate::Result;
use crate::StoreError;

#[derive(Debug, Default)]
struct KeyIndex {
    order: VecDeque<String>,
    members: HashSet<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    rows: BTreeMap<String, Vec<u8>>,
    indexes: HashMap<String, KeyIndex>,
    queues: HashMap<String, VecDeque<Vec<u8>>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<MemoryState>,
    hub: Arc<PubSubHub>,
    loading: AtomicBool,
}

/// In-process store. Handles obtained through [`MemoryStore::connect`] share
/// the same data and pub/sub hub but can be closed independently.
#[derive(Debug)]
pub struct MemoryStore {
    shared: Arc<Shared>,
    conn: u64,
    closed: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let hub = PubSubHub::new();
        let conn = hub.register_connection();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(MemoryState::default()),
                hub,
                loading: AtomicBool::new(false),
            }),
            conn,
            closed: AtomicBool::new(false),
        }
    }

    /// Opens another handle onto the same data.
    pub fn connect(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            conn: self.shared.hub.register_connection(),
            closed: AtomicBool::new(false),
        }
    }

    /// Closes this handle. Later calls fail with a connection error and its
    /// subscriptions are disconnected.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.shared.hub.drop_connection(self.conn);
            debug!(conn = self.conn, "Memory store handle closed");
        }
    }

    /// While set, every data command fails with a loading error.
    pub fn set_loading(
        &self,
        loading: bool,
    ) {
        self.shared.loading.store(loading, Ordering::Release);
    }

    fn check(
        &self,
        command: &str,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connection(format!("{command}: handle {} is closed", self.conn)).into());
        }
        if self.shared.loading.load(Ordering::Acquire) {
            return Err(StoreError::Loading {
                command: command.to_string(),
                reason: LOADING_REASON.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn ping(&self) -> Result<()> {
        self.check("PING")
    }

    fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.check("HGETALL")?;
        Ok(self.shared.state.lock().rows.get(key).cloned())
    }

    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>> {
        self.check("KEYS")?;
        let state = self.shared.state.lock();
        Ok(state
            .rows
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn index_len(
        &self,
        index: &str,
    ) -> Result<usize> {
        self.check("SCARD")?;
        Ok(self.shared.state.lock().indexes.get(index).map_or(0, |i| i.order.len()))
    }

    fn queue_len(
        &self,
        queue: &str,
    ) -> Result<usize> {
        self.check("LLEN")?;
        Ok(self.shared.state.lock().queues.get(queue).map_or(0, VecDeque::len))
    }

    fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> Result<usize> {
        self.check("PUBLISH")?;
        Ok(self.shared.hub.publish(channel, payload))
    }

    fn subscribe(
        &self,
        topic: Topic,
    ) -> Result<Subscription> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connection(format!("SUBSCRIBE: handle {} is closed", self.conn)).into());
        }
        Ok(self.shared.hub.subscribe(self.conn, topic))
    }

    fn atomically(
        &self,
        script: &str,
        body: &mut TxnBody<'_>,
    ) -> Result<()> {
        self.check(script)?;
        let mut state = self.shared.state.lock();
        let mut txn = MemoryTxn {
            state: &mut *state,
            undo: Vec::new(),
            keyspace: Vec::new(),
            published: Vec::new(),
        };

        if let Err(e) = body(&mut txn as &mut dyn StoreTxn) {
            let undone = txn.undo.len();
            txn.rollback();
            warn!(script, undone, "Transaction rolled back: {:?}", e);
            return Err(e);
        }

        let MemoryTxn {
            keyspace, published, ..
        } = txn;
        for (key, op) in keyspace {
            self.shared.hub.notify_keyspace(&key, op);
        }
        for (channel, payload) in published {
            self.shared.hub.publish(&channel, payload);
        }
        trace!(script, "Transaction committed");
        Ok(())
    }
}

enum Undo {
    Row(String, Option<Vec<u8>>),
    IndexAdded(String),
    IndexPopped(String, String),
    QueuePushed(String),
    QueuePopped(String, Vec<u8>),
}

struct MemoryTxn<'a> {
    state: &'a mut MemoryState,
    undo: Vec<Undo>,
    keyspace: Vec<(String, KeyspaceOp)>,
    published: Vec<(String, Bytes)>,
}

impl MemoryTxn<'_> {
    fn rollback(&mut self) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Row(key, Some(old)) => {
                    self.state.rows.insert(key, old);
                }
                Undo::Row(key, None) => {
                    self.state.rows.remove(&key);
                }
                Undo::IndexAdded(index) => {
                    if let Some(i) = self.state.indexes.get_mut(&index) {
                        if let Some(member) = i.order.pop_back() {
                            i.members.remove(&member);
                        }
                    }
                }
                Undo::IndexPopped(index, member) => {
                    let i = self.state.indexes.entry(index).or_default();
                    i.members.insert(member.clone());
                    i.order.push_front(member);
                }
                Undo::QueuePushed(queue) => {
                    if let Some(q) = self.state.queues.get_mut(&queue) {
                        q.pop_back();
                    }
                }
                Undo::QueuePopped(queue, message) => {
                    self.state.queues.entry(queue).or_default().push_front(message);
                }
            }
        }
        self.keyspace.clear();
        self.published.clear();
    }
}

impl StoreTxn for MemoryTxn<'_> {
    fn get(
        &mut self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.state.rows.get(key).cloned())
    }

    fn put(
        &mut self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        let old = self.state.rows.insert(key.to_string(), value);
        self.undo.push(Undo::Row(key.to_string(), old));
        self.keyspace.push((key.to_string(), KeyspaceOp::Hset));
        Ok(())
    }

    fn take(
        &mut self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let old = self.state.rows.remove(key);
        if let Some(value) = &old {
            self.undo.push(Undo::Row(key.to_string(), Some(value.clone())));
            self.keyspace.push((key.to_string(), KeyspaceOp::Del));
        }
        Ok(old)
    }

    fn index_add(
        &mut self,
        index: &str,
        member: &str,
    ) -> Result<bool> {
        let i = self.state.indexes.entry(index.to_string()).or_default();
        if !i.members.insert(member.to_string()) {
            return Ok(false);
        }
        i.order.push_back(member.to_string());
        self.undo.push(Undo::IndexAdded(index.to_string()));
        Ok(true)
    }

    fn index_pop(
        &mut self,
        index: &str,
    ) -> Result<Option<String>> {
        let Some(i) = self.state.indexes.get_mut(index) else {
            return Ok(None);
        };
        let Some(member) = i.order.pop_front() else {
            return Ok(None);
        };
        i.members.remove(&member);
        self.undo.push(Undo::IndexPopped(index.to_string(), member.clone()));
        Ok(Some(member))
    }

    fn queue_push(
        &mut self,
        queue: &str,
        message: Vec<u8>,
    ) -> Result<()> {
        self.state.queues.entry(queue.to_string()).or_default().push_back(message);
        self.undo.push(Undo::QueuePushed(queue.to_string()));
        Ok(())
    }

    fn queue_pop(
        &mut self,
        queue: &str,
    ) -> Result<Option<Vec<u8>>> {
        let message = self.state.queues.get_mut(queue).and_then(VecDeque::pop_front);
        if let Some(m) = &message {
            self.undo.push(Undo::QueuePopped(queue.to_string(), m.clone()));
        }
        Ok(message)
    }

    fn publish(
        &mut self,
        channel: &str,
        payload: Bytes,
    ) {
        self.published.push((channel.to_string(), payload));
    }
}
