//! Key-value store boundary.
//!
//! Channels only ever talk to a [`KeyValueStore`]. It offers opaque rows
//! addressed by key, FIFO key indexes (a key is present at most once), FIFO
//! message queues, pub/sub channels and keyspace notifications. Every
//! multi-step update runs inside [`KeyValueStore::atomically`], which commits
//! all of its writes and publications at once or none of them.
//!
//! Two adaptors are provided:
//! - [`MemoryStore`]: shared in-process state, cloned handles see the same data
//! - [`SledStore`]: rows, indexes and queues persisted in one sled tree
//!
//! Pub/sub delivery is in-process for both, through [`PubSubHub`].

mod memory;
mod pubsub;
mod sled_store;

pub use memory::*;
pub use pubsub::*;
pub use sled_store::*;

#[cfg(test)]
mod sled_store_test;

use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;

use bytes::Bytes;

use crate::StoreBackend;
use crate::StoreConfig;
use crate::Result;

/// What a keyspace notification reports about a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyspaceOp {
    /// Row written
    Hset,
    /// Row removed
    Del,
}

impl KeyspaceOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyspaceOp::Hset => "hset",
            KeyspaceOp::Del => "del",
        }
    }
}

impl fmt::Display for KeyspaceOp {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item delivered to a [`Subscription`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Message { channel: String, payload: Bytes },
    Keyspace { key: String, op: KeyspaceOp },
}

/// What a subscription listens to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A named pub/sub channel
    Channel(String),
    /// Keyspace notifications for every row key starting with the prefix
    Keyspace(String),
}

/// Operations available inside [`KeyValueStore::atomically`].
///
/// Writes are visible to later calls in the same transaction. Row writes
/// produce keyspace notifications and `publish` queues a message; both are
/// delivered only once the transaction commits.
pub trait StoreTxn {
    fn get(
        &mut self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    fn put(
        &mut self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<()>;

    /// Removes the row, returning what it held.
    fn take(
        &mut self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    /// Appends `member` to the index. Returns false if it was already present.
    fn index_add(
        &mut self,
        index: &str,
        member: &str,
    ) -> Result<bool>;

    /// Removes and returns the oldest member.
    fn index_pop(
        &mut self,
        index: &str,
    ) -> Result<Option<String>>;

    fn queue_push(
        &mut self,
        queue: &str,
        message: Vec<u8>,
    ) -> Result<()>;

    fn queue_pop(
        &mut self,
        queue: &str,
    ) -> Result<Option<Vec<u8>>>;

    fn publish(
        &mut self,
        channel: &str,
        payload: Bytes,
    );
}

pub type TxnBody<'a> = dyn FnMut(&mut dyn StoreTxn) -> Result<()> + 'a;

pub trait KeyValueStore: Send + Sync + Debug {
    /// Fails when the handle is closed or the store unreachable.
    fn ping(&self) -> Result<()>;

    fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>>;

    fn exists(
        &self,
        key: &str,
    ) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Row keys starting with `prefix`, in key order.
    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>>;

    fn index_len(
        &self,
        index: &str,
    ) -> Result<usize>;

    fn queue_len(
        &self,
        queue: &str,
    ) -> Result<usize>;

    /// Publishes outside any transaction; returns the number of receivers.
    fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> Result<usize>;

    fn subscribe(
        &self,
        topic: Topic,
    ) -> Result<Subscription>;

    /// Runs `body` as one indivisible transaction named `script`.
    ///
    /// `body` may be invoked more than once if the backend retries on
    /// conflict, so it must not carry state between invocations.
    fn atomically(
        &self,
        script: &str,
        body: &mut TxnBody<'_>,
    ) -> Result<()>;
}

/// Opens the backend selected by `config`.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn KeyValueStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sled => Ok(Arc::new(SledStore::open(&config.sled)?)),
    }
}
