//! Store handle shared by the channels of one component.
//!
//! [`DbConnector`] pairs a [`KeyValueStore`] with the table naming settings
//! and the retry policy applied while the store is loading.

mod retry;
pub(crate) use retry::*;


use std::sync::Arc;

use bytes::Bytes;

use crate::open_store;
use crate::BackoffPolicy;
use crate::KeyValueStore;
use crate::Result;
use crate::StateBusConfig;
use crate::Subscription;
use crate::TableConfig;
use crate::Topic;
use crate::TxnBody;

#[derive(Clone, Debug)]
pub struct DbConnector {
    store: Arc<dyn KeyValueStore>,
    table: TableConfig,
    retry: BackoffPolicy,
}

impl DbConnector {
    /// Wraps an open store with default table settings and retry policy.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            table: TableConfig::default(),
            retry: BackoffPolicy::default(),
        }
    }

    /// Opens the configured backend. The config is expected to be validated.
    pub fn from_config(config: &StateBusConfig) -> Result<Self> {
        config.table.validate()?;
        Ok(Self {
            store: open_store(&config.store)?,
            table: config.table.clone(),
            retry: config.retry.store,
        })
    }

    /// Replaces the table settings. Rejects settings that fail
    /// [`TableConfig::validate`].
    pub fn with_table_config(
        mut self,
        table: TableConfig,
    ) -> Result<Self> {
        table.validate()?;
        self.table = table;
        Ok(self)
    }

    pub fn with_retry_policy(
        mut self,
        retry: BackoffPolicy,
    ) -> Self {
        self.retry = retry;
        self
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn separator(&self) -> &str {
        &self.table.separator
    }

    pub fn pop_batch_size(&self) -> usize {
        self.table.pop_batch_size
    }

    pub fn ping(&self) -> Result<()> {
        retry_with_backoff(&self.retry, "PING", || self.store.ping())
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        retry_with_backoff(&self.retry, "HGETALL", || self.store.get(key))
    }

    pub fn exists(
        &self,
        key: &str,
    ) -> Result<bool> {
        retry_with_backoff(&self.retry, "EXISTS", || self.store.exists(key))
    }

    pub fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>> {
        retry_with_backoff(&self.retry, "KEYS", || self.store.keys_with_prefix(prefix))
    }

    pub fn index_len(
        &self,
        index: &str,
    ) -> Result<usize> {
        retry_with_backoff(&self.retry, "SCARD", || self.store.index_len(index))
    }

    pub fn queue_len(
        &self,
        queue: &str,
    ) -> Result<usize> {
        retry_with_backoff(&self.retry, "LLEN", || self.store.queue_len(queue))
    }

    pub fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> Result<usize> {
        retry_with_backoff(&self.retry, "PUBLISH", || {
            self.store.publish(channel, payload.clone())
        })
    }

    pub fn subscribe(
        &self,
        topic: Topic,
    ) -> Result<Subscription> {
        retry_with_backoff(&self.retry, "SUBSCRIBE", || self.store.subscribe(topic.clone()))
    }

    /// Runs `body` as one store transaction, retried as a whole while the
    /// store is loading.
    pub fn atomically(
        &self,
        script: &str,
        body: &mut TxnBody<'_>,
    ) -> Result<()> {
        retry_with_backoff(&self.retry, script, || self.store.atomically(script, &mut *body))
    }
}
