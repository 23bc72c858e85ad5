use std::cell::RefCell;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::Bytes;
use sled::transaction::ConflictableTransactionError;
use sled::transaction::TransactionError;
use sled::transaction::TransactionalTree;
use sled::transaction::UnabortableTransactionError;
use sled::IVec;
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
use crate::Error;
use crate::ProtocolError;
use crate::Result;
use crate::SledConfig;
use crate::StoreError;

// Key layout inside the single tree
const ROW_TAG: u8 = b'h';
const LIST_META_TAG: u8 = b'm';
const LIST_SLOT_TAG: u8 = b'l';
const INDEX_MEMBER_TAG: u8 = b'p';
const INDEX_LIST: u8 = b'i';
const QUEUE_LIST: u8 = b'q';

fn row_key(key: &str) -> Vec<u8> {
    tagged(ROW_TAG, key.as_bytes())
}

fn tagged(
    tag: u8,
    name: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(name.len() + 1);
    out.push(tag);
    out.extend_from_slice(name);
    out
}

fn list_name(
    kind: u8,
    name: &str,
) -> Vec<u8> {
    tagged(kind, name.as_bytes())
}

fn list_meta_key(list: &[u8]) -> Vec<u8> {
    tagged(LIST_META_TAG, list)
}

fn list_slot_key(
    list: &[u8],
    seq: u64,
) -> Vec<u8> {
    let mut out = tagged(LIST_SLOT_TAG, list);
    out.push(0);
    out.extend_from_slice(&seq.to_be_bytes());
    out
}

fn index_member_key(
    index: &str,
    member: &str,
) -> Vec<u8> {
    let mut out = tagged(INDEX_MEMBER_TAG, index.as_bytes());
    out.push(0);
    out.extend_from_slice(member.as_bytes());
    out
}

/// `(head, tail)`; the list holds the slots in `head..tail`.
fn decode_meta(
    list: &[u8],
    raw: Option<IVec>,
) -> Result<(u64, u64)> {
    let Some(raw) = raw else {
        return Ok((0, 0));
    };
    if raw.len() != 16 {
        return Err(malformed(list, format!("list meta of {} bytes", raw.len())));
    }
    let mut head = [0u8; 8];
    let mut tail = [0u8; 8];
    head.copy_from_slice(&raw[..8]);
    tail.copy_from_slice(&raw[8..]);
    Ok((u64::from_be_bytes(head), u64::from_be_bytes(tail)))
}

fn encode_meta(
    head: u64,
    tail: u64,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&head.to_be_bytes());
    out.extend_from_slice(&tail.to_be_bytes());
    out
}

fn malformed(
    list: &[u8],
    detail: String,
) -> Error {
    ProtocolError::Malformed {
        origin: String::from_utf8_lossy(list).into_owned(),
        detail,
    }
    .into()
}

/// sled-backed store: rows, key indexes and queues survive a reopen.
/// Pub/sub and keyspace notifications are delivered in-process.
#[derive(Debug)]
pub struct SledStore {
    db: sled::Db,
    hub: Arc<PubSubHub>,
    conn: u64,
    closed: AtomicBool,
}

impl SledStore {
    pub fn open(config: &SledConfig) -> Result<Self> {
        debug!("open sled store from path: {:?}", &config.path);

        let flush_every_ms = (config.flush_every_ms > 0).then_some(config.flush_every_ms);
        let db = sled::Config::default()
            .path(&config.path)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(flush_every_ms)
            .use_compression(true)
            .compression_factor(1)
            .open()
            .map_err(|e| {
                warn!(
                    "Try to open DB at this location: {:?} and failed: {:?}",
                    config.path, e
                );
                Error::from(e)
            })?;

        let hub = PubSubHub::new();
        let conn = hub.register_connection();
        Ok(Self {
            db,
            hub,
            conn,
            closed: AtomicBool::new(false),
        })
    }

    pub fn connect(&self) -> Self {
        Self {
            db: self.db.clone(),
            hub: self.hub.clone(),
            conn: self.hub.register_connection(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.hub.drop_connection(self.conn);
            debug!(conn = self.conn, "Sled store handle closed");
        }
    }

    /// Forces buffered writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.check("FLUSH")?;
        self.db.flush()?;
        Ok(())
    }

    fn check(
        &self,
        command: &str,
    ) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Connection(format!("{command}: handle {} is closed", self.conn)).into());
        }
        Ok(())
    }

    fn list_len(
        &self,
        list: &[u8],
    ) -> Result<usize> {
        let (head, tail) = decode_meta(list, self.db.get(list_meta_key(list))?)?;
        Ok((tail - head) as usize)
    }
}

impl KeyValueStore for SledStore {
    fn ping(&self) -> Result<()> {
        self.check("PING")
    }

    fn get(
        &self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        self.check("HGETALL")?;
        Ok(self.db.get(row_key(key))?.map(|v| v.to_vec()))
    }

    fn keys_with_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<String>> {
        self.check("KEYS")?;
        let mut keys = Vec::new();
        for item in self.db.scan_prefix(row_key(prefix)) {
            let (raw, _) = item?;
            let key = String::from_utf8(raw[1..].to_vec())
                .map_err(|e| malformed(&[ROW_TAG], format!("row key is not UTF-8: {e}")))?;
            keys.push(key);
        }
        Ok(keys)
    }

    fn index_len(
        &self,
        index: &str,
    ) -> Result<usize> {
        self.check("SCARD")?;
        self.list_len(&list_name(INDEX_LIST, index))
    }

    fn queue_len(
        &self,
        queue: &str,
    ) -> Result<usize> {
        self.check("LLEN")?;
        self.list_len(&list_name(QUEUE_LIST, queue))
    }

    fn publish(
        &self,
        channel: &str,
        payload: Bytes,
    ) -> Result<usize> {
        self.check("PUBLISH")?;
        Ok(self.hub.publish(channel, payload))
    }

    fn subscribe(
        &self,
        topic: Topic,
    ) -> Result<Subscription> {
        self.check("SUBSCRIBE")?;
        Ok(self.hub.subscribe(self.conn, topic))
    }

    fn atomically(
        &self,
        script: &str,
        body: &mut TxnBody<'_>,
    ) -> Result<()> {
        self.check(script)?;

        // sled re-runs the closure on conflict, each run starts clean
        let body = RefCell::new(body);
        let outcome = self.db.transaction(|tx| {
            let mut txn = SledTxn {
                tx,
                script,
                failure: None,
                keyspace: Vec::new(),
                published: Vec::new(),
            };
            let result = {
                let mut guard = body.borrow_mut();
                let f: &mut TxnBody<'_> = &mut **guard;
                f(&mut txn as &mut dyn StoreTxn)
            };
            if let Some(e) = txn.failure.take() {
                return Err(e.into());
            }
            match result {
                Ok(()) => Ok((txn.keyspace, txn.published)),
                Err(e) => Err(ConflictableTransactionError::Abort(e)),
            }
        });

        let (keyspace, published) = match outcome {
            Ok(notifications) => notifications,
            Err(TransactionError::Abort(e)) => {
                warn!(script, "Transaction aborted: {:?}", e);
                return Err(e);
            }
            Err(TransactionError::Storage(e)) => {
                warn!(script, "Transaction failed in storage: {:?}", e);
                return Err(e.into());
            }
        };

        for (key, op) in keyspace {
            self.hub.notify_keyspace(&key, op);
        }
        for (channel, payload) in published {
            self.hub.publish(&channel, payload);
        }
        trace!(script, "Transaction committed");
        Ok(())
    }
}

struct SledTxn<'a> {
    tx: &'a TransactionalTree,
    script: &'a str,
    /// Backend failure that must reach sled so it can retry or abort
    failure: Option<UnabortableTransactionError>,
    keyspace: Vec<(String, KeyspaceOp)>,
    published: Vec<(String, Bytes)>,
}

impl SledTxn<'_> {
    fn guard<T>(
        &mut self,
        r: std::result::Result<T, UnabortableTransactionError>,
    ) -> Result<T> {
        r.map_err(|e| {
            let reason = format!("{e:?}");
            self.failure = Some(e);
            StoreError::Aborted {
                script: self.script.to_string(),
                reason,
            }
            .into()
        })
    }

    fn list_meta(
        &mut self,
        list: &[u8],
    ) -> Result<(u64, u64)> {
        let raw = self.tx.get(list_meta_key(list));
        let raw = self.guard(raw)?;
        decode_meta(list, raw)
    }

    fn set_list_meta(
        &mut self,
        list: &[u8],
        head: u64,
        tail: u64,
    ) -> Result<()> {
        let r = if head == tail {
            self.tx.remove(list_meta_key(list))
        } else {
            self.tx.insert(list_meta_key(list), encode_meta(head, tail))
        };
        self.guard(r).map(|_| ())
    }

    fn list_push(
        &mut self,
        list: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let (head, tail) = self.list_meta(list)?;
        let r = self.tx.insert(list_slot_key(list, tail), value);
        self.guard(r)?;
        self.set_list_meta(list, head, tail + 1)
    }

    fn list_pop(
        &mut self,
        list: &[u8],
    ) -> Result<Option<IVec>> {
        let (head, tail) = self.list_meta(list)?;
        if head == tail {
            return Ok(None);
        }
        let r = self.tx.remove(list_slot_key(list, head));
        let value = self
            .guard(r)?
            .ok_or_else(|| malformed(list, format!("slot {head} missing")))?;
        self.set_list_meta(list, head + 1, tail)?;
        Ok(Some(value))
    }
}

impl StoreTxn for SledTxn<'_> {
    fn get(
        &mut self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let r = self.tx.get(row_key(key));
        Ok(self.guard(r)?.map(|v| v.to_vec()))
    }

    fn put(
        &mut self,
        key: &str,
        value: Vec<u8>,
    ) -> Result<()> {
        let r = self.tx.insert(row_key(key), value);
        self.guard(r)?;
        self.keyspace.push((key.to_string(), KeyspaceOp::Hset));
        Ok(())
    }

    fn take(
        &mut self,
        key: &str,
    ) -> Result<Option<Vec<u8>>> {
        let r = self.tx.remove(row_key(key));
        let old = self.guard(r)?;
        if old.is_some() {
            self.keyspace.push((key.to_string(), KeyspaceOp::Del));
        }
        Ok(old.map(|v| v.to_vec()))
    }

    fn index_add(
        &mut self,
        index: &str,
        member: &str,
    ) -> Result<bool> {
        let marker = index_member_key(index, member);
        let r = self.tx.get(marker.clone());
        if self.guard(r)?.is_some() {
            return Ok(false);
        }
        let r = self.tx.insert(marker, &b""[..]);
        self.guard(r)?;
        self.list_push(&list_name(INDEX_LIST, index), member.as_bytes())?;
        Ok(true)
    }

    fn index_pop(
        &mut self,
        index: &str,
    ) -> Result<Option<String>> {
        let list = list_name(INDEX_LIST, index);
        let Some(raw) = self.list_pop(&list)? else {
            return Ok(None);
        };
        let member = String::from_utf8(raw.to_vec())
            .map_err(|e| malformed(&list, format!("member is not UTF-8: {e}")))?;
        let r = self.tx.remove(index_member_key(index, &member));
        self.guard(r)?;
        Ok(Some(member))
    }

    fn queue_push(
        &mut self,
        queue: &str,
        message: Vec<u8>,
    ) -> Result<()> {
        self.list_push(&list_name(QUEUE_LIST, queue), &message)
    }

    fn queue_pop(
        &mut self,
        queue: &str,
    ) -> Result<Option<Vec<u8>>> {
        Ok(self.list_pop(&list_name(QUEUE_LIST, queue))?.map(|v| v.to_vec()))
    }

    fn publish(
        &mut self,
        channel: &str,
        payload: Bytes,
    ) {
        self.published.push((channel.to_string(), payload));
    }
}
