use std::path::Path;

use tempfile::tempdir;

use super::*;
use crate::Error;
use crate::ProtocolError;
use crate::SledConfig;
use crate::StoreError;

fn sled_config(path: &Path) -> SledConfig {
    SledConfig {
        path: path.to_path_buf(),
        cache_capacity: 1024 * 1024,
        flush_every_ms: 0,
    }
}

#[test]
fn rows_indexes_and_queues_survive_reopen() {
    let dir = tempdir().unwrap();
    let config = sled_config(&dir.path().join("db"));

    {
        let store = SledStore::open(&config).unwrap();
        store
            .atomically("seed", &mut |txn| {
                txn.put("T:a", b"row".to_vec())?;
                txn.index_add("T_KEY_SET", "a")?;
                txn.index_add("T_KEY_SET", "b")?;
                txn.queue_push("Q", b"m1".to_vec())?;
                txn.queue_push("Q", b"m2".to_vec())
            })
            .unwrap();
        store.flush().unwrap();
    }

    let store = SledStore::open(&config).unwrap();
    assert_eq!(store.get("T:a").unwrap(), Some(b"row".to_vec()));
    assert_eq!(store.index_len("T_KEY_SET").unwrap(), 2);
    assert_eq!(store.queue_len("Q").unwrap(), 2);

    let mut out = (None, None);
    store
        .atomically("pop", &mut |txn| {
            out = (txn.index_pop("T_KEY_SET")?, txn.queue_pop("Q")?);
            Ok(())
        })
        .unwrap();
    assert_eq!(out.0.as_deref(), Some("a"));
    assert_eq!(out.1, Some(b"m1".to_vec()));
}

#[test]
fn index_add_reports_existing_members() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(&sled_config(dir.path())).unwrap();

    let mut added = Vec::new();
    store
        .atomically("add", &mut |txn| {
            added.clear();
            added.push(txn.index_add("IDX", "k")?);
            added.push(txn.index_add("IDX", "k")?);
            Ok(())
        })
        .unwrap();

    assert_eq!(added, vec![true, false]);
    assert_eq!(store.index_len("IDX").unwrap(), 1);
}

#[test]
fn drained_index_accepts_the_member_again() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(&sled_config(dir.path())).unwrap();

    let mut again = false;
    store
        .atomically("cycle", &mut |txn| {
            txn.index_add("IDX", "k")?;
            txn.index_pop("IDX")?;
            again = txn.index_add("IDX", "k")?;
            Ok(())
        })
        .unwrap();

    assert!(again);
    assert_eq!(store.index_len("IDX").unwrap(), 1);
}

#[test]
fn aborted_body_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(&sled_config(dir.path())).unwrap();
    let keyspace = store.subscribe(Topic::Keyspace("T:".to_string())).unwrap();

    let result = store.atomically("abort", &mut |txn| {
        txn.put("T:a", b"x".to_vec())?;
        txn.index_add("IDX", "a")?;
        Err(ProtocolError::InvalidOperation("stop".to_string()).into())
    });

    assert!(matches!(result, Err(Error::Protocol(_))));
    assert_eq!(store.get("T:a").unwrap(), None);
    assert_eq!(store.index_len("IDX").unwrap(), 0);
    assert!(keyspace.receiver().try_recv().is_err());
}

#[test]
fn keys_with_prefix_ignores_internal_records() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(&sled_config(dir.path())).unwrap();
    store
        .atomically("seed", &mut |txn| {
            txn.put("T:b", Vec::new())?;
            txn.put("T:a", Vec::new())?;
            txn.put("U:a", Vec::new())?;
            txn.index_add("T:", "member")?;
            txn.queue_push("T:", b"m".to_vec())
        })
        .unwrap();

    assert_eq!(store.keys_with_prefix("T:").unwrap(), vec!["T:a", "T:b"]);
}

#[test]
fn committed_writes_notify_subscribers() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(&sled_config(dir.path())).unwrap();
    let keyspace = store.subscribe(Topic::Keyspace("T:".to_string())).unwrap();
    let channel = store.subscribe(Topic::Channel("T_CHANNEL".to_string())).unwrap();

    store
        .atomically("write", &mut |txn| {
            txn.put("T:a", b"x".to_vec())?;
            txn.publish("T_CHANNEL", Bytes::from_static(b"G"));
            Ok(())
        })
        .unwrap();

    assert_eq!(
        keyspace.receiver().try_recv().unwrap(),
        StoreEvent::Keyspace {
            key: "T:a".to_string(),
            op: KeyspaceOp::Hset
        }
    );
    assert!(channel.receiver().try_recv().is_ok());
}

#[test]
fn closed_handle_is_rejected() {
    let dir = tempdir().unwrap();
    let store = SledStore::open(&sled_config(dir.path())).unwrap();
    let other = store.connect();

    store.close();

    assert!(matches!(store.get("T:a"), Err(Error::Store(StoreError::Connection(_)))));
    assert!(other.get("T:a").is_ok());
}
