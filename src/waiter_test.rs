use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serial_test::serial;

use super::*;
use crate::MemoryStore;
use crate::SignalDisposition;
use crate::SignalRegistry;

fn fv(pairs: &[(&str, &str)]) -> crate::FieldValues {
    pairs.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect()
}

fn db() -> DbConnector {
    DbConnector::new(Arc::new(MemoryStore::new()))
}

fn write_later(
    db: &DbConnector,
    delay: Duration,
    write: impl FnOnce(&Table) + Send + 'static,
) -> thread::JoinHandle<()> {
    let table = Table::new(db, "STATE_TABLE");
    thread::spawn(move || {
        thread::sleep(delay);
        write(&table);
    })
}

#[test]
#[serial]
fn present_key_returns_at_once() {
    let db = db();
    Table::new(&db, "STATE_TABLE").set("k", &fv(&[("a", "1")])).unwrap();

    let start = Instant::now();
    assert!(TableWaiter::wait_until_key_set(&db, "STATE_TABLE", "k", Duration::from_secs(5)).unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
#[serial]
fn waits_for_key_to_appear() {
    let db = db();
    let writer = write_later(&db, Duration::from_millis(50), |t| {
        t.set("other", &fv(&[("a", "1")])).unwrap();
        t.set("k", &fv(&[("a", "1")])).unwrap();
    });

    assert!(TableWaiter::wait_until_key_set(&db, "STATE_TABLE", "k", Duration::from_secs(5)).unwrap());
    writer.join().unwrap();
}

#[test]
#[serial]
fn waits_for_key_to_go_away() {
    let db = db();
    Table::new(&db, "STATE_TABLE").set("k", &fv(&[("a", "1")])).unwrap();
    let writer = write_later(&db, Duration::from_millis(50), |t| t.del("k").unwrap());

    assert!(TableWaiter::wait_until_key_del(&db, "STATE_TABLE", "k", Duration::from_secs(5)).unwrap());
    writer.join().unwrap();
}

#[test]
#[serial]
fn waits_for_field_value_to_match() {
    let db = db();
    Table::new(&db, "STATE_TABLE").set("Ethernet0", &fv(&[("oper", "down")])).unwrap();
    let writer = write_later(&db, Duration::from_millis(50), |t| {
        t.hset("Ethernet0", "speed", "100G").unwrap();
        t.hset("Ethernet0", "oper", "up").unwrap();
    });

    let found = TableWaiter::wait_until_field_set(
        &db,
        "STATE_TABLE",
        "Ethernet0",
        "oper",
        Duration::from_secs(5),
        |value| value == "up",
    )
    .unwrap();

    assert!(found);
    writer.join().unwrap();
}

#[test]
#[serial]
fn times_out_when_nothing_matches() {
    let db = db();
    let start = Instant::now();

    let found = TableWaiter::wait_until(&db, "STATE_TABLE", Duration::from_millis(100), |_| true).unwrap();

    assert!(!found);
    assert!(start.elapsed() >= Duration::from_millis(100));
}

#[test]
#[serial]
fn zero_wait_is_rejected() {
    let db = db();
    assert!(matches!(
        TableWaiter::wait_until_key_set(&db, "STATE_TABLE", "k", Duration::ZERO),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
#[serial]
fn interrupting_signal_ends_the_wait() {
    let registry = SignalRegistry::global();
    registry.register(libc::SIGUSR1, SignalDisposition::Interrupt).unwrap();
    let db = db();

    let raiser = thread::spawn(|| {
        thread::sleep(Duration::from_millis(100));
        unsafe {
            libc::kill(libc::getpid(), libc::SIGUSR1);
        }
    });

    let start = Instant::now();
    let found = TableWaiter::wait_until_key_set(&db, "STATE_TABLE", "never", Duration::from_secs(10)).unwrap();
    raiser.join().unwrap();

    assert!(!found);
    assert!(start.elapsed() < Duration::from_secs(5));
    registry.reset(libc::SIGUSR1);
    registry.restore(libc::SIGUSR1);
}

#[test]
#[serial]
fn unbounded_wait_still_sees_the_write() {
    let db = db();
    let writer = write_later(&db, Duration::from_millis(50), |table| {
        table.set("k", &fv(&[("a", "1")])).unwrap();
    });

    assert!(TableWaiter::wait_until_key_set(&db, "STATE_TABLE", "k", Duration::MAX).unwrap());
    writer.join().unwrap();
}
