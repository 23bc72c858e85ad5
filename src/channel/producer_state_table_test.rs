use std::sync::Arc;

use super::*;
use crate::DbConnector;
use crate::Error;
use crate::FieldValues;
use crate::KeyOpFieldValues;
use crate::KeyValueStore;
use crate::MemoryStore;
use crate::Selectable;
use crate::Table;

fn fv(pairs: &[(&str, &str)]) -> FieldValues {
    pairs.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect()
}

fn setup() -> (DbConnector, ProducerStateTable, ConsumerStateTable) {
    let db = DbConnector::new(Arc::new(MemoryStore::new()));
    let producer = ProducerStateTable::new(&db, "ROUTE_TABLE");
    let consumer = ConsumerStateTable::new(&db, "ROUTE_TABLE").unwrap();
    (db, producer, consumer)
}

#[test]
fn repeated_writes_to_one_key_stay_one_pending_entry() {
    let (_db, producer, _consumer) = setup();
    producer.set("10.0.0.0/8", &fv(&[("nexthop", "a")])).unwrap();
    producer.set("10.0.0.0/8", &fv(&[("nexthop", "b")])).unwrap();
    producer.del("10.0.0.0/8").unwrap();

    assert_eq!(producer.count().unwrap(), 1);
}

#[test]
fn wakeup_is_published_only_when_a_key_becomes_pending() {
    let (_db, producer, consumer) = setup();
    producer.set("k", &fv(&[("a", "1")])).unwrap();
    producer.set("k", &fv(&[("a", "2")])).unwrap();

    assert_eq!(consumer.notifications().len(), 1);
}

#[test]
fn staging_row_holds_only_the_last_write() {
    let (db, producer, _consumer) = setup();
    producer.set("k", &fv(&[("a", "1"), ("b", "2")])).unwrap();
    producer.set("k", &fv(&[("c", "3")])).unwrap();

    let staged = db.get(&producer.name().staging_key("k")).unwrap().unwrap();
    assert_eq!(crate::codec::decode_row(&staged).unwrap(), fv(&[("c", "3")]));

    producer.del("k").unwrap();
    assert!(!db.exists(&producer.name().staging_key("k")).unwrap());
}

#[test]
fn duplicate_fields_in_one_write_collapse() {
    let (_db, producer, consumer) = setup();
    producer.set("k", &fv(&[("a", "1"), ("b", "2"), ("a", "3")])).unwrap();

    assert_eq!(
        consumer.pop().unwrap(),
        Some(KeyOpFieldValues::set("k", fv(&[("a", "3"), ("b", "2")])))
    );
}

#[test]
fn batches_commit_in_order() {
    let (_db, producer, consumer) = setup();
    producer
        .set_batch(&[
            ("a".to_string(), fv(&[("x", "1")])),
            ("b".to_string(), fv(&[("x", "2")])),
        ])
        .unwrap();
    producer.del_batch(&["c".to_string(), "a".to_string()]).unwrap();

    assert_eq!(
        consumer.pops().unwrap(),
        vec![
            KeyOpFieldValues::del("a"),
            KeyOpFieldValues::set("b", fv(&[("x", "2")])),
            KeyOpFieldValues::del("c"),
        ]
    );
}

#[test]
fn clear_drops_pending_keys_and_staging_rows() {
    let (db, producer, consumer) = setup();
    producer.set("a", &fv(&[("x", "1")])).unwrap();
    producer.set("b", &fv(&[("x", "2")])).unwrap();

    producer.clear().unwrap();

    assert_eq!(producer.count().unwrap(), 0);
    assert!(db.keys_with_prefix("_ROUTE_TABLE").unwrap().is_empty());
    assert_eq!(consumer.pop().unwrap(), None);
}

#[test]
fn buffered_writes_wait_for_flush() {
    let (_db, producer, consumer) = setup();
    producer.set_buffered(true);
    producer.set("a", &fv(&[("x", "1")])).unwrap();
    producer.del("b").unwrap();

    assert_eq!(producer.count().unwrap(), 0);
    assert_eq!(consumer.pop().unwrap(), None);

    producer.flush().unwrap();

    assert_eq!(
        consumer.pops().unwrap(),
        vec![KeyOpFieldValues::set("a", fv(&[("x", "1")])), KeyOpFieldValues::del("b")]
    );
    producer.flush().unwrap();
}

#[test]
fn temp_view_applies_the_minimal_diff() {
    let (db, producer, consumer) = setup();
    let table = Table::new(&db, "ROUTE_TABLE");
    table.set("keep", &fv(&[("x", "1")])).unwrap();
    table.set("change", &fv(&[("x", "1")])).unwrap();
    table.set("drop", &fv(&[("x", "1")])).unwrap();

    producer.create_temp_view();
    producer.set("keep", &fv(&[("x", "1")])).unwrap();
    producer.set("change", &fv(&[("x", "2")])).unwrap();
    producer.set("new", &fv(&[("y", "1")])).unwrap();
    producer.set("gone", &fv(&[("y", "1")])).unwrap();
    producer.del("gone").unwrap();

    assert_eq!(producer.count().unwrap(), 0);
    producer.apply_temp_view().unwrap();

    let mut events = consumer.pops().unwrap();
    events.sort_by(|a, b| a.key.cmp(&b.key));
    assert_eq!(
        events,
        vec![
            KeyOpFieldValues::set("change", fv(&[("x", "2")])),
            KeyOpFieldValues::del("drop"),
            KeyOpFieldValues::set("new", fv(&[("y", "1")])),
        ]
    );
}

#[test]
fn second_temp_view_discards_the_first() {
    let (_db, producer, consumer) = setup();
    producer.create_temp_view();
    producer.set("first", &fv(&[("x", "1")])).unwrap();
    producer.create_temp_view();
    producer.set("second", &fv(&[("x", "1")])).unwrap();
    producer.apply_temp_view().unwrap();

    assert_eq!(
        consumer.pops().unwrap(),
        vec![KeyOpFieldValues::set("second", fv(&[("x", "1")]))]
    );
}

#[test]
fn applying_without_a_view_is_rejected() {
    let (_db, producer, _consumer) = setup();
    assert!(matches!(producer.apply_temp_view(), Err(Error::InvalidState(_))));
}

#[test]
fn custom_separator_shapes_store_keys() {
    let db = DbConnector::new(Arc::new(MemoryStore::new()));
    let producer = ProducerStateTable::with_separator(&db, "ROUTE_TABLE", "|");
    let consumer = ConsumerStateTable::with_separator(&db, "ROUTE_TABLE", "|").unwrap();
    producer.set("k", &fv(&[("a", "1")])).unwrap();
    consumer.pop().unwrap();

    assert!(db.store().exists("ROUTE_TABLE|k").unwrap());
}
