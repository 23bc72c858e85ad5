use std::sync::Arc;

use super::*;
use crate::DbConnector;
use crate::FieldValues;
use crate::MemoryStore;

fn fv(pairs: &[(&str, &str)]) -> FieldValues {
    pairs.iter().map(|(f, v)| (f.to_string(), v.to_string())).collect()
}

fn setup() -> (DbConnector, Table) {
    let db = DbConnector::new(Arc::new(MemoryStore::new()));
    let table = Table::new(&db, "PORT_TABLE");
    (db, table)
}

#[test]
fn set_then_get_returns_fields_in_write_order() {
    let (_db, table) = setup();
    table.set("Ethernet0", &fv(&[("speed", "100G"), ("admin", "up")])).unwrap();

    assert_eq!(
        table.get("Ethernet0").unwrap(),
        Some(fv(&[("speed", "100G"), ("admin", "up")]))
    );
    assert!(table.exists("Ethernet0").unwrap());
}

#[test]
fn set_merges_into_existing_row() {
    let (_db, table) = setup();
    table.set("k", &fv(&[("a", "1"), ("b", "2")])).unwrap();
    table.set("k", &fv(&[("b", "20"), ("c", "3")])).unwrap();

    assert_eq!(table.get("k").unwrap(), Some(fv(&[("a", "1"), ("b", "20"), ("c", "3")])));
}

#[test]
fn get_on_missing_key_is_none() {
    let (_db, table) = setup();
    assert_eq!(table.get("nope").unwrap(), None);
    assert_eq!(table.hget("nope", "a").unwrap(), None);
}

#[test]
fn del_removes_row() {
    let (_db, table) = setup();
    table.set("k", &fv(&[("a", "1")])).unwrap();
    table.del("k").unwrap();
    table.del("k").unwrap();

    assert_eq!(table.get("k").unwrap(), None);
}

#[test]
fn get_keys_is_scoped_to_table() {
    let (db, table) = setup();
    let other = Table::new(&db, "PORT_TABLE_EXTRA");
    table.set("Ethernet0", &fv(&[("a", "1")])).unwrap();
    table.set("Ethernet4", &fv(&[("a", "1")])).unwrap();
    other.set("Ethernet8", &fv(&[("a", "1")])).unwrap();

    assert_eq!(table.get_keys().unwrap(), vec!["Ethernet0", "Ethernet4"]);
}

#[test]
fn single_field_helpers() {
    let (_db, table) = setup();
    table.hset("k", "mtu", "9100").unwrap();
    table.hset("k", "speed", "40G").unwrap();
    assert_eq!(table.hget("k", "mtu").unwrap().as_deref(), Some("9100"));

    table.hdel("k", "mtu").unwrap();
    assert_eq!(table.get("k").unwrap(), Some(fv(&[("speed", "40G")])));

    table.hdel("k", "speed").unwrap();
    assert!(!table.exists("k").unwrap());
}

#[test]
fn custom_separator_is_used_in_store_keys() {
    let (db, _) = setup();
    let table = Table::with_separator(&db, "VLAN", "|");
    table.set("Vlan10", &fv(&[("vlanid", "10")])).unwrap();

    assert!(db.exists("VLAN|Vlan10").unwrap());
    assert_eq!(table.get_keys().unwrap(), vec!["Vlan10"]);
}
