use super::*;

#[test]
fn store_names_follow_table_conventions() {
    let name = TableName::new("PORT_TABLE", ":");

    assert_eq!(name.key("Ethernet0"), "PORT_TABLE:Ethernet0");
    assert_eq!(name.staging_key("Ethernet0"), "_PORT_TABLE:Ethernet0");
    assert_eq!(name.key_set(), "PORT_TABLE_KEY_SET");
    assert_eq!(name.channel(), "PORT_TABLE_CHANNEL");
    assert_eq!(name.queue(), "PORT_TABLE_KEY_VALUE_OP_QUEUE");
    assert_eq!(name.prefix(), "PORT_TABLE:");
}

#[test]
fn strip_recovers_key_with_custom_separator() {
    let name = TableName::new("VLAN", "|");

    assert_eq!(name.strip("VLAN|Vlan10"), Some("Vlan10"));
    assert_eq!(name.strip("VLAN|a|b"), Some("a|b"));
    assert_eq!(name.strip("VLAN:Vlan10"), None);
    assert_eq!(name.strip("VLAN_MEMBER|Vlan10"), None);
}
