use cmdreport::{AttributeValue, CommandEntry, CommandId, CommandRecord, merge};

fn id() -> CommandId {
    CommandId::new("cmd-42").unwrap()
}

fn fold(entries: &[CommandEntry]) -> CommandRecord {
    let mut record: Option<CommandRecord> = None;
    for entry in entries {
        record = Some(merge(record.as_ref(), entry));
    }
    record.unwrap()
}

fn sample_entries() -> Vec<CommandEntry> {
    vec![
        CommandEntry::new(id()).with("queued", true),
        CommandEntry::new(id())
            .with("Acknowledge_Queued_Status", "OK")
            .with("Acknowledge_Queued_Time", "2026-03-01T10:00:00Z"),
        CommandEntry::new(id()).with("ack", "ACCEPTED").with("queued", false),
        CommandEntry::new(id()),
        CommandEntry::new(id()).with("binary", vec![0x17u8, 0x2a]),
    ]
}

#[test]
fn merging_the_same_entry_twice_is_idempotent() {
    let base = fold(&sample_entries()[..2]);
    for entry in sample_entries() {
        let once = merge(Some(&base), &entry);
        let twice = merge(Some(&once), &entry);
        assert_eq!(once, twice);
    }

    let fresh = CommandEntry::new(id()).with("ack", "ACCEPTED");
    let once = merge(None, &fresh);
    assert_eq!(merge(Some(&once), &fresh), once);
}

#[test]
fn identity_is_stable_regardless_of_merge_order() {
    let entries = sample_entries();
    let forward = fold(&entries);
    let reversed = fold(&entries.iter().rev().cloned().collect::<Vec<_>>());
    assert_eq!(forward.identity(), &id());
    assert_eq!(reversed.identity(), &id());
}

#[test]
fn empty_entry_leaves_record_unchanged() {
    let record = fold(&sample_entries()[..3]);
    let after = merge(Some(&record), &CommandEntry::new(id()));
    assert_eq!(after, record);
    assert_eq!(after.merge_count(), record.merge_count() + 1);
}

#[test]
fn disjoint_attributes_commute() {
    let e1 = CommandEntry::new(id()).with("A", "from-e1");
    let e2 = CommandEntry::new(id()).with("B", 2i64);

    let forward = fold(&[e1.clone(), e2.clone()]);
    let backward = fold(&[e2, e1]);

    assert_eq!(forward.attribute("A"), Some(&AttributeValue::from("from-e1")));
    assert_eq!(forward.attribute("B"), Some(&AttributeValue::Integer(2)));
    assert_eq!(forward, backward);
}

#[test]
fn overlapping_attributes_follow_arrival_order() {
    let older = CommandEntry::new(id()).with("ack", "PENDING");
    let newer = CommandEntry::new(id()).with("ack", "ACCEPTED");

    let record = fold(&[newer.clone(), older.clone()]);
    assert_eq!(record.attribute("ack"), Some(&AttributeValue::from("PENDING")));

    let record = fold(&[older, newer]);
    assert_eq!(record.attribute("ack"), Some(&AttributeValue::from("ACCEPTED")));
}

#[test]
fn earlier_snapshots_are_not_affected_by_later_merges() {
    let first = merge(None, &CommandEntry::new(id()).with("queued", true));
    let snapshot = first.clone();
    let _second = merge(Some(&first), &CommandEntry::new(id()).with("queued", false));
    assert_eq!(first, snapshot);
    assert_eq!(first.attribute("queued"), Some(&AttributeValue::Boolean(true)));
}

#[test]
fn record_accessors_read_conventional_attributes() {
    let record = fold(&[CommandEntry::new(id())
        .with("Comment", "retry after pass")
        .with("source", "SWITCH_VOLTAGE_ON(voltage_num: 1)")
        .with("username", "operator")
        .with("binary", vec![0x17u8, 0x2a])]);

    assert_eq!(record.comment(), Some("retry after pass"));
    assert_eq!(record.source(), Some("SWITCH_VOLTAGE_ON(voltage_num: 1)"));
    assert_eq!(record.username(), Some("operator"));
    assert_eq!(record.binary(), Some(&[0x17u8, 0x2a][..]));
}

#[test]
fn record_serializes_with_serde() {
    let record = fold(&[CommandEntry::new(id()).with("queued", true)]);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["identity"], "cmd-42");
    assert_eq!(json["merge_count"], 1);

    let back: CommandRecord = serde_json::from_value(json).unwrap();
    assert_eq!(back, record);
}
