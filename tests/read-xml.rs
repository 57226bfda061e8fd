//! Plain-XML fixture tests: schema coverage, strict/lenient repairs, and
//! the structural round-trip through the XML writer.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use kdbx3::{read_xml, write_xml, Color, Database, TriState, Warning};

fn fixture(name: &str) -> File {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(format!("{}.xml", name));
    File::open(path).expect("fixture exists")
}

fn open(name: &str, strict: bool) -> (Database, Vec<Warning>) {
    read_xml(fixture(name), strict).expect("fixture parses")
}

fn gen_dt(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, min, sec).unwrap()
}

fn uuid_b64(text: &str) -> Uuid {
    Uuid::from_slice(&base64::decode(text).unwrap()).unwrap()
}

#[test]
fn test_xml_metadata() {
    let (db, _) = open("NewDatabase", true);
    let meta = db.metadata();
    assert_eq!(meta.generator, "KeePass");
    assert_eq!(meta.database_name, "ANAME");
    assert_eq!(meta.database_name_changed, Some(gen_dt(2010, 8, 8, 17, 24, 53)));
    assert_eq!(meta.database_description, "ADESC");
    assert_eq!(
        meta.database_description_changed,
        Some(gen_dt(2010, 8, 8, 17, 27, 12))
    );
    assert_eq!(meta.default_user_name, "DEFUSERNAME");
    assert_eq!(
        meta.default_user_name_changed,
        Some(gen_dt(2010, 8, 8, 17, 27, 45))
    );
    assert_eq!(meta.maintenance_history_days, 127);
    assert_eq!(meta.color, Some(Color { r: 0xFF, g: 0xEF, b: 0x00 }));
    assert_eq!(meta.master_key_changed, Some(gen_dt(2012, 4, 5, 17, 9, 34)));
    assert_eq!(meta.master_key_change_rec, 101);
    assert_eq!(meta.master_key_change_force, -1);
    assert!(!meta.memory_protection.protect_title);
    assert!(meta.memory_protection.protect_user_name);
    assert!(!meta.memory_protection.protect_password);
    assert!(meta.memory_protection.protect_url);
    assert!(!meta.memory_protection.protect_notes);
    assert!(meta.recycle_bin_enabled);
    let recycle_bin = db.find_group(meta.recycle_bin_uuid).expect("recycle bin resolves");
    assert_eq!(db.group(recycle_bin).name, "Recycle Bin");
    assert_eq!(meta.recycle_bin_changed, Some(gen_dt(2010, 8, 25, 16, 12, 57)));
    assert!(meta.entry_templates_group.is_nil());
    assert_eq!(
        meta.entry_templates_group_changed,
        Some(gen_dt(2010, 8, 8, 17, 24, 19))
    );
    let last_selected = db.find_group(meta.last_selected_group).expect("resolves");
    assert_eq!(db.group(last_selected).name, "NewDatabase");
    assert_eq!(meta.last_top_visible_group, meta.last_selected_group);
    assert_eq!(meta.history_max_items, -1);
    assert_eq!(meta.history_max_size, 5242880);
}

/// Inflate the image data of an 8-bit RGB PNG into its raw scanlines
/// (one filter byte, then 3 bytes per pixel).
fn png_scanlines(png: &[u8]) -> Vec<u8> {
    assert_eq!(&png[0..8], b"\x89PNG\r\n\x1a\n");
    let mut idat = Vec::new();
    let mut offset = 8;
    while offset + 8 <= png.len() {
        let length = u32::from_be_bytes(png[offset..offset + 4].try_into().unwrap()) as usize;
        if &png[offset + 4..offset + 8] == b"IDAT" {
            idat.extend_from_slice(&png[offset + 8..offset + 8 + length]);
        }
        // length + type + data + crc
        offset += 12 + length;
    }
    let mut raw = Vec::new();
    flate2::read::ZlibDecoder::new(&idat[..])
        .read_to_end(&mut raw)
        .expect("icon image data inflates");
    raw
}

#[test]
fn test_xml_custom_icons() {
    let (db, _) = open("NewDatabase", true);
    let meta = db.metadata();
    assert_eq!(meta.custom_icons().len(), 1);
    let uuid = uuid_b64("++vyI+daLk6omox4a6kQGA==");
    let icon = meta.custom_icon(uuid).expect("icon is present");
    // PNG signature and the IHDR dimensions: 16x16, 8-bit RGB.
    assert_eq!(&icon[0..8], b"\x89PNG\r\n\x1a\n");
    assert_eq!(u32::from_be_bytes(icon[16..20].try_into().unwrap()), 16);
    assert_eq!(u32::from_be_bytes(icon[20..24].try_into().unwrap()), 16);
    assert_eq!(icon[24], 8);
    assert_eq!(icon[25], 2);

    // Every pixel of every scanline is purple.
    let raw = png_scanlines(icon);
    assert_eq!(raw.len(), 16 * (1 + 16 * 3));
    for row in raw.chunks_exact(1 + 16 * 3) {
        assert_eq!(row[0], 0, "unfiltered scanline");
        for pixel in row[1..].chunks_exact(3) {
            assert_eq!(pixel, &[128, 0, 128][..]);
        }
    }
}

#[test]
fn test_xml_custom_data() {
    let (db, _) = open("NewDatabase", true);
    let meta = db.metadata();
    assert_eq!(meta.custom_data().len(), 2);
    assert_eq!(meta.custom_data_value("A Sample Test Key"), Some("valu"));
    assert_eq!(meta.custom_data_value("custom key"), Some("blub"));
}

#[test]
fn test_xml_group_root() {
    let (db, _) = open("NewDatabase", true);
    let root = db.root_group();
    assert_eq!(root.uuid, uuid_b64("lmU+9n0aeESKZvcEze+bRg=="));
    assert_eq!(root.name, "NewDatabase");
    assert_eq!(root.notes, "");
    assert_eq!(root.icon_id, 49);
    assert_eq!(root.custom_icon_uuid, None);
    assert!(root.is_expanded);
    assert_eq!(root.times.last_modification_time, gen_dt(2010, 8, 8, 17, 24, 27));
    assert_eq!(root.times.creation_time, gen_dt(2010, 8, 7, 17, 24, 27));
    assert_eq!(root.times.last_access_time, gen_dt(2010, 8, 9, 9, 9, 44));
    assert_eq!(root.times.expiry_time, gen_dt(2010, 8, 8, 17, 24, 17));
    assert!(!root.times.expires);
    assert_eq!(root.times.usage_count, 52);
    assert_eq!(root.times.location_changed, gen_dt(2010, 8, 8, 17, 24, 27));
    assert_eq!(root.default_auto_type_sequence, "");
    assert_eq!(root.enable_auto_type, TriState::Inherit);
    assert_eq!(root.enable_searching, TriState::Inherit);
    assert_eq!(
        root.last_top_visible_entry,
        uuid_b64("+wSUOv6qf0OzW8/ZHAs2sA==")
    );

    assert_eq!(root.children().len(), 3);
    let recycle_bin = root.children()[2];
    assert_eq!(db.group(recycle_bin).uuid, db.metadata().recycle_bin_uuid);
    assert_eq!(root.entries().len(), 2);
}

#[test]
fn test_xml_group_general() {
    let (db, _) = open("NewDatabase", true);
    let group = db.group(db.root_group().children()[0]);
    assert_eq!(group.uuid, uuid_b64("AaUYVdXsI02h4T1RiAlgtg=="));
    assert_eq!(group.name, "General");
    assert_eq!(group.notes, "Group Notez");
    assert_eq!(group.icon_id, 48);
    assert_eq!(group.custom_icon_uuid, None);
    assert!(group.is_expanded);
    assert_eq!(group.default_auto_type_sequence, "{Password}{ENTER}");
    assert_eq!(group.enable_auto_type, TriState::Enable);
    assert_eq!(group.enable_searching, TriState::Disable);
    assert!(group.last_top_visible_entry.is_nil());
}

#[test]
fn test_xml_group_nested() {
    let (db, _) = open("NewDatabase", true);
    let windows = db.group(db.root_group().children()[1]);
    assert_eq!(windows.uuid, uuid_b64("1h4NtL5DK0yVyvaEnN//4A=="));
    assert_eq!(windows.name, "Windows");
    assert!(!windows.is_expanded);

    assert_eq!(windows.children().len(), 1);
    let subsub = db.group(windows.children()[0]);
    assert_eq!(subsub.uuid, uuid_b64("HoYE/BjLfUSW257pCHJ/eA=="));
    assert_eq!(subsub.name, "Subsub");
    assert_eq!(subsub.entries().len(), 1);
    let entry = &subsub.entries()[0];
    assert_eq!(entry.uuid, uuid_b64("GZpdQvGXOU2kaKRL/IVAGg=="));
    assert_eq!(entry.title(), "Subsub Entry");
    assert_eq!(db.group(subsub.parent().unwrap()).name, "Windows");
}

#[test]
fn test_xml_entry1() {
    let (db, _) = open("NewDatabase", true);
    let entry = &db.root_group().entries()[0];

    assert_eq!(entry.uuid, uuid_b64("+wSUOv6qf0OzW8/ZHAs2sA=="));
    assert_eq!(entry.history.len(), 2);
    assert_eq!(entry.icon_id, 0);
    assert_eq!(entry.custom_icon_uuid, None);
    assert_eq!(entry.foreground_color, None);
    assert_eq!(entry.background_color, None);
    assert_eq!(entry.override_url, "");
    assert_eq!(entry.tags, "a b c");

    assert_eq!(entry.times.last_modification_time, gen_dt(2010, 8, 25, 16, 19, 25));
    assert_eq!(entry.times.creation_time, gen_dt(2010, 8, 25, 16, 13, 54));
    assert_eq!(entry.times.last_access_time, gen_dt(2010, 8, 25, 16, 19, 25));
    assert_eq!(entry.times.expiry_time, gen_dt(2010, 8, 25, 16, 12, 57));
    assert!(!entry.times.expires);
    assert_eq!(entry.times.usage_count, 8);
    assert_eq!(entry.times.location_changed, gen_dt(2010, 8, 25, 16, 13, 54));

    let mut keys: Vec<_> = entry.attributes.keys().collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["Notes", "Password", "Title", "URL", "UserName"]);
    assert_eq!(entry.attributes.value("Notes"), "Notes");
    assert!(!entry.attributes.is_protected("Notes"));
    assert_eq!(entry.attributes.value("Password"), "Password");
    assert!(!entry.attributes.is_protected("Password"));
    assert_eq!(entry.attributes.value("Title"), "Sample Entry 1");
    assert_eq!(entry.attributes.value("URL"), "");
    assert!(entry.attributes.is_protected("URL"));
    assert_eq!(entry.attributes.value("UserName"), "User Name");
    assert!(entry.attributes.is_protected("UserName"));

    assert_eq!(entry.title(), entry.attributes.value("Title"));
    assert_eq!(entry.url(), entry.attributes.value("URL"));
    assert_eq!(entry.username(), entry.attributes.value("UserName"));
    assert_eq!(entry.password(), entry.attributes.value("Password"));
    assert_eq!(entry.notes(), entry.attributes.value("Notes"));

    assert_eq!(entry.attachments.len(), 1);
    assert_eq!(entry.attachments.get("myattach.txt"), Some(&b"abcdefghijk"[..]));
    assert_eq!(
        entry.history[0].attachments.get("myattach.txt"),
        Some(&b"0123456789"[..])
    );
    assert_eq!(
        entry.history[1].attachments.get("myattach.txt"),
        Some(&b"abcdefghijk"[..])
    );

    assert!(!entry.auto_type.enabled);
    assert_eq!(entry.auto_type.obfuscation, 0);
    assert_eq!(entry.auto_type.default_sequence, "");
    assert_eq!(entry.auto_type.associations.len(), 1);
    assert_eq!(entry.auto_type.associations[0].window, "Target Window");
    assert_eq!(entry.auto_type.associations[0].sequence, "");
}

#[test]
fn test_xml_entry2() {
    let (db, _) = open("NewDatabase", true);
    let entry = &db.root_group().entries()[1];

    assert_eq!(entry.uuid, uuid_b64("4jbADG37hkiLh2O0qUdaOQ=="));
    assert_eq!(entry.icon_id, 0);
    assert_eq!(
        entry.custom_icon_uuid,
        Some(uuid_b64("++vyI+daLk6omox4a6kQGA=="))
    );
    assert_eq!(entry.foreground_color, Some(Color { r: 255, g: 0, b: 0 }));
    assert_eq!(entry.background_color, Some(Color { r: 255, g: 255, b: 0 }));
    assert_eq!(entry.override_url, "http://override.net/");
    assert_eq!(entry.tags, "");
    assert_eq!(entry.times.usage_count, 7);

    assert_eq!(entry.attributes.len(), 7);
    assert_eq!(entry.attributes.value("CustomString"), "isavalue");
    assert_eq!(entry.attributes.value("Notes"), "");
    assert_eq!(entry.attributes.value("Password"), "Jer60Hz8o9XHvxBGcRqT");
    assert_eq!(entry.attributes.value("Protected String"), "y");
    assert_eq!(entry.attributes.value("Title"), "Sample Entry 2");
    assert_eq!(entry.attributes.value("URL"), "http://www.keepassx.org/");
    assert_eq!(entry.attributes.value("UserName"), "notDEFUSERNAME");

    assert_eq!(entry.attachments.len(), 1);
    assert_eq!(entry.attachments.get("myattach.txt"), Some(&b"abcdefghijk"[..]));

    assert!(entry.auto_type.enabled);
    assert_eq!(entry.auto_type.obfuscation, 1);
    assert_eq!(
        entry.auto_type.default_sequence,
        "{USERNAME}{TAB}{PASSWORD}{ENTER}"
    );
    assert_eq!(entry.auto_type.associations.len(), 2);
    assert_eq!(entry.auto_type.associations[0].window, "Target Window");
    assert_eq!(entry.auto_type.associations[0].sequence, "{Title}{UserName}");
    assert_eq!(entry.auto_type.associations[1].window, "Target Window 2");
    assert_eq!(
        entry.auto_type.associations[1].sequence,
        "{Title}{UserName} test"
    );
}

#[test]
fn test_xml_entry_history() {
    let (db, _) = open("NewDatabase", true);
    let entry = &db.root_group().entries()[0];
    assert_eq!(entry.history.len(), 2);

    let item = &entry.history[0];
    assert_eq!(item.uuid, entry.uuid);
    assert_eq!(item.times.last_modification_time, gen_dt(2010, 8, 25, 16, 13, 54));
    assert_eq!(item.times.usage_count, 3);
    assert_eq!(item.title(), "Sample Entry");
    assert_eq!(item.url(), "http://www.somesite.com/");
    assert!(item.history.is_empty());

    let item = &entry.history[1];
    assert_eq!(item.uuid, entry.uuid);
    assert_eq!(item.times.last_modification_time, gen_dt(2010, 8, 25, 16, 15, 43));
    assert_eq!(item.times.usage_count, 7);
    assert_eq!(item.title(), "Sample Entry 1");
    assert_eq!(item.url(), "http://www.somesite.com/");
}

#[test]
fn test_xml_deleted_objects() {
    let (db, _) = open("NewDatabase", true);
    let objects = db.deleted_objects();
    assert_eq!(objects.len(), 2);
    assert_eq!(objects[0].uuid, uuid_b64("5K/bzWCSmkCv5OZxYl4N/w=="));
    assert_eq!(objects[0].deletion_time, gen_dt(2010, 8, 25, 16, 14, 12));
    assert_eq!(objects[1].uuid, uuid_b64("80h8uSNWgkKhKCp1TgXF7g=="));
    assert_eq!(objects[1].deletion_time, gen_dt(2010, 8, 25, 16, 14, 14));
}

#[test]
fn test_xml_broken() {
    //                          fixture                            strict  error?
    let table = [
        ("BrokenNoGroupUuid", true, true),
        ("BrokenNoGroupUuid", false, false),
        ("BrokenNoEntryUuid", true, true),
        ("BrokenNoEntryUuid", false, false),
        ("BrokenNoRootGroup", true, true),
        ("BrokenNoRootGroup", false, true),
        ("BrokenTwoRoots", true, true),
        ("BrokenTwoRoots", false, true),
        ("BrokenTwoRootGroups", true, true),
        ("BrokenTwoRootGroups", false, true),
        ("BrokenGroupReference", true, false),
        ("BrokenGroupReference", false, false),
        ("BrokenDeletedObjects", true, true),
        ("BrokenDeletedObjects", false, false),
        ("BrokenDifferentEntryHistoryUuid", true, true),
        ("BrokenDifferentEntryHistoryUuid", false, false),
    ];
    for (base_name, strict, expect_error) in table {
        let result = read_xml(fixture(base_name), strict);
        assert_eq!(
            result.is_err(),
            expect_error,
            "{} (strict={}) gave {:?}",
            base_name,
            strict,
            result.err()
        );
    }
}

#[test]
fn test_xml_lenient_repairs_group_uuid() {
    let (db, warnings) = open("BrokenNoGroupUuid", false);
    assert!(!db.root_group().uuid.is_nil());
    assert!(warnings
        .iter()
        .any(|w| matches!(w, Warning::GroupUuidRepaired(_))));
}

#[test]
fn test_xml_lenient_repairs_entry_uuid() {
    let (db, warnings) = open("BrokenNoEntryUuid", false);
    let entry = &db.root_group().entries()[0];
    assert!(!entry.uuid.is_nil());
    assert!(warnings
        .iter()
        .any(|w| matches!(w, Warning::EntryUuidRepaired(_))));
}

#[test]
fn test_xml_lenient_drops_incomplete_deleted_object() {
    let (db, warnings) = open("BrokenDeletedObjects", false);
    // The record missing its DeletionTime is skipped, the complete one kept.
    assert_eq!(db.deleted_objects().len(), 1);
    assert_eq!(db.deleted_objects()[0].uuid, uuid_b64("80h8uSNWgkKhKCp1TgXF7g=="));
    assert!(warnings.contains(&Warning::DeletedObjectDropped));
}

#[test]
fn test_xml_repair_uuid_history_item() {
    let (db, warnings) = open("BrokenDifferentEntryHistoryUuid", false);
    let entries = db.root_group().entries();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.history.len(), 1);
    assert!(!entry.uuid.is_nil());
    assert!(!entry.history[0].uuid.is_nil());
    assert_eq!(entry.history[0].uuid, entry.uuid);
    assert!(warnings
        .iter()
        .any(|w| matches!(w, Warning::HistoryUuidRepaired(_))));
}

#[test]
fn test_xml_dangling_reference_warns_in_both_modes() {
    for strict in [true, false] {
        let (_, warnings) = open("BrokenGroupReference", strict);
        assert!(
            warnings
                .iter()
                .any(|w| matches!(w, Warning::UnresolvedReference { element, .. }
                    if element == "LastSelectedGroup")),
            "strict={}",
            strict
        );
    }
}

#[test]
fn test_xml_empty_uuid_references_are_fine_in_strict_mode() {
    let (db, warnings) = open("EmptyUuids", true);
    assert!(warnings.is_empty(), "{:?}", warnings);
    assert!(db.metadata().recycle_bin_uuid.is_nil());
    assert!(db.root_group().last_top_visible_entry.is_nil());
    assert_eq!(db.root_group().entries()[0].custom_icon_uuid, None);
}

fn assert_db_eq(a: &Database, b: &Database) {
    assert_eq!(a.metadata(), b.metadata());
    assert_eq!(a.deleted_objects(), b.deleted_objects());
    let groups_a = a.all_groups();
    let groups_b = b.all_groups();
    assert_eq!(groups_a.len(), groups_b.len());
    for (ga, gb) in groups_a.iter().zip(groups_b.iter()) {
        assert_eq!(a.group(*ga), b.group(*gb));
    }
}

#[test]
fn test_invalid_xml_chars_are_scrubbed_on_write() {
    let plain_invalid = "\u{02}\u{19}\u{FFFE}\u{FFFF}";
    let plain_valid = "\u{09}\u{0A}\u{20}\u{D7FF}\u{E000}\u{FFFD}";
    let surrogate_valid1 = "\u{10437}";
    let surrogate_valid2 = "1\u{10437}2";

    let mut db = Database::new();
    let mut entry = kdbx3::Entry::new();
    entry.attributes.set("PlainInvalid", plain_invalid, false);
    entry.attributes.set("PlainValid", plain_valid, false);
    entry.attributes.set("SurrogateValid1", surrogate_valid1, false);
    entry.attributes.set("SurrogateValid2", surrogate_valid2, false);
    db.root_group_mut().add_entry(entry);

    let mut buf = Vec::new();
    write_xml(&mut buf, &db, None, None).expect("write succeeds");
    let (again, _) = read_xml(&buf[..], true).expect("read succeeds");
    let entry = &again.root_group().entries()[0];
    assert_eq!(entry.attributes.value("PlainInvalid"), "");
    assert_eq!(entry.attributes.value("PlainValid"), plain_valid);
    assert_eq!(entry.attributes.value("SurrogateValid1"), surrogate_valid1);
    assert_eq!(entry.attributes.value("SurrogateValid2"), surrogate_valid2);
}

#[test]
fn test_out_of_range_icon_id_is_clamped() {
    let doc = br#"<?xml version="1.0" encoding="utf-8"?>
<KeePassFile>
	<Meta>
		<Generator>KeePass</Generator>
	</Meta>
	<Root>
		<Group>
			<UUID>lmU+9n0aeESKZvcEze+bRg==</UUID>
			<Name>Root</Name>
			<IconID>104</IconID>
		</Group>
	</Root>
</KeePassFile>
"#;
    let (db, warnings) = read_xml(&doc[..], true).expect("clamping is not an error");
    assert_eq!(db.root_group().icon_id, 68);
    assert!(warnings.contains(&Warning::IconIdClamped {
        requested: 104,
        used: 68
    }));
}

#[test]
fn test_xml_structural_round_trip() {
    let (db, _) = open("NewDatabase", true);
    let mut buf = Vec::new();
    write_xml(&mut buf, &db, None, None).expect("write succeeds");
    let (again, warnings) =
        read_xml(&buf[..], true).expect("re-reading our own output succeeds");
    assert!(warnings.is_empty(), "{:?}", warnings);
    assert_db_eq(&db, &again);
}
