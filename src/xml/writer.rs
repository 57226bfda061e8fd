//! Event-writer mirror of the XML reader, used for saving and for the
//! round-trip properties of the test suite.

use std::io::Write;

use base64::encode as base64_encode;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use xml::writer::{EmitterConfig, EventWriter, XmlEvent};

use super::chars::strip_invalid_chars;
use crate::error::{Error, Result};
use crate::model::{Color, Database, Entry, Group, GroupId, Times, TriState};
use crate::random_stream::InnerRandomStream;

fn writer_err(err: xml::writer::Error) -> Error {
    match err {
        xml::writer::Error::Io(err) => Error::Io(err),
        other => Error::Xml(other.to_string()),
    }
}

struct XmlWriter<'a, W: Write> {
    writer: EventWriter<W>,
    random_stream: Option<&'a mut InnerRandomStream>,
    binary_pool: Vec<Vec<u8>>,
}

impl<'a, W: Write> XmlWriter<'a, W> {
    fn start(&mut self, name: &str) -> Result<()> {
        self.writer
            .write(XmlEvent::start_element(name))
            .map_err(writer_err)
    }

    fn end(&mut self) -> Result<()> {
        self.writer.write(XmlEvent::end_element()).map_err(writer_err)
    }

    fn element(&mut self, name: &str, text: &str) -> Result<()> {
        self.start(name)?;
        let text = strip_invalid_chars(text);
        if !text.is_empty() {
            self.writer
                .write(XmlEvent::characters(&text))
                .map_err(writer_err)?;
        }
        self.end()
    }

    fn bool_element(&mut self, name: &str, value: bool) -> Result<()> {
        self.element(name, if value { "True" } else { "False" })
    }

    fn i64_element(&mut self, name: &str, value: i64) -> Result<()> {
        self.element(name, &value.to_string())
    }

    fn datetime_element(&mut self, name: &str, value: DateTime<Utc>) -> Result<()> {
        self.element(name, &value.format("%FT%TZ").to_string())
    }

    fn optional_datetime_element(
        &mut self,
        name: &str,
        value: Option<DateTime<Utc>>,
    ) -> Result<()> {
        match value {
            Some(value) => self.datetime_element(name, value),
            None => Ok(()),
        }
    }

    fn uuid_element(&mut self, name: &str, value: Uuid) -> Result<()> {
        self.element(name, &base64_encode(value.as_bytes()))
    }

    fn color_element(&mut self, name: &str, value: Option<Color>) -> Result<()> {
        match value {
            Some(color) => self.element(name, &color.to_string()),
            None => self.element(name, ""),
        }
    }

    fn tri_state_element(&mut self, name: &str, value: TriState) -> Result<()> {
        self.element(
            name,
            match value {
                TriState::Inherit => "null",
                TriState::Enable => "True",
                TriState::Disable => "False",
            },
        )
    }

    fn pool_index(&self, data: &[u8]) -> usize {
        self.binary_pool
            .iter()
            .position(|pooled| pooled == data)
            .expect("attachment collected into pool")
    }

    fn write_meta(&mut self, db: &Database, header_hash: Option<&[u8]>) -> Result<()> {
        let meta = db.metadata();
        self.start("Meta")?;
        self.element("Generator", &meta.generator)?;
        if let Some(hash) = header_hash {
            self.element("HeaderHash", &base64_encode(hash))?;
        }
        self.element("DatabaseName", &meta.database_name)?;
        self.optional_datetime_element("DatabaseNameChanged", meta.database_name_changed)?;
        self.element("DatabaseDescription", &meta.database_description)?;
        self.optional_datetime_element(
            "DatabaseDescriptionChanged",
            meta.database_description_changed,
        )?;
        self.element("DefaultUserName", &meta.default_user_name)?;
        self.optional_datetime_element("DefaultUserNameChanged", meta.default_user_name_changed)?;
        self.i64_element("MaintenanceHistoryDays", meta.maintenance_history_days.into())?;
        self.color_element("Color", meta.color)?;
        self.optional_datetime_element("MasterKeyChanged", meta.master_key_changed)?;
        self.i64_element("MasterKeyChangeRec", meta.master_key_change_rec)?;
        self.i64_element("MasterKeyChangeForce", meta.master_key_change_force)?;

        self.start("MemoryProtection")?;
        self.bool_element("ProtectTitle", meta.memory_protection.protect_title)?;
        self.bool_element("ProtectUserName", meta.memory_protection.protect_user_name)?;
        self.bool_element("ProtectPassword", meta.memory_protection.protect_password)?;
        self.bool_element("ProtectURL", meta.memory_protection.protect_url)?;
        self.bool_element("ProtectNotes", meta.memory_protection.protect_notes)?;
        self.end()?;

        if !meta.custom_icons().is_empty() {
            self.start("CustomIcons")?;
            for icon in meta.custom_icons() {
                self.start("Icon")?;
                self.uuid_element("UUID", icon.uuid)?;
                self.element("Data", &base64_encode(&icon.data))?;
                self.end()?;
            }
            self.end()?;
        }

        if !self.binary_pool.is_empty() {
            self.start("Binaries")?;
            for index in 0..self.binary_pool.len() {
                let encoded = base64_encode(&self.binary_pool[index]);
                self.writer
                    .write(
                        XmlEvent::start_element("Binary")
                            .attr("ID", &index.to_string())
                            .attr("Compressed", "False"),
                    )
                    .map_err(writer_err)?;
                self.writer
                    .write(XmlEvent::characters(&encoded))
                    .map_err(writer_err)?;
                self.end()?;
            }
            self.end()?;
        }

        self.bool_element("RecycleBinEnabled", meta.recycle_bin_enabled)?;
        self.uuid_element("RecycleBinUUID", meta.recycle_bin_uuid)?;
        self.optional_datetime_element("RecycleBinChanged", meta.recycle_bin_changed)?;
        self.uuid_element("EntryTemplatesGroup", meta.entry_templates_group)?;
        self.optional_datetime_element(
            "EntryTemplatesGroupChanged",
            meta.entry_templates_group_changed,
        )?;
        self.i64_element("HistoryMaxItems", meta.history_max_items.into())?;
        self.i64_element("HistoryMaxSize", meta.history_max_size)?;
        self.uuid_element("LastSelectedGroup", meta.last_selected_group)?;
        self.uuid_element("LastTopVisibleGroup", meta.last_top_visible_group)?;

        if !meta.custom_data().is_empty() {
            self.start("CustomData")?;
            for (key, value) in meta.custom_data() {
                self.start("Item")?;
                self.element("Key", key)?;
                self.element("Value", value)?;
                self.end()?;
            }
            self.end()?;
        }

        self.end()
    }

    fn write_times(&mut self, times: &Times) -> Result<()> {
        self.start("Times")?;
        self.datetime_element("LastModificationTime", times.last_modification_time)?;
        self.datetime_element("CreationTime", times.creation_time)?;
        self.datetime_element("LastAccessTime", times.last_access_time)?;
        self.datetime_element("ExpiryTime", times.expiry_time)?;
        self.bool_element("Expires", times.expires)?;
        self.i64_element("UsageCount", times.usage_count.into())?;
        self.datetime_element("LocationChanged", times.location_changed)?;
        self.end()
    }

    fn write_entry(&mut self, entry: &Entry, in_history: bool) -> Result<()> {
        self.start("Entry")?;
        self.uuid_element("UUID", entry.uuid)?;
        self.i64_element("IconID", entry.icon_id.into())?;
        if let Some(icon) = entry.custom_icon_uuid {
            self.uuid_element("CustomIconUUID", icon)?;
        }
        self.color_element("ForegroundColor", entry.foreground_color)?;
        self.color_element("BackgroundColor", entry.background_color)?;
        self.element("OverrideURL", &entry.override_url)?;
        self.element("Tags", &entry.tags)?;
        self.write_times(&entry.times)?;

        for (key, attribute) in entry.attributes.iter() {
            self.start("String")?;
            self.element("Key", key)?;
            if attribute.protected {
                // Scrub before masking so the stream consumes exactly the
                // bytes a reader will feed back through it.
                let plain = strip_invalid_chars(&attribute.value);
                let text = match self.random_stream.as_deref_mut() {
                    Some(stream) => {
                        let mut data = plain.as_bytes().to_vec();
                        stream.apply_keystream(&mut data);
                        base64_encode(&data)
                    }
                    None => plain.into_owned(),
                };
                self.writer
                    .write(XmlEvent::start_element("Value").attr("Protected", "True"))
                    .map_err(writer_err)?;
                if !text.is_empty() {
                    self.writer
                        .write(XmlEvent::characters(&text))
                        .map_err(writer_err)?;
                }
                self.end()?;
            } else {
                self.element("Value", &attribute.value)?;
            }
            self.end()?;
        }

        for (key, data) in entry.attachments.iter() {
            let index = self.pool_index(data);
            self.start("Binary")?;
            self.element("Key", key)?;
            self.writer
                .write(XmlEvent::start_element("Value").attr("Ref", &index.to_string()))
                .map_err(writer_err)?;
            self.end()?;
            self.end()?;
        }

        self.start("AutoType")?;
        self.bool_element("Enabled", entry.auto_type.enabled)?;
        self.i64_element("DataTransferObfuscation", entry.auto_type.obfuscation.into())?;
        self.element("DefaultSequence", &entry.auto_type.default_sequence)?;
        for association in &entry.auto_type.associations {
            self.start("Association")?;
            self.element("Window", &association.window)?;
            self.element("KeystrokeSequence", &association.sequence)?;
            self.end()?;
        }
        self.end()?;

        if !in_history {
            self.start("History")?;
            for item in &entry.history {
                self.write_entry(item, true)?;
            }
            self.end()?;
        }

        self.end()
    }

    fn write_group(&mut self, db: &Database, id: GroupId) -> Result<()> {
        let group: &Group = db.group(id);
        self.start("Group")?;
        self.uuid_element("UUID", group.uuid)?;
        self.element("Name", &group.name)?;
        self.element("Notes", &group.notes)?;
        self.i64_element("IconID", group.icon_id.into())?;
        if let Some(icon) = group.custom_icon_uuid {
            self.uuid_element("CustomIconUUID", icon)?;
        }
        self.write_times(&group.times)?;
        self.bool_element("IsExpanded", group.is_expanded)?;
        self.element("DefaultAutoTypeSequence", &group.default_auto_type_sequence)?;
        self.tri_state_element("EnableAutoType", group.enable_auto_type)?;
        self.tri_state_element("EnableSearching", group.enable_searching)?;
        self.uuid_element("LastTopVisibleEntry", group.last_top_visible_entry)?;
        for entry in group.entries() {
            self.write_entry(entry, false)?;
        }
        for child in group.children() {
            self.write_group(db, *child)?;
        }
        self.end()
    }
}

fn collect_entry_binaries(entry: &Entry, pool: &mut Vec<Vec<u8>>) {
    for (_, data) in entry.attachments.iter() {
        if !pool.iter().any(|pooled| pooled == data) {
            pool.push(data.to_vec());
        }
    }
    for item in &entry.history {
        collect_entry_binaries(item, pool);
    }
}

/// Every distinct attachment payload, in document order; this becomes the
/// `Meta/Binaries` pool.
fn collect_binaries(db: &Database) -> Vec<Vec<u8>> {
    let mut pool = Vec::new();
    for id in db.all_groups() {
        for entry in db.group(id).entries() {
            collect_entry_binaries(entry, &mut pool);
        }
    }
    pool
}

/// Serialise `db` as a KeePassFile document. With a random stream the
/// protected values are masked in document order; without one they are
/// written in the clear (plain-XML mode).
pub fn write_xml<W: Write>(
    sink: W,
    db: &Database,
    random_stream: Option<&mut InnerRandomStream>,
    header_hash: Option<&[u8]>,
) -> Result<()> {
    let writer = EmitterConfig::new()
        .perform_indent(true)
        .create_writer(sink);
    let mut xml = XmlWriter {
        writer,
        random_stream,
        binary_pool: collect_binaries(db),
    };

    xml.start("KeePassFile")?;
    xml.write_meta(db, header_hash)?;
    xml.start("Root")?;
    xml.write_group(db, db.root())?;
    if !db.deleted_objects().is_empty() {
        xml.start("DeletedObjects")?;
        for object in db.deleted_objects() {
            xml.start("DeletedObject")?;
            xml.uuid_element("UUID", object.uuid)?;
            xml.datetime_element("DeletionTime", object.deletion_time)?;
            xml.end()?;
        }
        xml.end()?;
    }
    xml.end()?;
    xml.end()?;
    Ok(())
}
