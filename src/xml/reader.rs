//! Streaming pull-parser that rebuilds a [`Database`] from the decrypted
//! payload.
//!
//! The parser walks the document once, strictly in order, which is what
//! keeps the inner random stream aligned: every `Protected="True"` value is
//! pushed through the stream exactly when it is encountered, even when the
//! surrounding element is later thrown away.

use std::collections::HashMap;
use std::io::Read;

use base64::decode as base64_decode;
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use uuid::Uuid;
use xml::attribute::OwnedAttribute;
use xml::name::OwnedName;
use xml::reader::{EventReader, ParserConfig, XmlEvent};

use super::chars::{decode_lossy, is_valid_xml_char};
use crate::error::{Error, Result, Warning};
use crate::format::ICON_COUNT;
use crate::model::{
    epoch, AutoTypeAssociation, Database, DeletedObject, Entry, GroupId, Times, TriState,
};
use crate::random_stream::InnerRandomStream;

pub(crate) enum ElementEvent {
    Start {
        name: OwnedName,
        attributes: Vec<OwnedAttribute>,
    },
    End {
        name: OwnedName,
    },
}

fn xml_err(err: xml::reader::Error) -> Error {
    // An error from a lower stream layer (bad block hash, bad padding)
    // arrives wrapped in the parser's error; recover its identity so it
    // keeps its integrity/crypto classification.
    if let xml::reader::ErrorKind::Io(io) = err.kind() {
        if let Some(inner) = io.get_ref().and_then(|r| r.downcast_ref::<Error>()) {
            if let Some(replica) = inner.replicate() {
                return replica;
            }
        }
        return Error::Io(std::io::Error::new(io.kind(), io.to_string()));
    }
    Error::Xml(err.to_string())
}

fn find_next_element<R: Read>(reader: &mut EventReader<R>) -> Result<ElementEvent> {
    loop {
        match reader.next().map_err(xml_err)? {
            XmlEvent::StartDocument { .. } | XmlEvent::EndDocument => {
                return Err(Error::Xml("malformed XML document".to_string()));
            }
            XmlEvent::StartElement {
                name, attributes, ..
            } => {
                return Ok(ElementEvent::Start { name, attributes });
            }
            XmlEvent::EndElement { name, .. } => {
                return Ok(ElementEvent::End { name });
            }
            _ => {}
        }
    }
}

/// Skip the rest of the element that `name` opened, nested children and all.
fn consume_element<R: Read>(reader: &mut EventReader<R>, name: OwnedName) -> Result<()> {
    let mut elements = vec![name];
    while !elements.is_empty() {
        match reader.next().map_err(xml_err)? {
            XmlEvent::StartDocument { .. } | XmlEvent::EndDocument => {
                return Err(Error::Xml("malformed XML document".to_string()));
            }
            XmlEvent::StartElement { name, .. } => elements.push(name),
            XmlEvent::EndElement { name, .. } => {
                let start_tag = elements.pop().unwrap();
                if start_tag != name {
                    return Err(Error::Xml(format!(
                        "start tag <{}> mismatches end tag </{}>",
                        start_tag, name
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Collect the direct text of the element `name` opened; nested elements
/// are skipped. Characters outside the XML 1.0 range are dropped.
fn read_text<R: Read>(reader: &mut EventReader<R>, name: OwnedName) -> Result<String> {
    let mut elements = vec![name];
    let mut text = String::new();
    while !elements.is_empty() {
        match reader.next().map_err(xml_err)? {
            XmlEvent::StartDocument { .. } | XmlEvent::EndDocument => {
                return Err(Error::Xml("malformed XML document".to_string()));
            }
            XmlEvent::StartElement { name, .. } => elements.push(name),
            XmlEvent::Characters(chunk) | XmlEvent::Whitespace(chunk) => {
                if elements.len() == 1 {
                    text.push_str(&chunk);
                }
            }
            XmlEvent::EndElement { name, .. } => {
                let start_tag = elements.pop().unwrap();
                if start_tag != name {
                    return Err(Error::Xml(format!(
                        "start tag <{}> mismatches end tag </{}>",
                        start_tag, name
                    )));
                }
            }
            _ => {}
        }
    }
    if text.chars().all(is_valid_xml_char) {
        Ok(text)
    } else {
        Ok(text.chars().filter(|c| is_valid_xml_char(*c)).collect())
    }
}

fn parse_bool(text: &str) -> bool {
    text.eq_ignore_ascii_case("true")
}

fn parse_i64(text: &str) -> i64 {
    text.trim().parse().unwrap_or(0)
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Empty or malformed UUID text reads as nil.
fn parse_uuid(text: &str) -> Uuid {
    base64_decode(text.trim())
        .ok()
        .and_then(|bytes| Uuid::from_slice(&bytes).ok())
        .unwrap_or_else(Uuid::nil)
}

fn attribute<'a>(attributes: &'a [OwnedAttribute], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.local_name == name)
        .map(|a| a.value.as_str())
}

/// Reader for the XML payload of a KDBX 3 file, or for a standalone
/// unencrypted XML document (pass `None` for the random stream; protected
/// flags are then honoured without unmasking anything).
pub struct Kdbx3XmlReader<'a> {
    strict: bool,
    random_stream: Option<&'a mut InnerRandomStream>,
    warnings: Vec<Warning>,
    header_hash: Option<Vec<u8>>,
    binary_pool: HashMap<String, Vec<u8>>,
}

impl<'a> Kdbx3XmlReader<'a> {
    pub fn new(strict: bool, random_stream: Option<&'a mut InnerRandomStream>) -> Self {
        Self {
            strict,
            random_stream,
            warnings: Vec::new(),
            header_hash: None,
            binary_pool: HashMap::new(),
        }
    }

    /// `Meta/HeaderHash`, when the document declared one.
    pub fn header_hash(&self) -> Option<&[u8]> {
        self.header_hash.as_deref()
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }

    /// Parse the document into `db`. On error the database is left in its
    /// partially-built state; whether the caller keeps it is its own
    /// decision.
    pub fn read<R: Read>(&mut self, source: R, db: &mut Database) -> Result<()> {
        let mut reader = ParserConfig::new()
            .cdata_to_characters(true)
            .create_reader(source);

        loop {
            match reader.next().map_err(xml_err)? {
                XmlEvent::StartDocument { .. } => {}
                XmlEvent::StartElement { name, .. } if name.local_name == "KeePassFile" => {
                    self.read_keepass_file(&mut reader, db)?;
                    break;
                }
                XmlEvent::StartElement { name, .. } => {
                    return Err(Error::Xml(format!(
                        "unexpected root element <{}>",
                        name.local_name
                    )));
                }
                XmlEvent::EndDocument => {
                    return Err(Error::Xml("empty XML document".to_string()));
                }
                _ => {}
            }
        }

        self.check_references(db);
        Ok(())
    }

    fn read_keepass_file<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        db: &mut Database,
    ) -> Result<()> {
        let mut root_seen = false;
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Meta" => {
                    self.read_meta(reader, db)?;
                }
                ElementEvent::Start { name, .. } if name.local_name == "Root" => {
                    if root_seen {
                        return Err(Error::Xml("multiple Root elements".to_string()));
                    }
                    root_seen = true;
                    self.read_root(reader, db)?;
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "KeePassFile" => break,
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
        if !root_seen {
            return Err(Error::Xml("no Root element".to_string()));
        }
        Ok(())
    }

    fn read_meta<R: Read>(&mut self, reader: &mut EventReader<R>, db: &mut Database) -> Result<()> {
        loop {
            let name = match find_next_element(reader)? {
                ElementEvent::Start { name, .. } => name,
                ElementEvent::End { name } if name.local_name == "Meta" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            };
            let meta = db.metadata_mut();
            match name.local_name.as_str() {
                "Generator" => meta.generator = read_text(reader, name)?,
                "HeaderHash" => {
                    self.header_hash = base64_decode(read_text(reader, name)?.trim()).ok();
                }
                "DatabaseName" => meta.database_name = read_text(reader, name)?,
                "DatabaseNameChanged" => {
                    meta.database_name_changed = parse_datetime(&read_text(reader, name)?);
                }
                "DatabaseDescription" => meta.database_description = read_text(reader, name)?,
                "DatabaseDescriptionChanged" => {
                    meta.database_description_changed = parse_datetime(&read_text(reader, name)?);
                }
                "DefaultUserName" => meta.default_user_name = read_text(reader, name)?,
                "DefaultUserNameChanged" => {
                    meta.default_user_name_changed = parse_datetime(&read_text(reader, name)?);
                }
                "MaintenanceHistoryDays" => {
                    meta.maintenance_history_days = parse_i64(&read_text(reader, name)?).max(0) as u32;
                }
                "Color" => meta.color = crate::model::Color::parse(&read_text(reader, name)?),
                "MasterKeyChanged" => {
                    meta.master_key_changed = parse_datetime(&read_text(reader, name)?);
                }
                "MasterKeyChangeRec" => {
                    meta.master_key_change_rec = parse_i64(&read_text(reader, name)?);
                }
                "MasterKeyChangeForce" => {
                    meta.master_key_change_force = parse_i64(&read_text(reader, name)?);
                }
                "MemoryProtection" => self.read_memory_protection(reader, db)?,
                "CustomIcons" => self.read_custom_icons(reader, db)?,
                "Binaries" => self.read_binaries(reader)?,
                "RecycleBinEnabled" => {
                    meta.recycle_bin_enabled = parse_bool(&read_text(reader, name)?);
                }
                "RecycleBinUUID" => meta.recycle_bin_uuid = parse_uuid(&read_text(reader, name)?),
                "RecycleBinChanged" => {
                    meta.recycle_bin_changed = parse_datetime(&read_text(reader, name)?);
                }
                "EntryTemplatesGroup" => {
                    meta.entry_templates_group = parse_uuid(&read_text(reader, name)?);
                }
                "EntryTemplatesGroupChanged" => {
                    meta.entry_templates_group_changed = parse_datetime(&read_text(reader, name)?);
                }
                "HistoryMaxItems" => {
                    meta.history_max_items = parse_i64(&read_text(reader, name)?) as i32;
                }
                "HistoryMaxSize" => meta.history_max_size = parse_i64(&read_text(reader, name)?),
                "LastSelectedGroup" => {
                    meta.last_selected_group = parse_uuid(&read_text(reader, name)?);
                }
                "LastTopVisibleGroup" => {
                    meta.last_top_visible_group = parse_uuid(&read_text(reader, name)?);
                }
                "CustomData" => self.read_custom_data(reader, db)?,
                _ => consume_element(reader, name)?,
            }
        }
    }

    fn read_memory_protection<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        db: &mut Database,
    ) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } => {
                    let protection = &mut db.metadata_mut().memory_protection;
                    match name.local_name.as_str() {
                        "ProtectTitle" => {
                            protection.protect_title = parse_bool(&read_text(reader, name)?)
                        }
                        "ProtectUserName" => {
                            protection.protect_user_name = parse_bool(&read_text(reader, name)?)
                        }
                        "ProtectPassword" => {
                            protection.protect_password = parse_bool(&read_text(reader, name)?)
                        }
                        "ProtectURL" => {
                            protection.protect_url = parse_bool(&read_text(reader, name)?)
                        }
                        "ProtectNotes" => {
                            protection.protect_notes = parse_bool(&read_text(reader, name)?)
                        }
                        _ => consume_element(reader, name)?,
                    }
                }
                ElementEvent::End { name } if name.local_name == "MemoryProtection" => {
                    return Ok(())
                }
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_custom_icons<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        db: &mut Database,
    ) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Icon" => {
                    let mut uuid = Uuid::nil();
                    let mut data = Vec::new();
                    loop {
                        match find_next_element(reader)? {
                            ElementEvent::Start { name, .. } if name.local_name == "UUID" => {
                                uuid = parse_uuid(&read_text(reader, name)?);
                            }
                            ElementEvent::Start { name, .. } if name.local_name == "Data" => {
                                data = base64_decode(read_text(reader, name)?.trim())
                                    .unwrap_or_default();
                            }
                            ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                            ElementEvent::End { name } if name.local_name == "Icon" => break,
                            ElementEvent::End { name } => {
                                return Err(Error::Xml(format!(
                                    "unexpected </{}>",
                                    name.local_name
                                )));
                            }
                        }
                    }
                    if !uuid.is_nil() {
                        db.metadata_mut().add_custom_icon(uuid, data);
                    }
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "CustomIcons" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_binaries<R: Read>(&mut self, reader: &mut EventReader<R>) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, attributes } if name.local_name == "Binary" => {
                    let id = attribute(&attributes, "ID").unwrap_or("").to_string();
                    let compressed = attribute(&attributes, "Compressed")
                        .map(parse_bool)
                        .unwrap_or(false);
                    let raw = base64_decode(read_text(reader, name)?.trim()).unwrap_or_default();
                    let data = if compressed {
                        let mut out = Vec::new();
                        GzDecoder::new(&raw[..])
                            .read_to_end(&mut out)
                            .map_err(|e| Error::Xml(format!("corrupt pooled binary: {}", e)))?;
                        out
                    } else {
                        raw
                    };
                    self.binary_pool.insert(id, data);
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "Binaries" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_custom_data<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        db: &mut Database,
    ) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Item" => {
                    let mut key = String::new();
                    let mut value = String::new();
                    loop {
                        match find_next_element(reader)? {
                            ElementEvent::Start { name, .. } if name.local_name == "Key" => {
                                key = read_text(reader, name)?;
                            }
                            ElementEvent::Start { name, .. } if name.local_name == "Value" => {
                                value = read_text(reader, name)?;
                            }
                            ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                            ElementEvent::End { name } if name.local_name == "Item" => break,
                            ElementEvent::End { name } => {
                                return Err(Error::Xml(format!(
                                    "unexpected </{}>",
                                    name.local_name
                                )));
                            }
                        }
                    }
                    db.metadata_mut().set_custom_data(&key, value);
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "CustomData" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_root<R: Read>(&mut self, reader: &mut EventReader<R>, db: &mut Database) -> Result<()> {
        let mut root_group_seen = false;
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Group" => {
                    if root_group_seen {
                        return Err(Error::Xml("multiple root groups".to_string()));
                    }
                    root_group_seen = true;
                    let root = db.root();
                    self.read_group(reader, db, root)?;
                }
                ElementEvent::Start { name, .. } if name.local_name == "DeletedObjects" => {
                    self.read_deleted_objects(reader, db)?;
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "Root" => break,
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
        if !root_group_seen {
            return Err(Error::Xml("no root group".to_string()));
        }
        Ok(())
    }

    fn clamp_icon_id(&mut self, requested: i64) -> i32 {
        let used = requested.clamp(0, (ICON_COUNT - 1) as i64) as i32;
        if i64::from(used) != requested {
            warn!("icon id {} out of range, clamped to {}", requested, used);
            self.warnings.push(Warning::IconIdClamped { requested, used });
        }
        used
    }

    fn read_group<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        db: &mut Database,
        id: GroupId,
    ) -> Result<()> {
        let mut uuid = Uuid::nil();
        loop {
            let (name, _attributes) = match find_next_element(reader)? {
                ElementEvent::Start { name, attributes } => (name, attributes),
                ElementEvent::End { name } if name.local_name == "Group" => break,
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            };
            match name.local_name.as_str() {
                "UUID" => uuid = parse_uuid(&read_text(reader, name)?),
                "Name" => db.group_mut(id).name = read_text(reader, name)?,
                "Notes" => db.group_mut(id).notes = read_text(reader, name)?,
                "IconID" => {
                    let requested = parse_i64(&read_text(reader, name)?);
                    db.group_mut(id).icon_id = self.clamp_icon_id(requested);
                }
                "CustomIconUUID" => {
                    let icon = parse_uuid(&read_text(reader, name)?);
                    db.group_mut(id).custom_icon_uuid = (!icon.is_nil()).then_some(icon);
                }
                "Times" => db.group_mut(id).times = self.read_times(reader)?,
                "IsExpanded" => db.group_mut(id).is_expanded = parse_bool(&read_text(reader, name)?),
                "DefaultAutoTypeSequence" => {
                    db.group_mut(id).default_auto_type_sequence = read_text(reader, name)?;
                }
                "EnableAutoType" => {
                    db.group_mut(id).enable_auto_type = self.read_tri_state(reader, name)?;
                }
                "EnableSearching" => {
                    db.group_mut(id).enable_searching = self.read_tri_state(reader, name)?;
                }
                "LastTopVisibleEntry" => {
                    db.group_mut(id).last_top_visible_entry = parse_uuid(&read_text(reader, name)?);
                }
                "Group" => {
                    let child = db.add_group(id);
                    self.read_group(reader, db, child)?;
                }
                "Entry" => {
                    let entry = self.read_entry(reader, false)?;
                    db.group_mut(id).add_entry(entry);
                }
                _ => consume_element(reader, name)?,
            }
        }

        if uuid.is_nil() {
            if self.strict {
                return Err(Error::Xml("null group uuid".to_string()));
            }
            uuid = Uuid::new_v4();
            warn!("group without uuid, assigned {}", uuid);
            self.warnings.push(Warning::GroupUuidRepaired(uuid));
        }
        db.group_mut(id).uuid = uuid;
        Ok(())
    }

    fn read_tri_state<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        name: OwnedName,
    ) -> Result<TriState> {
        let text = read_text(reader, name)?;
        Ok(if text.eq_ignore_ascii_case("true") {
            TriState::Enable
        } else if text.eq_ignore_ascii_case("false") {
            TriState::Disable
        } else {
            TriState::Inherit
        })
    }

    fn read_times<R: Read>(&mut self, reader: &mut EventReader<R>) -> Result<Times> {
        let mut times = Times::default();
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } => match name.local_name.as_str() {
                    "LastModificationTime" => {
                        times.last_modification_time =
                            parse_datetime(&read_text(reader, name)?).unwrap_or_else(epoch);
                    }
                    "CreationTime" => {
                        times.creation_time =
                            parse_datetime(&read_text(reader, name)?).unwrap_or_else(epoch);
                    }
                    "LastAccessTime" => {
                        times.last_access_time =
                            parse_datetime(&read_text(reader, name)?).unwrap_or_else(epoch);
                    }
                    "ExpiryTime" => {
                        times.expiry_time =
                            parse_datetime(&read_text(reader, name)?).unwrap_or_else(epoch);
                    }
                    "Expires" => times.expires = parse_bool(&read_text(reader, name)?),
                    "UsageCount" => {
                        times.usage_count = parse_i64(&read_text(reader, name)?).max(0) as u32;
                    }
                    "LocationChanged" => {
                        times.location_changed =
                            parse_datetime(&read_text(reader, name)?).unwrap_or_else(epoch);
                    }
                    _ => consume_element(reader, name)?,
                },
                ElementEvent::End { name } if name.local_name == "Times" => return Ok(times),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_entry<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        in_history: bool,
    ) -> Result<Entry> {
        let mut entry = Entry::default();
        loop {
            let name = match find_next_element(reader)? {
                ElementEvent::Start { name, .. } => name,
                ElementEvent::End { name } if name.local_name == "Entry" => break,
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            };
            match name.local_name.as_str() {
                "UUID" => entry.uuid = parse_uuid(&read_text(reader, name)?),
                "IconID" => {
                    let requested = parse_i64(&read_text(reader, name)?);
                    entry.icon_id = self.clamp_icon_id(requested);
                }
                "CustomIconUUID" => {
                    let icon = parse_uuid(&read_text(reader, name)?);
                    entry.custom_icon_uuid = (!icon.is_nil()).then_some(icon);
                }
                "ForegroundColor" => {
                    entry.foreground_color = crate::model::Color::parse(&read_text(reader, name)?);
                }
                "BackgroundColor" => {
                    entry.background_color = crate::model::Color::parse(&read_text(reader, name)?);
                }
                "OverrideURL" => entry.override_url = read_text(reader, name)?,
                "Tags" => entry.tags = read_text(reader, name)?,
                "Times" => entry.times = self.read_times(reader)?,
                "String" => self.read_entry_string(reader, &mut entry)?,
                "Binary" => self.read_entry_binary(reader, &mut entry)?,
                "AutoType" => self.read_auto_type(reader, &mut entry)?,
                "History" => {
                    if in_history {
                        // History is not nested; whatever is here is noise.
                        consume_element(reader, name)?;
                    } else {
                        self.read_history(reader, &mut entry)?;
                    }
                }
                _ => consume_element(reader, name)?,
            }
        }

        if entry.uuid.is_nil() {
            if self.strict {
                return Err(Error::Xml("null entry uuid".to_string()));
            }
            entry.uuid = Uuid::new_v4();
            warn!("entry without uuid, assigned {}", entry.uuid);
            self.warnings.push(Warning::EntryUuidRepaired(entry.uuid));
        }
        for item in &mut entry.history {
            if item.uuid != entry.uuid {
                if self.strict {
                    return Err(Error::Xml(
                        "history element with different uuid".to_string(),
                    ));
                }
                item.uuid = entry.uuid;
                self.warnings.push(Warning::HistoryUuidRepaired(entry.uuid));
            }
        }
        Ok(entry)
    }

    fn read_entry_string<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        entry: &mut Entry,
    ) -> Result<()> {
        let mut key = String::new();
        let mut value = String::new();
        let mut protected = false;
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Key" => {
                    key = read_text(reader, name)?;
                }
                ElementEvent::Start { name, attributes } if name.local_name == "Value" => {
                    protected = attribute(&attributes, "Protected")
                        .map(parse_bool)
                        .unwrap_or(false);
                    let text = read_text(reader, name)?;
                    value = match (protected, self.random_stream.as_deref_mut()) {
                        // The ciphertext must go through the stream even if
                        // this entry is discarded later, or every following
                        // protected value decodes to garbage.
                        (true, Some(stream)) => {
                            let mut data = base64_decode(text.trim()).map_err(|e| {
                                Error::Xml(format!("corrupt protected value: {}", e))
                            })?;
                            stream.apply_keystream(&mut data);
                            decode_lossy(&data)
                        }
                        // Plain-XML mode: the flag is honoured, the value
                        // is stored as-is.
                        _ => text,
                    };
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "String" => break,
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
        entry.attributes.set(&key, value, protected);
        Ok(())
    }

    fn read_entry_binary<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        entry: &mut Entry,
    ) -> Result<()> {
        let mut key = String::new();
        let mut data: Option<Vec<u8>> = None;
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Key" => {
                    key = read_text(reader, name)?;
                }
                ElementEvent::Start { name, attributes } if name.local_name == "Value" => {
                    let reference = attribute(&attributes, "Ref").map(str::to_string);
                    let compressed = attribute(&attributes, "Compressed")
                        .map(parse_bool)
                        .unwrap_or(false);
                    let text = read_text(reader, name)?;
                    data = match reference {
                        Some(id) => match self.binary_pool.get(&id) {
                            Some(pooled) => Some(pooled.clone()),
                            None => {
                                if self.strict {
                                    return Err(Error::Xml(format!(
                                        "unresolved binary reference {}",
                                        id
                                    )));
                                }
                                warn!("attachment {:?} references unknown binary {:?}", key, id);
                                self.warnings.push(Warning::UnresolvedBinaryRef {
                                    key: key.clone(),
                                    id,
                                });
                                None
                            }
                        },
                        None => {
                            let raw = base64_decode(text.trim()).unwrap_or_default();
                            if compressed {
                                let mut out = Vec::new();
                                GzDecoder::new(&raw[..]).read_to_end(&mut out).map_err(|e| {
                                    Error::Xml(format!("corrupt inline binary: {}", e))
                                })?;
                                Some(out)
                            } else {
                                Some(raw)
                            }
                        }
                    };
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "Binary" => break,
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
        if let Some(data) = data {
            entry.attachments.set(&key, data);
        }
        Ok(())
    }

    fn read_auto_type<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        entry: &mut Entry,
    ) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } => match name.local_name.as_str() {
                    "Enabled" => entry.auto_type.enabled = parse_bool(&read_text(reader, name)?),
                    "DataTransferObfuscation" => {
                        entry.auto_type.obfuscation = parse_i64(&read_text(reader, name)?) as i32;
                    }
                    "DefaultSequence" => {
                        entry.auto_type.default_sequence = read_text(reader, name)?;
                    }
                    "Association" => {
                        let mut association = AutoTypeAssociation::default();
                        loop {
                            match find_next_element(reader)? {
                                ElementEvent::Start { name, .. }
                                    if name.local_name == "Window" =>
                                {
                                    association.window = read_text(reader, name)?;
                                }
                                ElementEvent::Start { name, .. }
                                    if name.local_name == "KeystrokeSequence" =>
                                {
                                    association.sequence = read_text(reader, name)?;
                                }
                                ElementEvent::Start { name, .. } => {
                                    consume_element(reader, name)?
                                }
                                ElementEvent::End { name }
                                    if name.local_name == "Association" =>
                                {
                                    break
                                }
                                ElementEvent::End { name } => {
                                    return Err(Error::Xml(format!(
                                        "unexpected </{}>",
                                        name.local_name
                                    )));
                                }
                            }
                        }
                        entry.auto_type.associations.push(association);
                    }
                    _ => consume_element(reader, name)?,
                },
                ElementEvent::End { name } if name.local_name == "AutoType" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_history<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        entry: &mut Entry,
    ) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "Entry" => {
                    let item = self.read_entry(reader, true)?;
                    entry.history.push(item);
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "History" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    fn read_deleted_objects<R: Read>(
        &mut self,
        reader: &mut EventReader<R>,
        db: &mut Database,
    ) -> Result<()> {
        loop {
            match find_next_element(reader)? {
                ElementEvent::Start { name, .. } if name.local_name == "DeletedObject" => {
                    let mut uuid = Uuid::nil();
                    let mut deletion_time = None;
                    loop {
                        match find_next_element(reader)? {
                            ElementEvent::Start { name, .. } if name.local_name == "UUID" => {
                                uuid = parse_uuid(&read_text(reader, name)?);
                            }
                            ElementEvent::Start { name, .. }
                                if name.local_name == "DeletionTime" =>
                            {
                                deletion_time = parse_datetime(&read_text(reader, name)?);
                            }
                            ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                            ElementEvent::End { name } if name.local_name == "DeletedObject" => {
                                break
                            }
                            ElementEvent::End { name } => {
                                return Err(Error::Xml(format!(
                                    "unexpected </{}>",
                                    name.local_name
                                )));
                            }
                        }
                    }
                    match deletion_time {
                        Some(deletion_time) if !uuid.is_nil() => {
                            db.add_deleted_object(DeletedObject { uuid, deletion_time });
                        }
                        _ => {
                            if self.strict {
                                return Err(Error::Xml("incomplete DeletedObject".to_string()));
                            }
                            warn!("incomplete deleted object dropped");
                            self.warnings.push(Warning::DeletedObjectDropped);
                        }
                    }
                }
                ElementEvent::Start { name, .. } => consume_element(reader, name)?,
                ElementEvent::End { name } if name.local_name == "DeletedObjects" => return Ok(()),
                ElementEvent::End { name } => {
                    return Err(Error::Xml(format!("unexpected </{}>", name.local_name)));
                }
            }
        }
    }

    /// UUID references are stored loosely; a dangling one is worth a
    /// warning in either mode but never an error.
    fn check_references(&mut self, db: &Database) {
        let meta = db.metadata();
        let group_refs = [
            ("RecycleBinUUID", meta.recycle_bin_uuid),
            ("EntryTemplatesGroup", meta.entry_templates_group),
            ("LastSelectedGroup", meta.last_selected_group),
            ("LastTopVisibleGroup", meta.last_top_visible_group),
        ];
        for (element, uuid) in group_refs {
            if !uuid.is_nil() && db.find_group(uuid).is_none() {
                warn!("{} references unknown uuid {}", element, uuid);
                self.warnings.push(Warning::UnresolvedReference {
                    element: element.to_string(),
                    uuid,
                });
            }
        }
        for id in db.all_groups() {
            let group = db.group(id);
            if !group.last_top_visible_entry.is_nil()
                && db.find_entry(group.last_top_visible_entry).is_none()
            {
                self.warnings.push(Warning::UnresolvedReference {
                    element: "LastTopVisibleEntry".to_string(),
                    uuid: group.last_top_visible_entry,
                });
            }
            if let Some(icon) = group.custom_icon_uuid {
                if meta.custom_icon(icon).is_none() {
                    self.warnings.push(Warning::UnresolvedReference {
                        element: "CustomIconUUID".to_string(),
                        uuid: icon,
                    });
                }
            }
            for entry in group.entries() {
                if let Some(icon) = entry.custom_icon_uuid {
                    if meta.custom_icon(icon).is_none() {
                        self.warnings.push(Warning::UnresolvedReference {
                            element: "CustomIconUUID".to_string(),
                            uuid: icon,
                        });
                    }
                }
            }
        }
    }
}

/// Decode a plain, unencrypted XML document. Protected flags are kept but
/// no unmasking happens (there is no inner random stream to consume).
pub fn read_xml<R: Read>(
    source: R,
    strict: bool,
) -> std::result::Result<(Database, Vec<Warning>), Error> {
    let mut db = Database::new();
    let mut reader = Kdbx3XmlReader::new(strict, None);
    reader.read(source, &mut db)?;
    Ok((db, reader.take_warnings()))
}
