use uuid::Uuid;

use super::times::Times;
use super::Color;

pub const TITLE_FIELD: &str = "Title";
pub const USER_NAME_FIELD: &str = "UserName";
pub const PASSWORD_FIELD: &str = "Password";
pub const URL_FIELD: &str = "URL";
pub const NOTES_FIELD: &str = "Notes";

/// One named string attribute. The protected flag marks values that are
/// masked by the inner random stream on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attribute {
    pub value: String,
    pub protected: bool,
}

/// Ordered string attributes of an entry. Order is the document order of
/// the file and is preserved for round-trips.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryAttributes {
    items: Vec<(String, Attribute)>,
}

impl EntryAttributes {
    pub fn set(&mut self, key: &str, value: impl Into<String>, protected: bool) {
        let attribute = Attribute {
            value: value.into(),
            protected,
        };
        match self.items.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = attribute,
            None => self.items.push((key.to_string(), attribute)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, a)| a)
    }

    /// Value lookup; missing attributes read as the empty string.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).map(|a| a.value.as_str()).unwrap_or("")
    }

    pub fn is_protected(&self, key: &str) -> bool {
        self.get(key).map(|a| a.protected).unwrap_or(false)
    }

    pub fn remove(&mut self, key: &str) -> Option<Attribute> {
        let index = self.items.iter().position(|(k, _)| k == key)?;
        Some(self.items.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.items.iter().map(|(k, a)| (k.as_str(), a))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Ordered binary attachments of an entry, keyed by file name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attachments {
    items: Vec<(String, Vec<u8>)>,
}

impl Attachments {
    pub fn set(&mut self, key: &str, data: Vec<u8>) {
        match self.items.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = data,
            None => self.items.push((key.to_string(), data)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, d)| d.as_slice())
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        let index = self.items.iter().position(|(k, _)| k == key)?;
        Some(self.items.remove(index).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.items.iter().map(|(k, d)| (k.as_str(), d.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One auto-type window/keystroke pairing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutoTypeAssociation {
    pub window: String,
    pub sequence: String,
}

/// Auto-type settings of an entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AutoType {
    pub enabled: bool,
    pub obfuscation: i32,
    pub default_sequence: String,
    pub associations: Vec<AutoTypeAssociation>,
}

impl Default for AutoType {
    fn default() -> Self {
        Self {
            enabled: true,
            obfuscation: 0,
            default_sequence: String::new(),
            associations: Vec::new(),
        }
    }
}

/// A password entry, or one of its history snapshots.
///
/// History snapshots are plain entries stored inside their container; they
/// share its UUID and are not attached to any group.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Entry {
    pub uuid: Uuid,
    pub icon_id: i32,
    pub custom_icon_uuid: Option<Uuid>,
    pub foreground_color: Option<Color>,
    pub background_color: Option<Color>,
    pub override_url: String,
    /// Stored verbatim; any tag splitting is a higher-layer concern.
    pub tags: String,
    pub times: Times,
    pub attributes: EntryAttributes,
    pub attachments: Attachments,
    pub auto_type: AutoType,
    pub history: Vec<Entry>,
}

impl Entry {
    pub fn new() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            ..Self::default()
        }
    }

    pub fn title(&self) -> &str {
        self.attributes.value(TITLE_FIELD)
    }

    pub fn username(&self) -> &str {
        self.attributes.value(USER_NAME_FIELD)
    }

    pub fn password(&self) -> &str {
        self.attributes.value(PASSWORD_FIELD)
    }

    pub fn url(&self) -> &str {
        self.attributes.value(URL_FIELD)
    }

    pub fn notes(&self) -> &str {
        self.attributes.value(NOTES_FIELD)
    }

    pub fn set_title(&mut self, value: &str) {
        let protected = self.attributes.is_protected(TITLE_FIELD);
        self.attributes.set(TITLE_FIELD, value, protected);
    }

    pub fn set_password(&mut self, value: &str) {
        let protected = self.attributes.is_protected(PASSWORD_FIELD);
        self.attributes.set(PASSWORD_FIELD, value, protected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_order_is_preserved() {
        let mut attributes = EntryAttributes::default();
        attributes.set("zebra", "1", false);
        attributes.set("alpha", "2", true);
        attributes.set("mango", "3", false);
        attributes.set("zebra", "4", false);
        let keys: Vec<_> = attributes.keys().collect();
        assert_eq!(keys, vec!["zebra", "alpha", "mango"]);
        assert_eq!(attributes.value("zebra"), "4");
        assert!(attributes.is_protected("alpha"));
    }

    #[test]
    fn test_standard_field_accessors() {
        let mut entry = Entry::new();
        entry.attributes.set(USER_NAME_FIELD, "User Name", true);
        entry.attributes.set(URL_FIELD, "", true);
        assert_eq!(entry.username(), "User Name");
        assert_eq!(entry.url(), "");
        assert!(entry.attributes.is_protected(URL_FIELD));
        assert_eq!(entry.title(), "");
    }

    #[test]
    fn test_attachments() {
        let mut attachments = Attachments::default();
        attachments.set("myattach.txt", b"abcdefghijk".to_vec());
        attachments.set("aaa.txt", b"also an attachment".to_vec());
        assert_eq!(attachments.get("myattach.txt"), Some(&b"abcdefghijk"[..]));
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments.remove("aaa.txt"), Some(b"also an attachment".to_vec()));
        assert_eq!(attachments.get("aaa.txt"), None);
    }
}
