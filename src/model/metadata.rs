use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Color;

/// Which standard attributes new entries should protect in memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryProtection {
    pub protect_title: bool,
    pub protect_user_name: bool,
    pub protect_password: bool,
    pub protect_url: bool,
    pub protect_notes: bool,
}

impl Default for MemoryProtection {
    fn default() -> Self {
        Self {
            protect_title: false,
            protect_user_name: false,
            protect_password: true,
            protect_url: false,
            protect_notes: false,
        }
    }
}

/// A user-supplied icon, stored as the verbatim PNG bytes from the file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomIcon {
    pub uuid: Uuid,
    pub data: Vec<u8>,
}

/// Database-wide settings and bookkeeping from the `Meta` element.
#[derive(Clone, Debug, PartialEq)]
pub struct Metadata {
    pub generator: String,
    pub database_name: String,
    pub database_name_changed: Option<DateTime<Utc>>,
    pub database_description: String,
    pub database_description_changed: Option<DateTime<Utc>>,
    pub default_user_name: String,
    pub default_user_name_changed: Option<DateTime<Utc>>,
    pub maintenance_history_days: u32,
    pub color: Option<Color>,
    pub master_key_changed: Option<DateTime<Utc>>,
    /// Days between reminders to change the master key; -1 = never.
    pub master_key_change_rec: i64,
    /// Days before a master key change is forced; -1 = never.
    pub master_key_change_force: i64,
    pub memory_protection: MemoryProtection,
    custom_icons: Vec<CustomIcon>,
    pub recycle_bin_enabled: bool,
    pub recycle_bin_uuid: Uuid,
    pub recycle_bin_changed: Option<DateTime<Utc>>,
    pub entry_templates_group: Uuid,
    pub entry_templates_group_changed: Option<DateTime<Utc>>,
    pub last_selected_group: Uuid,
    pub last_top_visible_group: Uuid,
    /// -1 = unlimited. Independent of `history_max_size`; no pruning is
    /// done while reading.
    pub history_max_items: i32,
    /// -1 = unlimited, otherwise bytes.
    pub history_max_size: i64,
    custom_data: Vec<(String, String)>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            generator: String::new(),
            database_name: String::new(),
            database_name_changed: None,
            database_description: String::new(),
            database_description_changed: None,
            default_user_name: String::new(),
            default_user_name_changed: None,
            maintenance_history_days: 365,
            color: None,
            master_key_changed: None,
            master_key_change_rec: -1,
            master_key_change_force: -1,
            memory_protection: MemoryProtection::default(),
            custom_icons: Vec::new(),
            recycle_bin_enabled: true,
            recycle_bin_uuid: Uuid::nil(),
            recycle_bin_changed: None,
            entry_templates_group: Uuid::nil(),
            entry_templates_group_changed: None,
            last_selected_group: Uuid::nil(),
            last_top_visible_group: Uuid::nil(),
            history_max_items: -1,
            history_max_size: -1,
            custom_data: Vec::new(),
        }
    }
}

impl Metadata {
    pub fn custom_icons(&self) -> &[CustomIcon] {
        &self.custom_icons
    }

    pub fn custom_icon(&self, uuid: Uuid) -> Option<&[u8]> {
        self.custom_icons
            .iter()
            .find(|icon| icon.uuid == uuid)
            .map(|icon| icon.data.as_slice())
    }

    pub fn add_custom_icon(&mut self, uuid: Uuid, data: Vec<u8>) {
        match self.custom_icons.iter_mut().find(|icon| icon.uuid == uuid) {
            Some(icon) => icon.data = data,
            None => self.custom_icons.push(CustomIcon { uuid, data }),
        }
    }

    /// Free-form key/value pairs, in insertion order.
    pub fn custom_data(&self) -> &[(String, String)] {
        &self.custom_data
    }

    pub fn custom_data_value(&self, key: &str) -> Option<&str> {
        self.custom_data
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_custom_data(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.custom_data.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.custom_data.push((key.to_string(), value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_data_order() {
        let mut meta = Metadata::default();
        meta.set_custom_data("A Sample Test Key", "valu");
        meta.set_custom_data("custom key", "blub");
        assert_eq!(meta.custom_data_value("custom key"), Some("blub"));
        assert_eq!(meta.custom_data()[0].0, "A Sample Test Key");
        meta.set_custom_data("A Sample Test Key", "other");
        assert_eq!(meta.custom_data().len(), 2);
        assert_eq!(meta.custom_data()[0].1, "other");
    }

    #[test]
    fn test_custom_icons() {
        let mut meta = Metadata::default();
        let uuid = Uuid::new_v4();
        meta.add_custom_icon(uuid, vec![1, 2, 3]);
        assert_eq!(meta.custom_icon(uuid), Some(&[1u8, 2, 3][..]));
        assert_eq!(meta.custom_icon(Uuid::nil()), None);
    }
}
