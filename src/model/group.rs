use uuid::Uuid;

use super::entry::Entry;
use super::times::Times;
use super::GroupId;

/// Group-level toggle that either overrides or defers to an ancestor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriState {
    #[default]
    Inherit,
    Enable,
    Disable,
}

/// Default icon of a freshly created group (the closed folder).
pub const DEFAULT_GROUP_ICON: i32 = 48;

/// A folder in the database tree.
///
/// Groups live in an arena owned by [`super::Database`]; `parent` and
/// `children` are indices into it and are kept consistent by the arena
/// operations. Entries are owned by their group directly.
#[derive(Clone, Debug, PartialEq)]
pub struct Group {
    pub uuid: Uuid,
    pub name: String,
    pub notes: String,
    pub icon_id: i32,
    pub custom_icon_uuid: Option<Uuid>,
    pub is_expanded: bool,
    pub default_auto_type_sequence: String,
    pub enable_auto_type: TriState,
    pub enable_searching: TriState,
    pub times: Times,
    pub last_top_visible_entry: Uuid,
    pub(super) parent: Option<GroupId>,
    pub(super) children: Vec<GroupId>,
    pub(super) entries: Vec<Entry>,
}

impl Group {
    pub(super) fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            name: String::new(),
            notes: String::new(),
            icon_id: DEFAULT_GROUP_ICON,
            custom_icon_uuid: None,
            is_expanded: true,
            default_auto_type_sequence: String::new(),
            enable_auto_type: TriState::Inherit,
            enable_searching: TriState::Inherit,
            times: Times::default(),
            last_top_visible_entry: Uuid::nil(),
            parent: None,
            children: Vec::new(),
            entries: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn add_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    pub fn remove_entry(&mut self, uuid: Uuid) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.uuid == uuid)?;
        Some(self.entries.remove(index))
    }
}
