use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::entry::Entry;
use super::group::Group;
use super::metadata::Metadata;
use super::GroupId;
use crate::format::{Compression, CIPHER_AES256_CBC};
use crate::kdf::AesKdf;

/// Tombstone for a removed group or entry, kept for synchronisation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeletedObject {
    pub uuid: Uuid,
    pub deletion_time: DateTime<Utc>,
}

/// An in-memory KeePass database.
///
/// The database owns every group in an arena; the tree structure is
/// expressed with [`GroupId`] indices, which stay stable for the lifetime
/// of the database. This gives groups a parent back-reference without any
/// ownership cycle.
#[derive(Debug)]
pub struct Database {
    cipher: Uuid,
    compression: Compression,
    kdf: AesKdf,
    metadata: Metadata,
    groups: Vec<Group>,
    deleted_objects: Vec<DeletedObject>,
}

impl Database {
    /// An empty database: a root group and default settings.
    pub fn new() -> Self {
        Self {
            cipher: CIPHER_AES256_CBC,
            compression: Compression::Gzip,
            kdf: AesKdf::default(),
            metadata: Metadata::default(),
            groups: vec![Group::new(Uuid::new_v4())],
            deleted_objects: Vec::new(),
        }
    }

    pub fn root(&self) -> GroupId {
        GroupId(0)
    }

    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut Group {
        &mut self.groups[id.0]
    }

    pub fn root_group(&self) -> &Group {
        self.group(self.root())
    }

    pub fn root_group_mut(&mut self) -> &mut Group {
        self.group_mut(self.root())
    }

    /// Create an empty child group under `parent`.
    pub fn add_group(&mut self, parent: GroupId) -> GroupId {
        let id = GroupId(self.groups.len());
        let mut group = Group::new(Uuid::new_v4());
        group.parent = Some(parent);
        self.groups.push(group);
        self.groups[parent.0].children.push(id);
        id
    }

    /// Re-parent `id` under `new_parent`, detaching it from its previous
    /// parent in the same step. Moving the root or creating a cycle is
    /// refused.
    pub fn move_group(&mut self, id: GroupId, new_parent: GroupId) -> bool {
        if id == self.root() || id == new_parent {
            return false;
        }
        // Walk up from the target to make sure `id` is not an ancestor.
        let mut cursor = Some(new_parent);
        while let Some(current) = cursor {
            if current == id {
                return false;
            }
            cursor = self.groups[current.0].parent;
        }
        if let Some(old_parent) = self.groups[id.0].parent {
            self.groups[old_parent.0].children.retain(|c| *c != id);
        }
        self.groups[id.0].parent = Some(new_parent);
        self.groups[new_parent.0].children.push(id);
        true
    }

    /// Depth-first pre-order walk of the reachable tree.
    pub fn all_groups(&self) -> Vec<GroupId> {
        let mut out = Vec::new();
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            out.push(id);
            for child in self.groups[id.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Recursive lookup by group UUID, starting at the root.
    pub fn find_group(&self, uuid: Uuid) -> Option<GroupId> {
        self.all_groups()
            .into_iter()
            .find(|id| self.groups[id.0].uuid == uuid)
    }

    /// Recursive lookup of an entry by UUID. History snapshots are not
    /// searched.
    pub fn find_entry(&self, uuid: Uuid) -> Option<(GroupId, usize)> {
        for id in self.all_groups() {
            if let Some(index) = self.groups[id.0].entries.iter().position(|e| e.uuid == uuid) {
                return Some((id, index));
            }
        }
        None
    }

    pub fn entry(&self, location: (GroupId, usize)) -> &Entry {
        &self.groups[location.0 .0].entries[location.1]
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn cipher(&self) -> Uuid {
        self.cipher
    }

    pub fn set_cipher(&mut self, cipher: Uuid) {
        self.cipher = cipher;
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    pub fn kdf(&self) -> &AesKdf {
        &self.kdf
    }

    pub fn kdf_mut(&mut self) -> &mut AesKdf {
        &mut self.kdf
    }

    pub fn deleted_objects(&self) -> &[DeletedObject] {
        &self.deleted_objects
    }

    pub fn add_deleted_object(&mut self, object: DeletedObject) {
        self.deleted_objects.push(object);
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}
