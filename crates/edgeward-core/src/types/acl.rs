use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Entries present in a remote ACL: identifier -> remote entry id
pub type AclEntries = BTreeMap<String, String>;

/// One capacity-bounded remote ACL plus its staged, uncommitted changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    /// Remote ACL ID
    pub id: String,

    /// ACL name, referenced from generated conditions
    pub name: String,

    /// Owning service ID
    pub service_id: String,

    /// Service version the ACL was created in
    pub version: String,

    /// Identifiers staged for creation
    #[serde(default)]
    pub entries_to_add: BTreeSet<String>,

    /// Identifiers staged for deletion
    #[serde(default)]
    pub entries_to_delete: BTreeSet<String>,

    /// Entries confirmed present on the remote side
    #[serde(default)]
    pub entries: AclEntries,

    /// Entries counted against the ACL capacity, staged changes included
    #[serde(default)]
    pub entry_count: usize,

    /// Whether the remote ACL exists
    #[serde(default)]
    pub created: bool,
}

impl Acl {
    /// An empty ACL that exists on the remote side
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        service_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            service_id: service_id.into(),
            version: version.into(),
            created: true,
            ..Self::default()
        }
    }

    /// Returns true if no more additions fit
    #[must_use]
    pub const fn is_full(&self, capacity: usize) -> bool {
        self.entry_count >= capacity
    }

    /// Returns true if the identifier is confirmed present remotely
    #[must_use]
    pub fn contains(&self, item: &str) -> bool {
        self.entries.contains_key(item)
    }

    /// Returns true if anything is staged
    #[must_use]
    pub fn has_staged_changes(&self) -> bool {
        !self.entries_to_add.is_empty() || !self.entries_to_delete.is_empty()
    }

    /// Staged additions not yet present remotely
    pub fn pending_creates(&self) -> impl Iterator<Item = &str> {
        self.entries_to_add
            .iter()
            .filter(|item| !self.entries.contains_key(*item))
            .map(String::as_str)
    }

    /// Staged deletions with the remote entry ID they remove
    pub fn pending_deletes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries_to_delete.iter().filter_map(|item| {
            self.entries
                .get(item)
                .map(|id| (item.as_str(), id.as_str()))
        })
    }

    /// Returns true if committing would send at least one operation
    #[must_use]
    pub fn has_pending_ops(&self) -> bool {
        self.pending_creates().next().is_some() || self.pending_deletes().next().is_some()
    }

    /// Recompute `entry_count` from the remote entries and staged changes
    pub fn recount(&mut self) {
        let added = self.pending_creates().count();
        let removed = self.pending_deletes().count();
        self.entry_count = self.entries.len() + added - removed;
    }

    /// Align staged changes with the authoritative remote content.
    ///
    /// Additions already present remotely are dropped, deletions of entries
    /// the remote no longer holds are dropped.
    pub fn reconcile_with(&mut self, remote: AclEntries) {
        self.entries_to_add.retain(|item| !remote.contains_key(item));
        self.entries_to_delete.retain(|item| remote.contains_key(item));
        self.entries = remote;
        self.recount();
    }

    /// Record a successful commit: adopt the remote content, clear staging
    pub fn apply_committed(&mut self, remote: AclEntries) {
        self.entries = remote;
        self.entries_to_add.clear();
        self.entries_to_delete.clear();
        self.recount();
    }
}
