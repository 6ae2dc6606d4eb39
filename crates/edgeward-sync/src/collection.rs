//! Sharded ACL collection for one (service, action) pair.
//!
//! Network identifiers are spread over a fixed number of capacity-bounded
//! ACLs. [`AclCollection::transform_to_state`] stages the difference between
//! the committed state and the desired one; [`AclCollection::commit`] pushes
//! the staged changes, one concurrent task per ACL, and repairs ACLs whose
//! remote content drifted.

use crate::conditions;
use crate::retry::RetryPolicy;
use edgeward_core::{Acl, Action, EdgeError, NetworkEntry, Result, Transport};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Maximum number of entries the platform accepts in a single ACL
pub const DEFAULT_ACL_CAPACITY: usize = 1000;

/// Default ACL name prefix
pub const DEFAULT_ACL_PREFIX: &str = "edgeward";

/// Persisted form of an [`AclCollection`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclCollectionSnapshot {
    /// ACLs in allocation order
    pub acls: Vec<Acl>,
    /// Owning service ID
    pub service_id: String,
    /// Service version
    pub version: String,
    /// Action enforced by the ACLs
    pub action: Action,
    /// Committed identifiers
    pub state: BTreeSet<String>,
    /// Number of ACLs the collection provisions
    #[serde(default = "default_acl_count")]
    pub acl_count: usize,
    /// Per-ACL entry ceiling
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Prefix of provisioned ACL names
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

const fn default_acl_count() -> usize {
    1
}

const fn default_capacity() -> usize {
    DEFAULT_ACL_CAPACITY
}

fn default_prefix() -> String {
    DEFAULT_ACL_PREFIX.to_string()
}

/// Identifiers a committed ACL added and removed
#[derive(Debug, Default)]
struct AclChange {
    added: BTreeSet<String>,
    removed: BTreeSet<String>,
}

/// All ACLs holding the network identifiers of one action
pub struct AclCollection {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    service_id: String,
    version: String,
    action: Action,
    prefix: String,
    acl_count: usize,
    capacity: usize,
    acls: Vec<Acl>,
    state: BTreeSet<String>,
}

impl fmt::Debug for AclCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AclCollection")
            .field("service_id", &self.service_id)
            .field("version", &self.version)
            .field("action", &self.action)
            .field("acl_count", &self.acl_count)
            .field("capacity", &self.capacity)
            .field("acls", &self.acls)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AclCollection {
    /// Create an empty collection with one ACL of default capacity
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        service_id: impl Into<String>,
        version: impl Into<String>,
        action: Action,
    ) -> Self {
        Self {
            transport,
            retry,
            service_id: service_id.into(),
            version: version.into(),
            action,
            prefix: DEFAULT_ACL_PREFIX.to_string(),
            acl_count: 1,
            capacity: DEFAULT_ACL_CAPACITY,
            acls: Vec::new(),
            state: BTreeSet::new(),
        }
    }

    /// Rebuild a collection from its snapshot
    #[must_use]
    pub fn restore(
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
        snapshot: AclCollectionSnapshot,
    ) -> Self {
        let acl_count = snapshot.acl_count.max(snapshot.acls.len()).max(1);
        Self {
            transport,
            retry,
            service_id: snapshot.service_id,
            version: snapshot.version,
            action: snapshot.action,
            prefix: snapshot.prefix,
            acl_count,
            capacity: snapshot.capacity,
            acls: snapshot.acls,
            state: snapshot.state,
        }
    }

    /// Set how many ACLs the collection may provision
    #[must_use]
    pub fn with_acl_count(mut self, count: usize) -> Self {
        self.acl_count = count.max(1);
        self
    }

    /// Set the per-ACL entry ceiling
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the prefix of provisioned ACL names
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Action enforced by this collection
    #[must_use]
    pub const fn action(&self) -> &Action {
        &self.action
    }

    /// ACLs in allocation order
    #[must_use]
    pub fn acls(&self) -> &[Acl] {
        &self.acls
    }

    /// Identifiers confirmed by the last successful commit
    #[must_use]
    pub const fn state(&self) -> &BTreeSet<String> {
        &self.state
    }

    /// Per-ACL entry ceiling
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of ACLs the collection provisions
    #[must_use]
    pub const fn acl_count(&self) -> usize {
        self.acl_count
    }

    /// Entries the collection can hold once fully provisioned
    #[must_use]
    pub const fn total_capacity(&self) -> usize {
        self.acl_count.saturating_mul(self.capacity)
    }

    /// Returns true if every configured ACL exists
    #[must_use]
    pub fn is_provisioned(&self) -> bool {
        self.acls.len() >= self.acl_count
    }

    /// Returns true if any ACL has staged changes
    #[must_use]
    pub fn has_staged_changes(&self) -> bool {
        self.acls.iter().any(Acl::has_staged_changes)
    }

    fn acl_name(&self, index: usize) -> String {
        format!("{}_{}_{index}", self.prefix, self.action)
    }

    /// Create the ACLs that do not exist yet, concurrently.
    ///
    /// ACLs created before a failure are kept; the failure is reported after
    /// every creation finished.
    #[instrument(skip_all, fields(service_id = %self.service_id, action = %self.action))]
    pub async fn provision(&mut self) -> Result<()> {
        let missing: Vec<String> = (0..self.acl_count)
            .map(|index| self.acl_name(index))
            .filter(|name| !self.acls.iter().any(|acl| &acl.name == name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let transport = &*self.transport;
        let retry = &self.retry;
        let service_id = self.service_id.as_str();
        let version = self.version.as_str();

        let results = join_all(missing.iter().map(|name| async move {
            info!(acl = %name, "creating acl");
            let acl = retry
                .run("create acl", || transport.create_acl(service_id, version, name))
                .await?;
            info!(acl = %name, "created acl");
            Ok::<_, EdgeError>(acl)
        }))
        .await;

        let total = results.len();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(acl) => self.acls.push(acl),
                Err(err) => {
                    error!(error = %err, "failed to create acl");
                    errors.push(err);
                }
            }
        }

        self.acls.sort_by_key(|acl| acl_index(&acl.name));
        EdgeError::aggregate(total, errors).map_or(Ok(()), Err)
    }

    /// `(client.ip ~ <acl>)` clauses for every ACL
    #[must_use]
    pub fn generate_conditions(&self) -> String {
        conditions::acl_conditions(&self.acls)
    }

    /// Stage the changes that turn the committed state into `desired`.
    ///
    /// Only local staging is touched; `state` changes on commit. Staging left
    /// over from an earlier uncommitted call is replaced, so repeated calls
    /// with the same `desired` stage the same diff. When every ACL is full
    /// the remaining new identifiers are dropped with a warning.
    ///
    /// Identifiers are tracked in their canonical form, the one the platform
    /// reports entries in. Identifiers that are not an address or network
    /// are skipped with a warning so they cannot block their ACL.
    pub fn transform_to_state(&mut self, desired: &BTreeSet<String>) {
        let desired: BTreeSet<String> = desired
            .iter()
            .filter_map(|item| match NetworkEntry::canonical(item) {
                Ok(key) => Some(key),
                Err(err) => {
                    warn!(
                        service_id = %self.service_id,
                        action = %self.action,
                        item = %item,
                        error = %err,
                        "ignoring invalid network identifier"
                    );
                    None
                }
            })
            .collect();
        let new_items: BTreeSet<String> = desired.difference(&self.state).cloned().collect();
        let expired_items: BTreeSet<String> = self.state.difference(&desired).cloned().collect();

        if !new_items.is_empty() {
            info!(
                service_id = %self.service_id,
                action = %self.action,
                count = new_items.len(),
                "adding items to acl collection"
            );
        }
        if !expired_items.is_empty() {
            info!(
                service_id = %self.service_id,
                action = %self.action,
                count = expired_items.len(),
                "removing items from acl collection"
            );
        }

        for acl in &mut self.acls {
            acl.entries_to_add.retain(|item| new_items.contains(item));
            acl.entries_to_delete.retain(|item| expired_items.contains(item));
            acl.recount();
        }

        for item in &new_items {
            if self.acls.iter().any(|acl| acl.entries_to_add.contains(item)) {
                continue;
            }

            // Present remotely without being committed: stage it where it
            // lives so the commit records it without using capacity.
            if let Some(acl) = self.acls.iter_mut().find(|acl| acl.contains(item)) {
                acl.entries_to_add.insert(item.clone());
                continue;
            }

            if !self.insert_item(item) {
                warn!(
                    service_id = %self.service_id,
                    action = %self.action,
                    capacity = self.total_capacity(),
                    "acl collection is full, ignoring remaining items"
                );
                break;
            }
        }

        for item in &expired_items {
            if self
                .acls
                .iter()
                .any(|acl| acl.entries_to_delete.contains(item))
            {
                continue;
            }
            if !self.remove_item(item) {
                debug!(
                    service_id = %self.service_id,
                    action = %self.action,
                    item = %item,
                    "item to remove not found in any acl"
                );
            }
        }
    }

    /// Stage an addition in the first ACL with room for it
    fn insert_item(&mut self, item: &str) -> bool {
        let capacity = self.capacity;
        match self.acls.iter_mut().find(|acl| !acl.is_full(capacity)) {
            Some(acl) => {
                acl.entries_to_add.insert(item.to_string());
                acl.recount();
                true
            }
            None => false,
        }
    }

    /// Stage a removal in the ACL holding the item
    fn remove_item(&mut self, item: &str) -> bool {
        match self.acls.iter_mut().find(|acl| acl.contains(item)) {
            Some(acl) => {
                acl.entries_to_delete.insert(item.to_string());
                acl.recount();
                true
            }
            None => false,
        }
    }

    /// Push staged changes of every ACL that has some, concurrently.
    ///
    /// Each successful ACL folds its changes into `state`. Failed ACLs keep
    /// their staging for the next commit; failures are reported once every
    /// ACL finished.
    #[instrument(skip_all, fields(service_id = %self.service_id, action = %self.action))]
    pub async fn commit(&mut self) -> Result<()> {
        let transport = &*self.transport;
        let retry = &self.retry;

        let results = join_all(
            self.acls
                .iter_mut()
                .filter(|acl| acl.has_staged_changes())
                .map(|acl| commit_acl(acl, transport, retry)),
        )
        .await;

        if results.is_empty() {
            return Ok(());
        }

        let total = results.len();
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(change) => {
                    self.state.extend(change.added);
                    for item in &change.removed {
                        self.state.remove(item);
                    }
                }
                Err(err) => {
                    error!(error = %err, "failed to commit acl changes");
                    errors.push(err);
                }
            }
        }

        match EdgeError::aggregate(total, errors) {
            Some(err) => Err(err),
            None => {
                info!(acls = total, "acl collection updated");
                Ok(())
            }
        }
    }

    /// Re-read ACL content from the remote side and rebuild `state` from it.
    ///
    /// `only` restricts the refresh to the named ACLs; `None` refreshes all.
    /// Staged changes are kept but aligned with what the remote holds.
    #[instrument(skip_all, fields(service_id = %self.service_id, action = %self.action))]
    pub async fn refresh(&mut self, only: Option<&[String]>) -> Result<()> {
        let transport = &*self.transport;
        let retry = &self.retry;

        let results = join_all(
            self.acls
                .iter_mut()
                .filter(|acl| only.map_or(true, |names| names.contains(&acl.name)))
                .map(|acl| async move {
                    let remote = {
                        let view: &Acl = acl;
                        retry
                            .run("fetch acl entries", || transport.fetch_acl_entries(view))
                            .await?
                    };
                    acl.reconcile_with(remote);
                    Ok::<_, EdgeError>(())
                }),
        )
        .await;

        let total = results.len();
        let errors: Vec<EdgeError> = results.into_iter().filter_map(Result::err).collect();

        self.state = self
            .acls
            .iter()
            .flat_map(|acl| acl.entries.keys().cloned())
            .collect();
        info!(items = self.state.len(), "acl collection refreshed");

        EdgeError::aggregate(total, errors).map_or(Ok(()), Err)
    }

    /// Persisted form of this collection
    #[must_use]
    pub fn snapshot(&self) -> AclCollectionSnapshot {
        AclCollectionSnapshot {
            acls: self.acls.clone(),
            service_id: self.service_id.clone(),
            version: self.version.clone(),
            action: self.action.clone(),
            state: self.state.clone(),
            acl_count: self.acl_count,
            capacity: self.capacity,
            prefix: self.prefix.clone(),
        }
    }
}

/// Position of a provisioned ACL in allocation order
fn acl_index(name: &str) -> usize {
    name.rsplit('_')
        .next()
        .and_then(|index| index.parse().ok())
        .unwrap_or(usize::MAX)
}

/// Push one ACL's staged changes, repairing it if the remote rejects them
async fn commit_acl(
    acl: &mut Acl,
    transport: &dyn Transport,
    retry: &RetryPolicy,
) -> Result<AclChange> {
    let change = AclChange {
        added: acl.entries_to_add.clone(),
        removed: acl.entries_to_delete.clone(),
    };
    debug!(acl = %acl.name, "committing changes to acl");

    let pushed = {
        let view: &Acl = acl;
        retry
            .run("push acl diff", || transport.push_acl_diff(view))
            .await
    };

    let remote = match pushed {
        Ok(()) => {
            let view: &Acl = acl;
            retry
                .run("fetch acl entries", || transport.fetch_acl_entries(view))
                .await?
        }
        Err(err) if err.is_conflict() => {
            warn!(
                acl = %acl.name,
                error = %err,
                "acl diff rejected, repairing from remote content"
            );
            let remote = {
                let view: &Acl = acl;
                retry
                    .run("fetch acl entries", || transport.fetch_acl_entries(view))
                    .await?
            };
            acl.reconcile_with(remote);

            if acl.has_pending_ops() {
                let view: &Acl = acl;
                retry
                    .run("push repaired acl diff", || transport.push_acl_diff(view))
                    .await?;
                retry
                    .run("fetch acl entries", || transport.fetch_acl_entries(view))
                    .await?
            } else {
                std::mem::take(&mut acl.entries)
            }
        }
        Err(err) => return Err(err),
    };

    acl.apply_committed(remote);
    debug!(acl = %acl.name, entries = acl.entry_count, "committed changes to acl");
    Ok(change)
}
