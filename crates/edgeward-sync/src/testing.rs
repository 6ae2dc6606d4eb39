//! In-memory edge platform used by the engine tests.

use async_trait::async_trait;
use edgeward_core::{Acl, AclEntries, EdgeError, NetworkEntry, Result, Snippet, Transport};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::retry::{RetryConfig, RetryPolicy};

/// Recorded state of the fake platform
#[derive(Debug, Default)]
pub struct Remote {
    pub acls: BTreeMap<String, AclEntries>,
    pub acl_names: Vec<String>,
    pub next_id: u64,
    /// Successful pushes: (acl id, created identifiers, deleted entry ids)
    pub pushes: Vec<(String, Vec<String>, Vec<String>)>,
    /// Pushes rejected as conflicting
    pub conflicts: u32,
    pub fetches: u32,
    pub snippet_upserts: Vec<Snippet>,
    pub activations: Vec<(String, String)>,
    /// Number of upcoming pushes that fail with a 503
    pub failing_pushes: u32,
    /// ACLs whose pushes always fail with a 503
    pub broken_acls: BTreeSet<String>,
    /// Fail every snippet upsert with a 503
    pub snippets_down: bool,
    /// Fail every ACL creation with a 401
    pub acl_creation_denied: bool,
}

impl Remote {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// A [`Transport`] backed by in-memory ACLs
#[derive(Debug, Default)]
pub struct FakeTransport {
    remote: Mutex<Remote>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn remote(&self) -> MutexGuard<'_, Remote> {
        self.remote.lock().unwrap()
    }

    /// Add an entry behind the reconciler's back
    pub fn insert_remote(&self, acl_id: &str, item: &str) {
        let key = NetworkEntry::canonical(item).unwrap();
        let mut remote = self.remote();
        let id = remote.next_id("entry");
        remote
            .acls
            .entry(acl_id.to_string())
            .or_default()
            .insert(key, id);
    }

    /// Remove an entry behind the reconciler's back
    pub fn remove_remote(&self, acl_id: &str, item: &str) {
        let key = NetworkEntry::canonical(item).unwrap();
        if let Some(entries) = self.remote().acls.get_mut(acl_id) {
            entries.remove(&key);
        }
    }

    pub fn remote_items(&self, acl_id: &str) -> Vec<String> {
        self.remote()
            .acls
            .get(acl_id)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn create_acl(&self, service_id: &str, version: &str, name: &str) -> Result<Acl> {
        let mut remote = self.remote();
        if remote.acl_creation_denied {
            return Err(EdgeError::Unauthorized);
        }
        let id = remote.next_id("acl");
        remote.acls.insert(id.clone(), AclEntries::new());
        remote.acl_names.push(name.to_string());
        Ok(Acl::new(id, name, service_id, version))
    }

    async fn push_acl_diff(&self, acl: &Acl) -> Result<()> {
        let mut remote = self.remote();
        let broken = remote.broken_acls.contains(&acl.id);
        if broken || remote.failing_pushes > 0 {
            remote.failing_pushes = remote.failing_pushes.saturating_sub(u32::from(!broken));
            return Err(EdgeError::Api {
                code: 503,
                message: "service unavailable".into(),
            });
        }

        // Entries are keyed the way the platform reports them back.
        let creates = acl
            .pending_creates()
            .map(NetworkEntry::canonical)
            .collect::<Result<Vec<String>>>()?;
        let deletes: Vec<String> = acl.pending_deletes().map(|(_, id)| id.to_string()).collect();
        let entries = remote.acls.get(&acl.id).cloned().unwrap_or_default();

        let duplicate = creates.iter().any(|item| entries.contains_key(item));
        let missing = deletes
            .iter()
            .any(|id| !entries.values().any(|existing| existing == id));
        if duplicate || missing {
            remote.conflicts += 1;
            return Err(EdgeError::Conflict {
                code: 400,
                message: "entries do not match".into(),
            });
        }

        let mut entries = entries;
        entries.retain(|_, id| !deletes.contains(id));
        for item in &creates {
            let id = remote.next_id("entry");
            entries.insert(item.clone(), id);
        }
        remote.acls.insert(acl.id.clone(), entries);
        remote.pushes.push((acl.id.clone(), creates, deletes));
        Ok(())
    }

    async fn fetch_acl_entries(&self, acl: &Acl) -> Result<AclEntries> {
        let mut remote = self.remote();
        remote.fetches += 1;
        remote
            .acls
            .get(&acl.id)
            .cloned()
            .ok_or_else(|| EdgeError::NotFound {
                resource: acl.id.clone(),
            })
    }

    async fn upsert_snippet(&self, snippet: &Snippet) -> Result<Snippet> {
        let mut remote = self.remote();
        if remote.snippets_down {
            return Err(EdgeError::Api {
                code: 503,
                message: "service unavailable".into(),
            });
        }
        let mut updated = snippet.clone();
        if updated.id.is_none() {
            updated.id = Some(remote.next_id("snippet"));
        }
        remote.snippet_upserts.push(updated.clone());
        Ok(updated)
    }

    async fn activate_version(&self, service_id: &str, version: &str) -> Result<()> {
        self.remote()
            .activations
            .push((service_id.to_string(), version.to_string()));
        Ok(())
    }
}

/// A retry policy that never sleeps
pub fn instant_retry() -> RetryPolicy {
    RetryPolicy::new(RetryConfig {
        max_retries: 2,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        retry_on_rate_limit: true,
    })
}
