//! The seam between the reconciliation engine and the edge platform.

use crate::error::Result;
use crate::types::{Acl, AclEntries, Snippet};
use async_trait::async_trait;

/// Remote operations the reconciler needs from the edge platform
///
/// Implementations perform a single attempt per call; retrying is the
/// caller's concern. A rejected change whose assumptions no longer hold must
/// be reported as [`EdgeError::Conflict`](crate::EdgeError::Conflict).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create an empty ACL in the given service version
    async fn create_acl(&self, service_id: &str, version: &str, name: &str) -> Result<Acl>;

    /// Send the staged changes of an ACL
    ///
    /// Creates [`Acl::pending_creates`] and deletes [`Acl::pending_deletes`].
    async fn push_acl_diff(&self, acl: &Acl) -> Result<()>;

    /// Read the authoritative content of an ACL
    async fn fetch_acl_entries(&self, acl: &Acl) -> Result<AclEntries>;

    /// Create the snippet, or update its content if it already exists
    async fn upsert_snippet(&self, snippet: &Snippet) -> Result<Snippet>;

    /// Activate a service version
    async fn activate_version(&self, service_id: &str, version: &str) -> Result<()>;
}
