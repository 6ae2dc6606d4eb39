//! ACL API endpoints.

use super::de;
use crate::FastlyClient;
use edgeward_core::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum operations accepted by one batch update request
pub const MAX_BATCH_OPERATIONS: usize = 100;

/// Entries requested per page when listing
const ENTRIES_PER_PAGE: usize = 100;

/// ACL as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct AclInfo {
    /// ACL ID
    pub id: String,
    /// ACL name
    pub name: String,
    /// Owning service ID
    pub service_id: String,
    /// Service version
    #[serde(deserialize_with = "de::string_or_number")]
    pub version: String,
}

/// ACL entry as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct AclEntryInfo {
    /// Entry ID
    pub id: String,
    /// Address
    pub ip: String,
    /// Prefix length, absent for a single address
    #[serde(default, deserialize_with = "de::optional_prefix")]
    pub subnet: Option<u8>,
}

/// One operation of a batch update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum EntryOperation {
    /// Add an address or network
    Create {
        /// Address
        ip: String,
        /// Prefix length
        #[serde(skip_serializing_if = "Option::is_none")]
        subnet: Option<u8>,
    },
    /// Remove an entry by ID
    Delete {
        /// Entry ID
        id: String,
    },
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    entries: &'a [EntryOperation],
}

/// ACL API endpoints
pub struct AclApi<'a> {
    client: &'a FastlyClient,
}

impl<'a> AclApi<'a> {
    pub(crate) fn new(client: &'a FastlyClient) -> Self {
        Self { client }
    }

    /// Create an ACL in a service version
    pub async fn create(&self, service_id: &str, version: &str, name: &str) -> Result<AclInfo> {
        self.client
            .post_form(
                &format!("/service/{service_id}/version/{version}/acl"),
                &[("name", name)],
            )
            .await
    }

    /// List every entry of an ACL, following pagination
    pub async fn entries(&self, service_id: &str, acl_id: &str) -> Result<Vec<AclEntryInfo>> {
        let path = format!("/service/{service_id}/acl/{acl_id}/entries");
        let per_page = ENTRIES_PER_PAGE.to_string();
        let mut entries = Vec::new();

        for page in 1.. {
            let page = page.to_string();
            let batch: Vec<AclEntryInfo> = self
                .client
                .get_with_query(&path, &[("page", page.as_str()), ("per_page", per_page.as_str())])
                .await?;

            let last = batch.len() < ENTRIES_PER_PAGE;
            entries.extend(batch);
            if last {
                break;
            }
        }

        Ok(entries)
    }

    /// Apply operations to an ACL, split into requests of at most
    /// [`MAX_BATCH_OPERATIONS`] sent in order
    pub async fn batch_update(
        &self,
        service_id: &str,
        acl_id: &str,
        operations: &[EntryOperation],
    ) -> Result<()> {
        let path = format!("/service/{service_id}/acl/{acl_id}/entries");

        for chunk in operations.chunks(MAX_BATCH_OPERATIONS) {
            debug!(acl_id, operations = chunk.len(), "batch updating acl entries");
            let _: serde_json::Value = self
                .client
                .patch(&path, &BatchRequest { entries: chunk })
                .await?;
        }

        Ok(())
    }
}
