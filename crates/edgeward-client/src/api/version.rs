//! Service version API endpoints.

use super::de;
use crate::FastlyClient;
use edgeward_core::Result;
use serde::Deserialize;

/// Service version as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    /// Version number
    #[serde(deserialize_with = "de::string_or_number")]
    pub number: String,
    /// Owning service ID
    pub service_id: String,
    /// Whether this version serves traffic
    #[serde(default)]
    pub active: bool,
}

/// Service version API endpoints
pub struct VersionApi<'a> {
    client: &'a FastlyClient,
}

impl<'a> VersionApi<'a> {
    pub(crate) fn new(client: &'a FastlyClient) -> Self {
        Self { client }
    }

    /// Activate a service version
    pub async fn activate(&self, service_id: &str, version: &str) -> Result<VersionInfo> {
        self.client
            .put_form(
                &format!("/service/{service_id}/version/{version}/activate"),
                &[],
            )
            .await
    }
}
