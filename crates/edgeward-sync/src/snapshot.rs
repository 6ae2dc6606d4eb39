//! Persisted reconciler state.
//!
//! A [`ServiceSnapshot`] carries everything needed to rebuild a
//! [`ServiceReconciler`](crate::ServiceReconciler) after a restart without
//! recreating remote objects.

use crate::collection::AclCollectionSnapshot;
use chrono::{DateTime, Utc};
use edgeward_core::{Action, EdgeError, Result, Snippet};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Persisted form of a [`ServiceReconciler`](crate::ServiceReconciler)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSnapshot {
    /// Reference to the credential the service is managed with
    #[serde(default)]
    pub credentials: Option<String>,

    /// Managed service ID
    pub service_id: String,

    /// Service version the managed objects live in
    pub version: String,

    /// Whether the version still has to be activated
    #[serde(default)]
    pub pending_activation: bool,

    /// Actions this service enforces
    pub supported_actions: Vec<Action>,

    /// Rule snippet per action
    pub snippets: BTreeMap<Action, Snippet>,

    /// Snippets uploaded once, without a conditional
    #[serde(default)]
    pub static_snippets: Vec<Snippet>,

    /// Country codes per action
    #[serde(default)]
    pub countries: BTreeMap<Action, BTreeSet<String>>,

    /// AS numbers per action
    #[serde(default)]
    pub as_numbers: BTreeMap<Action, BTreeSet<String>>,

    /// ACL collection per action
    pub collections: BTreeMap<Action, AclCollectionSnapshot>,

    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
}

impl ServiceSnapshot {
    /// Check that every supported action has the state it needs
    pub fn validate(&self) -> Result<()> {
        if self.service_id.is_empty() {
            return Err(EdgeError::State("snapshot has no service id".into()));
        }

        for action in &self.supported_actions {
            if !self.collections.contains_key(action) {
                return Err(EdgeError::State(format!(
                    "service {} has no acl collection for action {action}",
                    self.service_id
                )));
            }
            if !self.snippets.contains_key(action) {
                return Err(EdgeError::State(format!(
                    "service {} has no snippet for action {action}",
                    self.service_id
                )));
            }
        }

        Ok(())
    }

    /// Serialize to pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a snapshot from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Self = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }
}
