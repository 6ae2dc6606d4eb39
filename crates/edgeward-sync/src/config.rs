//! Bouncer configuration.

use crate::collection::{DEFAULT_ACL_CAPACITY, DEFAULT_ACL_PREFIX};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::service::{ServiceReconciler, ServiceReconcilerBuilder, DEFAULT_BAN_BODY};
use edgeward_core::{Action, EdgeError, Result, Transport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Configuration for the edge bouncer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BouncerConfig {
    /// API token used for every managed service.
    #[serde(default)]
    pub api_token: String,

    /// How often decisions are reconciled (seconds).
    #[serde(default = "default_update_frequency")]
    pub update_frequency_secs: u64,

    /// Managed services.
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

/// Configuration of one managed service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service ID.
    pub id: String,

    /// Activate the service version after the first successful commit.
    #[serde(default)]
    pub activate: bool,

    /// Network identifiers each action must hold (default: 5000).
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Entries per ACL (default: 1000, the platform limit).
    #[serde(default = "default_acl_capacity")]
    pub acl_capacity: usize,

    /// Prefix of generated ACL and snippet names (default: edgeward).
    #[serde(default = "default_acl_prefix")]
    pub acl_prefix: String,

    /// Actions enforced on this service (default: ban).
    #[serde(default = "Action::defaults")]
    pub supported_actions: Vec<Action>,

    /// VCL executed for each action; `ban` has a built-in body.
    #[serde(default)]
    pub action_bodies: BTreeMap<Action, String>,

    /// Retry behaviour for remote calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BouncerConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            update_frequency_secs: default_update_frequency(),
            services: Vec::new(),
        }
    }
}

impl BouncerConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EdgeError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EdgeError::Config(e.to_string()))
    }

    /// Check that the config can drive a bouncer.
    pub fn validate(&self) -> Result<()> {
        if self.api_token.is_empty() {
            return Err(EdgeError::Config("api_token must be set".into()));
        }
        if self.update_frequency_secs == 0 {
            return Err(EdgeError::Config(
                "update_frequency_secs must be positive".into(),
            ));
        }
        self.services.iter().try_for_each(ServiceConfig::validate)
    }

    /// Names the API token without revealing it, e.g. `token:****c0de`.
    #[must_use]
    pub fn token_reference(&self) -> String {
        let chars: Vec<char> = self.api_token.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("token:****{tail}")
    }

    /// Build a fresh reconciler for a configured service, recording which
    /// token manages it.
    pub fn reconciler(
        &self,
        service_id: &str,
        version: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<ServiceReconciler> {
        let service = self
            .services
            .iter()
            .find(|service| service.id == service_id)
            .ok_or_else(|| EdgeError::Config(format!("service {service_id} is not configured")))?;

        service
            .builder(version, transport)?
            .credentials(self.token_reference())
            .build()
    }
}

impl ServiceConfig {
    /// A service with default settings.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            activate: false,
            max_items: default_max_items(),
            acl_capacity: default_acl_capacity(),
            acl_prefix: default_acl_prefix(),
            supported_actions: Action::defaults(),
            action_bodies: BTreeMap::new(),
            retry: RetryConfig::default(),
        }
    }

    /// Number of ACLs each action needs to hold `max_items`.
    #[must_use]
    pub fn acl_count(&self) -> usize {
        if self.acl_capacity == 0 {
            return 1;
        }
        self.max_items.div_ceil(self.acl_capacity).max(1)
    }

    /// VCL executed for an action, if known.
    #[must_use]
    pub fn action_body(&self, action: &Action) -> Option<&str> {
        self.action_bodies
            .get(action)
            .map(String::as_str)
            .or_else(|| (action.as_str() == Action::BAN).then_some(DEFAULT_BAN_BODY))
    }

    /// Check the service settings.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(EdgeError::Config("service id must not be empty".into()));
        }
        if self.acl_capacity == 0 {
            return Err(EdgeError::Config(format!(
                "service {}: acl_capacity must be positive",
                self.id
            )));
        }
        if self.max_items == 0 {
            return Err(EdgeError::Config(format!(
                "service {}: max_items must be positive",
                self.id
            )));
        }
        if self.supported_actions.is_empty() {
            return Err(EdgeError::Config(format!(
                "service {}: supported_actions must not be empty",
                self.id
            )));
        }
        if let Some(action) = self
            .supported_actions
            .iter()
            .find(|action| self.action_body(action).is_none())
        {
            return Err(EdgeError::Config(format!(
                "service {}: action_bodies has no body for {action}",
                self.id
            )));
        }
        Ok(())
    }

    /// Build a fresh reconciler for a version of this service.
    pub fn reconciler(
        &self,
        version: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<ServiceReconciler> {
        self.builder(version, transport)?.build()
    }

    fn builder(
        &self,
        version: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> Result<ServiceReconcilerBuilder> {
        self.validate()?;

        let mut builder = ServiceReconciler::builder(self.id.as_str(), version, transport)
            .activate(self.activate)
            .supported_actions(self.supported_actions.iter().cloned())
            .acl_count(self.acl_count())
            .acl_capacity(self.acl_capacity)
            .acl_prefix(self.acl_prefix.as_str())
            .retry(RetryPolicy::new(self.retry.clone()));
        for (action, body) in &self.action_bodies {
            builder = builder.action_body(action.clone(), body.as_str());
        }
        Ok(builder)
    }
}

// Default value functions for serde.
const fn default_update_frequency() -> u64 {
    10
}

const fn default_max_items() -> usize {
    5000
}

const fn default_acl_capacity() -> usize {
    DEFAULT_ACL_CAPACITY
}

fn default_acl_prefix() -> String {
    DEFAULT_ACL_PREFIX.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BouncerConfig::default();
        assert_eq!(config.update_frequency_secs, 10);
        assert!(config.services.is_empty());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = BouncerConfig::load(&dir.path().join("missing.toml")).unwrap();
        assert!(config.api_token.is_empty());
    }

    #[test]
    fn test_load_valid_config() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmpfile,
            r#"
api_token = "secret"
update_frequency_secs = 30

[[services]]
id = "svc-1"
activate = true
max_items = 2500
supported_actions = ["ban", "captcha"]

[services.action_bodies]
captcha = "error 429;"

[services.retry]
max_retries = 5

[[services]]
id = "svc-2"
"#
        )
        .unwrap();

        let config = BouncerConfig::load(tmpfile.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.update_frequency_secs, 30);

        let first = &config.services[0];
        assert!(first.activate);
        assert_eq!(first.acl_count(), 3);
        assert_eq!(first.retry.max_retries, 5);
        assert_eq!(first.retry.initial_backoff_ms, 500);
        assert_eq!(first.action_body(&Action::new("captcha")), Some("error 429;"));

        // Other fields default.
        let second = &config.services[1];
        assert_eq!(second.acl_count(), 5);
        assert_eq!(second.acl_prefix, "edgeward");
        assert_eq!(second.supported_actions, Action::defaults());
    }

    #[test]
    fn test_invalid_toml() {
        let err = BouncerConfig::from_toml("api_token = [").unwrap_err();
        assert!(matches!(err, EdgeError::Config(_)));
    }

    #[test]
    fn test_acl_count_rounds_up() {
        let mut service = ServiceConfig::new("svc");
        service.max_items = 1000;
        assert_eq!(service.acl_count(), 1);
        service.max_items = 1001;
        assert_eq!(service.acl_count(), 2);
        service.max_items = 1;
        service.acl_capacity = 1000;
        assert_eq!(service.acl_count(), 1);
    }

    #[test]
    fn test_missing_action_body() {
        let mut service = ServiceConfig::new("svc");
        service.supported_actions = vec![Action::ban(), Action::new("captcha")];
        let err = service.validate().unwrap_err();
        assert!(matches!(err, EdgeError::Config(msg) if msg.contains("captcha")));

        service.action_bodies.insert(Action::new("captcha"), "error 429;".into());
        service.validate().unwrap();
    }

    #[test]
    fn test_default_service_is_valid() {
        let service = ServiceConfig::new("svc");
        assert_eq!(service.supported_actions, vec![Action::ban()]);
        service.validate().unwrap();
        assert_eq!(service.action_body(&Action::ban()), Some(DEFAULT_BAN_BODY));

        let transport: Arc<dyn Transport> = FakeTransport::new();
        let reconciler = service.reconciler("1", transport).unwrap();
        assert!(reconciler.collection("ban").is_some());
        assert!(reconciler.snapshot().credentials.is_none());
    }

    #[test]
    fn test_reconciler_from_config() {
        let mut service = ServiceConfig::new("svc");
        service.max_items = 1500;
        service.acl_capacity = 500;
        service.supported_actions = vec![Action::ban(), Action::new("captcha")];
        service.action_bodies.insert(Action::new("captcha"), "error 429;".into());

        let transport: Arc<dyn Transport> = FakeTransport::new();
        let reconciler = service.reconciler("3", transport).unwrap();
        assert_eq!(reconciler.version(), "3");
        assert_eq!(reconciler.collection("ban").unwrap().acl_count(), 3);
        assert_eq!(reconciler.collection("captcha").unwrap().capacity(), 500);
        assert_eq!(reconciler.snippet("captcha").unwrap().action, "error 429;");
    }

    #[test]
    fn test_reconciler_records_token_reference() {
        let config = BouncerConfig::from_toml(
            r#"
api_token = "0123456789abcdef"

[[services]]
id = "svc-1"
"#,
        )
        .unwrap();
        assert_eq!(config.token_reference(), "token:****cdef");

        let transport: Arc<dyn Transport> = FakeTransport::new();
        let reconciler = config.reconciler("svc-1", "2", transport.clone()).unwrap();
        let credentials = reconciler.snapshot().credentials.unwrap();
        assert_eq!(credentials, "token:****cdef");
        assert!(!credentials.contains("0123456789abcdef"));

        let err = config.reconciler("svc-9", "2", transport).unwrap_err();
        assert!(matches!(err, EdgeError::Config(msg) if msg.contains("svc-9")));
    }
}
