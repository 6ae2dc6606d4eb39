//! Reconciliation of one managed service.
//!
//! A [`ServiceReconciler`] owns, for every supported action, an
//! [`AclCollection`] for network identifiers, the country codes and AS numbers
//! enforced by that action, and the rule snippet whose guard matches all of
//! them. Each call to [`ServiceReconciler::transform_state`] replaces the
//! desired state and commits the difference.

use crate::collection::{AclCollection, DEFAULT_ACL_CAPACITY, DEFAULT_ACL_PREFIX};
use crate::conditions::{self, AS_NUMBER_FIELD, COUNTRY_FIELD};
use crate::retry::RetryPolicy;
use crate::snapshot::ServiceSnapshot;
use chrono::Utc;
use edgeward_core::{Action, EdgeError, IdentifierKind, Result, Snippet, Transport};
use futures_util::future::{join, join_all};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Body of the built-in `ban` action
pub const DEFAULT_BAN_BODY: &str = r#"error 403 "Forbidden";"#;

type ActionSets = BTreeMap<Action, BTreeSet<String>>;

/// Owns the ACLs and rule snippets of one service
pub struct ServiceReconciler {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    credentials: Option<String>,
    service_id: String,
    version: String,
    pending_activation: bool,
    supported_actions: Vec<Action>,
    snippets: BTreeMap<Action, Snippet>,
    static_snippets: Vec<Snippet>,
    countries: ActionSets,
    as_numbers: ActionSets,
    collections: BTreeMap<Action, AclCollection>,
}

impl fmt::Debug for ServiceReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReconciler")
            .field("service_id", &self.service_id)
            .field("version", &self.version)
            .field("pending_activation", &self.pending_activation)
            .field("supported_actions", &self.supported_actions)
            .field("countries", &self.countries)
            .field("as_numbers", &self.as_numbers)
            .field("collections", &self.collections)
            .finish_non_exhaustive()
    }
}

impl ServiceReconciler {
    /// Start building a reconciler for a service version
    #[must_use]
    pub fn builder(
        service_id: impl Into<String>,
        version: impl Into<String>,
        transport: Arc<dyn Transport>,
    ) -> ServiceReconcilerBuilder {
        ServiceReconcilerBuilder::new(service_id.into(), version.into(), transport)
    }

    /// Rebuild a reconciler from a snapshot
    pub fn restore(
        snapshot: ServiceSnapshot,
        transport: Arc<dyn Transport>,
        retry: RetryPolicy,
    ) -> Result<Self> {
        snapshot.validate()?;

        let collections = snapshot
            .collections
            .into_iter()
            .map(|(action, collection)| {
                let collection =
                    AclCollection::restore(Arc::clone(&transport), retry.clone(), collection);
                (action, collection)
            })
            .collect();

        Ok(Self {
            transport,
            retry,
            credentials: snapshot.credentials,
            service_id: snapshot.service_id,
            version: snapshot.version,
            pending_activation: snapshot.pending_activation,
            supported_actions: snapshot.supported_actions,
            snippets: snapshot.snippets,
            static_snippets: snapshot.static_snippets,
            countries: snapshot.countries,
            as_numbers: snapshot.as_numbers,
            collections,
        })
    }

    /// Managed service ID
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Service version the managed objects live in
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Actions this service enforces
    #[must_use]
    pub fn supported_actions(&self) -> &[Action] {
        &self.supported_actions
    }

    /// Whether the version will be activated after the next successful commit
    #[must_use]
    pub const fn pending_activation(&self) -> bool {
        self.pending_activation
    }

    /// ACL collection of an action
    #[must_use]
    pub fn collection(&self, action: &str) -> Option<&AclCollection> {
        self.collections.get(action)
    }

    /// Rule snippet of an action
    #[must_use]
    pub fn snippet(&self, action: &str) -> Option<&Snippet> {
        self.snippets.get(action)
    }

    /// Snippets uploaded once, without a conditional
    #[must_use]
    pub fn static_snippets(&self) -> &[Snippet] {
        &self.static_snippets
    }

    /// Country codes enforced by an action
    #[must_use]
    pub fn countries(&self, action: &str) -> Option<&BTreeSet<String>> {
        self.countries.get(action)
    }

    /// AS numbers enforced by an action
    #[must_use]
    pub fn as_numbers(&self, action: &str) -> Option<&BTreeSet<String>> {
        self.as_numbers.get(action)
    }

    /// Create the ACLs of every collection that is not fully provisioned.
    ///
    /// Returns the number of collections provisioned and one error per
    /// collection that failed.
    async fn provision(&mut self) -> (usize, Vec<EdgeError>) {
        let results = join_all(
            self.collections
                .values_mut()
                .filter(|collection| !collection.is_provisioned())
                .map(AclCollection::provision),
        )
        .await;

        let total = results.len();
        let errors = results
            .into_iter()
            .filter_map(Result::err)
            .map(flatten)
            .collect();
        (total, errors)
    }

    /// Replace the desired state with `desired` and commit the difference.
    ///
    /// `desired` maps identifiers to action names. Identifiers that cannot be
    /// classified and actions this service does not support are ignored.
    /// ACLs that could not be created are reported with the commit result;
    /// everything else is still committed.
    #[instrument(skip_all, fields(service_id = %self.service_id))]
    pub async fn transform_state<I, K, V>(&mut self, desired: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let empty = || -> ActionSets {
            self.supported_actions
                .iter()
                .map(|action| (action.clone(), BTreeSet::new()))
                .collect()
        };
        let mut networks = empty();
        let mut countries = empty();
        let mut as_numbers = empty();

        for (item, action) in desired {
            let (item, action) = (item.as_ref(), action.as_ref());
            let Some(kind) = IdentifierKind::classify(item) else {
                debug!(item, action, "ignoring unclassifiable identifier");
                continue;
            };
            let sets = match kind {
                IdentifierKind::Network => &mut networks,
                IdentifierKind::Country => &mut countries,
                IdentifierKind::AsNumber => &mut as_numbers,
            };
            match sets.get_mut(action) {
                Some(set) => {
                    set.insert(item.to_string());
                }
                None => debug!(item, action, "ignoring unsupported action"),
            }
        }

        let (provisioned, provision_errors) = self.provision().await;

        let previous_countries = std::mem::replace(&mut self.countries, countries);
        let previous_as_numbers = std::mem::replace(&mut self.as_numbers, as_numbers);

        for action in &self.supported_actions {
            log_changes(
                action,
                "countries",
                previous_countries.get(action),
                self.countries.get(action),
            );
            log_changes(
                action,
                "as numbers",
                previous_as_numbers.get(action),
                self.as_numbers.get(action),
            );

            if let (Some(collection), Some(items)) =
                (self.collections.get_mut(action), networks.get(action))
            {
                collection.transform_to_state(items);
            }
        }

        self.commit_branches(provisioned, provision_errors).await
    }

    /// Guard condition of an action's rule snippet
    #[must_use]
    pub fn generate_conditional(&self, action: &str) -> String {
        let acls = self
            .collections
            .get(action)
            .map(AclCollection::generate_conditions)
            .unwrap_or_default();
        let countries = self
            .countries
            .get(action)
            .map(|items| conditions::equal_to_conditions(items, COUNTRY_FIELD, true))
            .unwrap_or_default();
        let as_numbers = self
            .as_numbers
            .get(action)
            .map(|items| conditions::equal_to_conditions(items, AS_NUMBER_FIELD, false))
            .unwrap_or_default();

        conditions::guard(&[acls, countries, as_numbers])
    }

    /// Commit every ACL collection and update every rule snippet, concurrently.
    ///
    /// The version is activated after the first commit in which every branch
    /// succeeded, if activation was requested.
    #[instrument(skip_all, fields(service_id = %self.service_id))]
    pub async fn commit(&mut self) -> Result<()> {
        self.commit_branches(0, Vec::new()).await
    }

    /// Run the commit branches and report them together with `earlier`
    /// failures of `started` branches run before the commit
    async fn commit_branches(&mut self, started: usize, earlier: Vec<EdgeError>) -> Result<()> {
        let conditionals: BTreeMap<Action, String> = self
            .supported_actions
            .iter()
            .map(|action| (action.clone(), self.generate_conditional(action.as_str())))
            .collect();

        let transport = &*self.transport;
        let retry = &self.retry;

        let collection_commits =
            join_all(self.collections.values_mut().map(AclCollection::commit));
        let snippet_updates = join_all(self.snippets.iter_mut().filter_map(|(action, snippet)| {
            conditionals
                .get(action)
                .map(|conditional| update_snippet(snippet, conditional, transport, retry))
        }));

        let (collection_results, snippet_results) = join(collection_commits, snippet_updates).await;

        let total = started + collection_results.len() + snippet_results.len();
        let mut errors = earlier;
        errors.extend(
            collection_results
                .into_iter()
                .chain(snippet_results)
                .filter_map(Result::err)
                .map(flatten),
        );
        if let Some(err) = EdgeError::aggregate(total, errors) {
            error!(error = %err, "service commit failed");
            return Err(err);
        }

        if self.pending_activation {
            let service_id = self.service_id.as_str();
            let version = self.version.as_str();
            retry
                .run("activate version", || {
                    transport.activate_version(service_id, version)
                })
                .await?;
            self.pending_activation = false;
            info!(version, "activated service version");
        }

        Ok(())
    }

    /// Upload the static snippets that do not exist yet, concurrently
    #[instrument(skip_all, fields(service_id = %self.service_id))]
    pub async fn create_static_snippets(&mut self) -> Result<()> {
        let transport = &*self.transport;
        let retry = &self.retry;

        let results = join_all(
            self.static_snippets
                .iter_mut()
                .filter(|snippet| !snippet.is_created())
                .map(|snippet| async move {
                    let created = {
                        let view: &Snippet = snippet;
                        retry
                            .run("create snippet", || transport.upsert_snippet(view))
                            .await?
                    };
                    info!(snippet = %created.name, "created static snippet");
                    *snippet = created;
                    Ok::<_, EdgeError>(())
                }),
        )
        .await;

        let total = results.len();
        let errors: Vec<EdgeError> = results.into_iter().filter_map(Result::err).collect();
        EdgeError::aggregate(total, errors).map_or(Ok(()), Err)
    }

    /// Re-read every ACL from the remote side and rebuild committed state
    #[instrument(skip_all, fields(service_id = %self.service_id))]
    pub async fn refresh(&mut self) -> Result<()> {
        let results = join_all(
            self.collections
                .values_mut()
                .map(|collection| collection.refresh(None)),
        )
        .await;

        let total = results.len();
        let errors: Vec<EdgeError> = results.into_iter().filter_map(Result::err).collect();
        EdgeError::aggregate(total, errors).map_or(Ok(()), Err)
    }

    /// Persisted form of this reconciler
    #[must_use]
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            credentials: self.credentials.clone(),
            service_id: self.service_id.clone(),
            version: self.version.clone(),
            pending_activation: self.pending_activation,
            supported_actions: self.supported_actions.clone(),
            snippets: self.snippets.clone(),
            static_snippets: self.static_snippets.clone(),
            countries: self.countries.clone(),
            as_numbers: self.as_numbers.clone(),
            collections: self
                .collections
                .iter()
                .map(|(action, collection)| (action.clone(), collection.snapshot()))
                .collect(),
            taken_at: Utc::now(),
        }
    }
}

/// Unwrap a branch's own aggregate so failures are counted once
fn flatten(err: EdgeError) -> EdgeError {
    match err {
        EdgeError::PartialCommit { source, .. } => *source,
        other => other,
    }
}

/// Push a rule snippet whose conditional changed.
///
/// The stored snippet is only replaced once the remote accepted it.
async fn update_snippet(
    snippet: &mut Snippet,
    conditional: &str,
    transport: &dyn Transport,
    retry: &RetryPolicy,
) -> Result<()> {
    if snippet.is_created() && snippet.conditional == conditional {
        return Ok(());
    }

    let mut candidate = snippet.clone();
    candidate.conditional = conditional.to_string();

    let updated = match retry
        .run("upsert snippet", || transport.upsert_snippet(&candidate))
        .await
    {
        Ok(updated) => updated,
        Err(err) => {
            error!(snippet = %candidate.name, error = %err, "failed to update snippet");
            return Err(err);
        }
    };
    info!(snippet = %updated.name, "updated snippet");
    *snippet = updated;
    Ok(())
}

fn log_changes(
    action: &Action,
    kind: &str,
    previous: Option<&BTreeSet<String>>,
    current: Option<&BTreeSet<String>>,
) {
    let empty = BTreeSet::new();
    let previous = previous.unwrap_or(&empty);
    let current = current.unwrap_or(&empty);

    let added: Vec<&String> = current.difference(previous).collect();
    let removed: Vec<&String> = previous.difference(current).collect();
    if !added.is_empty() {
        info!(action = %action, ?added, "added {kind}");
    }
    if !removed.is_empty() {
        info!(action = %action, ?removed, "removed {kind}");
    }
}

/// Builder for [`ServiceReconciler`]
pub struct ServiceReconcilerBuilder {
    service_id: String,
    version: String,
    transport: Arc<dyn Transport>,
    activate: bool,
    supported_actions: Vec<Action>,
    action_bodies: BTreeMap<Action, String>,
    acl_count: usize,
    acl_capacity: usize,
    acl_prefix: String,
    retry: RetryPolicy,
    credentials: Option<String>,
    static_snippets: Vec<Snippet>,
}

impl fmt::Debug for ServiceReconcilerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceReconcilerBuilder")
            .field("service_id", &self.service_id)
            .field("version", &self.version)
            .field("supported_actions", &self.supported_actions)
            .field("acl_count", &self.acl_count)
            .field("acl_capacity", &self.acl_capacity)
            .finish_non_exhaustive()
    }
}

impl ServiceReconcilerBuilder {
    fn new(service_id: String, version: String, transport: Arc<dyn Transport>) -> Self {
        Self {
            service_id,
            version,
            transport,
            activate: false,
            supported_actions: Action::defaults(),
            action_bodies: BTreeMap::from([(Action::ban(), DEFAULT_BAN_BODY.to_string())]),
            acl_count: 1,
            acl_capacity: DEFAULT_ACL_CAPACITY,
            acl_prefix: DEFAULT_ACL_PREFIX.to_string(),
            retry: RetryPolicy::default(),
            credentials: None,
            static_snippets: Vec::new(),
        }
    }

    /// Activate the version after the first successful commit
    #[must_use]
    pub const fn activate(mut self, activate: bool) -> Self {
        self.activate = activate;
        self
    }

    /// Set the actions this service enforces
    #[must_use]
    pub fn supported_actions<I, A>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Action>,
    {
        self.supported_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the VCL executed when an action matches
    #[must_use]
    pub fn action_body(mut self, action: impl Into<Action>, body: impl Into<String>) -> Self {
        self.action_bodies.insert(action.into(), body.into());
        self
    }

    /// Set how many ACLs each action may use
    #[must_use]
    pub fn acl_count(mut self, count: usize) -> Self {
        self.acl_count = count.max(1);
        self
    }

    /// Set the per-ACL entry ceiling
    #[must_use]
    pub const fn acl_capacity(mut self, capacity: usize) -> Self {
        self.acl_capacity = capacity;
        self
    }

    /// Set the prefix of ACL and snippet names
    #[must_use]
    pub fn acl_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.acl_prefix = prefix.into();
        self
    }

    /// Set the retry policy for remote calls
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Record the credential the service is managed with
    #[must_use]
    pub fn credentials(mut self, credentials: impl Into<String>) -> Self {
        self.credentials = Some(credentials.into());
        self
    }

    /// Add a snippet uploaded once by
    /// [`ServiceReconciler::create_static_snippets`]
    #[must_use]
    pub fn static_snippet(mut self, snippet: Snippet) -> Self {
        self.static_snippets.push(snippet);
        self
    }

    /// Build the reconciler.
    ///
    /// Fails if an action has no body or the ACL sizing is unusable.
    pub fn build(self) -> Result<ServiceReconciler> {
        if self.service_id.is_empty() {
            return Err(EdgeError::Config("service id must not be empty".into()));
        }
        if self.supported_actions.is_empty() {
            return Err(EdgeError::Config(format!(
                "service {} supports no actions",
                self.service_id
            )));
        }
        if self.acl_capacity == 0 {
            return Err(EdgeError::Config("acl capacity must be positive".into()));
        }

        let mut snippets = BTreeMap::new();
        let mut collections = BTreeMap::new();
        for action in &self.supported_actions {
            let body = self.action_bodies.get(action).ok_or_else(|| {
                EdgeError::Config(format!("no body configured for action {action}"))
            })?;

            snippets.insert(
                action.clone(),
                Snippet::new(
                    format!("{}_{action}_rule", self.acl_prefix),
                    self.service_id.as_str(),
                    self.version.as_str(),
                    body.as_str(),
                ),
            );
            collections.insert(
                action.clone(),
                AclCollection::new(
                    Arc::clone(&self.transport),
                    self.retry.clone(),
                    self.service_id.as_str(),
                    self.version.as_str(),
                    action.clone(),
                )
                .with_acl_count(self.acl_count)
                .with_capacity(self.acl_capacity)
                .with_prefix(self.acl_prefix.as_str()),
            );
        }

        let empty: ActionSets = self
            .supported_actions
            .iter()
            .map(|action| (action.clone(), BTreeSet::new()))
            .collect();

        Ok(ServiceReconciler {
            transport: self.transport,
            retry: self.retry,
            credentials: self.credentials,
            service_id: self.service_id,
            version: self.version,
            pending_activation: self.activate,
            supported_actions: self.supported_actions,
            snippets,
            static_snippets: self.static_snippets,
            countries: empty.clone(),
            as_numbers: empty,
            collections,
        })
    }
}
