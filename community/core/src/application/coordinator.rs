// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Community Coordinator
//!
//! Public face of the community subsystem for one agent. Every operation is
//! routed either to the co-located [`CommunityManager`] (when this agent
//! manages the community) or to the remote manager found through the naming
//! service. Responses update the [`CommunityCache`] and the
//! [`MembershipRegistry`] before they reach the caller's listener.
//!
//! ## Request flow
//!
//! ```text
//! caller ─► coordinator ─┬─► local manager ───────────────────► response
//!                        └─► locator ─► relay ─► remote manager ─► response
//!                                                                   │
//!                       cache.update ◄─ registry ◄─ listener ◄──────┘
//! ```
//!
//! Each request runs as its own task through the [`Operation`] state machine.
//! Remote responses are matched by correlation id; a duplicate or late
//! response finds no waiting operation and is dropped.
//!
//! ## Listeners
//!
//! Outcomes are reported to [`CommunityResponseListener`]s exactly once, as
//! `SUCCESS`, `FAIL` or `TIMEOUT`. Argument errors are returned synchronously
//! instead and never reach a listener. Operations that can be answered from the
//! cache return [`Resolution::Resolved`] and leave the listener untouched.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Protocol engine and entry point of the community subsystem

use super::cache::{ChangeListenerRef, CommunityCache, ListenerHandle, ListenerScope};
use super::delay_queue::DelayQueue;
use super::locator::ManagerLocator;
use super::membership_registry::{MembershipRegistry, PendingOperations};
use super::operation::{Operation, TransitionError};
use super::reconciler::{MembershipAuthority, MembershipReconciler};
use crate::domain::attributes::{AttributeModification, Attributes};
use crate::domain::community::{Community, Entity, EntityType, SearchQualifier, PARENT_ATTRIBUTE};
use crate::domain::config::CommunityServiceConfig;
use crate::domain::error::CommunityError;
use crate::domain::events::CommunityChangeEvent;
use crate::domain::filter::Filter;
use crate::domain::manager::CommunityManager;
use crate::domain::memberships::CommunityMemberships;
use crate::domain::naming::{NamingError, NamingService, COMMUNITY_SUFFIX};
use crate::domain::repository::{MembershipStore, RepositoryError};
use crate::domain::request::{
    CommunityRequest, CommunityResponse, CorrelationId, Deadline, RequestKind, RequestTimeout, ResponseContent,
    ResponseStatus,
};
use crate::domain::transport::{InboundHandler, MessageTransport, RelayPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Answer of an operation that may need the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    /// Answered from local state; the listener will not be called.
    Resolved(T),
    /// The answer will be delivered to the listener.
    Pending,
}

impl<T> Resolution<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Resolution::Pending)
    }

    pub fn resolved(self) -> Option<T> {
        match self {
            Resolution::Resolved(value) => Some(value),
            Resolution::Pending => None,
        }
    }
}

/// Receives the outcome of a community operation.
pub trait CommunityResponseListener: Send + Sync {
    fn response(&self, response: &CommunityResponse);
}

impl<F> CommunityResponseListener for F
where
    F: Fn(&CommunityResponse) + Send + Sync,
{
    fn response(&self, response: &CommunityResponse) {
        self(response)
    }
}

pub type ResponseListenerRef = Arc<dyn CommunityResponseListener>;

fn notify(listener: Option<&ResponseListenerRef>, response: &CommunityResponse) {
    let Some(listener) = listener else {
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| listener.response(response))).is_err() {
        metrics::counter!("community_listener_panics_total").increment(1);
        error!(%response, "Community response listener panicked");
    }
}

/// Listener that forwards the first response it sees to a oneshot channel.
fn oneshot_listener() -> (ResponseListenerRef, oneshot::Receiver<CommunityResponse>) {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let listener: ResponseListenerRef = Arc::new(move |response: &CommunityResponse| {
        if let Some(tx) = tx.lock().take() {
            let _ = tx.send(response.clone());
        }
    });
    (listener, rx)
}

/// Parameters of [`CommunityCoordinator::join_community`].
#[derive(Debug, Clone)]
pub struct JoinRequest {
    community: String,
    entity_name: Option<String>,
    entity_type: EntityType,
    entity_attributes: Attributes,
    create_if_not_found: bool,
    community_attributes: Attributes,
    timeout: RequestTimeout,
}

impl JoinRequest {
    /// Join `community` as this agent, without creating it.
    pub fn new(community: impl Into<String>) -> Self {
        Self {
            community: community.into(),
            entity_name: None,
            entity_type: EntityType::Agent,
            entity_attributes: Attributes::new(),
            create_if_not_found: false,
            community_attributes: Attributes::new(),
            timeout: RequestTimeout::Forever,
        }
    }

    /// Rebuild the join that made `entity` a member of `community`.
    pub fn for_entity(community: impl Into<String>, entity: &Entity) -> Self {
        let request = Self::new(community).entity_attributes(entity.attributes().clone());
        match entity.entity_type() {
            EntityType::Agent => request.agent(entity.name()),
            EntityType::Community => request.nested_community(entity.name()),
        }
    }

    /// Join on behalf of another agent.
    pub fn agent(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self.entity_type = EntityType::Agent;
        self
    }

    /// Add an existing community as a nested member.
    pub fn nested_community(mut self, name: impl Into<String>) -> Self {
        self.entity_name = Some(name.into());
        self.entity_type = EntityType::Community;
        self
    }

    pub fn entity_attributes(mut self, attributes: Attributes) -> Self {
        self.entity_attributes = attributes;
        self
    }

    /// Create the community with `attributes` if nobody manages it yet.
    pub fn create_if_not_found(mut self, attributes: Attributes) -> Self {
        self.create_if_not_found = true;
        self.community_attributes = attributes;
        self
    }

    pub fn timeout(mut self, timeout: RequestTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn community(&self) -> &str {
        &self.community
    }
}

/// Builds a [`CommunityCoordinator`] from its collaborators.
pub struct CommunityCoordinatorBuilder {
    agent_name: String,
    config: CommunityServiceConfig,
    cache: Option<Arc<CommunityCache>>,
    naming: Option<Arc<dyn NamingService>>,
    transport: Option<Arc<dyn MessageTransport>>,
    manager: Option<Arc<dyn CommunityManager>>,
    store: Option<Arc<dyn MembershipStore>>,
}

impl CommunityCoordinatorBuilder {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            config: CommunityServiceConfig::default(),
            cache: None,
            naming: None,
            transport: None,
            manager: None,
            store: None,
        }
    }

    pub fn config(mut self, config: CommunityServiceConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing cache. Without one, a cache is created from the
    /// configured expiration.
    pub fn cache(mut self, cache: Arc<CommunityCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn naming(mut self, naming: Arc<dyn NamingService>) -> Self {
        self.naming = Some(naming);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn manager(mut self, manager: Arc<dyn CommunityManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn store(mut self, store: Arc<dyn MembershipStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<CommunityCoordinator, CommunityError> {
        if self.agent_name.is_empty() {
            return Err(CommunityError::InvalidArgument("agent name must not be empty".to_string()));
        }
        let missing = |what: &str| CommunityError::InvalidArgument(format!("{} is required", what));
        let naming = self.naming.ok_or_else(|| missing("naming service"))?;
        let transport = self.transport.ok_or_else(|| missing("message transport"))?;
        let manager = self.manager.ok_or_else(|| missing("community manager"))?;
        let config = self.config;
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(CommunityCache::new(config.cache_expiration())));
        let queue = Arc::new(DelayQueue::new());
        let locator = ManagerLocator::new(
            naming.clone(),
            queue.clone(),
            config.find_manager_retry_delay,
            config.naming_wait,
        );

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| Inner {
            agent_name: self.agent_name,
            config,
            cache,
            naming,
            transport,
            manager,
            store: self.store,
            registry: Arc::new(MembershipRegistry::new()),
            pending: Arc::new(PendingOperations::new()),
            queue,
            locator,
            endpoint: Arc::new(InboundEndpoint { inner: weak.clone() }),
            outstanding: Mutex::new(HashMap::new()),
            lookups: Mutex::new(HashMap::new()),
            parent_queries: Mutex::new(HashMap::new()),
            remote_parents: Mutex::new(HashMap::new()),
            reconciler: Mutex::new(None),
            running: AtomicBool::new(true),
        });
        Ok(CommunityCoordinator { inner })
    }
}

struct Inner {
    agent_name: String,
    config: CommunityServiceConfig,
    cache: Arc<CommunityCache>,
    naming: Arc<dyn NamingService>,
    transport: Arc<dyn MessageTransport>,
    manager: Arc<dyn CommunityManager>,
    store: Option<Arc<dyn MembershipStore>>,
    registry: Arc<MembershipRegistry>,
    pending: Arc<PendingOperations>,
    queue: Arc<DelayQueue>,
    locator: ManagerLocator,
    endpoint: Arc<dyn InboundHandler>,
    /// Remote requests waiting for their response.
    outstanding: Mutex<HashMap<CorrelationId, oneshot::Sender<CommunityResponse>>>,
    /// Callers waiting on an in-flight descriptor lookup.
    lookups: Mutex<HashMap<String, Vec<ResponseListenerRef>>>,
    parent_queries: Mutex<HashMap<CorrelationId, Option<ResponseListenerRef>>>,
    /// Last parent answer per remote member, consumed by the next synchronous call.
    remote_parents: Mutex<HashMap<String, BTreeSet<String>>>,
    reconciler: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

/// Community coordinator of one agent. Cheap to clone.
#[derive(Clone)]
pub struct CommunityCoordinator {
    inner: Arc<Inner>,
}

impl CommunityCoordinator {
    pub fn builder(agent_name: impl Into<String>) -> CommunityCoordinatorBuilder {
        CommunityCoordinatorBuilder::new(agent_name)
    }

    pub fn agent_name(&self) -> &str {
        &self.inner.agent_name
    }

    pub fn config(&self) -> &CommunityServiceConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<CommunityCache> {
        &self.inner.cache
    }

    /// Snapshot of the communities this agent believes it joined.
    pub fn memberships(&self) -> CommunityMemberships {
        self.inner.registry.snapshot()
    }

    /// Handler to register with the transport for payloads addressed to this
    /// agent.
    pub fn inbound_handler(&self) -> Arc<dyn InboundHandler> {
        self.inner.endpoint.clone()
    }

    /// Restore the membership registry and start the reconciler.
    pub async fn start(&self) -> Result<(), RepositoryError> {
        let inner = &self.inner;
        if let Some(store) = &inner.store {
            if let Some(saved) = store.load().await? {
                inner.registry.restore(saved);
            }
        }
        if inner.config.verify_memberships {
            let handle = Arc::new(self.reconciler()).spawn(inner.config.verify_memberships_interval);
            if let Some(previous) = inner.reconciler.lock().replace(handle) {
                previous.abort();
            }
        }
        info!(
            agent = %inner.agent_name,
            communities = inner.registry.communities().len(),
            "Community coordinator started"
        );
        Ok(())
    }

    /// Stop the reconciler, abandon outstanding requests and persist the
    /// registry. Operations issued afterwards are refused.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        if !inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = inner.reconciler.lock().take() {
            handle.abort();
        }
        inner.outstanding.lock().clear();
        if let Some(store) = &inner.store {
            if let Err(e) = inner.registry.flush(store.as_ref()).await {
                warn!(agent = %inner.agent_name, error = %e, "Failed to persist community memberships");
            }
        }
        info!(agent = %inner.agent_name, "Community coordinator stopped");
    }

    /// Run one reconciliation pass now.
    pub async fn verify_memberships(&self) {
        self.reconciler().validate().await;
    }

    fn reconciler(&self) -> MembershipReconciler {
        MembershipReconciler::new(
            Arc::new(self.clone()),
            self.inner.registry.clone(),
            self.inner.pending.clone(),
            self.inner.store.clone(),
        )
    }

    fn ensure_running(&self) -> Result<(), CommunityError> {
        if self.inner.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(CommunityError::Unsupported("coordinator is shut down".to_string()))
        }
    }

    /// Create `community` (if nobody manages it yet) and join it as this agent.
    pub fn create_community(
        &self,
        community: &str,
        attributes: Attributes,
        listener: Option<ResponseListenerRef>,
    ) -> Result<(), CommunityError> {
        self.join_community(JoinRequest::new(community).create_if_not_found(attributes), listener)
    }

    pub fn join_community(
        &self,
        request: JoinRequest,
        listener: Option<ResponseListenerRef>,
    ) -> Result<(), CommunityError> {
        self.ensure_running()?;
        require_name("community", &request.community)?;
        if let Some(entity) = &request.entity_name {
            require_name("entity", entity)?;
        }
        if request.entity_type == EntityType::Community && request.entity_name.is_none() {
            return Err(CommunityError::InvalidArgument("nested community name is required".to_string()));
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let response = inner.run_join(request, true).await;
            notify(listener.as_ref(), &response);
        });
        Ok(())
    }

    pub fn leave_community(
        &self,
        community: &str,
        entity_name: Option<&str>,
        timeout: RequestTimeout,
        listener: Option<ResponseListenerRef>,
    ) -> Result<(), CommunityError> {
        self.ensure_running()?;
        require_name("community", community)?;
        let entity = entity_name.unwrap_or(&self.inner.agent_name).to_string();
        require_name("entity", &entity)?;

        if let Some(cached) = self.inner.cache.get(community) {
            if !cached.has_entity(&entity) {
                debug!(community = %community, entity = %entity, "Leave refused, not a member of the cached community");
                notify(listener.as_ref(), &CommunityResponse::fail());
                return Ok(());
            }
        }

        let inner = self.inner.clone();
        let community = community.to_string();
        tokio::spawn(async move {
            let response = inner.run_leave(&community, &entity, timeout.deadline()).await;
            notify(listener.as_ref(), &response);
        });
        Ok(())
    }

    /// Modify the attributes of `entity_name` in `community`, or of the
    /// community itself when `entity_name` is `None`.
    pub fn modify_attributes(
        &self,
        community: &str,
        entity_name: Option<&str>,
        modifications: Vec<AttributeModification>,
        listener: Option<ResponseListenerRef>,
    ) -> Result<(), CommunityError> {
        self.ensure_running()?;
        require_name("community", community)?;
        if modifications.is_empty() {
            return Err(CommunityError::InvalidArgument("no attribute modifications given".to_string()));
        }

        let inner = self.inner.clone();
        let community = community.to_string();
        let entity = entity_name.map(String::from);
        tokio::spawn(async move {
            let deadline = inner.config.request_timeout().deadline();
            let response = inner.run_modify(&community, entity.as_deref(), modifications, deadline).await;
            notify(listener.as_ref(), &response);
        });
        Ok(())
    }

    /// Search members of `community` (or, with `None`, the attributes of every
    /// cached community) using an attribute filter.
    pub fn search_community(
        &self,
        community: Option<&str>,
        filter: &str,
        recursive: bool,
        qualifier: SearchQualifier,
        listener: Option<ResponseListenerRef>,
    ) -> Result<Resolution<Vec<Entity>>, CommunityError> {
        let filter = Filter::parse(filter)?;
        let cache = &self.inner.cache;

        let Some(community) = community else {
            let found = cache
                .search_communities(&filter)
                .into_iter()
                .map(|c| Entity::Community(c.as_ref().clone()))
                .collect();
            return Ok(Resolution::Resolved(found));
        };
        if cache.contains(community) {
            return Ok(Resolution::Resolved(cache.search_entities_with(
                community, &filter, qualifier, recursive,
            )));
        }

        self.ensure_running()?;
        let inner = self.inner.clone();
        let community = community.to_string();
        tokio::spawn(async move {
            let found = if inner.lookup(&community).await.is_success() {
                inner.cache.search_entities_with(&community, &filter, qualifier, recursive)
            } else {
                Vec::new()
            };
            debug!(community = %community, %filter, results = found.len(), "Remote community search finished");
            notify(listener.as_ref(), &CommunityResponse::success(ResponseContent::Entities(found)));
        });
        Ok(Resolution::Pending)
    }

    /// Cached copy of `community`. On a miss, one descriptor request is issued
    /// (callers arriving meanwhile share it) and `listener` gets the outcome.
    pub fn get_community(&self, community: &str, listener: Option<ResponseListenerRef>) -> Option<Arc<Community>> {
        if let Some(cached) = self.inner.cache.get(community) {
            return Some(cached);
        }
        self.inner.start_lookup(community, listener);
        None
    }

    /// Names of all communities bound in the naming service.
    pub fn list_all_communities(&self, listener: ResponseListenerRef) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let response = match inner.all_communities().await {
                Ok(names) => CommunityResponse::success(ResponseContent::Names(names)),
                Err(NamingError::Timeout) => CommunityResponse::timeout(),
                Err(e) => {
                    warn!(error = %e, "Failed to list communities");
                    CommunityResponse::fail()
                }
            };
            notify(Some(&listener), &response);
        });
    }

    /// Communities listing this agent, directly or with `all_levels` also
    /// transitively, according to the cache.
    pub fn parent_communities(&self, all_levels: bool) -> BTreeSet<String> {
        self.inner.cache.ancestor_names(&self.inner.agent_name, all_levels)
    }

    /// Parents of `member` (this agent when `None`). Remote members are asked
    /// over the relay; their answer goes to `listener` and is kept for the
    /// next call.
    pub fn list_parent_communities(
        &self,
        member: Option<&str>,
        listener: Option<ResponseListenerRef>,
    ) -> Resolution<BTreeSet<String>> {
        let member = member.unwrap_or(&self.inner.agent_name).to_string();
        if let Some(parents) = self.inner.local_parents(&member) {
            return Resolution::Resolved(parents);
        }
        if let Some(parents) = self.inner.remote_parents.lock().remove(&member) {
            return Resolution::Resolved(parents);
        }
        let inner = self.inner.clone();
        tokio::spawn(async move { inner.query_parents(member, listener).await });
        Resolution::Pending
    }

    pub fn add_listener(&self, scope: ListenerScope, listener: ChangeListenerRef) -> ListenerHandle {
        self.inner.cache.add_listener(scope, listener)
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        self.inner.cache.remove_listener(handle)
    }

    /// Locate the manager of `community`; `callback` runs exactly once with its
    /// name, or `None` once `timeout` is exhausted.
    pub fn find_community<F>(&self, community: &str, callback: F, timeout: RequestTimeout)
    where
        F: FnOnce(Option<String>) + Send + 'static,
    {
        let inner = self.inner.clone();
        let community = community.to_string();
        tokio::spawn(async move {
            let manager = inner.locator.find_manager(&community, timeout.deadline()).await;
            if catch_unwind(AssertUnwindSafe(move || callback(manager))).is_err() {
                metrics::counter!("community_listener_panics_total").increment(1);
                error!(community = %community, "Find-community callback panicked");
            }
        });
    }
}

fn require_name(what: &str, name: &str) -> Result<(), CommunityError> {
    if name.trim().is_empty() {
        return Err(CommunityError::InvalidArgument(format!("{} name must not be empty", what)));
    }
    Ok(())
}

impl Inner {
    /// How long to wait for a relayed response. `None` waits forever.
    fn response_wait(&self, deadline: Deadline) -> Option<Duration> {
        match deadline {
            Deadline::Never => None,
            Deadline::SingleAttempt => Some(self.config.find_manager_retry_delay),
            Deadline::At(_) => deadline.remaining(),
        }
    }

    /// Send `request` to the community's manager and absorb the response.
    async fn execute(&self, mut request: CommunityRequest, deadline: Deadline) -> CommunityResponse {
        let mut operation = Operation::new(request.correlation_id, request.kind, &request.community);
        let response = match self.dispatch(&mut operation, &mut request, deadline).await {
            Ok(response) => response,
            Err(e) => {
                error!(request = %request, error = %e, "Community operation aborted");
                CommunityResponse::fail()
            }
        };
        if response.status == ResponseStatus::Timeout {
            metrics::counter!("community_request_timeouts_total").increment(1);
            warn!(community = %request.community, kind = %request.kind, "Community request timed out");
        }
        if let Some(community) = response.community().filter(|_| response.is_success()) {
            self.cache.update(community);
        }
        response
    }

    async fn dispatch(
        &self,
        operation: &mut Operation,
        request: &mut CommunityRequest,
        deadline: Deadline,
    ) -> Result<CommunityResponse, TransitionError> {
        if self.manager.is_manager(&request.community) {
            request.target = self.agent_name.clone();
            let response = self.manager.process_request(request).await;
            operation.complete()?;
            return Ok(response);
        }

        operation.await_manager()?;
        let Some(manager) = self.locator.find_manager(&request.community, deadline).await else {
            operation.time_out()?;
            return Ok(CommunityResponse::timeout());
        };
        request.target = manager.clone();
        operation.await_response()?;

        if manager == self.agent_name {
            let response = self.manager.process_request(request).await;
            operation.complete()?;
            return Ok(response);
        }

        let id = request.correlation_id;
        let (tx, rx) = oneshot::channel();
        self.outstanding.lock().insert(id, tx);
        metrics::counter!("community_requests_sent_total").increment(1);
        debug!(request = %request, "Relaying community request");
        let targets = BTreeSet::from([manager]);
        if let Err(e) = self
            .transport
            .send_relay(&self.agent_name, &targets, RelayPayload::Request(request.clone()))
            .await
        {
            self.outstanding.lock().remove(&id);
            warn!(request = %request, error = %e, "Community request could not be relayed");
            operation.time_out()?;
            return Ok(CommunityResponse::timeout());
        }

        let received = match self.response_wait(deadline) {
            None => rx.await.ok(),
            Some(wait) => tokio::time::timeout(wait, rx).await.ok().and_then(Result::ok),
        };
        match received {
            Some(response) => {
                operation.complete()?;
                trace!(id = %id, %response, "Community response received");
                Ok(response)
            }
            None => {
                self.outstanding.lock().remove(&id);
                operation.time_out()?;
                Ok(CommunityResponse::timeout())
            }
        }
    }

    async fn run_join(self: &Arc<Self>, request: JoinRequest, track_pending: bool) -> CommunityResponse {
        let claimed = track_pending && self.pending.try_begin(&request.community);
        let response = self.join(request.clone()).await;
        if claimed {
            self.pending.finish(&request.community);
        }
        debug!(community = %request.community, status = %response.status, "Join finished");
        response
    }

    async fn join(self: &Arc<Self>, request: JoinRequest) -> CommunityResponse {
        let entity_name = request.entity_name.clone().unwrap_or_else(|| self.agent_name.clone());
        let deadline = request.timeout.deadline();

        match request.entity_type {
            EntityType::Agent => {
                if request.create_if_not_found {
                    if entity_name != self.agent_name {
                        warn!(
                            community = %request.community,
                            entity = %entity_name,
                            "Cannot create a community by proxy; joining only if it already exists"
                        );
                    } else if self.lost_creation_race(&request).await {
                        self.queue.wait(self.config.create_retry_delay, "create_retry").await;
                    }
                }
                let entity = Entity::agent(entity_name, request.entity_attributes);
                self.complete_join(&request.community, entity, deadline).await
            }
            EntityType::Community => {
                if request.create_if_not_found {
                    warn!(
                        community = %request.community,
                        nested = %entity_name,
                        "Creation is not supported for nested communities; joining only if it exists"
                    );
                }
                if self.locator.find_manager(&entity_name, Deadline::SingleAttempt).await.is_none() {
                    debug!(community = %request.community, nested = %entity_name, "Nested community does not exist");
                    return CommunityResponse::fail();
                }
                let entity = Entity::of_type(EntityType::Community, &entity_name, request.entity_attributes);
                let response = self.complete_join(&request.community, entity, deadline).await;
                if response.is_success() {
                    self.update_parent_attribute(&entity_name, &request.community, true).await;
                }
                response
            }
        }
    }

    /// Try to become manager of a community nobody manages yet. Returns `true`
    /// when another agent won the binding first.
    async fn lost_creation_race(&self, request: &JoinRequest) -> bool {
        if self.locator.find_manager(&request.community, Deadline::SingleAttempt).await.is_some() {
            return false;
        }
        let community = Community::with_attributes(&request.community, request.community_attributes.clone());
        match self.manager.manage_community(community).await {
            Ok(true) => {
                info!(community = %request.community, agent = %self.agent_name, "Community created");
                false
            }
            Ok(false) => {
                debug!(community = %request.community, "Lost community creation race; joining the winner");
                true
            }
            Err(e) => {
                warn!(community = %request.community, error = %e, "Community creation failed");
                true
            }
        }
    }

    async fn complete_join(&self, community: &str, entity: Entity, deadline: Deadline) -> CommunityResponse {
        let request = CommunityRequest::new(&self.agent_name, community, RequestKind::Join)
            .with_entity(Some(entity.clone()));
        let response = self.execute(request, deadline).await;
        if !response.is_success() {
            return response;
        }
        match self.await_membership(community, entity.name(), true, deadline).await {
            Some(snapshot) => {
                self.registry.add(community, entity);
                CommunityResponse::success(ResponseContent::Community(snapshot.as_ref().clone()))
            }
            None => {
                warn!(community = %community, entity = %entity.name(), "Join acknowledged but membership never became visible");
                CommunityResponse::timeout()
            }
        }
    }

    async fn run_leave(self: &Arc<Self>, community: &str, entity_name: &str, deadline: Deadline) -> CommunityResponse {
        let claimed = self.pending.try_begin(community);
        let response = self.leave(community, entity_name, deadline).await;
        if claimed {
            self.pending.finish(community);
        }
        debug!(community = %community, entity = %entity_name, status = %response.status, "Leave finished");
        response
    }

    async fn leave(self: &Arc<Self>, community: &str, entity_name: &str, deadline: Deadline) -> CommunityResponse {
        let lookup = self.lookup(community).await;
        let Some(member) = lookup.community().and_then(|c| c.entity(entity_name)).cloned() else {
            return match lookup.status {
                ResponseStatus::Success => CommunityResponse::fail(),
                _ => lookup,
            };
        };

        let nested = member.entity_type() == EntityType::Community;
        if nested && !self.manager.is_manager(community) {
            debug!(
                community = %community,
                nested = %entity_name,
                "Only the manager of the parent community may remove a nested community"
            );
            return CommunityResponse::fail();
        }

        let request = CommunityRequest::new(&self.agent_name, community, RequestKind::Leave).with_entity(Some(member));
        let response = self.execute(request, deadline).await;
        if !response.is_success() {
            return response;
        }
        if nested {
            self.update_parent_attribute(entity_name, community, false).await;
        }
        match self.await_membership(community, entity_name, false, deadline).await {
            Some(snapshot) => {
                self.registry.remove_entity(community, entity_name);
                CommunityResponse::success(ResponseContent::Community(snapshot.as_ref().clone()))
            }
            None => CommunityResponse::timeout(),
        }
    }

    async fn run_modify(
        &self,
        community: &str,
        entity_name: Option<&str>,
        modifications: Vec<AttributeModification>,
        deadline: Deadline,
    ) -> CommunityResponse {
        let entity = entity_name.map(|name| Entity::agent(name, Attributes::new()));
        let request = CommunityRequest::new(&self.agent_name, community, RequestKind::ModifyAttributes)
            .with_entity(entity)
            .with_modifications(modifications.clone());
        let response = self.execute(request, deadline).await;

        if response.is_success() {
            if let Some(mut recorded) = entity_name.and_then(|name| self.registry.entity(community, name)) {
                recorded.attributes_mut().apply(&modifications);
                self.registry.add(community, recorded);
            }
        }
        response
    }

    /// Add or remove `parent` in the `Parent` attribute of `nested`.
    async fn update_parent_attribute(self: &Arc<Self>, nested: &str, parent: &str, add: bool) {
        let lookup = self.lookup(nested).await;
        let Some(current) = lookup.community() else {
            warn!(community = %nested, parent = %parent, "Cannot maintain parent attribute, community unavailable");
            return;
        };
        let has_parent = current.attributes().contains_value(PARENT_ATTRIBUTE, parent);
        let modification = match (add, has_parent) {
            (true, false) => AttributeModification::add_value(PARENT_ATTRIBUTE, parent),
            (false, true) => AttributeModification::remove_value(PARENT_ATTRIBUTE, parent),
            _ => return,
        };
        let deadline = self.config.request_timeout().deadline();
        let response = self.run_modify(nested, None, vec![modification], deadline).await;
        debug!(community = %nested, parent = %parent, add, status = %response.status, "Parent attribute updated");
    }

    /// Wait until the cached copy of `community` shows `entity` as a member
    /// (`present`) or no longer does.
    async fn await_membership(
        &self,
        community: &str,
        entity: &str,
        present: bool,
        deadline: Deadline,
    ) -> Option<Arc<Community>> {
        if let Some(cached) = self.cache.get(community) {
            if cached.has_entity(entity) == present {
                return Some(cached);
            }
        }

        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));
        let (name, member) = (community.to_string(), entity.to_string());
        let listener: ChangeListenerRef = Arc::new(move |event: &CommunityChangeEvent| {
            if event.community_name() == name && event.community.has_entity(&member) == present {
                if let Some(tx) = tx.lock().take() {
                    let _ = tx.send(event.community.clone());
                }
            }
        });
        let handle = self.cache.add_listener(ListenerScope::community(community), listener);
        trace!(community = %community, entity = %entity, present, "Waiting for membership change");

        let seen = match self.response_wait(deadline) {
            None => rx.await.ok(),
            Some(wait) => tokio::time::timeout(wait, rx).await.ok().and_then(Result::ok),
        };
        self.cache.remove_listener(handle);
        seen
    }

    /// Descriptor of `community`, from the cache or through a shared lookup.
    async fn lookup(self: &Arc<Self>, community: &str) -> CommunityResponse {
        if let Some(cached) = self.cache.get(community) {
            return CommunityResponse::success(ResponseContent::Community(cached.as_ref().clone()));
        }
        let (listener, rx) = oneshot_listener();
        self.start_lookup(community, Some(listener));
        rx.await.unwrap_or_else(|_| CommunityResponse::timeout())
    }

    fn start_lookup(self: &Arc<Self>, community: &str, listener: Option<ResponseListenerRef>) {
        let claimed = {
            let mut lookups = self.lookups.lock();
            let waiting = lookups.entry(community.to_string()).or_default();
            waiting.extend(listener);
            self.cache.begin_lookup(community)
        };
        if !claimed {
            if let Some(cached) = self.cache.get(community) {
                let waiting = self.lookups.lock().remove(community).unwrap_or_default();
                let response = CommunityResponse::success(ResponseContent::Community(cached.as_ref().clone()));
                for listener in &waiting {
                    notify(Some(listener), &response);
                }
            } else {
                trace!(community = %community, "Joining in-flight descriptor lookup");
            }
            return;
        }

        let inner = self.clone();
        let community = community.to_string();
        tokio::spawn(async move {
            let request = CommunityRequest::new(&inner.agent_name, &community, RequestKind::GetDescriptor);
            let response = inner.execute(request, inner.config.request_timeout().deadline()).await;
            let waiting = {
                let mut lookups = inner.lookups.lock();
                inner.cache.end_lookup(&community);
                lookups.remove(&community).unwrap_or_default()
            };
            debug!(community = %community, status = %response.status, waiting = waiting.len(), "Descriptor lookup finished");
            for listener in &waiting {
                notify(Some(listener), &response);
            }
        });
    }

    async fn all_communities(&self) -> Result<BTreeSet<String>, NamingError> {
        let keys = tokio::time::timeout(self.config.naming_wait, self.naming.list(COMMUNITY_SUFFIX))
            .await
            .map_err(|_| NamingError::Timeout)??;
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_suffix(COMMUNITY_SUFFIX))
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect())
    }

    /// Parents known locally: this agent's from the cache, a cached
    /// community's from its `Parent` attribute.
    fn local_parents(&self, member: &str) -> Option<BTreeSet<String>> {
        if member == self.agent_name {
            return Some(self.cache.ancestor_names(member, false));
        }
        self.cache.get(member).map(|community| {
            community
                .attributes()
                .get(PARENT_ATTRIBUTE)
                .cloned()
                .unwrap_or_default()
        })
    }

    async fn query_parents(self: &Arc<Self>, member: String, listener: Option<ResponseListenerRef>) {
        let is_community = match self.all_communities().await {
            Ok(names) => names.contains(&member),
            Err(e) => {
                debug!(member = %member, error = %e, "Community listing failed, querying member directly");
                false
            }
        };
        let target = if is_community {
            let deadline = RequestTimeout::After(self.config.find_manager_retry_delay).deadline();
            match self.locator.find_manager(&member, deadline).await {
                Some(manager) => manager,
                None => {
                    debug!(member = %member, "No manager found for parent query");
                    let empty = CommunityResponse::new(ResponseStatus::Timeout, ResponseContent::Names(BTreeSet::new()));
                    notify(listener.as_ref(), &empty);
                    return;
                }
            }
        } else {
            member.clone()
        };

        let correlation_id = CorrelationId::new();
        self.parent_queries.lock().insert(correlation_id, listener);
        // Unanswered queries always expire, even without a request timeout.
        let wait = match self.config.request_timeout() {
            RequestTimeout::After(wait) => wait,
            RequestTimeout::Forever | RequestTimeout::SingleAttempt => {
                self.config.verify_memberships_interval.max(self.config.find_manager_retry_delay)
            }
        };
        let weak = Arc::downgrade(self);
        self.queue.schedule(wait, "parent_query_timeout", move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let expired = inner.parent_queries.lock().remove(&correlation_id);
            if let Some(listener) = expired {
                debug!(id = %correlation_id, "Parent query expired unanswered");
                notify(listener.as_ref(), &CommunityResponse::timeout());
            }
        });

        debug!(member = %member, target = %target, id = %correlation_id, "Querying parent communities");
        let payload = RelayPayload::ParentQuery { member, correlation_id };
        if let Err(e) = self
            .transport
            .send_relay(&self.agent_name, &BTreeSet::from([target]), payload)
            .await
        {
            warn!(error = %e, "Parent query could not be relayed");
            let abandoned = self.parent_queries.lock().remove(&correlation_id);
            if let Some(listener) = abandoned {
                notify(listener.as_ref(), &CommunityResponse::timeout());
            }
        }
    }

    async fn handle_inbound(&self, source: &str, payload: RelayPayload) {
        trace!(source = %source, kind = payload.kind(), "Inbound community payload");
        match payload {
            RelayPayload::Request(mut request) => {
                request.response = self.manager.process_request(&request).await;
                debug!(request = %request, response = %request.response, "Answering community request");
                let reply_to = BTreeSet::from([request.source.clone()]);
                if let Err(e) = self
                    .transport
                    .send_relay(&self.agent_name, &reply_to, RelayPayload::Response(request))
                    .await
                {
                    warn!(source = %source, error = %e, "Community response could not be relayed");
                }
            }
            RelayPayload::Response(request) => {
                let waiting = self.outstanding.lock().remove(&request.correlation_id);
                match waiting {
                    Some(tx) => {
                        let _ = tx.send(request.response);
                    }
                    None => trace!(id = %request.correlation_id, "Ignoring duplicate or late community response"),
                }
            }
            RelayPayload::Descriptor(community) => {
                self.cache.update(&community);
            }
            RelayPayload::DescriptorRemoved(name) => {
                self.cache.remove(&name);
            }
            RelayPayload::ParentQuery { member, correlation_id } => {
                let parents = self.local_parents(&member).unwrap_or_default();
                debug!(source = %source, member = %member, parents = parents.len(), "Answering parent query");
                let answer = RelayPayload::ParentAnswer { member, parents, correlation_id };
                if let Err(e) = self
                    .transport
                    .send_relay(&self.agent_name, &BTreeSet::from([source.to_string()]), answer)
                    .await
                {
                    warn!(source = %source, error = %e, "Parent answer could not be relayed");
                }
            }
            RelayPayload::ParentAnswer { member, parents, correlation_id } => {
                let waiting = self.parent_queries.lock().remove(&correlation_id);
                let Some(listener) = waiting else {
                    trace!(id = %correlation_id, "Ignoring duplicate or late parent answer");
                    return;
                };
                self.remote_parents.lock().insert(member, parents.clone());
                notify(listener.as_ref(), &CommunityResponse::success(ResponseContent::Names(parents)));
            }
        }
    }
}

struct InboundEndpoint {
    inner: Weak<Inner>,
}

#[async_trait]
impl InboundHandler for InboundEndpoint {
    async fn deliver(&self, source: &str, payload: RelayPayload) {
        if let Some(inner) = self.inner.upgrade() {
            inner.handle_inbound(source, payload).await;
        }
    }
}

#[async_trait]
impl MembershipAuthority for CommunityCoordinator {
    fn agent_name(&self) -> &str {
        &self.inner.agent_name
    }

    async fn locate_manager(&self, community: &str) -> Option<String> {
        self.inner.locator.find_manager(community, Deadline::SingleAttempt).await
    }

    async fn fetch_community(&self, community: &str) -> Option<Community> {
        let request = CommunityRequest::new(&self.inner.agent_name, community, RequestKind::GetDescriptor);
        let response = self.inner.execute(request, Deadline::SingleAttempt).await;
        response.community().filter(|_| response.is_success()).cloned()
    }

    fn parent_communities(&self) -> BTreeSet<String> {
        self.inner.cache.ancestor_names(&self.inner.agent_name, false)
    }

    async fn rejoin(&self, community: &str, entity: Entity) -> ResponseStatus {
        let request = JoinRequest::for_entity(community, &entity)
            .timeout(RequestTimeout::After(self.inner.config.verify_memberships_interval));
        self.inner.run_join(request, false).await.status
    }

    async fn correct_attributes(
        &self,
        community: &str,
        entity: &str,
        modifications: Vec<AttributeModification>,
    ) -> ResponseStatus {
        let deadline = RequestTimeout::After(self.inner.config.verify_memberships_interval).deadline();
        self.inner.run_modify(community, Some(entity), modifications, deadline).await.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::manager::DefaultCommunityManager;
    use crate::infrastructure::naming::InMemoryNamingService;
    use crate::infrastructure::network::InMemoryNetwork;
    use tokio::sync::mpsc;

    fn coordinator(agent: &str, naming: &Arc<InMemoryNamingService>, network: &Arc<InMemoryNetwork>) -> CommunityCoordinator {
        let transport = Arc::new(network.transport(agent));
        let manager = Arc::new(DefaultCommunityManager::new(agent, naming.clone(), transport.clone()));
        let config = CommunityServiceConfig { verify_memberships: false, ..Default::default() };
        let coordinator = CommunityCoordinator::builder(agent)
            .config(config)
            .naming(naming.clone())
            .transport(transport)
            .manager(manager)
            .build()
            .unwrap();
        network.register(agent, &coordinator.inbound_handler());
        coordinator
    }

    fn responder() -> (ResponseListenerRef, mpsc::UnboundedReceiver<CommunityResponse>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener: ResponseListenerRef = Arc::new(move |response: &CommunityResponse| {
            let _ = tx.send(response.clone());
        });
        (listener, rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<CommunityResponse>) -> CommunityResponse {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no response")
            .expect("listener dropped")
    }

    #[tokio::test]
    async fn test_create_and_join_against_empty_naming() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let (listener, mut rx) = responder();

        a.create_community("Society", Attributes::new().with("Domain", "logistics"), Some(listener))
            .unwrap();
        let response = next(&mut rx).await;

        assert!(response.is_success());
        let community = response.community().unwrap();
        assert!(community.has_entity("AgentA"));
        assert!(community.attributes().contains_value("Domain", "logistics"));
        assert!(a.memberships().contains_entity("Society", "AgentA"));
        assert!(a.get_community("Society", None).unwrap().has_entity("AgentA"));
        assert_eq!(a.parent_communities(false), BTreeSet::from(["Society".to_string()]));
    }

    #[tokio::test]
    async fn test_leave_of_non_member_fails_without_traffic() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let mut society = Community::new("Society");
        society.add_entity(Entity::agent("AgentB", Attributes::new()));
        a.cache().update(&society);

        let (listener, mut rx) = responder();
        a.leave_community("Society", None, RequestTimeout::Forever, Some(listener)).unwrap();

        let response = rx.try_recv().expect("answered synchronously");
        assert_eq!(response.status, ResponseStatus::Fail);
        assert_eq!(response.content, ResponseContent::Empty);
        assert_eq!(network.relayed_count(), 0);
    }

    #[tokio::test]
    async fn test_join_then_leave_locally_managed_community() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let (listener, mut rx) = responder();

        a.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
        assert!(next(&mut rx).await.is_success());

        a.leave_community("Society", None, RequestTimeout::Forever, Some(listener)).unwrap();
        let response = next(&mut rx).await;
        assert!(response.is_success());
        assert!(!response.community().unwrap().has_entity("AgentA"));
        assert!(!a.memberships().contains("Society"));
    }

    #[tokio::test]
    async fn test_search_resolves_from_cache() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let mut society = Community::with_attributes("Society", Attributes::new().with("Domain", "logistics"));
        society.add_entity(Entity::agent("AgentB", Attributes::new().with("Role", "Member")));
        society.add_entity(Entity::agent("AgentC", Attributes::new().with("Role", "Observer")));
        a.cache().update(&society);

        let found = a
            .search_community(Some("Society"), "(Role=Member)", false, SearchQualifier::AllEntities, None)
            .unwrap();
        let names: Vec<String> = found.resolved().unwrap().iter().map(|e| e.name().to_string()).collect();
        assert_eq!(names, vec!["AgentB".to_string()]);

        let communities = a
            .search_community(None, "(Domain=log*)", false, SearchQualifier::AllEntities, None)
            .unwrap();
        assert_eq!(communities.resolved().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_of_unknown_community_is_pending() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);

        let (listener, _rx) = responder();
        let resolution = a
            .search_community(Some("Elsewhere"), "(Role=*)", false, SearchQualifier::AllEntities, Some(listener))
            .unwrap();
        assert!(resolution.is_pending());
        assert!(a.cache().is_pending("Elsewhere"));
    }

    #[tokio::test]
    async fn test_invalid_filter_is_a_synchronous_error() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);

        let result = a.search_community(None, "(Role=Member", false, SearchQualifier::AllEntities, None);
        assert!(matches!(result, Err(CommunityError::Filter(_))));
    }

    #[tokio::test]
    async fn test_argument_validation() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);

        assert!(matches!(
            a.join_community(JoinRequest::new(""), None),
            Err(CommunityError::InvalidArgument(_))
        ));
        assert!(matches!(
            a.modify_attributes("Society", None, Vec::new(), None),
            Err(CommunityError::InvalidArgument(_))
        ));
        assert!(CommunityCoordinator::builder("AgentA").build().is_err());
    }

    #[tokio::test]
    async fn test_operations_refused_after_shutdown() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        a.shutdown().await;

        assert!(matches!(
            a.join_community(JoinRequest::new("Society"), None),
            Err(CommunityError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_get_community_shares_one_lookup() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let b = coordinator("AgentB", &naming, &network);
        let (listener, mut rx) = responder();
        a.create_community("Society", Attributes::new(), Some(listener)).unwrap();
        assert!(next(&mut rx).await.is_success());

        let (first, mut first_rx) = responder();
        let (second, mut second_rx) = responder();
        assert!(b.get_community("Society", Some(first)).is_none());
        assert!(b.cache().is_pending("Society"));
        assert!(b.get_community("Society", Some(second)).is_none());

        assert!(next(&mut first_rx).await.is_success());
        assert!(next(&mut second_rx).await.is_success());
        assert!(network.relayed_count() >= 1);
        assert!(b.get_community("Society", None).unwrap().has_entity("AgentA"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_find_community_single_attempt() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let (tx, rx) = oneshot::channel();

        a.find_community("Nowhere", move |manager| {
            let _ = tx.send(manager);
        }, RequestTimeout::SingleAttempt);

        assert_eq!(rx.await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_parent_query_expires_without_request_timeout() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        assert_eq!(a.config().request_timeout(), RequestTimeout::Forever);
        network.set_partitioned("AgentB", true);

        let (listener, mut rx) = responder();
        assert!(a.list_parent_communities(Some("AgentB"), Some(listener)).is_pending());
        tokio::task::yield_now().await;

        let response = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("parent query never expired")
            .expect("listener dropped");
        assert_eq!(response.status, ResponseStatus::Timeout);
        assert!(a.inner.parent_queries.lock().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_response_listener_is_contained() {
        let naming = Arc::new(InMemoryNamingService::new());
        let network = InMemoryNetwork::new();
        let a = coordinator("AgentA", &naming, &network);
        let (listener, mut rx) = responder();
        a.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
        assert!(next(&mut rx).await.is_success());

        let panicking: ResponseListenerRef = Arc::new(|_: &CommunityResponse| panic!("listener failure"));
        a.modify_attributes(
            "Society",
            None,
            vec![AttributeModification::add_value("Domain", "logistics")],
            Some(panicking),
        )
        .unwrap();
        a.modify_attributes(
            "Society",
            None,
            vec![AttributeModification::add_value("Domain", "transport")],
            Some(listener),
        )
        .unwrap();

        let response = next(&mut rx).await;
        let attributes = response.community().unwrap().attributes();
        assert!(attributes.contains_value("Domain", "logistics"));
        assert!(attributes.contains_value("Domain", "transport"));
    }
}
