// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Default Community Manager
//!
//! In-process [`CommunityManager`] holding the authoritative copy of every
//! community this agent manages.
//!
//! ## Ownership
//! - Manager status is claimed with an atomic `bind` of `<community>.comm` in
//!   the naming service; the first binder wins and there is no election.
//! - The manager stamps its name into the community's `CommunityManager`
//!   attribute.
//!
//! ## Distribution
//! Each community has a set of distribution targets: its members plus every
//! agent that asked for its descriptor. After each effective change the new
//! snapshot is relayed to all targets and published to the local agent.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Reference manager for single-process and test deployments

use crate::domain::community::{Community, MANAGER_ATTRIBUTE};
use crate::domain::manager::{AccessManager, AllowAll, CommunityManager};
use crate::domain::naming::{AddressEntry, NamingError, NamingService};
use crate::domain::request::{CommunityRequest, CommunityResponse, RequestKind, ResponseContent};
use crate::domain::transport::{MessageTransport, RelayPayload};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DefaultCommunityManager {
    agent_name: String,
    naming: Arc<dyn NamingService>,
    transport: Arc<dyn MessageTransport>,
    access: Arc<dyn AccessManager>,
    communities: Mutex<HashMap<String, Community>>,
    targets: Mutex<HashMap<String, BTreeSet<String>>>,
}

impl DefaultCommunityManager {
    pub fn new(
        agent_name: impl Into<String>,
        naming: Arc<dyn NamingService>,
        transport: Arc<dyn MessageTransport>,
    ) -> Self {
        Self::with_access_manager(agent_name, naming, transport, Arc::new(AllowAll))
    }

    pub fn with_access_manager(
        agent_name: impl Into<String>,
        naming: Arc<dyn NamingService>,
        transport: Arc<dyn MessageTransport>,
        access: Arc<dyn AccessManager>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            naming,
            transport,
            access,
            communities: Mutex::new(HashMap::new()),
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Current authoritative copy of a managed community.
    pub fn community(&self, name: &str) -> Option<Community> {
        self.communities.lock().get(name).cloned()
    }

    /// Give up management of `name`: unbind it and tell every target.
    pub async fn release_community(&self, name: &str) -> Result<bool, NamingError> {
        if self.communities.lock().remove(name).is_none() {
            return Ok(false);
        }
        let targets = self.targets.lock().remove(name).unwrap_or_default();
        self.naming
            .unbind(&AddressEntry::community_manager(name, &self.agent_name))
            .await?;
        info!(community = %name, "Released community management");
        self.send(targets, RelayPayload::DescriptorRemoved(name.to_string())).await;
        Ok(true)
    }

    fn add_targets(&self, community: &str, targets: impl IntoIterator<Item = String>) {
        self.targets.lock().entry(community.to_string()).or_default().extend(targets);
    }

    /// Push the current snapshot of `community` to every distribution target.
    async fn distribute(&self, community: &str) {
        let Some(snapshot) = self.community(community) else {
            return;
        };
        let targets = self.targets.lock().get(community).cloned().unwrap_or_default();
        debug!(community = %community, targets = targets.len(), "Distributing community update");
        self.send(targets, RelayPayload::Descriptor(snapshot)).await;
    }

    async fn send(&self, mut targets: BTreeSet<String>, payload: RelayPayload) {
        targets.remove(&self.agent_name);
        if let Err(e) = self.transport.publish(payload.clone()).await {
            warn!(error = %e, kind = payload.kind(), "Local publish failed");
        }
        if targets.is_empty() {
            return;
        }
        if let Err(e) = self.transport.send_relay(&self.agent_name, &targets, payload).await {
            warn!(error = %e, "Community update relay failed");
        }
    }

    /// Apply `request` to the managed copy. Returns the response and whether the
    /// community changed.
    fn apply(&self, request: &CommunityRequest) -> (CommunityResponse, bool) {
        let mut communities = self.communities.lock();
        let Some(community) = communities.get_mut(&request.community) else {
            debug!(community = %request.community, source = %request.source, "Not community manager");
            return (CommunityResponse::timeout(), false);
        };
        let before = community.last_update();

        let ok = match (request.kind, &request.entity) {
            (RequestKind::Join, Some(entity)) => {
                community.add_entity(entity.clone());
                debug!(
                    community = %request.community,
                    entity = %entity.name(),
                    members = community.len(),
                    "Entity added"
                );
                true
            }
            (RequestKind::Leave, Some(entity)) if community.has_entity(entity.name()) => {
                community.remove_entity(entity.name());
                debug!(
                    community = %request.community,
                    entity = %entity.name(),
                    members = community.len(),
                    "Entity removed"
                );
                true
            }
            (RequestKind::Join | RequestKind::Leave, _) => false,
            (RequestKind::ModifyAttributes, entity) => {
                match entity.as_ref().map(|e| e.name()).filter(|name| *name != community.name()) {
                    None => {
                        community.modify_attributes(&request.modifications);
                        true
                    }
                    Some(name) if community.has_entity(name) => {
                        community.modify_entity_attributes(name, &request.modifications);
                        true
                    }
                    Some(name) => {
                        debug!(community = %request.community, entity = %name, "Cannot modify a non-member");
                        false
                    }
                }
            }
            (RequestKind::GetDescriptor, _) => true,
            (RequestKind::List, _) => {
                let names = community.entity_names().map(String::from).collect();
                return (CommunityResponse::success(ResponseContent::Names(names)), false);
            }
        };

        let changed = community.last_update() != before;
        let response = if ok {
            CommunityResponse::success(ResponseContent::Community(community.clone()))
        } else {
            CommunityResponse::fail()
        };
        (response, changed)
    }
}

#[async_trait]
impl CommunityManager for DefaultCommunityManager {
    async fn manage_community(&self, mut community: Community) -> Result<bool, NamingError> {
        let name = community.name().to_string();
        if self.is_manager(&name) {
            return Ok(true);
        }
        let bound = self
            .naming
            .bind(AddressEntry::community_manager(&name, &self.agent_name))
            .await?;
        if !bound {
            debug!(community = %name, "Community already has a manager");
            return Ok(false);
        }

        let mut attributes = community.attributes().clone();
        attributes.set(MANAGER_ATTRIBUTE, BTreeSet::from([self.agent_name.clone()]));
        community.set_attributes(attributes);
        let members: Vec<String> = community.entity_names().map(String::from).collect();
        self.communities.lock().insert(name.clone(), community);
        self.add_targets(&name, members);

        info!(community = %name, "Now managing community");
        self.distribute(&name).await;
        Ok(true)
    }

    fn is_manager(&self, community: &str) -> bool {
        self.communities.lock().contains_key(community)
    }

    async fn process_request(&self, request: &CommunityRequest) -> CommunityResponse {
        debug!(request = %request, "Processing community request");
        if !self.access.authorize(request) {
            warn!(
                community = %request.community,
                source = %request.source,
                kind = %request.kind,
                "Authorization failure"
            );
            return CommunityResponse::fail();
        }

        let (response, changed) = self.apply(request);
        if response.is_success() && matches!(request.kind, RequestKind::Join | RequestKind::GetDescriptor) {
            self.add_targets(&request.community, [request.source.clone()]);
        }
        if changed {
            self.distribute(&request.community).await;
        }
        response
    }
}
