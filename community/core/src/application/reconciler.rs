// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Membership Reconciler
//!
//! Periodically compares the local [`MembershipRegistry`] with the state held
//! by community managers and repairs drift, typically after a restart of this
//! agent or a manager failover.
//!
//! Each tick:
//!
//! 1. Every registry community in which this agent is recorded, and which has
//!    no operation in flight, is checked against the authoritative copy: a
//!    missing manager, a missing community or a missing membership triggers a
//!    rejoin; differing attributes trigger an attribute correction (additions
//!    and replacements only, extra remote attributes are left alone).
//! 2. Parent communities that list this agent but are absent from the registry
//!    are adopted into it and checked the same way.
//! 3. Rejoins claim the community in the pending set first, so a concurrent
//!    tick never issues a second one. The claim is released when the join
//!    completes, whatever its outcome; a `TIMEOUT` is simply retried next tick.
//! 4. The registry is persisted if it changed.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Self-healing of community memberships

use super::membership_registry::{MembershipRegistry, PendingOperations};
use crate::domain::attributes::AttributeModification;
use crate::domain::community::{Community, Entity};
use crate::domain::repository::MembershipStore;
use crate::domain::request::ResponseStatus;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// What the reconciler needs from the coordinator.
#[async_trait]
pub trait MembershipAuthority: Send + Sync {
    fn agent_name(&self) -> &str;

    /// Manager of `community`, from a single naming lookup.
    async fn locate_manager(&self, community: &str) -> Option<String>;

    /// Authoritative copy of `community` as held by its manager.
    async fn fetch_community(&self, community: &str) -> Option<Community>;

    /// Communities currently listing this agent, according to the cache.
    fn parent_communities(&self) -> BTreeSet<String>;

    /// Join `community` again as `entity`, completing when the join does.
    async fn rejoin(&self, community: &str, entity: Entity) -> ResponseStatus;

    /// Apply attribute corrections to `entity` in `community`.
    async fn correct_attributes(
        &self,
        community: &str,
        entity: &str,
        modifications: Vec<AttributeModification>,
    ) -> ResponseStatus;
}

pub struct MembershipReconciler {
    authority: Arc<dyn MembershipAuthority>,
    registry: Arc<MembershipRegistry>,
    pending: Arc<PendingOperations>,
    store: Option<Arc<dyn MembershipStore>>,
}

impl MembershipReconciler {
    pub fn new(
        authority: Arc<dyn MembershipAuthority>,
        registry: Arc<MembershipRegistry>,
        pending: Arc<PendingOperations>,
        store: Option<Arc<dyn MembershipStore>>,
    ) -> Self {
        Self { authority, registry, pending, store }
    }

    /// Run [`validate`](Self::validate) every `period`, starting one period
    /// from now.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(agent = %self.authority.agent_name(), period_ms = period.as_millis() as u64, "Membership reconciler started");
            loop {
                ticker.tick().await;
                self.validate().await;
            }
        })
    }

    /// One reconciliation pass.
    pub async fn validate(&self) {
        let agent = self.authority.agent_name().to_string();
        debug!(agent = %agent, communities = self.registry.communities().len(), "Validating community memberships");

        for community in self.registry.communities() {
            if self.pending.contains(&community) {
                continue;
            }
            if let Some(recorded) = self.registry.entity(&community, &agent) {
                self.check(&community, recorded).await;
            }
        }

        for parent in self.authority.parent_communities() {
            if self.registry.contains(&parent) || self.pending.contains(&parent) {
                continue;
            }
            let Some(authoritative) = self.authority.fetch_community(&parent).await else {
                continue;
            };
            if let Some(entity) = authoritative.entity(&agent).cloned() {
                info!(community = %parent, agent = %agent, "Adopting externally joined community");
                self.registry.add(&parent, entity.clone());
                self.check(&parent, entity).await;
            }
        }

        if let Some(store) = &self.store {
            if let Err(e) = self.registry.flush(store.as_ref()).await {
                warn!(error = %e, "Failed to persist community memberships");
            }
        }
    }

    async fn check(&self, community: &str, recorded: Entity) {
        let authoritative = match self.authority.locate_manager(community).await {
            Some(_) => self.authority.fetch_community(community).await,
            None => None,
        };
        let current = authoritative.as_ref().and_then(|c| c.entity(recorded.name()));

        match current {
            None => self.rejoin(community, recorded),
            Some(current) => {
                let delta = current.attributes().delta_to(recorded.attributes());
                if delta.is_empty() {
                    return;
                }
                info!(
                    community = %community,
                    entity = %recorded.name(),
                    corrections = delta.len(),
                    remote = %current.attributes(),
                    local = %recorded.attributes(),
                    "Correcting member attributes"
                );
                metrics::counter!("community_attribute_corrections_total").increment(1);
                let status = self.authority.correct_attributes(community, recorded.name(), delta).await;
                if status != ResponseStatus::Success {
                    debug!(community = %community, %status, "Attribute correction not applied; retrying next tick");
                }
            }
        }
    }

    fn rejoin(&self, community: &str, entity: Entity) {
        if !self.pending.try_begin(community) {
            return;
        }
        info!(community = %community, entity = %entity.name(), "Re-joining community");
        metrics::counter!("community_rejoins_total").increment(1);

        let authority = self.authority.clone();
        let pending = self.pending.clone();
        let community = community.to_string();
        tokio::spawn(async move {
            let status = authority.rejoin(&community, entity).await;
            pending.finish(&community);
            debug!(community = %community, %status, "Re-join finished");
        });
    }
}
