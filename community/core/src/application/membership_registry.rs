// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Membership Registry
//!
//! Shared, thread-safe wrapper around [`CommunityMemberships`] together with
//! the set of communities that have a membership operation in flight.
//!
//! The registry tracks whether it changed since it was last persisted; the
//! reconciler flushes it to the configured [`MembershipStore`] on its tick.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Local source of truth for membership self-healing

use crate::domain::community::Entity;
use crate::domain::memberships::CommunityMemberships;
use crate::domain::repository::{MembershipStore, RepositoryError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

#[derive(Default)]
pub struct MembershipRegistry {
    memberships: RwLock<CommunityMemberships>,
    dirty: AtomicBool,
}

impl MembershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, community: &str, entity: Entity) {
        let entity_name = entity.name().to_string();
        if self.memberships.write().add(community, entity) {
            self.dirty.store(true, Ordering::Release);
            debug!(community = %community, entity = %entity_name, "Membership recorded");
        }
    }

    pub fn remove_entity(&self, community: &str, entity_name: &str) {
        if self.memberships.write().remove_entity(community, entity_name) {
            self.dirty.store(true, Ordering::Release);
            debug!(community = %community, entity = %entity_name, "Membership removed");
        }
    }

    pub fn contains(&self, community: &str) -> bool {
        self.memberships.read().contains(community)
    }

    pub fn contains_entity(&self, community: &str, entity_name: &str) -> bool {
        self.memberships.read().contains_entity(community, entity_name)
    }

    pub fn entity(&self, community: &str, entity_name: &str) -> Option<Entity> {
        self.memberships.read().entity(community, entity_name).cloned()
    }

    pub fn communities(&self) -> BTreeSet<String> {
        self.memberships.read().communities().map(String::from).collect()
    }

    pub fn snapshot(&self) -> CommunityMemberships {
        self.memberships.read().clone()
    }

    /// Replace the whole registry, e.g. with a snapshot restored at startup.
    pub fn restore(&self, memberships: CommunityMemberships) {
        info!(communities = memberships.len(), "Membership registry restored");
        *self.memberships.write() = memberships;
        self.dirty.store(false, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Persist the registry if it changed since the last flush.
    pub async fn flush(&self, store: &dyn MembershipStore) -> Result<bool, RepositoryError> {
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        let snapshot = self.snapshot();
        if let Err(e) = store.save(&snapshot).await {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        debug!(communities = snapshot.len(), "Membership registry persisted");
        Ok(true)
    }
}

/// Communities with a join/leave (or corrective operation) in flight.
#[derive(Default)]
pub struct PendingOperations {
    communities: Mutex<BTreeSet<String>>,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `community` pending. Returns `false` if it already was.
    pub fn try_begin(&self, community: &str) -> bool {
        self.communities.lock().insert(community.to_string())
    }

    pub fn finish(&self, community: &str) {
        self.communities.lock().remove(community);
    }

    pub fn contains(&self, community: &str) -> bool {
        self.communities.lock().contains(community)
    }

    pub fn len(&self) -> usize {
        self.communities.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
