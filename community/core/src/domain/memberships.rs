// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Community Memberships
//!
//! The local record of which communities this agent believes it (or an entity
//! it joined on behalf of) belongs to, and with which attributes. It is the
//! reference the membership reconciler heals the authoritative state toward,
//! and is persisted so that it survives restarts.

use super::community::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `community name → (entity name → entity)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityMemberships {
    communities: BTreeMap<String, BTreeMap<String, Entity>>,
}

impl CommunityMemberships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `entity` as a member of `community`, replacing a previous record
    /// with the same name. Returns `true` when the record changed.
    pub fn add(&mut self, community: &str, entity: Entity) -> bool {
        let entities = self.communities.entry(community.to_string()).or_default();
        if entities.get(entity.name()) == Some(&entity) {
            return false;
        }
        entities.insert(entity.name().to_string(), entity);
        true
    }

    /// Drop one entity record; a community left without records is dropped too.
    pub fn remove_entity(&mut self, community: &str, entity_name: &str) -> bool {
        let Some(entities) = self.communities.get_mut(community) else {
            return false;
        };
        let removed = entities.remove(entity_name).is_some();
        if entities.is_empty() {
            self.communities.remove(community);
        }
        removed
    }

    pub fn remove_community(&mut self, community: &str) -> bool {
        self.communities.remove(community).is_some()
    }

    pub fn contains(&self, community: &str) -> bool {
        self.communities.contains_key(community)
    }

    pub fn contains_entity(&self, community: &str, entity_name: &str) -> bool {
        self.communities
            .get(community)
            .is_some_and(|entities| entities.contains_key(entity_name))
    }

    pub fn entity(&self, community: &str, entity_name: &str) -> Option<&Entity> {
        self.communities.get(community).and_then(|entities| entities.get(entity_name))
    }

    pub fn entities(&self, community: &str) -> impl Iterator<Item = &Entity> {
        self.communities.get(community).into_iter().flat_map(|entities| entities.values())
    }

    pub fn communities(&self) -> impl Iterator<Item = &str> {
        self.communities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.communities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.communities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attributes::Attributes;

    fn agent(name: &str) -> Entity {
        Entity::agent(name, Attributes::new().with("Role", "Member"))
    }

    #[test]
    fn test_add_and_remove() {
        let mut memberships = CommunityMemberships::new();
        assert!(memberships.add("Society", agent("AgentA")));
        assert!(!memberships.add("Society", agent("AgentA")));
        assert!(memberships.add("Society", agent("AgentB")));

        assert!(memberships.contains_entity("Society", "AgentA"));
        assert_eq!(memberships.entities("Society").count(), 2);

        assert!(memberships.remove_entity("Society", "AgentA"));
        assert!(memberships.contains("Society"));
        assert!(memberships.remove_entity("Society", "AgentB"));
        assert!(!memberships.contains("Society"), "last entity removal drops the community");
        assert!(!memberships.remove_entity("Society", "AgentB"));
    }

    #[test]
    fn test_serialized_form_round_trips() {
        let mut memberships = CommunityMemberships::new();
        memberships.add("Society", agent("AgentA"));
        memberships.add("Logistics", agent("AgentA"));

        let json = serde_json::to_string_pretty(&memberships).unwrap();
        let restored: CommunityMemberships = serde_json::from_str(&json).unwrap();

        assert_eq!(restored, memberships);
        assert_eq!(restored.communities().collect::<Vec<_>>(), vec!["Logistics", "Society"]);
    }
}
