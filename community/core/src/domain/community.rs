// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Community Domain Model
//!
//! - [`Entity`]: a community member, either an [`Agent`] or a nested [`Community`].
//! - [`Community`]: a named, attribute-tagged group of entities with a logical
//!   modification timestamp.
//!
//! # Invariants
//!
//! - `Community::last_update` strictly increases on every effective mutation and
//!   stays unchanged for no-ops. Caches rely on it to order snapshots.
//! - Entity names are immutable once constructed.
//! - Nested communities may in principle form cycles; every traversal keeps a
//!   visited set.

use super::attributes::{AttributeModification, Attributes};
use super::filter::{Filter, FilterParseError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute carrying the names of the communities a nested community belongs to.
pub const PARENT_ATTRIBUTE: &str = "Parent";
/// Attribute stamped by the manager on the community it manages.
pub const MANAGER_ATTRIBUTE: &str = "CommunityManager";
/// Attribute naming an entity's kind (`Agent` or `Community`).
pub const ENTITY_TYPE_ATTRIBUTE: &str = "EntityType";

/// Kind of a community member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Agent,
    Community,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Agent => f.write_str("Agent"),
            EntityType::Community => f.write_str("Community"),
        }
    }
}

/// Which member kinds a search returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchQualifier {
    AgentsOnly,
    CommunitiesOnly,
    #[default]
    AllEntities,
}

impl SearchQualifier {
    pub fn accepts(self, entity_type: EntityType) -> bool {
        match self {
            SearchQualifier::AgentsOnly => entity_type == EntityType::Agent,
            SearchQualifier::CommunitiesOnly => entity_type == EntityType::Community,
            SearchQualifier::AllEntities => true,
        }
    }
}

/// A leaf member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    name: String,
    pub attributes: Attributes,
}

impl Agent {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), attributes: Attributes::new() }
    }

    pub fn with_attributes(name: impl Into<String>, attributes: Attributes) -> Self {
        Self { name: name.into(), attributes }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A community member.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entity {
    Agent(Agent),
    Community(Community),
}

impl Entity {
    pub fn agent(name: impl Into<String>, attributes: Attributes) -> Self {
        Entity::Agent(Agent::with_attributes(name, attributes))
    }

    /// Build a member of the given kind. Nested communities are represented by
    /// an empty [`Community`] carrying the given attributes.
    pub fn of_type(entity_type: EntityType, name: impl Into<String>, attributes: Attributes) -> Self {
        match entity_type {
            EntityType::Agent => Entity::agent(name, attributes),
            EntityType::Community => Entity::Community(Community::with_attributes(name, attributes)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::Agent(agent) => agent.name(),
            Entity::Community(community) => community.name(),
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Entity::Agent(agent) => &agent.attributes,
            Entity::Community(community) => community.attributes(),
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        match self {
            Entity::Agent(agent) => &mut agent.attributes,
            Entity::Community(community) => &mut community.attributes,
        }
    }

    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Agent(_) => EntityType::Agent,
            Entity::Community(_) => EntityType::Community,
        }
    }

    pub fn as_community(&self) -> Option<&Community> {
        match self {
            Entity::Community(community) => Some(community),
            Entity::Agent(_) => None,
        }
    }
}

/// Members compare by name and attributes only.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name() && self.attributes() == other.attributes()
    }
}

impl Eq for Entity {}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) {}", self.entity_type(), self.name(), self.attributes())
    }
}

/// A named group of entities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Community {
    name: String,
    attributes: Attributes,
    entities: BTreeMap<String, Entity>,
    /// Epoch milliseconds of the last effective modification.
    last_update: i64,
}

impl Community {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_attributes(name, Attributes::new())
    }

    pub fn with_attributes(name: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            name: name.into(),
            attributes,
            entities: BTreeMap::new(),
            last_update: Utc::now().timestamp_millis(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    /// Overwrite the logical timestamp, e.g. when rehydrating a snapshot.
    pub fn set_last_update(&mut self, last_update: i64) {
        self.last_update = last_update;
    }

    /// Replace the community's own attributes.
    pub fn set_attributes(&mut self, attributes: Attributes) {
        if self.attributes != attributes {
            self.attributes = attributes;
            self.touch();
        }
    }

    /// Apply modifications to the community's own attributes.
    pub fn modify_attributes(&mut self, modifications: &[AttributeModification]) -> bool {
        let changed = self.attributes.apply(modifications);
        if changed {
            self.touch();
        }
        changed
    }

    /// Apply modifications to a member's attributes. Returns `false` when the
    /// member is unknown or nothing changed.
    pub fn modify_entity_attributes(&mut self, entity_name: &str, modifications: &[AttributeModification]) -> bool {
        let changed = self
            .entities
            .get_mut(entity_name)
            .is_some_and(|entity| entity.attributes_mut().apply(modifications));
        if changed {
            self.touch();
        }
        changed
    }

    /// Add or replace a member.
    pub fn add_entity(&mut self, entity: Entity) {
        if self.entities.get(entity.name()) == Some(&entity) {
            return;
        }
        self.entities.insert(entity.name().to_string(), entity);
        self.touch();
    }

    pub fn remove_entity(&mut self, name: &str) -> Option<Entity> {
        let removed = self.entities.remove(name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn has_entity(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_names(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Members matching `filter` and `qualifier`.
    pub fn search(&self, filter: &Filter, qualifier: SearchQualifier) -> Vec<Entity> {
        self.entities
            .values()
            .filter(|entity| qualifier.accepts(entity.entity_type()))
            .filter(|entity| filter.matches(entity.attributes()))
            .cloned()
            .collect()
    }

    /// Parse `filter` and search the members with it.
    pub fn search_str(&self, filter: &str, qualifier: SearchQualifier) -> Result<Vec<Entity>, FilterParseError> {
        let filter = Filter::parse(filter)?;
        Ok(self.search(&filter, qualifier))
    }

    /// Advance the timestamp, strictly past the previous value even when the
    /// wall clock has not moved.
    fn touch(&mut self) {
        self.last_update = Utc::now().timestamp_millis().max(self.last_update + 1);
    }
}

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Community({}) {} members={} last_update={}",
            self.name,
            self.attributes,
            self.entities.len(),
            self.last_update
        )
    }
}
