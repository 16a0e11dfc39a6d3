// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Community change events emitted by the cache when it accepts a new snapshot.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Event vocabulary for community change listeners

use super::community::Community;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    AddCommunity,
    RemoveCommunity,
    CommunityAttributesChanged,
    AddEntity,
    RemoveEntity,
    EntityAttributesChanged,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::AddCommunity => "ADD_COMMUNITY",
            ChangeType::RemoveCommunity => "REMOVE_COMMUNITY",
            ChangeType::CommunityAttributesChanged => "COMMUNITY_ATTRIBUTES_CHANGED",
            ChangeType::AddEntity => "ADD_ENTITY",
            ChangeType::RemoveEntity => "REMOVE_ENTITY",
            ChangeType::EntityAttributesChanged => "ENTITY_ATTRIBUTES_CHANGED",
        };
        f.write_str(name)
    }
}

/// One observed change to a cached community.
#[derive(Debug, Clone)]
pub struct CommunityChangeEvent {
    /// Snapshot of the community after the change.
    pub community: Arc<Community>,
    pub change_type: ChangeType,
    /// Name of the changed entity, or of the community itself.
    pub what_changed: String,
}

impl CommunityChangeEvent {
    pub fn new(community: Arc<Community>, change_type: ChangeType, what_changed: impl Into<String>) -> Self {
        Self { community, change_type, what_changed: what_changed.into() }
    }

    pub fn community_name(&self) -> &str {
        self.community.name()
    }
}

impl fmt::Display for CommunityChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} community={} what={}", self.change_type, self.community_name(), self.what_changed)
    }
}
