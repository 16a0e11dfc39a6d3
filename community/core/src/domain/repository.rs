// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Membership Persistence Contract
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `MembershipStore` | `CommunityMemberships` | `InMemoryMembershipStore`, `FileMembershipStore` |
//!
//! The registry is written as a whole snapshot; it is small and changes rarely.

use super::memberships::CommunityMemberships;
use async_trait::async_trait;
use thiserror::Error;

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Persist the full registry snapshot.
    async fn save(&self, memberships: &CommunityMemberships) -> Result<(), RepositoryError>;

    /// Last saved snapshot, `None` if nothing was ever saved.
    async fn load(&self) -> Result<Option<CommunityMemberships>, RepositoryError>;
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
