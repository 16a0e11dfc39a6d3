// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Membership Stores
//!
//! [`MembershipStore`] implementations:
//!
//! - [`InMemoryMembershipStore`]: keeps the last snapshot in memory; survives a
//!   coordinator restart within one process.
//! - [`FileMembershipStore`]: one JSON document on disk. Writes go to a sibling
//!   temporary file that is then renamed over the target, so a crash never
//!   leaves a half-written registry behind.

use crate::domain::memberships::CommunityMemberships;
use crate::domain::repository::{MembershipStore, RepositoryError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Default)]
pub struct InMemoryMembershipStore {
    snapshot: RwLock<Option<CommunityMemberships>>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn save(&self, memberships: &CommunityMemberships) -> Result<(), RepositoryError> {
        *self.snapshot.write() = Some(memberships.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<CommunityMemberships>, RepositoryError> {
        Ok(self.snapshot.read().clone())
    }
}

pub struct FileMembershipStore {
    path: PathBuf,
}

impl FileMembershipStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl MembershipStore for FileMembershipStore {
    async fn save(&self, memberships: &CommunityMemberships) -> Result<(), RepositoryError> {
        let json = serde_json::to_vec_pretty(memberships)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &json).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!(path = %self.path.display(), bytes = json.len(), "Membership snapshot written");
        Ok(())
    }

    async fn load(&self) -> Result<Option<CommunityMemberships>, RepositoryError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::attributes::Attributes;
    use crate::domain::community::Entity;

    fn sample() -> CommunityMemberships {
        let mut memberships = CommunityMemberships::new();
        memberships.add("Society", Entity::agent("AgentA", Attributes::new().with("Role", "Member")));
        memberships
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryMembershipStore::new();
        assert!(store.load().await.unwrap().is_none());
        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample()));
    }

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("memberships.json");

        let store = FileMembershipStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
        store.save(&sample()).await.unwrap();
        assert!(!store.temp_path().exists());

        let reopened = FileMembershipStore::new(&path);
        let loaded = reopened.load().await.unwrap().unwrap();
        let entity = loaded.entity("Society", "AgentA").unwrap();
        assert!(entity.attributes().contains_value("Role", "Member"));
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memberships.json");
        std::fs::write(&path, b"{not json").unwrap();

        let result = FileMembershipStore::new(&path).load().await;
        assert!(matches!(result, Err(RepositoryError::Serialization(_))));
    }
}
