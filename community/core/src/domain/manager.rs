// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Community manager port.
//!
//! The manager owns the authoritative copy of a community. Whichever agent
//! first binds the community name in the naming service is its manager; the
//! coordinator hands requests to the co-located manager directly and relays
//! them to remote ones.

use super::community::Community;
use super::naming::NamingError;
use super::request::{CommunityRequest, CommunityResponse};
use async_trait::async_trait;

#[async_trait]
pub trait CommunityManager: Send + Sync {
    /// Try to become manager of `community`. Returns `false` when another agent
    /// already holds the binding.
    async fn manage_community(&self, community: Community) -> Result<bool, NamingError>;

    /// `true` if this agent currently manages `community`.
    fn is_manager(&self, community: &str) -> bool;

    /// Execute a request against a managed community.
    async fn process_request(&self, request: &CommunityRequest) -> CommunityResponse;
}

/// Authorization hook consulted by managers before applying a request.
pub trait AccessManager: Send + Sync {
    fn authorize(&self, request: &CommunityRequest) -> bool;
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessManager for AllowAll {
    fn authorize(&self, _request: &CommunityRequest) -> bool {
        true
    }
}
