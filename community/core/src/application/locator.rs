// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Manager Locator
//!
//! Resolves a community name to the agent managing it. Lookups that come back
//! empty are retried on a fixed back-off through the coordinator's
//! [`DelayQueue`] until the caller's deadline passes.

use super::delay_queue::DelayQueue;
use crate::domain::naming::{community_key, NamingService, COMMUNITY_RECORD_TYPE};
use crate::domain::request::Deadline;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub struct ManagerLocator {
    naming: Arc<dyn NamingService>,
    queue: Arc<DelayQueue>,
    retry_delay: Duration,
    naming_wait: Duration,
}

impl ManagerLocator {
    pub fn new(
        naming: Arc<dyn NamingService>,
        queue: Arc<DelayQueue>,
        retry_delay: Duration,
        naming_wait: Duration,
    ) -> Self {
        Self { naming, queue, retry_delay, naming_wait }
    }

    /// Name of the manager of `community`, or `None` once `deadline` allows no
    /// further attempt.
    pub async fn find_manager(&self, community: &str, deadline: Deadline) -> Option<String> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if let Some(manager) = self.lookup(community).await {
                debug!(community = %community, manager = %manager, attempts, "Community manager found");
                return Some(manager);
            }
            if deadline.is_expired() {
                debug!(community = %community, attempts, "Community manager not found");
                return None;
            }
            self.queue.wait(self.retry_delay, "find_manager_retry").await;
        }
    }

    /// One naming lookup, bounded by the configured wait.
    async fn lookup(&self, community: &str) -> Option<String> {
        let key = community_key(community);
        let entry = match tokio::time::timeout(self.naming_wait, self.naming.get(&key, COMMUNITY_RECORD_TYPE)).await {
            Ok(Ok(entry)) => entry?,
            Ok(Err(e)) => {
                warn!(community = %community, error = %e, "Naming lookup failed");
                return None;
            }
            Err(_) => {
                debug!(community = %community, "Naming lookup timed out");
                return None;
            }
        };
        match entry.agent_name() {
            Ok(agent) => Some(agent),
            Err(e) => {
                warn!(community = %community, error = %e, "Unusable community manager address");
                None
            }
        }
    }
}
