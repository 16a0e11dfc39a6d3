// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Message Transport Port
//!
//! Agents exchange [`RelayPayload`]s. Delivery is asynchronous, at-least-once
//! and unordered; receivers must tolerate duplicates and reordering.
//!
//! - `publish` hands a payload to the local agent's own inbound queue.
//! - `send_relay` delivers a payload to a set of (possibly remote) agents.

use super::community::Community;
use super::request::{CommunityRequest, CorrelationId};
use async_trait::async_trait;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("agent '{0}' is not reachable")]
    Unreachable(String),

    #[error("transport closed")]
    Closed,
}

/// Everything that travels between agents.
#[derive(Debug, Clone)]
pub enum RelayPayload {
    /// A request for the manager of `request.community`.
    Request(CommunityRequest),
    /// The same envelope on its way back, response filled in.
    Response(CommunityRequest),
    /// Fresh snapshot pushed by a community manager.
    Descriptor(Community),
    /// The manager stopped managing the community.
    DescriptorRemoved(String),
    /// Ask the receiver which communities `member` belongs to.
    ParentQuery { member: String, correlation_id: CorrelationId },
    /// Answer to a [`RelayPayload::ParentQuery`].
    ParentAnswer {
        member: String,
        parents: BTreeSet<String>,
        correlation_id: CorrelationId,
    },
}

impl RelayPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            RelayPayload::Request(_) => "request",
            RelayPayload::Response(_) => "response",
            RelayPayload::Descriptor(_) => "descriptor",
            RelayPayload::DescriptorRemoved(_) => "descriptor_removed",
            RelayPayload::ParentQuery { .. } => "parent_query",
            RelayPayload::ParentAnswer { .. } => "parent_answer",
        }
    }
}

#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Queue `payload` for the local agent.
    async fn publish(&self, payload: RelayPayload) -> Result<(), TransportError>;

    /// Deliver `payload` from `source` to every agent in `targets`.
    async fn send_relay(
        &self,
        source: &str,
        targets: &BTreeSet<String>,
        payload: RelayPayload,
    ) -> Result<(), TransportError>;
}

/// Receiving side of the transport, implemented by the coordinator.
#[async_trait]
pub trait InboundHandler: Send + Sync {
    async fn deliver(&self, source: &str, payload: RelayPayload);
}
