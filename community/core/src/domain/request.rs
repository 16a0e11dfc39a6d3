// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request / Response Envelope
//!
//! Everything a coordinator sends to a community manager travels as a
//! [`CommunityRequest`]. The manager fills in the [`CommunityResponse`] and the
//! envelope travels back to the requester, matched by [`CorrelationId`].
//!
//! Delivery is at-least-once, so a requester may see the same correlation id
//! twice; only the first response is acted upon.

use super::attributes::AttributeModification;
use super::community::{Community, Entity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Correlates a response with the request that caused it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Join,
    Leave,
    ModifyAttributes,
    GetDescriptor,
    List,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestKind::Join => "JOIN",
            RequestKind::Leave => "LEAVE",
            RequestKind::ModifyAttributes => "MODIFY_ATTRIBUTES",
            RequestKind::GetDescriptor => "GET_DESCRIPTOR",
            RequestKind::List => "LIST",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    #[default]
    Undefined,
    Success,
    Fail,
    Timeout,
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResponseStatus::Undefined => "UNDEFINED",
            ResponseStatus::Success => "SUCCESS",
            ResponseStatus::Fail => "FAIL",
            ResponseStatus::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// Payload of a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResponseContent {
    #[default]
    Empty,
    Community(Community),
    Entities(Vec<Entity>),
    Communities(Vec<Community>),
    Names(BTreeSet<String>),
}

/// Outcome of a community operation as seen by listeners.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub content: ResponseContent,
}

impl CommunityResponse {
    pub fn new(status: ResponseStatus, content: ResponseContent) -> Self {
        Self { status, content }
    }

    pub fn success(content: ResponseContent) -> Self {
        Self::new(ResponseStatus::Success, content)
    }

    pub fn fail() -> Self {
        Self::new(ResponseStatus::Fail, ResponseContent::Empty)
    }

    pub fn timeout() -> Self {
        Self::new(ResponseStatus::Timeout, ResponseContent::Empty)
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }

    /// The community carried by the response, if any.
    pub fn community(&self) -> Option<&Community> {
        match &self.content {
            ResponseContent::Community(community) => Some(community),
            _ => None,
        }
    }

    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match &self.content {
            ResponseContent::Names(names) => Some(names),
            _ => None,
        }
    }

    pub fn entities(&self) -> Option<&[Entity]> {
        match &self.content {
            ResponseContent::Entities(entities) => Some(entities),
            _ => None,
        }
    }
}

impl fmt::Display for CommunityResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.content {
            ResponseContent::Empty => write!(f, "{}", self.status),
            ResponseContent::Community(c) => write!(f, "{} community={}", self.status, c.name()),
            ResponseContent::Entities(e) => write!(f, "{} entities={}", self.status, e.len()),
            ResponseContent::Communities(c) => write!(f, "{} communities={}", self.status, c.len()),
            ResponseContent::Names(n) => write!(f, "{} names={}", self.status, n.len()),
        }
    }
}

/// A request to a community manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRequest {
    pub source: String,
    pub target: String,
    pub community: String,
    pub kind: RequestKind,
    pub entity: Option<Entity>,
    #[serde(default)]
    pub modifications: Vec<AttributeModification>,
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub response: CommunityResponse,
}

impl CommunityRequest {
    pub fn new(source: impl Into<String>, community: impl Into<String>, kind: RequestKind) -> Self {
        Self {
            source: source.into(),
            target: String::new(),
            community: community.into(),
            kind,
            entity: None,
            modifications: Vec::new(),
            correlation_id: CorrelationId::new(),
            response: CommunityResponse::default(),
        }
    }

    pub fn with_entity(mut self, entity: Option<Entity>) -> Self {
        self.entity = entity;
        self
    }

    pub fn with_modifications(mut self, modifications: Vec<AttributeModification>) -> Self {
        self.modifications = modifications;
        self
    }

    /// Name of the entity the request is about, if any.
    pub fn entity_name(&self) -> Option<&str> {
        self.entity.as_ref().map(Entity::name)
    }
}

impl fmt::Display for CommunityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} community={} source={} target={} entity={} id={}",
            self.kind,
            self.community,
            self.source,
            self.target,
            self.entity_name().unwrap_or("-"),
            self.correlation_id
        )
    }
}

/// How long an operation may wait for a community manager.
///
/// Configuration and callers express this in milliseconds: negative waits
/// forever, zero makes exactly one attempt, positive bounds the wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestTimeout {
    Forever,
    SingleAttempt,
    After(Duration),
}

impl RequestTimeout {
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            m if m < 0 => RequestTimeout::Forever,
            0 => RequestTimeout::SingleAttempt,
            m => RequestTimeout::After(Duration::from_millis(m.unsigned_abs())),
        }
    }

    /// Absolute deadline for an operation starting now.
    pub fn deadline(self) -> Deadline {
        match self {
            RequestTimeout::Forever => Deadline::Never,
            RequestTimeout::SingleAttempt => Deadline::SingleAttempt,
            RequestTimeout::After(duration) => Deadline::At(Instant::now() + duration),
        }
    }
}

impl From<i64> for RequestTimeout {
    fn from(millis: i64) -> Self {
        Self::from_millis(millis)
    }
}

/// Absolute form of a [`RequestTimeout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    Never,
    SingleAttempt,
    At(Instant),
}

impl Deadline {
    /// `true` once no further attempt may be made.
    pub fn is_expired(&self) -> bool {
        match self {
            Deadline::Never => false,
            Deadline::SingleAttempt => true,
            Deadline::At(at) => Instant::now() >= *at,
        }
    }

    /// Time left, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Deadline::Never => None,
            Deadline::SingleAttempt => Some(Duration::ZERO),
            Deadline::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_from_millis() {
        assert_eq!(RequestTimeout::from_millis(-1), RequestTimeout::Forever);
        assert_eq!(RequestTimeout::from_millis(0), RequestTimeout::SingleAttempt);
        assert_eq!(
            RequestTimeout::from_millis(2500),
            RequestTimeout::After(Duration::from_millis(2500))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry() {
        assert!(!RequestTimeout::Forever.deadline().is_expired());
        assert!(RequestTimeout::SingleAttempt.deadline().is_expired());

        let deadline = RequestTimeout::After(Duration::from_secs(5)).deadline();
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn test_response_accessors() {
        let response = CommunityResponse::success(ResponseContent::Community(Community::new("Society")));
        assert!(response.is_success());
        assert_eq!(response.community().map(Community::name), Some("Society"));
        assert!(response.names().is_none());

        let fail = CommunityResponse::fail();
        assert_eq!(fail.status, ResponseStatus::Fail);
        assert!(fail.community().is_none());
        assert_eq!(fail.to_string(), "FAIL");
    }
}
