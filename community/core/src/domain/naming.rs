// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Naming Service Port
//!
//! Directory lookups resolving a community name to its manager agent. A
//! community `Society` is registered under the key `Society.comm` with record
//! type `community`; the address URI's path names the manager agent
//! (`agent:///AgentA`). Agent names are percent-encoded into a single path
//! segment, so `Agent 1` is stored as `agent:///Agent%201`.
//!
//! The directory is eventually consistent: a freshly bound entry may not be
//! visible to every reader yet. `bind` is atomic and the first binder wins,
//! which is the only manager-election mechanism the system has.

use async_trait::async_trait;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;
use url::Url;

/// Key suffix of community manager entries.
pub const COMMUNITY_SUFFIX: &str = ".comm";
/// Record type of community manager entries.
pub const COMMUNITY_RECORD_TYPE: &str = "community";
const AGENT_URI_SCHEME: &str = "agent";

/// Unreserved characters stay literal; everything else is escaped.
const AGENT_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("naming service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid address '{uri}': {reason}")]
    InvalidAddress { uri: String, reason: String },

    #[error("lookup timed out")]
    Timeout,
}

/// Directory key for `community`.
pub fn community_key(community: &str) -> String {
    format!("{}{}", community, COMMUNITY_SUFFIX)
}

/// A directory record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddressEntry {
    pub name: String,
    pub record_type: String,
    pub uri: String,
}

impl AddressEntry {
    /// Entry declaring `agent` the manager of `community`.
    pub fn community_manager(community: &str, agent: &str) -> Self {
        Self {
            name: community_key(community),
            record_type: COMMUNITY_RECORD_TYPE.to_string(),
            uri: format!("{}:///{}", AGENT_URI_SCHEME, utf8_percent_encode(agent, AGENT_SEGMENT)),
        }
    }

    /// Agent named by the URI path, without the leading `/`.
    pub fn agent_name(&self) -> Result<String, NamingError> {
        let invalid = |reason: &str| NamingError::InvalidAddress {
            uri: self.uri.clone(),
            reason: reason.to_string(),
        };
        let url = Url::parse(&self.uri).map_err(|e| invalid(&e.to_string()))?;
        let encoded = url.path().trim_start_matches('/');
        if encoded.is_empty() {
            return Err(invalid("empty path"));
        }
        let agent = percent_decode_str(encoded)
            .decode_utf8()
            .map_err(|e| invalid(&e.to_string()))?;
        Ok(agent.into_owned())
    }
}

#[async_trait]
pub trait NamingService: Send + Sync {
    /// Bind `entry` if its key is free. Returns `false` if another entry
    /// already holds the key.
    async fn bind(&self, entry: AddressEntry) -> Result<bool, NamingError>;

    /// Bind `entry`, replacing whatever holds the key.
    async fn rebind(&self, entry: AddressEntry) -> Result<(), NamingError>;

    /// Remove `entry` if it is the current binding for its key.
    async fn unbind(&self, entry: &AddressEntry) -> Result<bool, NamingError>;

    /// Keys ending in `suffix`.
    async fn list(&self, suffix: &str) -> Result<BTreeSet<String>, NamingError>;

    /// Current binding of `key` with `record_type`, `None` when not (yet) visible.
    async fn get(&self, key: &str, record_type: &str) -> Result<Option<AddressEntry>, NamingError>;
}
