// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-Memory Network
//!
//! Connects the coordinators of several agents living in one process. Each
//! agent registers its [`InboundHandler`] and obtains an [`InMemoryTransport`].
//! Every delivery runs on its own spawned task, so payloads arrive
//! asynchronously and in no guaranteed order, like on the real substrate.
//!
//! Agents can be partitioned: payloads to or from a partitioned agent are
//! silently dropped, which is how tests make a manager unreachable.

use crate::domain::transport::{InboundHandler, MessageTransport, RelayPayload, TransportError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

#[derive(Default)]
pub struct InMemoryNetwork {
    endpoints: RwLock<HashMap<String, Weak<dyn InboundHandler>>>,
    partitioned: RwLock<HashSet<String>>,
    relayed: AtomicU64,
}

impl InMemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Route payloads addressed to `agent` to `handler`. The network only keeps
    /// a weak reference; dropping the handler unregisters it implicitly.
    pub fn register(&self, agent: &str, handler: &Arc<dyn InboundHandler>) {
        debug!(agent = %agent, "Endpoint registered");
        self.endpoints.write().insert(agent.to_string(), Arc::downgrade(handler));
    }

    pub fn deregister(&self, agent: &str) {
        self.endpoints.write().remove(agent);
    }

    pub fn set_partitioned(&self, agent: &str, partitioned: bool) {
        let mut set = self.partitioned.write();
        if partitioned {
            set.insert(agent.to_string());
        } else {
            set.remove(agent);
        }
    }

    /// Transport bound to `agent`.
    pub fn transport(self: &Arc<Self>, agent: &str) -> InMemoryTransport {
        InMemoryTransport { network: self.clone(), agent: agent.to_string() }
    }

    /// Number of payloads handed to `send_relay` so far.
    pub fn relayed_count(&self) -> u64 {
        self.relayed.load(Ordering::Acquire)
    }

    fn is_partitioned(&self, agent: &str) -> bool {
        self.partitioned.read().contains(agent)
    }

    fn deliver(&self, source: &str, target: &str, payload: RelayPayload) -> Result<(), TransportError> {
        if self.is_partitioned(source) || self.is_partitioned(target) {
            trace!(source = %source, target = %target, kind = payload.kind(), "Payload dropped by partition");
            return Ok(());
        }
        let handler = self
            .endpoints
            .read()
            .get(target)
            .and_then(Weak::upgrade)
            .ok_or_else(|| TransportError::Unreachable(target.to_string()))?;
        trace!(source = %source, target = %target, kind = payload.kind(), "Delivering payload");
        let source = source.to_string();
        tokio::spawn(async move {
            handler.deliver(&source, payload).await;
        });
        Ok(())
    }
}

pub struct InMemoryTransport {
    network: Arc<InMemoryNetwork>,
    agent: String,
}

impl InMemoryTransport {
    pub fn agent(&self) -> &str {
        &self.agent
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn publish(&self, payload: RelayPayload) -> Result<(), TransportError> {
        self.network.deliver(&self.agent, &self.agent, payload)
    }

    async fn send_relay(
        &self,
        source: &str,
        targets: &BTreeSet<String>,
        payload: RelayPayload,
    ) -> Result<(), TransportError> {
        self.network.relayed.fetch_add(1, Ordering::AcqRel);
        let mut first_error = None;
        for target in targets {
            if let Err(e) = self.network.deliver(source, target, payload.clone()) {
                debug!(source = %source, target = %target, error = %e, "Relay delivery failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
