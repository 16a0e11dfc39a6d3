// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared harness: several coordinators wired to one naming service and one
//! in-memory network.

#![allow(dead_code)]

use aegis_community_core::application::coordinator::{CommunityCoordinator, ResponseListenerRef};
use aegis_community_core::domain::config::CommunityServiceConfig;
use aegis_community_core::domain::repository::MembershipStore;
use aegis_community_core::domain::request::CommunityResponse;
use aegis_community_core::infrastructure::manager::DefaultCommunityManager;
use aegis_community_core::infrastructure::naming::InMemoryNamingService;
use aegis_community_core::infrastructure::network::InMemoryNetwork;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("aegis_community_core=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Short delays so the protocol settles within a test.
pub fn fast_config() -> CommunityServiceConfig {
    CommunityServiceConfig {
        verify_memberships: false,
        verify_memberships_interval: Duration::from_millis(500),
        find_manager_retry_delay: Duration::from_millis(50),
        create_retry_delay: Duration::from_millis(20),
        naming_wait: Duration::from_millis(100),
        request_timeout_ms: 2_000,
        ..Default::default()
    }
}

pub struct Node {
    pub coordinator: CommunityCoordinator,
    pub manager: Arc<DefaultCommunityManager>,
}

pub struct Cluster {
    pub naming: Arc<InMemoryNamingService>,
    pub network: Arc<InMemoryNetwork>,
}

impl Cluster {
    pub fn new() -> Self {
        init_tracing();
        Self { naming: Arc::new(InMemoryNamingService::new()), network: InMemoryNetwork::new() }
    }

    pub fn node(&self, agent: &str) -> Node {
        self.build(agent, fast_config(), None)
    }

    pub fn node_with_store(&self, agent: &str, store: Arc<dyn MembershipStore>) -> Node {
        self.build(agent, fast_config(), Some(store))
    }

    pub fn build(&self, agent: &str, config: CommunityServiceConfig, store: Option<Arc<dyn MembershipStore>>) -> Node {
        let transport = Arc::new(self.network.transport(agent));
        let manager = Arc::new(DefaultCommunityManager::new(agent, self.naming.clone(), transport.clone()));
        let mut builder = CommunityCoordinator::builder(agent)
            .config(config)
            .naming(self.naming.clone())
            .transport(transport)
            .manager(manager.clone());
        if let Some(store) = store {
            builder = builder.store(store);
        }
        let coordinator = builder.build().expect("coordinator");
        self.network.register(agent, &coordinator.inbound_handler());
        Node { coordinator, manager }
    }
}

/// Listener feeding every response into a channel.
pub fn responder() -> (ResponseListenerRef, mpsc::UnboundedReceiver<CommunityResponse>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: ResponseListenerRef = Arc::new(move |response: &CommunityResponse| {
        let _ = tx.send(response.clone());
    });
    (listener, rx)
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<CommunityResponse>) -> CommunityResponse {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no response within 5s")
        .expect("listener dropped")
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
