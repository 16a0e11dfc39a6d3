// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Integration tests for the community protocol between several agents
//!
//! Every agent runs its own coordinator and manager; they share one naming
//! service and talk over the in-memory relay network.

mod common;

use aegis_community_core::application::coordinator::{JoinRequest, Resolution};
use aegis_community_core::domain::attributes::{AttributeModification, Attributes};
use aegis_community_core::domain::community::{EntityType, SearchQualifier, PARENT_ATTRIBUTE};
use aegis_community_core::domain::manager::CommunityManager;
use aegis_community_core::domain::request::{RequestTimeout, ResponseStatus};
use aegis_community_core::infrastructure::membership_store::FileMembershipStore;
use common::{eventually, next, responder, Cluster};
use std::collections::BTreeSet;
use std::sync::Arc;

#[tokio::test]
async fn test_remote_join_reaches_every_member_cache() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();

    a.coordinator
        .create_community("Society", Attributes::new().with("Domain", "logistics"), Some(listener.clone()))
        .unwrap();
    assert!(next(&mut rx).await.is_success());

    b.coordinator
        .join_community(
            JoinRequest::new("Society").entity_attributes(Attributes::new().with("Role", "Member")),
            Some(listener),
        )
        .unwrap();
    let response = next(&mut rx).await;
    assert!(response.is_success());
    assert!(response.community().unwrap().has_entity("AgentB"));
    assert!(b.coordinator.memberships().contains_entity("Society", "AgentB"));

    eventually("manager cache to list AgentB", || async {
        a.coordinator
            .cache()
            .get("Society")
            .is_some_and(|c| c.has_entity("AgentB"))
    })
    .await;

    let found = b
        .coordinator
        .search_community(Some("Society"), "(Role=Member)", false, SearchQualifier::AgentsOnly, None)
        .unwrap()
        .resolved()
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name(), "AgentB");
}

#[tokio::test]
async fn test_concurrent_creators_elect_one_manager() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener_a, mut rx_a) = responder();
    let (listener_b, mut rx_b) = responder();

    a.coordinator
        .create_community("Society", Attributes::new(), Some(listener_a))
        .unwrap();
    b.coordinator
        .create_community("Society", Attributes::new(), Some(listener_b))
        .unwrap();
    let (first, second) = futures::future::join(next(&mut rx_a), next(&mut rx_b)).await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert!(a.manager.is_manager("Society") ^ b.manager.is_manager("Society"));

    let manager = if a.manager.is_manager("Society") { &a.manager } else { &b.manager };
    eventually("both agents to be members", || async {
        manager
            .community("Society")
            .is_some_and(|c| c.has_entity("AgentA") && c.has_entity("AgentB"))
    })
    .await;
}

#[tokio::test]
async fn test_leave_and_list() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();

    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator.join_community(JoinRequest::new("Society"), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());

    a.coordinator.list_all_communities(listener.clone());
    let names = next(&mut rx).await;
    assert_eq!(names.names(), Some(&BTreeSet::from(["Society".to_string()])));

    b.coordinator
        .leave_community("Society", None, RequestTimeout::from_millis(2_000), Some(listener.clone()))
        .unwrap();
    let left = next(&mut rx).await;
    assert!(left.is_success());
    assert!(!left.community().unwrap().has_entity("AgentB"));
    assert!(!b.coordinator.memberships().contains("Society"));

    // A second leave is answered from the cache.
    let relayed = cluster.network.relayed_count();
    b.coordinator
        .leave_community("Society", None, RequestTimeout::Forever, Some(listener))
        .unwrap();
    assert_eq!(next(&mut rx).await.status, ResponseStatus::Fail);
    assert_eq!(cluster.network.relayed_count(), relayed);
}

#[tokio::test]
async fn test_nested_community_join_sets_parent_attribute() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();

    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator
        .join_community(
            JoinRequest::new("Team")
                .entity_attributes(Attributes::new().with("Role", "Member"))
                .create_if_not_found(Attributes::new()),
            Some(listener.clone()),
        )
        .unwrap();
    assert!(next(&mut rx).await.is_success());

    b.coordinator
        .join_community(JoinRequest::new("Society").nested_community("Team"), Some(listener.clone()))
        .unwrap();
    let response = next(&mut rx).await;
    assert!(response.is_success());
    let society = response.community().unwrap();
    assert_eq!(society.entity("Team").unwrap().entity_type(), EntityType::Community);

    let team = b.manager.community("Team").unwrap();
    assert!(team.attributes().contains_value(PARENT_ATTRIBUTE, "Society"));

    // Recursive search walks into the nested community.
    let found = b
        .coordinator
        .search_community(Some("Society"), "(Role=Member)", true, SearchQualifier::AgentsOnly, None)
        .unwrap()
        .resolved()
        .unwrap_or_default();
    let names: Vec<&str> = found.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["AgentB"]);

    // Nested communities can only be removed by the parent's manager.
    b.coordinator
        .leave_community("Society", Some("Team"), RequestTimeout::from_millis(2_000), Some(listener))
        .unwrap();
    assert_eq!(next(&mut rx).await.status, ResponseStatus::Fail);
}

#[tokio::test]
async fn test_join_of_missing_nested_community_fails() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());

    a.coordinator
        .join_community(JoinRequest::new("Society").nested_community("Ghost"), Some(listener))
        .unwrap();
    assert_eq!(next(&mut rx).await.status, ResponseStatus::Fail);
}

#[tokio::test]
async fn test_remote_attribute_modification() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator.join_community(JoinRequest::new("Society"), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());

    b.coordinator
        .modify_attributes(
            "Society",
            Some("AgentB"),
            vec![AttributeModification::add_value("Role", "Observer")],
            Some(listener),
        )
        .unwrap();
    let response = next(&mut rx).await;
    assert!(response.is_success());

    let recorded = b.coordinator.memberships();
    let entity = recorded.entity("Society", "AgentB").unwrap();
    assert!(entity.attributes().contains_value("Role", "Observer"));
    let authoritative = a.manager.community("Society").unwrap();
    assert!(authoritative
        .entity("AgentB")
        .unwrap()
        .attributes()
        .contains_value("Role", "Observer"));
}

#[tokio::test]
async fn test_remote_parent_query() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let c = cluster.node("AgentC");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator.join_community(JoinRequest::new("Society"), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());

    assert_eq!(
        b.coordinator.list_parent_communities(None, None),
        Resolution::Resolved(BTreeSet::from(["Society".to_string()]))
    );

    let resolution = c.coordinator.list_parent_communities(Some("AgentB"), Some(listener));
    assert!(resolution.is_pending());
    let answer = next(&mut rx).await;
    assert!(answer.is_success());
    assert_eq!(answer.names(), Some(&BTreeSet::from(["Society".to_string()])));

    // The answer is remembered once for a synchronous follow-up.
    assert_eq!(
        c.coordinator.list_parent_communities(Some("AgentB"), None),
        Resolution::Resolved(BTreeSet::from(["Society".to_string()]))
    );
}

#[tokio::test]
async fn test_reconciler_rejoins_dropped_member() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator
        .join_community(
            JoinRequest::new("Society").entity_attributes(Attributes::new().with("Role", "Member")),
            Some(listener.clone()),
        )
        .unwrap();
    assert!(next(&mut rx).await.is_success());
    eventually("manager cache to list AgentB", || async {
        a.coordinator.cache().get("Society").is_some_and(|c| c.has_entity("AgentB"))
    })
    .await;

    // The manager drops AgentB behind its back.
    a.coordinator
        .leave_community("Society", Some("AgentB"), RequestTimeout::from_millis(2_000), Some(listener))
        .unwrap();
    assert!(next(&mut rx).await.is_success());
    assert!(!a.manager.community("Society").unwrap().has_entity("AgentB"));

    b.coordinator.verify_memberships().await;
    eventually("AgentB to be rejoined", || async {
        a.manager
            .community("Society")
            .and_then(|c| c.entity("AgentB").cloned())
            .is_some_and(|e| e.attributes().contains_value("Role", "Member"))
    })
    .await;
}

#[tokio::test]
async fn test_reconciler_corrects_attribute_drift() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator
        .join_community(
            JoinRequest::new("Society").entity_attributes(Attributes::new().with("Role", "Member")),
            Some(listener.clone()),
        )
        .unwrap();
    assert!(next(&mut rx).await.is_success());

    // Another agent rewrites AgentB's role at the manager.
    a.coordinator
        .modify_attributes(
            "Society",
            Some("AgentB"),
            vec![AttributeModification::replace("Role", BTreeSet::from(["Guest".to_string()]))],
            Some(listener),
        )
        .unwrap();
    assert!(next(&mut rx).await.is_success());

    b.coordinator.verify_memberships().await;
    let entity = a.manager.community("Society").unwrap().entity("AgentB").cloned().unwrap();
    assert!(entity.attributes().contains_value("Role", "Member"));
    assert!(!entity.attributes().contains_value("Role", "Guest"));
}

#[tokio::test]
async fn test_memberships_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent-b").join("memberships.json");
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());

    let b = cluster.node_with_store("AgentB", Arc::new(FileMembershipStore::new(&path)));
    b.coordinator.start().await.unwrap();
    b.coordinator.join_community(JoinRequest::new("Society"), Some(listener)).unwrap();
    assert!(next(&mut rx).await.is_success());
    b.coordinator.shutdown().await;
    drop(b);
    assert!(path.exists());

    let restarted = cluster.node_with_store("AgentB", Arc::new(FileMembershipStore::new(&path)));
    assert!(restarted.coordinator.memberships().is_empty());
    restarted.coordinator.start().await.unwrap();
    assert!(restarted.coordinator.memberships().contains_entity("Society", "AgentB"));

    // Still a member: the pass fetches the descriptor and leaves it as is.
    let relayed = cluster.network.relayed_count();
    restarted.coordinator.verify_memberships().await;
    assert!(cluster.network.relayed_count() > relayed);
    assert_eq!(a.manager.community("Society").unwrap().len(), 2);
}

#[tokio::test]
async fn test_unanswered_join_times_out_without_side_effects() {
    let cluster = Cluster::new();
    let a = cluster.node("AgentA");
    let b = cluster.node("AgentB");
    let (listener, mut rx) = responder();
    a.coordinator.create_community("Society", Attributes::new(), Some(listener.clone())).unwrap();
    assert!(next(&mut rx).await.is_success());

    cluster.network.set_partitioned("AgentA", true);
    b.coordinator
        .join_community(JoinRequest::new("Society").timeout(RequestTimeout::from_millis(300)), Some(listener))
        .unwrap();

    assert_eq!(next(&mut rx).await.status, ResponseStatus::Timeout);
    assert!(b.coordinator.memberships().is_empty());
    assert!(!b.coordinator.cache().contains("Society"));
    assert!(!a.manager.community("Society").unwrap().has_entity("AgentB"));
}
