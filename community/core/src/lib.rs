// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `aegis-community-core`: Community Coordination Crate
//!
//! Lets agents form named **communities**, join and leave them, nest them,
//! attach attributes to members, and search membership. Each community has
//! exactly one managing agent, elected by whoever binds its name in the naming
//! service first; every other agent talks to it through the relay transport and
//! keeps a cached copy of the communities it cares about.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Community`, `Entity`, `Attributes`, filters, requests, ports |
//! | [`application`] | Application | `CommunityCoordinator`, `CommunityCache`, reconciler |
//! | [`infrastructure`] | Infrastructure | Reference manager, in-memory naming and network, stores |
//!
//! ## Key Concepts
//!
//! - **Manager**: The agent bound to `<community>.comm`. It owns the
//!   authoritative copy and pushes snapshots to members and observers.
//! - **Cache**: Per-agent copies of communities with a TTL. Newer snapshots
//!   replace older ones and are turned into add/remove/modify events.
//! - **Reconciliation**: Each agent periodically checks that the communities it
//!   believes it joined still list it, rejoining or correcting attributes when
//!   they do not.
//!
//! ## Example
//!
//! ```no_run
//! use aegis_community_core::application::coordinator::CommunityCoordinator;
//! use aegis_community_core::domain::attributes::Attributes;
//! use aegis_community_core::infrastructure::manager::DefaultCommunityManager;
//! use aegis_community_core::infrastructure::naming::InMemoryNamingService;
//! use aegis_community_core::infrastructure::network::InMemoryNetwork;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let naming = Arc::new(InMemoryNamingService::new());
//! let network = InMemoryNetwork::new();
//! let transport = Arc::new(network.transport("AgentA"));
//! let manager = Arc::new(DefaultCommunityManager::new("AgentA", naming.clone(), transport.clone()));
//!
//! let coordinator = CommunityCoordinator::builder("AgentA")
//!     .naming(naming)
//!     .transport(transport)
//!     .manager(manager)
//!     .build()?;
//! network.register("AgentA", &coordinator.inbound_handler());
//! coordinator.start().await?;
//!
//! coordinator.create_community("Society", Attributes::new().with("Domain", "logistics"), None)?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;
