// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Community domain model and the ports the coordinator depends on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value types, filters, events, and collaborator contracts

pub mod attributes;
pub mod community;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod glob;
pub mod manager;
pub mod memberships;
pub mod naming;
pub mod repository;
pub mod request;
pub mod transport;
