// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-process implementations of the domain ports.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Reference manager, naming, transport, and persistence adapters

pub mod manager;
pub mod membership_store;
pub mod naming;
pub mod network;
