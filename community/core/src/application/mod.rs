// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordinator, cache, and the background machinery behind them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Request routing, caching, membership bookkeeping, reconciliation

pub mod cache;
pub mod coordinator;
pub mod delay_queue;
pub mod locator;
pub mod membership_registry;
pub mod operation;
pub mod reconciler;
