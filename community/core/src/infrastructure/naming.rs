// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-Memory Naming Service
//!
//! Process-local [`NamingService`] used for single-process deployments and
//! tests. A propagation delay can be configured to reproduce the eventual
//! consistency of a distributed directory: a binding only becomes visible to
//! `get`/`list` once the delay has passed. `bind` itself is atomic and sees
//! every binding immediately, so the first binder always wins.

use crate::domain::naming::{AddressEntry, NamingError, NamingService};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

struct Binding {
    entry: AddressEntry,
    bound_at: Instant,
}

pub struct InMemoryNamingService {
    bindings: RwLock<HashMap<String, Binding>>,
    propagation_delay: Duration,
    available: AtomicBool,
}

impl InMemoryNamingService {
    pub fn new() -> Self {
        Self::with_propagation_delay(Duration::ZERO)
    }

    pub fn with_propagation_delay(propagation_delay: Duration) -> Self {
        Self {
            bindings: RwLock::new(HashMap::new()),
            propagation_delay,
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage: every call fails while unavailable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    fn check_available(&self) -> Result<(), NamingError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(NamingError::Unavailable("in-memory directory offline".to_string()))
        }
    }

    fn is_visible(&self, binding: &Binding) -> bool {
        binding.bound_at.elapsed() >= self.propagation_delay
    }
}

impl Default for InMemoryNamingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NamingService for InMemoryNamingService {
    async fn bind(&self, entry: AddressEntry) -> Result<bool, NamingError> {
        self.check_available()?;
        let mut bindings = self.bindings.write();
        if let Some(existing) = bindings.get(&entry.name) {
            debug!(key = %entry.name, holder = %existing.entry.uri, "Bind refused, key already bound");
            return Ok(existing.entry == entry);
        }
        debug!(key = %entry.name, uri = %entry.uri, "Bound");
        bindings.insert(entry.name.clone(), Binding { entry, bound_at: Instant::now() });
        Ok(true)
    }

    async fn rebind(&self, entry: AddressEntry) -> Result<(), NamingError> {
        self.check_available()?;
        debug!(key = %entry.name, uri = %entry.uri, "Rebound");
        self.bindings
            .write()
            .insert(entry.name.clone(), Binding { entry, bound_at: Instant::now() });
        Ok(())
    }

    async fn unbind(&self, entry: &AddressEntry) -> Result<bool, NamingError> {
        self.check_available()?;
        let mut bindings = self.bindings.write();
        let matches = bindings.get(&entry.name).is_some_and(|b| b.entry == *entry);
        if matches {
            bindings.remove(&entry.name);
            debug!(key = %entry.name, "Unbound");
        }
        Ok(matches)
    }

    async fn list(&self, suffix: &str) -> Result<BTreeSet<String>, NamingError> {
        self.check_available()?;
        let bindings = self.bindings.read();
        Ok(bindings
            .iter()
            .filter(|(key, binding)| key.ends_with(suffix) && self.is_visible(binding))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get(&self, key: &str, record_type: &str) -> Result<Option<AddressEntry>, NamingError> {
        self.check_available()?;
        let bindings = self.bindings.read();
        Ok(bindings
            .get(key)
            .filter(|binding| binding.entry.record_type == record_type && self.is_visible(binding))
            .map(|binding| binding.entry.clone()))
    }
}
