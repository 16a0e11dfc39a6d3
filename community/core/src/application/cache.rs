// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Community Cache
//!
//! Process-local store of community snapshots received from managers.
//!
//! ## Behaviour
//!
//! - Entries expire lazily: an expired entry is evicted by the first access that
//!   notices it. [`CacheExpiration::Never`] disables expiry.
//! - [`CommunityCache::update`] orders snapshots by `Community::last_update`.
//!   Older snapshots are dropped, an equal one only refreshes the entry's
//!   lifetime, newer ones are diffed against the cached copy and replace it.
//! - Every accepted change is turned into [`CommunityChangeEvent`]s which go to
//!   listeners registered for the community, for any of its ancestors, and for
//!   [`ListenerScope::AllCommunities`].
//! - Each batch of events is delivered on its own blocking task, never on the
//!   thread that called `update` and never while a cache lock is held. A slow
//!   listener only holds up the batch it is in. Within a batch events arrive in
//!   the order they were produced. A listener that panics is removed.
//! - A slot can be marked pending while a remote lookup for it is in flight so
//!   that concurrent readers do not start a second one.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Eventually consistent view of remote communities

use crate::domain::community::{Community, Entity, EntityType, SearchQualifier};
use crate::domain::config::CacheExpiration;
use crate::domain::events::{ChangeType, CommunityChangeEvent};
use crate::domain::filter::{Filter, FilterParseError};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, error, trace};

/// Receives community change events.
pub trait CommunityChangeListener: Send + Sync {
    fn community_changed(&self, event: &CommunityChangeEvent);
}

impl<F> CommunityChangeListener for F
where
    F: Fn(&CommunityChangeEvent) + Send + Sync,
{
    fn community_changed(&self, event: &CommunityChangeEvent) {
        self(event)
    }
}

pub type ChangeListenerRef = Arc<dyn CommunityChangeListener>;

/// What a change listener is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerScope {
    Community(String),
    AllCommunities,
}

impl ListenerScope {
    pub fn community(name: impl Into<String>) -> Self {
        ListenerScope::Community(name.into())
    }
}

/// Opaque token returned on listener registration; needed for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerHandle(u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

enum Slot {
    Pending(Instant),
    Ready { community: Arc<Community>, stored_at: Instant },
}

#[derive(Default)]
struct ListenerTable {
    by_scope: HashMap<ListenerScope, Vec<(ListenerHandle, ChangeListenerRef)>>,
    scopes: HashMap<ListenerHandle, ListenerScope>,
}

impl ListenerTable {
    fn insert(&mut self, handle: ListenerHandle, scope: ListenerScope, listener: ChangeListenerRef) {
        self.by_scope.entry(scope.clone()).or_default().push((handle, listener));
        self.scopes.insert(handle, scope);
    }

    fn remove(&mut self, handle: ListenerHandle) -> bool {
        let Some(scope) = self.scopes.remove(&handle) else {
            return false;
        };
        if let Some(listeners) = self.by_scope.get_mut(&scope) {
            listeners.retain(|(h, _)| *h != handle);
            if listeners.is_empty() {
                self.by_scope.remove(&scope);
            }
        }
        true
    }

    fn contains(&self, handle: ListenerHandle) -> bool {
        self.scopes.contains_key(&handle)
    }

    /// Listeners for any of `communities` plus the global ones, each once.
    fn interested(&self, communities: &BTreeSet<String>) -> Vec<(ListenerHandle, ChangeListenerRef)> {
        let mut targets = BTreeMap::new();
        let scopes = communities
            .iter()
            .map(|name| ListenerScope::Community(name.clone()))
            .chain(std::iter::once(ListenerScope::AllCommunities));
        for scope in scopes {
            for (handle, listener) in self.by_scope.get(&scope).into_iter().flatten() {
                targets.entry(*handle).or_insert_with(|| listener.clone());
            }
        }
        targets.into_iter().collect()
    }
}

/// A batch of events for a fixed set of listeners.
struct Notification {
    targets: Vec<(ListenerHandle, ChangeListenerRef)>,
    events: Vec<CommunityChangeEvent>,
}

pub struct CommunityCache {
    slots: RwLock<HashMap<String, Slot>>,
    listeners: Arc<Mutex<ListenerTable>>,
    expiration: CacheExpiration,
    next_handle: AtomicU64,
    runtime: Handle,
}

impl CommunityCache {
    /// Create a cache bound to the current runtime, which delivers notifications.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(expiration: CacheExpiration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            listeners: Arc::new(Mutex::new(ListenerTable::default())),
            expiration,
            next_handle: AtomicU64::new(1),
            runtime: Handle::current(),
        }
    }

    pub fn expiration(&self) -> CacheExpiration {
        self.expiration
    }

    fn is_expired(&self, stored_at: Instant) -> bool {
        match self.expiration {
            CacheExpiration::Never => false,
            CacheExpiration::After(ttl) => stored_at.elapsed() >= ttl,
        }
    }

    fn live<'a>(&self, slot: Option<&'a Slot>) -> Option<&'a Arc<Community>> {
        match slot {
            Some(Slot::Ready { community, stored_at }) if !self.is_expired(*stored_at) => Some(community),
            _ => None,
        }
    }

    /// Cached snapshot of `name`; evicts the entry if it has expired.
    pub fn get(&self, name: &str) -> Option<Arc<Community>> {
        let expired = {
            let slots = self.slots.read();
            match slots.get(name) {
                Some(Slot::Ready { community, stored_at }) if !self.is_expired(*stored_at) => {
                    metrics::counter!("community_cache_hits_total").increment(1);
                    return Some(community.clone());
                }
                Some(Slot::Ready { .. }) => true,
                _ => false,
            }
        };
        metrics::counter!("community_cache_misses_total").increment(1);
        if expired {
            self.evict_expired(name);
        }
        None
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    fn evict_expired(&self, name: &str) {
        let mut slots = self.slots.write();
        let expired = matches!(
            slots.get(name),
            Some(Slot::Ready { stored_at, .. }) if self.is_expired(*stored_at)
        );
        if expired {
            slots.remove(name);
            metrics::counter!("community_cache_expirations_total").increment(1);
            debug!(community = %name, "Cache entry expired");
        }
    }

    /// Claim the slot for a remote lookup. Returns `false` when a live entry
    /// exists or another lookup is already in flight.
    pub fn begin_lookup(&self, name: &str) -> bool {
        let mut slots = self.slots.write();
        let claimable = match slots.get(name) {
            None => true,
            Some(Slot::Pending(since)) => self.is_expired(*since),
            Some(Slot::Ready { stored_at, .. }) => self.is_expired(*stored_at),
        };
        if claimable {
            slots.insert(name.to_string(), Slot::Pending(Instant::now()));
            trace!(community = %name, "Cache slot marked pending");
        }
        claimable
    }

    /// Release a pending slot that never received a snapshot.
    pub fn end_lookup(&self, name: &str) {
        let mut slots = self.slots.write();
        if matches!(slots.get(name), Some(Slot::Pending(_))) {
            slots.remove(name);
        }
    }

    pub fn is_pending(&self, name: &str) -> bool {
        matches!(self.slots.read().get(name), Some(Slot::Pending(_)))
    }

    /// Offer a snapshot to the cache. Returns `false` if it was stale.
    pub fn update(&self, incoming: &Community) -> bool {
        let name = incoming.name().to_string();
        let (events, targets) = {
            let mut slots = self.slots.write();
            let cached = self.live(slots.get(&name)).cloned();
            let snapshot = Arc::new(incoming.clone());

            let events = match cached {
                Some(cached) if incoming.last_update() < cached.last_update() => {
                    metrics::counter!("community_cache_stale_updates_total").increment(1);
                    debug!(
                        community = %name,
                        incoming = incoming.last_update(),
                        cached = cached.last_update(),
                        "Dropping stale community snapshot"
                    );
                    return false;
                }
                Some(cached) if incoming.last_update() == cached.last_update() => {
                    slots.insert(name.clone(), Slot::Ready { community: cached, stored_at: Instant::now() });
                    return true;
                }
                Some(cached) => diff_events(&cached, &snapshot),
                None => added_events(&snapshot),
            };
            slots.insert(name.clone(), Slot::Ready { community: snapshot, stored_at: Instant::now() });

            (events, self.interested(&slots, &name))
        };

        debug!(community = %name, events = events.len(), "Community snapshot accepted");
        self.notify(targets, events);
        true
    }

    /// Explicitly invalidate a community.
    pub fn remove(&self, name: &str) -> Option<Arc<Community>> {
        let (removed, targets) = {
            let mut slots = self.slots.write();
            let targets = self.interested(&slots, name);
            match slots.remove(name) {
                Some(Slot::Ready { community, .. }) => (community, targets),
                _ => return None,
            }
        };
        debug!(community = %name, "Community removed from cache");
        let event = CommunityChangeEvent::new(removed.clone(), ChangeType::RemoveCommunity, name);
        self.notify(targets, vec![event]);
        Some(removed)
    }

    /// Names of all live cached communities.
    pub fn list_all(&self) -> BTreeSet<String> {
        let slots = self.slots.read();
        slots
            .iter()
            .filter(|(_, slot)| self.live(Some(slot)).is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Cached communities whose own attributes match `filter`.
    pub fn search(&self, filter: &str) -> Result<Vec<Arc<Community>>, FilterParseError> {
        let filter = Filter::parse(filter)?;
        Ok(self.search_communities(&filter))
    }

    pub fn search_communities(&self, filter: &Filter) -> Vec<Arc<Community>> {
        let slots = self.slots.read();
        let mut matches: Vec<Arc<Community>> = slots
            .values()
            .filter_map(|slot| self.live(Some(slot)))
            .filter(|community| filter.matches(community.attributes()))
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.name().cmp(b.name()));
        matches
    }

    /// Members of `community` matching `filter`. When `recursive`, nested
    /// communities found in the cache are searched too; nested communities that
    /// are not cached are skipped.
    pub fn search_entities(
        &self,
        community: &str,
        filter: &str,
        qualifier: SearchQualifier,
        recursive: bool,
    ) -> Result<Vec<Entity>, FilterParseError> {
        let filter = Filter::parse(filter)?;
        Ok(self.search_entities_with(community, &filter, qualifier, recursive))
    }

    pub fn search_entities_with(
        &self,
        community: &str,
        filter: &Filter,
        qualifier: SearchQualifier,
        recursive: bool,
    ) -> Vec<Entity> {
        let slots = self.slots.read();
        let mut found = BTreeMap::new();
        let mut visited = HashSet::new();
        self.collect_entities(&slots, community, filter, qualifier, recursive, &mut visited, &mut found);
        found.into_values().collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_entities(
        &self,
        slots: &HashMap<String, Slot>,
        community: &str,
        filter: &Filter,
        qualifier: SearchQualifier,
        recursive: bool,
        visited: &mut HashSet<String>,
        found: &mut BTreeMap<String, Entity>,
    ) {
        if !visited.insert(community.to_string()) {
            return;
        }
        let Some(snapshot) = self.live(slots.get(community)) else {
            trace!(community = %community, "Nested community not cached, branch skipped");
            return;
        };
        for entity in snapshot.search(filter, qualifier) {
            found.entry(entity.name().to_string()).or_insert(entity);
        }
        if recursive {
            let nested = snapshot
                .entities()
                .filter(|entity| entity.entity_type() == EntityType::Community)
                .map(|entity| entity.name().to_string())
                .collect::<Vec<_>>();
            for name in nested {
                self.collect_entities(slots, &name, filter, qualifier, recursive, visited, found);
            }
        }
    }

    /// Cached communities listing `entity` as a member, transitively when
    /// `recursive`.
    pub fn ancestor_names(&self, entity: &str, recursive: bool) -> BTreeSet<String> {
        let slots = self.slots.read();
        self.ancestors_in(&slots, entity, recursive)
    }

    fn ancestors_in(&self, slots: &HashMap<String, Slot>, entity: &str, recursive: bool) -> BTreeSet<String> {
        let mut ancestors = BTreeSet::new();
        let mut frontier = vec![entity.to_string()];
        while let Some(child) = frontier.pop() {
            for (name, slot) in slots {
                let Some(community) = self.live(Some(slot)) else {
                    continue;
                };
                if community.has_entity(&child) && ancestors.insert(name.clone()) && recursive {
                    frontier.push(name.clone());
                }
            }
        }
        ancestors
    }

    /// Register a change listener. If the scope names a cached community (or is
    /// global), the listener is first sent one `ADD_COMMUNITY` and one
    /// `ADD_ENTITY` per member for each such community.
    pub fn add_listener(&self, scope: ListenerScope, listener: ChangeListenerRef) -> ListenerHandle {
        let handle = ListenerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));

        // Snapshot and registration share the slots lock so that no update can
        // land between them.
        let catch_up: Vec<CommunityChangeEvent> = {
            let slots = self.slots.read();
            let events = match &scope {
                ListenerScope::Community(name) => {
                    self.live(slots.get(name)).map(added_events).unwrap_or_default()
                }
                ListenerScope::AllCommunities => {
                    let mut communities: Vec<&Arc<Community>> =
                        slots.values().filter_map(|slot| self.live(Some(slot))).collect();
                    communities.sort_by(|a, b| a.name().cmp(b.name()));
                    communities.into_iter().flat_map(added_events).collect()
                }
            };
            self.listeners.lock().insert(handle, scope.clone(), listener.clone());
            events
        };
        debug!(%handle, ?scope, catch_up = catch_up.len(), "Community change listener registered");
        if !catch_up.is_empty() {
            self.dispatch(Notification { targets: vec![(handle, listener)], events: catch_up });
        }
        handle
    }

    pub fn remove_listener(&self, handle: ListenerHandle) -> bool {
        let removed = self.listeners.lock().remove(handle);
        if removed {
            debug!(%handle, "Community change listener removed");
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().scopes.len()
    }

    /// Listeners of `name`, of its ancestors, and the global ones. Resolved
    /// while the slots lock is held so that a listener registering concurrently
    /// gets either the catch-up or the change, not both.
    fn interested(&self, slots: &HashMap<String, Slot>, name: &str) -> Vec<(ListenerHandle, ChangeListenerRef)> {
        let mut scopes = self.ancestors_in(slots, name, true);
        scopes.insert(name.to_string());
        self.listeners.lock().interested(&scopes)
    }

    fn notify(&self, targets: Vec<(ListenerHandle, ChangeListenerRef)>, events: Vec<CommunityChangeEvent>) {
        if !events.is_empty() && !targets.is_empty() {
            self.dispatch(Notification { targets, events });
        }
    }

    /// Listeners are arbitrary callbacks that may block, so each batch gets a
    /// blocking task of its own.
    fn dispatch(&self, notification: Notification) {
        let listeners = self.listeners.clone();
        self.runtime.spawn_blocking(move || deliver(notification, &listeners));
    }
}

fn added_events(community: &Arc<Community>) -> Vec<CommunityChangeEvent> {
    std::iter::once(CommunityChangeEvent::new(community.clone(), ChangeType::AddCommunity, community.name()))
        .chain(
            community
                .entity_names()
                .map(|name| CommunityChangeEvent::new(community.clone(), ChangeType::AddEntity, name)),
        )
        .collect()
}

fn diff_events(old: &Community, new: &Arc<Community>) -> Vec<CommunityChangeEvent> {
    let mut events = Vec::new();
    if old.attributes() != new.attributes() {
        events.push(CommunityChangeEvent::new(
            new.clone(),
            ChangeType::CommunityAttributesChanged,
            new.name(),
        ));
    }
    for entity in new.entities() {
        match old.entity(entity.name()) {
            None => events.push(CommunityChangeEvent::new(new.clone(), ChangeType::AddEntity, entity.name())),
            Some(previous) if previous.attributes() != entity.attributes() => events.push(
                CommunityChangeEvent::new(new.clone(), ChangeType::EntityAttributesChanged, entity.name()),
            ),
            Some(_) => {}
        }
    }
    for name in old.entity_names().filter(|name| !new.has_entity(name)) {
        events.push(CommunityChangeEvent::new(new.clone(), ChangeType::RemoveEntity, name));
    }
    events
}

fn deliver(notification: Notification, listeners: &Mutex<ListenerTable>) {
    for (handle, listener) in &notification.targets {
        for event in &notification.events {
            if !listeners.lock().contains(*handle) {
                break;
            }
            trace!(%handle, %event, "Delivering community change");
            let outcome = catch_unwind(AssertUnwindSafe(|| listener.community_changed(event)));
            if outcome.is_err() {
                metrics::counter!("community_listener_panics_total").increment(1);
                error!(%handle, %event, "Community change listener panicked; deregistering");
                listeners.lock().remove(*handle);
                break;
            }
        }
    }
}
