//! Routing table: reactor descriptors plus live health and load

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};
use types::ReactorDescriptor;

/// One reactor as seen by the router
#[derive(Debug, Clone, PartialEq)]
pub struct ReactorEntry {
    pub descriptor: ReactorDescriptor,
    pub healthy: bool,
    /// Percentage 0..=100
    pub load: u8,
    pub queue: u64,
    pub consecutive_failures: u32,
    pub last_check: Option<Instant>,
}

impl ReactorEntry {
    pub fn new(descriptor: ReactorDescriptor) -> Self {
        Self {
            descriptor,
            healthy: true,
            load: 0,
            queue: 0,
            consecutive_failures: 0,
            last_check: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: RwLock<BTreeMap<String, ReactorEntry>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ReactorDescriptor>) -> Self {
        let table = Self::new();
        for descriptor in descriptors {
            table.register(descriptor);
        }
        table
    }

    /// Insert or update a reactor. An existing entry keeps its health state.
    /// Returns true when the reactor was not known before.
    pub fn register(&self, descriptor: ReactorDescriptor) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&descriptor.id) {
            Some(entry) => {
                entry.descriptor = descriptor;
                false
            }
            None => {
                info!(
                    reactor_id = %descriptor.id,
                    endpoint = %descriptor.endpoint,
                    "Reactor registered"
                );
                entries.insert(descriptor.id.clone(), ReactorEntry::new(descriptor));
                true
            }
        }
    }

    pub fn deregister(&self, id: &str) -> Option<ReactorEntry> {
        let removed = self.entries.write().remove(id);
        if removed.is_some() {
            info!(reactor_id = %id, "Reactor deregistered");
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<ReactorEntry> {
        self.entries.read().get(id).cloned()
    }

    /// Consistent copy of every entry, sorted by reactor id
    pub fn snapshot(&self) -> Vec<ReactorEntry> {
        self.entries.read().values().cloned().collect()
    }

    pub fn descriptors(&self) -> Vec<ReactorDescriptor> {
        self.entries
            .read()
            .values()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Successful poll: restore health and record load
    pub fn record_health_success(&self, id: &str, load: u8, queue: u64) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(id) {
            if !entry.healthy {
                info!(reactor_id = %id, load, "Reactor healthy again");
            }
            entry.healthy = true;
            entry.load = load.min(100);
            entry.queue = queue;
            entry.consecutive_failures = 0;
            entry.last_check = Some(Instant::now());
        }
    }

    /// Failed poll. Returns true if this failure made the reactor unhealthy.
    pub fn record_health_failure(&self, id: &str, failure_threshold: u32) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        entry.consecutive_failures = entry.consecutive_failures.saturating_add(1);
        entry.last_check = Some(Instant::now());
        if entry.healthy && entry.consecutive_failures >= failure_threshold {
            entry.healthy = false;
            warn!(
                reactor_id = %id,
                failures = entry.consecutive_failures,
                "Reactor marked unhealthy"
            );
            return true;
        }
        false
    }

    pub fn set_load(&self, id: &str, load: u8) {
        if let Some(entry) = self.entries.write().get_mut(id) {
            entry.load = load.min(100);
        }
    }
}
