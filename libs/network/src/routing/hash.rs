//! Deterministic hash router
//!
//! Selection for an atom over a snapshot:
//! 1. candidates are reactors declaring the atom's group, else the general pool
//! 2. start at `crc32(atom.id) mod |candidates|` (a zero hash counts as 1)
//! 3. probe forward, wrapping, for the first healthy candidate under the
//!    load threshold
//! 4. otherwise the least-loaded healthy candidate, ties to the earliest probed
//!
//! The same `(atom id, snapshot)` always yields the same reactor.

use super::table::{ReactorEntry, RoutingTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use types::{Atom, PacketGroup, Result, RuntimeError};

pub const DEFAULT_LOAD_THRESHOLD: u8 = 80;

/// CRC32 of the UTF-8 id, never zero
pub fn atom_hash(atom_id: &str) -> u32 {
    match crc32fast::hash(atom_id.as_bytes()) {
        0 => 1,
        h => h,
    }
}

/// Outcome of [`select`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Index into the snapshot passed to `select`
    pub index: usize,
    /// No reactor declared the group; the general pool was used
    pub general_pool: bool,
    /// Every healthy candidate was at or above the threshold
    pub overloaded: bool,
}

/// Pure selection over a snapshot
pub fn select(
    atom_id: &str,
    group: PacketGroup,
    snapshot: &[ReactorEntry],
    load_threshold: u8,
) -> Result<Selection> {
    let mut candidates: Vec<usize> = snapshot
        .iter()
        .enumerate()
        .filter(|(_, e)| e.descriptor.handles(group))
        .map(|(i, _)| i)
        .collect();

    let general_pool = candidates.is_empty();
    if general_pool {
        candidates = snapshot
            .iter()
            .enumerate()
            .filter(|(_, e)| e.descriptor.is_general())
            .map(|(i, _)| i)
            .collect();
    }

    if candidates.is_empty() {
        return Err(RuntimeError::no_available_reactor(
            group,
            "no reactor declares this group and the general pool is empty",
        ));
    }

    let n = candidates.len();
    let start = atom_hash(atom_id) as usize % n;
    let probe = (0..n).map(|offset| candidates[(start + offset) % n]);

    let mut least: Option<usize> = None;
    for index in probe {
        let entry = &snapshot[index];
        if !entry.healthy {
            continue;
        }
        if entry.load < load_threshold {
            return Ok(Selection {
                index,
                general_pool,
                overloaded: false,
            });
        }
        // Strictly lower keeps the earliest probed on ties
        if least.map_or(true, |best| entry.load < snapshot[best].load) {
            least = Some(index);
        }
    }

    least
        .map(|index| Selection {
            index,
            general_pool,
            overloaded: true,
        })
        .ok_or_else(|| {
            RuntimeError::no_available_reactor(
                group,
                format!("all {} candidate reactors are unhealthy", n),
            )
        })
}

#[derive(Debug, Default)]
pub struct RouterStats {
    pub routed: AtomicU64,
    /// Routed through the general pool or to an overloaded reactor
    pub fallbacks: AtomicU64,
    pub failures: AtomicU64,
}

/// Router bound to a live [`RoutingTable`]
pub struct HashRouter {
    table: Arc<RoutingTable>,
    load_threshold: u8,
    stats: RouterStats,
}

impl HashRouter {
    pub fn new(table: Arc<RoutingTable>, load_threshold: u8) -> Self {
        Self {
            table,
            load_threshold,
            stats: RouterStats::default(),
        }
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Select a reactor for the atom against the current table
    pub fn route(&self, atom: &Atom) -> Result<ReactorEntry> {
        let snapshot = self.table.snapshot();
        match select(&atom.id, atom.group, &snapshot, self.load_threshold) {
            Ok(selection) => {
                self.stats.routed.fetch_add(1, Ordering::Relaxed);
                if selection.general_pool || selection.overloaded {
                    self.stats.fallbacks.fetch_add(1, Ordering::Relaxed);
                }
                let entry = snapshot[selection.index].clone();
                debug!(
                    atom_id = %atom.id,
                    group = %atom.group,
                    reactor_id = %entry.id(),
                    general_pool = selection.general_pool,
                    overloaded = selection.overloaded,
                    "Atom routed"
                );
                Ok(entry)
            }
            Err(err) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                warn!(atom_id = %atom.id, group = %atom.group, error = %err, "Routing failed");
                Err(err)
            }
        }
    }
}

impl Default for HashRouter {
    fn default() -> Self {
        Self::new(Arc::new(RoutingTable::new()), DEFAULT_LOAD_THRESHOLD)
    }
}
