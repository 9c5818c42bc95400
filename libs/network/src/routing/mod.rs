//! Reactor Selection
//!
//! [`RoutingTable`] is the single owned view of known reactors; the
//! [`HashRouter`] reads consistent snapshots of it. Table order is reactor id
//! order, which is what makes a snapshot canonical and routing reproducible.

mod hash;
mod table;

pub use hash::{atom_hash, select, HashRouter, RouterStats, Selection, DEFAULT_LOAD_THRESHOLD};
pub use table::{ReactorEntry, RoutingTable};
