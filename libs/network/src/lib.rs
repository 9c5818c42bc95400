//! # Nucleus Network Layer
//!
//! ## Purpose
//!
//! Moves atoms between nodes: picks a reactor for each atom, keeps the
//! reactor set's health current, and carries [`codec::BinaryMessage`] frames
//! over pooled TCP connections.
//!
//! ## Components
//!
//! ```text
//!  Atom ─▶ HashRouter ──snapshot── RoutingTable ◀── HealthMonitor (probes)
//!              │                        ▲
//!              ▼                        │ register
//!       RemoteDispatcher ─▶ ReactorClient ─▶ ConnectionPool ─▶ TCP ─▶ ReactorServer ─▶ Reactor
//! ```
//!
//! - [`routing`]: [`RoutingTable`] and the deterministic [`HashRouter`]
//! - [`health`]: periodic probing with a consecutive-failure threshold
//! - [`pool`]: per-reactor bounded connection pool with idle reaping
//! - [`framing`]: `u32` little-endian length prefix around encoded messages
//! - [`server`] / [`client`]: request/response over the wire protocol
//! - [`dispatcher`]: [`reactor::AtomExecutor`] that routes, then submits
//!
//! Delivery is at-most-once: nothing in this crate retries a submitted atom.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod framing;
pub mod health;
pub mod pool;
pub mod routing;
pub mod server;

pub use client::ReactorClient;
pub use dispatcher::RemoteDispatcher;
pub use error::{TransportError, TransportResult};
pub use health::{HealthMonitor, HealthProbe, HealthReport, LocalHealthProbe, WireHealthProbe};
pub use pool::{Connection, ConnectionPool, PoolStats, PooledConnection};
pub use routing::{HashRouter, ReactorEntry, RouterStats, RoutingTable};
pub use server::ReactorServer;
