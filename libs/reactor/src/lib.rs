//! # Nucleus Reactor
//!
//! ## Purpose
//!
//! A reactor hosts handlers keyed by `(group, element)` and executes atoms
//! against them: validation, lookup, a bounded number of concurrent
//! invocations, a per-atom deadline and atomic statistics on every path.
//!
//! ## Execution Path
//!
//! ```text
//! Atom ─▶ validate ─▶ registry lookup ─▶ permit (block | reject) ─▶ spawn handler
//!                                                                    │
//!                                   timeout_at(deadline) ◀───────────┘
//!                                        │
//!                      ProcessOutcome / RuntimeError (+ stats)
//! ```
//!
//! Every reactor is constructed with the built-in `cf:ping`, `cf:health` and
//! `cf:info` handlers.
//!
//! ## Usage
//!
//! ```rust
//! use reactor::{handler_fn, HandlerMetadata, Reactor};
//! use serde_json::json;
//! use types::{Atom, PacketGroup};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let reactor = Reactor::with_defaults("r1");
//! reactor
//!     .register(
//!         PacketGroup::DF,
//!         "double",
//!         handler_fn(|atom: Atom| async move {
//!             let n = atom.data.as_i64().unwrap_or(0);
//!             Ok(json!(n * 2))
//!         }),
//!         HandlerMetadata::default(),
//!     )
//!     .unwrap();
//!
//! let outcome = reactor
//!     .process(Atom::new("a1", PacketGroup::DF, "double", json!(21)))
//!     .await
//!     .unwrap();
//! assert_eq!(outcome.result, json!(42));
//! # }
//! ```

pub mod builtins;
pub mod executor;
pub mod handler;
pub mod reactor;
pub mod registry;
pub mod stats;

pub use builtins::health_snapshot;
pub use executor::{AtomExecutor, ProcessOutcome};
pub use handler::{handler_fn, AtomHandler, HandlerLevel, HandlerMetadata};
pub use reactor::Reactor;
pub use registry::{HandlerEntry, HandlerInfo, HandlerRegistry};
pub use stats::{ReactorStats, StatsSnapshot};
