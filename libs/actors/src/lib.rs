//! # Nucleus Actors
//!
//! Stateful actors with one mailbox and one drain task each, organised into
//! supervision trees.
//!
//! ## Architecture
//!
//! - [`ActorSystem`]: spawns actors from registered [`ActorDefinition`]s,
//!   routes messages, tracks lifecycle, metrics and dead letters
//! - [`Mailbox`]: per-actor FIFO with `drop_oldest`, `drop_newest` or
//!   `fail_fast` overflow
//! - [`ActorContext`]: what a handler sees (state, nested sends, spawn,
//!   stop/kill/restart, scheduled messages)
//! - [`supervision`]: the built-in `supervisor` actor and its restart
//!   strategies
//!
//! ## Quick Start
//!
//! ```rust
//! use actors::{handler_fn, ActorDefinition, ActorMessage, ActorSystem, Lifecycle};
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let system = ActorSystem::default();
//! system.register(ActorDefinition::new("counter").on(
//!     "increment",
//!     handler_fn(|ctx, _env| {
//!         let next = ctx.state()["count"].as_i64().unwrap_or(0) + 1;
//!         ctx.state_mut()["count"] = json!(next);
//!         Ok(())
//!     }),
//! ));
//!
//! let id = system.spawn("counter", json!({"count": 0}), None).unwrap();
//! system.send(id, ActorMessage::new("increment", json!({})), None).unwrap();
//! system.stop(id).unwrap();
//! system.wait_for(id, Lifecycle::Terminated).await.unwrap();
//! # }
//! ```

pub mod context;
pub mod definition;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod mailbox;
pub mod message;
pub mod supervision;
pub mod system;

pub use context::ActorContext;
pub use definition::{handler_fn, ActorDefinition, MessageHandler};
pub use error::{ActorError, ActorResult};
pub use id::ActorId;
pub use lifecycle::Lifecycle;
pub use mailbox::{Mailbox, MailboxCapacity, MailboxConfig, SendOutcome};
pub use message::{ActorMessage, ChildError, Envelope, ACTOR_GROUP, CHILD_ERROR, INIT};
pub use supervision::{Strategy, SupervisorSpec, START_CHILD, SUPERVISOR};
pub use system::{
    ActorStatus, ActorSystem, DeadLetter, DeadLetterReason, MetricsSnapshot, SystemEvent,
    SystemMetrics, DEAD_LETTER_CAPACITY,
};
