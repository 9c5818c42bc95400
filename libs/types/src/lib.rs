//! # Nucleus Core Types
//!
//! Shared data model for every Nucleus crate.
//!
//! ## Contents
//!
//! - [`Atom`]: the classified unit of work submitted to reactors
//! - [`PacketGroup`]: the fixed six-way classification with routing affinity
//! - [`ReactorDescriptor`]: static registration record for a reactor node
//! - [`RuntimeError`]: the client/server/protocol error taxonomy
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{Atom, PacketGroup};
//! use serde_json::json;
//!
//! let atom = Atom::new("a1", PacketGroup::CF, "ping", json!({"echo": "x"}));
//! assert_eq!(atom.priority, types::DEFAULT_PRIORITY);
//! assert!(atom.validate().is_ok());
//!
//! let nested = atom.child(1);
//! assert_eq!(nested.id, "a1_call_1");
//! ```

pub mod atom;
pub mod error;
pub mod group;
pub mod reactor;
pub mod time;

pub use atom::{
    Atom, DEFAULT_PRIORITY, DEFAULT_TIMEOUT_S, MAX_PRIORITY, MAX_TIMEOUT_S, MIN_PRIORITY,
};
pub use error::{ErrorCategory, Result, RuntimeError};
pub use group::{Affinity, PacketGroup};
pub use reactor::{ReactorCapability, ReactorDescriptor};
pub use time::{current_timestamp_ms, current_timestamp_secs};
