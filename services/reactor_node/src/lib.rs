//! # Nucleus Reactor Node
//!
//! Library half of the `reactor-node` binary: node assembly, the `co`
//! coordination handlers and logging setup, kept here so integration tests
//! can build a node without a process boundary.

pub mod bridge;
pub mod logging;
pub mod node;

pub use node::{Node, NodePipelines};
