//! # Nucleus Pipelines
//!
//! Strictly linear chains of atom executions. A [`Pipeline`] is a stateless
//! definition; [`PipelineEngine::execute`] runs it through any
//! [`reactor::AtomExecutor`] (a local `Reactor` or a routed remote
//! dispatcher) and returns a [`PipelineResult`] with a per-step trace.
//!
//! ```rust
//! use pipeline::{Pipeline, PipelineEngine, PipelineStep};
//! use reactor::Reactor;
//! use serde_json::json;
//! use types::PacketGroup;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let engine = PipelineEngine::new(Reactor::with_defaults("r1"));
//! let pipeline = Pipeline::new("echo-twice")
//!     .step(PipelineStep::new(PacketGroup::CF, "ping").with_data(json!({"echo": "x"})))
//!     .step(PipelineStep::new(PacketGroup::CF, "ping"));
//!
//! let result = engine.execute(&pipeline, json!({})).await;
//! assert!(result.success);
//! assert_eq!(result.completed_steps, 2);
//! # }
//! ```

pub mod definition;
pub mod engine;
pub mod error;
pub mod registry;

pub use definition::{
    Pipeline, PipelineStep, DEFAULT_PIPELINE_TIMEOUT_S, MAX_PIPELINE_TIMEOUT_S,
};
pub use engine::{merge_step_data, PipelineEngine, PipelineResult, StepFailure, StepTrace};
pub use error::{PipelineError, Result};
pub use registry::PipelineRegistry;
