//! Execution seam shared by local reactors and remote dispatch

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use types::{Atom, Result};

/// Successful execution of one atom
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub atom_id: String,
    pub result: Value,
    pub duration_ms: u64,
}

/// Anything that can run an atom to completion
#[async_trait]
pub trait AtomExecutor: Send + Sync {
    async fn execute(&self, atom: Atom) -> Result<ProcessOutcome>;
}

#[async_trait]
impl<T: AtomExecutor + ?Sized> AtomExecutor for Arc<T> {
    async fn execute(&self, atom: Atom) -> Result<ProcessOutcome> {
        (**self).execute(atom).await
    }
}
