//! Handler trait and registration metadata

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use types::Atom;

/// Executes one kind of atom.
///
/// Errors are reported to the caller as `HandlerFailed`; panics are caught
/// and reported the same way.
#[async_trait]
pub trait AtomHandler: Send + Sync {
    async fn handle(&self, atom: Atom) -> anyhow::Result<Value>;
}

/// Who registered the handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerLevel {
    /// Built into every reactor
    System,
    #[default]
    User,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerMetadata {
    /// Upper bound on the atom deadline, in seconds
    pub timeout_s: Option<u64>,
    pub level: HandlerLevel,
    pub description: String,
    /// Runs without a concurrency permit. For coordination handlers that
    /// only await other atoms, possibly on this same reactor.
    #[serde(default)]
    pub detached: bool,
}

impl HandlerMetadata {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = Some(timeout_s);
        self
    }

    pub fn detached(mut self) -> Self {
        self.detached = true;
        self
    }

    pub fn system(description: impl Into<String>) -> Self {
        Self {
            level: HandlerLevel::System,
            ..Self::new(description)
        }
    }
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> AtomHandler for FnHandler<F>
where
    F: Fn(Atom) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, atom: Atom) -> anyhow::Result<Value> {
        (self.f)(atom).await
    }
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn AtomHandler>
where
    F: Fn(Atom) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}
