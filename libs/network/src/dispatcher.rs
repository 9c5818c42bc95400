//! Routed execution
//!
//! [`RemoteDispatcher`] routes each atom with the [`HashRouter`] and runs it
//! on the selected reactor: in-process when the selection is the local
//! reactor, over the wire otherwise. A failed submission is reported, never
//! retried.

use crate::client::ReactorClient;
use crate::routing::HashRouter;
use async_trait::async_trait;
use reactor::{AtomExecutor, ProcessOutcome, Reactor};
use std::sync::Arc;
use tracing::warn;
use types::{Atom, Result};

pub struct RemoteDispatcher {
    router: Arc<HashRouter>,
    client: Arc<ReactorClient>,
    local: Option<Arc<Reactor>>,
}

impl RemoteDispatcher {
    pub fn new(router: Arc<HashRouter>, client: Arc<ReactorClient>) -> Self {
        Self {
            router,
            client,
            local: None,
        }
    }

    /// Short-circuit atoms routed to this reactor id
    pub fn with_local(mut self, reactor: Arc<Reactor>) -> Self {
        self.local = Some(reactor);
        self
    }

    pub fn router(&self) -> &Arc<HashRouter> {
        &self.router
    }

    pub async fn dispatch(&self, atom: Atom) -> Result<ProcessOutcome> {
        let entry = self.router.route(&atom)?;

        if let Some(local) = &self.local {
            if local.id() == entry.id() {
                return local.process(atom).await;
            }
        }

        let result = self.client.submit(&entry.descriptor, &atom).await;
        if let Err(err) = &result {
            if err.category() != types::ErrorCategory::Client {
                warn!(
                    atom_id = %atom.id,
                    reactor_id = %entry.id(),
                    error = %err,
                    retryable = err.is_retryable(),
                    "Remote execution failed"
                );
            }
        }
        result
    }
}

#[async_trait]
impl AtomExecutor for RemoteDispatcher {
    async fn execute(&self, atom: Atom) -> Result<ProcessOutcome> {
        self.dispatch(atom).await
    }
}
