//! Actor type definitions
//!
//! An [`ActorDefinition`] is registered once per actor type and names a
//! handler per message type, an optional fallback for everything else, and
//! the mailbox the type's instances get.

use crate::context::ActorContext;
use crate::error::ActorResult;
use crate::mailbox::MailboxConfig;
use crate::message::Envelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, ctx: &mut ActorContext, envelope: Envelope) -> ActorResult<()>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&mut ActorContext, Envelope) -> ActorResult<()> + Send + Sync,
{
    async fn handle(&self, ctx: &mut ActorContext, envelope: Envelope) -> ActorResult<()> {
        (self.0)(ctx, envelope)
    }
}

/// Wrap a synchronous closure as a [`MessageHandler`]
pub fn handler_fn<F>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(&mut ActorContext, Envelope) -> ActorResult<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

#[derive(Clone)]
pub struct ActorDefinition {
    actor_type: String,
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
    fallback: Option<Arc<dyn MessageHandler>>,
    mailbox: Option<MailboxConfig>,
}

impl ActorDefinition {
    pub fn new(actor_type: impl Into<String>) -> Self {
        Self {
            actor_type: actor_type.into(),
            handlers: HashMap::new(),
            fallback: None,
            mailbox: None,
        }
    }

    /// Handle messages of `kind`
    pub fn on(mut self, kind: impl Into<String>, handler: Arc<dyn MessageHandler>) -> Self {
        self.handlers.insert(kind.into(), handler);
        self
    }

    /// Handle every message type without a dedicated handler
    pub fn fallback(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    /// Override the system-wide mailbox settings for this type
    pub fn with_mailbox(mut self, mailbox: MailboxConfig) -> Self {
        self.mailbox = Some(mailbox);
        self
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    pub fn mailbox(&self) -> Option<MailboxConfig> {
        self.mailbox
    }

    pub fn message_types(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Dedicated handler first, then the fallback
    pub fn resolve(&self, kind: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(kind).or(self.fallback.as_ref())
    }

    /// `init` never reaches the fallback
    pub(crate) fn init_handler(&self) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(crate::message::INIT)
    }
}

impl fmt::Debug for ActorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorDefinition")
            .field("actor_type", &self.actor_type)
            .field("handlers", &self.message_types())
            .field("fallback", &self.fallback.is_some())
            .field("mailbox", &self.mailbox)
            .finish()
    }
}
