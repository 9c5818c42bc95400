//! Actor runtime errors

use crate::id::ActorId;
use thiserror::Error;
use types::{ErrorCategory, RuntimeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActorError {
    #[error("Actor not found: {0}")]
    ActorNotFound(ActorId),

    #[error("Mailbox full for {actor} (capacity {capacity})")]
    MailboxFull { actor: ActorId, capacity: usize },

    /// Target is stopping or terminated
    #[error("Actor {0} is not running")]
    NotRunning(ActorId),

    #[error("Unknown actor type: {0}")]
    UnknownActorType(String),

    #[error("Supervisor not found: {0}")]
    SupervisorNotFound(ActorId),

    /// Handler returned an error
    #[error("Handler error: {0}")]
    Handler(String),

    /// Supervisor gave up on a child and re-raises to its own parent
    #[error("Escalated from {child}: {reason}")]
    Escalated { child: ActorId, reason: String },
}

impl ActorError {
    pub fn handler(message: impl Into<String>) -> Self {
        ActorError::Handler(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            ActorError::ActorNotFound(_)
            | ActorError::UnknownActorType(_)
            | ActorError::SupervisorNotFound(_)
            | ActorError::NotRunning(_) => ErrorCategory::Client,
            ActorError::MailboxFull { .. }
            | ActorError::Handler(_)
            | ActorError::Escalated { .. } => ErrorCategory::Server,
        }
    }
}

impl From<ActorError> for RuntimeError {
    fn from(err: ActorError) -> Self {
        match err {
            ActorError::MailboxFull { actor, capacity } => RuntimeError::resource_exhausted(
                format!("mailbox:{}", actor),
                format!("capacity {} reached", capacity),
            ),
            ActorError::Handler(message) => RuntimeError::handler_failed("", message),
            ActorError::Escalated { child, reason } => {
                RuntimeError::handler_failed(child.to_string(), reason)
            }
            other => RuntimeError::invalid_atom(other.to_string()),
        }
    }
}

pub type ActorResult<T> = std::result::Result<T, ActorError>;
