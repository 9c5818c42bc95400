use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor lifecycle
///
/// `created → initializing → ready ⇄ running → stopping → terminated`, with
/// `failed` entered from `initializing` or `running` and left by a restart
/// (back to `initializing`) or termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Created,
    Initializing,
    Ready,
    Running,
    Failed,
    Stopping,
    Terminated,
}

impl Lifecycle {
    /// Still accepts messages
    pub fn is_accepting(&self) -> bool {
        !matches!(self, Lifecycle::Stopping | Lifecycle::Terminated)
    }

    pub fn is_terminated(&self) -> bool {
        *self == Lifecycle::Terminated
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::Created => "created",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Ready => "ready",
            Lifecycle::Running => "running",
            Lifecycle::Failed => "failed",
            Lifecycle::Stopping => "stopping",
            Lifecycle::Terminated => "terminated",
        };
        f.write_str(name)
    }
}
