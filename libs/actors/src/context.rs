//! Handler-side view of the actor system

use crate::error::ActorResult;
use crate::id::ActorId;
use crate::mailbox::SendOutcome;
use crate::message::ActorMessage;
use crate::system::ActorSystem;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// Passed to every handler invocation. Owns the actor's state for the
/// lifetime of the drain task.
pub struct ActorContext {
    system: ActorSystem,
    id: ActorId,
    actor_type: String,
    supervisor: Option<ActorId>,
    state: Value,
    current: String,
    calls: u32,
}

impl ActorContext {
    pub(crate) fn new(
        system: ActorSystem,
        id: ActorId,
        actor_type: String,
        supervisor: Option<ActorId>,
        state: Value,
    ) -> Self {
        Self {
            system,
            id,
            actor_type,
            supervisor,
            state,
            current: id.to_string(),
            calls: 0,
        }
    }

    /// Start numbering nested calls under `envelope_id`
    pub(crate) fn begin(&mut self, envelope_id: &str) {
        self.current.clear();
        self.current.push_str(envelope_id);
        self.calls = 0;
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn actor_type(&self) -> &str {
        &self.actor_type
    }

    pub fn supervisor(&self) -> Option<ActorId> {
        self.supervisor
    }

    pub fn system(&self) -> &ActorSystem {
        &self.system
    }

    pub fn state(&self) -> &Value {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Value {
        &mut self.state
    }

    pub fn set_state(&mut self, state: Value) {
        self.state = state;
    }

    /// Milliseconds on the system clock; follows paused tokio time
    pub fn now_ms(&self) -> u64 {
        self.system.now_ms()
    }

    fn next_call_id(&mut self) -> String {
        self.calls += 1;
        format!("{}_call_{}", self.current, self.calls)
    }

    /// Send from this actor; the envelope id nests under the message being handled
    pub fn send(
        &mut self,
        target: ActorId,
        kind: impl Into<String>,
        data: Value,
    ) -> ActorResult<SendOutcome> {
        let id = self.next_call_id();
        self.system
            .deliver(target, id, ActorMessage::new(kind, data), Some(self.id))
    }

    pub fn spawn(
        &self,
        actor_type: &str,
        state: Value,
        supervisor: Option<ActorId>,
    ) -> ActorResult<ActorId> {
        self.system.spawn(actor_type, state, supervisor)
    }

    /// Spawn an actor supervised by this one
    pub fn spawn_child(&self, actor_type: &str, state: Value) -> ActorResult<ActorId> {
        self.system.spawn(actor_type, state, Some(self.id))
    }

    pub fn stop(&self, target: ActorId) -> ActorResult<()> {
        self.system.stop(target)
    }

    pub fn kill(&self, target: ActorId) -> ActorResult<()> {
        self.system.kill(target)
    }

    pub fn restart(&self, target: ActorId) -> ActorResult<()> {
        self.system.restart(target)
    }

    /// Live children of this actor in start order
    pub fn children(&self) -> Vec<ActorId> {
        self.system.children(self.id)
    }

    /// Deliver a message after `delay`; failures at delivery time are logged
    pub fn schedule(
        &mut self,
        target: ActorId,
        kind: impl Into<String>,
        data: Value,
        delay: Duration,
    ) -> JoinHandle<()> {
        let id = self.next_call_id();
        let system = self.system.clone();
        let sender = self.id;
        let message = ActorMessage::new(kind, data);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = system.deliver(target, id, message, Some(sender)) {
                warn!(actor_id = %sender, target = %target, error = %err, "Scheduled message not delivered");
            }
        })
    }
}
