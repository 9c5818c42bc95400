//! Supervision
//!
//! A supervisor is an ordinary actor of the built-in [`SUPERVISOR`] type. Its
//! state is the [`SupervisorSpec`] plus a ledger of restart timestamps per
//! child; every decision is made while handling a `child_error` message.
//!
//! A child that already used `max_restarts` restarts inside the sliding
//! `restart_period` is killed for good. The supervisor then fails itself so
//! its own parent sees a `child_error`, or publishes [`SystemEvent::Fatal`]
//! when it has no parent.

use crate::context::ActorContext;
use crate::definition::{handler_fn, ActorDefinition};
use crate::error::{ActorError, ActorResult};
use crate::id::ActorId;
use crate::mailbox::{MailboxConfig, SendOutcome};
use crate::message::{ActorMessage, ChildError, Envelope, CHILD_ERROR};
use crate::system::{ActorSystem, SystemEvent};
use config::SupervisionSettings;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};

/// Actor type of the built-in supervisor
pub const SUPERVISOR: &str = "supervisor";

/// Asks a `simple_one_for_one` supervisor for another worker
pub const START_CHILD: &str = "start_child";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Restart only the failed child
    OneForOne,
    /// Restart every live child
    OneForAll,
    /// Restart the failed child and every child started after it
    RestForOne,
    /// Worker pool of `child_type`; restarts only the failed child
    SimpleOneForOne,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorSpec {
    pub strategy: Strategy,
    pub max_restarts: u32,
    pub restart_period_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_type: Option<String>,
}

impl SupervisorSpec {
    pub fn new(strategy: Strategy) -> Self {
        Self::from_settings(strategy, &SupervisionSettings::default())
    }

    pub fn from_settings(strategy: Strategy, settings: &SupervisionSettings) -> Self {
        Self {
            strategy,
            max_restarts: settings.max_restarts,
            restart_period_ms: settings.restart_period().as_millis() as u64,
            child_type: None,
        }
    }

    pub fn with_limits(mut self, max_restarts: u32, restart_period: Duration) -> Self {
        self.max_restarts = max_restarts;
        self.restart_period_ms = restart_period.as_millis() as u64;
        self
    }

    pub fn with_child_type(mut self, child_type: impl Into<String>) -> Self {
        self.child_type = Some(child_type.into());
        self
    }
}

impl ActorSystem {
    pub fn spawn_supervisor(
        &self,
        spec: SupervisorSpec,
        parent: Option<ActorId>,
    ) -> ActorResult<ActorId> {
        self.spawn(SUPERVISOR, json!({"spec": spec, "restarts": {}}), parent)
    }

    /// Ask a supervisor with a `child_type` to start another child
    pub fn start_child(&self, supervisor: ActorId, state: Value) -> ActorResult<SendOutcome> {
        self.send(
            supervisor,
            ActorMessage::new(START_CHILD, json!({"state": state})),
            None,
        )
    }
}

pub(crate) fn definition() -> ActorDefinition {
    ActorDefinition::new(SUPERVISOR)
        .on(CHILD_ERROR, handler_fn(on_child_error))
        .on(START_CHILD, handler_fn(on_start_child))
        .with_mailbox(MailboxConfig::unbounded())
}

fn spec_of(ctx: &ActorContext) -> ActorResult<SupervisorSpec> {
    serde_json::from_value(ctx.state()["spec"].clone())
        .map_err(|e| ActorError::handler(format!("invalid supervisor spec: {}", e)))
}

fn on_child_error(ctx: &mut ActorContext, envelope: Envelope) -> ActorResult<()> {
    let report: ChildError = serde_json::from_value(envelope.data)
        .map_err(|e| ActorError::handler(format!("malformed child_error: {}", e)))?;
    let spec = spec_of(ctx)?;
    let now = ctx.now_ms();
    let key = report.child.to_string();

    let mut history: Vec<u64> = ctx.state()["restarts"][key.as_str()]
        .as_array()
        .map(|stamps| stamps.iter().filter_map(Value::as_u64).collect())
        .unwrap_or_default();
    history.retain(|stamp| stamp + spec.restart_period_ms > now);

    if history.len() as u32 >= spec.max_restarts {
        return give_up(ctx, &spec, report, &key);
    }

    history.push(now);
    ctx.state_mut()["restarts"][key.as_str()] = json!(history);

    let targets = match spec.strategy {
        Strategy::OneForOne | Strategy::SimpleOneForOne => vec![report.child],
        Strategy::OneForAll => ctx.children(),
        Strategy::RestForOne => ctx
            .children()
            .into_iter()
            .skip_while(|child| *child != report.child)
            .collect(),
    };
    let targets = if targets.is_empty() {
        vec![report.child]
    } else {
        targets
    };

    info!(
        actor_id = %ctx.id(),
        child = %report.child,
        strategy = ?spec.strategy,
        restarts_in_window = history.len(),
        restarting = targets.len(),
        error = %report.error,
        "Supervisor restarting children"
    );
    for target in targets {
        if let Err(err) = ctx.restart(target) {
            warn!(actor_id = %ctx.id(), child = %target, error = %err, "Restart skipped");
        }
    }
    Ok(())
}

fn give_up(
    ctx: &mut ActorContext,
    spec: &SupervisorSpec,
    report: ChildError,
    key: &str,
) -> ActorResult<()> {
    if let Err(err) = ctx.kill(report.child) {
        warn!(actor_id = %ctx.id(), child = %report.child, error = %err, "Kill failed");
    }
    if let Some(restarts) = ctx.state_mut()["restarts"].as_object_mut() {
        restarts.remove(key);
    }

    let reason = format!(
        "{} ({}) exceeded {} restarts in {}ms: {}",
        report.child, report.actor_type, spec.max_restarts, spec.restart_period_ms, report.error
    );
    let supervisor = ctx.id();
    match ctx.supervisor() {
        Some(parent) => {
            warn!(
                actor_id = %supervisor,
                parent = %parent,
                child = %report.child,
                reason = %reason,
                "Restart limit reached, escalating"
            );
            ctx.system().publish(SystemEvent::Escalated {
                supervisor,
                child: report.child,
                error: reason.clone(),
            });
            Err(ActorError::Escalated {
                child: report.child,
                reason,
            })
        }
        None => {
            error!(
                actor_id = %supervisor,
                child = %report.child,
                reason = %reason,
                "Restart limit reached at root supervisor"
            );
            ctx.system().publish(SystemEvent::Fatal {
                supervisor,
                child: report.child,
                error: reason,
            });
            Ok(())
        }
    }
}

fn on_start_child(ctx: &mut ActorContext, envelope: Envelope) -> ActorResult<()> {
    let spec = spec_of(ctx)?;
    let Some(child_type) = spec.child_type else {
        warn!(actor_id = %ctx.id(), "start_child on a supervisor without child_type");
        return Ok(());
    };
    let state = envelope.data.get("state").cloned().unwrap_or(Value::Null);
    match ctx.spawn_child(&child_type, state) {
        Ok(child) => info!(actor_id = %ctx.id(), child = %child, child_type = %child_type, "Child started"),
        Err(err) => warn!(actor_id = %ctx.id(), child_type = %child_type, error = %err, "Child start failed"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_names() {
        assert_eq!(
            serde_json::to_value(Strategy::SimpleOneForOne).unwrap(),
            json!("simple_one_for_one")
        );
        let spec: SupervisorSpec = serde_json::from_value(json!({
            "strategy": "rest_for_one",
            "max_restarts": 1,
            "restart_period_ms": 1000
        }))
        .unwrap();
        assert_eq!(spec.strategy, Strategy::RestForOne);
        assert!(spec.child_type.is_none());
    }

    #[test]
    fn test_spec_defaults_follow_settings() {
        let spec = SupervisorSpec::new(Strategy::OneForOne);
        assert_eq!(spec.max_restarts, 3);
        assert_eq!(spec.restart_period_ms, 5000);
    }
}
