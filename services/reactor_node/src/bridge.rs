//! Coordination handlers
//!
//! Exposes the node's actor system and pipeline registry to atoms in the
//! `co` group, so remote callers reach actors and pipelines through the same
//! wire protocol as any other handler.
//!
//! | element              | data                                            | result                 |
//! |----------------------|-------------------------------------------------|------------------------|
//! | `actor_spawn`        | `{type, state?, supervisor?}`                   | `{actor_id}`           |
//! | `actor_send`         | `{actor_id, type, data?}`                       | `{outcome}`            |
//! | `actor_status`       | `{actor_id}`                                    | actor status           |
//! | `actor_stop`         | `{actor_id}`                                    | `{actor_id}`           |
//! | `supervisor_spawn`   | `{strategy, child_type?, parent?, max_restarts?, restart_period_s?}` | `{actor_id}` |
//! | `pipeline_register`  | `{pipeline}`                                    | `{id, replaced}`       |
//! | `pipeline_run`       | `{id, input?}`                                  | pipeline result        |

use actors::{ActorId, ActorMessage, ActorSystem, Strategy, SupervisorSpec};
use anyhow::{anyhow, Context};
use config::SupervisionSettings;
use pipeline::{Pipeline, PipelineRegistry};
use reactor::{handler_fn, AtomExecutor, HandlerMetadata, Reactor};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use std::time::Duration;
use types::{Atom, PacketGroup};

pub const ACTOR_SPAWN: &str = "actor_spawn";
pub const ACTOR_SEND: &str = "actor_send";
pub const ACTOR_STATUS: &str = "actor_status";
pub const ACTOR_STOP: &str = "actor_stop";
pub const SUPERVISOR_SPAWN: &str = "supervisor_spawn";
pub const PIPELINE_REGISTER: &str = "pipeline_register";
pub const PIPELINE_RUN: &str = "pipeline_run";

#[derive(Deserialize)]
struct SpawnRequest {
    #[serde(rename = "type")]
    actor_type: String,
    #[serde(default)]
    state: Value,
    #[serde(default)]
    supervisor: Option<ActorId>,
}

#[derive(Deserialize)]
struct SendRequest {
    actor_id: ActorId,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct ActorRef {
    actor_id: ActorId,
}

#[derive(Deserialize)]
struct SupervisorRequest {
    strategy: Strategy,
    #[serde(default)]
    child_type: Option<String>,
    #[serde(default)]
    parent: Option<ActorId>,
    #[serde(default)]
    max_restarts: Option<u32>,
    #[serde(default)]
    restart_period_s: Option<u64>,
}

#[derive(Deserialize)]
struct RegisterPipeline {
    pipeline: Pipeline,
}

#[derive(Deserialize)]
struct RunPipeline {
    id: String,
    #[serde(default)]
    input: Value,
}

fn parse<T: DeserializeOwned>(atom: &Atom) -> anyhow::Result<T> {
    serde_json::from_value(atom.data.clone())
        .with_context(|| format!("invalid {} request", atom.key()))
}

/// Register the `co:actor_*` and `co:supervisor_spawn` handlers
pub fn install_actor_bridge(
    reactor: &Reactor,
    actors: ActorSystem,
    supervision: SupervisionSettings,
) -> types::Result<()> {
    let system = actors.clone();
    reactor.register(
        PacketGroup::CO,
        ACTOR_SPAWN,
        handler_fn(move |atom: Atom| {
            let system = system.clone();
            async move {
                let request: SpawnRequest = parse(&atom)?;
                let id = system.spawn(&request.actor_type, request.state, request.supervisor)?;
                Ok(json!({"actor_id": id}))
            }
        }),
        HandlerMetadata::new("Spawn an actor of a registered type"),
    )?;

    let system = actors.clone();
    reactor.register(
        PacketGroup::CO,
        ACTOR_SEND,
        handler_fn(move |atom: Atom| {
            let system = system.clone();
            async move {
                let request: SendRequest = parse(&atom)?;
                let outcome = system.send(
                    request.actor_id,
                    ActorMessage::new(request.kind, request.data),
                    None,
                )?;
                Ok(json!({"outcome": outcome}))
            }
        }),
        HandlerMetadata::new("Send a message to an actor mailbox"),
    )?;

    let system = actors.clone();
    reactor.register(
        PacketGroup::CO,
        ACTOR_STATUS,
        handler_fn(move |atom: Atom| {
            let system = system.clone();
            async move {
                let request: ActorRef = parse(&atom)?;
                Ok(serde_json::to_value(system.status(request.actor_id)?)?)
            }
        }),
        HandlerMetadata::new("Lifecycle, restart count and mailbox depth of an actor"),
    )?;

    let system = actors.clone();
    reactor.register(
        PacketGroup::CO,
        ACTOR_STOP,
        handler_fn(move |atom: Atom| {
            let system = system.clone();
            async move {
                let request: ActorRef = parse(&atom)?;
                system.stop(request.actor_id)?;
                Ok(json!({"actor_id": request.actor_id}))
            }
        }),
        HandlerMetadata::new("Drain and stop an actor"),
    )?;

    let system = actors;
    reactor.register(
        PacketGroup::CO,
        SUPERVISOR_SPAWN,
        handler_fn(move |atom: Atom| {
            let system = system.clone();
            let defaults = supervision.clone();
            async move {
                let request: SupervisorRequest = parse(&atom)?;
                let mut spec = SupervisorSpec::from_settings(request.strategy, &defaults);
                if request.max_restarts.is_some() || request.restart_period_s.is_some() {
                    let max_restarts = request.max_restarts.unwrap_or(spec.max_restarts);
                    let period = request
                        .restart_period_s
                        .map(Duration::from_secs)
                        .unwrap_or_else(|| defaults.restart_period());
                    spec = spec.with_limits(max_restarts, period);
                }
                if let Some(child_type) = request.child_type {
                    spec = spec.with_child_type(child_type);
                }
                let id = system.spawn_supervisor(spec, request.parent)?;
                Ok(json!({"actor_id": id}))
            }
        }),
        HandlerMetadata::new("Spawn a supervisor with a restart strategy"),
    )?;

    Ok(())
}

/// Register `co:pipeline_register` and `co:pipeline_run`.
///
/// Handlers hold the registry weakly: it usually executes through this same
/// reactor, which owns the handlers. `pipeline_run` is detached so its steps
/// can take permits on this reactor, and its budget is the calling atom's
/// `timeout_s` less a second.
pub fn install_pipeline_bridge<E>(
    reactor: &Reactor,
    pipelines: Weak<PipelineRegistry<E>>,
) -> types::Result<()>
where
    E: AtomExecutor + 'static,
{
    let registry = pipelines.clone();
    reactor.register(
        PacketGroup::CO,
        PIPELINE_REGISTER,
        handler_fn(move |atom: Atom| {
            let registry = registry.clone();
            async move {
                let request: RegisterPipeline = parse(&atom)?;
                let registry = upgrade(&registry)?;
                let id = request.pipeline.id.clone();
                let replaced = registry.register(request.pipeline)?;
                Ok(json!({"id": id, "replaced": replaced}))
            }
        }),
        HandlerMetadata::new("Store a named pipeline definition"),
    )?;

    reactor.register(
        PacketGroup::CO,
        PIPELINE_RUN,
        handler_fn(move |atom: Atom| {
            let registry = pipelines.clone();
            async move {
                let request: RunPipeline = parse(&atom)?;
                let registry = upgrade(&registry)?;
                // Leave a second for the reply so the run ends with its own result
                let budget = atom.timeout_s.saturating_sub(1).max(1);
                let result = registry
                    .execute_within(&request.id, request.input, budget)
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
        }),
        HandlerMetadata::new("Run a registered pipeline").detached(),
    )?;

    Ok(())
}

fn upgrade<E>(registry: &Weak<PipelineRegistry<E>>) -> anyhow::Result<Arc<PipelineRegistry<E>>> {
    registry
        .upgrade()
        .ok_or_else(|| anyhow!("pipeline registry is shut down"))
}
