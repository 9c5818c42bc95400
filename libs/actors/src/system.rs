//! Actor System Core
//!
//! Owns every actor record, the registered [`ActorDefinition`]s, system-wide
//! metrics, the [`SystemEvent`] broadcast and the dead-letter buffer.
//!
//! Each actor is driven by exactly one Tokio task (its drain loop) which
//! owns the actor state. Everything else talks to it through the mailbox or
//! the control channel:
//!
//! ```text
//! send ──► Mailbox ──► drain loop ──► MessageHandler(ctx, envelope)
//!                         ▲    │
//!        restart/stop ────┘    └── failure ──► child_error ──► supervisor
//! ```
//!
//! Handler errors and panics never escape the drain loop. A supervised actor
//! parks in `failed` until its supervisor restarts or terminates it; an
//! unsupervised one terminates.

use crate::context::ActorContext;
use crate::definition::{ActorDefinition, MessageHandler};
use crate::error::{ActorError, ActorResult};
use crate::id::ActorId;
use crate::lifecycle::Lifecycle;
use crate::mailbox::{Mailbox, MailboxConfig, PushError, SendOutcome};
use crate::message::{ActorMessage, Envelope, CHILD_ERROR, INIT};
use config::MailboxSettings;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dead letters kept for inspection; older ones are discarded
pub const DEAD_LETTER_CAPACITY: usize = 1024;

const EVENT_CAPACITY: usize = 256;

/// System-wide counters
#[derive(Debug, Default)]
pub struct SystemMetrics {
    pub spawned: AtomicU64,
    pub terminated: AtomicU64,
    pub messages_processed: AtomicU64,
    pub handler_failures: AtomicU64,
    pub restarts: AtomicU64,
    pub dead_letters: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub spawned: u64,
    pub terminated: u64,
    pub messages_processed: u64,
    pub handler_failures: u64,
    pub restarts: u64,
    pub dead_letters: u64,
}

impl SystemMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            spawned: self.spawned.load(Ordering::Relaxed),
            terminated: self.terminated.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
            dead_letters: self.dead_letters.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    DroppedOldest,
    DroppedNewest,
    NoHandler,
    /// Still queued when the actor terminated
    Discarded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeadLetter {
    pub target: ActorId,
    pub reason: DeadLetterReason,
    pub envelope: Envelope,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SystemEvent {
    Spawned {
        id: ActorId,
        actor_type: String,
    },
    Failed {
        id: ActorId,
        error: String,
    },
    Restarted {
        id: ActorId,
        restart_count: u32,
    },
    Terminated {
        id: ActorId,
    },
    /// A supervisor gave up on `child` and re-raised to its own parent
    Escalated {
        supervisor: ActorId,
        child: ActorId,
        error: String,
    },
    /// A root supervisor gave up on `child`
    Fatal {
        supervisor: ActorId,
        child: ActorId,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorStatus {
    pub id: ActorId,
    pub actor_type: String,
    pub lifecycle: Lifecycle,
    pub restart_count: u32,
    pub mailbox_len: usize,
    pub supervisor: Option<ActorId>,
}

#[derive(Debug, Clone, Copy)]
enum Control {
    Restart,
    Stop,
}

struct ActorRecord {
    id: ActorId,
    actor_type: String,
    supervisor: Option<ActorId>,
    mailbox: Mailbox,
    control: mpsc::UnboundedSender<Control>,
    lifecycle: watch::Sender<Lifecycle>,
    restart_count: AtomicU32,
    start_seq: u64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActorRecord {
    fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Move to `next` unless the actor is already stopping or terminated
    fn advance(&self, next: Lifecycle) -> bool {
        self.lifecycle.send_if_modified(|current| {
            if current.is_accepting() && *current != next {
                *current = next;
                true
            } else {
                false
            }
        })
    }

    fn status(&self) -> ActorStatus {
        ActorStatus {
            id: self.id,
            actor_type: self.actor_type.clone(),
            lifecycle: self.lifecycle(),
            restart_count: self.restart_count.load(Ordering::Relaxed),
            mailbox_len: self.mailbox.len(),
            supervisor: self.supervisor,
        }
    }
}

struct Inner {
    actors: DashMap<ActorId, Arc<ActorRecord>>,
    definitions: DashMap<String, Arc<ActorDefinition>>,
    mailbox: MailboxSettings,
    metrics: SystemMetrics,
    events: broadcast::Sender<SystemEvent>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    next_start_seq: AtomicU64,
    epoch: tokio::time::Instant,
}

/// Cheaply cloneable handle to the actor runtime
#[derive(Clone)]
pub struct ActorSystem {
    inner: Arc<Inner>,
}

impl ActorSystem {
    /// New system whose actors default to `mailbox`; the built-in
    /// `supervisor` type is registered
    pub fn new(mailbox: MailboxSettings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let system = Self {
            inner: Arc::new(Inner {
                actors: DashMap::new(),
                definitions: DashMap::new(),
                mailbox,
                metrics: SystemMetrics::default(),
                events,
                dead_letters: Mutex::new(VecDeque::new()),
                next_start_seq: AtomicU64::new(0),
                epoch: tokio::time::Instant::now(),
            }),
        };
        system.register(crate::supervision::definition());
        system
    }

    /// Register (or replace) an actor type
    pub fn register(&self, definition: ActorDefinition) {
        let actor_type = definition.actor_type().to_string();
        debug!(actor_type = %actor_type, handlers = ?definition.message_types(), "Actor type registered");
        self.inner
            .definitions
            .insert(actor_type, Arc::new(definition));
    }

    pub fn actor_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .inner
            .definitions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        types.sort();
        types
    }

    pub fn spawn(
        &self,
        actor_type: &str,
        initial_state: Value,
        supervisor: Option<ActorId>,
    ) -> ActorResult<ActorId> {
        let definition = self
            .inner
            .definitions
            .get(actor_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ActorError::UnknownActorType(actor_type.to_string()))?;

        if let Some(supervisor) = supervisor {
            match self.record(supervisor) {
                Ok(record) if !record.lifecycle().is_terminated() => {}
                _ => return Err(ActorError::SupervisorNotFound(supervisor)),
            }
        }

        let id = ActorId::new();
        let mailbox_config = definition
            .mailbox()
            .unwrap_or_else(|| MailboxConfig::from(&self.inner.mailbox));
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (lifecycle, _) = watch::channel(Lifecycle::Created);

        let record = Arc::new(ActorRecord {
            id,
            actor_type: actor_type.to_string(),
            supervisor,
            mailbox: Mailbox::new(mailbox_config),
            control: control_tx,
            lifecycle,
            restart_count: AtomicU32::new(0),
            start_seq: self.inner.next_start_seq.fetch_add(1, Ordering::Relaxed),
            task: Mutex::new(None),
        });
        self.inner.actors.insert(id, record.clone());

        let runner = Runner {
            ctx: ActorContext::new(
                self.clone(),
                id,
                actor_type.to_string(),
                supervisor,
                initial_state.clone(),
            ),
            system: self.clone(),
            record: record.clone(),
            definition,
            initial: initial_state,
            control: control_rx,
        };
        let handle = tokio::spawn(runner.run());
        *record.task.lock() = Some(handle);

        self.inner.metrics.spawned.fetch_add(1, Ordering::Relaxed);
        self.publish(SystemEvent::Spawned {
            id,
            actor_type: actor_type.to_string(),
        });
        info!(
            actor_id = %id,
            actor_type = %actor_type,
            supervisor = ?supervisor.map(|s| s.to_string()),
            "Actor spawned"
        );
        Ok(id)
    }

    /// Enqueue `message` for `target` under its mailbox overflow policy
    pub fn send(
        &self,
        target: ActorId,
        message: ActorMessage,
        sender: Option<ActorId>,
    ) -> ActorResult<SendOutcome> {
        let id = format!("msg-{}", uuid::Uuid::new_v4().simple());
        self.deliver(target, id, message, sender)
    }

    pub(crate) fn deliver(
        &self,
        target: ActorId,
        envelope_id: String,
        message: ActorMessage,
        sender: Option<ActorId>,
    ) -> ActorResult<SendOutcome> {
        let record = self.record(target)?;
        if !record.lifecycle().is_accepting() {
            return Err(ActorError::NotRunning(target));
        }

        let envelope = Envelope::new(envelope_id, message, sender);
        match record.mailbox.push(envelope) {
            Ok(pushed) => {
                if let Some(dropped) = pushed.dropped {
                    let reason = match pushed.outcome {
                        SendOutcome::DroppedOldest => DeadLetterReason::DroppedOldest,
                        _ => DeadLetterReason::DroppedNewest,
                    };
                    warn!(
                        actor_id = %target,
                        envelope_id = %dropped.id,
                        element = %dropped.element,
                        outcome = ?pushed.outcome,
                        "Mailbox full, message dropped"
                    );
                    self.dead_letter(target, dropped, reason);
                }
                Ok(pushed.outcome)
            }
            Err(PushError::Full(capacity)) => {
                warn!(actor_id = %target, capacity, "Mailbox full, send rejected");
                Err(ActorError::MailboxFull {
                    actor: target,
                    capacity,
                })
            }
            Err(PushError::Closed) => Err(ActorError::NotRunning(target)),
        }
    }

    /// Close the mailbox; queued messages are processed before terminating
    pub fn stop(&self, id: ActorId) -> ActorResult<()> {
        let record = self.record(id)?;
        let stopping = record.lifecycle.send_if_modified(|current| {
            if current.is_accepting() {
                *current = Lifecycle::Stopping;
                true
            } else {
                false
            }
        });
        if stopping {
            record.mailbox.close();
            let _ = record.control.send(Control::Stop);
            info!(actor_id = %id, queued = record.mailbox.len(), "Actor stopping");
        }
        Ok(())
    }

    /// Terminate immediately, discarding queued messages
    pub fn kill(&self, id: ActorId) -> ActorResult<()> {
        let record = self.record(id)?;
        if record.lifecycle().is_terminated() {
            return Ok(());
        }
        if let Some(task) = record.task.lock().take() {
            task.abort();
        }
        self.finish(&record, "killed");
        Ok(())
    }

    /// Reset state and replay `init`; queued messages are kept
    pub fn restart(&self, id: ActorId) -> ActorResult<()> {
        let record = self.record(id)?;
        if !record.lifecycle().is_accepting() {
            return Err(ActorError::NotRunning(id));
        }
        record
            .control
            .send(Control::Restart)
            .map_err(|_| ActorError::NotRunning(id))
    }

    pub fn status(&self, id: ActorId) -> ActorResult<ActorStatus> {
        Ok(self.record(id)?.status())
    }

    pub fn lifecycle(&self, id: ActorId) -> ActorResult<Lifecycle> {
        Ok(self.record(id)?.lifecycle())
    }

    pub fn restart_count(&self, id: ActorId) -> ActorResult<u32> {
        Ok(self.record(id)?.restart_count.load(Ordering::Relaxed))
    }

    pub fn supervisor_of(&self, id: ActorId) -> ActorResult<Option<ActorId>> {
        Ok(self.record(id)?.supervisor)
    }

    /// Live children of `supervisor` in start order
    pub fn children(&self, supervisor: ActorId) -> Vec<ActorId> {
        let mut children: Vec<(u64, ActorId)> = self
            .inner
            .actors
            .iter()
            .filter(|entry| {
                entry.supervisor == Some(supervisor) && !entry.lifecycle().is_terminated()
            })
            .map(|entry| (entry.start_seq, entry.id))
            .collect();
        children.sort_unstable();
        children.into_iter().map(|(_, id)| id).collect()
    }

    /// Actors not yet terminated
    pub fn live_count(&self) -> usize {
        self.inner
            .actors
            .iter()
            .filter(|entry| !entry.lifecycle().is_terminated())
            .count()
    }

    /// Resolve once `id` reaches `target`; fails with `NotRunning` if the
    /// actor terminates first
    pub async fn wait_for(&self, id: ActorId, target: Lifecycle) -> ActorResult<()> {
        let mut updates = self.record(id)?.lifecycle.subscribe();
        loop {
            let current = *updates.borrow_and_update();
            if current == target {
                return Ok(());
            }
            if current.is_terminated() {
                return Err(ActorError::NotRunning(id));
            }
            updates
                .changed()
                .await
                .map_err(|_| ActorError::NotRunning(id))?;
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Most recent dead letters, oldest first
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.lock().iter().cloned().collect()
    }

    /// Forget terminated actors; returns how many were removed
    pub fn prune_terminated(&self) -> usize {
        let before = self.inner.actors.len();
        self.inner
            .actors
            .retain(|_, record| !record.lifecycle().is_terminated());
        before - self.inner.actors.len()
    }

    /// Kill every live actor
    pub fn shutdown(&self) {
        let live: Vec<ActorId> = self
            .inner
            .actors
            .iter()
            .filter(|entry| !entry.lifecycle().is_terminated())
            .map(|entry| entry.id)
            .collect();
        info!(actors = live.len(), "Actor system shutting down");
        for id in live {
            let _ = self.kill(id);
        }
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.inner.epoch.elapsed().as_millis() as u64
    }

    pub(crate) fn publish(&self, event: SystemEvent) {
        // No subscribers is fine
        let _ = self.inner.events.send(event);
    }

    fn record(&self, id: ActorId) -> ActorResult<Arc<ActorRecord>> {
        self.inner
            .actors
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(ActorError::ActorNotFound(id))
    }

    fn dead_letter(&self, target: ActorId, envelope: Envelope, reason: DeadLetterReason) {
        self.inner.metrics.dead_letters.fetch_add(1, Ordering::Relaxed);
        let mut letters = self.inner.dead_letters.lock();
        if letters.len() >= DEAD_LETTER_CAPACITY {
            letters.pop_front();
        }
        letters.push_back(DeadLetter {
            target,
            reason,
            envelope,
        });
    }

    fn finish(&self, record: &ActorRecord, reason: &str) {
        record.mailbox.close();
        let previous = record.lifecycle.send_replace(Lifecycle::Terminated);
        for envelope in record.mailbox.take_all() {
            self.dead_letter(record.id, envelope, DeadLetterReason::Discarded);
        }
        if !previous.is_terminated() {
            self.inner.metrics.terminated.fetch_add(1, Ordering::Relaxed);
            self.publish(SystemEvent::Terminated { id: record.id });
            info!(
                actor_id = %record.id,
                actor_type = %record.actor_type,
                reason,
                "Actor terminated"
            );
        }
    }
}

impl Default for ActorSystem {
    fn default() -> Self {
        Self::new(MailboxSettings::default())
    }
}

enum Phase {
    Init,
    Drain,
    Failed(String),
    Restart,
}

enum Wake {
    Control(Option<Control>),
    Envelope(Option<Envelope>),
}

/// The drain loop of one actor
struct Runner {
    system: ActorSystem,
    record: Arc<ActorRecord>,
    definition: Arc<ActorDefinition>,
    initial: Value,
    control: mpsc::UnboundedReceiver<Control>,
    ctx: ActorContext,
}

impl Runner {
    async fn run(mut self) {
        let mut phase = Phase::Init;
        loop {
            phase = match phase {
                Phase::Init => self.initialize().await,
                Phase::Drain => match self.drain().await {
                    Some(next) => next,
                    None => return,
                },
                Phase::Failed(error) => match self.await_supervisor(error).await {
                    Some(next) => next,
                    None => return,
                },
                Phase::Restart => {
                    self.reset();
                    Phase::Init
                }
            };
        }
    }

    async fn initialize(&mut self) -> Phase {
        self.record.advance(Lifecycle::Initializing);
        if let Some(handler) = self.definition.init_handler().cloned() {
            let envelope = Envelope::new(
                format!("{}_{}", self.record.id, INIT),
                ActorMessage::new(INIT, self.initial.clone()),
                None,
            );
            if let Err(error) = self.invoke(&handler, envelope).await {
                return Phase::Failed(error);
            }
        }
        self.record.advance(Lifecycle::Ready);
        Phase::Drain
    }

    async fn drain(&mut self) -> Option<Phase> {
        loop {
            let wake = tokio::select! {
                biased;
                control = self.control.recv() => Wake::Control(control),
                envelope = self.record.mailbox.recv() => Wake::Envelope(envelope),
            };

            match wake {
                Wake::Control(Some(Control::Restart)) => return Some(Phase::Restart),
                // Mailbox is already closed; keep draining
                Wake::Control(Some(Control::Stop)) => {}
                Wake::Control(None) => return None,
                Wake::Envelope(Some(envelope)) => {
                    if let Err(error) = self.handle(envelope).await {
                        return Some(Phase::Failed(error));
                    }
                }
                Wake::Envelope(None) => {
                    self.system.finish(&self.record, "stopped");
                    return None;
                }
            }
        }
    }

    async fn handle(&mut self, envelope: Envelope) -> Result<(), String> {
        let handler = match self.definition.resolve(&envelope.element) {
            Some(handler) => handler.clone(),
            None => {
                warn!(
                    actor_id = %self.record.id,
                    element = %envelope.element,
                    "No handler for message type"
                );
                self.system
                    .dead_letter(self.record.id, envelope, DeadLetterReason::NoHandler);
                return Ok(());
            }
        };

        self.record.advance(Lifecycle::Running);
        let element = envelope.element.clone();
        let started = Instant::now();
        let result = self.invoke(&handler, envelope).await;

        self.system
            .inner
            .metrics
            .messages_processed
            .fetch_add(1, Ordering::Relaxed);
        debug!(
            actor_id = %self.record.id,
            element = %element,
            duration_ms = started.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "Message handled"
        );
        if result.is_ok() {
            self.record.advance(Lifecycle::Ready);
        }
        result
    }

    async fn invoke(
        &mut self,
        handler: &Arc<dyn MessageHandler>,
        envelope: Envelope,
    ) -> Result<(), String> {
        self.ctx.begin(&envelope.id);
        match AssertUnwindSafe(handler.handle(&mut self.ctx, envelope))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err.to_string()),
            Err(panic) => Err(format!("handler panicked: {}", panic_message(&*panic))),
        }
    }

    /// Report to the supervisor and park until it decides
    async fn await_supervisor(&mut self, error: String) -> Option<Phase> {
        let id = self.record.id;
        self.system
            .inner
            .metrics
            .handler_failures
            .fetch_add(1, Ordering::Relaxed);

        if !self.record.advance(Lifecycle::Failed) {
            self.system.finish(&self.record, "failed while stopping");
            return None;
        }
        self.system.publish(SystemEvent::Failed {
            id,
            error: error.clone(),
        });

        let Some(supervisor) = self.record.supervisor else {
            warn!(actor_id = %id, actor_type = %self.record.actor_type, error = %error, "Unsupervised actor failed");
            self.system.finish(&self.record, "failed without supervisor");
            return None;
        };

        let restart_count = self.record.restart_count.load(Ordering::Relaxed);
        warn!(
            actor_id = %id,
            actor_type = %self.record.actor_type,
            supervisor = %supervisor,
            restart_count,
            error = %error,
            "Actor failed, reporting to supervisor"
        );
        let report = ActorMessage::new(
            CHILD_ERROR,
            json!({
                "child": id,
                "actor_type": self.record.actor_type,
                "error": error,
                "restart_count": restart_count,
            }),
        );
        let envelope_id = format!("{}_{}_{}", id, CHILD_ERROR, restart_count);
        if let Err(err) = self.system.deliver(supervisor, envelope_id, report, Some(id)) {
            warn!(actor_id = %id, supervisor = %supervisor, error = %err, "Supervisor unreachable");
            self.system.finish(&self.record, "supervisor unreachable");
            return None;
        }

        match self.control.recv().await {
            Some(Control::Restart) => Some(Phase::Restart),
            Some(Control::Stop) | None => {
                self.system.finish(&self.record, "stopped while failed");
                None
            }
        }
    }

    fn reset(&mut self) {
        self.ctx.set_state(self.initial.clone());
        let restart_count = self.record.restart_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.system
            .inner
            .metrics
            .restarts
            .fetch_add(1, Ordering::Relaxed);
        self.system.publish(SystemEvent::Restarted {
            id: self.record.id,
            restart_count,
        });
        info!(
            actor_id = %self.record.id,
            actor_type = %self.record.actor_type,
            restart_count,
            queued = self.record.mailbox.len(),
            "Actor restarted"
        );
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
