//! Reactor Core
//!
//! Owns a [`HandlerRegistry`], a concurrency semaphore and statistics.
//! `process` is the only entry point for running atoms; every outcome,
//! success or failure, is counted.

use crate::builtins;
use crate::executor::{AtomExecutor, ProcessOutcome};
use crate::handler::{AtomHandler, HandlerMetadata};
use crate::registry::{HandlerInfo, HandlerRegistry};
use crate::stats::{GaugeGuard, ReactorStats, StatsSnapshot};
use async_trait::async_trait;
use config::{OverflowPolicy, ReactorSettings};
use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};
use types::{Atom, PacketGroup, Result, RuntimeError};

/// Handler host executing atoms under a concurrency bound
pub struct Reactor {
    id: String,
    name: String,
    registry: Arc<HandlerRegistry>,
    stats: Arc<ReactorStats>,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    policy: OverflowPolicy,
    retry_after: Duration,
}

/// Aborts the handler task if `process` is dropped mid-flight
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Reactor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, settings: &ReactorSettings) -> Self {
        let max_concurrent = settings.max_concurrent_packets.max(1);
        let reactor = Self {
            id: id.into(),
            name: name.into(),
            registry: Arc::new(HandlerRegistry::new()),
            stats: Arc::new(ReactorStats::default()),
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            policy: settings.overflow,
            retry_after: settings.retry_after(),
        };
        builtins::install(&reactor);
        reactor
    }

    /// Reactor with default settings, named after its id
    pub fn with_defaults(id: impl Into<String>) -> Self {
        let id = id.into();
        Self::new(id.clone(), id, &ReactorSettings::default())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub(crate) fn stats_handle(&self) -> &Arc<ReactorStats> {
        &self.stats
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Current load as a percentage of the concurrency bound
    pub fn load(&self) -> u8 {
        load_percent(&self.stats, self.max_concurrent)
    }

    pub fn register(
        &self,
        group: PacketGroup,
        element: impl Into<String>,
        handler: Arc<dyn AtomHandler>,
        metadata: HandlerMetadata,
    ) -> Result<()> {
        self.registry.register(group, element, handler, metadata)
    }

    pub fn hot_swap(
        &self,
        group: PacketGroup,
        element: impl Into<String>,
        handler: Arc<dyn AtomHandler>,
        metadata: HandlerMetadata,
    ) -> bool {
        self.registry.hot_swap(group, element, handler, metadata)
    }

    pub fn unregister(&self, group: PacketGroup, element: &str) -> bool {
        self.registry.unregister(group, element)
    }

    pub fn handlers(&self) -> Vec<HandlerInfo> {
        self.registry.list()
    }

    /// Execute one atom against its registered handler
    pub async fn process(&self, atom: Atom) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let atom_id = atom.id.clone();
        let key = atom.key();

        let result = self.run(atom, started).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        self.stats.record(duration_ms, result.is_err());

        match result {
            Ok(value) => {
                debug!(
                    reactor_id = %self.id,
                    atom_id = %atom_id,
                    handler = %key,
                    duration_ms,
                    "Atom processed"
                );
                Ok(ProcessOutcome {
                    atom_id,
                    result: value,
                    duration_ms,
                })
            }
            Err(err) => {
                match &err {
                    RuntimeError::Timeout { .. } | RuntimeError::ResourceExhausted { .. } => warn!(
                        reactor_id = %self.id,
                        atom_id = %atom_id,
                        handler = %key,
                        duration_ms,
                        error = %err,
                        "Atom not completed"
                    ),
                    _ => debug!(
                        reactor_id = %self.id,
                        atom_id = %atom_id,
                        handler = %key,
                        duration_ms,
                        error = %err,
                        "Atom failed"
                    ),
                }
                Err(err)
            }
        }
    }

    async fn run(&self, atom: Atom, started: Instant) -> Result<serde_json::Value> {
        atom.validate()?;

        let entry = self
            .registry
            .lookup(atom.group, &atom.element)
            .ok_or_else(|| RuntimeError::unsupported(atom.group, atom.element.clone()))?;

        let deadline = Duration::from_secs(match entry.metadata.timeout_s {
            Some(cap) => cap.min(atom.timeout_s),
            None => atom.timeout_s,
        });
        let deadline_at = started.checked_add(deadline).ok_or_else(|| {
            RuntimeError::invalid_atom(format!(
                "atom {} deadline of {}s is not representable",
                atom.id, atom.timeout_s
            ))
        })?;

        let _permit = if entry.metadata.detached {
            None
        } else {
            Some(self.acquire_permit(&atom, deadline_at, deadline).await?)
        };
        let _in_flight = GaugeGuard::new(&self.stats.in_flight);

        let atom_id = atom.id.clone();
        let operation = format!("{} handler", atom.key());
        let handler = entry.handler;
        let mut task = AbortOnDrop(tokio::spawn(async move { handler.handle(atom).await }));

        match tokio::time::timeout_at(deadline_at, &mut task.0).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(RuntimeError::handler_failed(atom_id, format!("{:#}", err))),
            Ok(Err(join_err)) if join_err.is_panic() => Err(RuntimeError::handler_failed(
                atom_id,
                format!("handler panicked: {}", panic_message(join_err.into_panic())),
            )),
            Ok(Err(_)) => Err(RuntimeError::handler_failed(atom_id, "handler task cancelled")),
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                Err(RuntimeError::timeout(operation, deadline))
            }
        }
    }

    async fn acquire_permit(
        &self,
        atom: &Atom,
        deadline_at: Instant,
        deadline: Duration,
    ) -> Result<OwnedSemaphorePermit> {
        match self.policy {
            OverflowPolicy::Reject => match self.permits.clone().try_acquire_owned() {
                Ok(permit) => Ok(permit),
                Err(TryAcquireError::NoPermits) => {
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    Err(RuntimeError::resource_exhausted_retry_after(
                        format!("reactor {}", self.id),
                        format!("{} concurrent packets in flight", self.max_concurrent),
                        self.retry_after,
                    ))
                }
                Err(TryAcquireError::Closed) => Err(closed(&self.id)),
            },
            OverflowPolicy::Block => {
                let _waiting = GaugeGuard::new(&self.stats.waiting);
                match tokio::time::timeout_at(deadline_at, self.permits.clone().acquire_owned())
                    .await
                {
                    Ok(Ok(permit)) => Ok(permit),
                    Ok(Err(_)) => Err(closed(&self.id)),
                    Err(_) => {
                        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                        Err(RuntimeError::timeout(
                            format!("{} waiting for permit", atom.key()),
                            deadline,
                        ))
                    }
                }
            }
        }
    }
}

fn closed(id: &str) -> RuntimeError {
    RuntimeError::resource_exhausted(format!("reactor {}", id), "reactor is shutting down")
}

pub(crate) fn load_percent(stats: &ReactorStats, max_concurrent: usize) -> u8 {
    let in_flight = stats.in_flight.load(Ordering::Relaxed);
    ((in_flight * 100) / max_concurrent.max(1) as u64).min(100) as u8
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[async_trait]
impl AtomExecutor for Reactor {
    async fn execute(&self, atom: Atom) -> Result<ProcessOutcome> {
        self.process(atom).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use serde_json::json;

    fn settings(max: usize, overflow: OverflowPolicy) -> ReactorSettings {
        ReactorSettings {
            max_concurrent_packets: max,
            overflow,
            retry_after_ms: 250,
            ..ReactorSettings::default()
        }
    }

    #[tokio::test]
    async fn test_unknown_key_is_unsupported() {
        let reactor = Reactor::with_defaults("r1");
        let err = reactor
            .process(Atom::new("a1", PacketGroup::DF, "missing", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err, RuntimeError::unsupported("df", "missing"));
        assert_eq!(reactor.stats().errors, 1);
        assert_eq!(reactor.stats().processed, 1);
    }

    #[tokio::test]
    async fn test_invalid_atom_is_client_error() {
        let reactor = Reactor::with_defaults("r1");
        let err = reactor
            .process(Atom::new("a1", PacketGroup::CF, "ping", json!({})).with_priority(0))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidAtom { .. }));
    }

    #[tokio::test]
    async fn test_oversized_timeout_rejected_without_panic() {
        let reactor = Reactor::with_defaults("r1");
        for timeout_s in [u64::MAX, types::MAX_TIMEOUT_S + 1] {
            let err = reactor
                .process(Atom::new("a1", PacketGroup::CF, "ping", json!({})).with_timeout(timeout_s))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "invalid_atom");
        }
        assert_eq!(reactor.stats().errors, 2);

        assert!(reactor
            .process(
                Atom::new("a2", PacketGroup::CF, "ping", json!({}))
                    .with_timeout(types::MAX_TIMEOUT_S)
            )
            .await
            .is_ok());
    }

    fn nesting_handler(reactor: &Arc<Reactor>) -> Arc<dyn AtomHandler> {
        let weak = Arc::downgrade(reactor);
        handler_fn(move |atom: Atom| {
            let weak = weak.clone();
            async move {
                let reactor = weak.upgrade().ok_or_else(|| anyhow::anyhow!("reactor gone"))?;
                // Shorter than the caller so a starved call fails inside the handler
                let nested = atom.child(1);
                let nested = Atom::new(nested.id, PacketGroup::CF, "ping", json!({"echo": "in"}))
                    .with_timeout(1);
                Ok(reactor.process(nested).await?.result)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_handler_can_nest_on_single_permit() {
        let reactor = Arc::new(Reactor::new("r1", "r1", &settings(1, OverflowPolicy::Block)));
        reactor
            .register(
                PacketGroup::CO,
                "nest",
                nesting_handler(&reactor),
                HandlerMetadata::new("Nested ping").detached(),
            )
            .unwrap();
        reactor
            .register(
                PacketGroup::CO,
                "nest_bound",
                nesting_handler(&reactor),
                HandlerMetadata::new("Nested ping holding a permit"),
            )
            .unwrap();

        let outcome = reactor
            .process(Atom::new("a1", PacketGroup::CO, "nest", json!({})).with_timeout(2))
            .await
            .unwrap();
        assert_eq!(outcome.result["echo"], "in");

        // Holding the only permit starves the nested call
        let err = reactor
            .process(Atom::new("a2", PacketGroup::CO, "nest_bound", json!({})).with_timeout(2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "handler_failed");
        assert!(err.to_string().contains("waiting for permit"));
        assert_eq!(reactor.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_handler_error_becomes_handler_failed() {
        let reactor = Reactor::with_defaults("r1");
        reactor
            .register(
                PacketGroup::DF,
                "fail",
                handler_fn(|_atom| async { Err(anyhow::anyhow!("bad input")) }),
                HandlerMetadata::default(),
            )
            .unwrap();

        let err = reactor
            .process(Atom::new("a1", PacketGroup::DF, "fail", json!(null)))
            .await
            .unwrap_err();
        assert_eq!(err, RuntimeError::handler_failed("a1", "bad input"));
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let reactor = Reactor::with_defaults("r1");
        reactor
            .register(
                PacketGroup::MC,
                "explode",
                handler_fn(|_atom| async { panic!("kaboom") }),
                HandlerMetadata::default(),
            )
            .unwrap();

        let err = reactor
            .process(Atom::new("a1", PacketGroup::MC, "explode", json!(null)))
            .await
            .unwrap_err();
        match err {
            RuntimeError::HandlerFailed { message, .. } => assert!(message.contains("kaboom")),
            other => panic!("unexpected {other:?}"),
        }

        // The reactor keeps serving afterwards
        assert!(reactor
            .process(Atom::new("a2", PacketGroup::CF, "ping", json!({})))
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_timeout_caps_atom_deadline() {
        let reactor = Reactor::with_defaults("r1");
        reactor
            .register(
                PacketGroup::ED,
                "slow",
                handler_fn(|_atom| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(json!("late"))
                }),
                HandlerMetadata::default().with_timeout(2),
            )
            .unwrap();

        let started = Instant::now();
        let err = reactor
            .process(Atom::new("a1", PacketGroup::ED, "slow", json!(null)).with_timeout(30))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { timeout_ms: 2000, .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(reactor.stats().timeouts, 1);
        assert_eq!(reactor.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_reject_policy_returns_retry_after() {
        let reactor = Arc::new(Reactor::new(
            "r1",
            "r1",
            &settings(1, OverflowPolicy::Reject),
        ));
        let release = Arc::new(tokio::sync::Notify::new());
        let gate = release.clone();
        reactor
            .register(
                PacketGroup::CO,
                "hold",
                handler_fn(move |_atom| {
                    let gate = gate.clone();
                    async move {
                        gate.notified().await;
                        Ok(json!("released"))
                    }
                }),
                HandlerMetadata::default(),
            )
            .unwrap();

        let busy = reactor.clone();
        let first = tokio::spawn(async move {
            busy.process(Atom::new("a1", PacketGroup::CO, "hold", json!(null)))
                .await
        });
        while reactor.stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }

        let err = reactor
            .process(Atom::new("a2", PacketGroup::CF, "ping", json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));
        assert!(err.is_retryable());
        assert_eq!(reactor.stats().rejected, 1);

        release.notify_one();
        assert!(first.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_policy_times_out_waiting_for_permit() {
        let reactor = Arc::new(Reactor::new("r1", "r1", &settings(1, OverflowPolicy::Block)));
        reactor
            .register(
                PacketGroup::CO,
                "hold",
                handler_fn(|_atom| async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(json!(null))
                }),
                HandlerMetadata::default(),
            )
            .unwrap();

        let busy = reactor.clone();
        let _first = tokio::spawn(async move {
            busy.process(Atom::new("a1", PacketGroup::CO, "hold", json!(null)).with_timeout(120))
                .await
        });
        while reactor.stats().in_flight == 0 {
            tokio::task::yield_now().await;
        }

        let err = reactor
            .process(Atom::new("a2", PacketGroup::CF, "ping", json!({})).with_timeout(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { .. }));
        assert_eq!(reactor.stats().waiting, 0);
    }
}
