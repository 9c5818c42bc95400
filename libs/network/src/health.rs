//! Health Monitoring
//!
//! Polls every reactor in the [`RoutingTable`] on a fixed interval. A
//! successful poll restores health and records load; `failure_threshold`
//! consecutive failures (errors, timeouts or `ok: false`) mark the reactor
//! unhealthy so the router stops selecting it.

use crate::client::ReactorClient;
use crate::routing::RoutingTable;
use async_trait::async_trait;
use config::HealthSettings;
use futures::future::join_all;
use reactor::Reactor;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use types::{Atom, PacketGroup, ReactorDescriptor, Result, RuntimeError};

/// Health endpoint response: `{ok, load, queue}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct HealthReport {
    pub ok: bool,
    #[serde(default)]
    pub load: u8,
    #[serde(default)]
    pub queue: u64,
}

/// One way of asking a reactor how it is doing
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, reactor: &ReactorDescriptor) -> Result<HealthReport>;
}

fn health_atom(timeout_s: u64) -> Atom {
    Atom::generate(PacketGroup::CF, "health", serde_json::json!({})).with_timeout(timeout_s.max(1))
}

fn parse_report(value: serde_json::Value) -> Result<HealthReport> {
    serde_json::from_value(value)
        .map_err(|e| RuntimeError::invalid_message(format!("malformed health response: {}", e)))
}

/// Submits `cf:health` over the wire
pub struct WireHealthProbe {
    client: Arc<ReactorClient>,
    timeout_s: u64,
}

impl WireHealthProbe {
    pub fn new(client: Arc<ReactorClient>, timeout_s: u64) -> Self {
        Self { client, timeout_s }
    }
}

#[async_trait]
impl HealthProbe for WireHealthProbe {
    async fn probe(&self, reactor: &ReactorDescriptor) -> Result<HealthReport> {
        let outcome = self
            .client
            .submit(reactor, &health_atom(self.timeout_s))
            .await?;
        parse_report(outcome.result)
    }
}

/// Probes reactors living in this process; unknown ids fall through to
/// `fallback` when one is set
pub struct LocalHealthProbe {
    reactors: HashMap<String, Arc<Reactor>>,
    fallback: Option<Arc<dyn HealthProbe>>,
    timeout_s: u64,
}

impl LocalHealthProbe {
    pub fn new() -> Self {
        Self {
            reactors: HashMap::new(),
            fallback: None,
            timeout_s: HealthSettings::default().timeout_s,
        }
    }

    /// Deadline of the in-process `cf:health` atom
    pub fn with_timeout(mut self, timeout_s: u64) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    pub fn with_reactor(mut self, reactor: Arc<Reactor>) -> Self {
        self.reactors.insert(reactor.id().to_string(), reactor);
        self
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn HealthProbe>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

impl Default for LocalHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for LocalHealthProbe {
    async fn probe(&self, reactor: &ReactorDescriptor) -> Result<HealthReport> {
        match (self.reactors.get(&reactor.id), &self.fallback) {
            (Some(local), _) => {
                let outcome = local.process(health_atom(self.timeout_s)).await?;
                parse_report(outcome.result)
            }
            (None, Some(fallback)) => fallback.probe(reactor).await,
            (None, None) => Err(RuntimeError::transport(format!(
                "reactor {} is not local",
                reactor.id
            ))),
        }
    }
}

pub struct HealthMonitor {
    table: Arc<RoutingTable>,
    probe: Arc<dyn HealthProbe>,
    settings: HealthSettings,
}

impl HealthMonitor {
    pub fn new(table: Arc<RoutingTable>, probe: Arc<dyn HealthProbe>, settings: HealthSettings) -> Self {
        Self {
            table,
            probe,
            settings,
        }
    }

    /// Probe every reactor concurrently and apply the results.
    ///
    /// Returns `(reactor_id, healthy_after_check)` in table order.
    pub async fn check_all(&self) -> Vec<(String, bool)> {
        let descriptors = self.table.descriptors();
        let timeout = self.settings.timeout();

        let probes = descriptors.iter().map(|descriptor| async move {
            let result = match tokio::time::timeout(timeout, self.probe.probe(descriptor)).await {
                Ok(result) => result,
                Err(_) => Err(RuntimeError::timeout(
                    format!("health check {}", descriptor.id),
                    timeout,
                )),
            };
            (descriptor.id.as_str(), result)
        });

        let mut states = Vec::with_capacity(descriptors.len());
        for (id, result) in join_all(probes).await {
            match result {
                Ok(report) if report.ok => {
                    self.table.record_health_success(id, report.load, report.queue);
                    debug!(reactor_id = %id, load = report.load, queue = report.queue, "Health check ok");
                }
                Ok(_) => {
                    warn!(reactor_id = %id, "Reactor reported not ok");
                    self.table
                        .record_health_failure(id, self.settings.failure_threshold);
                }
                Err(err) => {
                    warn!(reactor_id = %id, error = %err, "Health check failed");
                    self.table
                        .record_health_failure(id, self.settings.failure_threshold);
                }
            }
            let healthy = self.table.get(id).map(|e| e.healthy).unwrap_or(false);
            states.push((id.to_string(), healthy));
        }
        states
    }

    /// Poll every `check_interval` until `shutdown` flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.check_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            interval_s = self.settings.check_interval_s,
            threshold = self.settings.failure_threshold,
            "Health monitor started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.check_all().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Health monitor stopped");
                        return;
                    }
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    /// Scripted probe: pops the next answer per reactor, defaults to ok
    struct ScriptedProbe {
        answers: Mutex<HashMap<String, Vec<Result<HealthReport>>>>,
    }

    impl ScriptedProbe {
        fn new(script: Vec<(&str, Vec<Result<HealthReport>>)>) -> Self {
            Self {
                answers: Mutex::new(
                    script
                        .into_iter()
                        .map(|(id, mut answers)| {
                            answers.reverse();
                            (id.to_string(), answers)
                        })
                        .collect(),
                ),
            }
        }
    }

    #[async_trait]
    impl HealthProbe for ScriptedProbe {
        async fn probe(&self, reactor: &ReactorDescriptor) -> Result<HealthReport> {
            let next = self
                .answers
                .lock()
                .get_mut(&reactor.id)
                .and_then(|answers| answers.pop());
            next.unwrap_or(Ok(HealthReport {
                ok: true,
                load: 10,
                queue: 0,
            }))
        }
    }

    struct HangingProbe;

    #[async_trait]
    impl HealthProbe for HangingProbe {
        async fn probe(&self, _reactor: &ReactorDescriptor) -> Result<HealthReport> {
            std::future::pending().await
        }
    }

    fn table() -> Arc<RoutingTable> {
        Arc::new(RoutingTable::from_descriptors([
            ReactorDescriptor::new("r1", "127.0.0.1:1"),
            ReactorDescriptor::new("r2", "127.0.0.1:2"),
        ]))
    }

    #[tokio::test]
    async fn test_three_failures_mark_unhealthy() {
        let down = || Err(RuntimeError::transport("refused"));
        let probe = Arc::new(ScriptedProbe::new(vec![("r1", vec![down(), down(), down()])]));
        let monitor = HealthMonitor::new(table(), probe, HealthSettings::default());

        assert_eq!(
            monitor.check_all().await,
            vec![("r1".to_string(), true), ("r2".to_string(), true)]
        );
        monitor.check_all().await;
        let states = monitor.check_all().await;
        assert_eq!(states[0], ("r1".to_string(), false));
        assert_eq!(states[1], ("r2".to_string(), true));

        // Script exhausted: next poll succeeds and restores health
        let states = monitor.check_all().await;
        assert_eq!(states[0], ("r1".to_string(), true));
        assert_eq!(monitor.table.get("r1").unwrap().load, 10);
    }

    #[tokio::test]
    async fn test_not_ok_counts_as_failure() {
        let sick = || {
            Ok(HealthReport {
                ok: false,
                load: 0,
                queue: 0,
            })
        };
        let probe = Arc::new(ScriptedProbe::new(vec![("r2", vec![sick()])]));
        let settings = HealthSettings {
            failure_threshold: 1,
            ..HealthSettings::default()
        };
        let monitor = HealthMonitor::new(table(), probe, settings);
        let states = monitor.check_all().await;
        assert_eq!(states[1], ("r2".to_string(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_timeout_counts_as_failure() {
        let settings = HealthSettings {
            timeout_s: 1,
            failure_threshold: 1,
            ..HealthSettings::default()
        };
        let monitor = HealthMonitor::new(table(), Arc::new(HangingProbe), settings);
        let started = tokio::time::Instant::now();
        let states = monitor.check_all().await;
        assert!(states.iter().all(|(_, healthy)| !healthy));
        // Probes run concurrently: one timeout, not two
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_local_probe_reads_reactor_health() {
        let reactor = Arc::new(Reactor::with_defaults("r1"));
        let probe = LocalHealthProbe::new().with_reactor(reactor);
        let report = probe
            .probe(&ReactorDescriptor::new("r1", "local"))
            .await
            .unwrap();
        assert!(report.ok);
        assert_eq!(report.load, 0);
        assert!(probe
            .probe(&ReactorDescriptor::new("elsewhere", "x:1"))
            .await
            .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_probe_uses_configured_timeout() {
        let reactor = Arc::new(Reactor::with_defaults("r1"));
        reactor.hot_swap(
            PacketGroup::CF,
            "health",
            reactor::handler_fn(|_atom: Atom| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(serde_json::json!({"ok": true}))
            }),
            reactor::HandlerMetadata::new("Never answers in time"),
        );
        let probe = LocalHealthProbe::new().with_reactor(reactor).with_timeout(2);

        let err = probe
            .probe(&ReactorDescriptor::new("r1", "local"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Timeout { timeout_ms: 2000, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let monitor = Arc::new(HealthMonitor::new(
            table(),
            Arc::new(ScriptedProbe::new(vec![])),
            HealthSettings::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = monitor.clone().spawn(rx);
        tokio::time::sleep(Duration::from_secs(65)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(monitor.table.get("r1").unwrap().last_check.is_some());
    }
}
