//! Node assembly
//!
//! One [`Node`] per process: the local reactor (with built-ins and the `co`
//! bridge), the actor system, the routing table seeded from `[[reactors]]`,
//! and the wire client/dispatcher used for routed execution.

use crate::bridge;
use actors::ActorSystem;
use anyhow::{Context, Result};
use config::RuntimeConfig;
use network::{
    ConnectionPool, HashRouter, HealthMonitor, LocalHealthProbe, ReactorClient, ReactorServer,
    RemoteDispatcher, RoutingTable, WireHealthProbe,
};
use pipeline::{PipelineEngine, PipelineRegistry};
use reactor::Reactor;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use types::ReactorDescriptor;

pub type NodePipelines = PipelineRegistry<Arc<RemoteDispatcher>>;

pub struct Node {
    config: RuntimeConfig,
    descriptor: ReactorDescriptor,
    reactor: Arc<Reactor>,
    actors: ActorSystem,
    table: Arc<RoutingTable>,
    client: Arc<ReactorClient>,
    dispatcher: Arc<RemoteDispatcher>,
    pipelines: Arc<NodePipelines>,
}

impl Node {
    /// Build every component; must run inside a Tokio runtime
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        config.validate()?;

        let reactor = Arc::new(Reactor::new(
            config.node.id.clone(),
            config.node.name.clone(),
            &config.reactor,
        ));
        let actors = ActorSystem::new(config.mailbox.clone());

        // Own entry from [[reactors]] when present, otherwise a general-pool member
        let descriptor = config
            .reactor(&config.node.id)
            .cloned()
            .unwrap_or_else(|| ReactorDescriptor::new(config.node.id.clone(), config.node.listen.clone()));
        let table = Arc::new(RoutingTable::from_descriptors(config.reactors.iter().cloned()));
        table.register(descriptor.clone());

        let pool = Arc::new(ConnectionPool::new(config.pool.clone()));
        let client = Arc::new(ReactorClient::new(
            pool,
            config.node.wire_id,
            config.reactor.max_frame_size,
        ));
        let router = Arc::new(HashRouter::new(table.clone(), config.router.load_threshold));
        let dispatcher = Arc::new(
            RemoteDispatcher::new(router, client.clone()).with_local(reactor.clone()),
        );
        let pipelines = Arc::new(PipelineRegistry::new(PipelineEngine::new(dispatcher.clone())));

        bridge::install_actor_bridge(&reactor, actors.clone(), config.supervision.clone())
            .context("Failed to install actor bridge")?;
        bridge::install_pipeline_bridge(&reactor, Arc::downgrade(&pipelines))
            .context("Failed to install pipeline bridge")?;

        info!(
            node_id = %config.node.id,
            reactors = table.len(),
            handlers = reactor.handlers().len(),
            "Node assembled"
        );

        Ok(Self {
            config,
            descriptor,
            reactor,
            actors,
            table,
            client,
            dispatcher,
            pipelines,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn descriptor(&self) -> &ReactorDescriptor {
        &self.descriptor
    }

    pub fn reactor(&self) -> &Arc<Reactor> {
        &self.reactor
    }

    pub fn actors(&self) -> &ActorSystem {
        &self.actors
    }

    pub fn table(&self) -> &Arc<RoutingTable> {
        &self.table
    }

    pub fn client(&self) -> &Arc<ReactorClient> {
        &self.client
    }

    pub fn dispatcher(&self) -> &Arc<RemoteDispatcher> {
        &self.dispatcher
    }

    pub fn pipelines(&self) -> &Arc<NodePipelines> {
        &self.pipelines
    }

    /// Announce this node to every statically configured peer
    pub async fn announce(&self) {
        let deadline = self
            .config
            .pool
            .connect_timeout()
            .saturating_add(self.config.health.timeout());
        for peer in self.table.descriptors() {
            if peer.id == self.descriptor.id {
                continue;
            }
            if let Err(err) = self.client.register(&peer, &self.descriptor, deadline).await {
                warn!(reactor_id = %peer.id, error = %err, "Peer registration failed");
            }
        }
    }

    /// Health monitor: local reactor in-process, peers over the wire
    pub fn spawn_health_monitor(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let wire = Arc::new(WireHealthProbe::new(
            self.client.clone(),
            self.config.health.timeout_s,
        ));
        let probe = LocalHealthProbe::new()
            .with_timeout(self.config.health.timeout_s)
            .with_reactor(self.reactor.clone())
            .with_fallback(wire);
        Arc::new(HealthMonitor::new(
            self.table.clone(),
            Arc::new(probe),
            self.config.health.clone(),
        ))
        .spawn(shutdown)
    }

    /// Periodically close pooled connections idle past `idle_timeout_s`
    pub fn spawn_pool_reaper(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let pool = self.client.pool().clone();
        let period = (self.config.pool.idle_timeout() / 2).max(std::time::Duration::from_secs(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        pool.reap_idle();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    }

    /// Serve the wire protocol on `listener` with health monitoring and
    /// connection reaping, until `shutdown` flips to true
    pub async fn serve(&self, listener: TcpListener, shutdown: watch::Receiver<bool>) -> Result<()> {
        let monitor = self.spawn_health_monitor(shutdown.clone());
        let reaper = self.spawn_pool_reaper(shutdown.clone());

        let server = Arc::new(
            ReactorServer::new(
                self.reactor.clone(),
                self.config.node.wire_id,
                self.config.reactor.max_frame_size,
            )
            .with_routing_table(self.table.clone()),
        );
        let served = server.serve(listener, shutdown).await;

        monitor.abort();
        reaper.abort();
        self.actors.shutdown();
        info!(
            node_id = %self.config.node.id,
            processed = self.reactor.stats().processed,
            "Node stopped"
        );
        served.context("Reactor server failed")
    }
}
