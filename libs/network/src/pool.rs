//! Connection Pool
//!
//! One bounded pool per reactor. A [`PooledConnection`] holds a semaphore
//! permit for its whole checkout; dropping it returns the socket to the idle
//! list unless it was marked broken.

use crate::error::TransportError;
use config::PoolSettings;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};
use types::{ReactorDescriptor, Result, RuntimeError};
use uuid::Uuid;

/// Pooled transport handle
#[derive(Debug)]
pub struct Connection {
    pub id: String,
    pub reactor_id: String,
    pub endpoint: String,
    pub in_use: bool,
    pub last_used: Instant,
    stream: TcpStream,
}

impl Connection {
    pub fn stream_mut(&mut self) -> &mut TcpStream {
        &mut self.stream
    }
}

struct ReactorPool {
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Connection>>,
}

#[derive(Debug, Default)]
struct PoolCounters {
    created: AtomicU64,
    reused: AtomicU64,
    reaped: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    pub reactors: usize,
    pub idle: usize,
    pub in_use: usize,
    pub created: u64,
    pub reused: u64,
    pub reaped: u64,
    pub discarded: u64,
}

pub struct ConnectionPool {
    pools: Mutex<HashMap<String, Arc<ReactorPool>>>,
    settings: PoolSettings,
    counters: Arc<PoolCounters>,
}

impl ConnectionPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            settings,
            counters: Arc::new(PoolCounters::default()),
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    fn pool_for(&self, reactor_id: &str) -> Arc<ReactorPool> {
        let mut pools = self.pools.lock();
        pools
            .entry(reactor_id.to_string())
            .or_insert_with(|| {
                Arc::new(ReactorPool {
                    permits: Arc::new(Semaphore::new(self.settings.max_per_reactor)),
                    idle: Mutex::new(Vec::new()),
                })
            })
            .clone()
    }

    /// Check out a connection, reusing an idle one when it is fresh enough.
    ///
    /// Waits up to `connect_timeout` for a free slot, then `connect_timeout`
    /// again to establish a new socket.
    pub async fn acquire(&self, reactor: &ReactorDescriptor) -> Result<PooledConnection> {
        let pool = self.pool_for(&reactor.id);
        let timeout = self.settings.connect_timeout();

        let permit = match tokio::time::timeout(timeout, pool.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(RuntimeError::resource_exhausted(
                    "connection_pool",
                    "pool closed",
                ))
            }
            Err(_) => {
                return Err(RuntimeError::resource_exhausted(
                    "connection_pool",
                    format!(
                        "all {} connections to {} in use",
                        self.settings.max_per_reactor, reactor.id
                    ),
                ))
            }
        };

        let reusable = {
            let mut idle = pool.idle.lock();
            let idle_timeout = self.settings.idle_timeout();
            let mut found = None;
            // Most recently returned first
            while let Some(conn) = idle.pop() {
                if conn.endpoint == reactor.endpoint && conn.last_used.elapsed() < idle_timeout {
                    found = Some(conn);
                    break;
                }
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            }
            found
        };

        let mut conn = match reusable {
            Some(conn) => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                conn
            }
            None => {
                let stream = match tokio::time::timeout(
                    timeout,
                    TcpStream::connect(&reactor.endpoint),
                )
                .await
                {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(e)) => {
                        return Err(TransportError::io(
                            format!("connect to {} ({})", reactor.id, reactor.endpoint),
                            e,
                        )
                        .into())
                    }
                    Err(_) => {
                        return Err(TransportError::timeout(
                            format!("connect to {}", reactor.endpoint),
                            timeout.as_millis() as u64,
                        )
                        .into())
                    }
                };
                let _ = stream.set_nodelay(true);
                self.counters.created.fetch_add(1, Ordering::Relaxed);
                let conn = Connection {
                    id: format!("conn-{}", Uuid::new_v4().simple()),
                    reactor_id: reactor.id.clone(),
                    endpoint: reactor.endpoint.clone(),
                    in_use: false,
                    last_used: Instant::now(),
                    stream,
                };
                debug!(
                    reactor_id = %reactor.id,
                    connection_id = %conn.id,
                    "Connection established"
                );
                conn
            }
        };

        conn.in_use = true;
        conn.last_used = Instant::now();
        Ok(PooledConnection {
            conn: Some(conn),
            pool,
            counters: self.counters.clone(),
            broken: false,
            _permit: permit,
        })
    }

    /// Drop idle connections unused for longer than `idle_timeout`
    pub fn reap_idle(&self) -> usize {
        let idle_timeout = self.settings.idle_timeout();
        let pools: Vec<Arc<ReactorPool>> = self.pools.lock().values().cloned().collect();
        let mut reaped = 0;
        for pool in pools {
            let mut idle = pool.idle.lock();
            let before = idle.len();
            idle.retain(|conn| conn.last_used.elapsed() < idle_timeout);
            reaped += before - idle.len();
        }
        if reaped > 0 {
            self.counters
                .reaped
                .fetch_add(reaped as u64, Ordering::Relaxed);
            info!(reaped, "Reaped idle connections");
        }
        reaped
    }

    /// Forget every connection to a reactor (e.g. after deregistration)
    pub fn remove_reactor(&self, reactor_id: &str) {
        if let Some(pool) = self.pools.lock().remove(reactor_id) {
            pool.idle.lock().clear();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let pools = self.pools.lock();
        let mut stats = PoolStats {
            reactors: pools.len(),
            created: self.counters.created.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            reaped: self.counters.reaped.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            ..PoolStats::default()
        };
        for pool in pools.values() {
            stats.idle += pool.idle.lock().len();
            stats.in_use += self.settings.max_per_reactor - pool.permits.available_permits();
        }
        stats
    }
}

/// Checked-out connection; returns to the pool on drop
pub struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<ReactorPool>,
    counters: Arc<PoolCounters>,
    broken: bool,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        self.conn.as_mut().map(Connection::stream_mut)
    }

    /// Close instead of returning to the pool
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };
        if self.broken {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = %conn.id, reactor_id = %conn.reactor_id, "Connection discarded");
            return;
        }
        conn.in_use = false;
        conn.last_used = Instant::now();
        self.pool.idle.lock().push(conn);
    }
}
