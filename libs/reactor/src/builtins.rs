//! Built-in handlers installed on every reactor
//!
//! - `cf:ping`: echoes `data.echo` (or the whole data value) with a timestamp
//! - `cf:health`: `{ok, load, queue, uptime_s, processed, errors}`
//! - `cf:info`: reactor identity and the sorted handler listing

use crate::handler::{AtomHandler, HandlerMetadata};
use crate::reactor::{load_percent, Reactor};
use crate::registry::HandlerRegistry;
use crate::stats::ReactorStats;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Instant;
use types::{current_timestamp_ms, Atom, PacketGroup};

pub const PING: &str = "ping";
pub const HEALTH: &str = "health";
pub const INFO: &str = "info";

pub(crate) fn install(reactor: &Reactor) {
    let registry = reactor.registry();
    registry.hot_swap(
        PacketGroup::CF,
        PING,
        Arc::new(PingHandler),
        HandlerMetadata::system("Echo data.echo back with a timestamp"),
    );
    registry.hot_swap(
        PacketGroup::CF,
        HEALTH,
        Arc::new(HealthHandler {
            stats: reactor.stats_handle().clone(),
            max_concurrent: reactor.max_concurrent(),
            started: Instant::now(),
        }),
        HandlerMetadata::system("Load, queue depth and counters"),
    );
    registry.hot_swap(
        PacketGroup::CF,
        INFO,
        Arc::new(InfoHandler {
            id: reactor.id().to_string(),
            name: reactor.name().to_string(),
            // Weak: the registry owns this handler
            registry: Arc::downgrade(registry),
        }),
        HandlerMetadata::system("Reactor identity and handler listing"),
    );
}

struct PingHandler;

#[async_trait]
impl AtomHandler for PingHandler {
    async fn handle(&self, atom: Atom) -> anyhow::Result<Value> {
        let echo = match atom.data {
            Value::Object(mut map) if map.contains_key("echo") => {
                map.remove("echo").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(json!({
            "echo": echo,
            "timestamp": current_timestamp_ms(),
        }))
    }
}

struct HealthHandler {
    stats: Arc<ReactorStats>,
    max_concurrent: usize,
    started: Instant,
}

#[async_trait]
impl AtomHandler for HealthHandler {
    async fn handle(&self, _atom: Atom) -> anyhow::Result<Value> {
        // The health probe itself is in flight; report load without it
        let in_flight = self.stats.in_flight.load(Ordering::Relaxed).saturating_sub(1);
        let load = ((in_flight * 100) / self.max_concurrent.max(1) as u64).min(100);
        let snapshot = self.stats.snapshot();
        Ok(json!({
            "ok": true,
            "load": load,
            "queue": snapshot.waiting,
            "uptime_s": self.started.elapsed().as_secs(),
            "processed": snapshot.processed,
            "errors": snapshot.errors,
        }))
    }
}

struct InfoHandler {
    id: String,
    name: String,
    registry: Weak<HandlerRegistry>,
}

#[async_trait]
impl AtomHandler for InfoHandler {
    async fn handle(&self, _atom: Atom) -> anyhow::Result<Value> {
        let handlers = self
            .registry
            .upgrade()
            .map(|registry| registry.list())
            .unwrap_or_default();
        Ok(json!({
            "id": self.id,
            "name": self.name,
            "handlers": handlers,
        }))
    }
}

/// Health numbers as seen from outside a handler
pub fn health_snapshot(reactor: &Reactor) -> Value {
    let snapshot = reactor.stats();
    json!({
        "ok": true,
        "load": load_percent(reactor.stats_handle(), reactor.max_concurrent()),
        "queue": snapshot.waiting,
        "processed": snapshot.processed,
        "errors": snapshot.errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ping_echoes() {
        let reactor = Reactor::with_defaults("r1");
        let atom: Atom = serde_json::from_value(
            json!({"id": "a1", "g": "cf", "e": "ping", "d": {"echo": "x"}}),
        )
        .unwrap();
        let outcome = reactor.process(atom).await.unwrap();
        assert_eq!(outcome.atom_id, "a1");
        assert_eq!(outcome.result["echo"], "x");
        assert!(outcome.result["timestamp"].is_u64());
    }

    #[tokio::test]
    async fn test_ping_without_echo_key_returns_data() {
        let reactor = Reactor::with_defaults("r1");
        let outcome = reactor
            .process(Atom::new("a1", PacketGroup::CF, "ping", json!([1, 2])))
            .await
            .unwrap();
        assert_eq!(outcome.result["echo"], json!([1, 2]));
    }

    #[tokio::test]
    async fn test_health_reports_counters() {
        let reactor = Reactor::with_defaults("r1");
        for i in 0..3 {
            reactor
                .process(Atom::new(format!("p{i}"), PacketGroup::CF, "ping", json!({})))
                .await
                .unwrap();
        }
        let outcome = reactor
            .process(Atom::new("h", PacketGroup::CF, "health", json!({})))
            .await
            .unwrap();
        assert_eq!(outcome.result["ok"], true);
        assert_eq!(outcome.result["load"], 0);
        assert_eq!(outcome.result["queue"], 0);
        assert_eq!(outcome.result["processed"], 3);
        assert_eq!(outcome.result["errors"], 0);
    }

    #[tokio::test]
    async fn test_info_lists_builtins() {
        let reactor = Reactor::with_defaults("r1");
        let outcome = reactor
            .process(Atom::new("i", PacketGroup::CF, "info", json!({})))
            .await
            .unwrap();
        assert_eq!(outcome.result["id"], "r1");
        let keys: Vec<&str> = outcome.result["handlers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h["key"].as_str().unwrap())
            .collect();
        assert_eq!(keys, vec!["cf:health", "cf:info", "cf:ping"]);
        assert_eq!(outcome.result["handlers"][0]["level"], "system");
    }
}
