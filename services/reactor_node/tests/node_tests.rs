//! Node assembly: `co` bridge handlers, routed pipelines and the wire listener

use actors::{handler_fn as actor_handler, ActorDefinition, ActorId, Lifecycle};
use config::{PoolSettings, RuntimeConfig};
use network::{ConnectionPool, ReactorClient};
use reactor_node::Node;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use types::{Atom, ErrorCategory, PacketGroup};

fn node() -> Node {
    let mut config = RuntimeConfig::default();
    config.node.id = "node-a".to_string();
    let node = Node::new(config).unwrap();
    node.actors().register(ActorDefinition::new("counter").on(
        "increment",
        actor_handler(|ctx, env| {
            let by = env.data["by"].as_i64().unwrap_or(1);
            let next = ctx.state()["count"].as_i64().unwrap_or(0) + by;
            ctx.state_mut()["count"] = json!(next);
            Ok(())
        }),
    ));
    node
}

async fn co(node: &Node, element: &str, data: Value) -> types::Result<Value> {
    node.reactor()
        .process(Atom::generate(PacketGroup::CO, element, data))
        .await
        .map(|outcome| outcome.result)
}

#[tokio::test]
async fn test_actor_bridge_round_trip() {
    let node = node();

    let spawned = co(&node, "actor_spawn", json!({"type": "counter", "state": {"count": 0}}))
        .await
        .unwrap();
    let actor_id: ActorId = spawned["actor_id"].as_str().unwrap().parse().unwrap();

    for _ in 0..3 {
        let sent = co(
            &node,
            "actor_send",
            json!({"actor_id": actor_id, "type": "increment", "data": {"by": 2}}),
        )
        .await
        .unwrap();
        assert_eq!(sent["outcome"], "enqueued");
    }

    let status = co(&node, "actor_status", json!({"actor_id": actor_id}))
        .await
        .unwrap();
    assert_eq!(status["actor_type"], "counter");
    assert_eq!(status["restart_count"], 0);

    co(&node, "actor_stop", json!({"actor_id": actor_id}))
        .await
        .unwrap();
    node.actors()
        .wait_for(actor_id, Lifecycle::Terminated)
        .await
        .unwrap();
    assert_eq!(node.actors().metrics().messages_processed, 3);
}

#[tokio::test]
async fn test_actor_bridge_rejects_bad_requests() {
    let node = node();

    let err = co(&node, "actor_spawn", json!({"type": "nope"}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "handler_failed");
    assert!(err.to_string().contains("nope"));

    let err = co(&node, "actor_send", json!({"type": "increment"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid co:actor_send request"));
}

#[tokio::test]
async fn test_supervisor_spawn_over_bridge() {
    let node = node();

    let supervisor = co(
        &node,
        "supervisor_spawn",
        json!({"strategy": "one_for_one", "max_restarts": 1}),
    )
    .await
    .unwrap();
    let supervisor: ActorId = supervisor["actor_id"].as_str().unwrap().parse().unwrap();

    let child = co(
        &node,
        "actor_spawn",
        json!({"type": "counter", "supervisor": supervisor}),
    )
    .await
    .unwrap();
    let child: ActorId = child["actor_id"].as_str().unwrap().parse().unwrap();

    assert_eq!(node.actors().supervisor_of(child).unwrap(), Some(supervisor));
    assert_eq!(node.actors().children(supervisor), vec![child]);
}

#[tokio::test]
async fn test_pipeline_bridge_runs_through_dispatcher() {
    let node = node();

    let registered = co(
        &node,
        "pipeline_register",
        json!({"pipeline": {
            "id": "twice",
            "steps": [
                {"group": "cf", "element": "ping", "data": {"echo": "a"}},
                {"group": "cf", "element": "ping"}
            ]
        }}),
    )
    .await
    .unwrap();
    assert_eq!(registered, json!({"id": "twice", "replaced": false}));

    let result = co(&node, "pipeline_run", json!({"id": "twice", "input": {}}))
        .await
        .unwrap();
    assert_eq!(result["success"], true);
    assert_eq!(result["completed_steps"], 2);
    assert_eq!(result["trace"][0]["atom_id"], "twice_step_1");

    let err = co(&node, "pipeline_run", json!({"id": "missing"}))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing"));
}

#[tokio::test]
async fn test_serve_answers_over_wire_until_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = RuntimeConfig::default();
    config.node.id = "node-wire".to_string();
    config.node.listen = listener.local_addr().unwrap().to_string();

    let node = Arc::new(Node::new(config).unwrap());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn({
        let node = node.clone();
        async move { node.serve(listener, shutdown_rx).await }
    });

    let pool = Arc::new(ConnectionPool::new(PoolSettings::default()));
    let client = ReactorClient::new(pool, 77, node.config().reactor.max_frame_size);
    let atom = Atom::new("w1", PacketGroup::CF, "ping", json!({"echo": "hi"}));
    let outcome = client.submit(node.descriptor(), &atom).await.unwrap();
    assert_eq!(outcome.atom_id, "w1");
    assert_eq!(outcome.result["echo"], "hi");

    let unknown = Atom::new("w2", PacketGroup::MC, "missing", json!({}));
    let err = client.submit(node.descriptor(), &unknown).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Client);

    shutdown_tx.send(true).unwrap();
    server.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_node_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[node]
id = "node-file"
listen = "127.0.0.1:7411"

[[reactors]]
id = "node-file"
endpoint = "127.0.0.1:7411"
types = ["df"]

[[reactors]]
id = "peer"
endpoint = "127.0.0.1:7412"
"#
    )
    .unwrap();

    let config = RuntimeConfig::load(Some(file.path())).unwrap();
    let node = Node::new(config).unwrap();
    assert_eq!(node.descriptor().id, "node-file");
    assert!(node.descriptor().handles(PacketGroup::DF));
    assert_eq!(node.table().len(), 2);
}

#[tokio::test]
async fn test_pipeline_run_on_single_permit_node() {
    let mut config = RuntimeConfig::default();
    config.node.id = "node-narrow".to_string();
    config.reactor.max_concurrent_packets = 1;
    let node = Node::new(config).unwrap();

    co(
        &node,
        "pipeline_register",
        json!({"pipeline": {"id": "one", "steps": [{"group": "cf", "element": "ping"}]}}),
    )
    .await
    .unwrap();

    let run = node.reactor().process(
        Atom::generate(PacketGroup::CO, "pipeline_run", json!({"id": "one"})).with_timeout(5),
    );
    let result = tokio::time::timeout(std::time::Duration::from_secs(10), run)
        .await
        .expect("pipeline_run must not wait on its own permit")
        .unwrap()
        .result;
    assert_eq!(result["success"], true);
    assert_eq!(result["completed_steps"], 1);
}
