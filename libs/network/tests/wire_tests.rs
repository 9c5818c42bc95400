//! # Wire Integration Tests
//!
//! Real TCP on localhost: a `ReactorServer` in front of a reactor, a pooled
//! `ReactorClient`, and the routed `RemoteDispatcher`.

use codec::{BinaryMessage, ErrorBody, MessageType};
use config::PoolSettings;
use network::framing::{read_message, write_frame, write_message};
use network::{
    ConnectionPool, HashRouter, ReactorClient, ReactorServer, RemoteDispatcher, RoutingTable,
};
use reactor::{handler_fn, AtomExecutor, HandlerMetadata, Reactor};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use types::{Atom, ErrorCategory, PacketGroup, ReactorDescriptor, RuntimeError};

const MAX_FRAME: usize = 1024 * 1024;

struct Node {
    descriptor: ReactorDescriptor,
    reactor: Arc<Reactor>,
    table: Arc<RoutingTable>,
    _shutdown: watch::Sender<bool>,
}

async fn start_node(id: &str, groups: &[PacketGroup]) -> Node {
    let reactor = Arc::new(Reactor::with_defaults(id));
    reactor
        .register(
            PacketGroup::DF,
            "sum",
            handler_fn(|atom: Atom| async move {
                let values = atom.data["values"]
                    .as_array()
                    .ok_or_else(|| anyhow::anyhow!("values must be an array"))?;
                Ok(json!(values.iter().filter_map(|v| v.as_i64()).sum::<i64>()))
            }),
            HandlerMetadata::new("Sum data.values"),
        )
        .unwrap();

    let table = Arc::new(RoutingTable::new());
    let server = Arc::new(
        ReactorServer::new(reactor.clone(), 9, MAX_FRAME).with_routing_table(table.clone()),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(server.serve(listener, rx));

    Node {
        descriptor: ReactorDescriptor::new(id, addr.to_string()).with_groups(groups.iter().copied()),
        reactor,
        table,
        _shutdown: tx,
    }
}

fn client() -> Arc<ReactorClient> {
    let pool = Arc::new(ConnectionPool::new(PoolSettings::default()));
    Arc::new(ReactorClient::new(pool, 1, MAX_FRAME))
}

#[tokio::test]
async fn test_submit_ping_over_wire() {
    let node = start_node("r1", &[PacketGroup::CF]).await;
    let client = client();

    let atom: Atom =
        serde_json::from_value(json!({"id": "a1", "g": "cf", "e": "ping", "d": {"echo": "x"}}))
            .unwrap();
    let outcome = client.submit(&node.descriptor, &atom).await.unwrap();
    assert_eq!(outcome.atom_id, "a1");
    assert_eq!(outcome.result["echo"], "x");
    assert!(outcome.result["timestamp"].is_u64());

    // Second request reuses the pooled connection
    client.submit(&node.descriptor, &atom).await.unwrap();
    let stats = client.pool().stats();
    assert_eq!(stats.created, 1);
    assert_eq!(stats.reused, 1);
}

#[tokio::test]
async fn test_errors_keep_their_category_across_the_wire() {
    let node = start_node("r1", &[PacketGroup::DF]).await;
    let client = client();

    let missing = Atom::new("a2", PacketGroup::DF, "nope", json!({}));
    let err = client.submit(&node.descriptor, &missing).await.unwrap_err();
    assert_eq!(err, RuntimeError::unsupported("df", "nope"));
    assert_eq!(err.category(), ErrorCategory::Client);

    let bad = Atom::new("a3", PacketGroup::DF, "sum", json!({"values": "oops"}));
    let err = client.submit(&node.descriptor, &bad).await.unwrap_err();
    assert!(matches!(err, RuntimeError::HandlerFailed { .. }));
    assert!(err.is_retryable());

    // The connection survives handler errors
    let ok = Atom::new("a4", PacketGroup::DF, "sum", json!({"values": [1, 2, 3]}));
    assert_eq!(client.submit(&node.descriptor, &ok).await.unwrap().result, json!(6));
    assert_eq!(node.reactor.stats().errors, 2);
}

#[tokio::test]
async fn test_batch_preserves_order() {
    let node = start_node("r1", &[PacketGroup::DF]).await;
    let client = client();

    let atoms = vec![
        Atom::new("b1", PacketGroup::DF, "sum", json!({"values": [1]})),
        Atom::new("b2", PacketGroup::DF, "missing", json!({})),
        Atom::new("b3", PacketGroup::DF, "sum", json!({"values": [2, 2]})),
    ];
    let results = client.batch_submit(&node.descriptor, &atoms).await.unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().result, json!(1));
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().atom_id, "b3");
}

#[tokio::test]
async fn test_ping_and_register() {
    let node = start_node("r1", &[]).await;
    let client = client();

    client
        .ping(&node.descriptor, Duration::from_secs(1))
        .await
        .unwrap();

    let peer = ReactorDescriptor::new("r9", "10.1.1.1:7400").with_groups([PacketGroup::MC]);
    client
        .register(&node.descriptor, &peer, Duration::from_secs(1))
        .await
        .unwrap();
    assert!(node.table.get("r9").unwrap().descriptor.handles(PacketGroup::MC));
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_close() {
    let node = start_node("r1", &[]).await;
    let mut stream = TcpStream::connect(&node.descriptor.endpoint).await.unwrap();

    write_frame(&mut stream, &[1, 2, 3]).await.unwrap();
    let reply = read_message(&mut stream, MAX_FRAME).await.unwrap().unwrap();
    assert_eq!(reply.message_type, MessageType::Error);
    let body: ErrorBody = reply.decode_body().unwrap();
    assert_eq!(body.category, ErrorCategory::Protocol);

    // Server closed the connection
    assert!(read_message(&mut stream, MAX_FRAME).await.unwrap().is_none());
}

#[tokio::test]
async fn test_version_mismatch_is_protocol_error() {
    let node = start_node("r1", &[]).await;
    let mut stream = TcpStream::connect(&node.descriptor.endpoint).await.unwrap();

    let mut frame = BinaryMessage::ping().encode().unwrap().to_vec();
    frame[0] = 7;
    write_frame(&mut stream, &frame).await.unwrap();
    let reply = read_message(&mut stream, MAX_FRAME).await.unwrap().unwrap();
    let body: ErrorBody = reply.decode_body().unwrap();
    assert_eq!(body.code, "protocol_version_mismatch");
    assert!(!body.retryable);
}

#[tokio::test]
async fn test_reply_frames_are_rejected_as_requests() {
    let node = start_node("r1", &[]).await;
    let mut stream = TcpStream::connect(&node.descriptor.endpoint).await.unwrap();

    let bogus = BinaryMessage::new(MessageType::Result, "{}").with_sequence(5);
    write_message(&mut stream, &bogus).await.unwrap();
    let reply = read_message(&mut stream, MAX_FRAME).await.unwrap().unwrap();
    assert_eq!(reply.message_type, MessageType::Error);
    assert_eq!(reply.sequence, 5);
    assert!(read_message(&mut stream, MAX_FRAME).await.unwrap().is_none());
}

#[tokio::test]
async fn test_dispatcher_routes_local_and_remote() {
    let remote = start_node("r-remote", &[PacketGroup::DF]).await;
    let local = Arc::new(Reactor::with_defaults("r-local"));

    let table = Arc::new(RoutingTable::from_descriptors([
        remote.descriptor.clone(),
        ReactorDescriptor::new("r-local", "127.0.0.1:0").with_groups([PacketGroup::CF]),
    ]));
    let dispatcher = RemoteDispatcher::new(Arc::new(HashRouter::new(table, 80)), client())
        .with_local(local.clone());

    let outcome = dispatcher
        .execute(Atom::new("d1", PacketGroup::DF, "sum", json!({"values": [4, 5]})))
        .await
        .unwrap();
    assert_eq!(outcome.result, json!(9));
    assert_eq!(remote.reactor.stats().processed, 1);

    dispatcher
        .execute(Atom::new("d2", PacketGroup::CF, "ping", json!({})))
        .await
        .unwrap();
    assert_eq!(local.stats().processed, 1);

    let err = dispatcher
        .execute(Atom::new("d3", PacketGroup::MC, "inspect", json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, RuntimeError::NoAvailableReactor { .. }));
}

#[tokio::test]
async fn test_unreachable_reactor_is_retryable_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client()
        .submit(
            &ReactorDescriptor::new("gone", addr.to_string()),
            &Atom::new("a1", PacketGroup::CF, "ping", json!({})),
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_peer_closing_before_reply_is_closed_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        // Swallow the request, then hang up without answering
        let _ = read_message(&mut stream, MAX_FRAME).await;
    });

    let err = client()
        .submit(
            &ReactorDescriptor::new("mute", addr.to_string()),
            &Atom::new("a1", PacketGroup::CF, "ping", json!({})),
        )
        .await
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Server);
    assert!(err.to_string().contains("closed by peer"));
    assert!(err.to_string().contains(&addr.to_string()));
}
