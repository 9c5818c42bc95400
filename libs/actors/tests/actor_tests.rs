//! Mailbox ordering, nested sends and overflow at the system level

use actors::{
    handler_fn, ActorContext, ActorDefinition, ActorMessage, ActorResult, ActorSystem,
    DeadLetterReason, Envelope, Lifecycle, MailboxConfig, MessageHandler, SendOutcome,
};
use async_trait::async_trait;
use config::MailboxOverflow;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};

fn sink(system: &ActorSystem) -> mpsc::UnboundedReceiver<Envelope> {
    let (tx, rx) = mpsc::unbounded_channel();
    system.register(ActorDefinition::new("sink").fallback(handler_fn(move |_ctx, env| {
        let _ = tx.send(env);
        Ok(())
    })));
    rx
}

#[tokio::test]
async fn test_mailbox_is_fifo_per_sender() {
    let system = ActorSystem::default();
    let mut received = sink(&system);
    let id = system.spawn("sink", json!({}), None).unwrap();

    for n in 0..200 {
        assert_eq!(
            system
                .send(id, ActorMessage::new("n", json!(n)), None)
                .unwrap(),
            SendOutcome::Enqueued
        );
    }
    for n in 0..200 {
        assert_eq!(received.recv().await.unwrap().data, json!(n));
    }
    assert_eq!(system.metrics().messages_processed, 200);
}

#[tokio::test]
async fn test_nested_sends_derive_call_ids() {
    let system = ActorSystem::default();
    let mut received = sink(&system);
    let target = system.spawn("sink", json!({}), None).unwrap();

    system.register(ActorDefinition::new("relay").on(
        "fanout",
        handler_fn(move |ctx, env| {
            let count = env.data["count"].as_u64().unwrap_or(0);
            for n in 0..count {
                ctx.send(target, "item", json!(n))?;
            }
            Ok(())
        }),
    ));
    let relay = system.spawn("relay", json!({}), None).unwrap();
    system
        .send(relay, ActorMessage::new("fanout", json!({"count": 3})), None)
        .unwrap();

    for n in 0..3u64 {
        let env = received.recv().await.unwrap();
        assert_eq!(env.data, json!(n));
        assert_eq!(env.sender, Some(relay));
        assert_eq!(env.group(), "actor");
        assert!(env.id.starts_with("msg-"));
        assert!(env.id.ends_with(&format!("_call_{}", n + 1)));
    }
}

#[tokio::test]
async fn test_init_sees_initial_state() {
    let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
    let system = ActorSystem::default();
    system.register(ActorDefinition::new("greeter").on(
        "init",
        handler_fn(move |ctx, env| {
            assert_eq!(&env.data, ctx.state());
            ctx.state_mut()["ready"] = json!(true);
            let _ = tx.send(ctx.state().clone());
            Ok(())
        }),
    ));
    let id = system.spawn("greeter", json!({"name": "n1"}), None).unwrap();
    system.wait_for(id, Lifecycle::Ready).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), json!({"name": "n1", "ready": true}));
}

/// Holds the drain loop until released
struct Gate(Arc<Notify>);

#[async_trait]
impl MessageHandler for Gate {
    async fn handle(&self, _ctx: &mut ActorContext, _env: Envelope) -> ActorResult<()> {
        self.0.notified().await;
        Ok(())
    }
}

#[tokio::test]
async fn test_drop_policies_record_dead_letters() {
    let system = ActorSystem::default();
    let gate = Arc::new(Notify::new());
    system.register(
        ActorDefinition::new("oldest")
            .fallback(Arc::new(Gate(gate.clone())))
            .with_mailbox(MailboxConfig::bounded(2, MailboxOverflow::DropOldest)),
    );
    system.register(
        ActorDefinition::new("newest")
            .fallback(Arc::new(Gate(gate.clone())))
            .with_mailbox(MailboxConfig::bounded(2, MailboxOverflow::DropNewest)),
    );

    for (actor_type, expected) in [
        ("oldest", SendOutcome::DroppedOldest),
        ("newest", SendOutcome::DroppedNewest),
    ] {
        let id = system.spawn(actor_type, json!({}), None).unwrap();
        system.wait_for(id, Lifecycle::Ready).await.unwrap();
        system.send(id, ActorMessage::new("hold", json!(0)), None).unwrap();
        system.wait_for(id, Lifecycle::Running).await.unwrap();

        system.send(id, ActorMessage::new("m", json!(1)), None).unwrap();
        system.send(id, ActorMessage::new("m", json!(2)), None).unwrap();
        assert_eq!(
            system.send(id, ActorMessage::new("m", json!(3)), None).unwrap(),
            expected
        );
        assert_eq!(system.status(id).unwrap().mailbox_len, 2);
    }

    let letters = system.dead_letters();
    assert_eq!(letters.len(), 2);
    assert_eq!(letters[0].reason, DeadLetterReason::DroppedOldest);
    assert_eq!(letters[0].envelope.data, json!(1));
    assert_eq!(letters[1].reason, DeadLetterReason::DroppedNewest);
    assert_eq!(letters[1].envelope.data, json!(3));
    assert_eq!(system.metrics().dead_letters, 2);

    system.shutdown();
    assert_eq!(system.live_count(), 0);
}
