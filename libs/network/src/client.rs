//! Wire client
//!
//! Request/response over pooled connections. Each request carries a fresh
//! sequence number; the reply must echo it (and the correlation id) or the
//! connection is discarded.

use crate::error::TransportError;
use crate::framing::{read_message, write_message};
use crate::pool::ConnectionPool;
use codec::{BatchResultBody, BinaryMessage, ErrorBody, MessageType, ResultBody};
use reactor::ProcessOutcome;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use types::{Atom, ReactorDescriptor, Result, RuntimeError};

/// Added to the atom deadline to cover transport and queueing
const TRANSPORT_GRACE: Duration = Duration::from_secs(1);

pub struct ReactorClient {
    pool: Arc<ConnectionPool>,
    sequence: AtomicU32,
    wire_id: u16,
    max_frame_size: usize,
}

impl ReactorClient {
    pub fn new(pool: Arc<ConnectionPool>, wire_id: u16, max_frame_size: usize) -> Self {
        Self {
            pool,
            sequence: AtomicU32::new(1),
            wire_id,
            max_frame_size,
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Never zero; zero marks unsequenced server errors
    fn next_sequence(&self) -> u32 {
        self.sequence.fetch_add(1, Ordering::Relaxed).max(1)
    }

    /// Send one request and wait for its reply
    pub async fn request(
        &self,
        reactor: &ReactorDescriptor,
        message: BinaryMessage,
        deadline: Duration,
    ) -> Result<BinaryMessage> {
        let request = message
            .with_sequence(self.next_sequence())
            .with_route(self.wire_id, 0);
        let mut conn = self.pool.acquire(reactor).await?;

        let exchange = async {
            let stream = conn
                .stream_mut()
                .ok_or_else(|| RuntimeError::transport("connection already released"))?;
            write_message(stream, &request).await?;
            let reply: Result<BinaryMessage> = match read_message(stream, self.max_frame_size)
                .await?
            {
                Some(reply) => Ok(reply),
                None => Err(TransportError::closed(&reactor.endpoint).into()),
            };
            reply
        };

        let exchanged = tokio::time::timeout(deadline, exchange).await;
        let reply = match exchanged {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                conn.mark_broken();
                return Err(err);
            }
            Err(_) => {
                // Reply may still arrive on this socket; never reuse it
                conn.mark_broken();
                return Err(RuntimeError::timeout(
                    format!("request to {}", reactor.id),
                    deadline,
                ));
            }
        };

        // Servers answer undecodable frames with an unsequenced error and close
        if reply.message_type == MessageType::Error && reply.sequence == 0 {
            conn.mark_broken();
            return Err(reply.decode_body::<ErrorBody>()?.into_error());
        }

        if reply.sequence != request.sequence || reply.correlation_id != request.correlation_id {
            conn.mark_broken();
            warn!(
                reactor_id = %reactor.id,
                expected = request.sequence,
                actual = reply.sequence,
                "Reply does not match request"
            );
            return Err(RuntimeError::invalid_message(format!(
                "reply sequence {} does not match request {}",
                reply.sequence, request.sequence
            )));
        }
        Ok(reply)
    }

    /// Submit one atom for remote execution
    pub async fn submit(&self, reactor: &ReactorDescriptor, atom: &Atom) -> Result<ProcessOutcome> {
        let started = Instant::now();
        let deadline = Duration::from_secs(atom.timeout_s).saturating_add(TRANSPORT_GRACE);
        let reply = self
            .request(reactor, BinaryMessage::submit(atom)?, deadline)
            .await?;

        let outcome = match reply.message_type {
            MessageType::Result => {
                let body: ResultBody = reply.decode_body()?;
                Ok(ProcessOutcome {
                    atom_id: body.atom_id,
                    result: body.result,
                    duration_ms: body.duration_ms,
                })
            }
            MessageType::Error => Err(reply.decode_body::<ErrorBody>()?.into_error()),
            other => Err(unexpected_reply(other)),
        };
        debug!(
            atom_id = %atom.id,
            reactor_id = %reactor.id,
            duration_ms = started.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Remote submit finished"
        );
        outcome
    }

    /// Submit atoms in one frame; results come back in submission order
    pub async fn batch_submit(
        &self,
        reactor: &ReactorDescriptor,
        atoms: &[Atom],
    ) -> Result<Vec<Result<ProcessOutcome>>> {
        let longest = atoms.iter().map(|a| a.timeout_s).max().unwrap_or(0);
        let deadline = Duration::from_secs(longest).saturating_add(TRANSPORT_GRACE);
        let reply = self
            .request(reactor, BinaryMessage::batch_submit(atoms)?, deadline)
            .await?;

        match reply.message_type {
            MessageType::Result => {
                let body: BatchResultBody = reply.decode_body()?;
                if body.items.len() != atoms.len() {
                    return Err(RuntimeError::invalid_message(format!(
                        "batch reply has {} items for {} atoms",
                        body.items.len(),
                        atoms.len()
                    )));
                }
                Ok(body
                    .items
                    .into_iter()
                    .map(|item| {
                        item.into_result().map(|body| ProcessOutcome {
                            atom_id: body.atom_id,
                            result: body.result,
                            duration_ms: body.duration_ms,
                        })
                    })
                    .collect())
            }
            MessageType::Error => Err(reply.decode_body::<ErrorBody>()?.into_error()),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Round-trip a ping; returns the observed latency
    pub async fn ping(&self, reactor: &ReactorDescriptor, deadline: Duration) -> Result<Duration> {
        let started = Instant::now();
        let reply = self.request(reactor, BinaryMessage::ping(), deadline).await?;
        match reply.message_type {
            MessageType::Ping => Ok(started.elapsed()),
            MessageType::Error => Err(reply.decode_body::<ErrorBody>()?.into_error()),
            other => Err(unexpected_reply(other)),
        }
    }

    /// Announce `own` to the node serving `reactor`
    pub async fn register(
        &self,
        reactor: &ReactorDescriptor,
        own: &ReactorDescriptor,
        deadline: Duration,
    ) -> Result<()> {
        let reply = self
            .request(reactor, BinaryMessage::register(own)?, deadline)
            .await?;
        match reply.message_type {
            MessageType::Result => Ok(()),
            MessageType::Error => Err(reply.decode_body::<ErrorBody>()?.into_error()),
            other => Err(unexpected_reply(other)),
        }
    }
}

fn unexpected_reply(message_type: MessageType) -> RuntimeError {
    RuntimeError::invalid_message(format!("unexpected {:?} reply", message_type))
}
