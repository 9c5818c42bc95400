//! Reactor Server
//!
//! TCP accept loop serving the wire protocol for one local [`Reactor`]. Each
//! connection gets its own task and handles requests one at a time, so
//! replies on a connection are in request order.
//!
//! | Request        | Reply                                        |
//! |----------------|----------------------------------------------|
//! | `submit`       | `result` or `error`                          |
//! | `batch_submit` | `result` with per-atom items, in order       |
//! | `ping`         | `ping`                                       |
//! | `register`     | `result` after upserting the routing table   |
//! | anything else  | `error`, then the connection is closed       |

use crate::error::TransportError;
use crate::framing::{read_frame, write_message};
use crate::routing::RoutingTable;
use bytes::Bytes;
use codec::{
    BatchItem, BatchResultBody, BinaryMessage, ErrorBody, MessageType, ResultBody,
};
use reactor::Reactor;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use types::{Atom, ReactorDescriptor, RuntimeError};

#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections: AtomicU64,
    pub requests: AtomicU64,
    pub protocol_errors: AtomicU64,
}

/// Reply plus whether the connection must be closed after sending it
struct Reply {
    message: BinaryMessage,
    close: bool,
}

pub struct ReactorServer {
    reactor: Arc<Reactor>,
    table: Option<Arc<RoutingTable>>,
    wire_id: u16,
    max_frame_size: usize,
    stats: ServerStats,
}

impl ReactorServer {
    pub fn new(reactor: Arc<Reactor>, wire_id: u16, max_frame_size: usize) -> Self {
        Self {
            reactor,
            table: None,
            wire_id,
            max_frame_size,
            stats: ServerStats::default(),
        }
    }

    /// Accept `register` messages into this table
    pub fn with_routing_table(mut self, table: Arc<RoutingTable>) -> Self {
        self.table = Some(table);
        self
    }

    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Bind and serve until `shutdown` flips to true
    pub async fn run(
        self: Arc<Self>,
        addr: &str,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::io(format!("bind {}", addr), e))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), TransportError> {
        let local = listener
            .local_addr()
            .map_err(|e| TransportError::io("listener address", e))?;
        info!(reactor_id = %self.reactor.id(), addr = %local, "Reactor server listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            self.stats.connections.fetch_add(1, Ordering::Relaxed);
                            let server = self.clone();
                            let shutdown = shutdown.clone();
                            tokio::spawn(async move {
                                server.handle_connection(stream, peer, shutdown).await;
                            });
                        }
                        Err(e) => warn!(error = %e, "Accept failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(reactor_id = %self.reactor.id(), "Reactor server stopping");
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let _ = stream.set_nodelay(true);
        debug!(peer = %peer, "Connection accepted");

        loop {
            let frame = tokio::select! {
                frame = read_frame(&mut stream, self.max_frame_size) => frame,
                _ = shutdown.changed() => break,
            };

            let reply = match frame {
                Ok(Some(frame)) => self.handle_frame(&frame).await,
                Ok(None) => break,
                Err(TransportError::FrameTooLarge { size, limit }) => {
                    self.stats.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    let err = RuntimeError::PayloadTooLarge { size, limit };
                    Reply {
                        message: self.standalone_error("", &err),
                        close: true,
                    }
                }
                Err(err) => {
                    debug!(peer = %peer, error = %err, "Connection read failed");
                    break;
                }
            };

            if let Err(err) = write_message(&mut stream, &reply.message).await {
                debug!(peer = %peer, error = %err, "Reply write failed");
                break;
            }
            if reply.close {
                warn!(peer = %peer, "Closing connection after protocol error");
                break;
            }
        }
        debug!(peer = %peer, "Connection closed");
    }

    async fn handle_frame(&self, frame: &[u8]) -> Reply {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        let request = match BinaryMessage::decode(frame) {
            Ok(request) => request,
            Err(err) => {
                self.stats.protocol_errors.fetch_add(1, Ordering::Relaxed);
                return Reply {
                    message: self.standalone_error("", &err.into()),
                    close: true,
                };
            }
        };

        let message = match request.message_type {
            MessageType::Submit => self.handle_submit(&request).await,
            MessageType::BatchSubmit => self.handle_batch(&request).await,
            MessageType::Ping => Ok(BinaryMessage::reply_to(
                &request,
                MessageType::Ping,
                Bytes::new(),
            )),
            MessageType::Register => self.handle_register(&request),
            MessageType::Result | MessageType::Error => {
                self.stats.protocol_errors.fetch_add(1, Ordering::Relaxed);
                let err = RuntimeError::invalid_message(format!(
                    "{:?} is a reply type, not a request",
                    request.message_type
                ));
                return Reply {
                    message: self.error_reply(&request, "", &err),
                    close: true,
                };
            }
        };

        match message {
            Ok(message) => Reply {
                message,
                close: false,
            },
            Err(err) => Reply {
                message: self.error_reply(&request, request.correlation_str().unwrap_or(""), &err),
                close: err.category() == types::ErrorCategory::Protocol,
            },
        }
    }

    async fn handle_submit(&self, request: &BinaryMessage) -> types::Result<BinaryMessage> {
        let atom: Atom = request
            .decode_body()
            .map_err(|e| RuntimeError::invalid_atom(e.to_string()))?;
        let atom_id = atom.id.clone();
        let reply = match self.reactor.process(atom).await {
            Ok(outcome) => BinaryMessage::result(
                request,
                &ResultBody {
                    atom_id: outcome.atom_id,
                    result: outcome.result,
                    duration_ms: outcome.duration_ms,
                },
            )?,
            Err(err) => BinaryMessage::error(request, &ErrorBody::from_error(atom_id, &err))?,
        };
        Ok(reply)
    }

    async fn handle_batch(&self, request: &BinaryMessage) -> types::Result<BinaryMessage> {
        let atoms: Vec<Atom> = request
            .decode_body()
            .map_err(|e| RuntimeError::invalid_atom(e.to_string()))?;

        let items = futures::future::join_all(atoms.into_iter().map(|atom| async move {
            let atom_id = atom.id.clone();
            match self.reactor.process(atom).await {
                Ok(outcome) => BatchItem::Ok(ResultBody {
                    atom_id: outcome.atom_id,
                    result: outcome.result,
                    duration_ms: outcome.duration_ms,
                }),
                Err(err) => BatchItem::Error(ErrorBody::from_error(atom_id, &err)),
            }
        }))
        .await;

        Ok(BinaryMessage::batch_result(request, &BatchResultBody { items })?)
    }

    fn handle_register(&self, request: &BinaryMessage) -> types::Result<BinaryMessage> {
        let table = self.table.as_ref().ok_or_else(|| {
            RuntimeError::resource_exhausted("routing_table", "this node does not accept registrations")
        })?;
        let descriptor: ReactorDescriptor = request
            .decode_body()
            .map_err(|e| RuntimeError::invalid_atom(e.to_string()))?;
        let id = descriptor.id.clone();
        let added = table.register(descriptor);
        Ok(BinaryMessage::result(
            request,
            &ResultBody {
                atom_id: id,
                result: json!({"registered": true, "new": added}),
                duration_ms: 0,
            },
        )?)
    }

    fn error_reply(&self, request: &BinaryMessage, atom_id: &str, err: &RuntimeError) -> BinaryMessage {
        let body = ErrorBody::from_error(atom_id, err);
        BinaryMessage::error(request, &body).unwrap_or_else(|_| self.standalone_error(atom_id, err))
    }

    /// Error frame for a request that could not be decoded
    fn standalone_error(&self, atom_id: &str, err: &RuntimeError) -> BinaryMessage {
        let body = ErrorBody::from_error(atom_id, err);
        let payload = serde_json::to_vec(&body).map(Bytes::from).unwrap_or_default();
        BinaryMessage::new(MessageType::Error, payload).with_route(self.wire_id, 0)
    }
}
