//! Actor Mailbox
//!
//! A single FIFO queue per actor. Bounded mailboxes apply their
//! [`MailboxOverflow`] policy when full; unbounded ones must be requested
//! explicitly. The drain loop parks on [`Mailbox::recv`] and is woken by every
//! push and by [`Mailbox::close`].

use crate::message::Envelope;
use config::{MailboxOverflow, MailboxSettings};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxCapacity {
    Bounded(usize),
    Unbounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxConfig {
    pub capacity: MailboxCapacity,
    pub overflow: MailboxOverflow,
}

impl MailboxConfig {
    pub fn bounded(capacity: usize, overflow: MailboxOverflow) -> Self {
        Self {
            capacity: MailboxCapacity::Bounded(capacity.max(1)),
            overflow,
        }
    }

    pub fn unbounded() -> Self {
        Self {
            capacity: MailboxCapacity::Unbounded,
            overflow: MailboxOverflow::FailFast,
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self::from(&MailboxSettings::default())
    }
}

impl From<&MailboxSettings> for MailboxConfig {
    fn from(settings: &MailboxSettings) -> Self {
        if settings.capacity == 0 {
            Self::unbounded()
        } else {
            Self::bounded(settings.capacity, settings.overflow)
        }
    }
}

/// Delivery outcome reported to the sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Enqueued,
    /// Accepted; the oldest queued message was evicted
    DroppedOldest,
    /// Rejected silently; the incoming message was dropped
    DroppedNewest,
}

/// Result of a push that did not fail outright
#[derive(Debug)]
pub(crate) struct Pushed {
    pub outcome: SendOutcome,
    pub dropped: Option<Envelope>,
}

#[derive(Debug)]
pub(crate) enum PushError {
    Full(usize),
    Closed,
}

#[derive(Debug, Default)]
struct Queue {
    items: VecDeque<Envelope>,
    closed: bool,
}

#[derive(Debug)]
pub struct Mailbox {
    queue: Mutex<Queue>,
    notify: Notify,
    config: MailboxConfig,
}

impl Mailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            notify: Notify::new(),
            config,
        }
    }

    pub fn config(&self) -> MailboxConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.queue.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.queue.lock().closed
    }

    pub(crate) fn push(&self, envelope: Envelope) -> Result<Pushed, PushError> {
        let pushed = {
            let mut queue = self.queue.lock();
            if queue.closed {
                return Err(PushError::Closed);
            }

            match self.config.capacity {
                MailboxCapacity::Bounded(capacity) if queue.items.len() >= capacity => {
                    match self.config.overflow {
                        MailboxOverflow::FailFast => return Err(PushError::Full(capacity)),
                        MailboxOverflow::DropNewest => {
                            return Ok(Pushed {
                                outcome: SendOutcome::DroppedNewest,
                                dropped: Some(envelope),
                            })
                        }
                        MailboxOverflow::DropOldest => {
                            let dropped = queue.items.pop_front();
                            queue.items.push_back(envelope);
                            Pushed {
                                outcome: SendOutcome::DroppedOldest,
                                dropped,
                            }
                        }
                    }
                }
                _ => {
                    queue.items.push_back(envelope);
                    Pushed {
                        outcome: SendOutcome::Enqueued,
                        dropped: None,
                    }
                }
            }
        };
        self.notify.notify_one();
        Ok(pushed)
    }

    /// Next envelope; `None` once the mailbox is closed and drained
    pub async fn recv(&self) -> Option<Envelope> {
        loop {
            {
                let mut queue = self.queue.lock();
                if let Some(envelope) = queue.items.pop_front() {
                    return Some(envelope);
                }
                if queue.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Refuse new messages; queued ones stay until drained
    pub fn close(&self) {
        self.queue.lock().closed = true;
        self.notify.notify_one();
    }

    pub(crate) fn take_all(&self) -> Vec<Envelope> {
        self.queue.lock().items.drain(..).collect()
    }
}
