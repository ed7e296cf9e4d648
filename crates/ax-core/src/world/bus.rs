//! In-memory message bus.
//!
//! Messages sent during tick `t` are queued append-only and become
//! visible in inboxes only after the scheduler flushes between ticks,
//! so every agent sees the same messaging state within a tick.

use std::collections::BTreeMap;

use ax_common::{AgentId, Result};

use crate::world::{Message, MessageBus};

/// Reference bus implementation.
#[derive(Debug, Default)]
pub struct InMemoryBus {
    /// Messages sent this tick, not yet deliverable.
    outbox: Vec<Message>,
    /// Deliverable messages per recipient.
    inboxes: BTreeMap<AgentId, Vec<Message>>,
    delivered_total: u64,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered_total(&self) -> u64 {
        self.delivered_total
    }

    /// Messages still queued for the next flush.
    pub fn queued(&self) -> usize {
        self.outbox.len()
    }
}

impl MessageBus for InMemoryBus {
    fn send(&mut self, message: Message) -> Result<()> {
        self.outbox.push(message);
        Ok(())
    }

    fn drain(&mut self, to: AgentId) -> Vec<Message> {
        self.inboxes.remove(&to).unwrap_or_default()
    }

    fn flush(&mut self, recipients: &[AgentId]) {
        for message in self.outbox.drain(..) {
            match message.to {
                Some(to) => {
                    self.inboxes.entry(to).or_default().push(message);
                    self.delivered_total += 1;
                }
                None => {
                    for &recipient in recipients {
                        if recipient != message.from {
                            self.inboxes
                                .entry(recipient)
                                .or_default()
                                .push(message.clone());
                            self.delivered_total += 1;
                        }
                    }
                }
            }
        }
    }
}
