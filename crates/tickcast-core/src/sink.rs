//! Non-blocking handoff of per-tick output to background consumers.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::Event;
use crate::game::{Snapshot, TickStats};

/// Everything produced for one tick: the snapshot, the events diffed out of
/// it, and the cost counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutput {
    pub snapshot: Snapshot,
    pub events: Vec<Event>,
    pub stats: TickStats,
    pub game_started: bool,
    pub game_ended: bool,
}

struct Consumer {
    name: String,
    sender: SyncSender<TickOutput>,
}

/// Single-producer fan-out. Each consumer gets its own bounded queue and its
/// own copy of every tick; the publishing side never blocks. A consumer that
/// falls behind loses ticks (warned), one that hangs up is dropped.
///
/// Channel FIFO preserves tick order per consumer.
pub struct SnapshotHub {
    consumers: Vec<Consumer>,
    capacity: usize,
}

impl SnapshotHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            consumers: Vec::new(),
            capacity,
        }
    }

    pub fn subscribe(&mut self, name: &str) -> Receiver<TickOutput> {
        let (sender, receiver) = sync_channel(self.capacity);
        debug!("Registered snapshot consumer '{}'", name);
        self.consumers.push(Consumer {
            name: name.to_string(),
            sender,
        });
        receiver
    }

    pub fn publish(&mut self, output: &TickOutput) {
        self.consumers.retain(|consumer| {
            match consumer.sender.try_send(output.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        "Consumer '{}' is behind, dropping tick {}",
                        consumer.name, output.snapshot.tick
                    );
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    debug!("Consumer '{}' hung up, removing", consumer.name);
                    false
                }
            }
        });
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }
}
