//! Per-destination ordered delivery.
//!
//! Every rendered message goes through a [`Ticket`] reserved synchronously
//! when its event is routed. Completions are buffered until all earlier
//! tickets for the same destination are released, then handed in order to
//! that destination's lane worker, which performs the sends one at a time.
//! A ticket dropped without completion releases as skipped.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::bridge::sink::SinkSet;
use crate::common::error::SendError;
use crate::common::messages::RenderedMessage;
use crate::common::types::Destination;

struct Lane {
    next_ticket: u64,
    next_release: u64,
    /// Completed out of order, keyed by ticket. `None` marks a skip.
    buffered: BTreeMap<u64, Option<RenderedMessage>>,
    /// Handed to the worker and not yet delivered.
    in_delivery: usize,
    tx: mpsc::UnboundedSender<RenderedMessage>,
}

impl Lane {
    fn is_idle(&self) -> bool {
        self.next_release == self.next_ticket && self.buffered.is_empty() && self.in_delivery == 0
    }
}

#[derive(Default)]
struct GateState {
    lanes: HashMap<Destination, Lane>,
    closed: bool,
}

struct Shared {
    state: Mutex<GateState>,
    sinks: SinkSet,
    tasks: TaskTracker,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, destination: &Destination, seq: u64, message: Option<RenderedMessage>) {
        let mut state = self.lock();
        let Some(lane) = state.lanes.get_mut(destination) else {
            debug!(%destination, "Gate closed, message dropped");
            return;
        };

        lane.buffered.insert(seq, message);
        while let Some(entry) = lane.buffered.remove(&lane.next_release) {
            lane.next_release += 1;
            if let Some(message) = entry {
                if lane.tx.send(message).is_ok() {
                    lane.in_delivery += 1;
                }
            }
        }

        if lane.is_idle() {
            state.lanes.remove(destination);
        }
    }

    /// Mark one message of `destination` as delivered.
    fn delivered(&self, destination: &Destination) {
        let mut state = self.lock();
        if let Some(lane) = state.lanes.get_mut(destination) {
            lane.in_delivery = lane.in_delivery.saturating_sub(1);
            if lane.is_idle() {
                state.lanes.remove(destination);
            }
        }
    }
}

/// Sequence-number gate with one delivery lane per destination.
#[derive(Clone)]
pub struct DeliveryGate {
    shared: Arc<Shared>,
}

impl DeliveryGate {
    pub fn new(sinks: SinkSet) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(GateState::default()),
                sinks,
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Reserve the next slot for `destination`. Never blocks.
    ///
    /// Must be called from within a tokio runtime: the first reservation
    /// for a destination starts its lane worker.
    pub fn reserve(&self, destination: Destination) -> Ticket {
        let mut state = self.shared.lock();
        if state.closed {
            return Ticket {
                shared: Arc::clone(&self.shared),
                destination,
                seq: 0,
                done: false,
            };
        }

        let shared = &self.shared;
        let lane = state.lanes.entry(destination.clone()).or_insert_with(|| {
            let (tx, rx) = mpsc::unbounded_channel();
            shared
                .tasks
                .spawn(run_lane(Arc::clone(shared), destination.clone(), rx));
            Lane {
                next_ticket: 0,
                next_release: 0,
                buffered: BTreeMap::new(),
                in_delivery: 0,
                tx,
            }
        });

        let seq = lane.next_ticket;
        lane.next_ticket += 1;
        Ticket {
            shared: Arc::clone(&self.shared),
            destination,
            seq,
            done: false,
        }
    }

    /// Number of destinations with undelivered or reserved messages.
    #[cfg(test)]
    pub fn active_lanes(&self) -> usize {
        self.shared.lock().lanes.len()
    }

    /// Stop accepting work and drop every lane.
    ///
    /// Messages already handed to a worker are still delivered; messages
    /// waiting on an earlier ticket are dropped.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        state.closed = true;
        let dropped: usize = state.lanes.values().map(|lane| lane.buffered.len()).sum();
        state.lanes.clear();
        self.shared.tasks.close();
        if dropped > 0 {
            warn!("Delivery gate closed with {} buffered messages", dropped);
        }
    }

    /// Wait for every lane worker to finish.
    pub async fn wait(&self) {
        self.shared.tasks.wait().await;
    }
}

/// A reserved delivery slot.
pub struct Ticket {
    shared: Arc<Shared>,
    destination: Destination,
    seq: u64,
    done: bool,
}

impl Ticket {
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Release this slot with a message, or `None` to skip it.
    pub fn complete(mut self, message: Option<RenderedMessage>) {
        self.done = true;
        self.shared.release(&self.destination, self.seq, message);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.done {
            self.shared.release(&self.destination, self.seq, None);
        }
    }
}

async fn run_lane(shared: Arc<Shared>, destination: Destination, mut rx: mpsc::UnboundedReceiver<RenderedMessage>) {
    let sink = shared.sinks.for_channel(destination.channel);

    while let Some(message) = rx.recv().await {
        match sink.deliver(&message).await {
            Ok(()) => {}
            Err(SendError::AuthFailure) => {
                debug!(%destination, "Delivery skipped: platform not authenticated");
            }
            Err(e) => {
                warn!(
                    channel = destination.channel.name(),
                    recipient = ?destination.recipient,
                    "Delivery failed: {}", e
                );
            }
        }
        shared.delivered(&destination);
    }
}
