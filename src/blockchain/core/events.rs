use super::types::Block;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::debug;

/// Subscriber queue depth for head events.
pub const CHAIN_HEAD_CHAN_SIZE: usize = 10;

/// Posted after the canonical head moved to `block`.
#[derive(Debug, Clone)]
pub struct ChainHeadEvent {
    pub block: Block,
}

/// Fan-out of head events to any number of subscribers.
///
/// Sending never blocks the chain: a subscriber whose queue is full misses
/// that event, and dropped subscribers are pruned on the next send.
#[derive(Default)]
pub struct ChainHeadFeed {
    subscribers: Mutex<Vec<Sender<ChainHeadEvent>>>,
}

impl ChainHeadFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ChainHeadEvent> {
        let (tx, rx) = bounded(CHAIN_HEAD_CHAN_SIZE);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber; returns how many got it.
    pub fn send(&self, event: ChainHeadEvent) -> usize {
        let mut delivered = 0;
        self.subscribers.lock().retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                debug!(number = event.block.number(), "Head subscriber lagging, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}
