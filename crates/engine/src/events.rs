//! Balance change feed.
//!
//! The ledger publishes the post-commit record of every applied write.
//! Publishing never blocks. Without subscribers the record is dropped, and a
//! lagging subscriber loses the oldest events. Consumers must be able to
//! recover by rescanning the store.

use tokio::sync::broadcast;

use crate::BalanceRecord;

const DEFAULT_CAPACITY: usize = 256;

/// Publishing side of the feed, owned by the engine.
#[derive(Clone, Debug)]
pub struct BalanceEvents {
    sender: broadcast::Sender<BalanceRecord>,
}

impl Default for BalanceEvents {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl BalanceEvents {
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, record: BalanceRecord) {
        let entity_id = record.entity_id;
        if self.sender.send(record).is_err() {
            tracing::trace!("no balance subscribers, dropped change for group {entity_id}");
        }
    }

    pub fn subscribe(&self) -> BalanceSubscription {
        BalanceSubscription {
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receiving side of the feed.
#[derive(Debug)]
pub struct BalanceSubscription {
    receiver: broadcast::Receiver<BalanceRecord>,
}

impl BalanceSubscription {
    /// Next published record, or `None` once the engine is gone.
    ///
    /// Lag is logged and skipped over.
    pub async fn recv(&mut self) -> Option<BalanceRecord> {
        loop {
            match self.receiver.recv().await {
                Ok(record) => return Some(record),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("balance subscriber lagged, {skipped} changes dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
