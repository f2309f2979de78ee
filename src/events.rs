//! events.rs — chain event fan-out to mempool/wallet/miner observers
//!
//! Events are published synchronously from the single-writer chain loop, so
//! subscribers see them in exact chain order. Backpressure is the
//! subscriber's problem: a lagging receiver drops its oldest events, never
//! the chain's.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::Hash32;
use crate::{Block, ChainEntry};

#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A block was connected to the main chain.
    Connect { entry: ChainEntry, block: Arc<Block> },
    /// A block was disconnected during a reorganization.
    Disconnect { entry: ChainEntry, block: Arc<Block> },
    /// Fired once, before the disconnect/connect sequence of a reorg.
    Reorganize { old_tip: Hash32, new_tip: Hash32 },
    /// The chain tip advanced.
    Tip { entry: ChainEntry },
}

impl ChainEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ChainEvent::Connect { .. } => "connect",
            ChainEvent::Disconnect { .. } => "disconnect",
            ChainEvent::Reorganize { .. } => "reorganize",
            ChainEvent::Tip { .. } => "block",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChainEvent> {
        self.tx.subscribe()
    }

    /// Publish; a bus with no subscribers is not an error.
    pub fn emit(&self, event: ChainEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
