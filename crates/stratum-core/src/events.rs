//! Event dispatch for holder lifecycle events.
//!
//! The core fires events as a side effect of mutations; delivery is
//! somebody else's problem. Sinks must never block the caller.

use std::sync::Arc;

use stratum_types::HolderEvent;
use tokio::sync::mpsc;
use tracing::trace;

/// Receives holder lifecycle events.
///
/// Implementations must be non-blocking: `emit` is called from the
/// mutation path and returns before the event is delivered anywhere.
/// Delivery failures are swallowed.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: HolderEvent);
}

/// Sink that forwards events into an unbounded channel.
///
/// Sending never blocks; if the receiver is gone the event is dropped.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<HolderEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::UnboundedSender<HolderEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving half of its channel.
    pub fn pair() -> (Arc<Self>, mpsc::UnboundedReceiver<HolderEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(tx)), rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: HolderEvent) {
        if self.tx.send(event).is_err() {
            trace!("event receiver dropped, discarding event");
        }
    }
}

/// Sink that discards every event.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: HolderEvent) {}
}
