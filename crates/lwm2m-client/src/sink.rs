//! Notification sink backed by a tokio channel.

use lwm2m_core::{NotificationSink, ResourceChanged};
use tokio::sync::mpsc;
use tracing::debug;

/// Forwards change events into an unbounded mpsc channel.
///
/// Unbounded so that `publish` never blocks while an instance lock is held.
/// Order is preserved per sender.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ResourceChanged>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResourceChanged>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn publish(&self, event: ResourceChanged) {
        if self.tx.send(event).is_err() {
            debug!("Dropping change of {}, receiver closed", event.path());
        }
    }
}
