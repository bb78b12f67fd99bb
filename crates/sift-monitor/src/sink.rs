//! Consumers of reconciled events.

use sift_core::MonitorEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Receives the monitor's semantic events, in emission order.
pub trait EventSink {
    fn emit(&mut self, event: MonitorEvent);
}

impl EventSink for Vec<MonitorEvent> {
    fn emit(&mut self, event: MonitorEvent) {
        self.push(event);
    }
}

impl EventSink for mpsc::UnboundedSender<MonitorEvent> {
    fn emit(&mut self, event: MonitorEvent) {
        if let Err(e) = self.send(event) {
            warn!("Event receiver dropped, discarding {}", e.0);
        }
    }
}
