//! Event system for committed decisions
//!
//! Events are emitted only after the approval transaction has committed, so a
//! listener never sees a movement that was rolled back. Useful for:
//! - Audit logging
//! - Dashboard cache invalidation
//! - Courier notifications

use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, trace, warn};

/// Events a lagging listener may fall behind by before it skips ahead
const EVENT_BACKLOG: usize = 256;

/// Events emitted by the approval service
#[derive(Debug, Clone)]
pub enum SupplyEvent {
    CardApproved {
        card_id: String,
        transfer_id: String,
    },
    CardRejected {
        card_id: String,
    },
    TransferCreated {
        transfer_id: String,
        card_id: Option<String>,
        courier_id: Option<String>,
    },
    StockMoved {
        item_id: String,
        from_facility_id: String,
        to_facility_id: String,
        quantity: i64,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    /// Handle an event
    fn on_event(&self, event: &SupplyEvent);
}

/// Event bus for broadcasting supply events
pub struct EventBus {
    sender: broadcast::Sender<SupplyEvent>,
}

impl EventBus {
    /// Create an event bus; slow listeners lag rather than block decisions
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BACKLOG);
        Self { sender }
    }

    /// Publish a committed change; dropped when nobody listens
    pub fn emit(&self, event: SupplyEvent) {
        if let Err(broadcast::error::SendError(unheard)) = self.sender.send(event) {
            trace!(event = ?unheard, "No listeners for supply event");
        }
    }

    /// Receive every event emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SupplyEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Audit trail listener
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &SupplyEvent) {
        match event {
            SupplyEvent::CardApproved { card_id, transfer_id } => {
                info!(card_id = %card_id, transfer_id = %transfer_id, "Card approved");
            }
            SupplyEvent::CardRejected { card_id } => {
                info!(card_id = %card_id, "Card rejected");
            }
            SupplyEvent::StockMoved {
                item_id,
                from_facility_id,
                to_facility_id,
                quantity,
            } => {
                info!(
                    item_id = %item_id,
                    from = %from_facility_id,
                    to = %to_facility_id,
                    quantity,
                    "Stock moved"
                );
            }
            _ => {
                trace!(event = ?event, "Supply event");
            }
        }
    }
}

/// Run the audit trail until the bus is dropped
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => LoggingEventListener.on_event(&event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "Audit trail fell behind; events not logged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
