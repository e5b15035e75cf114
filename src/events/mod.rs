use crate::entities::UnitStatus;
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Domain events emitted after a unit of work has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    SaleCompleted {
        sale_id: Uuid,
        unit_id: Uuid,
        final_price: Decimal,
    },
    SaleUpdated(Uuid),
    SaleCancelled {
        sale_id: Uuid,
        unit_id: Uuid,
        /// false when the unit had already diverged and was left untouched
        unit_released: bool,
    },
    UnitStatusChanged {
        unit_id: Uuid,
        from: UnitStatus,
        to: UnitStatus,
    },
    UnitReconciled {
        unit_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SaleCompleted { .. } => "sale_completed",
            Event::SaleUpdated(_) => "sale_updated",
            Event::SaleCancelled { .. } => "sale_cancelled",
            Event::UnitStatusChanged { .. } => "unit_status_changed",
            Event::UnitReconciled { .. } => "unit_reconciled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Non-blocking send that only logs on failure. State has already committed by the time
    /// events go out, so a full or closed channel never fails the caller.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.sender.try_send(event) {
            counter!("dealership.events.dropped", 1);
            warn!(event = name, error = %e, "Domain event not delivered");
        }
    }
}

/// Creates a bounded channel and its sender wrapper.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("dealership.events.processed", 1, "event" => event.name());
        match &event {
            Event::SaleCompleted {
                sale_id,
                unit_id,
                final_price,
            } => {
                info!(sale_id = %sale_id, unit_id = %unit_id, final_price = %final_price, "Sale completed");
            }
            Event::SaleCancelled {
                sale_id,
                unit_id,
                unit_released,
            } => {
                info!(sale_id = %sale_id, unit_id = %unit_id, unit_released, "Sale cancelled");
            }
            Event::UnitReconciled { unit_id } => {
                warn!(unit_id = %unit_id, "Unit released by reconciliation");
            }
            other => debug!(event = ?other, "Event received"),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut rx) = channel(4);
        let unit_id = Uuid::new_v4();
        sender
            .send(Event::UnitStatusChanged {
                unit_id,
                from: UnitStatus::Available,
                to: UnitStatus::Reserved,
            })
            .await
            .unwrap();
        sender.send(Event::UnitReconciled { unit_id }).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "unit_status_changed");
        assert_eq!(rx.recv().await.unwrap(), Event::UnitReconciled { unit_id });
    }

    #[tokio::test]
    async fn send_or_log_swallows_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.send_or_log(Event::SaleUpdated(Uuid::new_v4()));
        assert!(sender.send(Event::SaleUpdated(Uuid::new_v4())).await.is_err());
    }
}
