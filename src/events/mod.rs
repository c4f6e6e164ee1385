use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{OrderStatus, OrderType};

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

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        let kind = event.kind();
        if let Err(e) = self.send(event).await {
            warn!(event = kind, error = %e, "Dropping domain event");
        }
    }
}

/// Domain events published after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderPlaced {
        order_id: Uuid,
        order_no: String,
        order_type: OrderType,
        total_price: Decimal,
        at: DateTime<Utc>,
    },
    StockDeducted {
        order_id: Uuid,
        material_id: Uuid,
        quantity: Decimal,
    },
    /// A material dropped to or below its minimum stock.
    LowStock {
        material_id: Uuid,
        name: String,
        stock: Decimal,
        min_stock: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    MaterialRestocked {
        material_id: Uuid,
        delta: Decimal,
        stock: Decimal,
    },
    RecipeReplaced {
        menu_id: Uuid,
        lines: usize,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::OrderPlaced { .. } => "order_placed",
            Event::StockDeducted { .. } => "stock_deducted",
            Event::LowStock { .. } => "low_stock",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::MaterialRestocked { .. } => "material_restocked",
            Event::RecipeReplaced { .. } => "recipe_replaced",
        }
    }
}

/// Drains the event channel and records every event in the log.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderPlaced {
                order_id,
                order_no,
                order_type,
                total_price,
                ..
            } => {
                info!(%order_id, %order_no, %order_type, %total_price, "Order placed");
            }
            Event::StockDeducted {
                order_id,
                material_id,
                quantity,
            } => {
                info!(%order_id, %material_id, %quantity, "Stock deducted");
            }
            Event::LowStock {
                material_id,
                name,
                stock,
                min_stock,
            } => {
                warn!(%material_id, material = %name, %stock, %min_stock, "Material is low on stock");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::MaterialRestocked {
                material_id,
                delta,
                stock,
            } => {
                info!(%material_id, %delta, %stock, "Material stock adjusted");
            }
            Event::RecipeReplaced { menu_id, lines } => {
                info!(%menu_id, lines, "Recipe replaced");
            }
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_delivers_to_receiver() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let menu_id = Uuid::new_v4();

        sender
            .send(Event::RecipeReplaced { menu_id, lines: 2 })
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(Event::RecipeReplaced { menu_id, lines: 2 }));
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);

        assert!(sender
            .send(Event::RecipeReplaced {
                menu_id: Uuid::new_v4(),
                lines: 1
            })
            .await
            .is_err());
        sender
            .send_or_log(Event::RecipeReplaced {
                menu_id: Uuid::new_v4(),
                lines: 1,
            })
            .await;
    }
}
