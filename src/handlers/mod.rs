use std::sync::Arc;

use crate::{
    db::DbPool,
    events::EventSender,
    services::{
        availability::AvailabilityService, inventory::InventoryService,
        order_status::OrderStatusService, orders::OrderService, recipes::RecipeService,
    },
};

pub mod common;
pub mod materials;
pub mod menus;
pub mod orders;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub inventory: Arc<InventoryService>,
    pub recipes: Arc<RecipeService>,
    pub availability: Arc<AvailabilityService>,
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Option<Arc<EventSender>>,
        order_no_max_attempts: u32,
    ) -> Self {
        Self {
            inventory: Arc::new(InventoryService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            recipes: Arc::new(RecipeService::new(db_pool.clone(), event_sender.clone())),
            availability: Arc::new(AvailabilityService::new(db_pool.clone())),
            orders: Arc::new(
                OrderService::new(db_pool.clone(), event_sender.clone())
                    .with_max_attempts(order_no_max_attempts),
            ),
            order_status: Arc::new(OrderStatusService::new(db_pool, event_sender)),
        }
    }
}
