pub mod availability;
pub mod inventory;
pub mod order_status;
pub mod orders;
pub mod recipes;
