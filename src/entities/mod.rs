pub mod material;
pub mod menu;
pub mod menu_material;
pub mod order;
pub mod order_item;
pub mod quantity;

pub use order::{OrderStatus, OrderType};
pub use quantity::{Quantity, QuantityError};
