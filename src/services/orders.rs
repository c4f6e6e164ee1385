//! Order placement.
//!
//! Placing an order runs in three phases:
//!
//! 1. **Pre-check**: every line is evaluated against current stock. This is a
//!    fast rejection for the caller and not the safety mechanism.
//! 2. **Pricing**: current menu prices and the recipe lines of every ordered
//!    menu are read once. The deduction plan is built from that snapshot.
//! 3. **Commit**: one transaction performs a conditional decrement per
//!    material (sorted by id), then assigns the order number and inserts the
//!    order with its lines. Any failed decrement rolls the whole order back,
//!    so stock never goes negative even when two orders raced past the
//!    pre-check.
//!
//! An order number collision is the only failure that re-runs the commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::Actor,
    db::{is_unique_violation, DbPool},
    entities::{material, menu, order, order_item, OrderStatus, OrderType, Quantity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        availability::{self, StockedLine, Verdict},
        inventory,
    },
};

const DEFAULT_ORDER_NO_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineRequest {
    pub menu_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLineRequest>,
    pub customer_name: Option<String>,
    #[serde(rename = "type", default)]
    pub order_type: OrderType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDetail {
    #[serde(flatten)]
    pub item: order_item::Model,
    pub menu_name: String,
}

/// An order with its lines, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<OrderItemDetail>,
}

/// A priced line ready to be written.
#[derive(Debug, Clone)]
struct PricedLine {
    menu_id: Uuid,
    menu_name: String,
    quantity: i32,
    price: Decimal,
    subtotal: Decimal,
}

/// Everything the commit transaction needs, computed before it starts.
#[derive(Debug, Clone)]
struct OrderPlan {
    order_type: OrderType,
    customer_name: Option<String>,
    created_by: Option<Uuid>,
    created_by_name: Option<String>,
    lines: Vec<PricedLine>,
    total_price: Decimal,
    /// Total amount per material across all lines, ordered by material id.
    deductions: BTreeMap<Uuid, Quantity>,
    /// Material id to (material name, first menu consuming it).
    consumers: HashMap<Uuid, (String, String)>,
}

impl OrderPlan {
    fn shortage(&self, material_ids: &[Uuid]) -> ServiceError {
        let menu = material_ids
            .first()
            .and_then(|id| self.consumers.get(id))
            .map(|(_, menu)| menu.clone())
            .unwrap_or_else(|| "order".to_string());
        let materials = material_ids
            .iter()
            .map(|id| {
                self.consumers
                    .get(id)
                    .map(|(name, _)| name.clone())
                    .unwrap_or_else(|| id.to_string())
            })
            .collect();
        ServiceError::InsufficientStock { menu, materials }
    }
}

fn normalized_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// Request-shape checks that need no storage access.
pub fn validate_order_request(
    request: &PlaceOrderRequest,
    actor: Option<&Actor>,
) -> Result<(), ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::InvalidOrder(
            "Order must contain at least one item".to_string(),
        ));
    }
    if let Some(line) = request.items.iter().find(|l| l.quantity <= 0) {
        return Err(ServiceError::InvalidOrder(format!(
            "Quantity for menu {} must be positive",
            line.menu_id
        )));
    }
    match request.order_type {
        OrderType::SelfOrder => {
            if normalized_name(request.customer_name.clone()).is_none() {
                return Err(ServiceError::InvalidOrder(
                    "Customer name is required for self-orders".to_string(),
                ));
            }
        }
        OrderType::Cashier => {
            if actor.is_none() {
                return Err(ServiceError::Unauthorized(
                    "Cashier orders require a signed-in staff member".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// Sums `recipe quantity * ordered quantity` per material over all lines.
fn plan_deductions(
    lines: &[PricedLine],
    recipes: &HashMap<Uuid, Vec<StockedLine>>,
) -> Result<(BTreeMap<Uuid, Quantity>, HashMap<Uuid, (String, String)>), ServiceError> {
    let mut deductions: BTreeMap<Uuid, Quantity> = BTreeMap::new();
    let mut consumers = HashMap::new();

    for line in lines {
        let ordered = Decimal::from(line.quantity);
        for recipe in recipes.get(&line.menu_id).map(Vec::as_slice).unwrap_or(&[]) {
            let amount = recipe
                .required
                .checked_mul(ordered)
                .and_then(|amount| Quantity::try_from(amount).ok())
                .ok_or_else(|| {
                    ServiceError::InvalidOrder(format!(
                        "Quantity for {} is too large",
                        line.menu_name
                    ))
                })?;
            let total = deductions.entry(recipe.material_id).or_insert(Quantity::ZERO);
            *total = total.checked_add(amount).ok_or_else(|| {
                ServiceError::InvalidOrder("Order quantities are too large".to_string())
            })?;
            consumers
                .entry(recipe.material_id)
                .or_insert_with(|| (recipe.material_name.clone(), line.menu_name.clone()));
        }
    }

    Ok((deductions, consumers))
}

/// Order placement, lookup and listing
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
    max_attempts: u32,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
            max_attempts: DEFAULT_ORDER_NO_ATTEMPTS,
        }
    }

    /// How many times a commit is re-run after an order number collision.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Places an order: pre-check, pricing, then one atomic commit.
    #[instrument(skip(self, request, actor), fields(order_type = %request.order_type, lines = request.items.len()))]
    pub async fn place_order(
        &self,
        request: PlaceOrderRequest,
        actor: Option<Actor>,
    ) -> Result<OrderDetail, ServiceError> {
        let result = self.place_order_inner(request, actor).await;
        match &result {
            Ok(order) => {
                counter!("kasir.orders.placed", 1);
                info!(order_id = %order.order.id, order_no = %order.order.order_no, "Order placed");
            }
            Err(e) => {
                let reason = match e {
                    ServiceError::InsufficientStock { .. } => "insufficient_stock",
                    ServiceError::NotFound(_) => "not_found",
                    ServiceError::InvalidOrder(_) => "invalid_order",
                    ServiceError::Unauthorized(_) => "unauthorized",
                    ServiceError::Conflict(_) => "conflict",
                    _ => "error",
                };
                counter!("kasir.orders.rejected", 1, "reason" => reason);
                info!(reason, error = %e, "Order rejected");
            }
        }
        result
    }

    async fn place_order_inner(
        &self,
        request: PlaceOrderRequest,
        actor: Option<Actor>,
    ) -> Result<OrderDetail, ServiceError> {
        validate_order_request(&request, actor.as_ref())?;

        self.pre_check(&request.items).await?;
        let plan = self.price(request, actor).await?;

        let mut attempt = 1;
        let (order, items) = loop {
            match self.commit(&plan).await {
                Err(ServiceError::Conflict(msg)) if attempt < self.max_attempts => {
                    counter!("kasir.orders.order_no_conflicts", 1);
                    warn!(attempt, error = %msg, "Order number collision, committing again");
                    attempt += 1;
                }
                Err(ServiceError::Conflict(msg)) => {
                    counter!("kasir.orders.order_no_conflicts", 1);
                    break Err(ServiceError::Conflict(msg));
                }
                other => break other,
            }
        }?;

        self.publish_placed(&plan, &order).await;

        let names: HashMap<Uuid, String> = plan
            .lines
            .iter()
            .map(|l| (l.menu_id, l.menu_name.clone()))
            .collect();
        Ok(OrderDetail {
            items: items
                .into_iter()
                .map(|item| OrderItemDetail {
                    menu_name: names.get(&item.menu_id).cloned().unwrap_or_default(),
                    item,
                })
                .collect(),
            order,
        })
    }

    /// Evaluates every line against current stock and fails on the first
    /// line that cannot be served.
    async fn pre_check(&self, items: &[OrderLineRequest]) -> Result<(), ServiceError> {
        let db = &*self.db_pool;
        let menu_ids: Vec<Uuid> = items.iter().map(|l| l.menu_id).collect();

        let menus: HashMap<Uuid, menu::Model> = menu::Entity::find()
            .filter(menu::Column::Id.is_in(menu_ids.iter().copied()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let recipes = availability::load_stocked_lines(db, &menu_ids)
            .await
            .map_err(ServiceError::db_error)?;

        for line in items {
            let menu = menus.get(&line.menu_id);
            let lines = recipes.get(&line.menu_id).map(Vec::as_slice).unwrap_or(&[]);
            match availability::evaluate(menu, lines, Decimal::from(line.quantity)) {
                Verdict::Servable => {}
                Verdict::NotFound => {
                    return Err(ServiceError::NotFound(format!(
                        "Menu {} not found",
                        line.menu_id
                    )))
                }
                Verdict::Inactive => {
                    let name = menu.map(|m| m.name.as_str()).unwrap_or_default();
                    return Err(ServiceError::InvalidOrder(format!(
                        "Menu {} is not available for sale",
                        name
                    )));
                }
                Verdict::Short(materials) => {
                    let name = menu.map(|m| m.name.clone()).unwrap_or_default();
                    return Err(ServiceError::InsufficientStock {
                        menu: name,
                        materials,
                    });
                }
            }
        }

        debug!("Pre-check passed");
        Ok(())
    }

    /// Resolves current prices and snapshots the recipes the commit will deduct.
    async fn price(
        &self,
        request: PlaceOrderRequest,
        actor: Option<Actor>,
    ) -> Result<OrderPlan, ServiceError> {
        let db = &*self.db_pool;
        let menu_ids: Vec<Uuid> = request.items.iter().map(|l| l.menu_id).collect();

        let menus: HashMap<Uuid, menu::Model> = menu::Entity::find()
            .filter(menu::Column::Id.is_in(menu_ids.iter().copied()))
            .all(db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut lines = Vec::with_capacity(request.items.len());
        let mut total_price = Decimal::ZERO;
        for line in &request.items {
            let menu = menus.get(&line.menu_id).ok_or_else(|| {
                ServiceError::NotFound(format!("Menu {} not found", line.menu_id))
            })?;
            if !menu.is_active {
                return Err(ServiceError::InvalidOrder(format!(
                    "Menu {} is not available for sale",
                    menu.name
                )));
            }

            let subtotal = menu
                .price
                .checked_mul(Decimal::from(line.quantity))
                .ok_or_else(|| {
                    ServiceError::InvalidOrder(format!("Quantity for {} is too large", menu.name))
                })?;
            total_price = total_price.checked_add(subtotal).ok_or_else(|| {
                ServiceError::InvalidOrder("Order total is too large".to_string())
            })?;

            lines.push(PricedLine {
                menu_id: menu.id,
                menu_name: menu.name.clone(),
                quantity: line.quantity,
                price: menu.price,
                subtotal,
            });
        }

        let recipes = availability::load_stocked_lines(db, &menu_ids)
            .await
            .map_err(ServiceError::db_error)?;
        let (deductions, consumers) = plan_deductions(&lines, &recipes)?;

        let (created_by, created_by_name) = match (request.order_type, actor) {
            (OrderType::Cashier, Some(actor)) => (Some(actor.id), Some(actor.name)),
            _ => (None, None),
        };

        Ok(OrderPlan {
            order_type: request.order_type,
            customer_name: normalized_name(request.customer_name),
            created_by,
            created_by_name,
            lines,
            total_price,
            deductions,
            consumers,
        })
    }

    /// The atomic unit: conditional decrements, order number, order and lines.
    async fn commit(
        &self,
        plan: &OrderPlan,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin order transaction");
            ServiceError::db_error(e)
        })?;

        let mut short = Vec::new();
        for (material_id, amount) in &plan.deductions {
            let applied = inventory::try_decrement(&txn, *material_id, *amount)
                .await
                .map_err(|e| {
                    error!(error = %e, %material_id, "Stock decrement failed");
                    ServiceError::db_error(e)
                })?;
            if !applied {
                short.push(*material_id);
            }
        }
        if !short.is_empty() {
            txn.rollback().await.map_err(ServiceError::db_error)?;
            warn!(materials = ?short, "Stock ran out between pre-check and commit");
            return Err(plan.shortage(&short));
        }

        let count = order::Entity::find()
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let now = Utc::now();
        let order_no = format!("ORD-{}-{}", now.timestamp_millis(), count + 1);

        let order_id = Uuid::new_v4();
        let inserted = order::ActiveModel {
            id: Set(order_id),
            order_no: Set(order_no.clone()),
            customer_name: Set(plan.customer_name.clone()),
            total_price: Set(plan.total_price),
            status: Set(OrderStatus::Pending),
            order_type: Set(plan.order_type),
            created_by: Set(plan.created_by),
            created_by_name: Set(plan.created_by_name.clone()),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await;

        let order = match inserted {
            Ok(order) => order,
            Err(e) => {
                let conflict = is_unique_violation(&e);
                txn.rollback().await.map_err(ServiceError::db_error)?;
                return Err(if conflict {
                    ServiceError::Conflict(format!("Order number {} already taken", order_no))
                } else {
                    error!(error = %e, "Failed to insert order");
                    ServiceError::db_error(e)
                });
            }
        };

        let mut items = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                menu_id: Set(line.menu_id),
                quantity: Set(line.quantity),
                price: Set(line.price),
                subtotal: Set(line.subtotal),
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, %order_id, "Failed to insert order item");
                ServiceError::db_error(e)
            })?;
            items.push(item);
        }

        txn.commit().await.map_err(|e: DbErr| {
            error!(error = %e, %order_id, "Failed to commit order");
            if is_unique_violation(&e) {
                ServiceError::Conflict(format!("Order number {} already taken", order_no))
            } else {
                ServiceError::db_error(e)
            }
        })?;

        Ok((order, items))
    }

    async fn publish_placed(&self, plan: &OrderPlan, order: &order::Model) {
        let Some(sender) = &self.event_sender else {
            return;
        };

        sender
            .send_or_log(Event::OrderPlaced {
                order_id: order.id,
                order_no: order.order_no.clone(),
                order_type: order.order_type,
                total_price: order.total_price,
                at: order.created_at,
            })
            .await;

        for (material_id, quantity) in &plan.deductions {
            sender
                .send_or_log(Event::StockDeducted {
                    order_id: order.id,
                    material_id: *material_id,
                    quantity: quantity.to_decimal(),
                })
                .await;
        }

        let ids: Vec<Uuid> = plan.deductions.keys().copied().collect();
        let materials = match material::Entity::find()
            .filter(material::Column::Id.is_in(ids))
            .all(&*self.db_pool)
            .await
        {
            Ok(materials) => materials,
            Err(e) => {
                warn!(error = %e, "Could not reload materials for low stock check");
                return;
            }
        };

        for material in materials {
            let deducted = plan
                .deductions
                .get(&material.id)
                .copied()
                .unwrap_or_default();
            let was_above = material
                .stock
                .checked_add(deducted)
                .is_some_and(|before| before > material.min_stock);
            if material.is_low_stock() && was_above {
                sender
                    .send_or_log(Event::LowStock {
                        material_id: material.id,
                        name: material.name,
                        stock: material.stock.to_decimal(),
                        min_stock: material.min_stock.to_decimal(),
                    })
                    .await;
            }
        }
    }

    async fn load_details(&self, orders: Vec<order::Model>) -> Result<Vec<OrderDetail>, ServiceError> {
        let db = &*self.db_pool;
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let rows = order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .find_also_related(menu::Entity)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        let mut by_order: HashMap<Uuid, Vec<OrderItemDetail>> = HashMap::new();
        for (item, menu) in rows {
            by_order.entry(item.order_id).or_default().push(OrderItemDetail {
                menu_name: menu.map(|m| m.name).unwrap_or_default(),
                item,
            });
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetail {
                items: by_order.remove(&order.id).unwrap_or_default(),
                order,
            })
            .collect())
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let order = order::Entity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch order {}: {}", order_id, e);
                ServiceError::db_error(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let mut details = self.load_details(vec![order]).await?;
        details
            .pop()
            .ok_or_else(|| ServiceError::InternalError("Order vanished while loading".to_string()))
    }

    /// Orders newest first, optionally restricted to one status.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
    ) -> Result<Vec<OrderDetail>, ServiceError> {
        let mut query = order::Entity::find().order_by_desc(order::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(order::Column::Status.eq(status));
        }

        let orders = query
            .all(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        self.load_details(orders).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use crate::entities::menu_material;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn request(order_type: OrderType, customer: Option<&str>, qty: i32) -> PlaceOrderRequest {
        PlaceOrderRequest {
            items: vec![OrderLineRequest {
                menu_id: Uuid::new_v4(),
                quantity: qty,
            }],
            customer_name: customer.map(str::to_string),
            order_type,
        }
    }

    fn cashier() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: "Sari".into(),
            role: "cashier".into(),
        }
    }

    #[test]
    fn empty_order_is_invalid() {
        let mut req = request(OrderType::Cashier, None, 1);
        req.items.clear();
        assert!(matches!(
            validate_order_request(&req, Some(&cashier())),
            Err(ServiceError::InvalidOrder(_))
        ));
    }

    #[test]
    fn non_positive_quantity_is_invalid() {
        let req = request(OrderType::Cashier, None, 0);
        assert!(matches!(
            validate_order_request(&req, Some(&cashier())),
            Err(ServiceError::InvalidOrder(_))
        ));
    }

    #[test]
    fn self_order_needs_customer_name() {
        let req = request(OrderType::SelfOrder, Some("   "), 1);
        assert!(matches!(
            validate_order_request(&req, None),
            Err(ServiceError::InvalidOrder(_))
        ));
        let req = request(OrderType::SelfOrder, Some("Budi"), 1);
        assert!(validate_order_request(&req, None).is_ok());
    }

    #[test]
    fn cashier_order_needs_actor() {
        let req = request(OrderType::Cashier, None, 1);
        assert!(matches!(
            validate_order_request(&req, None),
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[test]
    fn deductions_sum_shared_materials() {
        let gula = Uuid::new_v4();
        let teh_menu = Uuid::new_v4();
        let kopi_menu = Uuid::new_v4();
        let priced = |menu_id, name: &str, quantity| PricedLine {
            menu_id,
            menu_name: name.to_string(),
            quantity,
            price: dec!(1),
            subtotal: dec!(1),
        };
        let gula_line = |required| StockedLine {
            material_id: gula,
            material_name: "Gula".into(),
            unit: "gram".into(),
            required,
            stock: dec!(2000),
        };

        let lines = vec![
            priced(teh_menu, "Es Teh Manis", 2),
            priced(kopi_menu, "Es Kopi Susu", 3),
        ];
        let recipes = HashMap::from([
            (teh_menu, vec![gula_line(dec!(20))]),
            (kopi_menu, vec![gula_line(dec!(15))]),
        ]);

        let (deductions, consumers) = plan_deductions(&lines, &recipes).unwrap();
        assert_eq!(deductions.get(&gula), Some(&Quantity::from_milli(85_000)));
        assert_eq!(
            consumers.get(&gula),
            Some(&("Gula".to_string(), "Es Teh Manis".to_string()))
        );
    }

    async fn service() -> OrderService {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&pool).await.unwrap();
        OrderService::new(Arc::new(pool), None)
    }

    async fn insert_material(db: &DbPool, id: Uuid, name: &str, stock: Decimal) -> material::Model {
        material::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            unit: Set("gram".to_string()),
            stock: Set(Quantity::try_from(stock).unwrap()),
            min_stock: Set(Quantity::ZERO),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    async fn insert_menu(db: &DbPool, name: &str, recipe: &[(Uuid, Decimal)]) -> menu::Model {
        let menu = menu::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(None),
            price: Set(dec!(15000)),
            is_active: Set(true),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap();

        for (material_id, quantity) in recipe {
            menu_material::ActiveModel {
                id: Set(Uuid::new_v4()),
                menu_id: Set(menu.id),
                material_id: Set(*material_id),
                quantity: Set(Quantity::try_from(*quantity).unwrap()),
            }
            .insert(db)
            .await
            .unwrap();
        }
        menu
    }

    fn order_of(lines: &[(Uuid, i32)]) -> PlaceOrderRequest {
        PlaceOrderRequest {
            items: lines
                .iter()
                .map(|(menu_id, quantity)| OrderLineRequest {
                    menu_id: *menu_id,
                    quantity: *quantity,
                })
                .collect(),
            customer_name: None,
            order_type: OrderType::Cashier,
        }
    }

    async fn stock(db: &DbPool, id: Uuid) -> Quantity {
        material::Entity::find_by_id(id)
            .one(db)
            .await
            .unwrap()
            .unwrap()
            .stock
    }

    #[tokio::test]
    async fn commit_rolls_back_when_a_later_material_ran_out() {
        let svc = service().await;
        let db = &*svc.db_pool;
        // Decrements run in id order, so susu is lowered before kopi is found short.
        let susu = insert_material(db, Uuid::from_u128(1), "Susu", dec!(1000)).await;
        let kopi = insert_material(db, Uuid::from_u128(2), "Kopi", dec!(100)).await;
        let menu = insert_menu(db, "Es Kopi Susu", &[(susu.id, dec!(150)), (kopi.id, dec!(20))]).await;

        let request = order_of(&[(menu.id, 2)]);
        svc.pre_check(&request.items).await.unwrap();
        let plan = svc.price(request, Some(cashier())).await.unwrap();

        // A concurrent sale takes the kopi after the pre-check passed.
        assert!(inventory::try_decrement(db, kopi.id, Quantity::from_milli(90_000))
            .await
            .unwrap());

        let err = svc.commit(&plan).await.unwrap_err();
        assert_matches!(
            err,
            ServiceError::InsufficientStock { menu, materials }
                if menu == "Es Kopi Susu" && materials == vec!["Kopi".to_string()]
        );

        assert_eq!(stock(db, susu.id).await, susu.stock);
        assert_eq!(stock(db, kopi.id).await, Quantity::from_milli(10_000));
        assert_eq!(order::Entity::find().count(db).await.unwrap(), 0);
        assert_eq!(order_item::Entity::find().count(db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn fractional_recipes_deduct_exact_thousandths() {
        let svc = service().await;
        let db = &*svc.db_pool;
        let gula = insert_material(db, Uuid::new_v4(), "Gula Aren", dec!(0.1)).await;
        let teh = insert_menu(db, "Teh Tarik", &[(gula.id, dec!(0.015))]).await;
        let kopi = insert_menu(db, "Kopi Aren", &[(gula.id, dec!(0.02))]).await;

        let placed = svc
            .place_order(order_of(&[(teh.id, 2), (kopi.id, 2)]), Some(cashier()))
            .await
            .unwrap();
        assert_eq!(placed.items.len(), 2);
        assert_eq!(stock(db, gula.id).await, Quantity::from_milli(30));

        let err = svc
            .place_order(order_of(&[(kopi.id, 2)]), Some(cashier()))
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InsufficientStock { .. });

        svc.place_order(order_of(&[(teh.id, 2)]), Some(cashier()))
            .await
            .unwrap();
        assert_eq!(stock(db, gula.id).await, Quantity::ZERO);
        assert_eq!(order::Entity::find().count(db).await.unwrap(), 2);
    }
}
