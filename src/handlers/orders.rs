use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, patch},
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::MaybeActor,
    entities::OrderStatus,
    handlers::common::{created, ok, ApiResult, Payload},
    services::orders::PlaceOrderRequest,
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> ApiResult<impl IntoResponse> {
    let orders = state.services.orders.list_orders(query.status).await?;
    Ok(ok(orders))
}

async fn place_order(
    State(state): State<AppState>,
    MaybeActor(actor): MaybeActor,
    Payload(payload): Payload<PlaceOrderRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state.services.orders.place_order(payload, actor).await?;
    Ok(created(order))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let order = state.services.orders.get_order(id).await?;
    Ok(ok(order))
}

async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<UpdateOrderStatusRequest>,
) -> ApiResult<impl IntoResponse> {
    let order = state
        .services
        .order_status
        .update_order_status(id, payload.status)
        .await?;
    Ok(ok(order))
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders).post(place_order))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(update_order_status))
}
