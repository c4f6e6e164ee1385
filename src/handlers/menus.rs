use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    handlers::common::{created, ok, ApiResult, Payload},
    services::recipes::{CreateMenuRequest, UpdateMenuRequest},
    AppState,
};

#[derive(Debug, Default, Deserialize)]
pub struct CanServeQuery {
    /// Defaults to one unit.
    pub quantity: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MenuAvailability {
    menu_id: Uuid,
    is_available: bool,
}

async fn list_menus(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let menus = state
        .services
        .availability
        .list_menus_with_availability()
        .await?;
    Ok(ok(menus))
}

async fn get_menu(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let menu = state.services.recipes.get_menu(id).await?;
    Ok(ok(menu))
}

async fn get_menu_availability(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let is_available = state.services.availability.get_menu_availability(id).await?;
    Ok(ok(MenuAvailability {
        menu_id: id,
        is_available,
    }))
}

async fn check_can_serve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<CanServeQuery>,
) -> ApiResult<impl IntoResponse> {
    let result = state
        .services
        .availability
        .check_can_serve(id, query.quantity.unwrap_or(Decimal::ONE))
        .await?;
    Ok(ok(result))
}

async fn create_menu(
    State(state): State<AppState>,
    Payload(payload): Payload<CreateMenuRequest>,
) -> ApiResult<impl IntoResponse> {
    let menu = state.services.recipes.create_menu(payload).await?;
    Ok(created(menu))
}

async fn update_menu(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<UpdateMenuRequest>,
) -> ApiResult<impl IntoResponse> {
    let menu = state.services.recipes.update_menu(id, payload).await?;
    Ok(ok(menu))
}

async fn delete_menu(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let menu = state.services.recipes.delete_menu(id).await?;
    Ok(ok(menu))
}

pub fn menu_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_menus).post(create_menu))
        .route("/:id", get(get_menu).put(update_menu).delete(delete_menu))
        .route("/:id/availability", get(get_menu_availability))
        .route("/:id/can-serve", get(check_can_serve))
}
