use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    handlers::common::{created, ok, ApiResult, Payload},
    services::inventory::{AdjustStockRequest, CreateMaterialRequest, UpdateMaterialRequest},
    AppState,
};

async fn list_materials(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let materials = state.services.inventory.list_materials().await?;
    Ok(ok(materials))
}

async fn list_low_stock(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let materials = state.services.inventory.list_low_stock().await?;
    Ok(ok(materials))
}

async fn get_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let material = state.services.inventory.get_material(id).await?;
    Ok(ok(material))
}

async fn create_material(
    State(state): State<AppState>,
    Payload(payload): Payload<CreateMaterialRequest>,
) -> ApiResult<impl IntoResponse> {
    let material = state.services.inventory.create_material(payload).await?;
    Ok(created(material))
}

async fn update_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<UpdateMaterialRequest>,
) -> ApiResult<impl IntoResponse> {
    let material = state
        .services
        .inventory
        .update_material(id, payload)
        .await?;
    Ok(ok(material))
}

async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Payload(payload): Payload<AdjustStockRequest>,
) -> ApiResult<impl IntoResponse> {
    let material = state
        .services
        .inventory
        .adjust_stock(id, payload.delta)
        .await?;
    Ok(ok(material))
}

async fn delete_material(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.services.inventory.delete_material(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn material_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_materials).post(create_material))
        .route("/low-stock", get(list_low_stock))
        .route(
            "/:id",
            get(get_material)
                .put(update_material)
                .delete(delete_material),
        )
        .route("/:id/adjust", post(adjust_stock))
}
