//! Kasir API Library
//!
//! Point-of-sale backend: material inventory, recipe-based menu availability
//! and stock-safe order placement.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod tracing;

use axum::Router;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::db::DbPool;
use crate::events::EventSender;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<EventSender>>,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: config::AppConfig,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let services =
            handlers::AppServices::new(db.clone(), event_sender.clone(), config.order_no_max_attempts);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Every `/api/v1` route.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/materials", handlers::materials::material_routes())
        .nest("/menus", handlers::menus::menu_routes())
        .nest("/orders", handlers::orders::order_routes())
}

/// The full HTTP application: health, `/api/v1`, request ids and tracing.
pub fn build_router(state: AppState) -> Router {
    let health = health::health_routes(health::HealthState::new(state.db.clone()));

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .merge(health)
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
