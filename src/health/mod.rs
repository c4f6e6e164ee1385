//! Liveness and database readiness.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::db::{check_connection, DbPool};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HealthInfo {
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub database: HealthStatus,
    pub database_latency_ms: u64,
}

/// Health check state
#[derive(Clone)]
pub struct HealthState {
    pub db_pool: Arc<DbPool>,
    pub start_time: SystemTime,
}

impl HealthState {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            db_pool,
            start_time: SystemTime::now(),
        }
    }

    /// Calculate system uptime
    pub fn uptime(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }

    pub async fn check(&self) -> HealthInfo {
        let started = Instant::now();
        let database = match check_connection(&self.db_pool).await {
            Ok(()) => HealthStatus::Up,
            Err(_) => HealthStatus::Down,
        };

        HealthInfo {
            status: database,
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_seconds: self.uptime(),
            database,
            database_latency_ms: started.elapsed().as_millis() as u64,
        }
    }
}

async fn health(State(state): State<HealthState>) -> impl IntoResponse {
    let info = state.check().await;
    let code = match info.status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(info))
}

pub fn health_routes(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}
