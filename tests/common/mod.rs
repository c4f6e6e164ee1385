#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use kasir_api::{
    auth::{Actor, ACTOR_ID_HEADER, ACTOR_NAME_HEADER, ACTOR_ROLE_HEADER},
    config::AppConfig,
    db,
    entities::material,
    events::{self, Event, EventSender},
    services::{
        inventory::CreateMaterialRequest,
        orders::{OrderLineRequest, PlaceOrderRequest},
        recipes::{CreateMenuRequest, MenuDetail, RecipeLineInput},
    },
    AppState,
};

/// In-memory SQLite application for integration tests.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.auto_migrate = true;
    // One connection keeps every query on the same in-memory database.
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

pub async fn test_pool() -> Arc<db::DbPool> {
    let cfg = test_config();
    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    Arc::new(pool)
}

impl TestApp {
    pub async fn new() -> Self {
        let db_arc = test_pool().await;
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(db_arc, test_config(), Some(event_sender));
        let router = kasir_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Same app, but every event lands on the returned receiver.
    pub async fn with_event_receiver() -> (Self, mpsc::Receiver<Event>) {
        let db_arc = test_pool().await;
        let (event_tx, event_rx) = mpsc::channel(1024);
        let event_sender = Arc::new(EventSender::new(event_tx));

        let state = AppState::new(db_arc, test_config(), Some(event_sender));
        let router = kasir_api::build_router(state.clone());

        let app = Self {
            router,
            state,
            _event_task: tokio::spawn(async {}),
        };
        (app, event_rx)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        actor: Option<&Actor>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(actor) = actor {
            builder = builder
                .header(ACTOR_ID_HEADER, actor.id.to_string())
                .header(ACTOR_NAME_HEADER, actor.name.as_str())
                .header(ACTOR_ROLE_HEADER, actor.role.as_str());
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("response body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn seed_material(
        &self,
        name: &str,
        unit: &str,
        stock: impl Into<Decimal>,
        min_stock: impl Into<Decimal>,
    ) -> material::Model {
        self.state
            .services
            .inventory
            .create_material(CreateMaterialRequest {
                name: name.to_string(),
                unit: unit.to_string(),
                stock: stock.into(),
                min_stock: min_stock.into(),
            })
            .await
            .expect("seed material")
    }

    pub async fn seed_menu(&self, name: &str, price: i64, recipe: &[(Uuid, i64)]) -> MenuDetail {
        let recipe: Vec<(Uuid, Decimal)> = recipe
            .iter()
            .map(|(material_id, quantity)| (*material_id, Decimal::from(*quantity)))
            .collect();
        self.seed_menu_with_quantities(name, price, &recipe).await
    }

    /// Like `seed_menu`, for recipes with fractional quantities.
    pub async fn seed_menu_with_quantities(
        &self,
        name: &str,
        price: i64,
        recipe: &[(Uuid, Decimal)],
    ) -> MenuDetail {
        self.state
            .services
            .recipes
            .create_menu(CreateMenuRequest {
                name: name.to_string(),
                description: None,
                price: Decimal::from(price),
                is_active: Some(true),
                materials: recipe
                    .iter()
                    .map(|(material_id, quantity)| RecipeLineInput {
                        material_id: *material_id,
                        quantity: *quantity,
                    })
                    .collect(),
            })
            .await
            .expect("seed menu")
    }

    pub async fn stock_of(&self, material_id: Uuid) -> Decimal {
        self.state
            .services
            .inventory
            .get_material(material_id)
            .await
            .expect("material")
            .material
            .material
            .stock
            .to_decimal()
    }

    /// Teh, Gula and Air with "Es Teh Manis" (5000) using 10/20/250 of them.
    pub async fn seed_es_teh(&self) -> Catalog {
        let teh = self.seed_material("Teh", "gram", 1000, 100).await;
        let gula = self.seed_material("Gula", "gram", 2000, 200).await;
        let air = self.seed_material("Air", "ml", 10_000, 1000).await;
        let menu = self
            .seed_menu("Es Teh Manis", 5000, &[(teh.id, 10), (gula.id, 20), (air.id, 250)])
            .await;
        Catalog {
            teh,
            gula,
            air,
            menu,
        }
    }
}

pub struct Catalog {
    pub teh: material::Model,
    pub gula: material::Model,
    pub air: material::Model,
    pub menu: MenuDetail,
}

pub fn cashier() -> Actor {
    Actor {
        id: Uuid::new_v4(),
        name: "Sari".to_string(),
        role: "cashier".to_string(),
    }
}

pub fn cashier_order(lines: &[(Uuid, i32)]) -> PlaceOrderRequest {
    PlaceOrderRequest {
        items: lines
            .iter()
            .map(|(menu_id, quantity)| OrderLineRequest {
                menu_id: *menu_id,
                quantity: *quantity,
            })
            .collect(),
        customer_name: None,
        order_type: Default::default(),
    }
}

pub fn decimal(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal: {other}"),
    }
}
