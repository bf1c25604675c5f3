use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod services;

use crate::{
    config::AppConfig,
    events::EventSender,
    gateway::PaymentGateway,
    services::{
        carts::CartService, checkout::CheckoutService, email::ConfirmationMailer,
        orders::OrderService, products::ProductCatalogService,
    },
};

const MAX_REQUEST_BODY_BYTES: usize = 256 * 1024;
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Service instances shared across handlers.
#[derive(Clone)]
pub struct AppServices {
    pub products: ProductCatalogService,
    pub carts: CartService,
    pub orders: OrderService,
    pub checkout: CheckoutService,
}

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub event_sender: EventSender,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn ConfirmationMailer>,
    ) -> Self {
        let carts = CartService::new(db.clone(), event_sender.clone());
        let services = AppServices {
            products: ProductCatalogService::new(db.clone()),
            carts: carts.clone(),
            orders: OrderService::new(db.clone()),
            checkout: CheckoutService::new(
                db.clone(),
                gateway,
                mailer,
                carts,
                event_sender.clone(),
                config.clone(),
            ),
        };

        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match db::check_connection(&state.db).await {
        Ok(()) => Json(json!({ "status": "ok", "database": "connected" })),
        Err(e) => {
            warn!("health check failed: {}", e);
            Json(json!({ "status": "degraded", "database": "unavailable" }))
        }
    }
}

async fn api_status() -> impl IntoResponse {
    Json(json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
    }))
}

/// Versioned API routes.
fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest("/products", handlers::products::router())
        .nest("/cart", handlers::carts::router())
        .nest("/orders", handlers::orders::router())
        .nest(
            "/payments",
            handlers::payments::router().merge(handlers::payment_webhooks::router()),
        )
        .route("/status", get(api_status))
}

fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let allowed_methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    if config.should_allow_permissive_cors() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(allowed_methods)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|origin| {
            let trimmed = origin.trim();
            if trimmed.is_empty() {
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %trimmed, "ignoring unparseable CORS origin");
                    None
                }
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(allowed_methods)
        .allow_headers([axum::http::header::AUTHORIZATION, axum::http::header::CONTENT_TYPE])
}

/// Builds the full application router with middleware applied.
pub fn app_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(TimeoutLayer::new(Duration::from_secs(REQUEST_TIMEOUT_SECS)))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .with_state(state)
}
