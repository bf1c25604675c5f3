use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    entities::product::ProductSize,
    errors::ServiceError,
    handlers::common::{success_response, validate_input},
    services::carts::CartLine,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub size: ProductSize,
    #[serde(default = "default_quantity")]
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i32,
}

fn cart_body(items: Vec<CartLine>) -> serde_json::Value {
    json!({ "items": items })
}

async fn get_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state.services.carts.get_cart(user.user_id).await?;
    Ok(success_response(cart_body(items)))
}

async fn add_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let items = state
        .services
        .carts
        .add_item(user.user_id, payload.product_id, payload.size, payload.quantity)
        .await?;
    Ok(success_response(cart_body(items)))
}

/// Zero or negative quantity removes the line.
async fn update_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<UpdateCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state
        .services
        .carts
        .update_item(user.user_id, item_id, payload.quantity)
        .await?;
    Ok(success_response(cart_body(items)))
}

async fn remove_item(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(item_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state
        .services
        .carts
        .remove_item(user.user_id, item_id)
        .await?;
    Ok(success_response(cart_body(items)))
}

async fn clear_cart(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let removed = state.services.carts.clear_cart(user.user_id).await?;
    Ok(success_response(json!({ "removed": removed, "items": [] })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_item).delete(clear_cart))
        .route("/:item_id", put(update_item).delete(remove_item))
}
