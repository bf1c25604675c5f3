use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser, errors::ServiceError, handlers::common::success_response, AppState,
};

async fn list_orders(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<impl IntoResponse, ServiceError> {
    let orders = state.services.orders.list_for_user(user.user_id).await?;
    Ok(success_response(orders))
}

async fn get_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_for_user(user.user_id, order_id)
        .await?;
    Ok(success_response(order))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:id", get(get_order))
}
