use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::AuthenticatedUser,
    errors::ServiceError,
    handlers::common::{success_response, validate_input},
    services::checkout::ShippingAddressInput,
    AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCheckoutSessionRequest {
    #[validate]
    pub shipping: ShippingAddressInput,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteCheckoutRequest {
    #[validate(length(min = 1, message = "Session ID is required"))]
    pub session_id: String,
}

async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateCheckoutSessionRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let email = payload.email.or(user.email);
    let created = state
        .services
        .checkout
        .create_checkout_session(user.user_id, email, payload.shipping)
        .await?;
    Ok(success_response(created))
}

/// Completion is idempotent: a session already turned into an order
/// returns that order with 200 instead of creating another.
async fn complete_checkout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CompleteCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let outcome = state
        .services
        .checkout
        .complete_checkout(user.user_id, &payload.session_id)
        .await?;

    let status = if outcome.already_processed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((status, Json(outcome)))
}

async fn payment_status(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ServiceError> {
    let status = state
        .services
        .checkout
        .payment_status(user.user_id, &session_id)
        .await?;
    Ok(success_response(status))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/complete-checkout", post(complete_checkout))
        .route("/status/:session_id", get(payment_status))
}
