use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::ServiceError;

pub mod signature;
pub mod stripe;

/// Countries hosted checkout is allowed to ship to.
pub const ALLOWED_SHIPPING_COUNTRIES: [&str; 4] = ["US", "CA", "GB", "LK"];

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("checkout session {0} not found")]
    SessionNotFound(String),

    #[error("gateway request failed: {0}")]
    Request(String),

    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::SessionNotFound(id) => {
                ServiceError::NotFound(format!("Checkout session {} not found", id))
            }
            other => ServiceError::ExternalServiceError(other.to_string()),
        }
    }
}

/// One display line of a hosted checkout session. Amounts are integer
/// minor units; the gateway never sees Decimal.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub unit_amount_cents: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub line_items: Vec<CheckoutLineItem>,
    pub currency: String,
    pub customer_email: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub allowed_shipping_countries: Vec<String>,
    pub metadata: HashMap<String, String>,
}

/// Postal address as collected by the hosted checkout page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayAddress {
    pub line1: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShippingDetails {
    pub name: Option<String>,
    pub address: Option<GatewayAddress>,
}

/// Gateway-side view of a checkout session, reduced to the fields the
/// completion flow consumes.
#[derive(Debug, Clone, Default)]
pub struct GatewaySession {
    pub id: String,
    /// Hosted payment page URL (present right after creation)
    pub url: Option<String>,
    /// "paid", "unpaid", or "no_payment_required"
    pub payment_status: String,
    /// Total the customer was charged, in minor units
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_intent_id: Option<String>,
    /// Address collected on the payment page, when available
    pub shipping: Option<ShippingDetails>,
    pub metadata: HashMap<String, String>,
}

impl GatewaySession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }
}

/// Seam to the hosted payment provider. Production uses the HTTP
/// client in [`stripe`]; tests substitute an in-memory fake.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, GatewayError>;

    /// Retrieves a session with payment intent and line items expanded.
    async fn retrieve_checkout_session(&self, session_id: &str)
        -> Result<GatewaySession, GatewayError>;
}

/// Converts a decimal amount to integer minor units, rounding half-up.
pub fn to_cents(amount: Decimal) -> i64 {
    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::RoundingStrategy;

    (amount * Decimal::from(100))
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// Converts integer minor units back to a two-decimal amount.
pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
