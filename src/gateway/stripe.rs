use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::instrument;

use super::{
    CreateSessionRequest, GatewayAddress, GatewayError, GatewaySession, PaymentGateway,
    ShippingDetails,
};

/// Stripe-compatible hosted checkout client. Talks the form-encoded
/// `/v1/checkout/sessions` API with bearer authentication.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        }
    }

    fn sessions_url(&self) -> String {
        format!("{}/v1/checkout/sessions", self.api_base)
    }

    fn encode_create_form(request: &CreateSessionRequest) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
        ];

        if let Some(email) = &request.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }

        for (i, item) in request.line_items.iter().enumerate() {
            form.push((
                format!("line_items[{}][price_data][currency]", i),
                request.currency.clone(),
            ));
            form.push((
                format!("line_items[{}][price_data][product_data][name]", i),
                item.name.clone(),
            ));
            form.push((
                format!("line_items[{}][price_data][unit_amount]", i),
                item.unit_amount_cents.to_string(),
            ));
            form.push((format!("line_items[{}][quantity]", i), item.quantity.to_string()));
        }

        for (i, country) in request.allowed_shipping_countries.iter().enumerate() {
            form.push((
                format!("shipping_address_collection[allowed_countries][{}]", i),
                country.clone(),
            ));
        }

        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        form
    }

    async fn parse_response(
        &self,
        response: reqwest::Response,
        session_id: Option<&str>,
    ) -> Result<GatewaySession, GatewayError> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::SessionNotFound(
                session_id.unwrap_or("unknown").to_string(),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Request(format!("invalid response body: {}", e)))?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown gateway error")
                .to_string();
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(session_from_json(&body))
    }
}

/// Maps the wire representation into [`GatewaySession`]. Expanded
/// objects (`payment_intent`) may arrive as either a bare id or a
/// full object; both forms are handled.
fn session_from_json(body: &Value) -> GatewaySession {
    let payment_intent_id = match body.get("payment_intent") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(str::to_string),
        _ => None,
    };

    let shipping = body
        .get("shipping_details")
        .filter(|v| !v.is_null())
        .map(|details| ShippingDetails {
            name: details
                .get("name")
                .and_then(Value::as_str)
                .map(str::to_string),
            address: details.get("address").map(|addr| GatewayAddress {
                line1: addr.get("line1").and_then(Value::as_str).map(str::to_string),
                city: addr.get("city").and_then(Value::as_str).map(str::to_string),
                postal_code: addr
                    .get("postal_code")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                country: addr
                    .get("country")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
        });

    let metadata = body
        .get("metadata")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    GatewaySession {
        id: body
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        url: body.get("url").and_then(Value::as_str).map(str::to_string),
        payment_status: body
            .get("payment_status")
            .and_then(Value::as_str)
            .unwrap_or("unpaid")
            .to_string(),
        amount_total: body.get("amount_total").and_then(Value::as_i64),
        currency: body
            .get("currency")
            .and_then(Value::as_str)
            .map(str::to_string),
        payment_intent_id,
        shipping,
        metadata,
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(line_items = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        let form = Self::encode_create_form(request);

        let response = self
            .http
            .post(self.sessions_url())
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        self.parse_response(response, None).await
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<GatewaySession, GatewayError> {
        let response = self
            .http
            .get(format!("{}/{}", self.sessions_url(), session_id))
            .bearer_auth(&self.secret_key)
            .query(&[
                ("expand[]", "payment_intent"),
                ("expand[]", "line_items.data.price.product"),
            ])
            .send()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        self.parse_response(response, Some(session_id)).await
    }
}
