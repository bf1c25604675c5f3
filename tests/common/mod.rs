#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use migrations::{Migrator, MigratorTrait};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, DatabaseConnection, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use storefront_api::{
    app_router,
    auth::issue_token,
    config::AppConfig,
    entities::{cart_item, order, product, user},
    events::start_event_processor,
    gateway::{
        from_cents, to_cents, CreateSessionRequest, GatewayError, GatewaySession, PaymentGateway,
    },
    services::email::{ConfirmationMailer, EmailError, OrderConfirmation},
    AppState,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// A completion that lands while another request is in flight. The
/// order is committed during the next session retrieve, i.e. after the
/// caller's idempotency pre-check but before its own insert.
pub struct RivalCompletion {
    db: Arc<DatabaseConnection>,
    user_id: Uuid,
    order_number: String,
}

/// In-memory stand-in for the hosted payment provider.
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, GatewaySession>>,
    counter: Mutex<u64>,
    pub fail_retrieve: AtomicBool,
    rival: Mutex<Option<RivalCompletion>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a session paid, the way the hosted page would after a
    /// successful card charge.
    pub fn mark_paid(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.payment_status = "paid".into();
            session.payment_intent_id = Some(format!("pi_{}", session_id));
        }
    }

    pub fn set_amount_total(&self, session_id: &str, cents: i64) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.amount_total = Some(cents);
        }
    }

    pub fn session(&self, session_id: &str) -> Option<GatewaySession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }

    /// Arms a one-shot rival completion for the next retrieve.
    pub fn race_with(&self, db: Arc<DatabaseConnection>, user_id: Uuid, order_number: &str) {
        *self.rival.lock().unwrap() = Some(RivalCompletion {
            db,
            user_id,
            order_number: order_number.to_string(),
        });
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, GatewayError> {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        let id = format!("cs_test_{}", *counter);

        let amount_total: i64 = request
            .line_items
            .iter()
            .map(|item| item.unit_amount_cents * item.quantity)
            .sum();

        let session = GatewaySession {
            id: id.clone(),
            url: Some(format!("https://pay.test/c/{}", id)),
            payment_status: "unpaid".into(),
            amount_total: Some(amount_total),
            currency: Some(request.currency.clone()),
            payment_intent_id: None,
            shipping: None,
            metadata: request.metadata.clone(),
        };

        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<GatewaySession, GatewayError> {
        if self.fail_retrieve.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("simulated outage".into()));
        }
        let session = self
            .sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::SessionNotFound(session_id.to_string()))?;

        let rival = self.rival.lock().unwrap().take();
        if let Some(rival) = rival {
            order::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_number: Set(rival.order_number),
                user_id: Set(rival.user_id),
                checkout_session_id: Set(session_id.to_string()),
                payment_intent_id: Set(session.payment_intent_id.clone()),
                total_amount: Set(session.amount_total.map(from_cents).unwrap_or_default()),
                currency: Set("usd".into()),
                status: Set(order::OrderStatus::Confirmed),
                ..Default::default()
            }
            .insert(&*rival.db)
            .await
            .unwrap();
        }

        Ok(session)
    }
}

/// Mailer that records recipients instead of sending.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent_to: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ConfirmationMailer for RecordingMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation<'_>,
    ) -> Result<(), EmailError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(EmailError::InvalidAddress("forced failure".into()));
        }
        self.sent_to
            .lock()
            .unwrap()
            .push(confirmation.to.to_string());
        Ok(())
    }
}

pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub gateway: Arc<FakeGateway>,
    pub mailer: Arc<RecordingMailer>,
    pub router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        // One pooled connection keeps every query on the same
        // in-memory database.
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).sqlx_logging(false);
        let db = Arc::new(Database::connect(opts).await.unwrap());
        Migrator::up(&*db, None).await.unwrap();

        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "database_url": "sqlite::memory:",
            "jwt_secret": "4f8e2b9c1a7d6e5f3b2a9c8d7e6f5a4b3c2d1e0f9a8b7c6d5e4f3a2b1c0d9e8f",
            "jwt_expiration": 3600,
            "host": "127.0.0.1",
            "port": 0,
            "environment": "development",
            "payment_gateway_secret_key": "sk_test_123",
            "payment_webhook_secret": WEBHOOK_SECRET,
            "frontend_url": "https://shop.test"
        }))
        .unwrap();
        let config = Arc::new(config);

        let gateway = Arc::new(FakeGateway::new());
        let mailer = Arc::new(RecordingMailer::default());
        let event_sender = start_event_processor(64);

        let state = AppState::new(
            db.clone(),
            config.clone(),
            event_sender,
            gateway.clone(),
            mailer.clone(),
        );
        let router = app_router(state);

        Self {
            db,
            config,
            gateway,
            mailer,
            router,
        }
    }

    pub async fn seed_user(&self, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            name: Set("Test Shopper".into()),
            email: Set(email.to_string()),
            password_hash: Set("$argon2id$test".into()),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .unwrap();
        id
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(format!("{} description", name))),
            price: Set(price),
            image_url: Set(None),
            category: Set(product::ProductCategory::Men),
            sizes: Set(r#"["S","M","L","XL"]"#.into()),
            in_stock: Set(true),
            featured: Set(false),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(&*self.db)
        .await
        .unwrap()
    }

    pub async fn seed_cart_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: product::ProductSize,
        quantity: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        cart_item::ActiveModel {
            id: Set(id),
            user_id: Set(user_id),
            product_id: Set(product_id),
            size: Set(size),
            quantity: Set(quantity),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .unwrap();
        id
    }

    pub fn token_for(&self, user_id: Uuid, email: &str) -> String {
        issue_token(user_id, Some(email.to_string()), &self.config).unwrap()
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    /// Posts a raw webhook payload with the given headers.
    pub async fn post_webhook(
        &self,
        payload: &[u8],
        headers: Vec<(&str, String)>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/payments/webhook")
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Body::from(payload.to_vec())).unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

/// Builds a checkout session through the API and returns its id.
pub async fn start_checkout(app: &TestApp, token: &str) -> String {
    let (status, body) = app
        .request(
            "POST",
            "/api/v1/payments/create-checkout-session",
            Some(token),
            Some(serde_json::json!({
                "shipping": {
                    "name": "Jordan Doe",
                    "address": "1 Main St",
                    "city": "Austin",
                    "postal_code": "78701",
                    "country": "US"
                }
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "session creation failed: {}", body);
    body["id"].as_str().unwrap().to_string()
}

pub fn cents(amount: Decimal) -> i64 {
    to_cents(amount)
}
