use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
    SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AppConfig,
    entities::{
        order::{self, Entity as Order},
        order_item::{self, Entity as OrderItem},
        payment::{self, Entity as Payment, PaymentStatus},
        product::ProductSize,
        user::Entity as User,
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{
        from_cents, to_cents, CheckoutLineItem, CreateSessionRequest, GatewaySession,
        PaymentGateway, ALLOWED_SHIPPING_COUNTRIES,
    },
    services::{
        carts::CartService,
        charges::charge_breakdown,
        email::{ConfirmationMailer, OrderConfirmation},
    },
};

/// Session metadata keys. The metadata snapshot written at session
/// creation is the source of truth for order lines at completion.
const METADATA_USER_ID: &str = "userId";
const METADATA_SERVER_TOTAL_CENTS: &str = "serverTotalCents";
const METADATA_SHIPPING: &str = "shipping";
const METADATA_CART_ITEMS: &str = "cartItems";

/// Shipping address submitted by the storefront at checkout start.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ShippingAddressInput {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
    #[validate(length(min = 1, message = "Country is required"))]
    pub country: String,
}

/// One line of the cart snapshot stored in session metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemSnapshot {
    pub product_id: Uuid,
    pub name: String,
    pub size: ProductSize,
    pub quantity: i32,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionCreated {
    pub id: String,
    pub url: Option<String>,
    /// Server-computed cart total, in display units.
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub id: Uuid,
    pub status: PaymentStatus,
    pub amount: Decimal,
}

/// Outcome of checkout completion, both for first-time completion and
/// idempotent replays.
#[derive(Debug, Clone, Serialize)]
pub struct CompletedCheckout {
    pub message: String,
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub cart_cleared: bool,
    pub already_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusView {
    pub session_id: String,
    pub status: PaymentStatus,
    pub amount: Decimal,
    pub currency: String,
    pub order_id: Option<Uuid>,
}

/// Drives the hosted checkout flow: session creation, idempotent
/// completion, payment reconciliation, and the webhook fallback path.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    mailer: Arc<dyn ConfirmationMailer>,
    carts: CartService,
    event_sender: EventSender,
    config: Arc<AppConfig>,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        mailer: Arc<dyn ConfirmationMailer>,
        carts: CartService,
        event_sender: EventSender,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            gateway,
            mailer,
            carts,
            event_sender,
            config,
        }
    }

    /// Builds a hosted checkout session for the user's current cart.
    ///
    /// Prices always come from the catalog; the client only chooses
    /// what is in the cart. Lines whose product no longer exists are
    /// dropped, and an effectively empty cart is rejected. The cart
    /// snapshot, the server-computed total, and the submitted shipping
    /// address are recorded in session metadata for completion.
    #[instrument(skip(self, shipping))]
    pub async fn create_checkout_session(
        &self,
        user_id: Uuid,
        customer_email: Option<String>,
        shipping: ShippingAddressInput,
    ) -> Result<CheckoutSessionCreated, ServiceError> {
        let cart = self.carts.get_cart(user_id).await?;
        if cart.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".into()));
        }

        // Lines referencing deleted products were already dropped by
        // the cart load; degenerate quantities are dropped here.
        let valid_lines: Vec<_> = cart.iter().filter(|line| line.quantity > 0).collect();
        if valid_lines.is_empty() {
            return Err(ServiceError::ValidationError(
                "No valid items in cart".into(),
            ));
        }

        let mut line_items = Vec::with_capacity(valid_lines.len());
        let mut snapshot = Vec::with_capacity(valid_lines.len());
        let mut server_total_cents: i64 = 0;

        for line in &valid_lines {
            let unit_cents = to_cents(line.product.price);
            server_total_cents += unit_cents * i64::from(line.quantity);
            line_items.push(CheckoutLineItem {
                name: line.product.name.clone(),
                unit_amount_cents: unit_cents,
                quantity: i64::from(line.quantity),
            });
            snapshot.push(CartItemSnapshot {
                product_id: line.product.id,
                name: line.product.name.clone(),
                size: line.size,
                quantity: line.quantity,
                price: line.product.price,
            });
        }

        let shipping_json = serde_json::to_string(&shipping)
            .map_err(|e| ServiceError::InternalError(format!("shipping encode: {}", e)))?;
        let snapshot_json = serde_json::to_string(&snapshot)
            .map_err(|e| ServiceError::InternalError(format!("snapshot encode: {}", e)))?;

        let metadata = HashMap::from([
            (METADATA_USER_ID.to_string(), user_id.to_string()),
            (
                METADATA_SERVER_TOTAL_CENTS.to_string(),
                server_total_cents.to_string(),
            ),
            (METADATA_SHIPPING.to_string(), shipping_json),
            (METADATA_CART_ITEMS.to_string(), snapshot_json),
        ]);

        let request = CreateSessionRequest {
            line_items,
            currency: self.config.default_currency.clone(),
            customer_email,
            success_url: format!(
                "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
                self.config.frontend_url
            ),
            cancel_url: format!("{}/checkout", self.config.frontend_url),
            allowed_shipping_countries: ALLOWED_SHIPPING_COUNTRIES
                .iter()
                .map(|c| c.to_string())
                .collect(),
            metadata,
        };

        let session = self.gateway.create_checkout_session(&request).await?;

        // Pending payment row keyed by the session id; reconciled at
        // completion or by the webhook.
        let pending = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            order_id: Set(None),
            checkout_session_id: Set(session.id.clone()),
            payment_intent_id: Set(None),
            amount: Set(from_cents(server_total_cents)),
            currency: Set(self.config.default_currency.clone()),
            status: Set(PaymentStatus::Pending),
            payment_method: Set("card".to_string()),
            shipping_name: Set(Some(shipping.name.clone())),
            shipping_address: Set(Some(shipping.address.clone())),
            shipping_city: Set(Some(shipping.city.clone())),
            shipping_postal_code: Set(Some(shipping.postal_code.clone())),
            shipping_country: Set(Some(shipping.country.clone())),
            error: Set(None),
            ..Default::default()
        };
        pending.insert(&*self.db).await?;

        info!(%user_id, session_id = %session.id, total_cents = server_total_cents, "checkout session created");
        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                user_id,
                session_id: session.id.clone(),
            })
            .await;

        Ok(CheckoutSessionCreated {
            id: session.id,
            url: session.url,
            amount: from_cents(server_total_cents),
        })
    }

    /// Completes a checkout after the customer returns from the hosted
    /// payment page.
    ///
    /// The flow is idempotent per session: an existing order for the
    /// session short-circuits before any gateway call, and a losing
    /// racer is resolved through the unique index on the order's
    /// session id. Cart clearing and the confirmation email are
    /// best-effort and never fail a completed checkout.
    #[instrument(skip(self))]
    pub async fn complete_checkout(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<CompletedCheckout, ServiceError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(ServiceError::InvalidInput("Session ID is required".into()));
        }

        // Idempotency pre-check, before touching the gateway.
        if let Some(existing) = Order::find()
            .filter(order::Column::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?
        {
            info!(%session_id, order_id = %existing.id, "order already processed");
            return self.already_processed_outcome(existing).await;
        }

        let session = self.gateway.retrieve_checkout_session(session_id).await?;

        if !session.is_paid() {
            return Err(ServiceError::PaymentNotCompleted(
                session.payment_status.clone(),
            ));
        }

        // Session ownership: the metadata records who started checkout.
        let owner = session
            .metadata
            .get(METADATA_USER_ID)
            .and_then(|raw| Uuid::parse_str(raw).ok());
        if owner != Some(user_id) {
            return Err(ServiceError::Forbidden(
                "Checkout session does not belong to this user".into(),
            ));
        }

        match self.finalize_paid_session(user_id, session_id, &session).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                self.mark_payment_failed(session_id, &err).await;
                Err(err)
            }
        }
    }

    /// Everything after the session has been verified paid and owned.
    async fn finalize_paid_session(
        &self,
        user_id: Uuid,
        session_id: &str,
        session: &GatewaySession,
    ) -> Result<CompletedCheckout, ServiceError> {
        let snapshot = parse_cart_snapshot(&session.metadata)?;

        // The gateway's settled total is authoritative over anything
        // recorded or recomputed locally.
        let total_amount = session
            .amount_total
            .map(from_cents)
            .or_else(|| {
                session
                    .metadata
                    .get(METADATA_SERVER_TOTAL_CENTS)
                    .and_then(|raw| raw.parse::<i64>().ok())
                    .map(from_cents)
            })
            .unwrap_or_else(|| {
                snapshot
                    .iter()
                    .map(|item| item.price * Decimal::from(item.quantity))
                    .sum()
            });

        let shipping = resolve_shipping(session);

        let (created_order, items) = match self
            .persist_order(user_id, session_id, session, &snapshot, total_amount, &shipping)
            .await
        {
            Ok(created) => created,
            // Lost the race to a concurrent completion: the unique
            // index on the session id guarantees a single winner.
            Err(ServiceError::DatabaseError(db_err)) if is_unique_violation(&db_err) => {
                let winner = Order::find()
                    .filter(order::Column::CheckoutSessionId.eq(session_id))
                    .one(&*self.db)
                    .await?
                    .ok_or(ServiceError::DatabaseError(db_err))?;
                info!(%session_id, order_id = %winner.id, "concurrent completion detected");
                return self.already_processed_outcome(winner).await;
            }
            Err(err) => return Err(err),
        };

        let payment_summary = self
            .reconcile_payment(user_id, session_id, session, &created_order, total_amount)
            .await?;

        let cart_cleared = match self.carts.clear_cart(user_id).await {
            Ok(_) => true,
            Err(err) => {
                error!(%user_id, %session_id, "cart clear failed after checkout: {}", err);
                false
            }
        };

        self.send_confirmation(user_id, &created_order, &items).await;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: created_order.id,
                session_id: session_id.to_string(),
            })
            .await;
        self.event_sender
            .send_or_log(Event::PaymentSucceeded {
                session_id: session_id.to_string(),
            })
            .await;

        info!(order_id = %created_order.id, %session_id, cart_cleared, "checkout completed");

        Ok(CompletedCheckout {
            message: "Payment successful and order created".into(),
            order: created_order,
            items,
            cart_cleared,
            already_processed: false,
            payment: Some(payment_summary),
        })
    }

    /// Inserts the order and its lines in one transaction.
    async fn persist_order(
        &self,
        user_id: Uuid,
        session_id: &str,
        session: &GatewaySession,
        snapshot: &[CartItemSnapshot],
        total_amount: Decimal,
        shipping: &ShippingAddressInput,
    ) -> Result<(order::Model, Vec<order_item::Model>), ServiceError> {
        let txn = self.db.begin().await?;

        let order_id = Uuid::new_v4();
        let order_number = format!(
            "ORD-{}",
            &order_id.simple().to_string()[..8].to_uppercase()
        );

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number),
            user_id: Set(user_id),
            checkout_session_id: Set(session_id.to_string()),
            payment_intent_id: Set(session.payment_intent_id.clone()),
            total_amount: Set(total_amount),
            currency: Set(session
                .currency
                .clone()
                .unwrap_or_else(|| self.config.default_currency.clone())),
            status: Set(order::OrderStatus::Confirmed),
            shipping_name: Set(Some(shipping.name.clone())),
            shipping_address: Set(Some(shipping.address.clone())),
            shipping_city: Set(Some(shipping.city.clone())),
            shipping_postal_code: Set(Some(shipping.postal_code.clone())),
            shipping_country: Set(Some(shipping.country.clone())),
            ..Default::default()
        };
        let created_order = order_model.insert(&txn).await?;

        let mut items = Vec::with_capacity(snapshot.len());
        for line in snapshot {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(line.product_id),
                name: Set(line.name.clone()),
                size: Set(line.size),
                quantity: Set(line.quantity),
                unit_price: Set(line.price),
                ..Default::default()
            };
            items.push(item.insert(&txn).await?);
        }

        txn.commit().await?;
        Ok((created_order, items))
    }

    /// Marks the session's payment row paid and links it to the order.
    /// Recreates the row if the pending one went missing.
    async fn reconcile_payment(
        &self,
        user_id: Uuid,
        session_id: &str,
        session: &GatewaySession,
        created_order: &order::Model,
        total_amount: Decimal,
    ) -> Result<PaymentSummary, ServiceError> {
        let existing = Payment::find()
            .filter(payment::Column::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?;

        let model = match existing {
            Some(row) => {
                let mut active: payment::ActiveModel = row.into();
                active.status = Set(PaymentStatus::Paid);
                active.order_id = Set(Some(created_order.id));
                active.payment_intent_id = Set(session.payment_intent_id.clone());
                active.amount = Set(total_amount);
                active.error = Set(None);
                active.update(&*self.db).await?
            }
            None => {
                warn!(%session_id, "no pending payment row at completion; creating one");
                let fresh = payment::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    order_id: Set(Some(created_order.id)),
                    checkout_session_id: Set(session_id.to_string()),
                    payment_intent_id: Set(session.payment_intent_id.clone()),
                    amount: Set(total_amount),
                    currency: Set(created_order.currency.clone()),
                    status: Set(PaymentStatus::Paid),
                    payment_method: Set("card".to_string()),
                    shipping_name: Set(created_order.shipping_name.clone()),
                    shipping_address: Set(created_order.shipping_address.clone()),
                    shipping_city: Set(created_order.shipping_city.clone()),
                    shipping_postal_code: Set(created_order.shipping_postal_code.clone()),
                    shipping_country: Set(created_order.shipping_country.clone()),
                    error: Set(None),
                    ..Default::default()
                };
                fresh.insert(&*self.db).await?
            }
        };

        Ok(PaymentSummary {
            id: model.id,
            status: model.status,
            amount: model.amount,
        })
    }

    /// Best-effort failure record once a paid session could not be
    /// turned into an order.
    async fn mark_payment_failed(&self, session_id: &str, err: &ServiceError) {
        let result = async {
            if let Some(row) = Payment::find()
                .filter(payment::Column::CheckoutSessionId.eq(session_id))
                .one(&*self.db)
                .await?
            {
                let mut active: payment::ActiveModel = row.into();
                active.status = Set(PaymentStatus::Failed);
                active.error = Set(Some(err.to_string()));
                active.update(&*self.db).await?;
            }
            Ok::<_, DbErr>(())
        }
        .await;

        if let Err(db_err) = result {
            error!(%session_id, "failed to record payment failure: {}", db_err);
        }

        self.event_sender
            .send_or_log(Event::PaymentFailed {
                session_id: session_id.to_string(),
                reason: err.to_string(),
            })
            .await;
    }

    async fn already_processed_outcome(
        &self,
        existing: order::Model,
    ) -> Result<CompletedCheckout, ServiceError> {
        let items = OrderItem::find()
            .filter(order_item::Column::OrderId.eq(existing.id))
            .all(&*self.db)
            .await?;

        let payment = Payment::find()
            .filter(payment::Column::CheckoutSessionId.eq(existing.checkout_session_id.clone()))
            .one(&*self.db)
            .await?
            .map(|row| PaymentSummary {
                id: row.id,
                status: row.status,
                amount: row.amount,
            });

        Ok(CompletedCheckout {
            message: "Order already processed".into(),
            order: existing,
            items,
            cart_cleared: false,
            already_processed: true,
            payment,
        })
    }

    async fn send_confirmation(
        &self,
        user_id: Uuid,
        created_order: &order::Model,
        items: &[order_item::Model],
    ) {
        let recipient = match User::find_by_id(user_id).one(&*self.db).await {
            Ok(Some(user)) => user.email,
            Ok(None) => {
                warn!(%user_id, "no user record for confirmation email");
                return;
            }
            Err(err) => {
                warn!(%user_id, "could not load user for confirmation email: {}", err);
                return;
            }
        };

        let breakdown = charge_breakdown(items.iter().map(|i| (i.unit_price, i.quantity)));
        let confirmation = OrderConfirmation {
            to: &recipient,
            order: created_order,
            items,
            breakdown: &breakdown,
        };

        if let Err(err) = self.mailer.send_order_confirmation(&confirmation).await {
            warn!(order_id = %created_order.id, "confirmation email failed: {}", err);
        }
    }

    /// Local payment status for a session the user owns. A still
    /// pending row triggers one best-effort gateway refresh.
    #[instrument(skip(self))]
    pub async fn payment_status(
        &self,
        user_id: Uuid,
        session_id: &str,
    ) -> Result<PaymentStatusView, ServiceError> {
        let row = Payment::find()
            .filter(payment::Column::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Payment for session {} not found", session_id))
            })?;

        if row.user_id != user_id {
            return Err(ServiceError::Forbidden(
                "Payment does not belong to this user".into(),
            ));
        }

        let row = if row.status == PaymentStatus::Pending {
            match self.gateway.retrieve_checkout_session(session_id).await {
                Ok(session) if session.is_paid() => {
                    let mut active: payment::ActiveModel = row.into();
                    active.status = Set(PaymentStatus::Paid);
                    active.payment_intent_id = Set(session.payment_intent_id.clone());
                    if let Some(total) = session.amount_total {
                        active.amount = Set(from_cents(total));
                    }
                    active.update(&*self.db).await?
                }
                Ok(_) => row,
                Err(err) => {
                    warn!(%session_id, "status refresh failed, serving stored state: {}", err);
                    row
                }
            }
        } else {
            row
        };

        Ok(PaymentStatusView {
            session_id: row.checkout_session_id,
            status: row.status,
            amount: row.amount,
            currency: row.currency,
            order_id: row.order_id,
        })
    }

    /// Applies a `checkout.session.completed` webhook: flips the
    /// payment row to paid. Never creates orders or touches carts.
    #[instrument(skip(self))]
    pub async fn mark_session_paid(
        &self,
        session_id: &str,
        payment_intent_id: Option<String>,
    ) -> Result<bool, ServiceError> {
        let row = Payment::find()
            .filter(payment::Column::CheckoutSessionId.eq(session_id))
            .one(&*self.db)
            .await?;

        let Some(row) = row else {
            warn!(%session_id, "webhook for unknown payment session");
            return Ok(false);
        };

        if row.status != PaymentStatus::Paid {
            let mut active: payment::ActiveModel = row.into();
            active.status = Set(PaymentStatus::Paid);
            if payment_intent_id.is_some() {
                active.payment_intent_id = Set(payment_intent_id);
            }
            active.update(&*self.db).await?;
        }

        self.event_sender
            .send_or_log(Event::PaymentSucceeded {
                session_id: session_id.to_string(),
            })
            .await;
        Ok(true)
    }
}

/// Decodes the metadata cart snapshot. Individual lines that do not
/// parse are dropped; an empty result is a hard error because the
/// session cannot back an order.
fn parse_cart_snapshot(
    metadata: &HashMap<String, String>,
) -> Result<Vec<CartItemSnapshot>, ServiceError> {
    let raw = metadata.get(METADATA_CART_ITEMS).ok_or_else(|| {
        ServiceError::InvalidSessionData("No items found in session metadata".into())
    })?;

    let values: Vec<serde_json::Value> = serde_json::from_str(raw).map_err(|_| {
        ServiceError::InvalidSessionData("Cart snapshot is not valid JSON".into())
    })?;

    let items: Vec<CartItemSnapshot> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();

    if items.is_empty() {
        return Err(ServiceError::InvalidSessionData(
            "No items found in session metadata".into(),
        ));
    }
    Ok(items)
}

/// Gateway-collected shipping details win over the address submitted
/// at session creation.
fn resolve_shipping(session: &GatewaySession) -> ShippingAddressInput {
    if let Some(details) = &session.shipping {
        if let Some(address) = &details.address {
            return ShippingAddressInput {
                name: details.name.clone().unwrap_or_default(),
                address: address.line1.clone().unwrap_or_default(),
                city: address.city.clone().unwrap_or_default(),
                postal_code: address.postal_code.clone().unwrap_or_default(),
                country: address.country.clone().unwrap_or_default(),
            };
        }
    }

    session
        .metadata
        .get(METADATA_SHIPPING)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| ShippingAddressInput {
            name: String::new(),
            address: String::new(),
            city: String::new(),
            postal_code: String::new(),
            country: String::new(),
        })
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    use crate::gateway::{GatewayAddress, ShippingDetails};

    fn metadata_with_snapshot(raw: &str) -> HashMap<String, String> {
        HashMap::from([(METADATA_CART_ITEMS.to_string(), raw.to_string())])
    }

    #[test]
    fn snapshot_parses_well_formed_lines() {
        let product_id = Uuid::new_v4();
        let raw = format!(
            r#"[{{"productId":"{}","name":"Classic Tee","size":"M","quantity":2,"price":"19.99"}}]"#,
            product_id
        );
        let items = parse_cart_snapshot(&metadata_with_snapshot(&raw)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].product_id, product_id);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].price, dec!(19.99));
    }

    #[test]
    fn snapshot_drops_malformed_lines_but_keeps_good_ones() {
        let product_id = Uuid::new_v4();
        let raw = format!(
            r#"[{{"bogus":true}},{{"productId":"{}","name":"Tee","size":"L","quantity":1,"price":"35.00"}}]"#,
            product_id
        );
        let items = parse_cart_snapshot(&metadata_with_snapshot(&raw)).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].size, ProductSize::Large);
    }

    #[test]
    fn empty_or_garbage_snapshot_is_rejected() {
        assert!(matches!(
            parse_cart_snapshot(&metadata_with_snapshot("[]")),
            Err(ServiceError::InvalidSessionData(_))
        ));
        assert!(matches!(
            parse_cart_snapshot(&metadata_with_snapshot("not json")),
            Err(ServiceError::InvalidSessionData(_))
        ));
        assert!(matches!(
            parse_cart_snapshot(&HashMap::new()),
            Err(ServiceError::InvalidSessionData(_))
        ));
    }

    #[test]
    fn gateway_shipping_preferred_over_metadata() {
        let submitted = ShippingAddressInput {
            name: "Submitted Name".into(),
            address: "Old Street".into(),
            city: "Old Town".into(),
            postal_code: "00000".into(),
            country: "CA".into(),
        };
        let mut session = GatewaySession {
            id: "cs_1".into(),
            metadata: HashMap::from([(
                METADATA_SHIPPING.to_string(),
                serde_json::to_string(&submitted).unwrap(),
            )]),
            ..Default::default()
        };

        // Without gateway-collected details the metadata address wins.
        let resolved = resolve_shipping(&session);
        assert_eq!(resolved.name, "Submitted Name");

        session.shipping = Some(ShippingDetails {
            name: Some("Collected Name".into()),
            address: Some(GatewayAddress {
                line1: Some("1 New St".into()),
                city: Some("Austin".into()),
                postal_code: Some("78701".into()),
                country: Some("US".into()),
            }),
        });
        let resolved = resolve_shipping(&session);
        assert_eq!(resolved.name, "Collected Name");
        assert_eq!(resolved.city, "Austin");
    }
}
