use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, MultiPart, SinglePart},
    transport::smtp::{authentication::Credentials, Error as SmtpError},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use thiserror::Error;
use tracing::info;

use crate::{
    config::SmtpConfig,
    entities::{order, order_item},
    services::charges::ChargeBreakdown,
};

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),
}

/// Everything the confirmation mail needs, captured at completion time.
pub struct OrderConfirmation<'a> {
    pub to: &'a str,
    pub order: &'a order::Model,
    pub items: &'a [order_item::Model],
    pub breakdown: &'a ChargeBreakdown,
}

/// Sends the post-checkout confirmation mail. Failures are reported
/// to the caller but must never fail the checkout itself.
#[async_trait]
pub trait ConfirmationMailer: Send + Sync {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation<'_>,
    ) -> Result<(), EmailError>;
}

/// SMTP-backed mailer using STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, SmtpError> {
        let host = config.host.as_deref().unwrap_or_default();
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from_address: config.from.clone(),
        })
    }

    fn render_text(confirmation: &OrderConfirmation<'_>) -> String {
        let mut body = format!(
            "Thank you for your order!\n\nOrder {}\n\n",
            confirmation.order.order_number
        );
        for item in confirmation.items {
            body.push_str(&format!(
                "  {} ({}) x{} - ${}\n",
                item.name, item.size, item.quantity, item.unit_price
            ));
        }
        let b = confirmation.breakdown;
        body.push_str(&format!(
            "\nSubtotal: ${}\nShipping: ${}\nTax: ${}\nTotal: ${}\n\nAmount charged: ${}\n",
            b.subtotal, b.shipping, b.tax, b.total, confirmation.order.total_amount
        ));
        body
    }

    fn render_html(confirmation: &OrderConfirmation<'_>) -> String {
        let rows: String = confirmation
            .items
            .iter()
            .map(|item| {
                format!(
                    "<tr><td>{} ({})</td><td>{}</td><td>${}</td></tr>",
                    item.name, item.size, item.quantity, item.unit_price
                )
            })
            .collect();
        let b = confirmation.breakdown;
        format!(
            "<h1>Thank you for your order!</h1>\
             <p>Order <strong>{}</strong></p>\
             <table><tr><th>Item</th><th>Qty</th><th>Price</th></tr>{}</table>\
             <p>Subtotal: ${}<br>Shipping: ${}<br>Tax: ${}<br>Total: ${}</p>\
             <p>Amount charged: <strong>${}</strong></p>",
            confirmation.order.order_number,
            rows,
            b.subtotal,
            b.shipping,
            b.tax,
            b.total,
            confirmation.order.total_amount
        )
    }
}

#[async_trait]
impl ConfirmationMailer for SmtpMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation<'_>,
    ) -> Result<(), EmailError> {
        let text = Self::render_text(confirmation);
        let html = Self::render_html(confirmation);
        let subject = format!("Order confirmation - {}", confirmation.order.order_number);

        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(confirmation
                .to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(confirmation.to.to_string()))?)
            .subject(&subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html),
                    ),
            )?;

        self.mailer.send(email).await?;
        info!(to = %confirmation.to, subject = %subject, "confirmation email sent");
        Ok(())
    }
}

/// Used when no SMTP host is configured; logs and succeeds.
#[derive(Clone, Default)]
pub struct NoopMailer;

#[async_trait]
impl ConfirmationMailer for NoopMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation<'_>,
    ) -> Result<(), EmailError> {
        info!(
            order_number = %confirmation.order.order_number,
            "email disabled; skipping order confirmation"
        );
        Ok(())
    }
}
