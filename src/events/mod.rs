use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the checkout flow. Consumed by a logging task for
/// now; the channel is the seam for future fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    CheckoutStarted {
        user_id: Uuid,
        session_id: String,
    },
    OrderCreated {
        order_id: Uuid,
        session_id: String,
    },
    PaymentSucceeded {
        session_id: String,
    },
    PaymentFailed {
        session_id: String,
        reason: String,
    },
    CartCleared(Uuid),
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is
    /// closed or full. Event delivery is never load-bearing.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropped event: {}", e);
        }
    }
}

/// Creates the event channel and spawns the consumer task.
pub fn start_event_processor(capacity: usize) -> EventSender {
    let (tx, mut rx) = mpsc::channel::<Event>(capacity);
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!(?event, "event processed");
        }
    });
    EventSender::new(tx)
}
