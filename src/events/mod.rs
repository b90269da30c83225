use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
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

    /// Sends after a commit. Delivery failures are logged and swallowed
    /// because the ledger row is already authoritative.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Domain event dropped");
        }
    }
}

/// Domain events emitted after the ledger commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        provider_order_id: String,
        total: Decimal,
    },
    PaymentCaptured {
        order_id: Uuid,
        user_id: Uuid,
        provider_order_id: String,
        provider_payment_id: String,
        amount: Decimal,
        cart_entries_removed: u64,
    },
    PaymentFailed {
        order_id: Uuid,
        provider_order_id: String,
        reason: Option<String>,
    },
    /// Provider order exists with no local record; input for the
    /// provider-side reconciliation sweep.
    ProviderOrderOrphaned {
        provider_order_id: String,
        user_id: Uuid,
        amount_minor: i64,
        reason: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::PaymentCaptured { .. } => "payment_captured",
            Event::PaymentFailed { .. } => "payment_failed",
            Event::ProviderOrderOrphaned { .. } => "provider_order_orphaned",
        }
    }
}

/// Background consumer. Confirmation mail and fulfilment hook in here.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("storefront.events.processed", 1, "event" => event.name());

        match event {
            Event::OrderCreated {
                order_id,
                user_id,
                provider_order_id,
                total,
            } => {
                info!(%order_id, %user_id, %provider_order_id, %total, "Order awaiting payment");
            }
            Event::PaymentCaptured {
                order_id,
                user_id,
                provider_order_id,
                provider_payment_id,
                amount,
                cart_entries_removed,
            } => {
                info!(
                    %order_id,
                    %user_id,
                    %provider_order_id,
                    %provider_payment_id,
                    %amount,
                    cart_entries_removed,
                    "Order paid; ready for fulfilment"
                );
            }
            Event::PaymentFailed {
                order_id,
                provider_order_id,
                reason,
            } => {
                info!(%order_id, %provider_order_id, reason = ?reason, "Payment failed");
            }
            Event::ProviderOrderOrphaned {
                provider_order_id,
                user_id,
                amount_minor,
                reason,
                at,
            } => {
                error!(
                    %provider_order_id,
                    %user_id,
                    amount_minor,
                    %reason,
                    %at,
                    "Orphaned provider order queued for reconciliation"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
