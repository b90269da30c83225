//! Client side of checkout.
//!
//! [`CheckoutHandoff`] drives the shopper's checkout button: it asks the
//! service to mint an order, hands the returned id to the hosted payment UI
//! and then only *reads* the ledger until the webhook has settled the order.
//! Nothing here writes payment state.

use crate::entities::OrderStatus;
use crate::errors::ErrorResponse;
use crate::services::{checkout::CheckoutOrder, orders::OrderView};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("{code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },
    #[error("unexpected response: {0}")]
    InvalidResponse(String),
    #[error("checkout is not available while {0}")]
    Busy(&'static str),
}

/// Storefront endpoints the checkout button needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StorefrontApi: Send + Sync {
    async fn create_order(&self) -> Result<CheckoutOrder, HandoffError>;
    async fn order_status(&self, provider_order_id: &str) -> Result<OrderView, HandoffError>;
}

/// `reqwest` implementation over the v1 API with a session token.
#[derive(Clone)]
pub struct StorefrontClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

impl StorefrontClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, HandoffError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HandoffError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, HandoffError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match serde_json::from_str::<ErrorResponse>(&body) {
                Ok(err) => HandoffError::Api {
                    status: status.as_u16(),
                    code: err.code,
                    message: err.message,
                },
                Err(_) => HandoffError::Api {
                    status: status.as_u16(),
                    code: "UNKNOWN".into(),
                    message: body,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|e| HandoffError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl StorefrontApi for StorefrontClient {
    async fn create_order(&self) -> Result<CheckoutOrder, HandoffError> {
        let response = self
            .client
            .post(format!("{}/api/v1/checkout/orders", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HandoffError::Transport(e.to_string()))?;
        Self::read(response).await
    }

    async fn order_status(&self, provider_order_id: &str) -> Result<OrderView, HandoffError> {
        let response = self
            .client
            .get(format!("{}/api/v1/orders/{}", self.base_url, provider_order_id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HandoffError::Transport(e.to_string()))?;

        Self::read::<Envelope<OrderView>>(response)
            .await?
            .data
            .ok_or_else(|| HandoffError::InvalidResponse("missing data".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffState {
    Idle,
    CreatingOrder,
    /// Hosted payment UI is open for this order.
    AwaitingPayment(CheckoutOrder),
    /// The UI reported success; waiting for the ledger to agree.
    Processing { order_id: String },
    /// Ledger reports a terminal status.
    Settled(OrderView),
}

impl HandoffState {
    fn label(&self) -> &'static str {
        match self {
            HandoffState::Idle => "idle",
            HandoffState::CreatingOrder => "creating an order",
            HandoffState::AwaitingPayment(_) => "awaiting payment",
            HandoffState::Processing { .. } => "processing a payment",
            HandoffState::Settled(_) => "settled",
        }
    }
}

pub struct CheckoutHandoff<A> {
    api: A,
    state: HandoffState,
}

impl<A: StorefrontApi> CheckoutHandoff<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: HandoffState::Idle,
        }
    }

    pub fn state(&self) -> &HandoffState {
        &self.state
    }

    pub fn checkout_enabled(&self) -> bool {
        matches!(self.state, HandoffState::Idle)
    }

    /// Optimistic text for the checkout panel.
    pub fn status_message(&self) -> &'static str {
        match &self.state {
            HandoffState::Idle => "Ready to check out",
            HandoffState::CreatingOrder => "Preparing your order...",
            HandoffState::AwaitingPayment(_) => "Complete payment in the payment window",
            HandoffState::Processing { .. } => "Payment received, confirming your order...",
            HandoffState::Settled(view) => match view.status {
                OrderStatus::Paid => "Order confirmed",
                OrderStatus::Failed => "Payment failed",
                OrderStatus::Pending => "Payment pending",
            },
        }
    }

    /// Mints an order. On failure the button is re-enabled.
    pub async fn begin_checkout(&mut self) -> Result<CheckoutOrder, HandoffError> {
        if !self.checkout_enabled() {
            return Err(HandoffError::Busy(self.state.label()));
        }

        self.state = HandoffState::CreatingOrder;
        match self.api.create_order().await {
            Ok(order) => {
                info!(order_id = %order.order_id, amount = order.amount, "Opening payment window");
                self.state = HandoffState::AwaitingPayment(order.clone());
                Ok(order)
            }
            Err(err) => {
                warn!(error = %err, "Order creation failed");
                self.state = HandoffState::Idle;
                Err(err)
            }
        }
    }

    /// Success callback from the payment UI. Display only; the ledger is
    /// untouched and the order stays whatever the webhook makes it.
    pub fn payment_succeeded(&mut self, provider_payment_id: &str) {
        let order_id = match &self.state {
            HandoffState::AwaitingPayment(order) => order.order_id.clone(),
            _ => return,
        };
        debug!(order_id = %order_id, provider_payment_id, "Payment UI reported success");
        self.state = HandoffState::Processing { order_id };
    }

    /// User closed the payment UI. No cancellation is attempted; the PENDING
    /// order is left for the webhook.
    pub fn dismiss(&mut self) {
        if matches!(self.state, HandoffState::AwaitingPayment(_)) {
            self.state = HandoffState::Idle;
        }
    }

    /// Reads the ledger once. Returns the status observed, if an order is in flight.
    pub async fn poll(&mut self) -> Result<Option<OrderStatus>, HandoffError> {
        let order_id = match &self.state {
            HandoffState::Processing { order_id } => order_id.clone(),
            HandoffState::AwaitingPayment(order) => order.order_id.clone(),
            HandoffState::Settled(view) => return Ok(Some(view.status)),
            _ => return Ok(None),
        };

        let view = self.api.order_status(&order_id).await?;
        let status = view.status;
        if status.is_terminal() {
            info!(order_id = %order_id, ?status, "Order settled");
            self.state = HandoffState::Settled(view);
        }
        Ok(Some(status))
    }

    /// Polls until the order settles or `max_polls` reads have been made.
    pub async fn wait_for_settlement(
        &mut self,
        interval: Duration,
        max_polls: u32,
    ) -> Result<Option<OrderStatus>, HandoffError> {
        for attempt in 0..max_polls {
            if let Some(status) = self.poll().await? {
                if status.is_terminal() {
                    return Ok(Some(status));
                }
            }
            if attempt + 1 < max_polls {
                tokio::time::sleep(interval).await;
            }
        }
        Ok(None)
    }

    /// Stops waiting on an order the ledger has not settled, typically after
    /// `wait_for_settlement` returned `None`. Nothing is cancelled: a late
    /// webhook still settles the order, and the shopper sees it under their
    /// orders. Until this is called checkout stays disabled, so a reported
    /// success cannot be followed by a second charge.
    pub fn abandon(&mut self) {
        if let HandoffState::Processing { order_id } = &self.state {
            warn!(order_id = %order_id, "Stopped waiting for settlement");
            self.state = HandoffState::Idle;
        }
    }

    /// Back to a fresh checkout after a settled order.
    pub fn reset(&mut self) {
        if matches!(self.state, HandoffState::Settled(_)) {
            self.state = HandoffState::Idle;
        }
    }
}
