use axum::{extract::State, http::HeaderMap, response::Json};
use bytes::Bytes;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    webhooks::{ProviderEvent, SIGNATURE_HEADER},
    AppState,
};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    fn received() -> Json<Self> {
        Json(Self { received: true })
    }
}

// POST /api/v1/payments/webhook
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body = String,
    params(("x-razorpay-signature" = String, Header, description = "Hex HMAC-SHA256 of the raw body")),
    responses(
        (status = 200, description = "Webhook acknowledged", body = WebhookAck),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    // Authenticate the exact bytes received before looking at them.
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    if let Err(err) = state.services.webhook_verifier.verify(&body, signature) {
        warn!(error = %err, "Payment webhook signature verification failed");
        counter!("payments.webhook.rejected", 1, "reason" => "signature");
        return Err(ServiceError::InvalidSignature);
    }

    let event = match ProviderEvent::parse(&body) {
        Ok(event) => event,
        Err(err) => {
            error!(error = %err, "Authenticated webhook body could not be parsed");
            counter!("payments.webhook.outcome", 1, "outcome" => "unparseable");
            return Ok(WebhookAck::received());
        }
    };

    let raw_payload = String::from_utf8_lossy(&body);
    match state.services.reconciler.apply(&event, &raw_payload).await {
        Ok(outcome) => {
            info!(event = %event.name(), outcome = outcome.label(), "Payment webhook processed");
        }
        Err(err) => {
            // The provider retries on non-2xx; processing errors are ours to chase.
            error!(event = %event.name(), error = %err, "Payment webhook processing failed");
            counter!("payments.webhook.outcome", 1, "outcome" => "error");
        }
    }

    Ok(WebhookAck::received())
}
