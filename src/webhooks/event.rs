use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const PAYMENT_CAPTURED: &str = "payment.captured";
pub const PAYMENT_FAILED: &str = "payment.failed";

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("body is not a webhook envelope: {0}")]
    Envelope(serde_json::Error),
    #[error("{event} carries no payment entity: {source}")]
    Entity {
        event: String,
        source: serde_json::Error,
    },
}

/// The `payload.payment.entity` object of a payment webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PaymentEntity {
    /// Provider payment id
    pub id: String,
    /// Provider order id; join key into the ledger
    pub order_id: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl PaymentEntity {
    pub fn failure_reason(&self) -> Option<String> {
        self.error_description
            .clone()
            .or_else(|| self.error_code.clone())
    }
}

/// Recognized webhook events. Anything else parses to `Unknown` and is
/// acknowledged without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    PaymentCaptured(PaymentEntity),
    PaymentFailed(PaymentEntity),
    Unknown { event: String },
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct PaymentPayload {
    payment: PaymentWrapper,
}

#[derive(Deserialize)]
struct PaymentWrapper {
    entity: PaymentEntity,
}

impl ProviderEvent {
    /// Parses an already-authenticated body.
    pub fn parse(body: &[u8]) -> Result<Self, EventParseError> {
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(EventParseError::Envelope)?;

        let entity = |event: &str, payload: Value| {
            serde_json::from_value::<PaymentPayload>(payload)
                .map(|p| p.payment.entity)
                .map_err(|source| EventParseError::Entity {
                    event: event.to_string(),
                    source,
                })
        };

        match envelope.event.as_str() {
            PAYMENT_CAPTURED => Ok(ProviderEvent::PaymentCaptured(entity(
                PAYMENT_CAPTURED,
                envelope.payload,
            )?)),
            PAYMENT_FAILED => Ok(ProviderEvent::PaymentFailed(entity(
                PAYMENT_FAILED,
                envelope.payload,
            )?)),
            _ => Ok(ProviderEvent::Unknown {
                event: envelope.event,
            }),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ProviderEvent::PaymentCaptured(_) => PAYMENT_CAPTURED,
            ProviderEvent::PaymentFailed(_) => PAYMENT_FAILED,
            ProviderEvent::Unknown { event } => event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn body(event: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "entity": "event",
            "event": event,
            "payload": {
                "payment": {
                    "entity": {
                        "id": "pay_29QQoUBi66xm2f",
                        "entity": "payment",
                        "order_id": "order_9A33XWu170gUtm",
                        "amount": 66248,
                        "currency": "INR",
                        "status": "captured",
                        "error_description": null
                    }
                }
            },
            "created_at": 1_700_000_000
        }))
        .unwrap()
    }

    #[test]
    fn parses_captured_payment() {
        let event = ProviderEvent::parse(&body("payment.captured")).unwrap();
        assert_matches!(event, ProviderEvent::PaymentCaptured(ref p) if p.order_id == "order_9A33XWu170gUtm" && p.amount == 66248);
        assert_eq!(event.name(), "payment.captured");
    }

    #[test]
    fn failed_payment_carries_reason() {
        let raw = serde_json::to_vec(&json!({
            "event": "payment.failed",
            "payload": {"payment": {"entity": {
                "id": "pay_1", "order_id": "order_1", "amount": 100, "currency": "INR",
                "error_code": "BAD_REQUEST_ERROR",
                "error_description": "Payment declined by bank"
            }}}
        }))
        .unwrap();

        let ProviderEvent::PaymentFailed(entity) = ProviderEvent::parse(&raw).unwrap() else {
            panic!("expected payment.failed");
        };
        assert_eq!(
            entity.failure_reason().as_deref(),
            Some("Payment declined by bank")
        );
    }

    #[test]
    fn unknown_events_are_preserved_by_name() {
        let event = ProviderEvent::parse(&body("refund.processed")).unwrap();
        assert_eq!(
            event,
            ProviderEvent::Unknown {
                event: "refund.processed".into()
            }
        );
    }

    #[test]
    fn malformed_bodies_are_errors() {
        assert_matches!(
            ProviderEvent::parse(b"not json"),
            Err(EventParseError::Envelope(_))
        );
        assert_matches!(
            ProviderEvent::parse(br#"{"event":"payment.captured","payload":{}}"#),
            Err(EventParseError::Entity { .. })
        );
    }
}
