use crate::config::AppConfig;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,
    #[error("provider transport error: {0}")]
    Transport(String),
    #[error("provider rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("provider returned an unreadable response: {0}")]
    InvalidResponse(String),
}

impl From<ProviderError> for ServiceError {
    fn from(err: ProviderError) -> Self {
        ServiceError::ProviderUnavailable(err.to_string())
    }
}

/// Body of the provider "create order" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateProviderOrder {
    /// Minor units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub status: Option<String>,
}

/// Outbound half of the payment provider. Webhooks are the inbound half.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(&self, request: CreateProviderOrder)
        -> Result<ProviderOrder, ProviderError>;
}

/// Razorpay-compatible REST client (`POST {base}/orders`, basic auth).
#[derive(Clone)]
pub struct RazorpayClient {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(
        base_url: impl Into<String>,
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, ProviderError> {
        Self::new(
            cfg.payment_provider_base_url.clone(),
            cfg.payment_key_id.clone(),
            cfg.payment_key_secret.clone(),
            cfg.provider_timeout(),
        )
    }
}

#[async_trait]
impl PaymentProvider for RazorpayClient {
    #[instrument(skip(self, request), fields(amount = request.amount, receipt = %request.receipt))]
    async fn create_order(
        &self,
        request: CreateProviderOrder,
    ) -> Result<ProviderOrder, ProviderError> {
        let response = self
            .client
            .post(format!("{}/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Provider rejected create-order call");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let order: ProviderOrder = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        info!(provider_order_id = %order.id, "Provider order created");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_order_body_uses_provider_field_names() {
        let mut notes = BTreeMap::new();
        notes.insert("userId".to_string(), "u-1".to_string());
        let body = serde_json::to_value(CreateProviderOrder {
            amount: 66248,
            currency: "INR".into(),
            receipt: "order_1".into(),
            notes,
        })
        .unwrap();

        assert_eq!(body["amount"], 66248);
        assert_eq!(body["currency"], "INR");
        assert_eq!(body["notes"]["userId"], "u-1");
    }

    #[test]
    fn provider_errors_surface_as_unavailable() {
        let err: ServiceError = ProviderError::Timeout.into();
        assert_eq!(err.code(), "PROVIDER_UNAVAILABLE");
    }
}
