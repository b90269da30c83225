use crate::entities::{order, order_line_item, payment, user, OrderStatus, PaymentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::cart::{load_active_lines, CartLine};
use crate::services::payment_provider::{CreateProviderOrder, PaymentProvider, ProviderOrder};
use crate::services::pricing::{to_minor_units, PricingPolicy, Quote};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, DbErr, EntityTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// What the client needs to open the hosted payment UI. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutOrder {
    /// Provider order id; the key every later call uses.
    #[schema(example = "order_NmH2oXh3zv1a9K")]
    pub order_id: String,
    /// Minor units (paise).
    #[schema(example = 66248)]
    pub amount: i64,
    #[schema(example = "INR")]
    pub currency: String,
    /// Public provider key.
    #[schema(example = "rzp_test_1DP5mmOlF5G5ag")]
    pub key: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub pricing: PricingPolicy,
    pub currency: String,
    pub public_key: String,
    pub provider_timeout: Duration,
}

impl From<&crate::config::AppConfig> for CheckoutSettings {
    fn from(cfg: &crate::config::AppConfig) -> Self {
        Self {
            pricing: PricingPolicy::from(cfg),
            currency: cfg.payment_currency.clone(),
            public_key: cfg.public_payment_key().to_string(),
            provider_timeout: cfg.provider_timeout(),
        }
    }
}

/// Mints PENDING orders from the caller's cart.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    provider: Arc<dyn PaymentProvider>,
    events: Arc<EventSender>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        events: Arc<EventSender>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            provider,
            events,
            settings,
        }
    }

    /// Creates a provider order and the matching PENDING ledger rows.
    ///
    /// Cart rows are left untouched; only a captured payment consumes them.
    #[instrument(skip(self))]
    pub async fn create_order(&self, user_id: Uuid) -> Result<CheckoutOrder, ServiceError> {
        let db = &*self.db;

        user::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::Unauthenticated("unknown user".into()))?;

        let lines = load_active_lines(db, user_id).await?;
        if lines.is_empty() {
            counter!("checkout.orders.rejected", 1, "reason" => "empty_cart");
            return Err(ServiceError::EmptyCart);
        }

        let price_lines: Vec<_> = lines.iter().map(CartLine::price_line).collect();
        let quote = self.settings.pricing.quote(&price_lines);
        let amount_minor = to_minor_units(quote.total)?;

        let provider_order = self
            .open_provider_order(user_id, amount_minor, lines.len())
            .await?;

        if provider_order.amount != amount_minor {
            warn!(
                provider_order_id = %provider_order.id,
                requested = amount_minor,
                returned = provider_order.amount,
                "Provider echoed a different amount"
            );
        }

        let order = match self.persist(user_id, &quote, &lines, &provider_order.id).await {
            Ok(order) => order,
            Err(e) => {
                error!(
                    provider_order_id = %provider_order.id,
                    %user_id,
                    amount_minor,
                    error = %e,
                    "Orphaned provider order: local persistence failed"
                );
                counter!("checkout.orders.orphaned", 1);
                self.events
                    .send_or_log(Event::ProviderOrderOrphaned {
                        provider_order_id: provider_order.id.clone(),
                        user_id,
                        amount_minor,
                        reason: e.to_string(),
                        at: Utc::now(),
                    })
                    .await;
                return Err(ServiceError::PersistenceFailed {
                    provider_order_id: provider_order.id,
                    reason: e.to_string(),
                });
            }
        };

        counter!("checkout.orders.created", 1);
        info!(
            order_id = %order.id,
            provider_order_id = %order.provider_order_id,
            total = %order.total,
            "Pending order created"
        );
        self.events
            .send_or_log(Event::OrderCreated {
                order_id: order.id,
                user_id,
                provider_order_id: order.provider_order_id.clone(),
                total: order.total,
            })
            .await;

        Ok(CheckoutOrder {
            order_id: order.provider_order_id,
            amount: amount_minor,
            currency: self.settings.currency.clone(),
            key: self.settings.public_key.clone(),
        })
    }

    async fn open_provider_order(
        &self,
        user_id: Uuid,
        amount_minor: i64,
        cart_items_count: usize,
    ) -> Result<ProviderOrder, ServiceError> {
        let mut notes = BTreeMap::new();
        notes.insert("userId".to_string(), user_id.to_string());
        notes.insert("cartItemsCount".to_string(), cart_items_count.to_string());

        let request = CreateProviderOrder {
            amount: amount_minor,
            currency: self.settings.currency.clone(),
            receipt: format!("order_{}", Utc::now().timestamp_millis()),
            notes,
        };

        let provider = Arc::clone(&self.provider);
        let call = crate::tracing::with_metrics("payment_provider.create_order", move || async move {
            provider.create_order(request).await
        });

        match tokio::time::timeout(self.settings.provider_timeout, call).await {
            Ok(Ok(order)) => Ok(order),
            Ok(Err(e)) => {
                counter!("checkout.orders.rejected", 1, "reason" => "provider_error");
                Err(e.into())
            }
            Err(_) => {
                counter!("checkout.orders.rejected", 1, "reason" => "provider_timeout");
                Err(ServiceError::ProviderUnavailable(format!(
                    "no response within {:?}",
                    self.settings.provider_timeout
                )))
            }
        }
    }

    async fn persist(
        &self,
        user_id: Uuid,
        quote: &Quote,
        lines: &[CartLine],
        provider_order_id: &str,
    ) -> Result<order::Model, DbErr> {
        let now = Utc::now();
        let txn = self.db.begin().await?;

        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            total: Set(quote.total),
            status: Set(OrderStatus::Pending),
            provider_order_id: Set(provider_order_id.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        for line in lines {
            order_line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order.id),
                product_id: Set(line.product.id),
                quantity: Set(line.entry.quantity),
                price: Set(line.product.price),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
        }

        payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            provider_payment_id: Set(None),
            amount: Set(quote.total),
            currency: Set(self.settings.currency.clone()),
            status: Set(PaymentStatus::Pending),
            failure_reason: Set(None),
            event_payload: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(order)
    }
}
