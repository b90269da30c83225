pub mod cart;
pub mod checkout;
pub mod orders;
pub mod payment_provider;
pub mod pricing;

use crate::config::AppConfig;
use crate::events::EventSender;
use crate::webhooks::{reconciliation::PaymentReconciler, signature::SignatureVerifier};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

use cart::CartService;
use checkout::{CheckoutService, CheckoutSettings};
use orders::OrderService;
use payment_provider::PaymentProvider;

/// Service container handed to the router through `AppState`.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub reconciler: Arc<PaymentReconciler>,
    pub webhook_verifier: Arc<SignatureVerifier>,
    pub checkout_verifier: Arc<SignatureVerifier>,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        provider: Arc<dyn PaymentProvider>,
        events: Arc<EventSender>,
        config: &AppConfig,
    ) -> Self {
        Self {
            cart: Arc::new(CartService::new(db.clone())),
            checkout: Arc::new(CheckoutService::new(
                db.clone(),
                provider,
                events.clone(),
                CheckoutSettings::from(config),
            )),
            orders: Arc::new(OrderService::new(db.clone())),
            reconciler: Arc::new(PaymentReconciler::new(db, events)),
            webhook_verifier: Arc::new(SignatureVerifier::new(
                config.payment_webhook_secret.clone(),
            )),
            checkout_verifier: Arc::new(SignatureVerifier::new(
                config.payment_key_secret.clone(),
            )),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::entities::{cart_entry, order, payment, product, user, OrderStatus, PaymentStatus};
    use chrono::Utc;
    use rust_decimal::Decimal;
    use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
    use std::sync::Arc;
    use tempfile::TempDir;
    use uuid::Uuid;

    /// Fresh migrated SQLite file. Keep the `TempDir` alive for the test's duration.
    pub async fn database() -> (TempDir, Arc<DatabaseConnection>) {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("unit.sqlite").display()
        );
        let db = crate::db::establish_connection_with_config(&crate::db::DbConfig {
            url,
            max_connections: 1,
            min_connections: 1,
            sqlx_logging: false,
            ..Default::default()
        })
        .await
        .expect("connect");
        crate::db::run_migrations(&db).await.expect("migrate");
        (dir, Arc::new(db))
    }

    pub async fn seed_user(db: &DatabaseConnection) -> user::Model {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(format!("{}@example.com", id)),
            name: Set(Some("Test Shopper".into())),
            created_at: Set(Utc::now()),
        }
        .insert(db)
        .await
        .expect("seed user")
    }

    pub async fn seed_product(db: &DatabaseConnection, name: &str, price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed product")
    }

    pub async fn seed_cart_entry(
        db: &DatabaseConnection,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> cart_entry::Model {
        cart_entry::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            added_at: Set(Utc::now()),
            removed_at: Set(None),
        }
        .insert(db)
        .await
        .expect("seed cart entry")
    }

    pub async fn seed_pending_order(
        db: &DatabaseConnection,
        user_id: Uuid,
        provider_order_id: &str,
        total: Decimal,
    ) -> order::Model {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            total: Set(total),
            status: Set(OrderStatus::Pending),
            provider_order_id: Set(provider_order_id.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed order");

        payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order.id),
            provider_payment_id: Set(None),
            amount: Set(total),
            currency: Set("INR".into()),
            status: Set(PaymentStatus::Pending),
            failure_reason: Set(None),
            event_payload: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .expect("seed payment");

        order
    }
}
