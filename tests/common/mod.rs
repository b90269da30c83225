#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use storefront_payments::{
    auth::{AuthConfig, AuthService},
    config::AppConfig,
    db,
    entities::{cart_entry, order, payment, product, user},
    events::{self, EventSender},
    services::payment_provider::{
        CreateProviderOrder, PaymentProvider, ProviderError, ProviderOrder,
    },
    services::AppServices,
    webhooks::{SignatureVerifier, SIGNATURE_HEADER},
    AppState,
};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "whsec_integration_test";
pub const KEY_SECRET: &str = "key_secret_integration_test";
pub const PUBLIC_KEY: &str = "rzp_test_public";

/// Stand-in for the hosted provider. Hands out sequential order ids.
#[derive(Default)]
pub struct FakeProvider {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
    pub delay: Mutex<Option<Duration>>,
    pub requests: Mutex<Vec<CreateProviderOrder>>,
}

impl FakeProvider {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CreateProviderOrder> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_order(
        &self,
        request: CreateProviderOrder,
    ) -> Result<ProviderOrder, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                status: 502,
                body: "upstream unavailable".into(),
            });
        }

        Ok(ProviderOrder {
            id: format!("order_test{:04}", n),
            amount: request.amount,
            currency: request.currency,
            status: Some("created".into()),
        })
    }
}

/// Router plus a migrated temporary SQLite ledger.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    _dir: TempDir,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("storefront_test.sqlite").display()
        );

        let mut cfg = AppConfig::new(
            url,
            "integration_test_secret_key_that_is_long_enough_for_hs256_validation_0123".into(),
            "127.0.0.1".into(),
            18_080,
            "test".into(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.payment_key_id = "rzp_test_key_id".into();
        cfg.payment_key_secret = KEY_SECRET.into();
        cfg.payment_public_key = Some(PUBLIC_KEY.into());
        cfg.payment_webhook_secret = WEBHOOK_SECRET.into();
        cfg.payment_provider_timeout_secs = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let provider = Arc::new(FakeProvider::default());
        let auth_service = Arc::new(AuthService::new(AuthConfig::from(&cfg)));
        let services = AppServices::new(
            db_arc.clone(),
            provider.clone(),
            event_sender.clone(),
            &cfg,
        );

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            events: event_sender,
            auth: auth_service,
            services,
        };

        let router = storefront_payments::app_router(
            state.clone(),
            tower_http::cors::CorsLayer::permissive(),
        );

        Self {
            router,
            state,
            provider,
            _dir: dir,
            _event_task: event_task,
        }
    }

    pub fn token_for(&self, user_id: Uuid) -> String {
        self.state
            .auth
            .issue_token(user_id)
            .expect("issue test token")
    }

    pub async fn seed_user(&self) -> user::Model {
        let id = Uuid::new_v4();
        user::ActiveModel {
            id: Set(id),
            email: Set(format!("{}@example.com", id)),
            name: Set(Some("Range Day".into())),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed user")
    }

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn add_to_cart(&self, user_id: Uuid, product_id: Uuid, quantity: i32) {
        self.state
            .services
            .cart
            .add_item(user_id, product_id, quantity)
            .await
            .expect("add to cart");
    }

    pub async fn active_cart_count(&self, user_id: Uuid) -> u64 {
        self.state
            .services
            .cart
            .active_count(user_id)
            .await
            .expect("count cart")
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find()
            .all(&*self.state.db)
            .await
            .expect("list orders")
            .len()
    }

    pub async fn payment_count(&self) -> usize {
        payment::Entity::find()
            .all(&*self.state.db)
            .await
            .expect("list payments")
            .len()
    }

    pub async fn cart_rows(&self, user_id: Uuid) -> Vec<cart_entry::Model> {
        cart_entry::Entity::find()
            .filter(cart_entry::Column::UserId.eq(user_id))
            .all(&*self.state.db)
            .await
            .expect("list cart rows")
    }

    /// Order and payment rows for a provider order id.
    pub async fn ledger(&self, provider_order_id: &str) -> (order::Model, payment::Model) {
        let (order, payment) = order::Entity::find()
            .filter(order::Column::ProviderOrderId.eq(provider_order_id))
            .find_also_related(payment::Entity)
            .one(&*self.state.db)
            .await
            .expect("query ledger")
            .expect("order exists");
        (order, payment.expect("payment exists"))
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Serves the router on an ephemeral local port and returns its base URL.
    pub async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let router = self.router.clone();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}", addr)
    }

    pub async fn create_checkout_order(&self, token: &str) -> Response {
        self.request(Method::POST, "/api/v1/checkout/orders", None, Some(token))
            .await
    }

    /// Delivers a webhook body with the given signature header value.
    pub async fn deliver_webhook_raw(&self, body: Vec<u8>, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/payments/webhook")
            .header("content-type", "application/json");
        if let Some(sig) = signature {
            builder = builder.header(SIGNATURE_HEADER, sig);
        }

        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("build webhook request"))
            .await
            .expect("router error during webhook request")
    }

    /// Delivers a correctly signed webhook.
    pub async fn deliver_webhook(&self, payload: &Value) -> Response {
        let body = serde_json::to_vec(payload).expect("serialize webhook");
        let sig = sign(&body);
        self.deliver_webhook_raw(body, Some(&sig)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub fn sign(body: &[u8]) -> String {
    SignatureVerifier::new(WEBHOOK_SECRET)
        .sign(body)
        .expect("sign webhook body")
}

pub fn payment_event(
    event: &str,
    provider_order_id: &str,
    provider_payment_id: &str,
    amount_minor: i64,
) -> Value {
    let failed = event == "payment.failed";
    let status = if failed { "failed" } else { "captured" };
    let (error_code, error_description) = if failed {
        (
            Value::from("BAD_REQUEST_ERROR"),
            Value::from("Payment declined by issuing bank"),
        )
    } else {
        (Value::Null, Value::Null)
    };

    serde_json::json!({
        "entity": "event",
        "account_id": "acc_test",
        "event": event,
        "contains": ["payment"],
        "payload": {
            "payment": {
                "entity": {
                    "id": provider_payment_id,
                    "entity": "payment",
                    "amount": amount_minor,
                    "currency": "INR",
                    "status": status,
                    "order_id": provider_order_id,
                    "method": "card",
                    "error_code": error_code,
                    "error_description": error_description
                }
            }
        },
        "created_at": Utc::now().timestamp()
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
