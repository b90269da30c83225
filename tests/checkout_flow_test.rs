//! Integration tests for checkout order creation.
//!
//! Tests cover:
//! - Cart -> provider order -> PENDING ledger rows
//! - Frozen totals and line-item prices
//! - Provider failure and timeout leave no rows
//! - Empty cart and missing session rejections
//! - The non-authoritative checkout verification helper

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp, KEY_SECRET, PUBLIC_KEY};
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ModelTrait, Set};
use serde_json::json;
use storefront_payments::{
    entities::{order, order_line_item, product, OrderStatus, PaymentStatus},
    webhooks::SignatureVerifier,
};

// ==================== Order creation ====================

#[tokio::test]
async fn test_glock_checkout_creates_pending_order() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let glock = app.seed_product("Glock 19 Gen 5", dec!(599.99)).await;
    app.add_to_cart(user.id, glock.id, 1).await;
    let token = app.token_for(user.id);

    let response = app.create_checkout_order(&token).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;

    // 599.99 + 9.99 shipping + 52.499125 tax = 662.479125 -> 662.48
    assert_eq!(body["amount"], 66248);
    assert_eq!(body["currency"], "INR");
    assert_eq!(body["key"], PUBLIC_KEY);
    assert!(body.get("keySecret").is_none());
    assert!(!body.to_string().contains(KEY_SECRET));

    let provider_order_id = body["orderId"].as_str().unwrap();
    let (order, payment) = app.ledger(provider_order_id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total.round_dp(2), dec!(662.48));
    assert_eq!(order.user_id, user.id);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(payment.amount.round_dp(2), dec!(662.48));
    assert_eq!(payment.currency, "INR");
    assert!(payment.provider_payment_id.is_none());

    let request = app.provider.last_request().unwrap();
    assert_eq!(request.amount, 66248);
    assert!(request.receipt.starts_with("order_"));
    assert_eq!(request.notes["userId"], user.id.to_string());
    assert_eq!(request.notes["cartItemsCount"], "1");

    // Creation never consumes the cart; only a captured payment does.
    assert_eq!(app.active_cart_count(user.id).await, 1);
}

#[tokio::test]
async fn test_total_and_line_prices_are_frozen_at_creation() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let mags = app.seed_product("17rd Magazine", dec!(100.00)).await;
    let holster = app.seed_product("Kydex Holster", dec!(50.00)).await;
    app.add_to_cart(user.id, mags.id, 2).await;
    app.add_to_cart(user.id, holster.id, 1).await;
    let token = app.token_for(user.id);

    let body = response_json(app.create_checkout_order(&token).await).await;
    assert_eq!(body["amount"], 28187);
    let provider_order_id = body["orderId"].as_str().unwrap().to_string();

    // Catalog price changes after the order was minted.
    let mut repriced: product::ActiveModel = mags.clone().into();
    repriced.price = Set(dec!(120.00));
    repriced.update(&*app.state.db).await.unwrap();

    let (order, _) = app.ledger(&provider_order_id).await;
    assert_eq!(order.total.round_dp(2), dec!(281.87));

    let items = order
        .find_related(order_line_item::Entity)
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    let mag_line = items.iter().find(|i| i.product_id == mags.id).unwrap();
    assert_eq!(mag_line.price.round_dp(2), dec!(100.00));
    assert_eq!(mag_line.quantity, 2);

    // The ledger refuses to rewrite a total or a frozen line.
    let mut tampered: order::ActiveModel = order.clone().into();
    tampered.total = Set(dec!(1.00));
    assert!(tampered.update(&*app.state.db).await.is_err());

    let mut tampered_line: order_line_item::ActiveModel = mag_line.clone().into();
    tampered_line.price = Set(dec!(120.00));
    assert!(tampered_line.update(&*app.state.db).await.is_err());

    let (order, _) = app.ledger(&provider_order_id).await;
    assert_eq!(order.total.round_dp(2), dec!(281.87));

    // The status read path reports the frozen values too.
    let status = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{}", provider_order_id),
            None,
            Some(&token),
        )
        .await;
    assert_eq!(status.status(), StatusCode::OK);
    let view = response_json(status).await;
    assert_eq!(view["data"]["status"], "PENDING");
    assert_eq!(view["data"]["paymentStatus"], "PENDING");
    assert_eq!(view["data"]["lineItems"].as_array().unwrap().len(), 2);
}

// ==================== Failure modes ====================

#[tokio::test]
async fn test_provider_failure_writes_nothing() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let glock = app.seed_product("Glock 19 Gen 5", dec!(599.99)).await;
    app.add_to_cart(user.id, glock.id, 1).await;
    app.provider.fail.store(true, Ordering::SeqCst);

    let response = app.create_checkout_order(&app.token_for(user.id)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(response).await;
    assert_eq!(body["code"], "PROVIDER_UNAVAILABLE");

    assert_eq!(app.provider.call_count(), 1);
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.payment_count().await, 0);
    assert_eq!(app.active_cart_count(user.id).await, 1);
}

#[tokio::test]
async fn test_provider_timeout_is_reported_as_unavailable() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let glock = app.seed_product("Glock 19 Gen 5", dec!(599.99)).await;
    app.add_to_cart(user.id, glock.id, 1).await;
    *app.provider.delay.lock().unwrap() = Some(Duration::from_secs(3));

    let response = app.create_checkout_order(&app.token_for(user.id)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(response).await;
    assert_eq!(body["code"], "PROVIDER_UNAVAILABLE");
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn test_empty_cart_is_rejected_without_calling_provider() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;

    let response = app.create_checkout_order(&app.token_for(user.id)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["code"], "EMPTY_CART");

    assert_eq!(app.provider.call_count(), 0);
    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn test_missing_or_invalid_session_is_unauthenticated() {
    let app = TestApp::new().await;

    let response = app
        .request(Method::POST, "/api/v1/checkout/orders", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "UNAUTHENTICATED");

    let response = app.create_checkout_order("not-a-token").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // A well-formed token for a user the ledger does not know.
    let ghost = app.token_for(uuid::Uuid::new_v4());
    let response = app.create_checkout_order(&ghost).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response_json(response).await["code"], "UNAUTHENTICATED");

    assert_eq!(app.provider.call_count(), 0);
}

// ==================== Checkout verification helper ====================

#[tokio::test]
async fn test_verify_checks_signature_and_writes_nothing() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let glock = app.seed_product("Glock 19 Gen 5", dec!(599.99)).await;
    app.add_to_cart(user.id, glock.id, 1).await;
    let token = app.token_for(user.id);

    let body = response_json(app.create_checkout_order(&token).await).await;
    let provider_order_id = body["orderId"].as_str().unwrap().to_string();
    let signature = SignatureVerifier::new(KEY_SECRET)
        .sign(format!("{}|pay_verify1", provider_order_id).as_bytes())
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "razorpay_order_id": provider_order_id,
                "razorpay_payment_id": "pay_verify1",
                "razorpay_signature": signature,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let verified = response_json(response).await;
    assert_eq!(verified["verified"], true);
    assert_eq!(verified["orderId"], provider_order_id.as_str());

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "razorpay_order_id": provider_order_id,
                "razorpay_payment_id": "pay_other",
                "razorpay_signature": signature,
            })),
            Some(&token),
        )
        .await;
    assert_eq!(response_json(response).await["verified"], false);

    // Verification is advisory only.
    let (order, payment) = app.ledger(&provider_order_id).await;
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(payment.status, PaymentStatus::Pending);
    assert_eq!(app.active_cart_count(user.id).await, 1);
}

#[tokio::test]
async fn test_verify_hides_other_users_orders() {
    let app = TestApp::new().await;
    let owner = app.seed_user().await;
    let other = app.seed_user().await;
    let glock = app.seed_product("Glock 19 Gen 5", dec!(599.99)).await;
    app.add_to_cart(owner.id, glock.id, 1).await;

    let body = response_json(app.create_checkout_order(&app.token_for(owner.id)).await).await;
    let provider_order_id = body["orderId"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout/verify",
            Some(json!({
                "razorpay_order_id": provider_order_id,
                "razorpay_payment_id": "pay_1",
                "razorpay_signature": "00",
            })),
            Some(&app.token_for(other.id)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_orders_list_is_scoped_to_caller() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let other = app.seed_user().await;
    let glock = app.seed_product("Glock 19 Gen 5", dec!(599.99)).await;
    app.add_to_cart(user.id, glock.id, 1).await;
    let token = app.token_for(user.id);

    app.create_checkout_order(&token).await;
    app.create_checkout_order(&token).await;

    let mine = response_json(
        app.request(Method::GET, "/api/v1/orders", None, Some(&token))
            .await,
    )
    .await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 2);

    let theirs = response_json(
        app.request(
            Method::GET,
            "/api/v1/orders",
            None,
            Some(&app.token_for(other.id)),
        )
        .await,
    )
    .await;
    assert!(theirs["data"].as_array().unwrap().is_empty());
}
