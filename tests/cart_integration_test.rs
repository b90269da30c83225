//! Integration tests for the cart endpoints feeding checkout.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, TestApp};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_add_item_merges_quantities() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let ammo = app.seed_product("9mm FMJ 50rd", dec!(18.50)).await;
    let token = app.token_for(user.id);

    for quantity in [2, 3] {
        let response = app
            .request(
                Method::POST,
                "/api/v1/cart/items",
                Some(json!({"productId": ammo.id, "quantity": quantity})),
                Some(&token),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .request(Method::GET, "/api/v1/cart", None, Some(&token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    let items = body["data"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(items[0]["productName"], "9mm FMJ 50rd");
    assert_eq!(body["data"]["itemCount"], 1);
}

#[tokio::test]
async fn test_add_item_validates_input() {
    let app = TestApp::new().await;
    let user = app.seed_user().await;
    let ammo = app.seed_product("9mm FMJ 50rd", dec!(18.50)).await;
    let token = app.token_for(user.id);

    let zero = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"productId": ammo.id, "quantity": 0})),
            Some(&token),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(zero).await["code"], "VALIDATION_ERROR");

    let unknown = app
        .request(
            Method::POST,
            "/api/v1/cart/items",
            Some(json!({"productId": Uuid::new_v4(), "quantity": 1})),
            Some(&token),
        )
        .await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    assert_eq!(app.active_cart_count(user.id).await, 0);
}

#[tokio::test]
async fn test_cart_requires_session() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/cart", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new().await;

    let live = app.request(Method::GET, "/health", None, None).await;
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(response_json(live).await["status"], "up");

    let ready = app.request(Method::GET, "/health/ready", None, None).await;
    assert_eq!(ready.status(), StatusCode::OK);
    assert_eq!(response_json(ready).await["ready"], true);
}

#[tokio::test]
async fn test_request_id_is_echoed_in_errors() {
    let app = TestApp::new().await;

    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/v1/orders/order_missing")
        .header("x-request-id", "req-test-42")
        .header(
            "authorization",
            format!("Bearer {}", app.token_for(Uuid::new_v4())),
        )
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(
        storefront_payments::app_router(
            app.state.clone(),
            tower_http::cors::CorsLayer::permissive(),
        ),
        request,
    )
    .await
    .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-test-42"
    );
    let body = response_json(response).await;
    assert_eq!(body["code"], "NOT_FOUND");
    assert_eq!(body["request_id"], "req-test-42");
}
