use axum::{extract::State, response::Json, routing::post, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthUser, errors::ServiceError, services::checkout::CheckoutOrder, AppState,
};

/// Callback fields the hosted payment UI hands back on success.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct VerifyPaymentRequest {
    #[validate(length(min = 1))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    pub verified: bool,
    pub message: String,
    pub order_id: String,
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_checkout_order))
        .route("/verify", post(verify_payment))
}

/// Create a payment order from the caller's cart
#[utoipa::path(
    post,
    path = "/api/v1/checkout/orders",
    summary = "Create checkout order",
    description = "Prices the caller's active cart, opens a provider order and records it as PENDING",
    responses(
        (status = 200, description = "Provider order opened", body = CheckoutOrder,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Cart is empty", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order could not be recorded", body = crate::errors::ErrorResponse),
        (status = 503, description = "Payment provider unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Checkout"
)]
pub async fn create_checkout_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<CheckoutOrder>, ServiceError> {
    let order = state.services.checkout.create_order(auth_user.user_id).await?;
    Ok(Json(order))
}

/// Check the checkout callback signature. Writes nothing; the webhook
/// remains the only source of payment state.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/verify",
    summary = "Verify checkout callback",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Signature checked", body = VerifyPaymentResponse),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Checkout"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<VerifyPaymentResponse>, ServiceError> {
    request.validate()?;

    if !state
        .services
        .orders
        .owned_by(auth_user.user_id, &request.razorpay_order_id)
        .await?
    {
        return Err(ServiceError::NotFound(format!(
            "order {}",
            request.razorpay_order_id
        )));
    }

    let verified = match state.services.checkout_verifier.verify_checkout(
        &request.razorpay_order_id,
        &request.razorpay_payment_id,
        &request.razorpay_signature,
    ) {
        Ok(()) => true,
        Err(err) => {
            warn!(
                order_id = %request.razorpay_order_id,
                error = %err,
                "Checkout callback signature rejected"
            );
            false
        }
    };

    info!(order_id = %request.razorpay_order_id, verified, "Checkout callback verified");

    let message = if verified {
        "Payment received; confirmation will follow shortly"
    } else {
        "Payment could not be verified"
    };

    Ok(Json(VerifyPaymentResponse {
        verified,
        message: message.to_string(),
        order_id: request.razorpay_order_id,
    }))
}
