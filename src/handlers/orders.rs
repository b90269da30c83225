use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};

use crate::{
    auth::AuthUser, errors::ServiceError, services::orders::OrderView, ApiResponse, AppState,
};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/:provider_order_id", get(get_order_status))
}

/// The caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Orders belonging to the caller with their payment status, newest first",
    responses(
        (status = 200, description = "Orders retrieved successfully", body = ApiResponse<Vec<OrderView>>,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderView>>>, ServiceError> {
    let orders = state.services.orders.list_for_user(auth_user.user_id).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Ledger status of one order. Polled by the checkout handoff.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{provider_order_id}",
    summary = "Get order status",
    params(("provider_order_id" = String, Path, description = "Provider order id")),
    responses(
        (status = 200, description = "Order retrieved successfully", body = ApiResponse<OrderView>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order_status(
    State(state): State<AppState>,
    Path(provider_order_id): Path<String>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderView>>, ServiceError> {
    let view = state
        .services
        .orders
        .status_for_user(auth_user.user_id, &provider_order_id)
        .await?;
    Ok(Json(ApiResponse::success(view)))
}
