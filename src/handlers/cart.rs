use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::cart::CartLine,
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 100))]
    pub quantity: i32,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    /// Current catalog price; the order freezes its own copy
    #[schema(value_type = String, example = "599.99")]
    pub unit_price: Decimal,
    #[schema(value_type = String, example = "1199.98")]
    pub line_total: Decimal,
}

impl From<CartLine> for CartItemResponse {
    fn from(line: CartLine) -> Self {
        let line_total = line.price_line().line_total();
        Self {
            id: line.entry.id,
            product_id: line.product.id,
            product_name: line.product.name,
            quantity: line.entry.quantity,
            unit_price: line.product.price,
            line_total,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub items: Vec<CartItemResponse>,
    pub item_count: u64,
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_cart_item))
}

/// Active cart entries at current prices
#[utoipa::path(
    get,
    path = "/api/v1/cart",
    summary = "Get cart",
    responses(
        (status = 200, description = "Cart retrieved", body = ApiResponse<CartResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<CartResponse>>, ServiceError> {
    let cart = &state.services.cart;
    let lines = cart.active_lines(auth_user.user_id).await?;
    let item_count = cart.active_count(auth_user.user_id).await?;

    Ok(Json(ApiResponse::success(CartResponse {
        items: lines.into_iter().map(CartItemResponse::from).collect(),
        item_count,
    })))
}

/// Add a product to the cart
#[utoipa::path(
    post,
    path = "/api/v1/cart/items",
    summary = "Add cart item",
    description = "Adds a product, incrementing the quantity of an existing active entry",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Item added", body = ApiResponse<CartResponse>),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_cart_item(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<AddCartItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartResponse>>), ServiceError> {
    request.validate()?;

    let cart = &state.services.cart;
    cart.add_item(auth_user.user_id, request.product_id, request.quantity)
        .await?;

    let lines = cart.active_lines(auth_user.user_id).await?;
    let item_count = cart.active_count(auth_user.user_id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(CartResponse {
            items: lines.into_iter().map(CartItemResponse::from).collect(),
            item_count,
        })),
    ))
}
