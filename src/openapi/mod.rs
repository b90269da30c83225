use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Payments API",
        version = "0.1.0",
        description = r#"
# Storefront Payments API

Checkout and payment reconciliation for the storefront.

## Flow

1. `POST /api/v1/checkout/orders` prices the caller's cart and opens a provider order.
2. The client completes payment in the provider's hosted UI.
3. The provider calls `POST /api/v1/payments/webhook`; this is the only path that
   marks an order `PAID` or `FAILED`.
4. The client polls `GET /api/v1/orders/{provider_order_id}` for the final status.

## Authentication

Shopper endpoints require a session token in the Authorization header:

```
Authorization: Bearer <your-jwt-token>
```

The webhook is authenticated by the `x-razorpay-signature` header instead.

## Error Handling

Errors share one body shape with a machine-readable `code`:

```json
{
  "error": "Bad Request",
  "code": "EMPTY_CART",
  "message": "Cart is empty",
  "request_id": "0f9c...",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Order creation and checkout callback verification"),
        (name = "Orders", description = "Order status read path"),
        (name = "Cart", description = "Cart entries feeding checkout"),
        (name = "Payments", description = "Payment provider webhooks"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Checkout
        crate::handlers::checkout::create_checkout_order,
        crate::handlers::checkout::verify_payment,

        // Orders
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order_status,

        // Cart
        crate::handlers::cart::get_cart,
        crate::handlers::cart::add_cart_item,

        // Webhooks
        crate::handlers::payment_webhooks::payment_webhook,

        // Health
        crate::health::health_check,
        crate::health::readiness_check,
    ),
    components(
        schemas(
            crate::services::checkout::CheckoutOrder,
            crate::handlers::checkout::VerifyPaymentRequest,
            crate::handlers::checkout::VerifyPaymentResponse,
            crate::services::orders::OrderView,
            crate::services::orders::LineItemView,
            crate::entities::OrderStatus,
            crate::entities::PaymentStatus,
            crate::handlers::cart::AddCartItemRequest,
            crate::handlers::cart::CartResponse,
            crate::handlers::cart::CartItemResponse,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::health::HealthInfo,
            crate::health::ReadinessInfo,
            crate::health::HealthStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "Bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
