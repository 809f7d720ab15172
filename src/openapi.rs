use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.3.0",
        description = r#"
# Storefront API

Checkout orchestration and payment reconciliation for the storefront.

- **Checkout**: price carts and create provider-hosted payment sessions
- **Wallet**: create and capture wallet-processor orders
- **Webhooks**: signature-verified payment notifications

## Error Handling

Errors share one response shape with appropriate HTTP status codes:

```json
{
  "error": "Bad Request",
  "message": "Validation error: cart is empty",
  "request_id": "req-abc123",
  "timestamp": "2026-08-07T00:00:00Z"
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
        (name = "Checkout", description = "Checkout session endpoints"),
        (name = "Wallet", description = "Wallet-processor order endpoints"),
        (name = "Webhooks", description = "Payment provider notifications")
    ),
    paths(
        crate::handlers::checkout::create_session,
        crate::handlers::checkout::lookup_order,
        crate::handlers::paypal::create_wallet_order,
        crate::handlers::paypal::capture_wallet_order,
        crate::handlers::webhooks::stripe_webhook,
    ),
    components(
        schemas(
            crate::handlers::checkout::CreateSessionBody,
            crate::handlers::checkout::CartItemInput,
            crate::handlers::checkout::ShippingInfoInput,
            crate::handlers::checkout::SessionCreatedResponse,
            crate::handlers::checkout::OrderSummaryResponse,
            crate::handlers::paypal::CreateWalletOrderBody,
            crate::handlers::paypal::WalletOrderCreatedResponse,
            crate::handlers::paypal::CaptureBody,
            crate::handlers::paypal::CaptureResponse,
            crate::entities::order::OrderStatus,
            crate::entities::order::PaymentStatus,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_covers_the_payment_surface() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string_pretty(&openapi).unwrap();
        assert!(json.contains("Storefront API"));
        assert!(json.contains("/api/v1/checkout/session"));
        assert!(json.contains("/api/v1/paypal/capture"));
        assert!(json.contains("/api/v1/webhooks/stripe"));
    }
}
