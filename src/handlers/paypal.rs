use axum::{
    extract::State,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::checkout::{CartItemInput, ShippingInfoInput};
use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::pricing::CartLine;
use crate::AppState;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletOrderBody {
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CartItemInput>,
    /// Optional contact; the full snapshot arrives with the capture call
    #[validate]
    pub customer_data: Option<ShippingInfoInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletOrderCreatedResponse {
    /// Wallet-processor order id, echoed back by the capture call
    #[serde(rename = "orderID")]
    pub order_id: String,
    /// Approval page for the customer
    pub url: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "orderID": "5O190127TN364715T",
    "customerData": {"name": "Ada Lovelace", "email": "ada@example.com", "address": "12 Byron St", "city": "London", "postalCode": "N1 9GU", "country": "GB"},
    "items": [{"productId": "550e8400-e29b-41d4-a716-446655440000", "name": "Walnut desk", "price": "20.00", "quantity": 2}]
}))]
pub struct CaptureBody {
    #[serde(rename = "orderID")]
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate]
    pub customer_data: ShippingInfoInput,
    /// Cart snapshot the totals are recomputed from
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CartItemInput>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CaptureResponse {
    pub success: bool,
    /// Wallet-processor order id (request echo)
    #[serde(rename = "orderID")]
    pub provider_order_id: String,
    /// Internal order id
    #[serde(rename = "orderId")]
    pub order_id: Uuid,
    pub status: order::OrderStatus,
}

/// Create a wallet-processor order from cart contents
#[utoipa::path(
    post,
    path = "/api/v1/paypal/orders",
    request_body = CreateWalletOrderBody,
    responses(
        (status = 200, description = "Remote order created", body = WalletOrderCreatedResponse),
        (status = 400, description = "Invalid cart", body = crate::errors::ErrorResponse),
        (status = 500, description = "Provider credentials missing", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider rejected the request", body = crate::errors::ErrorResponse)
    ),
    tag = "Wallet"
)]
pub async fn create_wallet_order(
    State(state): State<AppState>,
    Json(body): Json<CreateWalletOrderBody>,
) -> Result<Json<WalletOrderCreatedResponse>, ServiceError> {
    body.validate()?;

    let email = body.customer_data.as_ref().map(|c| c.email.clone());
    let lines: Vec<CartLine> = body.items.into_iter().map(CartLine::from).collect();

    let session = state.checkout.create_wallet_order(lines, email).await?;
    Ok(Json(WalletOrderCreatedResponse {
        order_id: session.correlation_id,
        url: session.redirect_url,
    }))
}

/// Capture an approved wallet order and record it in the ledger
#[utoipa::path(
    post,
    path = "/api/v1/paypal/capture",
    request_body = CaptureBody,
    responses(
        (status = 200, description = "Funds captured and order recorded", body = CaptureResponse),
        (status = 400, description = "Invalid payload or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order persistence failed after capture", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider capture failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Wallet"
)]
pub async fn capture_wallet_order(
    State(state): State<AppState>,
    Json(body): Json<CaptureBody>,
) -> Result<Json<CaptureResponse>, ServiceError> {
    body.validate()?;

    let lines: Vec<CartLine> = body.items.into_iter().map(CartLine::from).collect();
    let order = state
        .reconciliation
        .capture_wallet_order(&body.order_id, lines, body.customer_data.into())
        .await?;

    Ok(Json(CaptureResponse {
        success: true,
        provider_order_id: body.order_id,
        order_id: order.id,
        status: order.status,
    }))
}

pub fn paypal_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_wallet_order))
        .route("/capture", post(capture_wallet_order))
}
