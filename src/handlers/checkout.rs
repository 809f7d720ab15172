use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::entities::order;
use crate::errors::ServiceError;
use crate::services::orders::ShippingContact;
use crate::services::pricing::CartLine;
use crate::AppState;

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CartItemInput {
    pub product_id: Uuid,
    /// Display name snapshotted onto the order item
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Unit price in major units (e.g. "20.00")
    pub price: Decimal,
    pub quantity: u32,
    pub selected_color: Option<String>,
    pub selected_size: Option<String>,
    pub selected_material: Option<String>,
}

impl From<CartItemInput> for CartLine {
    fn from(input: CartItemInput) -> Self {
        CartLine {
            product_id: input.product_id,
            name: input.name,
            unit_price: input.price,
            quantity: input.quantity,
            selected_color: input.selected_color,
            selected_size: input.selected_size,
            selected_material: input.selected_material,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingInfoInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    pub phone: Option<String>,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub postal_code: String,
    #[validate(length(min = 2, max = 2, message = "country must be a 2-letter code"))]
    pub country: String,
}

impl From<ShippingInfoInput> for ShippingContact {
    fn from(input: ShippingInfoInput) -> Self {
        ShippingContact {
            name: input.name,
            email: input.email,
            phone: input.phone,
            address: input.address,
            city: input.city,
            postal_code: input.postal_code,
            country: input.country,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
#[schema(example = json!({
    "items": [{"productId": "550e8400-e29b-41d4-a716-446655440000", "name": "Walnut desk", "price": "20.00", "quantity": 2}],
    "shippingInfo": {"name": "Ada Lovelace", "email": "ada@example.com", "address": "12 Byron St", "city": "London", "postalCode": "N1 9GU", "country": "GB"},
    "locale": "en"
}))]
pub struct CreateSessionBody {
    #[validate(length(min = 1, message = "cart must contain at least one item"))]
    pub items: Vec<CartItemInput>,
    #[validate]
    pub shipping_info: ShippingInfoInput,
    pub locale: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionCreatedResponse {
    /// Provider-hosted payment page the customer is redirected to
    pub url: String,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct OrderLookupQuery {
    /// Card-processor session id from the success redirect
    pub session_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummaryResponse {
    pub order_number: String,
    pub total: Decimal,
    pub status: order::OrderStatus,
    pub payment_status: order::PaymentStatus,
}

impl From<order::Model> for OrderSummaryResponse {
    fn from(model: order::Model) -> Self {
        Self {
            order_number: model.order_number,
            total: model.total,
            status: model.status,
            payment_status: model.payment_status,
        }
    }
}

/// Create a card-processor checkout session from cart contents
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    request_body = CreateSessionBody,
    responses(
        (status = 200, description = "Session created; redirect the customer", body = SessionCreatedResponse),
        (status = 400, description = "Invalid cart or contact data", body = crate::errors::ErrorResponse),
        (status = 500, description = "Provider credentials missing", body = crate::errors::ErrorResponse),
        (status = 502, description = "Provider rejected the request", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<Json<SessionCreatedResponse>, ServiceError> {
    body.validate()?;

    let lines: Vec<CartLine> = body.items.into_iter().map(CartLine::from).collect();
    let session = state
        .checkout
        .create_card_session(lines, body.shipping_info.into(), body.locale)
        .await?;

    Ok(Json(SessionCreatedResponse {
        url: session.redirect_url,
    }))
}

/// Confirmation-view lookup of an order by payment session
#[utoipa::path(
    get,
    path = "/api/v1/checkout/order",
    params(OrderLookupQuery),
    responses(
        (status = 200, description = "Order summary", body = OrderSummaryResponse),
        (status = 404, description = "No order for this session", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn lookup_order(
    State(state): State<AppState>,
    Query(query): Query<OrderLookupQuery>,
) -> Result<Json<OrderSummaryResponse>, ServiceError> {
    let order = state
        .checkout
        .order_summary_by_session(&query.session_id)
        .await?;
    Ok(Json(order.into()))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/session", post(create_session))
        .route("/order", get(lookup_order))
}
