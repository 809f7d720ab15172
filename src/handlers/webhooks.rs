use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::errors::ServiceError;
use crate::providers::stripe;
use crate::AppState;

/// Card-processor webhook: raw body + signature header
///
/// Non-2xx responses make the provider redeliver, which the reconciliation
/// layer is idempotent against.
#[utoipa::path(
    post,
    path = "/api/v1/webhooks/stripe",
    request_body = String,
    responses(
        (status = 200, description = "Event applied or acknowledged"),
        (status = 400, description = "Malformed payload or amount mismatch", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or invalid signature", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not yet visible; provider should retry", body = crate::errors::ErrorResponse),
        (status = 500, description = "Webhook secret not configured", body = crate::errors::ErrorResponse)
    ),
    tag = "Webhooks"
)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let gateway = state.stripe.as_ref().ok_or_else(|| {
        ServiceError::ConfigurationError(
            "card processor webhook is not configured".to_string(),
        )
    })?;

    // Authenticity first: nothing in the body is parsed before the
    // signature over the raw bytes checks out.
    gateway.verify_webhook_signature(&headers, &body)?;

    let event = stripe::parse_event(&body)?;
    state.reconciliation.apply_event(event).await?;

    Ok(Json(json!({ "received": true })))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/stripe", post(stripe_webhook))
}
