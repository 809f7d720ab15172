//! Card processor gateway (Stripe Checkout).
//!
//! Creates hosted checkout sessions, retrieves session state, verifies
//! webhook signatures, and parses webhook payloads into typed events.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::{error, warn};

use super::{CreateSessionRequest, CreatedSession, SessionDetails};
use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Card processor configuration.
#[derive(Clone, Debug)]
pub struct StripeConfig {
    secret_key: String,
    webhook_secret: Option<String>,
    api_base: String,
    tolerance_secs: u64,
}

impl StripeConfig {
    pub fn new(
        secret_key: String,
        webhook_secret: Option<String>,
        api_base: String,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            secret_key,
            webhook_secret,
            api_base,
            tolerance_secs,
        }
    }
}

pub struct StripeGateway {
    config: StripeConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Result<Self, ServiceError> {
        if config.secret_key.trim().is_empty() {
            return Err(ServiceError::ConfigurationError(
                "stripe secret key is not configured".to_string(),
            ));
        }
        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    /// Creates a provider-hosted checkout session and returns its redirect
    /// URL plus the session id as the correlation id.
    pub async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), request.success_url.clone()),
            ("cancel_url".into(), request.cancel_url.clone()),
            ("client_reference_id".into(), request.reference.clone()),
        ];
        if let Some(email) = &request.customer_email {
            form.push(("customer_email".into(), email.clone()));
        }
        if let Some(locale) = &request.locale {
            form.push(("locale".into(), locale.clone()));
        }

        let mut index = 0;
        for item in &request.line_items {
            push_line_item(
                &mut form,
                index,
                &request.currency,
                &item.name,
                item.unit_amount_minor,
                item.quantity,
            );
            index += 1;
        }
        // Shipping and tax ride as dedicated lines so the hosted page total
        // equals the order ledger total.
        if request.shipping_minor > 0 {
            push_line_item(
                &mut form,
                index,
                &request.currency,
                "Shipping",
                request.shipping_minor,
                1,
            );
            index += 1;
        }
        if request.tax_minor > 0 {
            push_line_item(&mut form, index, &request.currency, "Tax", request.tax_minor, 1);
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Card processor request failed");
                ServiceError::ProviderError("checkout session request failed".to_string())
            })?;

        let session: SessionResponse = parse_provider_response(response).await?;
        let redirect_url = session.url.ok_or_else(|| {
            ServiceError::ProviderError("checkout session has no redirect url".to_string())
        })?;

        Ok(CreatedSession {
            correlation_id: session.id,
            redirect_url,
        })
    }

    /// Fetches the current state of a checkout session.
    pub async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, ServiceError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.config.api_base, session_id
            ))
            .basic_auth(&self.config.secret_key, Option::<&str>::None)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, session_id = %session_id, "Card processor request failed");
                ServiceError::ProviderError("session lookup request failed".to_string())
            })?;

        let session: SessionResponse = parse_provider_response(response).await?;
        Ok(SessionDetails {
            correlation_id: session.id,
            payment_intent_id: session.payment_intent,
            amount_total_minor: session.amount_total.unwrap_or(0),
            payment_status: session.payment_status.unwrap_or_default(),
        })
    }

    /// Verifies the webhook signature header against the raw payload.
    pub fn verify_webhook_signature(
        &self,
        headers: &HeaderMap,
        payload: &[u8],
    ) -> Result<(), ServiceError> {
        let secret = self.config.webhook_secret.as_deref().ok_or_else(|| {
            ServiceError::ConfigurationError(
                "stripe webhook secret is not configured".to_string(),
            )
        })?;
        verify_signature(secret, self.config.tolerance_secs, headers, payload)
    }
}

fn push_line_item(
    form: &mut Vec<(String, String)>,
    index: usize,
    currency: &str,
    name: &str,
    unit_amount_minor: i64,
    quantity: u32,
) {
    let prefix = format!("line_items[{index}]");
    form.push((
        format!("{prefix}[price_data][currency]"),
        currency.to_string(),
    ));
    form.push((
        format!("{prefix}[price_data][product_data][name]"),
        name.to_string(),
    ));
    form.push((
        format!("{prefix}[price_data][unit_amount]"),
        unit_amount_minor.to_string(),
    ));
    form.push((format!("{prefix}[quantity]"), quantity.to_string()));
}

async fn parse_provider_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Malformed card processor response");
            ServiceError::ProviderError("malformed provider response".to_string())
        });
    }

    let detail = response
        .json::<ApiErrorBody>()
        .await
        .ok()
        .and_then(|body| body.error.message)
        .unwrap_or_else(|| format!("provider returned HTTP {status}"));
    error!(status = %status, detail = %detail, "Card processor rejected request");
    Err(ServiceError::ProviderError(detail))
}

/// Verifies a `Stripe-Signature` header (`t=<ts>,v1=<hmac>`) over
/// `"{t}.{payload}"` with the shared secret.
pub fn verify_signature(
    secret: &str,
    tolerance_secs: u64,
    headers: &HeaderMap,
    payload: &[u8],
) -> Result<(), ServiceError> {
    let header = headers
        .get("Stripe-Signature")
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ServiceError::AuthenticationError("missing webhook signature header".to_string())
        })?;

    let mut timestamp = "";
    let mut v1 = "";
    for part in header.split(',') {
        let mut it = part.trim().splitn(2, '=');
        match (it.next(), it.next()) {
            (Some("t"), Some(val)) => timestamp = val,
            (Some("v1"), Some(val)) => v1 = val,
            _ => {}
        }
    }
    if timestamp.is_empty() || v1.is_empty() {
        return Err(ServiceError::AuthenticationError(
            "malformed webhook signature header".to_string(),
        ));
    }

    let ts: i64 = timestamp.parse().map_err(|_| {
        ServiceError::AuthenticationError("malformed webhook timestamp".to_string())
    })?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).unsigned_abs() > tolerance_secs {
        warn!(
            event_timestamp = ts,
            current_time = now,
            "Webhook timestamp outside tolerance"
        );
        return Err(ServiceError::AuthenticationError(
            "webhook timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        ServiceError::ConfigurationError("stripe webhook secret is unusable".to_string())
    })?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !constant_time_eq(&expected, v1) {
        warn!("Webhook signature verification failed");
        return Err(ServiceError::AuthenticationError(
            "invalid webhook signature".to_string(),
        ));
    }
    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut res = 0u8;
    for (x, y) in a.as_bytes().iter().zip(b.as_bytes()) {
        res |= x ^ y;
    }
    res == 0
}

/// Webhook payload distilled to what the reconciliation handler acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    SessionCompleted {
        session_id: String,
        payment_intent_id: Option<String>,
        amount_minor: i64,
    },
    PaymentSucceeded {
        payment_intent_id: String,
        amount_minor: i64,
    },
    PaymentFailed {
        payment_intent_id: String,
    },
    DisputeCreated {
        payment_intent_id: String,
    },
    DisputeClosed {
        payment_intent_id: String,
        seller_won: bool,
    },
    ChargeRefunded {
        payment_intent_id: String,
    },
    Ignored {
        event_type: String,
    },
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    amount_received: Option<i64>,
    #[serde(default)]
    amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct DisputeObject {
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    #[serde(default)]
    payment_intent: Option<String>,
}

/// Parses a webhook body into a [`PaymentEvent`]. Signature verification
/// must happen before this is called.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, ServiceError> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook payload: {e}")))?;

    let event = match envelope.event_type.as_str() {
        "checkout.session.completed" => {
            let object: SessionObject = object_of(&envelope)?;
            PaymentEvent::SessionCompleted {
                session_id: object.id,
                payment_intent_id: object.payment_intent,
                amount_minor: object.amount_total.unwrap_or(0),
            }
        }
        "payment_intent.succeeded" => {
            let object: IntentObject = object_of(&envelope)?;
            let amount = object.amount_received.or(object.amount).unwrap_or(0);
            PaymentEvent::PaymentSucceeded {
                payment_intent_id: object.id,
                amount_minor: amount,
            }
        }
        "payment_intent.payment_failed" => {
            let object: IntentObject = object_of(&envelope)?;
            PaymentEvent::PaymentFailed {
                payment_intent_id: object.id,
            }
        }
        "charge.dispute.created" => {
            let object: DisputeObject = object_of(&envelope)?;
            PaymentEvent::DisputeCreated {
                payment_intent_id: require_intent(object.payment_intent)?,
            }
        }
        "charge.dispute.closed" => {
            let object: DisputeObject = object_of(&envelope)?;
            let seller_won = object.status.as_deref() == Some("won");
            PaymentEvent::DisputeClosed {
                payment_intent_id: require_intent(object.payment_intent)?,
                seller_won,
            }
        }
        "charge.refunded" => {
            let object: ChargeObject = object_of(&envelope)?;
            PaymentEvent::ChargeRefunded {
                payment_intent_id: require_intent(object.payment_intent)?,
            }
        }
        other => PaymentEvent::Ignored {
            event_type: other.to_string(),
        },
    };

    Ok(event)
}

fn object_of<T: serde::de::DeserializeOwned>(envelope: &EventEnvelope) -> Result<T, ServiceError> {
    serde_json::from_value(envelope.data.object.clone())
        .map_err(|e| ServiceError::ValidationError(format!("invalid webhook object: {e}")))
}

fn require_intent(intent: Option<String>) -> Result<String, ServiceError> {
    intent.ok_or_else(|| {
        ServiceError::ValidationError("webhook object carries no payment intent".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use serde_json::json;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn accepts_correctly_signed_payload() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = chrono::Utc::now().timestamp();
        let headers = headers_with(&sign(payload, now));
        assert!(verify_signature(SECRET, 300, &headers, payload).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let now = chrono::Utc::now().timestamp();
        let headers = headers_with(&sign(payload, now));
        let err = verify_signature(SECRET, 300, &headers, b"{\"type\":\"other\"}").unwrap_err();
        assert!(matches!(err, ServiceError::AuthenticationError(_)));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = br#"{}"#;
        let stale = chrono::Utc::now().timestamp() - 3600;
        let headers = headers_with(&sign(payload, stale));
        let err = verify_signature(SECRET, 300, &headers, payload).unwrap_err();
        assert!(matches!(err, ServiceError::AuthenticationError(_)));
    }

    #[test]
    fn rejects_missing_header() {
        let err = verify_signature(SECRET, 300, &HeaderMap::new(), b"{}").unwrap_err();
        assert!(matches!(err, ServiceError::AuthenticationError(_)));
    }

    #[test]
    fn parses_session_completed() {
        let payload = json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": {"object": {
                "id": "cs_test_123",
                "payment_intent": "pi_test_456",
                "amount_total": 4599
            }}
        });
        let event = parse_event(payload.to_string().as_bytes()).unwrap();
        assert_eq!(
            event,
            PaymentEvent::SessionCompleted {
                session_id: "cs_test_123".into(),
                payment_intent_id: Some("pi_test_456".into()),
                amount_minor: 4599,
            }
        );
    }

    #[test]
    fn parses_dispute_closed_outcomes() {
        let won = json!({
            "type": "charge.dispute.closed",
            "data": {"object": {"payment_intent": "pi_1", "status": "won"}}
        });
        assert_eq!(
            parse_event(won.to_string().as_bytes()).unwrap(),
            PaymentEvent::DisputeClosed {
                payment_intent_id: "pi_1".into(),
                seller_won: true
            }
        );

        let lost = json!({
            "type": "charge.dispute.closed",
            "data": {"object": {"payment_intent": "pi_1", "status": "lost"}}
        });
        assert_eq!(
            parse_event(lost.to_string().as_bytes()).unwrap(),
            PaymentEvent::DisputeClosed {
                payment_intent_id: "pi_1".into(),
                seller_won: false
            }
        );
    }

    #[test]
    fn unknown_event_types_are_ignored_not_errors() {
        let payload = json!({
            "type": "customer.created",
            "data": {"object": {"id": "cus_1"}}
        });
        assert_eq!(
            parse_event(payload.to_string().as_bytes()).unwrap(),
            PaymentEvent::Ignored {
                event_type: "customer.created".into()
            }
        );
    }

    #[test]
    fn refund_without_intent_is_a_validation_error() {
        let payload = json!({
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1"}}
        });
        assert!(matches!(
            parse_event(payload.to_string().as_bytes()),
            Err(ServiceError::ValidationError(_))
        ));
    }
}
