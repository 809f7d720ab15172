//! Wallet processor gateway (PayPal Orders v2).
//!
//! Creates remote orders from priced carts and captures approved orders.
//! OAuth2 client-credentials tokens are fetched per call; the processor's
//! token endpoint serves cached tokens itself.

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::{format_minor_units, parse_wire_amount, CaptureOutcome, CreateSessionRequest, CreatedSession};
use crate::errors::ServiceError;

/// Wallet processor configuration.
#[derive(Clone, Debug)]
pub struct PayPalConfig {
    client_id: String,
    client_secret: String,
    api_base: String,
}

impl PayPalConfig {
    pub fn new(client_id: String, client_secret: String, api_base: String) -> Self {
        Self {
            client_id,
            client_secret,
            api_base,
        }
    }
}

pub struct PayPalGateway {
    config: PayPalConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    links: Vec<LinkDescription>,
    #[serde(default)]
    purchase_units: Vec<PurchaseUnitResponse>,
}

#[derive(Debug, Deserialize)]
struct LinkDescription {
    href: String,
    rel: String,
}

#[derive(Debug, Deserialize)]
struct PurchaseUnitResponse {
    #[serde(default)]
    payments: Option<PaymentsResponse>,
}

#[derive(Debug, Deserialize)]
struct PaymentsResponse {
    #[serde(default)]
    captures: Vec<CaptureResponse>,
}

#[derive(Debug, Deserialize)]
struct CaptureResponse {
    #[serde(default)]
    status: Option<String>,
    amount: AmountResponse,
}

#[derive(Debug, Deserialize)]
struct AmountResponse {
    value: String,
}

#[derive(Debug, Serialize)]
struct MoneyValue {
    currency_code: String,
    value: String,
}

impl MoneyValue {
    fn new(currency: &str, minor: i64) -> Self {
        Self {
            currency_code: currency.to_uppercase(),
            value: format_minor_units(minor),
        }
    }
}

impl PayPalGateway {
    pub fn new(config: PayPalConfig) -> Result<Self, ServiceError> {
        if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
            return Err(ServiceError::ConfigurationError(
                "paypal credentials are not configured".to_string(),
            ));
        }
        Ok(Self {
            config,
            http: reqwest::Client::new(),
        })
    }

    async fn access_token(&self) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.api_base))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Wallet processor token request failed");
                ServiceError::ProviderError("token request failed".to_string())
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(status = %status, "Wallet processor rejected token request");
            return Err(ServiceError::ProviderError(format!(
                "token request returned HTTP {status}"
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            error!(error = %e, "Malformed wallet processor token response");
            ServiceError::ProviderError("malformed token response".to_string())
        })?;
        Ok(token.access_token)
    }

    /// Creates a remote order carrying the authoritative totals and returns
    /// the approval link for the customer.
    pub async fn create_order(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<CreatedSession, ServiceError> {
        let token = self.access_token().await?;

        let items: Vec<serde_json::Value> = request
            .line_items
            .iter()
            .map(|item| {
                json!({
                    "name": item.name,
                    "unit_amount": MoneyValue::new(&request.currency, item.unit_amount_minor),
                    "quantity": item.quantity.to_string(),
                })
            })
            .collect();

        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": request.reference,
                "amount": {
                    "currency_code": request.currency.to_uppercase(),
                    "value": format_minor_units(request.amount_total_minor()),
                    "breakdown": {
                        "item_total": MoneyValue::new(&request.currency, request.item_total_minor()),
                        "shipping": MoneyValue::new(&request.currency, request.shipping_minor),
                        "tax_total": MoneyValue::new(&request.currency, request.tax_minor),
                    }
                },
                "items": items,
            }],
            "application_context": {
                "return_url": request.success_url,
                "cancel_url": request.cancel_url,
            }
        });

        let response = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.api_base))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Wallet processor order creation failed");
                ServiceError::ProviderError("order creation request failed".to_string())
            })?;

        let order: OrderResponse = parse_provider_response(response).await?;
        let approve = order
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone())
            .ok_or_else(|| {
                ServiceError::ProviderError("order response carries no approval link".to_string())
            })?;

        Ok(CreatedSession {
            correlation_id: order.id,
            redirect_url: approve,
        })
    }

    /// Captures funds for an approved order and reports the captured amount
    /// in minor units.
    pub async fn capture_order(&self, order_id: &str) -> Result<CaptureOutcome, ServiceError> {
        let token = self.access_token().await?;

        let response = self
            .http
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.api_base, order_id
            ))
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body("{}")
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Wallet processor capture failed");
                ServiceError::ProviderError("capture request failed".to_string())
            })?;

        let order: OrderResponse = parse_provider_response(response).await?;

        let capture = order
            .purchase_units
            .first()
            .and_then(|unit| unit.payments.as_ref())
            .and_then(|payments| payments.captures.first())
            .ok_or_else(|| {
                ServiceError::ProviderError("capture response carries no capture".to_string())
            })?;

        let amount_minor = parse_wire_amount(&capture.amount.value)?;
        let provider_status = capture
            .status
            .clone()
            .or(order.status)
            .unwrap_or_else(|| "UNKNOWN".to_string());

        Ok(CaptureOutcome {
            correlation_id: order.id,
            amount_minor,
            provider_status,
        })
    }
}

async fn parse_provider_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(|e| {
            error!(error = %e, "Malformed wallet processor response");
            ServiceError::ProviderError("malformed provider response".to_string())
        });
    }

    let detail = response
        .text()
        .await
        .ok()
        .filter(|body| !body.is_empty())
        .unwrap_or_else(|| format!("provider returned HTTP {status}"));
    error!(status = %status, detail = %detail, "Wallet processor rejected request");
    Err(ServiceError::ProviderError(format!(
        "provider returned HTTP {status}"
    )))
}
