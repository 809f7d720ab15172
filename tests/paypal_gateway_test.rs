//! Wallet gateway tests against a stubbed provider API.

use serde_json::json;
use storefront_api::errors::ServiceError;
use storefront_api::providers::paypal::{PayPalConfig, PayPalGateway};
use storefront_api::providers::{CreateSessionRequest, SessionLineItem};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway_for(server: &MockServer) -> PayPalGateway {
    PayPalGateway::new(PayPalConfig::new(
        "client_test".into(),
        "secret_test".into(),
        server.uri(),
    ))
    .expect("gateway")
}

fn session_request() -> CreateSessionRequest {
    CreateSessionRequest {
        line_items: vec![SessionLineItem {
            name: "Walnut desk".into(),
            unit_amount_minor: 2000,
            quantity: 2,
        }],
        shipping_minor: 599,
        tax_minor: 0,
        currency: "usd".into(),
        reference: "ORD-TEST1234".into(),
        customer_email: Some("ada@example.com".into()),
        success_url: "http://localhost:3000/s".into(),
        cancel_url: "http://localhost:3000/c".into(),
        locale: None,
    }
}

async fn mount_token_stub(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "A21AAtest",
            "token_type": "Bearer",
            "expires_in": 32400
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn create_order_returns_the_approval_link() {
    let server = MockServer::start().await;
    mount_token_stub(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "CREATED",
            "links": [
                {"href": format!("{}/checkoutnow?token=5O190127TN364715T", server.uri()), "rel": "approve", "method": "GET"},
                {"href": format!("{}/v2/checkout/orders/5O190127TN364715T", server.uri()), "rel": "self", "method": "GET"}
            ]
        })))
        .mount(&server)
        .await;

    let session = gateway_for(&server)
        .create_order(&session_request())
        .await
        .expect("order created");

    assert_eq!(session.correlation_id, "5O190127TN364715T");
    assert!(session.redirect_url.contains("checkoutnow"));
}

#[tokio::test]
async fn capture_reports_the_captured_amount_in_minor_units() {
    let server = MockServer::start().await;
    mount_token_stub(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/5O190127TN364715T/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "5O190127TN364715T",
            "status": "COMPLETED",
            "purchase_units": [{
                "payments": {"captures": [{
                    "id": "3C679366HH908993F",
                    "status": "COMPLETED",
                    "amount": {"currency_code": "USD", "value": "45.99"}
                }]}
            }]
        })))
        .mount(&server)
        .await;

    let outcome = gateway_for(&server)
        .capture_order("5O190127TN364715T")
        .await
        .expect("capture");

    assert_eq!(outcome.amount_minor, 4599);
    assert_eq!(outcome.provider_status, "COMPLETED");
    assert_eq!(outcome.correlation_id, "5O190127TN364715T");
}

#[tokio::test]
async fn capture_failure_is_a_provider_error() {
    let server = MockServer::start().await;
    mount_token_stub(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/BAD/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY",
            "details": [{"issue": "ORDER_NOT_APPROVED"}]
        })))
        .mount(&server)
        .await;

    let err = gateway_for(&server).capture_order("BAD").await.unwrap_err();
    assert!(matches!(err, ServiceError::ProviderError(_)));
}

#[tokio::test]
async fn rejected_token_request_is_a_provider_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = gateway_for(&server)
        .capture_order("ANY")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ProviderError(_)));
}

#[tokio::test]
async fn blank_credentials_fail_at_construction() {
    let err = PayPalGateway::new(PayPalConfig::new("".into(), "".into(), "http://x".into()))
        .err()
        .expect("construction must fail");
    assert!(matches!(err, ServiceError::ConfigurationError(_)));
}
