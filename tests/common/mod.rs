// Shared harness; each test binary uses a subset of these helpers.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    config::AppConfig,
    db,
    entities::product,
    events::{self, EventSender},
    providers::{paypal::PayPalConfig, paypal::PayPalGateway, stripe::StripeConfig, stripe::StripeGateway},
    services::{
        checkout::{CheckoutService, CheckoutUrls},
        inventory::InventoryService,
        orders::OrderService,
        reconciliation::ReconciliationService,
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Webhook signing secret shared between the test app and test payloads.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Provider endpoints the test app should talk to (wiremock servers).
#[derive(Default)]
pub struct ProviderStubs {
    pub stripe_base: Option<String>,
    pub paypal_base: Option<String>,
}

/// Helper harness wiring the full application state over an SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a test application with fresh database state and no
    /// payment gateways configured.
    pub async fn new() -> Self {
        Self::with_providers(ProviderStubs::default()).await
    }

    /// Construct a test application whose gateways point at stub servers.
    pub async fn with_providers(stubs: ProviderStubs) -> Self {
        let db_path = std::env::temp_dir().join(format!(
            "storefront_test_{}.db",
            Uuid::new_v4().simple()
        ));
        let mut cfg = AppConfig::new(
            format!("sqlite://{}?mode=rwc", db_path.display()),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        if let Some(base) = &stubs.stripe_base {
            cfg.stripe_secret_key = Some("sk_test_key".to_string());
            cfg.stripe_webhook_secret = Some(TEST_WEBHOOK_SECRET.to_string());
            cfg.stripe_api_base = base.clone();
        }
        if let Some(base) = &stubs.paypal_base {
            cfg.paypal_client_id = Some("client_test".to_string());
            cfg.paypal_client_secret = Some("secret_test".to_string());
            cfg.paypal_api_base = base.clone();
        }

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let stripe = cfg.stripe_config().map(|config: StripeConfig| {
            Arc::new(StripeGateway::new(config).expect("stripe gateway"))
        });
        let paypal = cfg.paypal_config().map(|config: PayPalConfig| {
            Arc::new(PayPalGateway::new(config).expect("paypal gateway"))
        });

        let policy = cfg.pricing_policy().expect("pricing policy");
        let orders = OrderService::new(db_arc.clone());
        let inventory = InventoryService::new(db_arc.clone(), event_sender.clone());
        let checkout = CheckoutService::new(
            policy.clone(),
            CheckoutUrls {
                success_url: cfg.checkout_success_url.clone(),
                cancel_url: cfg.checkout_cancel_url.clone(),
            },
            stripe.clone(),
            paypal.clone(),
            orders.clone(),
            event_sender.clone(),
        );
        let reconciliation = ReconciliationService::new(
            db_arc.clone(),
            orders.clone(),
            inventory,
            paypal,
            policy,
            event_sender.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            checkout,
            reconciliation,
            orders,
            stripe,
        };

        let router = Router::new()
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(axum::middleware::from_fn(
                storefront_api::tracing::request_id_middleware,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Sends a JSON request through the router.
    pub async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response")
    }

    /// Sends a raw-body request with explicit headers (webhook style).
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        self.router
            .clone()
            .oneshot(builder.body(Body::from(body)).expect("request"))
            .await
            .expect("response")
    }

    /// Seeds one product row and returns it.
    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            stock_quantity: Set(stock),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn assert_status(response: &Response, expected: StatusCode) {
    assert_eq!(
        response.status(),
        expected,
        "unexpected status: {:?}",
        response.status()
    );
}

/// Signs a webhook payload the way the card processor does.
pub fn sign_webhook(payload: &[u8], timestamp: i64) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(TEST_WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.").as_bytes());
    mac.update(payload);
    format!(
        "t={},v1={}",
        timestamp,
        hex::encode(mac.finalize().into_bytes())
    )
}
