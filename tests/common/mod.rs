#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use rust_decimal::Decimal;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::Value;
use tempfile::TempDir;
use storefront_checkout::{
    app_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::order,
    services::commerce::product_catalog_service::{ProductSeed, SeaOrmCatalog},
    services::payments::{PaymentProvider, StripeClient},
    webhooks::{sign_payload, STRIPE_SIGNATURE_HEADER},
    AppState, CHECKOUT_PATH, PAYMENT_WEBHOOK_PATH,
};
use tower::ServiceExt;
use wiremock::MockServer;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const SITE_ORIGIN: &str = "https://shop.example";

/// Application wired to a SQLite database and a mock Stripe server.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub stripe: MockServer,
    _db_dir: Option<TempDir>,
}

pub struct TestAppBuilder {
    config: AppConfig,
    with_payments: bool,
    file_backed: bool,
}

impl TestAppBuilder {
    pub fn anon_key(mut self, key: &str) -> Self {
        self.config.anon_key = Some(key.to_string());
        self
    }

    pub fn without_payments(mut self) -> Self {
        self.with_payments = false;
        self
    }

    pub fn allow_client_priced_items(mut self) -> Self {
        self.config.allow_client_priced_items = true;
        self
    }

    pub fn ack_on_persistence_failure(mut self) -> Self {
        self.config.webhook_ack_on_persistence_failure = true;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    /// Uses a pooled on-disk database so requests can hit SQLite concurrently.
    pub fn file_backed(mut self) -> Self {
        self.file_backed = true;
        self
    }

    pub async fn build(self) -> TestApp {
        let stripe = MockServer::start().await;

        let db_dir = if self.file_backed {
            Some(TempDir::new().expect("temp dir for test database"))
        } else {
            None
        };
        let db_config = match &db_dir {
            Some(dir) => DbConfig {
                url: format!("sqlite://{}/orders.db?mode=rwc", dir.path().display()),
                max_connections: 4,
                min_connections: 1,
                ..Default::default()
            },
            None => DbConfig {
                url: "sqlite::memory:".to_string(),
                max_connections: 1,
                min_connections: 1,
                ..Default::default()
            },
        };

        let pool = db::establish_connection_with_config(&db_config)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let payments: Option<Arc<dyn PaymentProvider>> = if self.with_payments {
            Some(Arc::new(
                StripeClient::new(
                    "sk_test_123",
                    stripe.uri(),
                    "2024-11-20.acacia",
                    Duration::from_secs(5),
                )
                .expect("stripe client"),
            ))
        } else {
            None
        };

        let state = AppState::new(Arc::new(pool), self.config, payments);
        let router = app_router(state.clone());

        TestApp {
            router,
            state,
            stripe,
            _db_dir: db_dir,
        }
    }
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        let mut config = AppConfig::default();
        config.site_origin = Some(SITE_ORIGIN.to_string());
        config.stripe_secret_key = Some("sk_test_123".to_string());
        config.stripe_webhook_secret = Some(WEBHOOK_SECRET.to_string());
        config.shipping_allowed_countries = "US,CA".to_string();
        TestAppBuilder {
            config,
            with_payments: true,
            file_backed: false,
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub async fn request(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn post_checkout(&self, body: &Value, bearer: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(CHECKOUT_PATH)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.request(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }

    pub async fn post_raw_checkout(&self, body: &'static str) -> Response {
        self.request(
            Request::builder()
                .method(Method::POST)
                .uri(CHECKOUT_PATH)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    /// Delivers `payload` with a signature header computed for `timestamp`.
    pub async fn post_webhook_signed(
        &self,
        payload: &str,
        secret: &str,
        timestamp: i64,
    ) -> Response {
        let signature = sign_payload(payload.as_bytes(), secret, timestamp);
        self.post_webhook(payload, Some(&signature)).await
    }

    pub async fn post_webhook(&self, payload: &str, signature: Option<&str>) -> Response {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(PAYMENT_WEBHOOK_PATH)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(signature) = signature {
            builder = builder.header(STRIPE_SIGNATURE_HEADER, signature);
        }
        self.request(builder.body(Body::from(payload.to_string())).unwrap())
            .await
    }

    pub async fn seed_product(&self, id: &str, name: &str, price: Decimal, available: bool) {
        let catalog = SeaOrmCatalog::new(self.state.db.clone());
        catalog
            .upsert_product(ProductSeed {
                id: id.to_string(),
                category_id: None,
                name: name.to_string(),
                slug: None,
                description: Some(format!("{} description", name)),
                short_description: None,
                price,
                compare_at_price: None,
                image_url: Some(format!("https://cdn.example/{}.jpg", id)),
                is_featured: false,
                is_available: available,
                is_customizable: false,
                stock_quantity: 10,
                tags: vec![],
            })
            .await
            .expect("seed product");
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count orders")
    }

    pub async fn orders(&self) -> Vec<order::Model> {
        order::Entity::find()
            .all(self.state.db.as_ref())
            .await
            .expect("list orders")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decodes a form-encoded request body into key/value pairs.
pub fn form_pairs(body: &[u8]) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

pub fn form_value<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
