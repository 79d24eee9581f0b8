//! Storefront checkout service
//!
//! Turns storefront carts into hosted Stripe checkout sessions and records
//! paid orders from Stripe's completion webhook.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod openapi;
pub mod redirect;
pub mod services;
pub mod tracing;
pub mod webhooks;

use axum::{
    http::{header, HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Instant};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::services::commerce::{
    CatalogStore, CheckoutService, CheckoutSettings, OrderStore, ResilientCatalog, SeaOrmCatalog,
    SeaOrmOrderStore,
};
use crate::services::payments::PaymentProvider;

pub const CHECKOUT_PATH: &str = "/functions/v1/create-checkout";
pub const PAYMENT_WEBHOOK_PATH: &str = "/functions/v1/handle-payment-webhook";

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<dyn OrderStore>,
    pub started_at: Instant,
}

impl AppState {
    /// Wires the database-backed catalog and order store.
    ///
    /// `payments` is `None` when no Stripe key is configured; checkout calls then fail
    /// with a configuration error while webhooks keep working.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        payments: Option<Arc<dyn PaymentProvider>>,
    ) -> Self {
        let catalog: Arc<dyn CatalogStore> = Arc::new(ResilientCatalog::new(
            Arc::new(SeaOrmCatalog::new(db.clone())),
            config.catalog_timeout(),
            config.catalog_retry_attempts,
        ));
        let orders: Arc<dyn OrderStore> = Arc::new(SeaOrmOrderStore::new(db.clone()));
        Self::from_parts(db, config, catalog, orders, payments)
    }

    pub fn from_parts(
        db: Arc<DatabaseConnection>,
        config: AppConfig,
        catalog: Arc<dyn CatalogStore>,
        orders: Arc<dyn OrderStore>,
        payments: Option<Arc<dyn PaymentProvider>>,
    ) -> Self {
        let settings = CheckoutSettings::from_config(&config);
        Self {
            db,
            config: Arc::new(config),
            checkout: Arc::new(CheckoutService::new(catalog, payments, settings)),
            orders,
            started_at: Instant::now(),
        }
    }
}

/// Browser-facing CORS policy: any origin may call the two function endpoints.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ])
}

/// Builds the full HTTP surface with its middleware stack.
pub fn app_router(state: AppState) -> Router {
    let checkout_routes = Router::new()
        .route(
            CHECKOUT_PATH,
            post(handlers::checkout::create_checkout)
                .options(handlers::checkout::checkout_preflight),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            middleware_helpers::require_anon_key,
        ));

    Router::new()
        .merge(checkout_routes)
        .route(
            PAYMENT_WEBHOOK_PATH,
            post(handlers::payment_webhooks::handle_payment_webhook),
        )
        .route("/health", get(handlers::health::health_check))
        .route("/api-docs/openapi.json", get(openapi::openapi_json))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(middleware::map_response(middleware_helpers::json_error_body))
        .layer(TraceLayer::new_for_http().make_span_with(crate::tracing::RequestSpanMaker))
        .layer(cors_layer())
        .layer(middleware::from_fn(middleware_helpers::request_id_middleware))
        .with_state(state)
}
