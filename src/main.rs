use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use storefront_checkout as app;
use storefront_checkout::services::payments::{PaymentProvider, StripeClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = app::config::load_config().context("failed to load configuration")?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = app::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        app::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let payments: Option<Arc<dyn PaymentProvider>> = match StripeClient::from_config(&cfg)? {
        Some(client) => Some(Arc::new(client)),
        None => {
            warn!("STRIPE secret key not configured; checkout requests will fail until it is set");
            None
        }
    };
    if cfg.stripe_webhook_secret.is_none() {
        warn!("Stripe webhook secret not configured; every webhook delivery will be rejected");
    }
    if cfg.site_origin.is_none() {
        warn!(
            "site origin not configured; redirects will use {}",
            cfg.site_origin()
        );
    }

    let addr = SocketAddr::new(
        cfg.host
            .parse()
            .with_context(|| format!("invalid host address {}", cfg.host))?,
        cfg.port,
    );

    let state = app::AppState::new(Arc::new(db_pool), cfg, payments);
    let router = app::app_router(state);

    info!("storefront-checkout listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("storefront-checkout stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
