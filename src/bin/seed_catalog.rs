//! Loads a catalog seed file into the database.
//!
//! Run with: cargo run --bin seed-catalog -- path/to/catalog.json
//!
//! The path may also come from `CATALOG_SEED_PATH`. Products and categories are
//! upserted by id, so the command can be re-run after editing the file.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use storefront_checkout::{
    config, db,
    services::commerce::product_catalog_service::{CatalogSeed, SeaOrmCatalog},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(cfg.log_level(), cfg.log_json);

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("CATALOG_SEED_PATH").ok())
        .context("usage: seed-catalog <catalog.json> (or set CATALOG_SEED_PATH)")?;

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read seed file {}", path))?;
    let seed: CatalogSeed = serde_json::from_str(&raw)
        .with_context(|| format!("seed file {} is not a valid catalog", path))?;
    info!(
        categories = seed.categories.len(),
        products = seed.products.len(),
        "loaded catalog seed from {}",
        path
    );

    let pool = db::establish_connection_from_app_config(&cfg).await?;
    db::run_migrations(&pool).await?;

    let catalog = SeaOrmCatalog::new(Arc::new(pool));
    seed.apply(&catalog).await?;

    info!("catalog seeded");
    Ok(())
}
