use crate::{
    entities::{category, product},
    errors::{ServiceError, ServiceResult},
    middleware_helpers::retry::{with_retry, CatalogRetryPolicy, RetryConfig},
};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

pub type Product = product::Model;
pub type Category = category::Model;

/// Optional filters for listing products.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    pub available: Option<bool>,
    pub featured: Option<bool>,
    pub category_id: Option<String>,
}

/// Read access to product and category records.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter) -> ServiceResult<Vec<Product>>;

    /// Products whose id is in `ids`. Unknown ids are simply absent from the result.
    async fn get_products_by_ids(&self, ids: &[String]) -> ServiceResult<Vec<Product>>;

    async fn list_categories(&self) -> ServiceResult<Vec<Category>>;
}

/// Catalog backed by the `products` and `categories` tables.
#[derive(Clone)]
pub struct SeaOrmCatalog {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmCatalog {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Inserts the product or overwrites the existing row with the same id.
    #[instrument(skip(self, seed), fields(product_id = %seed.id))]
    pub async fn upsert_product(&self, seed: ProductSeed) -> ServiceResult<()> {
        let model = seed.into_model()?;
        product::Entity::insert(model.into_active_model())
            .on_conflict(
                OnConflict::column(product::Column::Id)
                    .update_columns([
                        product::Column::CategoryId,
                        product::Column::Name,
                        product::Column::Slug,
                        product::Column::Description,
                        product::Column::ShortDescription,
                        product::Column::Price,
                        product::Column::CompareAtPrice,
                        product::Column::ImageUrl,
                        product::Column::IsFeatured,
                        product::Column::IsAvailable,
                        product::Column::IsCustomizable,
                        product::Column::StockQuantity,
                        product::Column::Tags,
                        product::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        debug!("product upserted");
        Ok(())
    }

    #[instrument(skip(self, seed), fields(category_id = %seed.id))]
    pub async fn upsert_category(&self, seed: CategorySeed) -> ServiceResult<()> {
        let model = seed.into_model();
        category::Entity::insert(model.into_active_model())
            .on_conflict(
                OnConflict::column(category::Column::Id)
                    .update_columns([
                        category::Column::Name,
                        category::Column::Slug,
                        category::Column::Description,
                        category::Column::ImageUrl,
                        category::Column::DisplayOrder,
                        category::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;
        debug!("category upserted");
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for SeaOrmCatalog {
    #[instrument(skip(self))]
    async fn list_products(&self, filter: &ProductFilter) -> ServiceResult<Vec<Product>> {
        let mut query = product::Entity::find();
        if let Some(available) = filter.available {
            query = query.filter(product::Column::IsAvailable.eq(available));
        }
        if let Some(featured) = filter.featured {
            query = query.filter(product::Column::IsFeatured.eq(featured));
        }
        if let Some(category_id) = &filter.category_id {
            query = query.filter(product::Column::CategoryId.eq(category_id.clone()));
        }

        let products = query
            .order_by_desc(product::Column::IsFeatured)
            .order_by_asc(product::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn get_products_by_ids(&self, ids: &[String]) -> ServiceResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(ids.iter().cloned()))
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        let categories = category::Entity::find()
            .order_by_asc(category::Column::DisplayOrder)
            .order_by_asc(category::Column::Name)
            .all(&*self.db)
            .await?;
        Ok(categories)
    }
}

/// Wraps a catalog with a per-call timeout and a bounded retry on transient failures.
///
/// Only used for reads, which are safe to repeat.
pub struct ResilientCatalog {
    inner: Arc<dyn CatalogStore>,
    timeout: Duration,
    retry: RetryConfig,
}

impl ResilientCatalog {
    pub fn new(inner: Arc<dyn CatalogStore>, timeout: Duration, retries: u32) -> Self {
        Self {
            inner,
            timeout,
            retry: RetryConfig::with_retries(retries),
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn bounded<T, F, Fut>(&self, operation: &str, call: F) -> ServiceResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = ServiceResult<T>>,
    {
        let timeout = self.timeout;
        with_retry(&self.retry, CatalogRetryPolicy, || {
            let attempt = call();
            async move {
                match tokio::time::timeout(timeout, attempt).await {
                    Ok(result) => result,
                    Err(_) => Err(ServiceError::CatalogUnavailable(format!(
                        "{} timed out after {:?}",
                        operation, timeout
                    ))),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl CatalogStore for ResilientCatalog {
    async fn list_products(&self, filter: &ProductFilter) -> ServiceResult<Vec<Product>> {
        self.bounded("list_products", || self.inner.list_products(filter))
            .await
    }

    async fn get_products_by_ids(&self, ids: &[String]) -> ServiceResult<Vec<Product>> {
        self.bounded("get_products_by_ids", || self.inner.get_products_by_ids(ids))
            .await
    }

    async fn list_categories(&self) -> ServiceResult<Vec<Category>> {
        self.bounded("list_categories", || self.inner.list_categories())
            .await
    }
}

/// Product record as written by the seeding tool.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductSeed {
    pub id: String,
    #[serde(default)]
    pub category_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub short_description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub is_customizable: bool,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl ProductSeed {
    fn into_model(self) -> ServiceResult<Product> {
        if self.price.is_sign_negative() {
            return Err(ServiceError::ValidationError(format!(
                "product {} has a negative price",
                self.id
            )));
        }
        if self.stock_quantity < 0 {
            return Err(ServiceError::ValidationError(format!(
                "product {} has a negative stock quantity",
                self.id
            )));
        }

        let now = Utc::now();
        let slug = self.slug.unwrap_or_else(|| slugify(&self.name));
        Ok(product::Model {
            id: self.id,
            category_id: self.category_id,
            name: self.name,
            slug,
            description: self.description,
            short_description: self.short_description,
            price: self.price,
            compare_at_price: self.compare_at_price,
            image_url: self.image_url,
            is_featured: self.is_featured,
            is_available: self.is_available,
            is_customizable: self.is_customizable,
            stock_quantity: self.stock_quantity,
            tags: Some(serde_json::Value::from(self.tags)),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Category record as written by the seeding tool.
#[derive(Debug, Clone, Deserialize)]
pub struct CategorySeed {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub display_order: i32,
}

impl CategorySeed {
    fn into_model(self) -> Category {
        let now = Utc::now();
        let slug = self.slug.unwrap_or_else(|| slugify(&self.name));
        category::Model {
            id: self.id,
            name: self.name,
            slug,
            description: self.description,
            image_url: self.image_url,
            display_order: self.display_order,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Seed file consumed by the `seed-catalog` binary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

impl CatalogSeed {
    #[instrument(skip_all, fields(categories = self.categories.len(), products = self.products.len()))]
    pub async fn apply(self, catalog: &SeaOrmCatalog) -> ServiceResult<()> {
        for category in self.categories {
            catalog.upsert_category(category).await?;
        }
        for product in self.products {
            catalog.upsert_product(product).await?;
        }
        info!("catalog seed applied");
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}
