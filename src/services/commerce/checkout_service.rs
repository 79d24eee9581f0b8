use crate::{
    config::AppConfig,
    errors::{ServiceError, ServiceResult},
    redirect,
    services::payments::{
        CheckoutLineItem, CheckoutSessionRequest, CreatedCheckoutSession, PaymentProvider,
    },
};
use metrics::counter;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::pricing_service::to_minor_units;
use super::product_catalog_service::{CatalogStore, Product};

/// Which payload shape a checkout request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutKind {
    /// Items carry name and price from the browser
    Cart,
    /// Items carry product ids; prices come from the catalog
    #[serde(alias = "buyNow")]
    BuyNow,
}

/// Body of `POST /functions/v1/create-checkout`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    /// Explicit payload shape. When absent the shape is inferred from the items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<CheckoutKind>,
    /// `{id, quantity}` objects, or `{name, description?, price, quantity, image?}` objects
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub items: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customization: Option<String>,
}

/// Successful checkout response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    /// Hosted payment page to send the browser to
    pub url: String,
}

/// A line whose price is asserted by the caller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientPricedItem {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A line referencing a catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BuyNowItem {
    pub id: String,
    #[serde(default)]
    pub quantity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedItems {
    Cart(Vec<ClientPricedItem>),
    BuyNow(Vec<BuyNowItem>),
}

/// Missing, zero and negative quantities all mean one.
pub fn effective_quantity(quantity: Option<i64>) -> u32 {
    quantity
        .unwrap_or(1)
        .clamp(1, i64::from(u32::MAX))
        .try_into()
        .unwrap_or(1)
}

fn has_id(item: &serde_json::Value) -> bool {
    item.get("id").map_or(false, |id| !id.is_null())
}

fn parse_items<T: serde::de::DeserializeOwned>(
    items: &[serde_json::Value],
    shape: &str,
) -> ServiceResult<Vec<T>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            T::deserialize(item).map_err(|e| {
                ServiceError::ValidationError(format!("items[{}] is not a valid {} item: {}", i, shape, e))
            })
        })
        .collect()
}

impl CheckoutRequest {
    /// Decides the payload shape and parses every item accordingly.
    ///
    /// With no `kind`, all items must agree: every item has an `id` (buy-now)
    /// or none does (cart). Mixed payloads are rejected rather than guessed.
    pub fn classify(&self) -> ServiceResult<ClassifiedItems> {
        if self.items.is_empty() {
            return Err(ServiceError::EmptyCart);
        }
        if let Some(i) = self.items.iter().position(|item| !item.is_object()) {
            return Err(ServiceError::ValidationError(format!(
                "items[{}] must be an object",
                i
            )));
        }

        let kind = match self.kind {
            Some(kind) => kind,
            None => {
                let with_id = self.items.iter().filter(|item| has_id(item)).count();
                if with_id == self.items.len() {
                    CheckoutKind::BuyNow
                } else if with_id == 0 {
                    CheckoutKind::Cart
                } else {
                    return Err(ServiceError::ValidationError(
                        "items mix product references and priced lines".to_string(),
                    ));
                }
            }
        };

        match kind {
            CheckoutKind::BuyNow => parse_items(&self.items, "buy-now").map(ClassifiedItems::BuyNow),
            CheckoutKind::Cart => parse_items(&self.items, "cart").map(ClassifiedItems::Cart),
        }
    }
}

/// Checkout behaviour taken from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub site_origin: String,
    pub currency: String,
    pub shipping_countries: Vec<String>,
    pub allow_client_priced_items: bool,
    pub max_customization_length: usize,
}

impl CheckoutSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            site_origin: config.site_origin().to_string(),
            currency: config.currency.to_ascii_lowercase(),
            shipping_countries: config.shipping_countries(),
            allow_client_priced_items: config.allow_client_priced_items,
            max_customization_length: config.max_customization_length,
        }
    }
}

/// Turns checkout requests into provider checkout sessions.
///
/// Performs no local writes. The provider call is made at most once per request.
#[derive(Clone)]
pub struct CheckoutService {
    catalog: Arc<dyn CatalogStore>,
    payments: Option<Arc<dyn PaymentProvider>>,
    settings: CheckoutSettings,
}

impl CheckoutService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        payments: Option<Arc<dyn PaymentProvider>>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            payments,
            settings,
        }
    }

    pub fn payments_configured(&self) -> bool {
        self.payments.is_some()
    }

    /// Validates the request and opens a hosted checkout session.
    #[instrument(skip(self, request), fields(items = request.items.len()))]
    pub async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> ServiceResult<CreatedCheckoutSession> {
        let result = self.try_create_session(request).await;
        match &result {
            Ok(session) => {
                counter!("checkout.sessions.created", 1);
                info!(session_id = %session.id, "checkout session created");
            }
            Err(err) => {
                counter!("checkout.sessions.failed", 1);
                warn!(error = %err, "checkout session not created");
            }
        }
        result
    }

    async fn try_create_session(
        &self,
        request: &CheckoutRequest,
    ) -> ServiceResult<CreatedCheckoutSession> {
        let items = request.classify()?;
        let payments = self.payments.as_ref().ok_or_else(|| {
            ServiceError::Configuration("stripe secret key is not configured".to_string())
        })?;
        let session_request = self.session_request_for(request, items).await?;
        payments.create_checkout_session(&session_request).await
    }

    /// Builds the provider request without calling the provider.
    pub async fn build_session_request(
        &self,
        request: &CheckoutRequest,
    ) -> ServiceResult<CheckoutSessionRequest> {
        let items = request.classify()?;
        self.session_request_for(request, items).await
    }

    async fn session_request_for(
        &self,
        request: &CheckoutRequest,
        items: ClassifiedItems,
    ) -> ServiceResult<CheckoutSessionRequest> {
        let (line_items, purchased) = match items {
            ClassifiedItems::BuyNow(items) => self.resolve_buy_now(&items).await?,
            ClassifiedItems::Cart(items) => self.client_priced_lines(&items)?,
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "customization".to_string(),
            self.customization_note(request.customization.as_deref()),
        );
        metadata.insert("items".to_string(), purchased.to_string());

        let customer_email = request
            .customer_email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        Ok(CheckoutSessionRequest {
            currency: self.settings.currency.clone(),
            line_items,
            success_url: redirect::success_url(&self.settings.site_origin),
            cancel_url: redirect::cancel_url(&self.settings.site_origin),
            customer_email,
            shipping_countries: self.settings.shipping_countries.clone(),
            metadata,
        })
    }

    /// Prices every line from the catalog. Any missing or unavailable product fails the whole request.
    async fn resolve_buy_now(
        &self,
        items: &[BuyNowItem],
    ) -> ServiceResult<(Vec<CheckoutLineItem>, serde_json::Value)> {
        if let Some(item) = items.iter().find(|i| i.id.trim().is_empty()) {
            return Err(ServiceError::ValidationError(format!(
                "product id must not be empty (got {:?})",
                item.id
            )));
        }

        let mut ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        ids.sort();
        ids.dedup();

        let products: HashMap<String, Product> = self
            .catalog
            .get_products_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut lines = Vec::with_capacity(items.len());
        let mut purchased = Vec::with_capacity(items.len());
        for item in items {
            let product = products
                .get(&item.id)
                .filter(|p| p.is_available)
                .ok_or_else(|| ServiceError::ProductUnavailable(item.id.clone()))?;

            let quantity = effective_quantity(item.quantity);
            lines.push(CheckoutLineItem {
                name: product.name.clone(),
                description: product
                    .short_description
                    .clone()
                    .filter(|d| !d.is_empty()),
                images: product.image_url.iter().cloned().collect(),
                unit_amount: to_minor_units(product.price)?,
                quantity,
                product_id: Some(product.id.clone()),
            });
            purchased.push(json!({ "id": product.id, "quantity": quantity }));
        }

        Ok((lines, serde_json::Value::Array(purchased)))
    }

    /// Legacy path: the caller's name, description, price and image are used as sent.
    fn client_priced_lines(
        &self,
        items: &[ClientPricedItem],
    ) -> ServiceResult<(Vec<CheckoutLineItem>, serde_json::Value)> {
        if !self.settings.allow_client_priced_items {
            return Err(ServiceError::ValidationError(
                "items must reference catalog products by id".to_string(),
            ));
        }
        warn!(
            items = items.len(),
            "accepting client-priced checkout items; amounts are not verified against the catalog"
        );

        let mut lines = Vec::with_capacity(items.len());
        let mut purchased = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let name = item.name.trim();
            if name.is_empty() {
                return Err(ServiceError::ValidationError(format!(
                    "items[{}].name must not be empty",
                    i
                )));
            }
            let quantity = effective_quantity(item.quantity);
            lines.push(CheckoutLineItem {
                name: name.to_string(),
                description: item.description.clone().filter(|d| !d.is_empty()),
                images: item.image.iter().filter(|s| !s.is_empty()).cloned().collect(),
                unit_amount: to_minor_units(item.price)?,
                quantity,
                product_id: None,
            });
            purchased.push(json!({ "name": name, "quantity": quantity }));
        }

        Ok((lines, serde_json::Value::Array(purchased)))
    }

    /// Trimmed and cut to the configured length; empty when absent.
    fn customization_note(&self, customization: Option<&str>) -> String {
        customization
            .map(str::trim)
            .unwrap_or_default()
            .chars()
            .take(self.settings.max_customization_length)
            .collect()
    }
}
