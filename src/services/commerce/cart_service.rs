//! In-memory shopping cart for a single browser session.
//!
//! The cart keeps one line per product id and derives its totals from the
//! store's [`PricingPolicy`]. It performs no I/O; checkout turns it into a
//! [`CheckoutRequest`] with [`Cart::to_checkout_request`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::checkout_service::{CheckoutKind, CheckoutRequest};
use super::pricing_service::{out_of_range, round_currency, to_minor_units, PricingPolicy};
use super::product_catalog_service::Product;
use crate::errors::ServiceResult;

/// Longest customization text a shopper may attach to a line.
pub const MAX_LINE_CUSTOMIZATION_CHARS: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartError {
    #[error("Product {0} is not in the cart")]
    NotInCart(String),
    #[error("Customization must be at most {max} characters (got {len})")]
    CustomizationTooLong { len: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartLineItem {
    pub product: Product,
    /// Always at least 1 while the line exists
    pub quantity: u32,
    pub customization: Option<String>,
}

impl CartLineItem {
    pub fn line_total(&self) -> ServiceResult<Decimal> {
        self.product
            .price
            .checked_mul(Decimal::from(self.quantity))
            .ok_or_else(|| out_of_range(self.product.price))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

impl CartTotals {
    /// Total in minor units, as submitted to the payment provider.
    pub fn total_minor_units(&self) -> ServiceResult<i64> {
        to_minor_units(self.total)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLineItem>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLineItem] {
        &self.lines
    }

    pub fn line(&self, product_id: &str) -> Option<&CartLineItem> {
        self.lines.iter().find(|l| l.product.id == product_id)
    }

    fn line_mut(&mut self, product_id: &str) -> Option<&mut CartLineItem> {
        self.lines.iter_mut().find(|l| l.product.id == product_id)
    }

    /// Adds `quantity` of `product`, merging into an existing line. Adding zero is a no-op.
    pub fn add(&mut self, product: &Product, quantity: u32) {
        if quantity == 0 {
            return;
        }
        match self.line_mut(&product.id) {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLineItem {
                product: product.clone(),
                quantity,
                customization: None,
            }),
        }
    }

    pub fn remove(&mut self, product_id: &str) {
        self.lines.retain(|l| l.product.id != product_id);
    }

    /// Replaces a line's quantity; zero or negative removes the line.
    pub fn set_quantity(&mut self, product_id: &str, quantity: i64) {
        if quantity <= 0 {
            self.remove(product_id);
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        if let Some(line) = self.line_mut(product_id) {
            line.quantity = quantity;
        }
    }

    /// Attaches (or with `None`, clears) a line's customization text.
    pub fn set_customization(
        &mut self,
        product_id: &str,
        text: Option<&str>,
    ) -> Result<(), CartError> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if let Some(t) = text {
            let len = t.chars().count();
            if len > MAX_LINE_CUSTOMIZATION_CHARS {
                return Err(CartError::CustomizationTooLong {
                    len,
                    max: MAX_LINE_CUSTOMIZATION_CHARS,
                });
            }
        }
        let line = self
            .line_mut(product_id)
            .ok_or_else(|| CartError::NotInCart(product_id.to_string()))?;
        line.customization = text.map(str::to_string);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Number of units across all lines.
    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    /// Sum of line totals. Fails when the amount no longer fits a [`Decimal`].
    pub fn subtotal(&self) -> ServiceResult<Decimal> {
        self.lines.iter().try_fold(Decimal::ZERO, |acc, line| {
            let line_total = line.line_total()?;
            acc.checked_add(line_total)
                .ok_or_else(|| out_of_range(line_total))
        })
    }

    pub fn totals(&self) -> ServiceResult<CartTotals> {
        self.totals_with(&PricingPolicy::default())
    }

    pub fn totals_with(&self, policy: &PricingPolicy) -> ServiceResult<CartTotals> {
        let subtotal = round_currency(self.subtotal()?);
        let tax = policy.tax_for(subtotal)?;
        let shipping = policy.shipping_for(subtotal);
        let total = subtotal
            .checked_add(tax)
            .and_then(|t| t.checked_add(shipping))
            .ok_or_else(|| out_of_range(subtotal))?;
        Ok(CartTotals {
            subtotal,
            tax,
            shipping,
            total,
        })
    }

    pub fn amount_to_free_shipping(&self, policy: &PricingPolicy) -> ServiceResult<Decimal> {
        Ok(policy.amount_to_free_shipping(round_currency(self.subtotal()?)))
    }

    /// Builds the id-only checkout payload; prices are resolved server-side.
    ///
    /// When `customization` is `None`, per-line notes are folded into one.
    pub fn to_checkout_request(
        &self,
        customer_email: Option<String>,
        customization: Option<String>,
    ) -> CheckoutRequest {
        let items = self
            .lines
            .iter()
            .map(|l| json!({ "id": l.product.id, "quantity": l.quantity }))
            .collect();
        CheckoutRequest {
            kind: Some(CheckoutKind::BuyNow),
            items,
            customer_email,
            customization: customization.or_else(|| self.line_customizations()),
        }
    }

    /// Builds the legacy payload that carries names and prices from the cart.
    pub fn to_client_priced_request(
        &self,
        customer_email: Option<String>,
        customization: Option<String>,
    ) -> CheckoutRequest {
        let items = self
            .lines
            .iter()
            .map(|l| {
                let mut item = json!({
                    "name": l.product.name,
                    "description": l.product.short_description.clone().unwrap_or_default(),
                    "price": l.product.price.to_string(),
                    "quantity": l.quantity,
                });
                if let Some(image) = &l.product.image_url {
                    item["image"] = json!(image);
                }
                item
            })
            .collect();
        CheckoutRequest {
            kind: Some(CheckoutKind::Cart),
            items,
            customer_email,
            customization: customization.or_else(|| self.line_customizations()),
        }
    }

    fn line_customizations(&self) -> Option<String> {
        let notes: Vec<String> = self
            .lines
            .iter()
            .filter_map(|l| {
                l.customization
                    .as_ref()
                    .map(|c| format!("{}: {}", l.product.name, c))
            })
            .collect();
        if notes.is_empty() {
            None
        } else {
            Some(notes.join("; "))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use assert_matches::assert_matches;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    pub(crate) fn product(id: &str, price: Decimal) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            category_id: None,
            name: format!("Product {}", id),
            slug: id.to_string(),
            description: None,
            short_description: Some(format!("About {}", id)),
            price,
            compare_at_price: None,
            image_url: None,
            is_featured: false,
            is_available: true,
            is_customizable: true,
            stock_quantity: 10,
            tags: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn worked_example_totals() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(10.00)), 2);
        cart.add(&product("b", dec!(25.00)), 1);

        let totals = cart.totals().unwrap();
        assert_eq!(totals.subtotal, dec!(45.00));
        assert_eq!(totals.tax, dec!(3.60));
        assert_eq!(totals.shipping, dec!(8.99));
        assert_eq!(totals.total, dec!(57.59));
        assert_eq!(totals.total_minor_units().unwrap(), 5759);
    }

    #[test]
    fn free_shipping_above_threshold() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(51.00)), 1);

        let totals = cart.totals().unwrap();
        assert_eq!(totals.shipping, Decimal::ZERO);
        assert_eq!(totals.tax, dec!(4.08));
        assert_eq!(totals.total, dec!(55.08));
        assert_eq!(
            cart.amount_to_free_shipping(&PricingPolicy::default()).unwrap(),
            Decimal::ZERO
        );
    }

    #[test]
    fn adding_same_product_merges_lines() {
        let mut cart = Cart::new();
        let mug = product("mug", dec!(12.00));
        cart.add(&mug, 1);
        cart.add(&mug, 1);

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.line("mug").unwrap().quantity, 2);
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn adding_zero_does_not_create_a_line() {
        let mut cart = Cart::new();
        cart.add(&product("mug", dec!(12.00)), 0);
        assert!(cart.is_empty());
    }

    #[test]
    fn non_positive_quantity_removes_line() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(1)), 3);
        cart.add(&product("b", dec!(1)), 3);

        cart.set_quantity("a", 0);
        cart.set_quantity("b", -4);
        assert!(cart.is_empty());
    }

    #[test]
    fn set_quantity_replaces_and_ignores_unknown_ids() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(1)), 3);
        cart.set_quantity("a", 5);
        cart.set_quantity("zzz", 5);

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.line("a").unwrap().quantity, 5);
    }

    #[test]
    fn remove_and_clear() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(1)), 1);
        cart.add(&product("b", dec!(1)), 1);

        cart.remove("missing");
        assert_eq!(cart.lines().len(), 2);
        cart.remove("a");
        assert!(cart.line("a").is_none());
        cart.clear();
        assert!(cart.is_empty());
        assert_eq!(cart.totals().unwrap().subtotal, Decimal::ZERO);
    }

    #[test]
    fn customization_is_bounded() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(1)), 1);

        assert!(cart.set_customization("a", Some("For Grandma")).is_ok());
        assert_eq!(
            cart.line("a").unwrap().customization.as_deref(),
            Some("For Grandma")
        );

        let too_long = "x".repeat(51);
        assert_eq!(
            cart.set_customization("a", Some(&too_long)),
            Err(CartError::CustomizationTooLong { len: 51, max: 50 })
        );
        assert_eq!(
            cart.set_customization("nope", Some("hi")),
            Err(CartError::NotInCart("nope".into()))
        );

        cart.set_customization("a", None).unwrap();
        assert!(cart.line("a").unwrap().customization.is_none());
    }

    #[test]
    fn free_shipping_hint() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(45.00)), 1);
        assert_eq!(
            cart.amount_to_free_shipping(&PricingPolicy::default()).unwrap(),
            dec!(5.01)
        );
    }

    #[test]
    fn oversized_line_totals_are_errors_not_panics() {
        let mut cart = Cart::new();
        cart.add(&product("huge", Decimal::MAX), 2);
        assert_matches!(
            cart.line("huge").unwrap().line_total(),
            Err(ServiceError::ValidationError(_))
        );
        assert_matches!(cart.totals(), Err(ServiceError::ValidationError(_)));

        let mut cart = Cart::new();
        cart.add(&product("a", Decimal::MAX), 1);
        cart.add(&product("b", Decimal::MAX), 1);
        assert_matches!(cart.subtotal(), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn checkout_request_carries_ids_not_prices() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(10.00)), 2);
        cart.add(&product("b", dec!(25.00)), 1);
        cart.set_customization("b", Some("Blue")).unwrap();

        let request = cart.to_checkout_request(Some("a@example.com".into()), None);
        assert_eq!(request.kind, Some(CheckoutKind::BuyNow));
        assert_eq!(
            request.items,
            vec![
                json!({ "id": "a", "quantity": 2 }),
                json!({ "id": "b", "quantity": 1 })
            ]
        );
        assert_eq!(request.customization.as_deref(), Some("Product b: Blue"));
    }

    #[test]
    fn client_priced_request_carries_prices() {
        let mut cart = Cart::new();
        cart.add(&product("a", dec!(10.50)), 2);

        let request = cart.to_client_priced_request(None, Some("gift".into()));
        assert_eq!(request.kind, Some(CheckoutKind::Cart));
        assert_eq!(request.items[0]["name"], "Product a");
        assert_eq!(request.items[0]["price"], "10.50");
        assert_eq!(request.items[0]["quantity"], 2);
        assert!(request.items[0].get("id").is_none());
        assert_eq!(request.customization.as_deref(), Some("gift"));
    }
}
