/// Commerce services module - cart, catalog, checkout and order recording
pub mod cart_service;
pub mod checkout_service;
pub mod order_service;
pub mod pricing_service;
pub mod product_catalog_service;

// Re-export services for convenience
pub use cart_service::{Cart, CartError, CartLineItem, CartTotals};
pub use checkout_service::{CheckoutKind, CheckoutRequest, CheckoutService, CheckoutSettings};
pub use order_service::{NewOrder, OrderStore, RecordOutcome, SeaOrmOrderStore};
pub use pricing_service::PricingPolicy;
pub use product_catalog_service::{
    CatalogStore, Category, Product, ProductFilter, ResilientCatalog, SeaOrmCatalog,
};
