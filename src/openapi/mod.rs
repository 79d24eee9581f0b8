use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront Checkout API",
        version = "0.1.0",
        description = r#"
# Storefront Checkout API

Opens hosted Stripe checkout sessions for a storefront cart and records paid
orders from Stripe's `checkout.session.completed` webhook.

## Authentication

When the server is configured with an anon key, checkout calls must send it:

```
Authorization: Bearer <anon-key>
```

The webhook endpoint is authenticated by its `stripe-signature` header instead.

## Errors

Every failure is a JSON object with a single `error` field.
"#,
    ),
    paths(
        crate::handlers::checkout::create_checkout,
        crate::handlers::payment_webhooks::handle_payment_webhook,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::services::commerce::checkout_service::CheckoutRequest,
            crate::services::commerce::checkout_service::CheckoutKind,
            crate::services::commerce::checkout_service::CheckoutResponse,
            crate::errors::ErrorResponse,
            crate::handlers::payment_webhooks::WebhookAck,
            crate::handlers::health::HealthResponse,
            crate::handlers::health::ComponentHealth,
            crate::handlers::health::ComponentStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Checkout", description = "Hosted checkout session creation"),
        (name = "Payments", description = "Payment provider webhooks"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "anon_key",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Serves the generated OpenAPI document.
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_public_endpoints() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| *p == "/functions/v1/create-checkout"));
        assert!(paths.iter().any(|p| *p == "/functions/v1/handle-payment-webhook"));
        assert!(paths.iter().any(|p| *p == "/health"));
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("anon_key"));
    }
}
