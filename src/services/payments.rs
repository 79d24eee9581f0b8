//! Payment provider seam and the Stripe Checkout client behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::errors::{ServiceError, ServiceResult};

/// One priced line on a checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLineItem {
    pub name: String,
    pub description: Option<String>,
    pub images: Vec<String>,
    /// Unit price in minor units
    pub unit_amount: i64,
    pub quantity: u32,
    /// Set for catalog-resolved lines
    pub product_id: Option<String>,
}

/// Everything needed to open a hosted, one-time-payment checkout session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSessionRequest {
    pub currency: String,
    pub line_items: Vec<CheckoutLineItem>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub shipping_countries: Vec<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedCheckoutSession {
    pub id: String,
    pub url: String,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a provider-side session. Not idempotent; callers must not retry.
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ServiceResult<CreatedCheckoutSession>;
}

#[derive(Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    message: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct StripeSessionResponse {
    id: String,
    url: Option<String>,
}

/// Stripe REST client for Checkout Sessions.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
    api_base: String,
    api_version: String,
}

impl StripeClient {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            secret_key: secret_key.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_version: api_version.into(),
        })
    }

    /// Builds a client when a secret key is configured.
    pub fn from_config(config: &AppConfig) -> ServiceResult<Option<Self>> {
        match config
            .stripe_secret_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
        {
            Some(key) => Self::new(
                key,
                config.stripe_api_base.as_str(),
                config.stripe_api_version.as_str(),
                config.stripe_timeout(),
            )
            .map(Some),
            None => Ok(None),
        }
    }
}

/// Flattens a session request into Stripe's bracketed form parameters.
pub fn session_form_params(request: &CheckoutSessionRequest) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = vec![
        ("mode".into(), "payment".into()),
        ("payment_method_types[0]".into(), "card".into()),
        ("success_url".into(), request.success_url.clone()),
        ("cancel_url".into(), request.cancel_url.clone()),
    ];

    for (i, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        params.push((
            format!("{}[price_data][currency]", prefix),
            request.currency.clone(),
        ));
        params.push((
            format!("{}[price_data][unit_amount]", prefix),
            item.unit_amount.to_string(),
        ));
        params.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.name.clone(),
        ));
        if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
            params.push((
                format!("{}[price_data][product_data][description]", prefix),
                description.to_string(),
            ));
        }
        for (j, image) in item.images.iter().enumerate() {
            params.push((
                format!("{}[price_data][product_data][images][{}]", prefix, j),
                image.clone(),
            ));
        }
        if let Some(product_id) = &item.product_id {
            params.push((
                format!("{}[price_data][product_data][metadata][product_id]", prefix),
                product_id.clone(),
            ));
        }
        params.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }

    if let Some(email) = request.customer_email.as_deref().filter(|e| !e.is_empty()) {
        params.push(("customer_email".into(), email.to_string()));
    }

    for (i, country) in request.shipping_countries.iter().enumerate() {
        params.push((
            format!("shipping_address_collection[allowed_countries][{}]", i),
            country.clone(),
        ));
    }

    for (key, value) in &request.metadata {
        params.push((format!("metadata[{}]", key), value.clone()));
    }

    params
}

#[async_trait]
impl PaymentProvider for StripeClient {
    #[instrument(skip(self, request), fields(lines = request.line_items.len()))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutSessionRequest,
    ) -> ServiceResult<CreatedCheckoutSession> {
        let params = session_form_params(request);

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, Some(""))
            .header("Stripe-Version", &self.api_version)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::PaymentProvider(format!("Stripe request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeErrorEnvelope>(&error_text)
                .ok()
                .and_then(|env| {
                    env.error
                        .message
                        .or(env.error.kind)
                })
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            warn!(status = status.as_u16(), "Stripe rejected checkout session: {}", message);
            return Err(ServiceError::PaymentProvider(message));
        }

        let session: StripeSessionResponse = response.json().await.map_err(|e| {
            ServiceError::PaymentProvider(format!("Failed to parse Stripe response: {}", e))
        })?;

        let url = session.url.ok_or_else(|| {
            ServiceError::PaymentProvider(format!("session {} has no redirect URL", session.id))
        })?;

        info!(session_id = %session.id, "Stripe checkout session created");
        Ok(CreatedCheckoutSession {
            id: session.id,
            url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_request() -> CheckoutSessionRequest {
        CheckoutSessionRequest {
            currency: "usd".into(),
            line_items: vec![CheckoutLineItem {
                name: "Beaded Bracelet".into(),
                description: Some("Glass beads".into()),
                images: vec!["https://cdn.example/b.png".into()],
                unit_amount: 1250,
                quantity: 2,
                product_id: Some("bracelet-1".into()),
            }],
            success_url: "https://shop.example?success=true".into(),
            cancel_url: "https://shop.example".into(),
            customer_email: Some("buyer@example.com".into()),
            shipping_countries: vec!["US".into()],
            metadata: BTreeMap::from([
                ("customization".to_string(), String::new()),
                (
                    "items".to_string(),
                    r#"[{"id":"bracelet-1","quantity":2}]"#.to_string(),
                ),
            ]),
        }
    }

    fn client(base: &str) -> StripeClient {
        StripeClient::new("sk_test_123", base, "2024-11-20.acacia", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn form_params_follow_stripe_bracket_encoding() {
        let params = session_form_params(&sample_request());
        let get = |k: &str| {
            params
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("payment_method_types[0]"), Some("card"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1250"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(
            get("line_items[0][price_data][product_data][metadata][product_id]"),
            Some("bracelet-1")
        );
        assert_eq!(
            get("shipping_address_collection[allowed_countries][0]"),
            Some("US")
        );
        assert_eq!(get("customer_email"), Some("buyer@example.com"));
        assert_eq!(get("metadata[customization]"), Some(""));
    }

    #[test]
    fn empty_optional_fields_are_omitted() {
        let mut request = sample_request();
        request.customer_email = Some(String::new());
        request.line_items[0].description = Some(String::new());
        request.line_items[0].images.clear();

        let params = session_form_params(&request);
        assert!(params.iter().all(|(k, _)| k != "customer_email"));
        assert!(params
            .iter()
            .all(|(k, _)| !k.contains("[description]") && !k.contains("[images]")));
    }

    #[tokio::test]
    async fn creates_session_and_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("Stripe-Version", "2024-11-20.acacia"))
            .and(body_string_contains("unit_amount%5D=1250"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = client(&server.uri())
            .create_checkout_session(&sample_request())
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert_eq!(session.url, "https://checkout.stripe.com/c/pay/cs_test_1");
    }

    #[tokio::test]
    async fn provider_errors_surface_stripe_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "type": "invalid_request_error", "message": "Invalid currency: zzz" }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .create_checkout_session(&sample_request())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::PaymentProvider(msg) if msg == "Invalid currency: zzz");
    }

    #[test]
    fn missing_secret_key_yields_no_client() {
        let config = AppConfig::default();
        assert!(StripeClient::from_config(&config).unwrap().is_none());
    }
}
