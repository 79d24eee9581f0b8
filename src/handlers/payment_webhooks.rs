use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use chrono::Utc;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

use crate::{
    errors::ServiceError,
    webhooks::{
        process_event, verify_stripe_signature, WebhookEvent, WebhookOutcome,
        STRIPE_SIGNATURE_HEADER,
    },
    AppState,
};

/// Acknowledgement returned to the provider.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    fn received() -> Json<Self> {
        Json(Self { received: true })
    }
}

/// Receive a signed Stripe event
#[utoipa::path(
    post,
    path = "/functions/v1/handle-payment-webhook",
    request_body(content = String, description = "Raw Stripe event JSON, exactly as signed"),
    params(("stripe-signature" = String, Header, description = "Stripe signature header")),
    responses(
        (status = 200, description = "Event verified and handled", body = WebhookAck),
        (status = 400, description = "Missing or invalid signature", body = crate::errors::ErrorResponse),
        (status = 500, description = "Order could not be recorded; the provider should retry", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip_all, fields(body_len = body.len()))]
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ServiceError> {
    counter!("webhooks.received", 1);

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.trim().is_empty());
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .filter(|s| !s.trim().is_empty());

    let (Some(signature), Some(secret)) = (signature, secret) else {
        counter!("webhooks.rejected", 1);
        return Err(ServiceError::MissingSignature);
    };

    if let Err(err) = verify_stripe_signature(
        &body,
        signature,
        secret,
        state.config.stripe_webhook_tolerance_secs,
        Utc::now().timestamp(),
    ) {
        counter!("webhooks.rejected", 1);
        warn!("Payment webhook signature verification failed: {}", err);
        return Err(err.into());
    }

    let event = WebhookEvent::parse(&body)?;
    info!(event_id = ?event.id, event_type = %event.event_type, "verified webhook event");

    match process_event(state.orders.as_ref(), &event).await {
        Ok(WebhookOutcome::Ignored)
        | Ok(WebhookOutcome::OrderRecorded)
        | Ok(WebhookOutcome::DuplicateOrder) => Ok(WebhookAck::received()),
        Err(err @ ServiceError::DatabaseError(_))
            if state.config.webhook_ack_on_persistence_failure =>
        {
            error!(
                event_id = ?event.id,
                "order persistence failed, acknowledging anyway: {}", err
            );
            Ok(WebhookAck::received())
        }
        Err(err) => Err(err),
    }
}
