//! Inbound payment-provider events.

pub mod stripe_signature;

use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::errors::{ServiceError, ServiceResult};
use crate::services::commerce::order_service::{NewOrder, OrderStore, RecordOutcome};

pub use stripe_signature::{
    constant_time_eq, sign_payload, verify_stripe_signature, SignatureError,
    STRIPE_SIGNATURE_HEADER,
};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// Envelope of a Stripe event. Only the fields this service reads are modelled.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    #[serde(default)]
    pub email: Option<String>,
}

/// The `checkout.session` object carried by completion events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub customer_details: Option<CustomerDetails>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, String>>,
}

impl CheckoutSessionObject {
    /// Email typed at checkout, else the one Stripe collected.
    pub fn email(&self) -> Option<String> {
        self.customer_email
            .as_deref()
            .or_else(|| {
                self.customer_details
                    .as_ref()
                    .and_then(|d| d.email.as_deref())
            })
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
    }

    pub fn into_new_order(self) -> NewOrder {
        let customer_email = self.email();
        let metadata = self.metadata.unwrap_or_default();
        let customization = metadata
            .get("customization")
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let items = metadata.get("items").and_then(|raw| {
            serde_json::from_str::<serde_json::Value>(raw)
                .map_err(|e| warn!(session_id = %self.id, "unreadable items metadata: {}", e))
                .ok()
        });

        NewOrder {
            stripe_session_id: self.id,
            customer_email,
            amount_total: self.amount_total,
            currency: self.currency,
            payment_status: self.payment_status.unwrap_or_else(|| "unknown".to_string()),
            customization,
            items,
        }
    }
}

impl WebhookEvent {
    pub fn parse(payload: &[u8]) -> ServiceResult<Self> {
        serde_json::from_slice(payload)
            .map_err(|e| ServiceError::BadRequest(format!("invalid event payload: {}", e)))
    }

    /// The session object, when this is a completion event.
    pub fn completed_session(&self) -> ServiceResult<Option<CheckoutSessionObject>> {
        if self.event_type != CHECKOUT_SESSION_COMPLETED {
            return Ok(None);
        }
        let session = serde_json::from_value(self.data.object.clone())
            .map_err(|e| ServiceError::BadRequest(format!("invalid checkout session: {}", e)))?;
        Ok(Some(session))
    }
}

/// What happened to a verified event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Ignored,
    OrderRecorded,
    DuplicateOrder,
}

/// Applies a verified event. Only session completions have side effects.
pub async fn process_event(
    orders: &dyn OrderStore,
    event: &WebhookEvent,
) -> ServiceResult<WebhookOutcome> {
    let Some(session) = event.completed_session()? else {
        debug!(event_type = %event.event_type, "ignoring webhook event");
        return Ok(WebhookOutcome::Ignored);
    };

    let session_id = session.id.clone();
    match orders.record(session.into_new_order()).await? {
        RecordOutcome::Inserted(order) => {
            info!(session_id = %session_id, order_id = %order.id, "order recorded");
            Ok(WebhookOutcome::OrderRecorded)
        }
        RecordOutcome::Duplicate => {
            info!(session_id = %session_id, "order already recorded for session");
            Ok(WebhookOutcome::DuplicateOrder)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(event_type: &str, object: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": "evt_1",
            "type": event_type,
            "data": { "object": object }
        }))
        .unwrap()
    }

    #[test]
    fn completion_event_maps_to_new_order() {
        let event = event(
            CHECKOUT_SESSION_COMPLETED,
            json!({
                "id": "cs_test_1",
                "object": "checkout.session",
                "customer_email": null,
                "customer_details": { "email": "buyer@example.com" },
                "amount_total": 5759,
                "currency": "usd",
                "payment_status": "paid",
                "metadata": {
                    "customization": "  ",
                    "items": "[{\"id\":\"p1\",\"quantity\":2}]"
                }
            }),
        );

        let order = event.completed_session().unwrap().unwrap().into_new_order();
        assert_eq!(order.stripe_session_id, "cs_test_1");
        assert_eq!(order.customer_email.as_deref(), Some("buyer@example.com"));
        assert_eq!(order.amount_total, Some(5759));
        assert_eq!(order.payment_status, "paid");
        assert_eq!(order.customization, None);
        assert_eq!(order.items, Some(json!([{ "id": "p1", "quantity": 2 }])));
    }

    #[test]
    fn other_event_types_have_no_session() {
        let event = event("payment_intent.succeeded", json!({ "id": "pi_1" }));
        assert!(event.completed_session().unwrap().is_none());
    }

    #[test]
    fn completion_without_session_id_is_a_bad_request() {
        let event = event(CHECKOUT_SESSION_COMPLETED, json!({ "amount_total": 10 }));
        assert!(matches!(
            event.completed_session(),
            Err(ServiceError::BadRequest(_))
        ));
    }

    #[test]
    fn garbage_payload_is_a_bad_request() {
        assert!(matches!(
            WebhookEvent::parse(b"not json"),
            Err(ServiceError::BadRequest(_))
        ));
    }
}
