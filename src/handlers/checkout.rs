use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use bytes::Bytes;
use tracing::instrument;

use crate::{
    errors::{ServiceError, ServiceResult},
    services::commerce::checkout_service::{CheckoutRequest, CheckoutResponse},
    AppState,
};

/// Parses the body ourselves so malformed JSON still yields `{"error": ...}`.
fn parse_checkout_request(body: &[u8]) -> ServiceResult<CheckoutRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServiceError::BadRequest("request body is empty".to_string()));
    }
    serde_json::from_slice(body)
        .map_err(|e| ServiceError::BadRequest(format!("invalid checkout request: {}", e)))
}

/// Create a hosted checkout session
#[utoipa::path(
    post,
    path = "/functions/v1/create-checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Empty cart, unavailable product or invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing or wrong bearer key", body = crate::errors::ErrorResponse),
        (status = 500, description = "Server configuration error", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("anon_key" = [])),
    tag = "Checkout"
)]
#[instrument(skip(state, body), fields(body_len = body.len()))]
pub async fn create_checkout(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    let request = parse_checkout_request(&body)?;
    let session = state.checkout.create_session(&request).await?;
    Ok(Json(CheckoutResponse { url: session.url }))
}

/// CORS preflight. Under `app_router` the CORS layer answers OPTIONS before this runs.
pub async fn checkout_preflight() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn blank_and_malformed_bodies_are_bad_requests() {
        assert_matches!(parse_checkout_request(b""), Err(ServiceError::BadRequest(_)));
        assert_matches!(parse_checkout_request(b"  \n"), Err(ServiceError::BadRequest(_)));
        assert_matches!(parse_checkout_request(b"{items:"), Err(ServiceError::BadRequest(_)));
    }

    #[test]
    fn original_wire_shape_is_accepted() {
        let request = parse_checkout_request(
            br#"{"items":[{"id":"p1","quantity":2}],"customer_email":"a@b.co","customization":"Blue"}"#,
        )
        .unwrap();
        assert_eq!(request.kind, None);
        assert_eq!(request.items.len(), 1);
        assert_eq!(request.customer_email.as_deref(), Some("a@b.co"));
    }
}
