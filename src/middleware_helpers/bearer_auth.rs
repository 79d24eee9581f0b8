use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, Method},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::warn;

use crate::{errors::ServiceError, webhooks::constant_time_eq, AppState};

/// Extracts the token from an `Authorization: Bearer <token>` header value.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Requires the storefront's publishable key on checkout calls.
///
/// Passes everything through when no key is configured. Preflight requests are never gated.
pub async fn require_anon_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    let Some(expected) = state.config.anon_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(next.run(request).await);
    };
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let supplied = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token);

    match supplied {
        Some(token) if constant_time_eq(token, expected) => Ok(next.run(request).await),
        Some(_) => {
            counter!("auth.rejected", 1);
            warn!("checkout request carried a wrong bearer key");
            Err(ServiceError::Unauthorized("invalid authorization".to_string()))
        }
        None => {
            counter!("auth.rejected", 1);
            Err(ServiceError::Unauthorized(
                "missing authorization header".to_string(),
            ))
        }
    }
}
